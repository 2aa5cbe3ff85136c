use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::RESPONSE_MATCH_SCORE;
use crate::metric::{Metric, MetricEvaluation};
use crate::render::content_to_text;
use crate::types::Invocation;

/// ROUGE-1 F-measure between the expected and actual final responses.
///
/// Turns without an expected response are not evaluated.
pub struct ResponseMatchMetric {
	pub threshold: f64,
}

impl ResponseMatchMetric {
	pub fn new(threshold: f64) -> Self {
		Self { threshold }
	}
}

#[async_trait]
impl Metric for ResponseMatchMetric {
	fn name(&self) -> &'static str {
		RESPONSE_MATCH_SCORE
	}

	fn threshold(&self) -> f64 {
		self.threshold
	}

	async fn evaluate(&self, actual: &[Invocation], expected: &[Invocation]) -> Result<MetricEvaluation> {
		let mut scores = Vec::with_capacity(expected.len());
		for (a, e) in actual.iter().zip(expected) {
			let Some(reference) = e.final_response.as_ref() else {
				scores.push(None);
				continue;
			};
			let reference = content_to_text(Some(reference))?;
			let candidate = content_to_text(a.final_response.as_ref())?;
			scores.push(Some(rouge1_f1(&reference, &candidate)));
		}
		Ok(MetricEvaluation::from_scores(self.name(), self.threshold, scores))
	}
}

/// Unigram F1 between `reference` and `candidate`.
pub fn rouge1_f1(reference: &str, candidate: &str) -> f64 {
	let reference = tokenize(reference);
	let candidate = tokenize(candidate);
	if reference.is_empty() || candidate.is_empty() {
		return 0.0;
	}

	let mut counts: HashMap<&str, usize> = HashMap::new();
	for token in &reference {
		*counts.entry(token.as_str()).or_default() += 1;
	}
	let mut overlap = 0usize;
	for token in &candidate {
		if let Some(n) = counts.get_mut(token.as_str()) {
			if *n > 0 {
				*n -= 1;
				overlap += 1;
			}
		}
	}
	if overlap == 0 {
		return 0.0;
	}

	let precision = overlap as f64 / candidate.len() as f64;
	let recall = overlap as f64 / reference.len() as f64;
	2.0 * precision * recall / (precision + recall)
}

/// Lowercased alphanumeric runs; every CJK ideograph is a token of its own.
pub fn tokenize(text: &str) -> Vec<String> {
	let mut tokens = Vec::new();
	let mut current = String::new();
	for ch in text.chars() {
		if is_cjk(ch) {
			if !current.is_empty() {
				tokens.push(std::mem::take(&mut current));
			}
			tokens.push(ch.to_string());
		} else if ch.is_alphanumeric() {
			current.extend(ch.to_lowercase());
		} else if !current.is_empty() {
			tokens.push(std::mem::take(&mut current));
		}
	}
	if !current.is_empty() {
		tokens.push(current);
	}
	tokens
}

fn is_cjk(ch: char) -> bool {
	matches!(
		ch as u32,
		0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2FA1F
			| 0x3040..=0x30FF
	)
}
