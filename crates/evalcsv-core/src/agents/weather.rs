//! Toy weather agents.
//!
//! Each agent pulls a city name out of the prompt, calls its
//! `query_weather` tool with it and replies with the tool's answer. The
//! weather itself is fixed per locale.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::agent::Agent;
use crate::render::content_to_text;
use crate::types::{Content, FunctionCall, FunctionResponse, IntermediateData, Invocation};

pub const QUERY_WEATHER: &str = "query_weather";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
	ZhTw,
	En,
}

pub struct WeatherAgent {
	locale: Locale,
	city: Regex,
}

impl WeatherAgent {
	pub fn new(locale: Locale) -> Self {
		let pattern = match locale {
			// "台北的天氣如何？", "請問高雄今天的天氣？", "那花蓮的天氣呢？"
			Locale::ZhTw => r"^\s*(?:請問|请问|那麼|那么|那)?\s*(?P<city>[\p{Han}A-Za-z]+?)\s*(?:今天|現在|现在|明天|的)*\s*(?:天氣|天气)",
			// "What is the weather in New York today?"
			Locale::En => r"\b(?:[Ii]n|[Ff]or|[Aa]t|[Oo]f)\s+(?P<city>\p{Lu}[\w'-]*(?:\s+\p{Lu}[\w'-]*)*)",
		};
		Self {
			locale,
			city: Regex::new(pattern).expect("static pattern"),
		}
	}

	pub fn zh_tw() -> Self {
		Self::new(Locale::ZhTw)
	}

	pub fn en() -> Self {
		Self::new(Locale::En)
	}

	pub fn locale(&self) -> Locale {
		self.locale
	}

	/// The agent's only tool.
	pub fn query_weather(&self, city_name: &str) -> String {
		match self.locale {
			Locale::ZhTw => format!("{city_name} 的天氣是：陰天。"),
			Locale::En => format!("The {city_name} of the weather is: sunny."),
		}
	}

	/// Last city mentioned in `prompt`, if any.
	pub fn extract_city(&self, prompt: &str) -> Option<String> {
		self.city
			.captures_iter(prompt)
			.last()
			.and_then(|caps| caps.name("city"))
			.map(|m| m.as_str().trim().to_string())
	}

	fn ask_for_city(&self) -> &'static str {
		match self.locale {
			Locale::ZhTw => "請告訴我您想查詢哪個城市的天氣。",
			Locale::En => "Please tell me which city you want the weather for.",
		}
	}
}

#[async_trait]
impl Agent for WeatherAgent {
	fn name(&self) -> &str {
		"weather_agent"
	}

	async fn invoke(&self, user_content: &Content) -> Result<Invocation> {
		let prompt = content_to_text(Some(user_content))?;

		let Some(city) = self.extract_city(&prompt) else {
			return Ok(Invocation {
				user_content: user_content.clone(),
				final_response: Some(Content::model_text(self.ask_for_city())),
				intermediate_data: Some(IntermediateData::default()),
				..Invocation::default()
			});
		};

		let answer = self.query_weather(&city);
		let call = FunctionCall::new(QUERY_WEATHER, json!({ "city_name": city }));
		let response = FunctionResponse {
			id: None,
			name: Some(QUERY_WEATHER.to_string()),
			response: json!({ "result": answer.clone() }),
		};

		Ok(Invocation {
			user_content: user_content.clone(),
			final_response: Some(Content::model_text(answer)),
			intermediate_data: Some(IntermediateData {
				tool_uses: vec![call],
				tool_responses: vec![response],
				intermediate_responses: Vec::new(),
			}),
			..Invocation::default()
		})
	}
}
