use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use evalcsv_core::report::{detailed_result, summary_table};
use evalcsv_core::{
	export_csv, flatten, load_eval_set, metrics_from_config, telemetry, AgentRegistry, EvalConfig,
	ExportOutcome, FlatRow, HistorySource, LocalEvaluator, OutputEncoding, ResultSource, ResultsByEvalId,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "evalcsv", version, about = "Run agent evaluations and export every metric to CSV")]
struct Cli {
	/// Show progress and loading messages
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Evaluate a built-in agent against an eval set and write the CSV
	Run(RunArgs),
	/// Export saved eval history files to CSV
	Flatten(FlattenArgs),
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// Eval config file (metric criteria and thresholds)
	#[arg(long, default_value = "evalsets/weather_agent/test_config.json")]
	config: PathBuf,

	/// Eval set JSON file
	#[arg(long, default_value = "evalsets/weather_agent/weather_evaluation_zhtw.evalset.json")]
	evalset: PathBuf,

	/// Agent module to evaluate: weather_agent or weather_agent_en
	#[arg(long, default_value = "weather_agent")]
	module_name: String,

	/// Runs per eval case
	#[arg(long, default_value_t = 1)]
	num_runs: usize,

	/// Concurrency (case runs in flight)
	#[arg(long, default_value_t = 8)]
	concurrency: usize,

	/// Also save the raw results as an eval history JSON file
	#[arg(long)]
	save_history: Option<PathBuf>,

	/// Print a per-case summary table
	#[arg(long)]
	summary: bool,

	#[command(flatten)]
	export: ExportArgs,
}

#[derive(Debug, Clone, Parser)]
struct FlattenArgs {
	/// Eval history JSON files, read in order
	#[arg(required = true)]
	results: Vec<PathBuf>,

	#[command(flatten)]
	export: ExportArgs,
}

#[derive(Debug, Clone, Args)]
struct ExportArgs {
	/// Output CSV file
	#[arg(long, default_value = "evaluation_all_metrics.csv")]
	output: PathBuf,

	/// Output encoding label: utf-8-sig (BOM, opens cleanly in Excel), utf-8, big5, cp950, ...
	#[arg(long, default_value = "utf-8-sig")]
	encoding: String,

	/// Print prompt, expected and actual response of every row
	#[arg(long)]
	print_detailed_results: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	telemetry::init_tracing(cli.verbose);
	match cli.command {
		Commands::Run(args) => run(args).await?,
		Commands::Flatten(args) => flatten_history(args).await?,
	}
	Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
	// Fail on bad output settings before spending time on the evaluation.
	let encoding: OutputEncoding = args.export.encoding.parse()?;

	info!(path = %args.config.display(), "loading eval config");
	let config = EvalConfig::load(&args.config).await?;
	let metrics = metrics_from_config(&config)?;

	info!(path = %args.evalset.display(), "loading eval set");
	let eval_set = load_eval_set(&args.evalset).await?;
	let eval_set_id = eval_set.eval_set_id.clone();

	info!(module = %args.module_name, "loading agent");
	let agent = AgentRegistry::with_builtin_agents().load(&args.module_name)?;

	let evaluator = LocalEvaluator::builder()
		.agent(agent)
		.eval_set(eval_set)
		.metrics(metrics)
		.num_runs(args.num_runs)
		.concurrency(args.concurrency)
		.build()?;

	println!("Running evaluation...");
	let results = evaluator.results().await?;
	println!("Evaluation complete.");

	if args.summary {
		println!("{}", summary_table(&results));
	}

	let history = args
		.save_history
		.as_deref()
		.map(|path| (path, format!("{eval_set_id}_{}", args.module_name), eval_set_id));
	save_outputs(&results, history, &args.export, encoding).await
}

/// Export the CSV, then the eval history. Rows are rendered and encoded
/// before anything touches the disk, so a bad result writes no files.
async fn save_outputs(
	results: &ResultsByEvalId,
	history: Option<(&Path, String, String)>,
	args: &ExportArgs,
	encoding: OutputEncoding,
) -> Result<()> {
	let rows = flatten(results)?;
	export(&rows, args, encoding)?;

	if let Some((path, eval_set_result_id, eval_set_id)) = history {
		let saved = results.to_eval_set_result(eval_set_result_id, eval_set_id);
		let json = serde_json::to_string_pretty(&saved)?;
		tokio::fs::write(path, json)
			.await
			.with_context(|| format!("Failed to write {:?}", path))?;
		info!(path = %path.display(), "saved eval history");
	}
	Ok(())
}

async fn flatten_history(args: FlattenArgs) -> Result<()> {
	let encoding: OutputEncoding = args.export.encoding.parse()?;
	let results = HistorySource::new(&args.results).results().await?;
	export(&flatten(&results)?, &args.export, encoding)
}

fn export(rows: &[FlatRow], args: &ExportArgs, encoding: OutputEncoding) -> Result<()> {
	if args.print_detailed_results {
		for row in rows {
			println!("{}", detailed_result(row));
		}
	}

	match export_csv(rows, &args.output, encoding)? {
		ExportOutcome::Written { .. } => {
			println!("Saved all evaluation results to {}", args.output.display());
		}
		ExportOutcome::NoResults => println!("No evaluation results to save."),
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use evalcsv_core::types::{CaseResult, Content, EvalStatus, Invocation, InvocationResult, Part};
	use evalcsv_core::RenderError;

	#[test]
	fn test_run_defaults() {
		let cli = Cli::try_parse_from(["evalcsv", "run"]).unwrap();
		let Commands::Run(args) = cli.command else {
			panic!("expected run");
		};
		assert_eq!(args.module_name, "weather_agent");
		assert_eq!(args.num_runs, 1);
		assert_eq!(args.export.encoding, "utf-8-sig");
		assert_eq!(args.export.output, PathBuf::from("evaluation_all_metrics.csv"));
		assert!(!args.export.print_detailed_results);
		assert!(!cli.verbose);
	}

	#[test]
	fn test_run_flags() {
		let cli = Cli::try_parse_from([
			"evalcsv",
			"run",
			"--module-name",
			"weather_agent_en",
			"--num-runs",
			"3",
			"--output",
			"out.csv",
			"--encoding",
			"utf-8",
			"--print-detailed-results",
			"--verbose",
		])
		.unwrap();
		assert!(cli.verbose);
		let Commands::Run(args) = cli.command else {
			panic!("expected run");
		};
		assert_eq!(args.module_name, "weather_agent_en");
		assert_eq!(args.num_runs, 3);
		assert!(args.export.print_detailed_results);
	}

	fn export_args(output: PathBuf) -> ExportArgs {
		ExportArgs {
			output,
			encoding: "utf-8".into(),
			print_detailed_results: false,
		}
	}

	fn results_with_response(response: Content) -> ResultsByEvalId {
		let invocation = InvocationResult {
			actual_invocation: Invocation {
				final_response: Some(response),
				..Invocation::default()
			},
			expected_invocation: Invocation::default(),
			eval_metric_results: Vec::new(),
		};
		let case = CaseResult {
			eval_set_id: "weather".into(),
			eval_id: "case_1".into(),
			final_eval_status: EvalStatus::NotEvaluated,
			overall_eval_metric_results: Vec::new(),
			eval_metric_result_per_invocation: vec![invocation],
			session_id: "s".into(),
			user_id: None,
		};
		[case].into_iter().collect()
	}

	#[tokio::test]
	async fn test_save_outputs_writes_csv_and_history() {
		let dir = tempfile::tempdir().unwrap();
		let csv = dir.path().join("out.csv");
		let history = dir.path().join("history.json");
		let results = results_with_response(Content::model_text("sunny"));

		let target = Some((history.as_path(), "run_1".to_string(), "weather".to_string()));
		save_outputs(&results, target, &export_args(csv.clone()), OutputEncoding::utf8())
			.await
			.unwrap();
		assert!(std::fs::read_to_string(&csv).unwrap().contains("case_1,,,sunny,,"));
		let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&history).unwrap()).unwrap();
		assert_eq!(saved["eval_set_result_id"], "run_1");
	}

	#[tokio::test]
	async fn test_render_error_leaves_no_files() {
		let dir = tempfile::tempdir().unwrap();
		let csv = dir.path().join("out.csv");
		let history = dir.path().join("history.json");
		let mut part = Part::text("sunny");
		part.inline_data = Some(serde_json::json!("image bytes"));
		let results = results_with_response(Content::new("model", vec![part]));

		let target = Some((history.as_path(), "run_1".to_string(), "weather".to_string()));
		let err = save_outputs(&results, target, &export_args(csv.clone()), OutputEncoding::utf8())
			.await
			.unwrap_err();
		assert!(err.downcast_ref::<RenderError>().is_some());
		assert!(!csv.exists());
		assert!(!history.exists());
	}

	#[test]
	fn test_flatten_requires_files() {
		assert!(Cli::try_parse_from(["evalcsv", "flatten"]).is_err());
		let cli = Cli::try_parse_from(["evalcsv", "flatten", "a.json", "b.json"]).unwrap();
		let Commands::Flatten(args) = cli.command else {
			panic!("expected flatten");
		};
		assert_eq!(args.results.len(), 2);
	}
}
