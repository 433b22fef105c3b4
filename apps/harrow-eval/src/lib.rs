pub mod inspect;
pub mod metrics;

use std::{
	collections::HashSet,
	fs, io,
	path::{Path, PathBuf},
	time::Instant,
};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use harrow_domain::FilterSpec;
use harrow_service::{Fuser, SearchRequest, SearchResponse};

#[derive(Debug, Parser)]
#[command(
	version = harrow_cli::VERSION,
	rename_all = "kebab",
	styles = harrow_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Runs every dataset query through the fuser and scores the results.
	Run {
		#[arg(long, short = 'd', value_name = "FILE")]
		dataset: PathBuf,
		#[arg(long, value_name = "N", default_value_t = 1)]
		runs_per_query: u32,
	},
	/// Samples stored points and reports tag coverage per category.
	Inspect {
		#[arg(long, value_name = "N", default_value_t = 1_000)]
		sample: u32,
	},
}

#[derive(Debug, Deserialize)]
pub struct EvalDataset {
	pub name: Option<String>,
	#[serde(default)]
	pub defaults: EvalDefaults,
	pub queries: Vec<EvalQuery>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvalDefaults {
	pub top_k: Option<u32>,
	pub filters: Option<FilterSpec>,
}

#[derive(Debug, Deserialize)]
pub struct EvalQuery {
	pub id: Option<String>,
	pub query: String,
	pub filters: Option<FilterSpec>,
	pub top_k: Option<u32>,
	pub expected_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EvalOutput {
	pub dataset: EvalDatasetInfo,
	pub settings: EvalSettings,
	pub summary: EvalSummary,
	pub queries: Vec<QueryReport>,
}

#[derive(Debug, Serialize)]
pub struct EvalDatasetInfo {
	pub name: String,
	pub query_count: usize,
}

#[derive(Debug, Serialize)]
pub struct EvalSettings {
	pub collection: String,
	pub top_k: u32,
	pub runs_per_query: u32,
}

#[derive(Debug, Serialize)]
pub struct EvalSummary {
	pub avg_recall_at_k: f64,
	pub avg_precision_at_k: f64,
	pub mean_rr: f64,
	pub mean_ndcg: f64,
	pub latency_ms_mean: f64,
	pub latency_ms_p50: f64,
	pub latency_ms_p95: f64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stability: Option<StabilitySummary>,
}

#[derive(Debug, Serialize)]
pub struct StabilitySummary {
	pub runs_per_query: u32,
	pub avg_positional_churn_at_k: f64,
	pub avg_set_churn_at_k: f64,
}

#[derive(Debug, Serialize)]
pub struct QueryReport {
	pub id: String,
	pub query: String,
	pub trace_id: Uuid,
	pub top_k: u32,
	pub expected_count: usize,
	pub retrieved_count: usize,
	pub relevant_count: usize,
	pub recall_at_k: f64,
	pub precision_at_k: f64,
	pub rr: f64,
	pub ndcg: f64,
	pub latency_ms: f64,
	pub expected_ids: Vec<String>,
	pub retrieved_ids: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stability: Option<QueryStability>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueryStability {
	pub runs_per_query: u32,
	pub positional_churn_at_k: f64,
	pub set_churn_at_k: f64,
}

struct QueryRun {
	response: SearchResponse,
	latency_ms: f64,
	stability: Option<QueryStability>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = harrow_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	// Reports go to stdout.
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

	let service = Fuser::new(config)?;
	let json = match args.command {
		Command::Run { dataset, runs_per_query } => {
			let dataset = load_dataset(&dataset)?;
			let output = evaluate(&service, &dataset, runs_per_query).await?;

			serde_json::to_string_pretty(&output)?
		},
		Command::Inspect { sample } => {
			let report = inspect::inspect(&service, sample).await?;

			serde_json::to_string_pretty(&report)?
		},
	};

	println!("{json}");

	Ok(())
}

pub fn load_dataset(path: &Path) -> color_eyre::Result<EvalDataset> {
	let raw = fs::read_to_string(path)?;
	let dataset: EvalDataset = serde_json::from_str(&raw)?;

	if dataset.queries.is_empty() {
		return Err(eyre::eyre!("Dataset must include at least one query."));
	}

	Ok(dataset)
}

/// Searches every query `runs_per_query` times. Quality metrics use the first run; later runs
/// only feed latency and stability.
pub async fn evaluate(
	service: &Fuser,
	dataset: &EvalDataset,
	runs_per_query: u32,
) -> color_eyre::Result<EvalOutput> {
	let runs = runs_per_query.max(1);
	let search = &service.cfg.search;
	let default_top_k = dataset.defaults.top_k.unwrap_or(search.top_k).min(search.max_top_k);
	let mut reports = Vec::with_capacity(dataset.queries.len());

	for (idx, query) in dataset.queries.iter().enumerate() {
		let top_k = query.top_k.map(|top_k| top_k.min(search.max_top_k)).unwrap_or(default_top_k);
		let request = SearchRequest {
			query: query.query.clone(),
			filters: query.filters.clone().or_else(|| dataset.defaults.filters.clone()),
			top_k: Some(top_k),
			..SearchRequest::default()
		};
		let run = run_query_n_times(service, request, top_k, runs).await?;
		let retrieved =
			metrics::unique_ids(run.response.items.iter().map(|item| item.id.as_str()));
		let expected_ids = metrics::unique_ids(query.expected_ids.iter().map(String::as_str));
		let expected: HashSet<String> = expected_ids.iter().cloned().collect();
		let scores = metrics::compute_metrics(&retrieved, &expected);
		let id = query.id.clone().unwrap_or_else(|| format!("q{}", idx + 1));

		tracing::debug!(
			query_id = %id,
			relevant = scores.relevant_count,
			latency_ms = run.latency_ms,
			"Evaluated query."
		);

		reports.push(QueryReport {
			id,
			query: query.query.clone(),
			trace_id: run.response.trace_id,
			top_k,
			expected_count: expected.len(),
			retrieved_count: retrieved.len(),
			relevant_count: scores.relevant_count,
			recall_at_k: scores.recall_at_k,
			precision_at_k: scores.precision_at_k,
			rr: scores.rr,
			ndcg: scores.ndcg,
			latency_ms: run.latency_ms,
			expected_ids,
			retrieved_ids: retrieved,
			stability: run.stability,
		});
	}

	let mut summary = summarize(&reports);

	if runs > 1 {
		let churn: Vec<QueryStability> =
			reports.iter().filter_map(|report| report.stability).collect();

		summary.stability = Some(StabilitySummary {
			runs_per_query: runs,
			avg_positional_churn_at_k: metrics::mean(
				&churn.iter().map(|stability| stability.positional_churn_at_k).collect::<Vec<_>>(),
			),
			avg_set_churn_at_k: metrics::mean(
				&churn.iter().map(|stability| stability.set_churn_at_k).collect::<Vec<_>>(),
			),
		});
	}

	Ok(EvalOutput {
		dataset: EvalDatasetInfo {
			name: dataset.name.clone().unwrap_or_else(|| "unnamed".to_string()),
			query_count: dataset.queries.len(),
		},
		settings: EvalSettings {
			collection: service.cfg.storage.qdrant.collection.clone(),
			top_k: default_top_k,
			runs_per_query: runs,
		},
		summary,
		queries: reports,
	})
}

async fn run_query_n_times(
	service: &Fuser,
	request: SearchRequest,
	top_k: u32,
	runs: u32,
) -> color_eyre::Result<QueryRun> {
	let k = top_k.max(1) as usize;
	let mut first: Option<(SearchResponse, Vec<String>)> = None;
	let mut latency_total_ms = 0.0_f64;
	let mut positional_churn = Vec::new();
	let mut set_churn = Vec::new();

	for _ in 0..runs {
		let start = Instant::now();
		let response = service.search(request.clone()).await?;

		latency_total_ms += start.elapsed().as_secs_f64() * 1_000.0;

		let retrieved = metrics::unique_ids(response.items.iter().map(|item| item.id.as_str()));

		match &first {
			None => first = Some((response, retrieved)),
			Some((_, baseline)) => {
				let (positional, set) =
					metrics::churn_against_baseline_at_k(baseline, &retrieved, k);

				positional_churn.push(positional);
				set_churn.push(set);
			},
		}
	}

	let (response, _) = first.ok_or_else(|| eyre::eyre!("No search responses were collected."))?;
	let stability = (!positional_churn.is_empty()).then(|| QueryStability {
		runs_per_query: runs,
		positional_churn_at_k: metrics::mean(&positional_churn),
		set_churn_at_k: metrics::mean(&set_churn),
	});

	Ok(QueryRun { response, latency_ms: latency_total_ms / runs as f64, stability })
}

fn summarize(reports: &[QueryReport]) -> EvalSummary {
	let field = |get: fn(&QueryReport) -> f64| -> f64 {
		metrics::mean(&reports.iter().map(get).collect::<Vec<_>>())
	};
	let mut latencies: Vec<f64> = reports.iter().map(|report| report.latency_ms).collect();

	latencies.sort_by(f64::total_cmp);

	EvalSummary {
		avg_recall_at_k: field(|report| report.recall_at_k),
		avg_precision_at_k: field(|report| report.precision_at_k),
		mean_rr: field(|report| report.rr),
		mean_ndcg: field(|report| report.ndcg),
		latency_ms_mean: metrics::mean(&latencies),
		latency_ms_p50: metrics::percentile(&latencies, 0.50),
		latency_ms_p95: metrics::percentile(&latencies, 0.95),
		stability: None,
	}
}
