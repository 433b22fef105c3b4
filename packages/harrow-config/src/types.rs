use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub retry: Retry,
	#[serde(default)]
	pub prompt: Prompt,
	pub security: Security,
	#[serde(default)]
	pub taxonomy: Taxonomy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
	/// Optional. Named vector to query when the collection stores more than one.
	pub vector_name: Option<String>,
	#[serde(default = "default_store_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	pub top_k: u32,
	pub max_top_k: u32,
	pub overfetch_factor: u32,
	pub max_candidates: u32,
	pub request_timeout_ms: u64,
	/// Also send `must` categories to the vector store as a payload filter.
	///
	/// The store matches keywords exactly and receives normalized values, so only enable this when
	/// payload tags are written in normalized form (NFKC, trimmed, lowercase). Points tagged with
	/// any other spelling are never returned while it is on.
	#[serde(default)]
	pub pushdown_must: bool,
	#[serde(default)]
	pub strict_filters: bool,
	#[serde(default)]
	pub neighbors: SearchNeighbors,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchNeighbors {
	pub enabled: bool,
	/// Adjacent positions fetched on each side of a retained candidate.
	pub window: u32,
	pub deadline_ms: u64,
	pub max_concurrency: usize,
}
impl Default for SearchNeighbors {
	fn default() -> Self {
		Self { enabled: true, window: 1, deadline_ms: 1_500, max_concurrency: 8 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Ranking {
	/// Additive bonus for every `should` category with at least one matching value.
	pub should_bonus: f32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self { should_bonus: 0.1 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retry {
	pub max_attempts: u32,
	pub initial_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 3, initial_backoff_ms: 200, max_backoff_ms: 2_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Prompt {
	pub max_context_chars: usize,
}
impl Default for Prompt {
	fn default() -> Self {
		Self { max_context_chars: 12_000 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	pub api_auth_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
	/// Map keys are category names, e.g. "crops". Values are the controlled vocabulary.
	pub categories: BTreeMap<String, Vec<String>>,
}
impl Taxonomy {
	pub fn is_open(&self) -> bool {
		self.categories.is_empty()
	}

	pub fn knows(&self, category: &str) -> bool {
		self.is_open() || self.categories.contains_key(category)
	}
}

fn default_store_timeout_ms() -> u64 {
	5_000
}
