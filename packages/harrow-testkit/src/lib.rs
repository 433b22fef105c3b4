use std::{
	collections::BTreeMap,
	env,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Map;
use tokio::time;

use harrow_config::{
	Config, EmbeddingProviderConfig, Prompt, Providers, Qdrant, Ranking, Retry, Search,
	SearchNeighbors, Security, Service, Storage, Taxonomy,
};
use harrow_service::{BoxFuture, EmbeddingProvider, VectorStore};
use harrow_storage::models::StoredChunk;

pub const TEST_VECTOR_DIM: u32 = 4;

pub fn env_qdrant_url() -> Option<String> {
	env::var("HARROW_QDRANT_URL").ok()
}

pub fn env_qdrant_collection() -> Option<String> {
	env::var("HARROW_QDRANT_COLLECTION").ok()
}

/// A complete configuration with short timeouts and millisecond backoff.
pub fn test_config() -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		storage: Storage {
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				collection: "harrow_test".to_string(),
				vector_dim: TEST_VECTOR_DIM,
				vector_name: None,
				timeout_ms: 200,
			},
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/embeddings".to_string(),
				model: "test".to_string(),
				dimensions: TEST_VECTOR_DIM,
				timeout_ms: 200,
				default_headers: Map::new(),
			},
		},
		search: Search {
			top_k: 5,
			max_top_k: 20,
			overfetch_factor: 4,
			max_candidates: 50,
			request_timeout_ms: 5_000,
			pushdown_must: false,
			strict_filters: false,
			neighbors: SearchNeighbors {
				enabled: false,
				window: 1,
				deadline_ms: 500,
				max_concurrency: 4,
			},
		},
		ranking: Ranking { should_bonus: 0.1 },
		retry: Retry { max_attempts: 3, initial_backoff_ms: 1, max_backoff_ms: 4 },
		prompt: Prompt { max_context_chars: 12_000 },
		security: Security { bind_localhost_only: true, api_auth_token: None },
		taxonomy: Taxonomy::default(),
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingFailure {
	/// Reported as a provider timeout, which is retried.
	Transient,
	/// Reported as a malformed response, which is not retried.
	Permanent,
}

/// Embedding provider returning one fixed vector per input text.
pub struct FakeEmbedding {
	vector: Vec<f32>,
	failing_calls: usize,
	failure: EmbeddingFailure,
	delay: Option<Duration>,
	calls: AtomicUsize,
}
impl FakeEmbedding {
	pub fn new() -> Self {
		Self {
			vector: vec![0.5; TEST_VECTOR_DIM as usize],
			failing_calls: 0,
			failure: EmbeddingFailure::Transient,
			delay: None,
			calls: AtomicUsize::new(0),
		}
	}

	pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
		self.vector = vector;

		self
	}

	/// Fails the first `calls` calls with `failure`.
	pub fn failing(mut self, calls: usize, failure: EmbeddingFailure) -> Self {
		self.failing_calls = calls;
		self.failure = failure;

		self
	}

	/// Sleeps before every answer, to trip the caller's timeout.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl Default for FakeEmbedding {
	fn default() -> Self {
		Self::new()
	}
}
impl EmbeddingProvider for FakeEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, harrow_providers::Result<Vec<Vec<f32>>>> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if let Some(delay) = self.delay {
				time::sleep(delay).await;
			}
			if call < self.failing_calls {
				return Err(match self.failure {
					EmbeddingFailure::Transient =>
						harrow_providers::Error::Timeout { timeout_ms: cfg.timeout_ms },
					EmbeddingFailure::Permanent => harrow_providers::Error::InvalidResponse {
						message: "scripted failure".to_string(),
					},
				});
			}

			Ok(vec![self.vector.clone(); texts.len()])
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
	pub limit: u32,
	pub must: Option<BTreeMap<String, Vec<String>>>,
}

/// In-memory chunk index. `query` returns chunks by their preset score, highest first.
#[derive(Default)]
pub struct MemoryStore {
	chunks: Vec<StoredChunk>,
	query_delay: Option<Duration>,
	neighbor_delay: Option<Duration>,
	fail_neighbors: bool,
	queries: Mutex<Vec<RecordedQuery>>,
	neighbor_calls: AtomicUsize,
	neighbors_in_flight: AtomicUsize,
	max_neighbors_in_flight: AtomicUsize,
}
impl MemoryStore {
	pub fn new(chunks: Vec<StoredChunk>) -> Self {
		Self { chunks, ..Self::default() }
	}

	pub fn with_query_delay(mut self, delay: Duration) -> Self {
		self.query_delay = Some(delay);

		self
	}

	pub fn with_neighbor_delay(mut self, delay: Duration) -> Self {
		self.neighbor_delay = Some(delay);

		self
	}

	pub fn failing_neighbors(mut self) -> Self {
		self.fail_neighbors = true;

		self
	}

	pub fn queries(&self) -> Vec<RecordedQuery> {
		self.queries.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn neighbor_calls(&self) -> usize {
		self.neighbor_calls.load(Ordering::SeqCst)
	}

	/// Highest number of neighbor fetches that were running at the same time.
	pub fn max_concurrent_neighbor_fetches(&self) -> usize {
		self.max_neighbors_in_flight.load(Ordering::SeqCst)
	}
}
impl VectorStore for MemoryStore {
	fn query<'a>(
		&'a self,
		_vector: &'a [f32],
		must: Option<&'a BTreeMap<String, Vec<String>>>,
		limit: u32,
	) -> BoxFuture<'a, harrow_storage::Result<Vec<StoredChunk>>> {
		self.queries
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.push(RecordedQuery { limit, must: must.cloned() });

		Box::pin(async move {
			if let Some(delay) = self.query_delay {
				time::sleep(delay).await;
			}

			let mut hits: Vec<StoredChunk> = self
				.chunks
				.iter()
				.filter(|chunk| must.is_none_or(|must| matches_exact(chunk, must)))
				.cloned()
				.collect();

			hits.sort_by(|left, right| right.score.total_cmp(&left.score));
			hits.truncate(limit as usize);

			Ok(hits)
		})
	}

	fn fetch_neighbors<'a>(
		&'a self,
		source_id: &'a str,
		positions: &'a [u32],
	) -> BoxFuture<'a, harrow_storage::Result<Vec<StoredChunk>>> {
		self.neighbor_calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			let _in_flight =
				InFlight::enter(&self.neighbors_in_flight, &self.max_neighbors_in_flight);

			if let Some(delay) = self.neighbor_delay {
				time::sleep(delay).await;
			}
			if self.fail_neighbors {
				return Err(harrow_storage::Error::InvalidArgument(
					"scripted neighbor failure".to_string(),
				));
			}

			Ok(self
				.chunks
				.iter()
				.filter(|chunk| chunk.source_id.as_deref() == Some(source_id))
				.filter(|chunk| chunk.position.is_some_and(|position| positions.contains(&position)))
				.map(|chunk| StoredChunk { score: 0.0, ..chunk.clone() })
				.collect())
		})
	}

	fn sample<'a>(&'a self, limit: u32) -> BoxFuture<'a, harrow_storage::Result<Vec<StoredChunk>>> {
		Box::pin(async move {
			Ok(self
				.chunks
				.iter()
				.take(limit as usize)
				.map(|chunk| StoredChunk { score: 0.0, ..chunk.clone() })
				.collect())
		})
	}
}

// Leaves on drop, so aborted fetches are counted out too.
struct InFlight<'a> {
	current: &'a AtomicUsize,
}
impl<'a> InFlight<'a> {
	fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
		let now = current.fetch_add(1, Ordering::SeqCst) + 1;

		peak.fetch_max(now, Ordering::SeqCst);

		Self { current }
	}
}
impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.current.fetch_sub(1, Ordering::SeqCst);
	}
}

/// Builds a [`StoredChunk`] for fixtures.
pub struct ChunkBuilder {
	chunk: StoredChunk,
}
impl ChunkBuilder {
	pub fn new(id: &str, score: f32) -> Self {
		Self {
			chunk: StoredChunk {
				id: id.to_string(),
				text: format!("text of {id}"),
				source_id: None,
				position: None,
				tags: BTreeMap::new(),
				score,
			},
		}
	}

	pub fn text(mut self, text: &str) -> Self {
		self.chunk.text = text.to_string();

		self
	}

	pub fn at(mut self, source_id: &str, position: u32) -> Self {
		self.chunk.source_id = Some(source_id.to_string());
		self.chunk.position = Some(position);

		self
	}

	pub fn tag(mut self, category: &str, values: &[&str]) -> Self {
		self.chunk
			.tags
			.insert(category.to_string(), values.iter().map(|value| value.to_string()).collect());

		self
	}

	pub fn build(self) -> StoredChunk {
		self.chunk
	}
}

// Keyword semantics of a store-side payload filter: exact, case-sensitive values.
fn matches_exact(chunk: &StoredChunk, must: &BTreeMap<String, Vec<String>>) -> bool {
	must.iter().all(|(category, wanted)| {
		chunk
			.tags
			.get(category)
			.is_some_and(|values| values.iter().any(|value| wanted.contains(value)))
	})
}
