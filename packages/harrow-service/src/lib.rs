pub mod context;
pub mod neighbors;
pub mod retry;
pub mod search;

mod error;

pub use context::{ContextResponse, build_prompt};
pub use error::{Error, Result};
pub use neighbors::{NeighborStatus, NeighborText};
pub use retry::{RetryPolicy, Transient};
pub use search::{SearchExplain, SearchItem, SearchRequest, SearchResponse};

use std::{collections::BTreeMap, future::Future, pin::Pin, sync::Arc};

use harrow_config::{Config, EmbeddingProviderConfig};
use harrow_providers::embedding;
use harrow_storage::{models::StoredChunk, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, harrow_providers::Result<Vec<Vec<f32>>>>;
}

/// Read-only view of the chunk index.
pub trait VectorStore
where
	Self: Send + Sync,
{
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		must: Option<&'a BTreeMap<String, Vec<String>>>,
		limit: u32,
	) -> BoxFuture<'a, harrow_storage::Result<Vec<StoredChunk>>>;

	fn fetch_neighbors<'a>(
		&'a self,
		source_id: &'a str,
		positions: &'a [u32],
	) -> BoxFuture<'a, harrow_storage::Result<Vec<StoredChunk>>>;

	fn sample<'a>(&'a self, limit: u32) -> BoxFuture<'a, harrow_storage::Result<Vec<StoredChunk>>>;
}

struct DefaultEmbedding;
impl EmbeddingProvider for DefaultEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, harrow_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl VectorStore for QdrantStore {
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		must: Option<&'a BTreeMap<String, Vec<String>>>,
		limit: u32,
	) -> BoxFuture<'a, harrow_storage::Result<Vec<StoredChunk>>> {
		Box::pin(self.search(vector, must, limit))
	}

	fn fetch_neighbors<'a>(
		&'a self,
		source_id: &'a str,
		positions: &'a [u32],
	) -> BoxFuture<'a, harrow_storage::Result<Vec<StoredChunk>>> {
		Box::pin(QdrantStore::fetch_neighbors(self, source_id, positions))
	}

	fn sample<'a>(&'a self, limit: u32) -> BoxFuture<'a, harrow_storage::Result<Vec<StoredChunk>>> {
		Box::pin(QdrantStore::sample(self, limit))
	}
}

/// Hybrid retrieval over one collection. Shared read-only across requests.
pub struct Fuser {
	pub cfg: Config,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub store: Arc<dyn VectorStore>,
	retry: RetryPolicy,
}
impl Fuser {
	pub fn new(cfg: Config) -> Result<Self> {
		let store = QdrantStore::new(&cfg.storage.qdrant)?;

		Ok(Self::with_backends(cfg, Arc::new(DefaultEmbedding), Arc::new(store)))
	}

	pub fn with_backends(
		cfg: Config,
		embedding: Arc<dyn EmbeddingProvider>,
		store: Arc<dyn VectorStore>,
	) -> Self {
		let retry = RetryPolicy::from_config(&cfg.retry);

		Self { cfg, embedding, store, retry }
	}

	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.retry
	}
}
