use std::{
	collections::{BTreeMap, HashSet},
	time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::time;
use tracing::{debug, warn};
use uuid::Uuid;

use harrow_domain::{Candidate, CategoryMatch, CompiledFilter, FilterImpact, FilterSpec, Fused};
use harrow_storage::models::StoredChunk;

use crate::{
	Error, Fuser, Result,
	neighbors::{self, NeighborOutcome, NeighborStatus, NeighborTarget, NeighborText},
	retry,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub filters: Option<FilterSpec>,
	#[serde(default)]
	pub top_k: Option<u32>,
	/// Overrides `search.strict_filters`.
	#[serde(default)]
	pub strict_filters: Option<bool>,
	/// Overrides `search.neighbors.enabled`.
	#[serde(default)]
	pub include_neighbors: Option<bool>,
	/// Overrides `search.neighbors.window`.
	#[serde(default)]
	pub neighbor_window: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
	pub trace_id: Uuid,
	pub items: Vec<SearchItem>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filter_impact: Option<FilterImpact>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub ignored_categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
	pub id: String,
	pub text: String,
	pub relevance_score: f32,
	pub semantic_score: f32,
	pub matched_categories: Vec<String>,
	pub source_id: Option<String>,
	pub position: Option<u32>,
	pub neighbors: Vec<NeighborText>,
	pub neighbor_status: NeighborStatus,
	pub explain: SearchExplain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchExplain {
	pub retrieval_rank: u32,
	pub category_bonus: f32,
	pub matches: Vec<CategoryMatch>,
}

struct SearchPlan {
	query: String,
	top_k: u32,
	candidate_k: u32,
	filter: Option<CompiledFilter>,
	neighbor_window: Option<u32>,
}

impl Fuser {
	/// Embeds the query, over-fetches candidates, applies the tag filter, and returns the
	/// re-ranked top results with optional neighbor context.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let plan = self.plan(&req)?;
		let budget = Duration::from_millis(self.cfg.search.request_timeout_ms);

		match time::timeout(budget, self.execute(plan)).await {
			Ok(result) => result,
			Err(_) => Err(Error::Retrieval {
				message: format!(
					"search exceeded request timeout of {} ms.",
					self.cfg.search.request_timeout_ms
				),
			}),
		}
	}

	fn plan(&self, req: &SearchRequest) -> Result<SearchPlan> {
		let search = &self.cfg.search;
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let top_k = req.top_k.unwrap_or(search.top_k);

		if top_k == 0 {
			return Err(Error::InvalidRequest {
				message: "top_k must be greater than zero.".to_string(),
			});
		}

		let top_k = top_k.min(search.max_top_k);
		let candidate_k =
			top_k.saturating_mul(search.overfetch_factor).min(search.max_candidates).max(top_k);
		let window = req.neighbor_window.unwrap_or(search.neighbors.window);

		if window > harrow_config::MAX_NEIGHBOR_WINDOW {
			return Err(Error::InvalidRequest {
				message: format!(
					"neighbor_window must be {} or less.",
					harrow_config::MAX_NEIGHBOR_WINDOW
				),
			});
		}

		let include_neighbors = req.include_neighbors.unwrap_or(search.neighbors.enabled);
		let neighbor_window = (include_neighbors && window > 0).then_some(window);
		let strict = req.strict_filters.unwrap_or(search.strict_filters);
		let filter = match req.filters.as_ref().filter(|filters| !filters.is_empty()) {
			Some(filters) => Some(filters.compile(&self.cfg.taxonomy, strict)?),
			None => None,
		};

		Ok(SearchPlan { query: query.to_string(), top_k, candidate_k, filter, neighbor_window })
	}

	async fn execute(&self, plan: SearchPlan) -> Result<SearchResponse> {
		let trace_id = Uuid::new_v4();
		let ignored_categories = plan
			.filter
			.as_ref()
			.map(|filter| filter.ignored_categories().to_vec())
			.unwrap_or_default();

		if !ignored_categories.is_empty() {
			warn!(
				%trace_id,
				ignored = ?ignored_categories,
				"Ignoring filter categories outside the taxonomy."
			);
		}

		let vector = self.embed_query(&plan.query).await?;
		let pushdown = plan
			.filter
			.as_ref()
			.filter(|_| self.cfg.search.pushdown_must)
			.map(|filter| {
				filter
					.must_categories()
					.map(|(category, values)| {
						(category.to_string(), values.iter().cloned().collect())
					})
					.collect::<BTreeMap<String, Vec<String>>>()
			})
			.filter(|must| !must.is_empty());
		let chunks = self.fetch_candidates(&vector, pushdown.as_ref(), plan.candidate_k).await?;
		let candidates = collect_candidates(chunks);
		let fetched = candidates.len();
		let outcome = harrow_domain::fuse(
			candidates,
			plan.filter.as_ref(),
			self.cfg.ranking.should_bonus,
			plan.top_k as usize,
		);

		debug!(
			%trace_id,
			candidate_k = plan.candidate_k,
			fetched,
			kept = outcome
				.impact
				.as_ref()
				.map(|impact| impact.candidate_count_post)
				.unwrap_or(fetched),
			returned = outcome.ranked.len(),
			"Fused search candidates."
		);

		let neighbor_outcomes = match plan.neighbor_window {
			Some(window) => self.expand_neighbors(&outcome.ranked, window).await,
			None => vec![NeighborOutcome::skipped(); outcome.ranked.len()],
		};
		let items = outcome
			.ranked
			.into_iter()
			.zip(neighbor_outcomes)
			.map(|(fused, neighbors)| build_item(fused, neighbors))
			.collect();

		Ok(SearchResponse { trace_id, items, filter_impact: outcome.impact, ignored_categories })
	}

	async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = vec![query.to_string()];
		let vectors = retry::call_with_retry(
			self.retry_policy(),
			"embedding",
			Duration::from_millis(cfg.timeout_ms),
			|| self.embedding.embed(cfg, &texts),
		)
		.await?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::Retrieval {
				message: "embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(Error::Retrieval {
				message: format!(
					"embedding has {} dimensions, expected {}.",
					vector.len(),
					self.cfg.storage.qdrant.vector_dim
				),
			});
		}
		if vector.iter().any(|value| !value.is_finite()) {
			return Err(Error::Retrieval {
				message: "embedding contains non-finite values.".to_string(),
			});
		}

		Ok(vector)
	}

	async fn fetch_candidates(
		&self,
		vector: &[f32],
		must: Option<&BTreeMap<String, Vec<String>>>,
		limit: u32,
	) -> Result<Vec<StoredChunk>> {
		retry::call_with_retry(
			self.retry_policy(),
			"vector store query",
			Duration::from_millis(self.cfg.storage.qdrant.timeout_ms),
			|| self.store.query(vector, must, limit),
		)
		.await
	}

	async fn expand_neighbors(&self, ranked: &[Fused], window: u32) -> Vec<NeighborOutcome> {
		let targets = ranked
			.iter()
			.map(|fused| {
				let candidate = &fused.candidate;

				match (&candidate.source_id, candidate.position) {
					(Some(source_id), Some(position)) => Some(NeighborTarget {
						candidate_id: candidate.id.clone(),
						source_id: source_id.clone(),
						position,
						window,
					}),
					_ => None,
				}
			})
			.collect();

		neighbors::expand(
			self.store.clone(),
			targets,
			&self.cfg.search.neighbors,
			*self.retry_policy(),
			Duration::from_millis(self.cfg.storage.qdrant.timeout_ms),
		)
		.await
	}
}

// Non-finite scores and repeated ids are skipped; rank follows store order.
fn collect_candidates(chunks: Vec<StoredChunk>) -> Vec<Candidate> {
	let mut seen = HashSet::new();
	let mut out = Vec::with_capacity(chunks.len());

	for (idx, chunk) in chunks.into_iter().enumerate() {
		if !chunk.score.is_finite() {
			warn!(chunk_id = %chunk.id, "Skipping candidate with non-finite score.");

			continue;
		}
		if !seen.insert(chunk.id.clone()) {
			continue;
		}

		out.push(Candidate {
			id: chunk.id,
			text: chunk.text,
			source_id: chunk.source_id,
			position: chunk.position,
			tags: chunk.tags,
			semantic_score: chunk.score,
			retrieval_rank: idx as u32 + 1,
		});
	}

	out
}

fn build_item(fused: Fused, neighbors: NeighborOutcome) -> SearchItem {
	let matched_categories = fused.matched_categories();
	let Fused { candidate, relevance_score, category_bonus, matches } = fused;

	SearchItem {
		id: candidate.id,
		text: candidate.text,
		relevance_score,
		semantic_score: candidate.semantic_score,
		matched_categories,
		source_id: candidate.source_id,
		position: candidate.position,
		neighbors: neighbors.texts,
		neighbor_status: neighbors.status,
		explain: SearchExplain { retrieval_rank: candidate.retrieval_rank, category_bonus, matches },
	}
}
