use std::{collections::BTreeSet, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{
	sync::Semaphore,
	task::JoinSet,
	time::{self, Instant},
};
use tracing::warn;

use harrow_config::SearchNeighbors;
use harrow_storage::models::StoredChunk;

use crate::{Result, VectorStore, retry, retry::RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborStatus {
	/// Neighbor lookup ran; `neighbors` may still be empty at the edges of a source.
	Attached,
	/// Expansion was disabled or the result has no source position.
	Skipped,
	TimedOut,
	Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborText {
	pub id: String,
	pub position: u32,
	pub text: String,
}

#[derive(Debug, Clone)]
pub struct NeighborTarget {
	pub candidate_id: String,
	pub source_id: String,
	pub position: u32,
	pub window: u32,
}
impl NeighborTarget {
	/// Positions within `window` of the candidate, excluding its own and never below zero.
	pub fn positions(&self) -> Vec<u32> {
		let start = self.position.saturating_sub(self.window);
		let end = self.position.saturating_add(self.window);

		(start..=end).filter(|position| *position != self.position).collect()
	}
}

#[derive(Debug, Clone)]
pub struct NeighborOutcome {
	pub status: NeighborStatus,
	pub texts: Vec<NeighborText>,
}
impl NeighborOutcome {
	pub fn skipped() -> Self {
		Self { status: NeighborStatus::Skipped, texts: Vec::new() }
	}

	fn with_status(status: NeighborStatus) -> Self {
		Self { status, texts: Vec::new() }
	}
}

/// Fetches neighbors for every target concurrently.
///
/// At most `cfg.max_concurrency` fetches run at once and all of them share one deadline of
/// `cfg.deadline_ms`. Output is aligned with `targets`; `None` targets are skipped.
pub async fn expand(
	store: Arc<dyn VectorStore>,
	targets: Vec<Option<NeighborTarget>>,
	cfg: &SearchNeighbors,
	retry_policy: RetryPolicy,
	call_timeout: Duration,
) -> Vec<NeighborOutcome> {
	let mut outcomes = vec![NeighborOutcome::skipped(); targets.len()];
	let mut pending = BTreeSet::new();
	let permits = Arc::new(Semaphore::new(cfg.max_concurrency.max(1)));
	let mut tasks = JoinSet::new();

	for (index, target) in targets.into_iter().enumerate() {
		let Some(target) = target else {
			continue;
		};
		let store = store.clone();
		let permits = permits.clone();

		pending.insert(index);
		tasks.spawn(async move {
			let result = match permits.acquire_owned().await {
				Ok(_permit) => fetch_one(store.as_ref(), &target, &retry_policy, call_timeout).await,
				Err(_) => Err(crate::Error::Retrieval {
					message: "neighbor semaphore closed.".to_string(),
				}),
			};

			(index, result)
		});
	}

	let deadline = Instant::now() + Duration::from_millis(cfg.deadline_ms);

	loop {
		match time::timeout_at(deadline, tasks.join_next()).await {
			Ok(Some(Ok((index, Ok(texts))))) => {
				pending.remove(&index);

				outcomes[index] = NeighborOutcome { status: NeighborStatus::Attached, texts };
			},
			Ok(Some(Ok((index, Err(err))))) => {
				pending.remove(&index);

				warn!(error = %err, "Neighbor fetch failed.");

				outcomes[index] = NeighborOutcome::with_status(NeighborStatus::Failed);
			},
			Ok(Some(Err(err))) => {
				warn!(error = %err, "Neighbor task did not complete.");
			},
			Ok(None) => {
				// Only tasks that panicked or were cancelled remain.
				for index in pending {
					outcomes[index] = NeighborOutcome::with_status(NeighborStatus::Failed);
				}

				break;
			},
			Err(_) => {
				warn!(
					pending = pending.len(),
					deadline_ms = cfg.deadline_ms,
					"Neighbor fetch deadline reached."
				);

				tasks.abort_all();

				for index in pending {
					outcomes[index] = NeighborOutcome::with_status(NeighborStatus::TimedOut);
				}

				break;
			},
		}
	}

	outcomes
}

async fn fetch_one(
	store: &dyn VectorStore,
	target: &NeighborTarget,
	retry_policy: &RetryPolicy,
	call_timeout: Duration,
) -> Result<Vec<NeighborText>> {
	let positions = target.positions();

	if positions.is_empty() {
		return Ok(Vec::new());
	}

	let chunks = retry::call_with_retry(retry_policy, "neighbor fetch", call_timeout, || {
		store.fetch_neighbors(&target.source_id, &positions)
	})
	.await?;

	Ok(order_neighbors(target, &positions, chunks))
}

// Keeps one chunk per requested position, in position order.
fn order_neighbors(
	target: &NeighborTarget,
	positions: &[u32],
	chunks: Vec<StoredChunk>,
) -> Vec<NeighborText> {
	let mut seen = BTreeSet::new();
	let mut out: Vec<NeighborText> = chunks
		.into_iter()
		.filter(|chunk| chunk.id != target.candidate_id)
		.filter(|chunk| chunk.source_id.as_deref() == Some(target.source_id.as_str()))
		.filter_map(|chunk| {
			let position = chunk.position.filter(|position| positions.contains(position))?;

			Some(NeighborText { id: chunk.id, position, text: chunk.text })
		})
		.collect();

	out.sort_by(|left, right| {
		left.position.cmp(&right.position).then_with(|| left.id.cmp(&right.id))
	});
	out.retain(|neighbor| seen.insert(neighbor.position));

	out
}
