use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};

use crate::{
	filter::{CategoryMatch, CompiledFilter, Evaluation},
	tags::TagMap,
};

const MAX_DROP_REASONS: usize = 5;

/// One chunk returned by the vector store, before fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
	pub id: String,
	pub text: String,
	pub source_id: Option<String>,
	pub position: Option<u32>,
	pub tags: TagMap,
	pub semantic_score: f32,
	/// 1-based rank in the store response.
	pub retrieval_rank: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fused {
	pub candidate: Candidate,
	pub relevance_score: f32,
	pub category_bonus: f32,
	pub matches: Vec<CategoryMatch>,
}
impl Fused {
	pub fn matched_categories(&self) -> Vec<String> {
		let mut categories: Vec<String> =
			self.matches.iter().map(|matched| matched.category.clone()).collect();

		categories.sort();
		categories.dedup();

		categories
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropReason {
	pub reason: String,
	pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterImpact {
	pub candidate_count_pre: usize,
	pub candidate_count_post: usize,
	pub dropped_total: usize,
	pub top_drop_reasons: Vec<DropReason>,
}

#[derive(Debug, Clone, Default)]
pub struct FusionOutcome {
	pub ranked: Vec<Fused>,
	/// Present only when a filter was applied.
	pub impact: Option<FilterImpact>,
}

/// Applies `must` exclusion, scores `should` matches, and keeps the best `top_k`.
///
/// `relevance_score = semantic_score + should_bonus * matched_should_categories`. Ties fall back
/// to the semantic score and then to the id, so the output is a pure function of the inputs.
pub fn fuse(
	candidates: Vec<Candidate>,
	filter: Option<&CompiledFilter>,
	should_bonus: f32,
	top_k: usize,
) -> FusionOutcome {
	let candidate_count_pre = candidates.len();
	let mut drop_counts: HashMap<String, usize> = HashMap::new();
	let mut ranked = Vec::with_capacity(candidates.len());

	for candidate in candidates {
		let (matches, should_matched) = match filter.map(|filter| filter.evaluate(&candidate.tags))
		{
			None => (Vec::new(), 0),
			Some(Evaluation::Keep { matches, should_matched }) => (matches, should_matched),
			Some(Evaluation::Drop { reason }) => {
				*drop_counts.entry(reason).or_insert(0) += 1;

				continue;
			},
		};
		let category_bonus = should_bonus * should_matched as f32;
		let relevance_score = candidate.semantic_score + category_bonus;

		ranked.push(Fused { candidate, relevance_score, category_bonus, matches });
	}

	let candidate_count_post = ranked.len();

	ranked.sort_by(compare_fused);
	ranked.truncate(top_k);

	let impact = filter.map(|_| FilterImpact {
		candidate_count_pre,
		candidate_count_post,
		dropped_total: candidate_count_pre - candidate_count_post,
		top_drop_reasons: top_drop_reasons(drop_counts),
	});

	FusionOutcome { ranked, impact }
}

fn compare_fused(left: &Fused, right: &Fused) -> Ordering {
	right
		.relevance_score
		.total_cmp(&left.relevance_score)
		.then_with(|| right.candidate.semantic_score.total_cmp(&left.candidate.semantic_score))
		.then_with(|| left.candidate.id.cmp(&right.candidate.id))
}

fn top_drop_reasons(counts: HashMap<String, usize>) -> Vec<DropReason> {
	let mut reasons: Vec<DropReason> =
		counts.into_iter().map(|(reason, count)| DropReason { reason, count }).collect();

	reasons.sort_by(|left, right| {
		right.count.cmp(&left.count).then_with(|| left.reason.cmp(&right.reason))
	});
	reasons.truncate(MAX_DROP_REASONS);

	reasons
}

#[cfg(test)]
mod tests {
	use super::*;

	fn candidate(id: &str, score: f32) -> Candidate {
		Candidate {
			id: id.to_string(),
			text: format!("text {id}"),
			source_id: None,
			position: None,
			tags: TagMap::new(),
			semantic_score: score,
			retrieval_rank: 0,
		}
	}

	#[test]
	fn equal_scores_break_ties_by_id() {
		let outcome = fuse(vec![candidate("b", 0.5), candidate("a", 0.5)], None, 0.1, 10);
		let ids: Vec<&str> = outcome.ranked.iter().map(|item| item.candidate.id.as_str()).collect();

		assert_eq!(ids, vec!["a", "b"]);
		assert!(outcome.impact.is_none());
	}

	#[test]
	fn drop_reasons_are_capped_and_ordered() {
		let mut counts = HashMap::new();

		for (index, reason) in ["must:a", "must:b", "must:c", "must:d", "must:e", "must:f"]
			.iter()
			.enumerate()
		{
			counts.insert(reason.to_string(), index % 2 + 1);
		}

		let reasons = top_drop_reasons(counts);

		assert_eq!(reasons.len(), MAX_DROP_REASONS);
		assert_eq!(reasons[0], DropReason { reason: "must:b".to_string(), count: 2 });
		assert_eq!(reasons[3].count, 1);
		assert_eq!(reasons[3].reason, "must:a");
	}

	#[test]
	fn top_k_zero_returns_nothing() {
		let outcome = fuse(vec![candidate("a", 0.9)], None, 0.1, 0);

		assert!(outcome.ranked.is_empty());
	}
}
