use std::{collections::BTreeMap, time::Duration};

use serde::Serialize;

use harrow_config::Taxonomy;
use harrow_service::{Fuser, retry};
use harrow_storage::models::StoredChunk;

const TOP_VALUES: usize = 10;

#[derive(Debug, Serialize)]
pub struct InspectReport {
	pub collection: String,
	pub sampled: usize,
	pub missing_text: usize,
	pub missing_position: usize,
	pub missing_source_id: usize,
	pub categories: Vec<CategoryCoverage>,
}

#[derive(Debug, Serialize)]
pub struct CategoryCoverage {
	pub category: String,
	pub in_taxonomy: bool,
	pub points_with_values: usize,
	pub coverage: f64,
	pub distinct_values: usize,
	pub top_values: Vec<ValueCount>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ValueCount {
	pub value: String,
	pub count: usize,
}

/// Samples up to `sample` stored points and reports how well they are tagged.
pub async fn inspect(service: &Fuser, sample: u32) -> harrow_service::Result<InspectReport> {
	let qdrant = &service.cfg.storage.qdrant;
	let chunks = retry::call_with_retry(
		service.retry_policy(),
		"vector store sample",
		Duration::from_millis(qdrant.timeout_ms),
		|| service.store.sample(sample),
	)
	.await?;

	Ok(coverage(&qdrant.collection, &service.cfg.taxonomy, &chunks))
}

/// Taxonomy categories are always listed, so an unused category shows up with zero coverage.
pub fn coverage(collection: &str, taxonomy: &Taxonomy, chunks: &[StoredChunk]) -> InspectReport {
	let mut points: BTreeMap<String, usize> =
		taxonomy.categories.keys().map(|category| (category.clone(), 0)).collect();
	let mut values: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

	for chunk in chunks {
		for (category, tagged) in harrow_domain::tags::normalize_tag_map(&chunk.tags) {
			*points.entry(category.clone()).or_default() += 1;

			let counts = values.entry(category).or_default();

			for value in tagged {
				*counts.entry(value).or_default() += 1;
			}
		}
	}

	let sampled = chunks.len();
	let categories = points
		.into_iter()
		.map(|(category, points_with_values)| {
			let counts = values.remove(&category).unwrap_or_default();

			CategoryCoverage {
				in_taxonomy: taxonomy.categories.contains_key(&category),
				points_with_values,
				coverage: if sampled == 0 {
					0.0
				} else {
					points_with_values as f64 / sampled as f64
				},
				distinct_values: counts.len(),
				top_values: top_values(counts),
				category,
			}
		})
		.collect();

	InspectReport {
		collection: collection.to_string(),
		sampled,
		missing_text: chunks.iter().filter(|chunk| chunk.text.trim().is_empty()).count(),
		missing_position: chunks.iter().filter(|chunk| chunk.position.is_none()).count(),
		missing_source_id: chunks.iter().filter(|chunk| chunk.source_id.is_none()).count(),
		categories,
	}
}

fn top_values(counts: BTreeMap<String, usize>) -> Vec<ValueCount> {
	let mut out: Vec<ValueCount> =
		counts.into_iter().map(|(value, count)| ValueCount { value, count }).collect();

	// Stable sort keeps ties in value order.
	out.sort_by(|left, right| right.count.cmp(&left.count));
	out.truncate(TOP_VALUES);

	out
}

#[cfg(test)]
mod tests {
	use harrow_testkit::ChunkBuilder;

	use super::*;

	#[test]
	fn counts_points_and_values_per_category() {
		let mut taxonomy = Taxonomy::default();

		taxonomy.categories.insert("crops".to_string(), vec!["wheat".to_string()]);
		taxonomy.categories.insert("regions".to_string(), Vec::new());

		let chunks = vec![
			ChunkBuilder::new("a", 0.0).at("doc", 0).tag("crops", &["Wheat", "soybeans"]).build(),
			ChunkBuilder::new("b", 0.0).tag("crops", &["wheat"]).tag("pests", &["aphids"]).build(),
			ChunkBuilder::new("c", 0.0).text(" ").build(),
		];
		let report = coverage("harrow", &taxonomy, &chunks);
		let names: Vec<&str> =
			report.categories.iter().map(|category| category.category.as_str()).collect();

		assert_eq!(names, vec!["crops", "pests", "regions"]);
		assert_eq!(report.sampled, 3);
		assert_eq!(report.missing_text, 1);
		assert_eq!(report.missing_source_id, 2);
		assert_eq!(report.missing_position, 2);

		let crops = &report.categories[0];

		assert_eq!(crops.points_with_values, 2);
		assert_eq!(crops.distinct_values, 2);
		assert_eq!(crops.top_values[0], ValueCount { value: "wheat".to_string(), count: 2 });
		assert!(!report.categories[1].in_taxonomy);
		assert_eq!(report.categories[2].points_with_values, 0);
	}
}
