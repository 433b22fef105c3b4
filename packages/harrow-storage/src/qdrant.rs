use std::{collections::BTreeMap, time::Duration};

use qdrant_client::qdrant::{
	Condition, Filter, PointId, Query, QueryPointsBuilder, ScrollPointsBuilder,
};
use tracing::warn;

use crate::{
	Error, PAYLOAD_POSITION, PAYLOAD_SOURCE_ID, PAYLOAD_TAGS, Result, models::StoredChunk, payload,
};

const MAX_SCROLL_PAGE: u32 = 256;

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_name: Option<String>,
}
impl QdrantStore {
	pub fn new(cfg: &harrow_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url)
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.build()?;

		Ok(Self {
			client,
			collection: cfg.collection.clone(),
			vector_name: cfg.vector_name.clone(),
		})
	}

	/// Nearest-neighbor query. When `must` is given, each category becomes a keyword match on
	/// `tags.<category>`; values must already be normalized in the payload for this to agree with
	/// the in-process filter.
	pub async fn search(
		&self,
		vector: &[f32],
		must: Option<&BTreeMap<String, Vec<String>>>,
		limit: u32,
	) -> Result<Vec<StoredChunk>> {
		if limit == 0 {
			return Err(Error::InvalidArgument("search limit must be greater than zero.".to_string()));
		}

		let mut query = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.with_payload(true)
			.limit(limit as u64);

		if let Some(name) = self.vector_name.as_deref() {
			query = query.using(name);
		}
		if let Some(must) = must.filter(|must| !must.is_empty()) {
			query = query.filter(Filter::must(must_conditions(must)));
		}

		let response = self.client.query(query).await?;
		let chunks = response
			.result
			.iter()
			.filter_map(|point| {
				match payload::decode_chunk(point.id.as_ref(), &point.payload, point.score) {
					Ok(chunk) => Some(chunk),
					Err(err) => {
						warn!(error = %err, "Skipping malformed search point.");

						None
					},
				}
			})
			.collect();

		Ok(chunks)
	}

	/// Reads the chunks of `source_id` at the given positions. Absent positions are not an error.
	pub async fn fetch_neighbors(
		&self,
		source_id: &str,
		positions: &[u32],
	) -> Result<Vec<StoredChunk>> {
		if positions.is_empty() {
			return Ok(Vec::new());
		}

		let limit = positions.len() as u32;
		let positions: Vec<i64> = positions.iter().map(|position| i64::from(*position)).collect();
		let filter = Filter::must([
			Condition::matches(PAYLOAD_SOURCE_ID, source_id.to_string()),
			Condition::matches(PAYLOAD_POSITION, positions),
		]);
		let scroll = ScrollPointsBuilder::new(self.collection.clone())
			.filter(filter)
			.with_payload(true)
			.limit(limit);

		self.scroll_chunks(scroll).await
	}

	/// Reads up to `limit` points in collection order, for payload inspection.
	pub async fn sample(&self, limit: u32) -> Result<Vec<StoredChunk>> {
		let mut out = Vec::new();
		let mut offset: Option<PointId> = None;

		while (out.len() as u32) < limit {
			let page = (limit - out.len() as u32).min(MAX_SCROLL_PAGE);
			let mut scroll =
				ScrollPointsBuilder::new(self.collection.clone()).with_payload(true).limit(page);

			if let Some(offset) = offset.take() {
				scroll = scroll.offset(offset);
			}

			let response = self.client.scroll(scroll).await?;

			for point in &response.result {
				match payload::decode_chunk(point.id.as_ref(), &point.payload, 0.0) {
					Ok(chunk) => out.push(chunk),
					Err(err) => warn!(error = %err, "Skipping malformed sampled point."),
				}
			}

			match response.next_page_offset {
				Some(next) if !response.result.is_empty() => offset = Some(next),
				_ => break,
			}
		}

		out.truncate(limit as usize);

		Ok(out)
	}

	async fn scroll_chunks(&self, scroll: ScrollPointsBuilder) -> Result<Vec<StoredChunk>> {
		let response = self.client.scroll(scroll).await?;
		let chunks = response
			.result
			.iter()
			.filter_map(|point| match payload::decode_chunk(point.id.as_ref(), &point.payload, 0.0) {
				Ok(chunk) => Some(chunk),
				Err(err) => {
					warn!(error = %err, "Skipping malformed neighbor point.");

					None
				},
			})
			.collect();

		Ok(chunks)
	}
}

fn must_conditions(must: &BTreeMap<String, Vec<String>>) -> Vec<Condition> {
	must.iter()
		.map(|(category, values)| {
			Condition::matches(format!("{PAYLOAD_TAGS}.{category}"), values.clone())
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn must_conditions_target_tag_fields() {
		let mut must = BTreeMap::new();

		must.insert("crops".to_string(), vec!["soybean".to_string()]);
		must.insert("regions".to_string(), vec!["iowa".to_string(), "ohio".to_string()]);

		let conditions = must_conditions(&must);

		assert_eq!(conditions.len(), 2);
		assert!(format!("{:?}", conditions[0]).contains("tags.crops"));
		assert!(format!("{:?}", conditions[1]).contains("tags.regions"));
	}
}
