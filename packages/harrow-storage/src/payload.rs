use std::collections::{BTreeMap, HashMap};

use qdrant_client::qdrant::{PointId, Value, point_id::PointIdOptions, value::Kind};

use crate::{
	Error, PAYLOAD_POSITION, PAYLOAD_SOURCE_ID, PAYLOAD_TAGS, PAYLOAD_TEXT, Result,
	models::StoredChunk,
};

/// Decodes one point into a chunk. Only the id is required; missing text decodes as empty.
pub fn decode_chunk(
	id: Option<&PointId>,
	payload: &HashMap<String, Value>,
	score: f32,
) -> Result<StoredChunk> {
	let id = id
		.and_then(point_id_to_string)
		.ok_or_else(|| Error::InvalidPayload("point is missing an id.".to_string()))?;
	let text = payload_string(payload, PAYLOAD_TEXT).unwrap_or_default();
	let source_id = payload_string(payload, PAYLOAD_SOURCE_ID);
	let position = payload_u32(payload, PAYLOAD_POSITION);
	let tags = payload.get(PAYLOAD_TAGS).map(decode_tags).unwrap_or_default();

	Ok(StoredChunk { id, text, source_id, position, tags, score })
}

pub fn point_id_to_string(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		Some(PointIdOptions::Num(id)) => Some(id.to_string()),
		None => None,
	}
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.clone()),
		Some(Kind::IntegerValue(value)) => Some(value.to_string()),
		_ => None,
	}
}

fn payload_u32(payload: &HashMap<String, Value>, key: &str) -> Option<u32> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => u32::try_from(*value).ok(),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 && *value >= 0.0 {
				u32::try_from(*value as i64).ok()
			} else {
				None
			},
		_ => None,
	}
}

// Accepts `{category: [values]}` and `{category: value}`; anything else is skipped.
fn decode_tags(value: &Value) -> BTreeMap<String, Vec<String>> {
	let Some(Kind::StructValue(object)) = &value.kind else {
		return BTreeMap::new();
	};
	let mut out = BTreeMap::new();

	for (category, raw) in &object.fields {
		let values: Vec<String> = match &raw.kind {
			Some(Kind::StringValue(text)) => vec![text.clone()],
			Some(Kind::ListValue(list)) => list
				.values
				.iter()
				.filter_map(|item| match &item.kind {
					Some(Kind::StringValue(text)) => Some(text.clone()),
					_ => None,
				})
				.collect(),
			_ => continue,
		};

		if !values.is_empty() {
			out.insert(category.clone(), values);
		}
	}

	out
}
