use std::collections::BTreeMap;

/// A chunk point read back from the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
	pub id: String,
	pub text: String,
	pub source_id: Option<String>,
	pub position: Option<u32>,
	pub tags: BTreeMap<String, Vec<String>>,
	/// Similarity reported by the store. Zero for points read by scroll.
	pub score: f32,
}
