use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Fuser, Result, SearchItem, SearchRequest};

const PROMPT_HEADER: &str =
	"Using the following contexts, answer the query. Contexts are ordered by relevance and include neighbors:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResponse {
	pub trace_id: Uuid,
	pub prompt: String,
	pub items: Vec<SearchItem>,
}

impl Fuser {
	/// Runs [`Fuser::search`] and renders the results as a prompt-ready context.
	pub async fn context(&self, req: SearchRequest) -> Result<ContextResponse> {
		let query = req.query.trim().to_string();
		let response = self.search(req).await?;
		let prompt = build_prompt(&query, &response.items, self.cfg.prompt.max_context_chars);

		Ok(ContextResponse { trace_id: response.trace_id, prompt, items: response.items })
	}
}

/// Numbers the items in relevance order and appends the query.
///
/// The blocks together stay within `max_context_chars`. A block that would overflow the budget
/// is left out whole and later, shorter blocks may still fit.
pub fn build_prompt(query: &str, items: &[SearchItem], max_context_chars: usize) -> String {
	let mut blocks = String::new();
	let mut used = 0;
	let mut number = 0;

	for item in items {
		let block = render_block(number + 1, item);
		let len = block.chars().count();

		if used + len > max_context_chars {
			continue;
		}

		number += 1;
		used += len;

		blocks.push_str(&block);
	}

	format!("{PROMPT_HEADER}\n\n{blocks}Query: {query}")
}

fn render_block(number: usize, item: &SearchItem) -> String {
	let mut block = format!("Context {number}:\nRelevance Score: {:.2}\n", item.relevance_score);

	if !item.matched_categories.is_empty() {
		block.push_str(&format!("Matched Categories: {}\n", item.matched_categories.join(", ")));
	}

	block.push_str(&format!("Text: {}\n---\n", stitch_text(item)));

	block
}

// Candidate text and neighbor texts joined in position order.
fn stitch_text(item: &SearchItem) -> String {
	let Some(position) = item.position else {
		return item.text.clone();
	};
	let mut parts: Vec<(u32, &str)> =
		item.neighbors.iter().map(|neighbor| (neighbor.position, neighbor.text.as_str())).collect();

	parts.push((position, item.text.as_str()));
	parts.sort_by_key(|(position, _)| *position);

	parts
		.into_iter()
		.map(|(_, text)| text.trim())
		.filter(|text| !text.is_empty())
		.collect::<Vec<_>>()
		.join(" ")
}
