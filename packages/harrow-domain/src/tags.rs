use std::collections::{BTreeMap, BTreeSet};

use unicode_normalization::UnicodeNormalization;

/// Tag category name to the tag values recorded for it.
pub type TagMap = BTreeMap<String, Vec<String>>;

pub fn normalize_tag(raw: &str) -> String {
	raw.nfkc().collect::<String>().trim().to_lowercase()
}

pub fn normalize_values<'a, I>(values: I) -> BTreeSet<String>
where
	I: IntoIterator<Item = &'a String>,
{
	values.into_iter().map(|value| normalize_tag(value)).filter(|value| !value.is_empty()).collect()
}

/// Categories with no usable values are left out.
pub fn normalize_tag_map(tags: &TagMap) -> BTreeMap<String, BTreeSet<String>> {
	let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

	for (category, values) in tags {
		let category = normalize_tag(category);

		if category.is_empty() {
			continue;
		}

		let values = normalize_values(values);

		if values.is_empty() {
			continue;
		}

		out.entry(category).or_default().extend(values);
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalizes_case_width_and_whitespace() {
		assert_eq!(normalize_tag("  Soybeans "), "soybeans");
		assert_eq!(normalize_tag("ＩＰＭ"), "ipm");
		assert_eq!(normalize_tag("   "), "");
	}

	#[test]
	fn tag_map_merges_categories_that_normalize_equal() {
		let mut tags = TagMap::new();

		tags.insert("Crops".to_string(), vec!["Soybeans".to_string()]);
		tags.insert("crops ".to_string(), vec!["wheat".to_string(), " ".to_string()]);
		tags.insert("regions".to_string(), vec!["".to_string()]);

		let normalized = normalize_tag_map(&tags);

		assert_eq!(normalized.len(), 1);
		assert_eq!(
			normalized.get("crops").map(|values| values.iter().cloned().collect::<Vec<_>>()),
			Some(vec!["soybeans".to_string(), "wheat".to_string()])
		);
	}
}
