use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use harrow_config::Taxonomy;

use crate::tags::{self, TagMap};

pub const MAX_FILTER_CATEGORIES: usize = 32;
pub const MAX_VALUES_PER_CATEGORY: usize = 128;
pub const MAX_VALUE_BYTES: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct FilterError {
	pub path: String,
	pub message: String,
}

/// Caller-supplied tag filter. `must` categories exclude, `should` categories only boost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
	pub must: BTreeMap<String, Vec<String>>,
	pub should: BTreeMap<String, Vec<String>>,
}
impl FilterSpec {
	pub fn is_empty(&self) -> bool {
		self.must.is_empty() && self.should.is_empty()
	}

	pub fn compile(&self, taxonomy: &Taxonomy, strict: bool) -> Result<CompiledFilter, FilterError> {
		let mut ignored = Vec::new();
		let must = compile_side(Side::Must, &self.must, taxonomy, strict, &mut ignored)?;
		let should = compile_side(Side::Should, &self.should, taxonomy, strict, &mut ignored)?;

		Ok(CompiledFilter { must, should, ignored })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
	Must,
	Should,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMatch {
	pub category: String,
	pub kind: MatchKind,
	pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
	Keep { matches: Vec<CategoryMatch>, should_matched: usize },
	Drop { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
	must: BTreeMap<String, BTreeSet<String>>,
	should: BTreeMap<String, BTreeSet<String>>,
	ignored: Vec<String>,
}
impl CompiledFilter {
	pub fn is_empty(&self) -> bool {
		self.must.is_empty() && self.should.is_empty()
	}

	pub fn must_categories(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
		self.must.iter().map(|(category, values)| (category.as_str(), values))
	}

	/// Categories left out because the taxonomy does not know them, as `must.<name>` or
	/// `should.<name>`.
	pub fn ignored_categories(&self) -> &[String] {
		&self.ignored
	}

	pub fn evaluate(&self, tags: &TagMap) -> Evaluation {
		let candidate = tags::normalize_tag_map(tags);
		let mut matches = Vec::new();

		for (category, allowed) in &self.must {
			let values = intersect(allowed, candidate.get(category));

			if values.is_empty() {
				return Evaluation::Drop { reason: format!("must:{category}") };
			}

			matches.push(CategoryMatch { category: category.clone(), kind: MatchKind::Must, values });
		}

		let mut should_matched = 0;

		for (category, preferred) in &self.should {
			let values = intersect(preferred, candidate.get(category));

			if values.is_empty() {
				continue;
			}

			should_matched += 1;

			matches.push(CategoryMatch {
				category: category.clone(),
				kind: MatchKind::Should,
				values,
			});
		}

		Evaluation::Keep { matches, should_matched }
	}
}

#[derive(Debug, Clone, Copy)]
enum Side {
	Must,
	Should,
}
impl Side {
	fn as_str(self) -> &'static str {
		match self {
			Self::Must => "must",
			Self::Should => "should",
		}
	}
}

fn compile_side(
	side: Side,
	raw: &BTreeMap<String, Vec<String>>,
	taxonomy: &Taxonomy,
	strict: bool,
	ignored: &mut Vec<String>,
) -> Result<BTreeMap<String, BTreeSet<String>>, FilterError> {
	let side_path = format!("$.filters.{}", side.as_str());

	if raw.len() > MAX_FILTER_CATEGORIES {
		return Err(FilterError {
			path: side_path,
			message: format!(
				"filter exceeds category limit ({}/{}).",
				raw.len(),
				MAX_FILTER_CATEGORIES
			),
		});
	}

	let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

	for (raw_category, values) in raw {
		let path = format!("{side_path}.{raw_category}");
		let category = tags::normalize_tag(raw_category);

		if category.is_empty() {
			return Err(FilterError {
				path,
				message: "category name must be non-empty.".to_string(),
			});
		}
		if values.len() > MAX_VALUES_PER_CATEGORY {
			return Err(FilterError {
				path,
				message: format!(
					"value list exceeds maximum size ({}/{}).",
					values.len(),
					MAX_VALUES_PER_CATEGORY
				),
			});
		}
		if let Some(index) = values.iter().position(|value| value.len() > MAX_VALUE_BYTES) {
			return Err(FilterError {
				path: format!("{path}[{index}]"),
				message: format!("value exceeds {MAX_VALUE_BYTES} bytes."),
			});
		}
		if !taxonomy.knows(&category) {
			if strict {
				return Err(FilterError {
					path,
					message: format!("category '{category}' is not in the taxonomy."),
				});
			}

			let label = format!("{}.{category}", side.as_str());

			if !ignored.contains(&label) {
				ignored.push(label);
			}

			continue;
		}

		let values = tags::normalize_values(values);

		if values.is_empty() {
			continue;
		}

		out.entry(category).or_default().extend(values);
	}

	Ok(out)
}

fn intersect(wanted: &BTreeSet<String>, present: Option<&BTreeSet<String>>) -> Vec<String> {
	let Some(present) = present else {
		return Vec::new();
	};

	wanted.intersection(present).cloned().collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn taxonomy(categories: &[&str]) -> Taxonomy {
		let mut taxonomy = Taxonomy::default();

		for category in categories {
			taxonomy.categories.insert(category.to_string(), Vec::new());
		}

		taxonomy
	}

	fn spec(must: &[(&str, &[&str])], should: &[(&str, &[&str])]) -> FilterSpec {
		let to_map = |pairs: &[(&str, &[&str])]| {
			pairs
				.iter()
				.map(|(category, values)| {
					(category.to_string(), values.iter().map(|value| value.to_string()).collect())
				})
				.collect()
		};

		FilterSpec { must: to_map(must), should: to_map(should) }
	}

	fn tags(pairs: &[(&str, &[&str])]) -> TagMap {
		pairs
			.iter()
			.map(|(category, values)| {
				(category.to_string(), values.iter().map(|value| value.to_string()).collect())
			})
			.collect()
	}

	#[test]
	fn must_drops_candidate_without_any_listed_value() {
		let filter = spec(&[("crops", &["soybean"])], &[])
			.compile(&Taxonomy::default(), false)
			.expect("compile");

		assert_eq!(
			filter.evaluate(&tags(&[("crops", &["wheat"])])),
			Evaluation::Drop { reason: "must:crops".to_string() }
		);
		assert_eq!(
			filter.evaluate(&TagMap::new()),
			Evaluation::Drop { reason: "must:crops".to_string() }
		);
	}

	#[test]
	fn must_match_is_case_insensitive_and_reported() {
		let filter = spec(&[("Crops", &["Soybean", "corn"])], &[])
			.compile(&Taxonomy::default(), false)
			.expect("compile");
		let Evaluation::Keep { matches, should_matched } =
			filter.evaluate(&tags(&[("crops", &["SOYBEAN"])]))
		else {
			panic!("expected keep");
		};

		assert_eq!(should_matched, 0);
		assert_eq!(
			matches,
			vec![CategoryMatch {
				category: "crops".to_string(),
				kind: MatchKind::Must,
				values: vec!["soybean".to_string()],
			}]
		);
	}

	#[test]
	fn should_counts_categories_not_values() {
		let filter = spec(&[], &[("pests", &["aphids", "stink bug"]), ("regions", &["wisconsin"])])
			.compile(&Taxonomy::default(), false)
			.expect("compile");
		let evaluation = filter.evaluate(&tags(&[
			("pests", &["aphids", "stink bug"]),
			("regions", &["iowa"]),
		]));

		let Evaluation::Keep { matches, should_matched } = evaluation else {
			panic!("should categories never drop");
		};

		assert_eq!(should_matched, 1);
		assert_eq!(matches[0].values, vec!["aphids".to_string(), "stink bug".to_string()]);
	}

	#[test]
	fn unknown_categories_are_ignored_unless_strict() {
		let known = taxonomy(&["crops"]);
		let raw = spec(&[("crops", &["soybean"])], &[("weather", &["rain"])]);
		let filter = raw.compile(&known, false).expect("compile");

		assert_eq!(filter.ignored_categories(), &["should.weather".to_string()]);

		let err = raw.compile(&known, true).expect_err("strict compile must fail");

		assert_eq!(err.path, "$.filters.should.weather");
	}

	#[test]
	fn empty_value_lists_are_dropped_from_the_filter() {
		let filter = spec(&[("crops", &[" "])], &[])
			.compile(&Taxonomy::default(), false)
			.expect("compile");

		assert!(filter.is_empty());
		assert!(matches!(filter.evaluate(&TagMap::new()), Evaluation::Keep { .. }));
	}

	#[test]
	fn rejects_oversized_value_lists() {
		let values: Vec<String> =
			(0..=MAX_VALUES_PER_CATEGORY).map(|index| format!("value-{index}")).collect();
		let mut raw = FilterSpec::default();

		raw.must.insert("crops".to_string(), values);

		let err = raw.compile(&Taxonomy::default(), false).expect_err("limit");

		assert_eq!(err.path, "$.filters.must.crops");
	}

	#[test]
	fn deserializes_with_missing_sides() {
		let raw: FilterSpec =
			serde_json::from_value(serde_json::json!({ "must": { "crops": ["soybean"] } }))
				.expect("decode");

		assert!(raw.should.is_empty());
		assert!(!raw.is_empty());
	}
}
