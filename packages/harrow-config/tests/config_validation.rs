use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use harrow_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_value() -> Value {
	toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.")
}

fn with_table(value: &mut Value, path: &[&str], key: &str, item: Value) {
	let mut table = value.as_table_mut().expect("Sample config must be a table.");

	for segment in path {
		table = table
			.get_mut(*segment)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{segment}]."));
	}

	table.insert(key.to_string(), item);
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now().duration_since(UNIX_EPOCH).expect("Clock before epoch.").as_nanos();
	let seq = COUNTER.fetch_add(1, Ordering::SeqCst);
	let path = env::temp_dir().join(format!("harrow_config_{nanos}_{seq}.toml"));

	fs::write(&path, payload).expect("Failed to write temp config.");

	path
}

fn load_value(value: &Value) -> harrow_config::Result<Config> {
	let path = write_temp_config(toml::to_string(value).expect("Failed to render config."));
	let result = harrow_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove temp config.");

	result
}

fn expect_validation(value: &Value, needle: &str) {
	match load_value(value) {
		Err(Error::Validation { message }) => assert!(
			message.contains(needle),
			"Unexpected validation message: {message}"
		),
		other => panic!("Expected validation error containing {needle:?}, got {other:?}"),
	}
}

#[test]
fn sample_config_loads_and_normalizes() {
	let cfg = load_value(&sample_value()).expect("Sample config must load.");

	assert_eq!(cfg.security.api_auth_token, None);
	assert_eq!(cfg.storage.qdrant.vector_name.as_deref(), Some("dense"));
	assert_eq!(
		cfg.taxonomy.categories.get("crops"),
		Some(&vec!["soybeans".to_string(), "wheat".to_string()])
	);
	assert!(cfg.taxonomy.knows("regions"));
	assert!(!cfg.taxonomy.knows("pests"));
}

#[test]
fn taxonomy_labels_fold_compatibility_forms() {
	let mut value = sample_value();
	let categories = Value::Array(vec![Value::String("Ｓｏｙｂｅａｎｓ".to_string())]);

	with_table(&mut value, &["taxonomy", "categories"], "Ｃｒｏｐｓ", categories);

	let cfg = load_value(&value).expect("Full-width taxonomy labels must load.");

	assert!(cfg.taxonomy.knows("crops"));
	assert_eq!(
		cfg.taxonomy.categories.get("crops"),
		Some(&vec!["soybeans".to_string(), "wheat".to_string()])
	);
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let mut value = sample_value();

	with_table(&mut value, &["providers", "embedding"], "dimensions", Value::Integer(16));

	expect_validation(&value, "must match storage.qdrant.vector_dim");
}

#[test]
fn top_k_must_be_positive_and_bounded() {
	let mut value = sample_value();

	with_table(&mut value, &["search"], "top_k", Value::Integer(0));

	expect_validation(&value, "search.top_k");

	let mut value = sample_value();

	with_table(&mut value, &["search"], "top_k", Value::Integer(60));

	expect_validation(&value, "search.max_top_k");
}

#[test]
fn should_bonus_must_be_positive() {
	let mut value = sample_value();

	with_table(&mut value, &["ranking"], "should_bonus", Value::Float(-0.5));

	expect_validation(&value, "ranking.should_bonus");

	let mut value = sample_value();

	with_table(&mut value, &["ranking"], "should_bonus", Value::Float(0.0));

	expect_validation(&value, "ranking.should_bonus");
}

#[test]
fn retry_backoff_bounds_are_ordered() {
	let mut value = sample_value();

	with_table(&mut value, &["retry"], "initial_backoff_ms", Value::Integer(5_000));

	expect_validation(&value, "retry.initial_backoff_ms");
}

#[test]
fn neighbor_window_is_capped() {
	let mut value = sample_value();

	with_table(&mut value, &["search", "neighbors"], "window", Value::Integer(9));

	expect_validation(&value, "search.neighbors.window");
}

#[test]
fn strict_filters_require_taxonomy() {
	let mut value = sample_value();

	with_table(&mut value, &["search"], "strict_filters", Value::Boolean(true));

	assert!(load_value(&value).is_ok());

	value.as_table_mut().expect("Sample config must be a table.").remove("taxonomy");

	expect_validation(&value, "search.strict_filters");
}

#[test]
fn optional_sections_fall_back_to_defaults() {
	let mut value = sample_value();
	let root = value.as_table_mut().expect("Sample config must be a table.");

	root.remove("ranking");
	root.remove("retry");
	root.remove("prompt");

	let cfg = load_value(&value).expect("Config without optional sections must load.");

	assert_eq!(cfg.retry.max_attempts, 3);
	assert!((cfg.ranking.should_bonus - 0.1).abs() < f32::EPSILON);
	assert_eq!(cfg.prompt.max_context_chars, 12_000);
}

#[test]
fn missing_file_reports_read_error() {
	let path = env::temp_dir().join("harrow_config_missing_file.toml");
	let err = harrow_config::load(&path).expect_err("Missing file must fail.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}
