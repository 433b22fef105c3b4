mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Prompt, Providers, Qdrant, Ranking, Retry, Search,
	SearchNeighbors, Security, Service, Storage, Taxonomy,
};

use std::{collections::BTreeMap, fs, path::Path};

use unicode_normalization::UnicodeNormalization;

pub const MAX_NEIGHBOR_WINDOW: u32 = 8;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}

	validate_search(cfg)?;

	if cfg.ranking.should_bonus <= 0.0 {
		return Err(Error::Validation {
			message: "ranking.should_bonus must be greater than zero.".to_string(),
		});
	}
	if !cfg.ranking.should_bonus.is_finite() {
		return Err(Error::Validation {
			message: "ranking.should_bonus must be a finite number.".to_string(),
		});
	}
	if cfg.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.retry.initial_backoff_ms > cfg.retry.max_backoff_ms {
		return Err(Error::Validation {
			message: "retry.initial_backoff_ms must not exceed retry.max_backoff_ms.".to_string(),
		});
	}
	if cfg.prompt.max_context_chars == 0 {
		return Err(Error::Validation {
			message: "prompt.max_context_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.taxonomy.categories.keys().any(|category| category.trim().is_empty()) {
		return Err(Error::Validation {
			message: "taxonomy.categories keys must be non-empty.".to_string(),
		});
	}
	if cfg.search.strict_filters && cfg.taxonomy.is_open() {
		return Err(Error::Validation {
			message: "search.strict_filters requires a non-empty taxonomy.categories table."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_search(cfg: &Config) -> Result<()> {
	let search = &cfg.search;

	if search.top_k == 0 {
		return Err(Error::Validation {
			message: "search.top_k must be greater than zero.".to_string(),
		});
	}
	if search.max_top_k < search.top_k {
		return Err(Error::Validation {
			message: "search.max_top_k must be greater than or equal to search.top_k.".to_string(),
		});
	}
	if search.overfetch_factor == 0 {
		return Err(Error::Validation {
			message: "search.overfetch_factor must be greater than zero.".to_string(),
		});
	}
	if search.max_candidates < search.max_top_k {
		return Err(Error::Validation {
			message: "search.max_candidates must be greater than or equal to search.max_top_k."
				.to_string(),
		});
	}
	if search.request_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "search.request_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if search.neighbors.window > MAX_NEIGHBOR_WINDOW {
		return Err(Error::Validation {
			message: format!("search.neighbors.window must be {MAX_NEIGHBOR_WINDOW} or less."),
		});
	}
	if search.neighbors.deadline_ms == 0 {
		return Err(Error::Validation {
			message: "search.neighbors.deadline_ms must be greater than zero.".to_string(),
		});
	}
	if search.neighbors.max_concurrency == 0 {
		return Err(Error::Validation {
			message: "search.neighbors.max_concurrency must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}
	if cfg.storage.qdrant.vector_name.as_deref().map(|name| name.trim().is_empty()).unwrap_or(false)
	{
		cfg.storage.qdrant.vector_name = None;
	}

	let categories = std::mem::take(&mut cfg.taxonomy.categories);
	let mut normalized: BTreeMap<String, Vec<String>> = BTreeMap::new();

	for (category, values) in categories {
		let entry = normalized.entry(normalize_label(&category)).or_default();

		for value in values {
			let value = normalize_label(&value);

			if !value.is_empty() && !entry.contains(&value) {
				entry.push(value);
			}
		}
	}

	cfg.taxonomy.categories = normalized;
}

// Same folding as tag normalization in the domain crate, which depends on this one.
fn normalize_label(raw: &str) -> String {
	raw.nfkc().collect::<String>().trim().to_lowercase()
}
