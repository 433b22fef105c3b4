pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Invalid filter at {path}: {message}")]
	InvalidFilter { path: String, message: String },
	#[error("Retrieval failed: {message}")]
	Retrieval { message: String },
}
impl From<harrow_domain::FilterError> for Error {
	fn from(err: harrow_domain::FilterError) -> Self {
		Self::InvalidFilter { path: err.path, message: err.message }
	}
}

impl From<harrow_providers::Error> for Error {
	fn from(err: harrow_providers::Error) -> Self {
		Self::Retrieval { message: format!("embedding provider: {err}") }
	}
}

impl From<harrow_storage::Error> for Error {
	fn from(err: harrow_storage::Error) -> Self {
		Self::Retrieval { message: format!("vector store: {err}") }
	}
}
