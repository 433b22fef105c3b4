use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Embedding request timed out after {timeout_ms} ms.")]
	Timeout { timeout_ms: u64 },
	#[error("Embedding provider returned {status}: {message}")]
	Status { status: StatusCode, message: String },
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	/// Timeouts, rate limits, server errors, and dropped connections may succeed on retry.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Timeout { .. } => true,
			Self::Status { status, .. } => is_transient_status(*status),
			Self::Reqwest(err) =>
				err.is_timeout() || err.is_connect() || err.status().is_some_and(is_transient_status),
			_ => false,
		}
	}
}

fn is_transient_status(status: StatusCode) -> bool {
	status == StatusCode::REQUEST_TIMEOUT
		|| status == StatusCode::TOO_MANY_REQUESTS
		|| status.is_server_error()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_status_codes() {
		let status = |code: u16| Error::Status {
			status: StatusCode::from_u16(code).expect("valid status"),
			message: String::new(),
		};

		assert!(status(408).is_transient());
		assert!(status(429).is_transient());
		assert!(status(503).is_transient());
		assert!(!status(400).is_transient());
		assert!(!status(401).is_transient());
		assert!(Error::Timeout { timeout_ms: 10 }.is_transient());
		assert!(!Error::InvalidResponse { message: "bad".to_string() }.is_transient());
	}
}
