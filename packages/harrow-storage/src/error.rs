#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Invalid payload: {0}")]
	InvalidPayload(String),
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
}
impl Error {
	/// gRPC codes that may clear on retry: DEADLINE_EXCEEDED, RESOURCE_EXHAUSTED, ABORTED,
	/// INTERNAL, UNAVAILABLE. The client lifts RESOURCE_EXHAUSTED with a `retry-after` header into
	/// its own variant, and transport I/O failures surface as `Io`.
	pub fn is_transient(&self) -> bool {
		let Self::Qdrant(err) = self else {
			return false;
		};

		match err.as_ref() {
			qdrant_client::QdrantError::ResponseError { status } =>
				matches!(status.code() as i32, 4 | 8 | 10 | 13 | 14),
			qdrant_client::QdrantError::ResourceExhaustedError { .. }
			| qdrant_client::QdrantError::Io(_) => true,
			_ => false,
		}
	}
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn argument_errors_are_permanent() {
		assert!(!Error::InvalidArgument("limit".to_string()).is_transient());
		assert!(!Error::InvalidPayload("tags".to_string()).is_transient());
	}

	#[test]
	fn rate_limited_responses_are_transient() {
		let mut status = tonic::Status::resource_exhausted("rate limited");

		status.metadata_mut().insert("retry-after", tonic::metadata::MetadataValue::from_static("1"));

		let err = qdrant_client::QdrantError::from(status);

		assert!(matches!(
			err,
			qdrant_client::QdrantError::ResourceExhaustedError { retry_after_seconds: 1, .. }
		));
		assert!(Error::from(err).is_transient());
	}

	#[test]
	fn plain_status_codes_follow_the_retry_table() {
		let unavailable = qdrant_client::QdrantError::from(tonic::Status::unavailable("down"));
		let missing = qdrant_client::QdrantError::from(tonic::Status::not_found("collection"));

		assert!(Error::from(unavailable).is_transient());
		assert!(!Error::from(missing).is_transient());
	}

	#[test]
	fn io_failures_are_transient() {
		let err = qdrant_client::QdrantError::from(std::io::Error::from(
			std::io::ErrorKind::ConnectionReset,
		));

		assert!(Error::from(err).is_transient());
	}
}
