pub mod models;
pub mod payload;
pub mod qdrant;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub const PAYLOAD_TEXT: &str = "text";
pub const PAYLOAD_SOURCE_ID: &str = "source_id";
pub const PAYLOAD_POSITION: &str = "position";
pub const PAYLOAD_TAGS: &str = "tags";
