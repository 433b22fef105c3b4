pub mod filter;
pub mod fusion;
pub mod tags;

pub use filter::{CategoryMatch, CompiledFilter, Evaluation, FilterError, FilterSpec, MatchKind};
pub use fusion::{Candidate, DropReason, FilterImpact, Fused, FusionOutcome, fuse};
pub use tags::TagMap;
