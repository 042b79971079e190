//! Resolution of latest versions: scheduling, retries, rate limiting, caching

pub mod cache;
pub mod outcome;
pub mod rate_limit;
pub mod scheduler;

pub use cache::{MemoryStore, OutcomeStore, ResolutionCache, SqliteStore};
pub use outcome::{ResolutionOutcome, UnresolvedReason};
pub use scheduler::{ResolutionSettings, Resolver};
