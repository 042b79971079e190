//! Where latest versions come from: strategies, the registry that assigns
//! them to applications, and the fetchers that run them

pub mod fetcher;
pub mod fetchers;
pub mod registry;
pub mod strategy;

pub use fetcher::Fetcher;
pub use registry::{SourceEntry, SourceRegistry};
pub use strategy::{PackageIndex, SourceStrategy, StrategyKind};
