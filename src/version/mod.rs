//! Version identities and their ordering
//!
//! # Modules
//!
//! - [`identity`]: total, deterministic parser from raw text to [`VersionIdentity`]
//! - [`compare`]: partial ordering over identities ([`Comparison`])

pub mod compare;
pub mod identity;

pub use compare::{Comparison, compare};
pub use identity::{Segment, SegmentKind, VersionIdentity, parse};
