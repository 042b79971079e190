pub mod audit;
pub mod config;
pub mod error;
pub mod freshness;
pub mod inventory;
pub mod logging;
pub mod resolution;
pub mod source;
pub mod version;
