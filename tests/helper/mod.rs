//! Shared helpers for integration tests

#![allow(dead_code)]

mod fetcher;

pub use fetcher::{ScriptedFetcher, create_test_resolver, feed_strategy, homebrew_strategy};
