//! Resolution cache shared across runs

mod helper;

use std::sync::Arc;

use tempfile::TempDir;

use helper::{ScriptedFetcher, create_test_resolver, feed_strategy};
use version_tracker::inventory::ApplicationIdentity;
use version_tracker::resolution::{
    ResolutionCache, ResolutionOutcome, ResolutionSettings, SqliteStore,
};
use version_tracker::source::{Fetcher, StrategyKind};

const APP: &str = "com.example.editor";
const TTL_MS: i64 = 60 * 60 * 1000;

fn cache(db_path: &std::path::Path) -> ResolutionCache {
    ResolutionCache::new(Box::new(SqliteStore::new(db_path, 100).unwrap()), TTL_MS)
}

#[tokio::test]
async fn second_run_is_served_from_persistent_cache() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("resolutions.db");
    let batch = vec![ApplicationIdentity::new(APP, "Editor")];

    let first_fetcher = Arc::new(ScriptedFetcher::new(StrategyKind::Feed).with_version(APP, "2.4.1"));
    let first = create_test_resolver(
        vec![feed_strategy()],
        vec![first_fetcher.clone() as Arc<dyn Fetcher>],
        ResolutionSettings::default(),
    )
    .with_cache(cache(&db_path));
    let first_results = first.resolve(&batch).await;

    let second_fetcher = Arc::new(ScriptedFetcher::new(StrategyKind::Feed).with_version(APP, "9.9.9"));
    let second = create_test_resolver(
        vec![feed_strategy()],
        vec![second_fetcher.clone() as Arc<dyn Fetcher>],
        ResolutionSettings::default(),
    )
    .with_cache(cache(&db_path));
    let second_results = second.resolve(&batch).await;

    assert_eq!(
        first_results[&batch[0]],
        ResolutionOutcome::resolved("2.4.1", StrategyKind::Feed)
    );
    assert_eq!(first_results, second_results);
    assert_eq!(first_fetcher.calls(APP), 1);
    assert_eq!(second_fetcher.calls(APP), 0);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("resolutions.db");
    let batch = vec![ApplicationIdentity::new(APP, "Editor")];

    let failing = Arc::new(ScriptedFetcher::new(StrategyKind::Feed));
    create_test_resolver(
        vec![feed_strategy()],
        vec![failing as Arc<dyn Fetcher>],
        ResolutionSettings::default(),
    )
    .with_cache(cache(&db_path))
    .resolve(&batch)
    .await;

    let recovered = Arc::new(ScriptedFetcher::new(StrategyKind::Feed).with_version(APP, "1.0"));
    let results = create_test_resolver(
        vec![feed_strategy()],
        vec![recovered.clone() as Arc<dyn Fetcher>],
        ResolutionSettings::default(),
    )
    .with_cache(cache(&db_path))
    .resolve(&batch)
    .await;

    assert!(results[&batch[0]].is_resolved());
    assert_eq!(recovered.calls(APP), 1);
}
