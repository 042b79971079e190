//! Scripted fetcher and resolver setup

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use version_tracker::error::FetchError;
use version_tracker::inventory::ApplicationIdentity;
use version_tracker::resolution::{ResolutionSettings, Resolver};
use version_tracker::source::{
    Fetcher, PackageIndex, SourceEntry, SourceRegistry, SourceStrategy, StrategyKind,
};

/// Fetcher replaying scripted responses per application key.
///
/// Each call consumes the next response; the last one repeats. Applications
/// without a script get `NotFound`.
pub struct ScriptedFetcher {
    kind: StrategyKind,
    scripts: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_script(self, key: &str, responses: Vec<Result<&str, FetchError>>) -> Self {
        let script = responses
            .into_iter()
            .map(|r| r.map(str::to_string))
            .collect();
        self.scripts.lock().unwrap().insert(key.to_string(), script);
        self
    }

    pub fn with_version(self, key: &str, version: &str) -> Self {
        self.with_script(key, vec![Ok(version)])
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn fetch(
        &self,
        app: &ApplicationIdentity,
        _strategy: &SourceStrategy,
        _timeout: Duration,
    ) -> Result<String, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(app.key().to_string())
            .or_default() += 1;

        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(app.key()) else {
            return Err(FetchError::NotFound(app.key().to_string()));
        };
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchError::NotFound(app.key().to_string())))
        }
    }
}

pub fn feed_strategy() -> SourceStrategy {
    SourceStrategy::Feed {
        url: "https://updates.example.com/{id}/appcast.xml".to_string(),
        json_pointer: None,
    }
}

pub fn homebrew_strategy() -> SourceStrategy {
    SourceStrategy::PackageIndex {
        index: PackageIndex::Homebrew,
        name: "{id}".to_string(),
    }
}

/// Resolver trying `strategies` in order for every application
pub fn create_test_resolver(
    strategies: Vec<SourceStrategy>,
    fetchers: Vec<Arc<dyn Fetcher>>,
    settings: ResolutionSettings,
) -> Resolver {
    let registry = SourceRegistry::new(vec![SourceEntry::new("*", strategies)], HashMap::new())
        .expect("valid test registry");

    Resolver::new(
        Arc::new(registry),
        fetchers.into_iter().map(|f| (f.kind(), f)).collect(),
        settings,
    )
}
