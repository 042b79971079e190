//! Installed applications handed to the audit by the inventory collaborator

use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::InventoryError;

/// Stable key (vendor bundle identifier) plus a display name.
///
/// Equality and hashing use the key only.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationIdentity {
    key: String,
    name: String,
}

impl ApplicationIdentity {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same application under another display name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            key: self.key.clone(),
            name: name.into(),
        }
    }
}

impl PartialEq for ApplicationIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ApplicationIdentity {}

impl Hash for ApplicationIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// One installed application and the version it reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    pub identity: ApplicationIdentity,
    /// Raw installed version text, e.g. "5.1.2" or "5.1.2 (5102)"
    pub installed: String,
}

impl InstalledApp {
    pub fn new(identity: ApplicationIdentity, installed: impl Into<String>) -> Self {
        Self {
            identity,
            installed: installed.into(),
        }
    }
}

/// Source of installed applications, enumerated once per audit
pub trait Inventory {
    fn enumerate(&self) -> Result<Vec<InstalledApp>, InventoryError>;
}

/// Entry of an exported inventory file
#[derive(Debug, Deserialize)]
struct InventoryEntry {
    bundle_id: String,
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    build: Option<String>,
}

/// Inventory read from a JSON export (an array of entries)
///
/// ```json
/// [{ "bundle_id": "com.googlecode.iterm2", "name": "iTerm", "version": "3.5.0", "build": "3.5.0" }]
/// ```
pub struct JsonInventory {
    path: PathBuf,
}

impl JsonInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(&self, text: &str) -> Result<Vec<InstalledApp>, InventoryError> {
        let entries: Vec<InventoryEntry> =
            serde_json::from_str(text).map_err(|e| InventoryError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        let apps: Vec<InstalledApp> = entries
            .into_iter()
            .filter_map(|entry| {
                if entry.bundle_id.trim().is_empty() || entry.name.trim().is_empty() {
                    debug!("Skipping inventory entry without identifier or name");
                    return None;
                }
                let installed = installed_version(&entry.version, entry.build.as_deref());
                Some(InstalledApp::new(
                    ApplicationIdentity::new(entry.bundle_id, entry.name),
                    installed,
                ))
            })
            .collect();

        Ok(apps)
    }
}

impl Inventory for JsonInventory {
    fn enumerate(&self) -> Result<Vec<InstalledApp>, InventoryError> {
        let text = fs::read_to_string(&self.path).map_err(|source| InventoryError::Read {
            path: self.path.clone(),
            source,
        })?;
        let apps = self.parse(&text)?;
        info!("Loaded {} applications from {:?}", apps.len(), self.path);
        Ok(apps)
    }
}

/// Installed version text: the marketing version, with the build number in
/// parentheses when it differs ("5.1.2 (5102)").
pub fn installed_version(version: &str, build: Option<&str>) -> String {
    let version = version.trim();
    match build.map(str::trim) {
        Some(build) if !build.is_empty() && build != version => {
            if version.is_empty() {
                build.to_string()
            } else {
                format!("{} ({})", version, build)
            }
        }
        _ => version.to_string(),
    }
}
