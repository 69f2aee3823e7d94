// ─── Patch Manifest ───
// Model for the versioned file manifests published by the update source.

pub mod diff;

pub use diff::{diff, ActionKind, PatchAction};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::remote::RemoteSource;

/// A versioned list of expected files for one target (base version,
/// community patch, or a specific mod version).
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub files: Vec<PatchFileEntry>,
}

/// A single file tracked by a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchFileEntry {
    pub name: String,
    /// Expected CRC32 of the file content, 8 hex chars.
    pub crc: String,
    pub last_modified: DateTime<Utc>,
    pub content_length: u64,
    /// Once present on disk, never re-verify or re-download.
    #[serde(default)]
    pub ignore_crc: bool,
    /// No longer part of this target; must be removed if present.
    #[serde(default)]
    pub deprecated: bool,
}

impl Manifest {
    /// Whether the manifest tracks a file with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }
}

/// Per-pass memoization of fetched manifests, keyed by remote path, so
/// a target shared by several installations is fetched exactly once.
#[derive(Default)]
pub struct ManifestCache {
    entries: HashMap<String, Manifest>,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch-or-reuse the manifest at `path`.
    pub async fn get(
        &mut self,
        remote: &dyn RemoteSource,
        path: &str,
    ) -> LauncherResult<&Manifest> {
        if !self.entries.contains_key(path) {
            let manifest = remote.fetch_manifest(path).await?;
            self.entries.insert(path.to_string(), manifest);
        }

        self.entries
            .get(path)
            .ok_or_else(|| LauncherError::ManifestMissing {
                path: path.to_string(),
            })
    }
}
