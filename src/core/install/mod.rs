// ─── Game Installations ───
// Read-only model of a configured install plus the seam to the
// configuration store that owns it.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::LauncherResult;
use crate::core::mods::MOD_VERSION_NONE;

/// One configured game installation.
///
/// Owned by the external configuration store; the core treats it as a
/// read-only input per validation/patch pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInstallation {
    pub id: String,
    pub location: PathBuf,
    /// How many game processes this install should run.
    pub instances: u32,
    /// Keep the user's own assist-tool config out of patching.
    #[serde(default)]
    pub override_assist_config: bool,
    pub flags: Vec<String>,
    /// Selected graphics mod version, or "none".
    pub graphics_version: String,
    /// Selected assist tool version, or "none".
    pub assist_version: String,
}

impl GameInstallation {
    /// New installation with the launcher defaults: a single instance,
    /// windowed launch flags, no mods selected.
    pub fn new(location: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            location,
            instances: 1,
            override_assist_config: false,
            flags: vec!["-w".to_string(), "-skiptobnet".to_string()],
            graphics_version: MOD_VERSION_NONE.to_string(),
            assist_version: MOD_VERSION_NONE.to_string(),
        }
    }
}

/// Persisted launcher configuration, owned by the frontend shell.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn read_installations(&self) -> LauncherResult<Vec<GameInstallation>>;

    /// Configured delay between game launches, in milliseconds.
    /// Zero means "use the launcher default".
    async fn read_launch_delay(&self) -> LauncherResult<u64>;

    async fn write_launch_delay(&self, delay_ms: u64) -> LauncherResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_installation_defaults() {
        let install = GameInstallation::new(PathBuf::from("/games/one"));

        assert_eq!(install.instances, 1);
        assert_eq!(install.flags, vec!["-w", "-skiptobnet"]);
        assert_eq!(install.graphics_version, MOD_VERSION_NONE);
        assert_eq!(install.assist_version, MOD_VERSION_NONE);
        assert!(!install.override_assist_config);
        assert!(!install.id.is_empty());
    }

    #[test]
    fn installation_round_trips_through_json() {
        let install = GameInstallation::new(PathBuf::from("/games/one"));
        let json = serde_json::to_string(&install).unwrap();
        let back: GameInstallation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, install.id);
        assert_eq!(back.location, install.location);
    }
}
