// ─── Patch Service ───
// Drives the whole pass: validation across every installation, the
// ordered patch sequence per installation on a background worker, and
// multi-instance launching. The invoking context (UI shell) only ever
// consumes the event stream; it never blocks on the pass itself.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::{ConfigStore, GameInstallation};
use crate::core::manifest::{diff, ManifestCache, PatchAction, PatchFileEntry};
use crate::core::mods::{
    reset_category, validate_category, ModCatalog, ModCategory, MOD_VERSION_NONE,
};
use crate::core::patcher::{apply, clean_failed_patch, PatchEvent};
use crate::core::process::{
    ExitNotice, OsConfigurator, ProcessLauncher, ProcessOrchestrator, RunningProcess,
};
use crate::core::remote::RemoteSource;

// Remote layout of the update source.
pub const BASE_MANIFEST_PATH: &str = "base/manifest.json";
pub const COMMUNITY_MANIFEST_PATH: &str = "current/manifest.json";
pub const MOD_CATALOG_PATH: &str = "mods.json";
const BASE_REMOTE_DIR: &str = "base";
const COMMUNITY_REMOTE_DIR: &str = "current";

const EVENT_BUFFER: usize = 16;

/// Result of validating every installation.
#[derive(Debug)]
pub struct ValidationReport {
    pub up_to_date: bool,
    /// Every action required across all installations, in the order the
    /// targets were checked.
    pub actions: Vec<PatchAction>,
}

/// Orchestrating service over the remote source, the configuration
/// store, the patch engine, and the process orchestrator.
pub struct PatchService {
    remote: Arc<dyn RemoteSource>,
    config: Arc<dyn ConfigStore>,
    os: Arc<dyn OsConfigurator>,
    orchestrator: ProcessOrchestrator,
    /// Mod catalog, fetched once per service lifetime.
    catalog: OnceCell<ModCatalog>,
    /// UI-facing display model of the last validation's planned actions.
    planned: Mutex<Vec<PatchAction>>,
}

impl PatchService {
    /// Wire up the service. The exit channel's sender side belongs to
    /// the platform launch layer; the orchestrator's listener consumes
    /// it for as long as the service lives.
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        config: Arc<dyn ConfigStore>,
        launcher: Arc<dyn ProcessLauncher>,
        os: Arc<dyn OsConfigurator>,
        exits: mpsc::Receiver<ExitNotice>,
    ) -> Self {
        Self {
            remote,
            config,
            os,
            orchestrator: ProcessOrchestrator::new(launcher, exits),
            catalog: OnceCell::new(),
            planned: Mutex::new(Vec::new()),
        }
    }

    async fn catalog(&self) -> LauncherResult<&ModCatalog> {
        let remote = Arc::clone(&self.remote);
        self.catalog
            .get_or_try_init(|| async move { remote.fetch_catalog(MOD_CATALOG_PATH).await })
            .await
    }

    // ── Validation ──────────────────────────────────────

    /// Check every installation against the base version, the community
    /// patch, and both mod categories. The first failure aborts the
    /// whole validation; no partial results are returned.
    pub async fn validate(&self) -> LauncherResult<ValidationReport> {
        let installations = self.config.read_installations().await?;
        let catalog = self.catalog().await?.clone();
        let mut cache = ManifestCache::new();

        self.planned.lock().expect("planned model lock poisoned").clear();
        let mut up_to_date = true;

        for install in &installations {
            // Base version and community patch are always checked,
            // regardless of mod selection.
            for path in [BASE_MANIFEST_PATH, COMMUNITY_MANIFEST_PATH] {
                let manifest = cache.get(self.remote.as_ref(), path).await?;
                let (actions, _) = diff(&manifest.files, &install.location, &[]).await?;
                if !actions.is_empty() {
                    up_to_date = false;
                    self.record_planned(actions);
                }
            }

            for category in ModCategory::ALL {
                let verdict = validate_category(
                    self.remote.as_ref(),
                    &mut cache,
                    &catalog,
                    install,
                    category,
                )
                .await?;
                if !verdict.current {
                    up_to_date = false;
                    self.record_planned(verdict.actions);
                }
            }
        }

        info!(
            "Validated {} installations, up to date: {up_to_date}",
            installations.len()
        );

        Ok(ValidationReport {
            up_to_date,
            actions: self.planned_actions(),
        })
    }

    fn record_planned(&self, actions: Vec<PatchAction>) {
        self.planned
            .lock()
            .expect("planned model lock poisoned")
            .extend(actions);
    }

    /// Snapshot of the display model built by the last validation.
    pub fn planned_actions(&self) -> Vec<PatchAction> {
        self.planned
            .lock()
            .expect("planned model lock poisoned")
            .clone()
    }

    // ── Patching ────────────────────────────────────────

    /// Run the full patch pass on a background worker and return the
    /// event stream. The stream ends with exactly one `Done` or
    /// `Failed` event.
    pub fn patch(self: Arc<Self>) -> mpsc::Receiver<PatchEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            match self.run_patch_pass(&tx).await {
                Ok(()) => {
                    let _ = tx.send(PatchEvent::Done).await;
                }
                Err(err) => {
                    let _ = tx.send(PatchEvent::Failed(err)).await;
                }
            }
        });

        rx
    }

    /// The ordered pass per installation: mod resets, base version,
    /// community patch, assist tool, graphics mod, OS configuration.
    /// Later targets assume earlier ones left the filesystem in the
    /// state their diff was computed against, so no reordering.
    async fn run_patch_pass(&self, events: &mpsc::Sender<PatchEvent>) -> LauncherResult<()> {
        let installations = self.config.read_installations().await?;
        let catalog = self.catalog().await?.clone();
        let mut cache = ManifestCache::new();

        for install in &installations {
            // Undo obsolete mod installs first: a stale leftover could
            // otherwise satisfy the desired version's checksums.
            for category in ModCategory::ALL {
                reset_category(self.remote.as_ref(), &mut cache, &catalog, install, category)
                    .await?;
            }

            let _ = events
                .send(PatchEvent::Status("Checking game version...".to_string()))
                .await;
            let manifest = cache.get(self.remote.as_ref(), BASE_MANIFEST_PATH).await?;
            self.apply_target(
                install,
                &manifest.files,
                BASE_REMOTE_DIR,
                &[],
                format!("Updating {} to the base version", install.location.display()),
                events,
            )
            .await?;

            let _ = events
                .send(PatchEvent::Status("Checking community patch...".to_string()))
                .await;
            let manifest = cache
                .get(self.remote.as_ref(), COMMUNITY_MANIFEST_PATH)
                .await?;
            self.apply_target(
                install,
                &manifest.files,
                COMMUNITY_REMOTE_DIR,
                &[],
                format!(
                    "Updating {} to the latest community patch",
                    install.location.display()
                ),
                events,
            )
            .await?;

            // Selected mods, assist tool before graphics.
            for category in ModCategory::ALL {
                let desired = category.desired_version(install);
                if desired == MOD_VERSION_NONE {
                    continue;
                }
                let desired = desired.to_string();

                let _ = events
                    .send(PatchEvent::Status(format!("Checking {category} version...")))
                    .await;

                let manifest = cache
                    .get(self.remote.as_ref(), &category.manifest_path(&desired))
                    .await?;
                let ignore = category.ignore_list(install);
                self.apply_target(
                    install,
                    &manifest.files,
                    &category.remote_dir(&desired),
                    &ignore,
                    format!(
                        "Updating {} to {category} {desired}",
                        install.location.display()
                    ),
                    events,
                )
                .await?;
            }

            // Compatibility settings round off the installation.
            self.os.configure(&install.location).await?;
            debug!("Finished patch sequence for {:?}", install.location);
        }

        Ok(())
    }

    /// Diff one target and apply whatever it needs. On failure the
    /// staged `.tmp` artifacts are removed before the error surfaces,
    /// so a retry starts clean; a cleanup failure is reported together
    /// with the original cause.
    async fn apply_target(
        &self,
        install: &GameInstallation,
        files: &[PatchFileEntry],
        remote_dir: &str,
        ignore: &[String],
        updating_msg: String,
        events: &mpsc::Sender<PatchEvent>,
    ) -> LauncherResult<()> {
        let (actions, total_bytes) = diff(files, &install.location, ignore).await?;
        if actions.is_empty() {
            return Ok(());
        }

        let _ = events.send(PatchEvent::Status(updating_msg)).await;

        if let Err(primary) = apply(
            self.remote.as_ref(),
            &actions,
            total_bytes,
            remote_dir,
            &install.location,
            events,
        )
        .await
        {
            return Err(match clean_failed_patch(&install.location).await {
                Ok(()) => primary,
                Err(cleanup) => LauncherError::Cleanup {
                    primary: Box::new(primary),
                    cleanup: Box::new(cleanup),
                },
            });
        }

        Ok(())
    }

    // ── Launching ───────────────────────────────────────

    /// Launch every installation's configured instance count, paced by
    /// the stored launch delay.
    pub async fn exec(&self) -> LauncherResult<()> {
        let installations = self.config.read_installations().await?;
        let delay_ms = self.config.read_launch_delay().await?;
        self.orchestrator.launch_all(&installations, delay_ms).await
    }

    pub async fn set_launch_delay(&self, delay_ms: u64) -> LauncherResult<()> {
        self.config.write_launch_delay(delay_ms).await
    }

    /// Snapshot of live game processes.
    pub fn running_processes(&self) -> Vec<RunningProcess> {
        self.orchestrator.running_processes()
    }
}
