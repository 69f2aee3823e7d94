// ─── Mod Reconciler ───
// Optional mod packages come in two categories with mutually-exclusive
// versions. Reconciliation makes sure exactly the desired version (or
// none) of each category survives a patch pass: leftovers from other
// versions are detected by a category marker file and purged before the
// desired version is diffed, so a stale but checksum-matching leftover
// can never mask a required update.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::core::checksum::file_crc32;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::GameInstallation;
use crate::core::manifest::{
    diff, ActionKind, Manifest, ManifestCache, PatchAction, PatchFileEntry,
};
use crate::core::remote::RemoteSource;

/// Sentinel for "no version of this category selected".
pub const MOD_VERSION_NONE: &str = "none";

/// User-owned assist tool configuration, protected from patching when
/// the installation opts in.
pub const ASSIST_CONFIG_FILE: &str = "assist.cfg";

/// An optional installable package family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModCategory {
    /// Graphics enhancement pack.
    Graphics,
    /// In-game assistance tool.
    Assist,
}

impl ModCategory {
    /// Reconciliation/apply order within a pass.
    pub const ALL: [ModCategory; 2] = [ModCategory::Assist, ModCategory::Graphics];

    pub fn label(&self) -> &'static str {
        match self {
            ModCategory::Graphics => "graphics",
            ModCategory::Assist => "assist",
        }
    }

    /// File whose presence marks the category as installed. Every
    /// version of the family ships it, so it identifies the family,
    /// not a specific version.
    pub fn marker(&self) -> &'static str {
        match self {
            ModCategory::Graphics => "gfxpack.dll",
            ModCategory::Assist => "assist.dll",
        }
    }

    /// Remote directory holding one version's files.
    pub fn remote_dir(&self, version: &str) -> String {
        format!("{}_{}", self.label(), version)
    }

    pub fn manifest_path(&self, version: &str) -> String {
        format!("{}/manifest.json", self.remote_dir(version))
    }

    /// The version this installation wants, or [`MOD_VERSION_NONE`].
    pub fn desired_version<'a>(&self, install: &'a GameInstallation) -> &'a str {
        match self {
            ModCategory::Graphics => &install.graphics_version,
            ModCategory::Assist => &install.assist_version,
        }
    }

    /// Files of this category the caller wants left alone.
    pub fn ignore_list(&self, install: &GameInstallation) -> Vec<String> {
        match self {
            ModCategory::Assist if install.override_assist_config => {
                vec![ASSIST_CONFIG_FILE.to_string()]
            }
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for ModCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Remotely advertised mod versions per category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModCatalog {
    pub graphics: Vec<String>,
    pub assist: Vec<String>,
}

impl ModCatalog {
    pub fn versions(&self, category: ModCategory) -> &[String] {
        match category {
            ModCategory::Graphics => &self.graphics,
            ModCategory::Assist => &self.assist,
        }
    }
}

/// Whether some version of `category` is present in the install.
///
/// Installed/not-installed is binary per category: the manifest names
/// the family marker file, and its existence on disk is the evidence.
pub async fn is_mod_installed(
    install_path: &Path,
    category: ModCategory,
    manifest: &Manifest,
) -> LauncherResult<bool> {
    let marker = category.marker();
    if !manifest.contains(marker) {
        return Ok(false);
    }

    let marker_path = install_path.join(marker);
    match tokio::fs::metadata(&marker_path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(LauncherError::Io {
            path: marker_path,
            source,
        }),
    }
}

/// Outcome of validating one category for one installation.
#[derive(Debug)]
pub struct CategoryVerdict {
    /// True when the desired version is fully current and no other
    /// version of the category lingers on disk.
    pub current: bool,
    /// Actions that would converge the install, in catalog order.
    pub actions: Vec<PatchAction>,
}

/// Validate mode: determine what the category needs without touching
/// disk. Downloads for the desired version, deletions for leftovers of
/// every other installed version.
pub async fn validate_category(
    remote: &dyn RemoteSource,
    cache: &mut ManifestCache,
    catalog: &ModCatalog,
    install: &GameInstallation,
    category: ModCategory,
) -> LauncherResult<CategoryVerdict> {
    let desired = category.desired_version(install).to_string();
    let ignore = category.ignore_list(install);

    let mut current = true;
    let mut actions = Vec::new();

    for version in catalog.versions(category) {
        let manifest = cache.get(remote, &category.manifest_path(version)).await?;

        if *version == desired {
            let (needed, _) = diff(&manifest.files, &install.location, &ignore).await?;
            if !needed.is_empty() {
                debug!(
                    "{category} {version}: {} files out of date in {:?}",
                    needed.len(),
                    install.location
                );
                current = false;
                actions.extend(needed);
            }
        } else if is_mod_installed(&install.location, category, manifest).await? {
            // Conflicting leftover: every file of this version goes.
            current = false;
            actions.extend(delete_actions_for(&manifest.files, &install.location).await?);
        }
    }

    Ok(CategoryVerdict { current, actions })
}

/// Reset mode: physically remove every non-desired version's leftover
/// files. Runs before the desired version is diffed and applied.
pub async fn reset_category(
    remote: &dyn RemoteSource,
    cache: &mut ManifestCache,
    catalog: &ModCatalog,
    install: &GameInstallation,
    category: ModCategory,
) -> LauncherResult<()> {
    let desired = category.desired_version(install).to_string();
    let ignore = category.ignore_list(install);

    for version in catalog.versions(category) {
        if *version == desired {
            continue;
        }

        let manifest = cache.get(remote, &category.manifest_path(version)).await?;

        if is_mod_installed(&install.location, category, manifest).await? {
            info!(
                "Removing leftover {category} {version} from {:?}",
                install.location
            );
            remove_leftovers(&manifest.files, &install.location, &ignore).await?;
        }
    }

    Ok(())
}

/// Build display-facing delete actions for a leftover version's files,
/// carrying the local checksum where the file still exists.
async fn delete_actions_for(
    files: &[PatchFileEntry],
    install_path: &Path,
) -> LauncherResult<Vec<PatchAction>> {
    let mut actions = Vec::with_capacity(files.len());

    for entry in files {
        let local_crc = file_crc32(&install_path.join(&entry.name)).await?;
        actions.push(PatchAction {
            kind: ActionKind::Delete,
            entry: entry.clone(),
            install_path: install_path.to_path_buf(),
            local_crc,
        });
    }

    Ok(actions)
}

async fn remove_leftovers(
    files: &[PatchFileEntry],
    install_path: &Path,
    ignore: &[String],
) -> LauncherResult<()> {
    for entry in files {
        if ignore.iter().any(|ignored| ignored == &entry.name) {
            continue;
        }

        let path = install_path.join(&entry.name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed leftover {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(LauncherError::Io { path, source }),
        }
    }

    Ok(())
}
