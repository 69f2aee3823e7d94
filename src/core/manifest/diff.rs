// ─── Manifest Diff Engine ───
// Compares a manifest's entries against local file checksums and
// produces the ordered list of actions required to converge.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::PatchFileEntry;
use crate::core::checksum::file_crc32;
use crate::core::error::LauncherResult;

/// Filesystem mutation required to bring an install in line with a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Download,
    Delete,
}

/// A single required mutation, produced by [`diff`] and consumed by the
/// patch applier. Never persisted.
#[derive(Debug, Clone)]
pub struct PatchAction {
    pub kind: ActionKind,
    pub entry: PatchFileEntry,
    pub install_path: PathBuf,
    /// Local checksum at decision time, for display. `None` when the
    /// file was absent on disk.
    pub local_crc: Option<String>,
}

/// Diff manifest entries against the local install directory.
///
/// Returns the required actions in manifest order plus the total number
/// of bytes the downloads will fetch. Entries named in `ignore` are
/// never touched (caller-protected files, e.g. a user-customized
/// config). Any IO failure aborts the whole diff.
pub async fn diff(
    files: &[PatchFileEntry],
    install_path: &Path,
    ignore: &[String],
) -> LauncherResult<(Vec<PatchAction>, u64)> {
    let mut actions = Vec::new();
    let mut total_download_bytes: u64 = 0;

    for entry in files {
        if ignore.iter().any(|ignored| ignored == &entry.name) {
            continue;
        }

        let local_path = install_path.join(&entry.name);

        // Deprecation wins over everything else, including ignore_crc:
        // a file that no longer belongs in the target gets removed even
        // if its content was never verified.
        if entry.deprecated {
            if let Some(local_crc) = file_crc32(&local_path).await? {
                actions.push(PatchAction {
                    kind: ActionKind::Delete,
                    entry: entry.clone(),
                    install_path: install_path.to_path_buf(),
                    local_crc: Some(local_crc),
                });
            }
            continue;
        }

        match file_crc32(&local_path).await? {
            None => {
                // Missing and wanted, regardless of checksum settings.
                actions.push(PatchAction {
                    kind: ActionKind::Download,
                    entry: entry.clone(),
                    install_path: install_path.to_path_buf(),
                    local_crc: None,
                });
                total_download_bytes += entry.content_length;
            }
            Some(_) if entry.ignore_crc => {
                // Present on disk is all we ask of this entry.
            }
            Some(local_crc) if local_crc != entry.crc => {
                actions.push(PatchAction {
                    kind: ActionKind::Download,
                    entry: entry.clone(),
                    install_path: install_path.to_path_buf(),
                    local_crc: Some(local_crc),
                });
                total_download_bytes += entry.content_length;
            }
            Some(_) => {}
        }
    }

    Ok((actions, total_download_bytes))
}
