// ─── Patch Applier ───
// Executes a diff's actions against disk. Downloads stage into `.tmp`
// siblings and are only promoted once the whole batch has succeeded,
// so a crash mid-batch never leaves a partially-adopted file.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::manifest::{ActionKind, PatchAction};
use crate::core::remote::RemoteSource;

/// Staged-download suffix. Cleanup recognizes exactly this suffix
/// appended to the original filename.
pub const TMP_SUFFIX: &str = ".tmp";

/// Tagged event stream emitted while a patch pass runs.
#[derive(Debug)]
pub enum PatchEvent {
    /// Fraction of the current target's bytes written, in [0, 1].
    Progress(f32),
    /// Human-readable phase message.
    Status(String),
    /// Terminal failure; no further events follow.
    Failed(LauncherError),
    /// The whole pass completed; no further events follow.
    Done,
}

/// Apply a batch of patch actions against `install_path`.
///
/// Downloads fetch from `<remote_dir>/<entry name>` and stream into
/// `<name>.tmp`; deletions are idempotent. All staged files are renamed
/// to their final names only after every action has succeeded. On
/// failure the staged `.tmp` files are left behind for
/// [`clean_failed_patch`], which the orchestrating service invokes.
pub async fn apply(
    remote: &dyn RemoteSource,
    actions: &[PatchAction],
    total_bytes: u64,
    remote_dir: &str,
    install_path: &Path,
    events: &mpsc::Sender<PatchEvent>,
) -> LauncherResult<()> {
    let _ = events.send(PatchEvent::Progress(0.0)).await;

    let mut written: u64 = 0;
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();

    for action in actions {
        match action.kind {
            ActionKind::Download => {
                let final_path = install_path.join(&action.entry.name);
                let tmp_path =
                    install_path.join(format!("{}{}", action.entry.name, TMP_SUFFIX));
                download_to(
                    remote,
                    remote_dir,
                    &action.entry.name,
                    &tmp_path,
                    total_bytes,
                    &mut written,
                    events,
                )
                .await?;
                staged.push((tmp_path, final_path));
            }
            ActionKind::Delete => {
                delete_file(install_path, &action.entry.name).await?;
            }
        }
    }

    // Every action succeeded; promote the staged files. This rename
    // pass is the atomicity boundary of the whole batch.
    for (tmp_path, final_path) in &staged {
        tokio::fs::rename(tmp_path, final_path)
            .await
            .map_err(|source| LauncherError::Io {
                path: tmp_path.clone(),
                source,
            })?;
    }

    if !staged.is_empty() {
        info!("Promoted {} staged files in {:?}", staged.len(), install_path);
    }

    Ok(())
}

async fn download_to(
    remote: &dyn RemoteSource,
    remote_dir: &str,
    name: &str,
    tmp_path: &Path,
    total_bytes: u64,
    written: &mut u64,
    events: &mpsc::Sender<PatchEvent>,
) -> LauncherResult<()> {
    if let Some(parent) = tmp_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| LauncherError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let mut stream = remote.fetch_file(&format!("{remote_dir}/{name}")).await?;

    let mut file = tokio::fs::File::create(tmp_path)
        .await
        .map_err(|source| LauncherError::Io {
            path: tmp_path.to_path_buf(),
            source,
        })?;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|source| LauncherError::Io {
                path: tmp_path.to_path_buf(),
                source,
            })?;

        *written += chunk.len() as u64;
        if total_bytes > 0 {
            let _ = events
                .send(PatchEvent::Progress(*written as f32 / total_bytes as f32))
                .await;
        }
    }

    file.flush().await.map_err(|source| LauncherError::Io {
        path: tmp_path.to_path_buf(),
        source,
    })?;

    debug!("Staged {remote_dir}/{name} -> {:?}", tmp_path);
    Ok(())
}

/// Remove a file from the install, treating "already gone" as success.
async fn delete_file(install_path: &Path, name: &str) -> LauncherResult<()> {
    let path = install_path.join(name);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            debug!("Deleted {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LauncherError::Io { path, source }),
    }
}

/// Remove every `*.tmp` staging artifact from the install directory so
/// a retry starts clean.
pub async fn clean_failed_patch(dir: &Path) -> LauncherResult<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| LauncherError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| LauncherError::Io {
            path: dir.to_path_buf(),
            source,
        })?
    {
        let path = entry.path();
        let is_staged = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(TMP_SUFFIX))
            .unwrap_or(false);

        if is_staged && path.is_file() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|source| LauncherError::Io {
                    path: path.clone(),
                    source,
                })?;
            debug!("Removed staging artifact {:?}", path);
        }
    }

    Ok(())
}
