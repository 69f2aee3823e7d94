// ─── Process Orchestrator ───
// Launches N game processes per installation with inter-launch pacing
// and reaps exits on a background listener that lives as long as the
// service does.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::error::LauncherResult;
use crate::core::install::GameInstallation;

/// Used when no launch delay has been configured.
pub const DEFAULT_LAUNCH_DELAY_MS: u64 = 1000;

/// OS-specific process spawning, owned by the platform layer.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawn one game process; returns its pid. The platform layer also
    /// feeds an [`ExitNotice`] into the orchestrator's channel when the
    /// process ends.
    async fn launch(&self, location: &Path, flags: &[String]) -> LauncherResult<u32>;
}

/// OS-specific post-patch configuration (compatibility flags and the
/// like), applied once per installation after mod patching completes.
#[async_trait]
pub trait OsConfigurator: Send + Sync {
    async fn configure(&self, install_path: &Path) -> LauncherResult<()>;
}

/// Exit notification delivered by the platform layer.
#[derive(Debug)]
pub struct ExitNotice {
    pub pid: u32,
    /// Non-fatal to the listener; logged and dropped.
    pub error: Option<String>,
}

/// A live game process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: u32,
    pub installation_id: String,
}

/// Tracks live processes and paces batch launches.
///
/// The running set is mutated from two paths — launches here, exits on
/// the listener task — so it sits behind a mutex that is only ever held
/// for the mutation itself, never across IO.
pub struct ProcessOrchestrator {
    launcher: Arc<dyn ProcessLauncher>,
    running: Arc<Mutex<Vec<RunningProcess>>>,
}

impl ProcessOrchestrator {
    /// Build the orchestrator and start its exit listener. The listener
    /// runs for the lifetime of the exit channel's sender side.
    pub fn new(launcher: Arc<dyn ProcessLauncher>, mut exits: mpsc::Receiver<ExitNotice>) -> Self {
        let running = Arc::new(Mutex::new(Vec::new()));

        let set = Arc::clone(&running);
        tokio::spawn(async move {
            while let Some(notice) = exits.recv().await {
                if let Some(err) = &notice.error {
                    warn!("Game process {} exited with error: {err}", notice.pid);
                }

                let mut running = set.lock().expect("running set lock poisoned");
                running.retain(|proc: &RunningProcess| proc.pid != notice.pid);
                debug!("Reaped pid {}, {} still running", notice.pid, running.len());
            }
        });

        Self { launcher, running }
    }

    /// Launch the configured number of instances for every installation,
    /// minus whatever is already running for that installation id.
    ///
    /// The very first launch of the first installation is immediate;
    /// every other launch is preceded by the delay. A launch failure
    /// aborts the loop.
    pub async fn launch_all(
        &self,
        installations: &[GameInstallation],
        delay_ms: u64,
    ) -> LauncherResult<()> {
        let delay = if delay_ms == 0 {
            DEFAULT_LAUNCH_DELAY_MS
        } else {
            delay_ms
        };

        for (k, install) in installations.iter().enumerate() {
            let already_running = self.running_count(&install.id) as u32;
            let to_launch = install.instances.saturating_sub(already_running);

            for i in 0..to_launch {
                let first_run = k == 0 && i == 0;
                if !first_run {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }

                let pid = self.launcher.launch(&install.location, &install.flags).await?;
                info!("Launched instance of {} with pid {pid}", install.id);

                let mut running = self.running.lock().expect("running set lock poisoned");
                running.push(RunningProcess {
                    pid,
                    installation_id: install.id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Number of live processes for one installation.
    pub fn running_count(&self, installation_id: &str) -> usize {
        self.running
            .lock()
            .expect("running set lock poisoned")
            .iter()
            .filter(|proc| proc.installation_id == installation_id)
            .count()
    }

    /// Snapshot of every live process.
    pub fn running_processes(&self) -> Vec<RunningProcess> {
        self.running
            .lock()
            .expect("running set lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Records launch times and hands out sequential pids.
    struct RecordingLauncher {
        next_pid: AtomicU32,
        launches: Mutex<Vec<Instant>>,
    }

    impl RecordingLauncher {
        fn new() -> Self {
            Self {
                next_pid: AtomicU32::new(100),
                launches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProcessLauncher for RecordingLauncher {
        async fn launch(&self, _location: &Path, _flags: &[String]) -> LauncherResult<u32> {
            self.launches.lock().unwrap().push(Instant::now());
            Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn install(id: &str, instances: u32) -> GameInstallation {
        let mut install = GameInstallation::new(PathBuf::from("/games").join(id));
        install.id = id.to_string();
        install.instances = instances;
        install
    }

    #[tokio::test(start_paused = true)]
    async fn paced_launches_first_immediate() {
        let launcher = Arc::new(RecordingLauncher::new());
        let (_tx, rx) = mpsc::channel(4);
        let orchestrator = ProcessOrchestrator::new(Arc::clone(&launcher) as _, rx);

        let installs = vec![install("one", 2), install("two", 1)];
        let start = Instant::now();
        orchestrator.launch_all(&installs, 1000).await.unwrap();

        let launches = launcher.launches.lock().unwrap().clone();
        assert_eq!(launches.len(), 3);
        // First launch immediate, each subsequent preceded by the delay.
        assert_eq!(launches[0] - start, Duration::from_millis(0));
        assert_eq!(launches[1] - start, Duration::from_millis(1000));
        assert_eq!(launches[2] - start, Duration::from_millis(2000));

        let running = orchestrator.running_processes();
        assert_eq!(running.len(), 3);
        assert_eq!(orchestrator.running_count("one"), 2);
        assert_eq!(orchestrator.running_count("two"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_falls_back_to_default() {
        let launcher = Arc::new(RecordingLauncher::new());
        let (_tx, rx) = mpsc::channel(4);
        let orchestrator = ProcessOrchestrator::new(Arc::clone(&launcher) as _, rx);

        orchestrator
            .launch_all(&[install("one", 2)], 0)
            .await
            .unwrap();

        let launches = launcher.launches.lock().unwrap().clone();
        assert_eq!(
            launches[1] - launches[0],
            Duration::from_millis(DEFAULT_LAUNCH_DELAY_MS)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn already_running_instances_are_subtracted() {
        let launcher = Arc::new(RecordingLauncher::new());
        let (_tx, rx) = mpsc::channel(4);
        let orchestrator = ProcessOrchestrator::new(Arc::clone(&launcher) as _, rx);

        // One instance already live.
        orchestrator
            .launch_all(&[install("one", 1)], 100)
            .await
            .unwrap();
        assert_eq!(orchestrator.running_count("one"), 1);

        // Asking for three only launches the two missing.
        orchestrator
            .launch_all(&[install("one", 3)], 100)
            .await
            .unwrap();

        assert_eq!(launcher.launches.lock().unwrap().len(), 3);
        assert_eq!(orchestrator.running_count("one"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn instance_count_never_goes_negative() {
        let launcher = Arc::new(RecordingLauncher::new());
        let (_tx, rx) = mpsc::channel(4);
        let orchestrator = ProcessOrchestrator::new(Arc::clone(&launcher) as _, rx);

        orchestrator
            .launch_all(&[install("one", 2)], 100)
            .await
            .unwrap();
        // Fewer desired than running: nothing new is launched.
        orchestrator
            .launch_all(&[install("one", 1)], 100)
            .await
            .unwrap();

        assert_eq!(launcher.launches.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_listener_reaps_processes() {
        let launcher = Arc::new(RecordingLauncher::new());
        let (tx, rx) = mpsc::channel(4);
        let orchestrator = ProcessOrchestrator::new(Arc::clone(&launcher) as _, rx);

        orchestrator
            .launch_all(&[install("one", 2)], 100)
            .await
            .unwrap();
        let pid = orchestrator.running_processes()[0].pid;

        tx.send(ExitNotice {
            pid,
            error: Some("exit status 1".to_string()),
        })
        .await
        .unwrap();

        // Give the listener task a chance to run.
        for _ in 0..50 {
            if orchestrator.running_count("one") == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(orchestrator.running_count("one"), 1);

        // An exit error never kills the listener.
        let pid = orchestrator.running_processes()[0].pid;
        tx.send(ExitNotice { pid, error: None }).await.unwrap();
        for _ in 0..50 {
            if orchestrator.running_count("one") == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(orchestrator.running_count("one"), 0);
    }
}
