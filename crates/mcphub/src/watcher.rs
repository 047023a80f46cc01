//! Build-artifact and settings-file watching.
//!
//! The pack has no native fs-notification dependency, so watchers poll
//! metadata (mtime + size) on an interval and fire a callback when it
//! changes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;

use mcphub_core::ServerConfig;

/// Default polling interval for watchers.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

type Fingerprint = (Option<SystemTime>, u64);

async fn fingerprint(path: &Path) -> Fingerprint {
    match tokio::fs::metadata(path).await {
        Ok(meta) => (meta.modified().ok(), meta.len()),
        Err(_) => (None, 0),
    }
}

/// A polling watcher on one filesystem path.
///
/// Watchers are torn down and rebuilt on every reconciliation pass so
/// a stale watcher never outlives its server's current config.
pub struct ArtifactWatcher {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl ArtifactWatcher {
    /// Start watching `path`, invoking `on_change` after each observed
    /// metadata change.
    pub fn spawn<F, Fut>(path: PathBuf, poll: Duration, on_change: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let watched = path.clone();
        let task = tokio::spawn(async move {
            let mut last = fingerprint(&watched).await;
            loop {
                tokio::time::sleep(poll).await;
                let current = fingerprint(&watched).await;
                if current != last {
                    last = current;
                    tracing::info!(path = %watched.display(), "Watched file changed");
                    on_change().await;
                }
            }
        });

        Self { path, task }
    }

    /// The watched path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the watcher task.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ArtifactWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The local build artifact referenced by a server's launch arguments:
/// the first argument naming an existing regular file.
///
/// Package specifiers (e.g. `npx -y @scope/server`) match nothing and
/// get no watcher.
#[must_use]
pub fn find_build_artifact(config: &ServerConfig) -> Option<PathBuf> {
    config
        .args()
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[test]
    fn test_find_build_artifact_picks_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("build.js");
        std::fs::write(&artifact, "// built").unwrap();

        let config = ServerConfig::new(
            "node",
            vec![
                "--enable-source-maps".to_string(),
                artifact.display().to_string(),
            ],
        );
        assert_eq!(find_build_artifact(&config), Some(artifact));
    }

    #[test]
    fn test_find_build_artifact_ignores_package_specifiers() {
        let config = ServerConfig::new(
            "npx",
            vec!["-y".to_string(), "@scope/mcp-server".to_string()],
        );
        assert_eq!(find_build_artifact(&config), None);
    }

    #[tokio::test]
    async fn test_watcher_fires_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("build.js");
        tokio::fs::write(&artifact, "v1").await.unwrap();

        let fired = Arc::new(Notify::new());
        let signal = fired.clone();
        let watcher = ArtifactWatcher::spawn(artifact.clone(), Duration::from_millis(20), move || {
            let signal = signal.clone();
            async move {
                signal.notify_one();
            }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        tokio::fs::write(&artifact, "v2 with more bytes").await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), fired.notified())
            .await
            .expect("watcher did not fire");
        watcher.stop();
    }

    #[tokio::test]
    async fn test_watcher_quiet_without_change() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("build.js");
        tokio::fs::write(&artifact, "v1").await.unwrap();

        let fired = Arc::new(Notify::new());
        let signal = fired.clone();
        let _watcher =
            ArtifactWatcher::spawn(artifact, Duration::from_millis(20), move || {
                let signal = signal.clone();
                async move {
                    signal.notify_one();
                }
            });

        let result =
            tokio::time::timeout(Duration::from_millis(120), fired.notified()).await;
        assert!(result.is_err(), "watcher fired without a change");
    }
}
