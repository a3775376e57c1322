//! Hot-reloadable configuration holder.
//!
//! A `ConfigStore` owns one parsed document behind an `ArcSwap`. Readers take
//! a cheap `Arc` snapshot; the reload path parses a fresh document and swaps
//! the pointer, so a failed reload leaves the previous snapshot in place.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// A document type that can be loaded into a `ConfigStore`.
pub trait ConfigDocument: Send + Sync + Sized + 'static {
    fn parse(raw: &str) -> Result<Self, ConfigError>;
}

#[derive(Debug)]
pub struct ConfigStore<T> {
    path: PathBuf,
    current: ArcSwap<T>,
    /// Serializes reloads and remembers the last observed modification time.
    reload_state: Mutex<Option<SystemTime>>,
}

impl<T: ConfigDocument> ConfigStore<T> {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let modified = read_modified(&path)?;
        let document = read_document::<T>(&path)?;
        Ok(Self {
            path,
            current: ArcSwap::from_pointee(document),
            reload_state: Mutex::new(modified),
        })
    }

    /// Build a store around an already parsed document.
    pub fn from_document(path: impl Into<PathBuf>, document: T) -> Self {
        Self {
            path: path.into(),
            current: ArcSwap::from_pointee(document),
            reload_state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Re-read the file unconditionally and swap in the new document.
    pub fn reload(&self) -> Result<Arc<T>, ConfigError> {
        let mut observed = self.lock_reload_state();
        *observed = read_modified(&self.path)?;
        self.swap_from_disk()
    }

    /// Reload only when the file's modification time moved past the last one seen.
    ///
    /// The observed time advances even when parsing fails, so a broken
    /// document is reported once rather than on every poll.
    pub fn reload_if_changed(&self) -> Result<Option<Arc<T>>, ConfigError> {
        let mut observed = self.lock_reload_state();
        let modified = read_modified(&self.path)?;
        let changed = match (*observed, modified) {
            (Some(previous), Some(current)) => current > previous,
            (None, Some(_)) => true,
            (_, None) => false,
        };
        if !changed {
            return Ok(None);
        }
        *observed = modified;
        self.swap_from_disk().map(Some)
    }

    fn swap_from_disk(&self) -> Result<Arc<T>, ConfigError> {
        let document = Arc::new(read_document::<T>(&self.path)?);
        self.current.store(Arc::clone(&document));
        Ok(document)
    }

    fn lock_reload_state(&self) -> MutexGuard<'_, Option<SystemTime>> {
        self.reload_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_modified(path: &Path) -> Result<Option<SystemTime>, ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(metadata.modified().ok())
}

fn read_document<T: ConfigDocument>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    T::parse(&raw)
}

#[derive(Debug)]
/// Handle for the background poll task started by `start_watch`.
pub struct ConfigWatchHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConfigWatchHandle {
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Poll `store` every `interval` and call `on_change` after each successful reload.
pub fn start_watch<T, F>(
    store: Arc<ConfigStore<T>>,
    interval: Duration,
    on_change: F,
) -> ConfigWatchHandle
where
    T: ConfigDocument,
    F: Fn(&Arc<T>) + Send + Sync + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.reload_if_changed() {
                        Ok(Some(snapshot)) => {
                            info!(
                                reason_code = "config_reload_applied",
                                path = %store.path().display(),
                                "configuration reloaded"
                            );
                            on_change(&snapshot);
                        }
                        Ok(None) => {
                            debug!(path = %store.path().display(), "configuration unchanged");
                        }
                        Err(error) => {
                            warn!(
                                reason_code = "config_reload_failed",
                                path = %store.path().display(),
                                error = %error,
                                "configuration reload rejected; keeping previous snapshot"
                            );
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    break;
                }
            }
        }
    });

    ConfigWatchHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    use tempfile::tempdir;

    use super::{start_watch, ConfigDocument, ConfigStore};
    use crate::error::ConfigError;

    #[derive(Debug, PartialEq)]
    struct Greeting(String);

    impl ConfigDocument for Greeting {
        fn parse(raw: &str) -> Result<Self, ConfigError> {
            let value: String = serde_yaml::from_str(raw)?;
            Ok(Self(value))
        }
    }

    // Stage next to the target and rename so pollers never see the intermediate mtime.
    fn write_with_mtime(path: &Path, contents: &str, offset_secs: u64) {
        let staged = path.with_extension("staged");
        std::fs::write(&staged, contents).expect("write config");
        let file = OpenOptions::new()
            .write(true)
            .open(&staged)
            .expect("open config");
        file.set_modified(SystemTime::now() + Duration::from_secs(offset_secs))
            .expect("set mtime");
        drop(file);
        std::fs::rename(&staged, path).expect("rename config");
    }

    #[test]
    fn functional_load_and_snapshot_return_parsed_document() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("greeting.yaml");
        write_with_mtime(&path, "hello", 0);

        let store = ConfigStore::<Greeting>::load(&path).expect("load");
        assert_eq!(*store.snapshot(), Greeting("hello".to_string()));
    }

    #[test]
    fn unit_load_reports_missing_file() {
        let temp = tempdir().expect("tempdir");
        let error = ConfigStore::<Greeting>::load(temp.path().join("absent.yaml"))
            .expect_err("missing file");
        assert!(matches!(error, ConfigError::Read { .. }));
    }

    #[test]
    fn functional_reload_if_changed_requires_newer_mtime() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("greeting.yaml");
        write_with_mtime(&path, "hello", 0);
        let store = ConfigStore::<Greeting>::load(&path).expect("load");

        assert!(store.reload_if_changed().expect("poll").is_none());

        write_with_mtime(&path, "goodbye", 10);
        let reloaded = store.reload_if_changed().expect("poll").expect("changed");
        assert_eq!(*reloaded, Greeting("goodbye".to_string()));
        assert_eq!(*store.snapshot(), Greeting("goodbye".to_string()));
        assert!(store.reload_if_changed().expect("poll").is_none());
    }

    #[test]
    fn regression_failed_reload_keeps_previous_snapshot_and_is_not_retried() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("greeting.yaml");
        write_with_mtime(&path, "hello", 0);
        let store = ConfigStore::<Greeting>::load(&path).expect("load");

        write_with_mtime(&path, "[unterminated", 10);
        assert!(matches!(
            store.reload_if_changed(),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(*store.snapshot(), Greeting("hello".to_string()));
        assert!(store.reload_if_changed().expect("same mtime").is_none());
    }

    #[test]
    fn unit_reload_swaps_even_without_mtime_change() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("greeting.yaml");
        write_with_mtime(&path, "hello", 0);
        let store = ConfigStore::<Greeting>::load(&path).expect("load");
        let before = store.snapshot();

        std::fs::write(&path, "again").expect("rewrite");
        store.reload().expect("reload");
        assert_eq!(*before, Greeting("hello".to_string()));
        assert_eq!(*store.snapshot(), Greeting("again".to_string()));
    }

    #[tokio::test]
    async fn integration_start_watch_applies_changes_until_shutdown() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("greeting.yaml");
        write_with_mtime(&path, "hello", 0);
        let store = Arc::new(ConfigStore::<Greeting>::load(&path).expect("load"));
        let applied = Arc::new(AtomicUsize::new(0));
        let applied_in_watch = Arc::clone(&applied);

        let mut handle = start_watch(Arc::clone(&store), Duration::from_millis(10), move |_| {
            applied_in_watch.fetch_add(1, Ordering::SeqCst);
        });

        write_with_mtime(&path, "watched", 10);
        wait_for_applied(&applied, 1).await;
        handle.shutdown().await;

        assert_eq!(applied.load(Ordering::SeqCst), 1);
        assert_eq!(*store.snapshot(), Greeting("watched".to_string()));
    }

    async fn wait_for_applied(applied: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if applied.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn integration_start_watch_survives_failed_reload() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("greeting.yaml");
        write_with_mtime(&path, "hello", 0);
        let store = Arc::new(ConfigStore::<Greeting>::load(&path).expect("load"));
        let applied = Arc::new(AtomicUsize::new(0));
        let applied_in_watch = Arc::clone(&applied);

        let mut handle = start_watch(Arc::clone(&store), Duration::from_millis(10), move |_| {
            applied_in_watch.fetch_add(1, Ordering::SeqCst);
        });

        write_with_mtime(&path, "[unterminated", 10);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(applied.load(Ordering::SeqCst), 0);
        assert_eq!(*store.snapshot(), Greeting("hello".to_string()));

        write_with_mtime(&path, "recovered", 20);
        wait_for_applied(&applied, 1).await;
        handle.shutdown().await;

        assert_eq!(applied.load(Ordering::SeqCst), 1);
        assert_eq!(*store.snapshot(), Greeting("recovered".to_string()));
    }
}
