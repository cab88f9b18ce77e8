//! Single owner of the device store file.
//!
//! Every instance in the process sends its settings writes here. The writer
//! applies them to one in-memory [`ConfigStore`] and replaces the file
//! atomically, so concurrent updates to different sections never overwrite
//! each other.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use virtdev_common::{ConfigStore, StoreError};

use crate::error::{BridgeError, Result};

const CHANNEL_CAPACITY: usize = 64;

/// One `(section, key, value)` update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUpdate {
    pub section: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug)]
enum Command {
    Update(StoreUpdate),
    Flush(oneshot::Sender<std::result::Result<(), StoreError>>),
    Snapshot(oneshot::Sender<ConfigStore>),
}

/// Cloneable handle used by instances to persist settings.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<Command>,
}

impl StoreHandle {
    /// Queue an update. Persistence is best effort; failures are logged by
    /// the writer.
    pub async fn persist(
        &self,
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        let update = StoreUpdate {
            section: section.into(),
            key: key.into(),
            value: value.into(),
        };
        if self.tx.send(Command::Update(update)).await.is_err() {
            tracing::error!("Store writer stopped, setting not persisted");
        }
    }

    /// Current contents of the store, including updates not yet saved.
    pub async fn snapshot(&self) -> Result<ConfigStore> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::Snapshot(reply))
            .await
            .map_err(|_| BridgeError::StoreWriterStopped)?;
        done.await.map_err(|_| BridgeError::StoreWriterStopped)
    }

    /// Wait until every queued update has been written.
    pub async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply))
            .await
            .map_err(|_| BridgeError::StoreWriterStopped)?;
        done.await
            .map_err(|_| BridgeError::StoreWriterStopped)?
            .map_err(BridgeError::from)
    }
}

/// Start the writer task for `store`, saved to `path`.
///
/// The task ends once every handle is dropped.
pub fn spawn_store_writer(store: ConfigStore, path: PathBuf) -> (StoreHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = StoreWriter {
        store,
        path,
        dirty: false,
    };
    let task = tokio::spawn(writer.run(rx));
    (StoreHandle { tx }, task)
}

struct StoreWriter {
    store: ConfigStore,
    path: PathBuf,
    dirty: bool,
}

impl StoreWriter {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::debug!(path = %self.path.display(), "Store writer started");

        while let Some(command) = rx.recv().await {
            let mut flushes = Vec::new();
            self.handle(command, &mut flushes);

            // Coalesce whatever else is already queued into one save.
            while let Ok(command) = rx.try_recv() {
                self.handle(command, &mut flushes);
            }

            let result = self.save();
            for reply in flushes {
                let _ = reply.send(result.as_ref().map(|_| ()).map_err(clone_error));
            }
        }

        if self.dirty {
            let _ = self.save();
        }
        tracing::debug!(path = %self.path.display(), "Store writer stopped");
    }

    fn handle(
        &mut self,
        command: Command,
        flushes: &mut Vec<oneshot::Sender<std::result::Result<(), StoreError>>>,
    ) {
        match command {
            Command::Update(update) => {
                if self
                    .store
                    .set(&update.section, &update.key, update.value.clone())
                {
                    tracing::debug!(
                        section = %update.section,
                        key = %update.key,
                        value = %update.value,
                        "Setting persisted"
                    );
                    self.dirty = true;
                }
            }
            Command::Flush(reply) => flushes.push(reply),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.store.clone());
            }
        }
    }

    fn save(&mut self) -> std::result::Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        match self.store.save_atomic(&self.path) {
            Ok(()) => {
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to write store");
                Err(e)
            }
        }
    }
}

fn clone_error(e: &StoreError) -> StoreError {
    let io = |source: &std::io::Error| std::io::Error::new(source.kind(), source.to_string());
    match e {
        StoreError::Read { path, source } => StoreError::Read {
            path: path.clone(),
            source: io(source),
        },
        StoreError::Write { path, source } => StoreError::Write {
            path: path.clone(),
            source: io(source),
        },
        StoreError::Parse(msg) => StoreError::Parse(msg.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = "\
[Global]
numberofmodules = 1

[Tank_Sensor_1]
serial = 1
capacity = 0.2

[Relay_Module_1]
serial = 2
customname = Old
";

    #[tokio::test]
    async fn test_updates_from_two_sections_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optionsSet");
        std::fs::write(&path, STORE).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        let (handle, _task) = spawn_store_writer(store, path.clone());

        let tank = handle.clone();
        let relay = handle.clone();
        let a = tokio::spawn(async move { tank.persist("Tank_Sensor_1", "Capacity", "0.5").await });
        let b = tokio::spawn(async move { relay.persist("Relay_Module_1", "CustomName", "Deck").await });
        a.await.unwrap();
        b.await.unwrap();

        handle.flush().await.unwrap();

        let saved = ConfigStore::load(&path).unwrap();
        assert_eq!(saved.get("Tank_Sensor_1", "capacity"), Some("0.5"));
        assert_eq!(saved.get("Relay_Module_1", "customname"), Some("Deck"));
        assert_eq!(saved.get("Global", "numberofmodules"), Some("1"));
    }

    #[tokio::test]
    async fn test_snapshot_sees_queued_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optionsSet");

        let (handle, _task) = spawn_store_writer(ConfigStore::parse(STORE).unwrap(), path);
        handle.persist("Tank_Sensor_1", "RawValueFull", "50").await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.get("Tank_Sensor_1", "rawvaluefull"), Some("50"));
    }

    #[tokio::test]
    async fn test_flush_reports_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("optionsSet");

        let (handle, _task) = spawn_store_writer(ConfigStore::new(), path);
        handle.persist("Input_1", "Count", "3").await;

        assert!(matches!(handle.flush().await, Err(BridgeError::Store(_))));
    }

    #[tokio::test]
    async fn test_flush_without_changes_does_not_touch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optionsSet");

        let (handle, _task) = spawn_store_writer(ConfigStore::new(), path.clone());
        handle.flush().await.unwrap();

        assert!(!path.exists());
    }
}
