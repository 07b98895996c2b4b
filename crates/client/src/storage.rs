//! Persisted key/value storage shared by every browsing context of an origin.
//!
//! Two seams live here:
//!
//! - [`TokenStorage`]: synchronous read/write of persisted values.
//! - [`StorageEvents`]: notifications about writes performed by *other*
//!   contexts. A notification is only a hint; consumers re-read the storage
//!   instead of trusting the payload.
//!
//! [`MemoryStorage`] models a single origin with many contexts in one process,
//! [`FileStorage`] + [`FileWatcher`] share the state between processes.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::Result;

/// A write observed from another context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<String>,
}

pub type ChangeHandler = Arc<dyn Fn(&StorageChange) + Send + Sync>;

pub trait TokenStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: Option<&str>) -> Result<()>;
}

pub trait StorageEvents: Send + Sync {
    /// Calls `handler` for every change to `key` made elsewhere, until the
    /// returned [`Subscription`] is dropped.
    fn subscribe(&self, key: &str, handler: ChangeHandler) -> Subscription;
}

/// Keeps a registration alive. Dropping it unregisters.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keeps the registration for the rest of the process lifetime.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Announcement {
    origin: u64,
    change: StorageChange,
}

struct Origin {
    values: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<Announcement>,
    next_context: AtomicU64,
}

/// In-process origin storage. Each [`MemoryContext`] behaves like one tab.
#[derive(Clone)]
pub struct MemoryStorage {
    origin: Arc<Origin>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            origin: Arc::new(Origin {
                values: Mutex::new(HashMap::new()),
                events,
                next_context: AtomicU64::new(1),
            }),
        }
    }

    /// Opens a new browsing context on this origin.
    pub fn context(&self) -> MemoryContext {
        MemoryContext {
            id: self.origin.next_context.fetch_add(1, Ordering::Relaxed),
            origin: self.origin.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MemoryContext {
    id: u64,
    origin: Arc<Origin>,
}

impl MemoryContext {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl TokenStorage for MemoryContext {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .origin
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<()> {
        {
            let mut values = self
                .origin
                .values
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match value {
                Some(value) => values.insert(key.to_string(), value.to_string()),
                None => values.remove(key),
            };
        }
        // No receivers just means no other context is listening.
        let _ = self.origin.events.send(Announcement {
            origin: self.id,
            change: StorageChange {
                key: key.to_string(),
                new_value: value.map(str::to_string),
            },
        });
        Ok(())
    }
}

impl StorageEvents for MemoryContext {
    /// Must be called from within a Tokio runtime: delivery happens on a
    /// spawned task, never in the writer's turn.
    fn subscribe(&self, key: &str, handler: ChangeHandler) -> Subscription {
        let mut rx = self.origin.events.subscribe();
        let own_id = self.id;
        let key = key.to_string();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(announcement) => {
                        if announcement.origin != own_id && announcement.change.key == key {
                            handler(&announcement.change);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("storage events lagged, skipped {skipped}");
                        handler(&StorageChange {
                            key: key.clone(),
                            new_value: None,
                        });
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
        .abort_handle();
        Subscription::new(move || task.abort())
    }
}

/// JSON key/value file, shared by every process pointing at the same path.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HashMap::new());
            }
            Err(err) => return Err(err.into()),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, payload)?;
        Ok(())
    }
}

impl TokenStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut values = self.load()?;
        match value {
            Some(value) => values.insert(key.to_string(), value.to_string()),
            None => values.remove(key),
        };
        self.save(&values)
    }
}

/// Polls a [`FileStorage`] and reports value changes.
///
/// Writes made by the watching process itself are reported too; the session
/// store ignores notifications that do not change what it already holds.
#[derive(Debug, Clone)]
pub struct FileWatcher {
    storage: FileStorage,
    every: Duration,
}

impl FileWatcher {
    pub fn new(storage: FileStorage, every: Duration) -> Self {
        Self { storage, every }
    }
}

impl StorageEvents for FileWatcher {
    fn subscribe(&self, key: &str, handler: ChangeHandler) -> Subscription {
        let storage = self.storage.clone();
        let every = self.every;
        let key = key.to_string();
        let task = tokio::spawn(async move {
            let mut last = storage.read(&key).ok().flatten();
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let current = match storage.read(&key) {
                    Ok(current) => current,
                    Err(err) => {
                        tracing::debug!("session file unreadable: {err}");
                        continue;
                    }
                };
                if current != last {
                    last = current.clone();
                    handler(&StorageChange {
                        key: key.clone(),
                        new_value: current,
                    });
                }
            }
        })
        .abort_handle();
        Subscription::new(move || task.abort())
    }
}
