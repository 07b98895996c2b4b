use std::sync::{
    Arc, Mutex, PoisonError, Weak,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::watch;

use crate::{
    error::Result,
    storage::{StorageChange, StorageEvents, Subscription, TokenStorage},
};

/// Storage key of the session token.
pub const TOKEN_KEY: &str = "user-token";

pub type SessionListener = Arc<dyn Fn(Option<&str>) + Send + Sync>;

/// Holds the session token of one browsing context.
///
/// The token is read from storage once when the store is opened. Afterwards
/// it changes only through [`set_token`](Self::set_token) /
/// [`clear_token`](Self::clear_token), or when another context writes the
/// same storage key. A present token counts as authenticated until a request
/// fails with 401: nothing here looks at expiry.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn TokenStorage>,
    token: Mutex<Option<String>>,
    listeners: Mutex<Vec<(u64, SessionListener)>>,
    next_listener: AtomicU64,
    changes: watch::Sender<Option<String>>,
    remote: Mutex<Option<Subscription>>,
}

impl SessionStore {
    pub fn open(storage: Arc<dyn TokenStorage>) -> Result<Self> {
        let token = storage.read(TOKEN_KEY)?;
        let (changes, _) = watch::channel(token.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                storage,
                token: Mutex::new(token),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                changes,
                remote: Mutex::new(None),
            }),
        })
    }

    /// Follows writes made by other contexts through `events`.
    ///
    /// Replaces any previous cross-context subscription.
    pub fn follow(&self, events: &dyn StorageEvents) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let subscription = events.subscribe(
            TOKEN_KEY,
            Arc::new(move |_change: &StorageChange| {
                if let Some(inner) = weak.upgrade() {
                    SessionStore { inner }.resync();
                }
            }),
        );
        *lock(&self.inner.remote) = Some(subscription);
    }

    pub fn token(&self) -> Option<String> {
        lock(&self.inner.token).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.inner.token).is_some()
    }

    pub fn set_token(&self, token: &str) -> Result<()> {
        self.store(Some(token))
    }

    pub fn clear_token(&self) -> Result<()> {
        self.store(None)
    }

    /// Persists and assigns under the token lock, so a concurrent re-read
    /// cannot interleave between the write and the in-memory update.
    fn store(&self, token: Option<&str>) -> Result<()> {
        {
            let mut current = lock(&self.inner.token);
            self.inner.storage.write(TOKEN_KEY, token)?;
            *current = token.map(str::to_string);
        }
        self.notify(token);
        Ok(())
    }

    /// Registers `listener` for every token change, local or remote.
    ///
    /// Local changes are delivered before `set_token`/`clear_token` return.
    pub fn subscribe(
        &self,
        listener: impl Fn(Option<&str>) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).push((id, Arc::new(listener)));

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.listeners).retain(|(other, _)| *other != id);
            }
        })
    }

    /// Async view of the token, for tasks that want to await a change.
    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.inner.changes.subscribe()
    }

    /// Re-reads storage after a cross-context notification. The notification
    /// payload is never trusted. The read and the assignment happen under the
    /// token lock, so the in-memory token always matches some value storage
    /// held after the last local write.
    fn resync(&self) {
        let fresh = {
            let mut current = lock(&self.inner.token);
            let fresh = match self.inner.storage.read(TOKEN_KEY) {
                Ok(fresh) => fresh,
                Err(err) => {
                    tracing::warn!("failed to re-read session after remote change: {err}");
                    return;
                }
            };
            if *current == fresh {
                return;
            }
            current.clone_from(&fresh);
            fresh
        };
        tracing::debug!(authenticated = fresh.is_some(), "session changed in another context");
        self.notify(fresh.as_deref());
    }

    /// Runs outside the token lock: listeners read the store back.
    fn notify(&self, token: Option<&str>) {
        self.inner.changes.send_replace(token.map(str::to_string));

        let listeners: Vec<SessionListener> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(token);
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
