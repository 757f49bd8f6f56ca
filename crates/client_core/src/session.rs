use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use shared::protocol::UserProfile;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Persisted session slot. The field names are the storage keys the
/// dashboard has always used, so an existing session file keeps working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store io failure: {0}")]
    Io(#[from] io::Error),
    #[error("session store holds malformed data: {0}")]
    Format(#[from] serde_json::Error),
}

/// Durable key-value slot that survives restarts of the client.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredSession>, StoreError>;
    fn save(&self, session: &StoredSession) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        match fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        let mut file = create_private(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(session)?)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// The slot holds a bearer token: owner read/write only.
#[cfg(unix)]
fn create_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}

#[derive(Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<StoredSession>>,
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        Ok(lock(&self.slot).clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        *lock(&self.slot) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *lock(&self.slot) = None;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { username: String },
    SignedOut,
    /// The server rejected the token. Emitted once per token, however many
    /// requests observed the rejection.
    Expired,
}

/// Explicit session context handed to every component that talks to the
/// API. Cloning shares the same slot.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Box<dyn SessionStore>,
    current: Mutex<Option<StoredSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    /// Opens the context over a durable store, restoring any saved session.
    /// An unreadable slot is treated as signed out.
    pub fn open(store: impl SessionStore + 'static) -> Self {
        let current = match store.load() {
            Ok(current) => current,
            Err(err) => {
                warn!(%err, "discarding unreadable saved session");
                None
            }
        };
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(SessionInner {
                store: Box::new(store),
                current: Mutex::new(current),
                events,
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(MemorySessionStore::default())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn set_session(&self, token: impl Into<String>, user: UserProfile) {
        let session = StoredSession {
            token: token.into(),
            user,
        };
        if let Err(err) = self.inner.store.save(&session) {
            warn!(%err, "failed to persist session; keeping it in memory only");
        }
        let username = session.user.username.clone();
        *lock(&self.inner.current) = Some(session);
        info!(%username, "session started");
        let _ = self.inner.events.send(SessionEvent::SignedIn { username });
    }

    pub fn token(&self) -> Option<String> {
        lock(&self.inner.current)
            .as_ref()
            .map(|session| session.token.clone())
    }

    pub fn user(&self) -> Option<UserProfile> {
        lock(&self.inner.current)
            .as_ref()
            .map(|session| session.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.inner.current).is_some()
    }

    /// Explicit logout.
    pub fn clear(&self) {
        let previous = lock(&self.inner.current).take();
        self.wipe_store();
        if previous.is_some() {
            info!("session cleared");
            let _ = self.inner.events.send(SessionEvent::SignedOut);
        }
    }

    /// Tears the session down after the server rejected `token_used`.
    /// Returns whether this call performed the teardown; callers racing on
    /// the same token, or holding a token that was already replaced, get
    /// `false` and no event is emitted for them.
    pub fn expire(&self, token_used: &str) -> bool {
        {
            let mut current = lock(&self.inner.current);
            match current.as_ref() {
                Some(session) if session.token == token_used => {
                    *current = None;
                }
                _ => return false,
            }
        }
        self.wipe_store();
        warn!("session expired; login required");
        let _ = self.inner.events.send(SessionEvent::Expired);
        true
    }

    fn wipe_store(&self) {
        if let Err(err) = self.inner.store.clear() {
            warn!(%err, "failed to clear persisted session");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
