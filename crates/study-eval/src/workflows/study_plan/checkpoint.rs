//! Durable association between a session id and a suspended run.
//!
//! A pending checkpoint can be claimed exactly once. Claiming removes it from the
//! pending set, so a concurrent second resume sees the session as in progress
//! and a later one sees it as completed.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{SessionId, Stage, StudyPlanState};
use super::engine::InterruptPayload;

/// Everything needed to continue a run from the review gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: SessionId,
    pub stage: Stage,
    pub state: StudyPlanState,
    pub interrupt: InterruptPayload,
    pub suspended_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn at_review(session_id: SessionId, state: StudyPlanState, interrupt: InterruptPayload) -> Self {
        Self {
            session_id,
            stage: Stage::HumanReview,
            state,
            interrupt,
            suspended_at: Utc::now(),
        }
    }

    fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(ttl) = ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()) else {
            return false;
        };
        now - self.suspended_at > ttl
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} was not found or has expired")]
    NotFound(SessionId),
    #[error("session {0} has already been completed")]
    AlreadyCompleted(SessionId),
    #[error("session {0} is already being resumed")]
    InProgress(SessionId),
    #[error("session {0} is already pending review")]
    AlreadyExists(SessionId),
    #[error("checkpoint storage failed at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint for session {session_id} is corrupt: {source}")]
    Corrupt {
        session_id: SessionId,
        #[source]
        source: serde_json::Error,
    },
    #[error("checkpoint store lock poisoned")]
    Poisoned,
}

impl SessionError {
    fn storage(path: &Path, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Key to suspended-run mapping with single-claim semantics.
pub trait CheckpointStore: Send + Sync {
    /// Persist a new suspension. Fails if the id is pending, claimed, or completed.
    fn save_new(&self, checkpoint: Checkpoint) -> Result<(), SessionError>;

    /// Take exclusive ownership of a pending checkpoint.
    fn claim(&self, session_id: &SessionId) -> Result<Checkpoint, SessionError>;

    /// Return a claimed checkpoint to the pending set after a failed resume.
    fn restore(&self, checkpoint: Checkpoint) -> Result<(), SessionError>;

    /// Mark a claimed session as finished; any further claim fails.
    fn complete(&self, session_id: &SessionId) -> Result<(), SessionError>;
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    fn save_new(&self, checkpoint: Checkpoint) -> Result<(), SessionError> {
        (**self).save_new(checkpoint)
    }

    fn claim(&self, session_id: &SessionId) -> Result<Checkpoint, SessionError> {
        (**self).claim(session_id)
    }

    fn restore(&self, checkpoint: Checkpoint) -> Result<(), SessionError> {
        (**self).restore(checkpoint)
    }

    fn complete(&self, session_id: &SessionId) -> Result<(), SessionError> {
        (**self).complete(session_id)
    }
}

#[derive(Debug)]
enum Slot {
    Pending(Checkpoint),
    Claimed,
    Completed,
}

/// Single-process store. Completed sessions keep a tombstone.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    slots: Mutex<HashMap<SessionId, Slot>>,
    ttl: Option<Duration>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| {
                slots
                    .values()
                    .filter(|slot| matches!(slot, Slot::Pending(_)))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save_new(&self, checkpoint: Checkpoint) -> Result<(), SessionError> {
        let mut slots = self.slots.lock().map_err(|_| SessionError::Poisoned)?;
        let session_id = checkpoint.session_id.clone();
        match slots.get(&session_id) {
            Some(Slot::Completed) => Err(SessionError::AlreadyCompleted(session_id)),
            Some(Slot::Pending(existing)) if !existing.is_expired(self.ttl, Utc::now()) => {
                Err(SessionError::AlreadyExists(session_id))
            }
            Some(Slot::Claimed) => Err(SessionError::InProgress(session_id)),
            _ => {
                slots.insert(session_id, Slot::Pending(checkpoint));
                Ok(())
            }
        }
    }

    fn claim(&self, session_id: &SessionId) -> Result<Checkpoint, SessionError> {
        let mut slots = self.slots.lock().map_err(|_| SessionError::Poisoned)?;
        match slots.remove(session_id) {
            Some(Slot::Pending(checkpoint)) => {
                if checkpoint.is_expired(self.ttl, Utc::now()) {
                    tracing::info!(session_id = %session_id, "pending session expired");
                    return Err(SessionError::NotFound(session_id.clone()));
                }
                slots.insert(session_id.clone(), Slot::Claimed);
                Ok(checkpoint)
            }
            Some(Slot::Claimed) => {
                slots.insert(session_id.clone(), Slot::Claimed);
                Err(SessionError::InProgress(session_id.clone()))
            }
            Some(Slot::Completed) => {
                slots.insert(session_id.clone(), Slot::Completed);
                Err(SessionError::AlreadyCompleted(session_id.clone()))
            }
            None => Err(SessionError::NotFound(session_id.clone())),
        }
    }

    fn restore(&self, checkpoint: Checkpoint) -> Result<(), SessionError> {
        let mut slots = self.slots.lock().map_err(|_| SessionError::Poisoned)?;
        slots.insert(checkpoint.session_id.clone(), Slot::Pending(checkpoint));
        Ok(())
    }

    fn complete(&self, session_id: &SessionId) -> Result<(), SessionError> {
        let mut slots = self.slots.lock().map_err(|_| SessionError::Poisoned)?;
        slots.insert(session_id.clone(), Slot::Completed);
        Ok(())
    }
}

/// One JSON file per session under a directory shared by every process.
///
/// `<id>.json` is pending, `<id>.claimed` is being resumed, `<id>.done` marks
/// completion. Claiming is a rename, which only one caller can win.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl FileCheckpointStore {
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| SessionError::storage(&dir, e))?;
        }
        Ok(Self { dir, ttl: None })
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    fn path(&self, session_id: &SessionId, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{extension}", session_id.as_str()))
    }

    fn pending_path(&self, session_id: &SessionId) -> PathBuf {
        self.path(session_id, "json")
    }

    fn claimed_path(&self, session_id: &SessionId) -> PathBuf {
        self.path(session_id, "claimed")
    }

    fn done_path(&self, session_id: &SessionId) -> PathBuf {
        self.path(session_id, "done")
    }

    fn temp_path(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(format!(".{}.{}.tmp", session_id.as_str(), uuid::Uuid::new_v4()))
    }

    fn write_temp(&self, checkpoint: &Checkpoint) -> Result<PathBuf, SessionError> {
        let temp_path = self.temp_path(&checkpoint.session_id);
        let json = serde_json::to_vec_pretty(checkpoint).map_err(|source| SessionError::Corrupt {
            session_id: checkpoint.session_id.clone(),
            source,
        })?;
        let mut file = fs::File::create(&temp_path).map_err(|e| SessionError::storage(&temp_path, e))?;
        file.write_all(&json)
            .map_err(|e| SessionError::storage(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| SessionError::storage(&temp_path, e))?;
        Ok(temp_path)
    }

    /// Move aside a pending checkpoint whose TTL has lapsed so the id can be saved again.
    fn evict_expired(&self, session_id: &SessionId) -> Result<(), SessionError> {
        let pending_path = self.pending_path(session_id);
        let content = match fs::read_to_string(&pending_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(SessionError::storage(&pending_path, err)),
        };
        let expired = serde_json::from_str::<Checkpoint>(&content)
            .map(|existing| existing.is_expired(self.ttl, Utc::now()))
            .unwrap_or(false);
        if !expired {
            return Ok(());
        }

        // A concurrent claim sees either the whole file or none of it.
        let evicted_path = self.temp_path(session_id);
        match fs::rename(&pending_path, &evicted_path) {
            Ok(()) => {
                tracing::info!(session_id = %session_id, "replacing expired pending session");
                let _ = fs::remove_file(&evicted_path);
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SessionError::storage(&pending_path, err)),
        }
    }

    fn claim_error(&self, session_id: &SessionId) -> SessionError {
        // `complete` writes the done marker before it removes the claim file.
        if self.claimed_path(session_id).exists() {
            SessionError::InProgress(session_id.clone())
        } else if self.done_path(session_id).exists() {
            SessionError::AlreadyCompleted(session_id.clone())
        } else {
            SessionError::NotFound(session_id.clone())
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save_new(&self, checkpoint: Checkpoint) -> Result<(), SessionError> {
        let session_id = checkpoint.session_id.clone();
        if self.done_path(&session_id).exists() {
            return Err(SessionError::AlreadyCompleted(session_id));
        }
        if self.claimed_path(&session_id).exists() {
            return Err(SessionError::InProgress(session_id));
        }

        self.evict_expired(&session_id)?;

        let temp_path = self.write_temp(&checkpoint)?;
        let pending_path = self.pending_path(&session_id);
        // hard_link refuses to replace an existing pending checkpoint.
        let linked = fs::hard_link(&temp_path, &pending_path);
        let _ = fs::remove_file(&temp_path);
        match linked {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(SessionError::AlreadyExists(session_id))
            }
            Err(err) => Err(SessionError::storage(&pending_path, err)),
        }
    }

    fn claim(&self, session_id: &SessionId) -> Result<Checkpoint, SessionError> {
        let pending_path = self.pending_path(session_id);
        let claimed_path = self.claimed_path(session_id);

        match fs::rename(&pending_path, &claimed_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(self.claim_error(session_id));
            }
            Err(err) => return Err(SessionError::storage(&pending_path, err)),
        }

        let content =
            fs::read_to_string(&claimed_path).map_err(|e| SessionError::storage(&claimed_path, e))?;
        let checkpoint: Checkpoint =
            serde_json::from_str(&content).map_err(|source| SessionError::Corrupt {
                session_id: session_id.clone(),
                source,
            })?;

        if checkpoint.is_expired(self.ttl, Utc::now()) {
            tracing::info!(session_id = %session_id, "pending session expired");
            fs::remove_file(&claimed_path).map_err(|e| SessionError::storage(&claimed_path, e))?;
            return Err(SessionError::NotFound(session_id.clone()));
        }

        Ok(checkpoint)
    }

    fn restore(&self, checkpoint: Checkpoint) -> Result<(), SessionError> {
        let session_id = checkpoint.session_id.clone();
        let temp_path = self.write_temp(&checkpoint)?;
        let pending_path = self.pending_path(&session_id);
        fs::rename(&temp_path, &pending_path).map_err(|e| SessionError::storage(&pending_path, e))?;

        let claimed_path = self.claimed_path(&session_id);
        match fs::remove_file(&claimed_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SessionError::storage(&claimed_path, err)),
        }
    }

    fn complete(&self, session_id: &SessionId) -> Result<(), SessionError> {
        let done_path = self.done_path(session_id);
        fs::write(&done_path, Utc::now().to_rfc3339().as_bytes())
            .map_err(|e| SessionError::storage(&done_path, e))?;

        let claimed_path = self.claimed_path(session_id);
        match fs::remove_file(&claimed_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SessionError::storage(&claimed_path, err)),
        }
    }
}
