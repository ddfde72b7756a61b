use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fingerprint::CaseFingerprint;
use crate::workflows::study_plan::domain::{HumanDecision, ScoreCard};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedDecision {
    pub action: HumanDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_scores: Option<ScoreCard>,
}

/// One immutable human decision in the case log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMemoryEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub case: CaseFingerprint,
    pub decision: RecordedDecision,
}

impl CaseMemoryEntry {
    pub fn new(case: CaseFingerprint, decision: RecordedDecision) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            case,
            decision,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("case log {path} is unavailable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode case memory entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("case log lock poisoned")]
    Poisoned,
}

/// Append-only store of decisions.
pub trait CaseLog: Send + Sync {
    fn append(&self, entry: &CaseMemoryEntry) -> Result<(), MemoryError>;

    /// Up to `limit` most recent entries, oldest first.
    fn recent(&self, limit: usize) -> Result<Vec<CaseMemoryEntry>, MemoryError>;
}

impl<T: CaseLog + ?Sized> CaseLog for Arc<T> {
    fn append(&self, entry: &CaseMemoryEntry) -> Result<(), MemoryError> {
        (**self).append(entry)
    }

    fn recent(&self, limit: usize) -> Result<Vec<CaseMemoryEntry>, MemoryError> {
        (**self).recent(limit)
    }
}

/// Newline-delimited JSON file. Each entry is written with a single `write_all`
/// and synced before the append returns; readers skip lines that do not parse.
#[derive(Debug)]
pub struct JsonlCaseLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl JsonlCaseLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> MemoryError {
        MemoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CaseLog for JsonlCaseLog {
    fn append(&self, entry: &CaseMemoryEntry) -> Result<(), MemoryError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.writer.lock().map_err(|_| MemoryError::Poisoned)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        // A torn tail must not swallow the entry written after it.
        if !ends_with_newline(&mut file).map_err(|e| self.io_error(e))? {
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))?;
        file.sync_data().map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<CaseMemoryEntry>, MemoryError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_error(err)),
        };

        let mut window = VecDeque::with_capacity(limit.min(1024));
        // Raw byte lines: a write torn inside a multibyte character is skipped
        // like any other unparseable line.
        for line in BufReader::new(file).split(b'\n') {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<CaseMemoryEntry>(&line) {
                Ok(entry) => {
                    if window.len() == limit {
                        window.pop_front();
                    }
                    if limit > 0 {
                        window.push_back(entry);
                    }
                }
                Err(err) => {
                    tracing::debug!(path = %self.path.display(), error = %err, "skipping unreadable case log line");
                }
            }
        }

        Ok(window.into_iter().collect())
    }
}

/// True for an empty file or one whose last byte is a newline.
fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Process-local log for tests and single-process deployments without a log file.
#[derive(Debug, Default)]
pub struct InMemoryCaseLog {
    entries: Mutex<Vec<CaseMemoryEntry>>,
}

impl InMemoryCaseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CaseLog for InMemoryCaseLog {
    fn append(&self, entry: &CaseMemoryEntry) -> Result<(), MemoryError> {
        let mut entries = self.entries.lock().map_err(|_| MemoryError::Poisoned)?;
        entries.push(entry.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<CaseMemoryEntry>, MemoryError> {
        let entries = self.entries.lock().map_err(|_| MemoryError::Poisoned)?;
        let start = entries.len().saturating_sub(limit);
        Ok(entries[start..].to_vec())
    }
}
