//! Case memory: prior human decisions retrieved by textual similarity so that
//! near-duplicate plans are not sent back to a reviewer.
//!
//! Every read and write failure is absorbed here and reported as "no memory".

mod fingerprint;
mod log;
mod similarity;

pub use fingerprint::{normalize, CaseFingerprint};
pub use log::{CaseLog, CaseMemoryEntry, InMemoryCaseLog, JsonlCaseLog, MemoryError, RecordedDecision};
pub use similarity::{jaccard, sequence_ratio, BlendedSimilarity, Similarity};

use std::sync::Arc;

use super::domain::{HumanDecision, ScoreCard};
use crate::error::FailOpen;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;
pub const DEFAULT_SCAN_LIMIT: usize = 2000;

/// Best-scoring prior case for a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMatch {
    pub entry: CaseMemoryEntry,
    pub similarity: f64,
}

pub struct CaseMemory {
    log: Arc<dyn CaseLog>,
    similarity: Arc<dyn Similarity>,
    threshold: f64,
    scan_limit: usize,
}

impl CaseMemory {
    pub fn new(log: Arc<dyn CaseLog>) -> Self {
        Self {
            log,
            similarity: Arc::new(BlendedSimilarity::default()),
            threshold: DEFAULT_MATCH_THRESHOLD,
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCaseLog::new()))
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_scan_limit(mut self, scan_limit: usize) -> Self {
        self.scan_limit = scan_limit;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Record a live decision. Returns the new entry id, or `None` if the log
    /// could not be written.
    pub fn append(
        &self,
        study_plan: &str,
        action: HumanDecision,
        override_scores: Option<ScoreCard>,
    ) -> Option<String> {
        let entry = CaseMemoryEntry::new(
            CaseFingerprint::of(study_plan),
            RecordedDecision {
                action,
                override_scores,
            },
        );
        let id = entry.id.clone();
        self.log
            .append(&entry)
            .map(|()| Some(id))
            .fail_open_with("appending case memory", None)
    }

    /// Highest-similarity entry among the most recent ones, regardless of threshold.
    pub fn find_best_match(&self, study_plan: &str) -> Option<MemoryMatch> {
        let entries = self
            .log
            .recent(self.scan_limit)
            .fail_open_default("reading case memory");
        let case = CaseFingerprint::of(study_plan);

        // Newest entries win ties and exact duplicates.
        if let Some(entry) = entries.iter().rev().find(|entry| entry.case.hash == case.hash) {
            return Some(MemoryMatch {
                entry: entry.clone(),
                similarity: 1.0,
            });
        }

        let mut best: Option<MemoryMatch> = None;
        for entry in entries.into_iter().rev() {
            let similarity = self.similarity.similarity(&case, &entry.case);
            if best.as_ref().map_or(true, |current| similarity > current.similarity) {
                best = Some(MemoryMatch { entry, similarity });
            }
        }
        best
    }

    /// Best match only if it clears the reuse threshold.
    pub fn recall(&self, study_plan: &str) -> Option<MemoryMatch> {
        let found = self.find_best_match(study_plan)?;
        if found.similarity < self.threshold {
            tracing::debug!(
                similarity = found.similarity,
                threshold = self.threshold,
                "closest case below reuse threshold"
            );
            return None;
        }
        let decision = &found.entry.decision;
        if decision.action == HumanDecision::Edit && decision.override_scores.is_none() {
            tracing::warn!(
                entry_id = %found.entry.id,
                "matching edit decision has no override scores"
            );
            return None;
        }
        Some(found)
    }
}

impl std::fmt::Debug for CaseMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseMemory")
            .field("threshold", &self.threshold)
            .field("scan_limit", &self.scan_limit)
            .finish_non_exhaustive()
    }
}
