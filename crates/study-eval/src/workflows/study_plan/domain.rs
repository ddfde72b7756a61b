use serde::{Deserialize, Serialize};

/// Identifier correlating a suspended run with its resume call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    const MAX_LEN: usize = 128;

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Accept caller-supplied ids that are safe to use as storage keys and file names.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= Self::MAX_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position in the evaluation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Memory,
    Scheduling,
    Alignment,
    Workload,
    Synthesis,
    HumanReview,
    Done,
}

impl Stage {
    pub const fn label(self) -> &'static str {
        match self {
            Stage::Memory => "memory",
            Stage::Scheduling => "scheduling",
            Stage::Alignment => "alignment",
            Stage::Workload => "workload",
            Stage::Synthesis => "synthesis",
            Stage::HumanReview => "human_review",
            Stage::Done => "done",
        }
    }
}

/// Traffic-light verdict for a weighted average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Yellow,
    Green,
}

impl Color {
    pub const fn label(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Yellow => "yellow",
            Color::Green => "green",
        }
    }
}

/// Outcome of a review, whether given live or reused from case memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanDecision {
    Approve,
    Edit,
    Reject,
}

impl HumanDecision {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "edit" => Some(Self::Edit),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            HumanDecision::Approve => "approve",
            HumanDecision::Edit => "edit",
            HumanDecision::Reject => "reject",
        }
    }

    pub const fn past_tense(self) -> &'static str {
        match self {
            HumanDecision::Approve => "approved",
            HumanDecision::Edit => "edited",
            HumanDecision::Reject => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Human,
    Memory,
}

/// The three component scores, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub scheduling_score: u8,
    pub alignment_score: u8,
    pub workload_score: u8,
}

impl ScoreCard {
    pub const fn new(scheduling_score: u8, alignment_score: u8, workload_score: u8) -> Self {
        Self {
            scheduling_score,
            alignment_score,
            workload_score,
        }
    }

    pub fn is_within_bounds(&self) -> bool {
        [
            self.scheduling_score,
            self.alignment_score,
            self.workload_score,
        ]
        .iter()
        .all(|score| *score <= 100)
    }
}

/// Final structured evaluation, present once a run reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlanEvaluation {
    pub weighted_avg: f64,
    pub color: Color,
    pub overall_recommendation: String,
    pub reasoning: String,
    pub scores: ScoreCard,
}

/// Mutable record for one evaluation run; persisted whole at suspension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlanState {
    pub study_plan: String,
    pub scheduling_score: Option<u8>,
    pub scheduling_reasoning: Option<String>,
    pub alignment_score: Option<u8>,
    pub alignment_reasoning: Option<String>,
    pub workload_score: Option<u8>,
    pub num_courses: Option<u32>,
    pub weighted_avg: Option<f64>,
    pub color: Option<Color>,
    pub final_evaluation: Option<StudyPlanEvaluation>,
    pub human_decision: Option<HumanDecision>,
    pub human_decision_source: Option<DecisionSource>,
    pub human_override_scores: Option<ScoreCard>,
    pub reviewer_note: Option<String>,
    pub memory_used: bool,
    pub memory_match_score: Option<f64>,
    pub memory_match_id: Option<String>,
}

impl StudyPlanState {
    pub fn new(study_plan: impl Into<String>) -> Self {
        Self {
            study_plan: study_plan.into(),
            scheduling_score: None,
            scheduling_reasoning: None,
            alignment_score: None,
            alignment_reasoning: None,
            workload_score: None,
            num_courses: None,
            weighted_avg: None,
            color: None,
            final_evaluation: None,
            human_decision: None,
            human_decision_source: None,
            human_override_scores: None,
            reviewer_note: None,
            memory_used: false,
            memory_match_score: None,
            memory_match_id: None,
        }
    }

    /// Scores produced by the scoring stages, if all three have run.
    pub fn stage_scores(&self) -> Option<ScoreCard> {
        Some(ScoreCard::new(
            self.scheduling_score?,
            self.alignment_score?,
            self.workload_score?,
        ))
    }

    /// Scores synthesis should use: the reviewer's overrides when present.
    pub fn active_scores(&self) -> Option<ScoreCard> {
        self.human_override_scores.or_else(|| self.stage_scores())
    }

    pub fn is_terminal(&self) -> bool {
        self.final_evaluation.is_some()
    }
}

/// Request problems detected before the engine does any work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("study_plan must not be empty")]
    EmptyStudyPlan,
    #[error("thread_id must not be empty")]
    MissingThreadId,
    #[error("thread_id '{0}' may only contain letters, digits, '-' and '_' (max 128)")]
    InvalidThreadId(String),
    #[error("decision must be one of approve, edit, reject (got '{0}')")]
    UnknownDecision(String),
    #[error("edited_scores with scheduling_score, alignment_score and workload_score are required when decision is edit")]
    MissingOverrideScores,
    #[error("{field} must be between 0 and 100 (got {value})")]
    ScoreOutOfRange { field: &'static str, value: i64 },
    #[error("invalid request body: {0}")]
    MalformedBody(String),
}
