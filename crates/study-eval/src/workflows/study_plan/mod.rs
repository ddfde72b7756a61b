//! Study plan evaluation: component scoring, weighted verdicts, and a human
//! review gate for borderline (yellow) plans backed by case memory.

pub mod checkpoint;
pub mod domain;
pub mod engine;
pub mod memory;
pub mod router;
pub mod scoring;
pub mod service;
pub(crate) mod synthesis;

#[cfg(test)]
mod tests;

pub use checkpoint::{
    Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, SessionError,
};
pub use domain::{
    Color, DecisionSource, HumanDecision, ScoreCard, SessionId, Stage, StudyPlanEvaluation,
    StudyPlanState, ValidationError,
};
pub use engine::{
    EngineError, InterruptPayload, ResumePayload, RunOutcome, UnknownActionPolicy, WorkflowEngine,
};
pub use memory::{CaseLog, CaseMemory, InMemoryCaseLog, JsonlCaseLog, MemoryMatch};
pub use router::study_plan_router;
pub use scoring::{
    classify, CatalogOracle, Classification, OracleError, ScoringOracle, SubScore, ToolId,
    ToolRegistry, WorkloadAssessment,
};
pub use service::{
    DecisionRequest, EditedScores, EvaluationView, HitlResponse, StudyPlanReviewService,
    StudyPlanServiceError,
};
