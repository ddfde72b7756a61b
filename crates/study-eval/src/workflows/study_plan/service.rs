use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::checkpoint::{CheckpointStore, SessionError};
use super::domain::{Color, HumanDecision, ScoreCard, SessionId, StudyPlanState, ValidationError};
use super::engine::{EngineError, InterruptPayload, ResumePayload, RunOutcome, WorkflowEngine};
use super::scoring::{OracleError, ScoringOracle};

const REVIEW_ACTION_NAME: &str = "human_review";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluateRequest {
    pub study_plan: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartRequest {
    pub study_plan: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Reviewer score overrides as submitted; range checks happen in validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EditedScores {
    #[serde(default)]
    pub scheduling_score: Option<i64>,
    #[serde(default)]
    pub alignment_score: Option<i64>,
    #[serde(default)]
    pub workload_score: Option<i64>,
}

impl From<ScoreCard> for EditedScores {
    fn from(scores: ScoreCard) -> Self {
        Self {
            scheduling_score: Some(i64::from(scores.scheduling_score)),
            alignment_score: Some(i64::from(scores.alignment_score)),
            workload_score: Some(i64::from(scores.workload_score)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub edited_scores: Option<EditedScores>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReasons {
    pub scheduling: String,
    pub alignment: String,
    pub overall: String,
}

/// Response body of the synchronous evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationView {
    pub scores: ScoreCard,
    pub color: Color,
    pub weighted_avg: f64,
    pub reasons: EvaluationReasons,
    pub raw: StudyPlanState,
}

impl EvaluationView {
    fn from_state(state: StudyPlanState) -> Result<Self, StudyPlanServiceError> {
        let Some(evaluation) = state.final_evaluation.clone() else {
            return Err(StudyPlanServiceError::Engine(EngineError::Oracle(
                OracleError::Unscorable {
                    stage: "synthesis",
                    reason: "no final evaluation produced".to_string(),
                },
            )));
        };
        Ok(Self {
            scores: evaluation.scores,
            color: evaluation.color,
            weighted_avg: evaluation.weighted_avg,
            reasons: EvaluationReasons {
                scheduling: state.scheduling_reasoning.clone().unwrap_or_default(),
                alignment: state.alignment_reasoning.clone().unwrap_or_default(),
                overall: evaluation.reasoning,
            },
            raw: state,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewAction {
    pub name: String,
    pub description: String,
    pub details: InterruptPayload,
}

/// Outcome of a review-enabled call: finished, or waiting on a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HitlResponse {
    Complete {
        thread_id: SessionId,
        result: StudyPlanState,
    },
    Interrupt {
        thread_id: SessionId,
        action: ReviewAction,
        result: StudyPlanState,
    },
}

impl HitlResponse {
    pub fn thread_id(&self) -> &SessionId {
        match self {
            HitlResponse::Complete { thread_id, .. } | HitlResponse::Interrupt { thread_id, .. } => {
                thread_id
            }
        }
    }

    pub fn result(&self) -> &StudyPlanState {
        match self {
            HitlResponse::Complete { result, .. } | HitlResponse::Interrupt { result, .. } => result,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, HitlResponse::Interrupt { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HitlResponse::Complete { .. } => StatusCode::OK,
            HitlResponse::Interrupt { .. } => StatusCode::ACCEPTED,
        }
    }
}

/// Request-facing entry point: validates input, then drives the engine.
pub struct StudyPlanReviewService<O, C> {
    engine: Arc<WorkflowEngine<O, C>>,
}

impl<O, C> StudyPlanReviewService<O, C>
where
    O: ScoringOracle + 'static,
    C: CheckpointStore + 'static,
{
    pub fn new(engine: WorkflowEngine<O, C>) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &WorkflowEngine<O, C> {
        &self.engine
    }

    /// Synchronous evaluation without the review gate.
    pub fn evaluate(&self, study_plan: &str) -> Result<EvaluationView, StudyPlanServiceError> {
        let study_plan = validate_study_plan(study_plan)?;
        let state = self.engine.evaluate(study_plan)?;
        EvaluationView::from_state(state)
    }

    pub fn start_evaluation(
        &self,
        study_plan: &str,
        thread_id: Option<&str>,
    ) -> Result<HitlResponse, StudyPlanServiceError> {
        let study_plan = validate_study_plan(study_plan)?;
        let session_id = match thread_id.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => SessionId::parse(raw)
                .ok_or_else(|| ValidationError::InvalidThreadId(raw.to_string()))?,
            None => SessionId::generate(),
        };

        match self.engine.start(session_id.clone(), study_plan)? {
            RunOutcome::Completed(state) => Ok(HitlResponse::Complete {
                thread_id: session_id,
                result: state,
            }),
            RunOutcome::Suspended(checkpoint) => Ok(HitlResponse::Interrupt {
                thread_id: checkpoint.session_id,
                action: ReviewAction {
                    name: REVIEW_ACTION_NAME.to_string(),
                    description: checkpoint.interrupt.message.clone(),
                    details: checkpoint.interrupt,
                },
                result: checkpoint.state,
            }),
        }
    }

    pub fn submit_decision(
        &self,
        request: DecisionRequest,
    ) -> Result<HitlResponse, StudyPlanServiceError> {
        let (session_id, payload) = validate_decision(request)?;
        let state = self.engine.resume(&session_id, payload)?;
        Ok(HitlResponse::Complete {
            thread_id: session_id,
            result: state,
        })
    }
}

fn validate_study_plan(study_plan: &str) -> Result<&str, ValidationError> {
    if study_plan.trim().is_empty() {
        return Err(ValidationError::EmptyStudyPlan);
    }
    Ok(study_plan)
}

/// Check a decision request completely before any session is touched.
pub fn validate_decision(
    request: DecisionRequest,
) -> Result<(SessionId, ResumePayload), ValidationError> {
    let raw_thread = request.thread_id.trim();
    if raw_thread.is_empty() {
        return Err(ValidationError::MissingThreadId);
    }
    let session_id = SessionId::parse(raw_thread)
        .ok_or_else(|| ValidationError::InvalidThreadId(raw_thread.to_string()))?;

    let decision = HumanDecision::parse(&request.decision)
        .ok_or_else(|| ValidationError::UnknownDecision(request.decision.clone()))?;

    let data = match decision {
        HumanDecision::Edit => {
            let edited = request
                .edited_scores
                .ok_or(ValidationError::MissingOverrideScores)?;
            Some(score_card(edited)?)
        }
        HumanDecision::Approve | HumanDecision::Reject => None,
    };

    Ok((
        session_id,
        ResumePayload {
            action: Some(decision.label().to_string()),
            data,
            message: request.message,
        },
    ))
}

fn score_card(edited: EditedScores) -> Result<ScoreCard, ValidationError> {
    let field = |name: &'static str, value: Option<i64>| -> Result<u8, ValidationError> {
        let value = value.ok_or(ValidationError::MissingOverrideScores)?;
        u8::try_from(value)
            .ok()
            .filter(|score| *score <= 100)
            .ok_or(ValidationError::ScoreOutOfRange { field: name, value })
    };
    Ok(ScoreCard::new(
        field("scheduling_score", edited.scheduling_score)?,
        field("alignment_score", edited.alignment_score)?,
        field("workload_score", edited.workload_score)?,
    ))
}

/// Error raised by the study plan review service.
#[derive(Debug, thiserror::Error)]
pub enum StudyPlanServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl StudyPlanServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StudyPlanServiceError::Validation(_)
            | StudyPlanServiceError::Engine(EngineError::Validation(_)) => StatusCode::BAD_REQUEST,
            StudyPlanServiceError::Engine(EngineError::Session(
                SessionError::NotFound(_),
            )) => StatusCode::NOT_FOUND,
            StudyPlanServiceError::Engine(EngineError::Session(
                SessionError::AlreadyCompleted(_)
                | SessionError::InProgress(_)
                | SessionError::AlreadyExists(_),
            )) => StatusCode::CONFLICT,
            StudyPlanServiceError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message; internal failures stay opaque.
    pub fn public_message(&self) -> String {
        match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR => "evaluation failed".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for StudyPlanServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "study plan evaluation failed");
        }
        let payload = json!({
            "error": self.public_message(),
        });
        (status, axum::Json(payload)).into_response()
    }
}
