//! Evaluation state machine.
//!
//! `memory -> scheduling -> alignment -> workload -> synthesis`, with a single
//! suspension point at `human_review` for yellow verdicts that case memory cannot
//! settle. A resumed run re-enters synthesis once and always terminates there.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::checkpoint::{Checkpoint, CheckpointStore, SessionError};
use super::domain::{
    Color, DecisionSource, HumanDecision, ScoreCard, SessionId, Stage, StudyPlanState,
    ValidationError,
};
use super::memory::{CaseMemory, MemoryMatch};
use super::scoring::{
    Classification, OracleError, ScoringOracle, ToolError, ToolId, ToolInput, ToolOutput,
    ToolRegistry,
};
use super::synthesis::{self, DEFAULT_REJECTION_NOTE};

const REVIEW_MESSAGE: &str = "Human review required for YELLOW case evaluation";
const REVIEW_ACTION_HINT: &str = "Choose: 'approve', 'edit', or 'reject'";
const REVIEW_DATA_HINT: &str = "If action='edit', provide new scores as dict";

/// What to do with a resume whose action is missing or unrecognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownActionPolicy {
    /// Reject the resume with a validation error; the session stays pending.
    #[default]
    FailClosed,
    /// Treat it as an approval.
    Approve,
}

impl UnknownActionPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reject" | "fail_closed" | "fail-closed" => Some(Self::FailClosed),
            "approve" => Some(Self::Approve),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub weighted_avg: f64,
    pub color: Color,
    pub scheduling_score: u8,
    pub scheduling_reasoning: String,
    pub alignment_score: u8,
    pub alignment_reasoning: String,
    pub workload_score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewInstructions {
    pub action: String,
    pub data: String,
}

/// Payload handed to the reviewer when a run suspends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptPayload {
    pub message: String,
    pub evaluation_summary: EvaluationSummary,
    pub instructions: ReviewInstructions,
}

impl InterruptPayload {
    pub fn for_state(state: &StudyPlanState) -> Self {
        Self {
            message: REVIEW_MESSAGE.to_string(),
            evaluation_summary: EvaluationSummary {
                weighted_avg: state.weighted_avg.unwrap_or_default(),
                color: state.color.unwrap_or(Color::Yellow),
                scheduling_score: state.scheduling_score.unwrap_or_default(),
                scheduling_reasoning: state
                    .scheduling_reasoning
                    .clone()
                    .unwrap_or_else(|| "N/A".to_string()),
                alignment_score: state.alignment_score.unwrap_or_default(),
                alignment_reasoning: state
                    .alignment_reasoning
                    .clone()
                    .unwrap_or_else(|| "N/A".to_string()),
                workload_score: state.workload_score.unwrap_or_default(),
            },
            instructions: ReviewInstructions {
                action: REVIEW_ACTION_HINT.to_string(),
                data: REVIEW_DATA_HINT.to_string(),
            },
        }
    }
}

/// Reviewer input delivered on resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub action: Option<String>,
    pub data: Option<ScoreCard>,
    pub message: Option<String>,
}

impl ResumePayload {
    pub fn decision(decision: HumanDecision) -> Self {
        Self {
            action: Some(decision.label().to_string()),
            ..Self::default()
        }
    }

    pub fn edit(scores: ScoreCard) -> Self {
        Self {
            action: Some(HumanDecision::Edit.label().to_string()),
            data: Some(scores),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(StudyPlanState),
    Suspended(Checkpoint),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl From<ToolError> for EngineError {
    fn from(value: ToolError) -> Self {
        Self::Oracle(OracleError::Tool(value))
    }
}

pub struct WorkflowEngine<O, C> {
    oracle: Arc<O>,
    checkpoints: Arc<C>,
    tools: Arc<ToolRegistry>,
    memory: Arc<CaseMemory>,
    unknown_action: UnknownActionPolicy,
}

impl<O, C> WorkflowEngine<O, C>
where
    O: ScoringOracle + 'static,
    C: CheckpointStore + 'static,
{
    pub fn new(
        oracle: Arc<O>,
        checkpoints: Arc<C>,
        tools: Arc<ToolRegistry>,
        memory: Arc<CaseMemory>,
    ) -> Self {
        Self {
            oracle,
            checkpoints,
            tools,
            memory,
            unknown_action: UnknownActionPolicy::default(),
        }
    }

    pub fn with_unknown_action(mut self, policy: UnknownActionPolicy) -> Self {
        self.unknown_action = policy;
        self
    }

    pub fn memory(&self) -> &CaseMemory {
        &self.memory
    }

    /// Score and synthesize in one pass with the review gate disabled and
    /// memory lookup skipped.
    pub fn evaluate(&self, study_plan: &str) -> Result<StudyPlanState, EngineError> {
        let mut state = StudyPlanState::new(study_plan);
        self.score(&mut state)?;
        self.synthesize(&mut state)?;
        Ok(state)
    }

    /// Run a fresh evaluation until it completes or suspends for review.
    pub fn start(&self, session_id: SessionId, study_plan: &str) -> Result<RunOutcome, EngineError> {
        let mut state = StudyPlanState::new(study_plan);
        tracing::debug!(session_id = %session_id, stage = Stage::Memory.label(), "fresh run, nothing to restore");

        self.score(&mut state)?;

        let scores = state
            .stage_scores()
            .ok_or_else(|| missing_scores("synthesis"))?;
        let classification = self.weigh(scores)?;
        state.weighted_avg = Some(classification.weighted_avg);
        state.color = Some(classification.color);

        if classification.color == Color::Yellow && state.human_decision.is_none() {
            match self.memory.recall(&state.study_plan) {
                Some(found) => apply_memory_decision(&mut state, found),
                None => return self.suspend(session_id, state),
            }
        }

        self.synthesize(&mut state)?;
        tracing::info!(
            session_id = %session_id,
            color = state.color.map(Color::label).unwrap_or_default(),
            memory_used = state.memory_used,
            "evaluation completed"
        );
        Ok(RunOutcome::Completed(state))
    }

    /// Apply a reviewer decision to a suspended session and run it to completion.
    ///
    /// A session can be resumed once. If the resume fails after the claim, the
    /// checkpoint is put back so the reviewer can retry.
    pub fn resume(
        &self,
        session_id: &SessionId,
        payload: ResumePayload,
    ) -> Result<StudyPlanState, EngineError> {
        let checkpoint = self.checkpoints.claim(session_id)?;
        tracing::info!(session_id = %session_id, stage = checkpoint.stage.label(), "resuming suspended evaluation");

        match self.review(checkpoint.state.clone(), payload) {
            Ok(state) => {
                if let Err(complete_err) = self.checkpoints.complete(session_id) {
                    tracing::warn!(session_id = %session_id, error = %complete_err, "failed to mark checkpoint completed");
                }
                tracing::info!(
                    session_id = %session_id,
                    color = state.color.map(Color::label).unwrap_or_default(),
                    decision = state.human_decision.map(HumanDecision::label).unwrap_or_default(),
                    "evaluation completed after review"
                );
                Ok(state)
            }
            Err(err) => {
                if let Err(restore_err) = self.checkpoints.restore(checkpoint) {
                    tracing::warn!(session_id = %session_id, error = %restore_err, "failed to restore checkpoint");
                }
                Err(err)
            }
        }
    }

    fn score(&self, state: &mut StudyPlanState) -> Result<(), EngineError> {
        let scheduling = self
            .oracle
            .evaluate_scheduling(&state.study_plan, &self.tools.scope(Stage::Scheduling))?;
        ensure_in_range(Stage::Scheduling, scheduling.score)?;
        state.scheduling_score = Some(scheduling.score);
        state.scheduling_reasoning = Some(scheduling.reasoning);
        tracing::debug!(stage = Stage::Scheduling.label(), score = scheduling.score, "stage complete");

        let alignment = self
            .oracle
            .evaluate_alignment(&state.study_plan, &self.tools.scope(Stage::Alignment))?;
        ensure_in_range(Stage::Alignment, alignment.score)?;
        state.alignment_score = Some(alignment.score);
        state.alignment_reasoning = Some(alignment.reasoning);
        tracing::debug!(stage = Stage::Alignment.label(), score = alignment.score, "stage complete");

        let workload = self
            .oracle
            .evaluate_workload(&state.study_plan, &self.tools.scope(Stage::Workload))?;
        ensure_in_range(Stage::Workload, workload.workload_score)?;
        state.workload_score = Some(workload.workload_score);
        state.num_courses = Some(workload.num_courses);
        tracing::debug!(
            stage = Stage::Workload.label(),
            score = workload.workload_score,
            num_courses = workload.num_courses,
            "stage complete"
        );

        Ok(())
    }

    fn weigh(&self, scores: ScoreCard) -> Result<Classification, EngineError> {
        let scope = self.tools.scope(Stage::Synthesis);
        match scope.invoke(ToolId::WeightedScore, ToolInput::Scores(scores))? {
            ToolOutput::Weighted(classification) => Ok(classification),
            other => Err(OracleError::Unscorable {
                stage: Stage::Synthesis.label(),
                reason: format!("unexpected weighted score output {other:?}"),
            }
            .into()),
        }
    }

    fn synthesize(&self, state: &mut StudyPlanState) -> Result<(), EngineError> {
        let scores = state
            .active_scores()
            .ok_or_else(|| missing_scores("synthesis"))?;
        let classification = self.weigh(scores)?;
        let color = if state.human_decision == Some(HumanDecision::Reject) {
            Color::Red
        } else {
            classification.color
        };

        state.weighted_avg = Some(classification.weighted_avg);
        state.color = Some(color);
        state.final_evaluation = Some(synthesis::compose(
            state,
            classification.weighted_avg,
            color,
            scores,
        ));
        tracing::debug!(
            stage = Stage::Synthesis.label(),
            weighted_avg = classification.weighted_avg,
            color = color.label(),
            "stage complete"
        );
        Ok(())
    }

    fn suspend(&self, session_id: SessionId, state: StudyPlanState) -> Result<RunOutcome, EngineError> {
        let interrupt = InterruptPayload::for_state(&state);
        let checkpoint = Checkpoint::at_review(session_id, state, interrupt);
        self.checkpoints.save_new(checkpoint.clone())?;
        tracing::info!(
            session_id = %checkpoint.session_id,
            weighted_avg = checkpoint.interrupt.evaluation_summary.weighted_avg,
            "evaluation suspended for human review"
        );
        Ok(RunOutcome::Suspended(checkpoint))
    }

    fn review(
        &self,
        mut state: StudyPlanState,
        payload: ResumePayload,
    ) -> Result<StudyPlanState, EngineError> {
        let decision = match payload.action.as_deref().and_then(HumanDecision::parse) {
            Some(decision) => decision,
            None => match self.unknown_action {
                UnknownActionPolicy::FailClosed => {
                    return Err(ValidationError::UnknownDecision(
                        payload.action.unwrap_or_default(),
                    )
                    .into())
                }
                UnknownActionPolicy::Approve => {
                    tracing::warn!(action = ?payload.action, "unrecognized review action treated as approve");
                    HumanDecision::Approve
                }
            },
        };

        let overrides = match decision {
            HumanDecision::Edit => {
                let scores = payload.data.ok_or(ValidationError::MissingOverrideScores)?;
                validate_scores(&scores)?;
                Some(scores)
            }
            HumanDecision::Approve | HumanDecision::Reject => None,
        };

        let note = payload
            .message
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
            .or_else(|| {
                (decision == HumanDecision::Reject).then(|| DEFAULT_REJECTION_NOTE.to_string())
            });

        if let Some(entry_id) = self.memory.append(&state.study_plan, decision, overrides) {
            tracing::debug!(entry_id = %entry_id, decision = decision.label(), "decision recorded in case memory");
        }

        state.human_decision = Some(decision);
        state.human_decision_source = Some(DecisionSource::Human);
        state.human_override_scores = overrides;
        state.reviewer_note = note;
        if decision == HumanDecision::Reject {
            state.color = Some(Color::Red);
        }

        self.synthesize(&mut state)?;
        Ok(state)
    }
}

fn apply_memory_decision(state: &mut StudyPlanState, found: MemoryMatch) {
    let decision = found.entry.decision.action;
    tracing::info!(
        entry_id = %found.entry.id,
        similarity = found.similarity,
        decision = decision.label(),
        "reusing prior decision from case memory"
    );

    state.human_decision = Some(decision);
    state.human_decision_source = Some(DecisionSource::Memory);
    state.human_override_scores = match decision {
        HumanDecision::Edit => found.entry.decision.override_scores,
        HumanDecision::Approve | HumanDecision::Reject => None,
    };
    state.memory_used = true;
    state.memory_match_score = Some(found.similarity);
    state.memory_match_id = Some(found.entry.id);
    if decision == HumanDecision::Reject {
        state.color = Some(Color::Red);
    }
}

fn ensure_in_range(stage: Stage, score: u8) -> Result<(), OracleError> {
    if score > 100 {
        return Err(OracleError::OutOfRange {
            stage: stage.label(),
            score: u32::from(score),
        });
    }
    Ok(())
}

fn validate_scores(scores: &ScoreCard) -> Result<(), ValidationError> {
    for (field, value) in [
        ("scheduling_score", scores.scheduling_score),
        ("alignment_score", scores.alignment_score),
        ("workload_score", scores.workload_score),
    ] {
        if value > 100 {
            return Err(ValidationError::ScoreOutOfRange {
                field,
                value: i64::from(value),
            });
        }
    }
    Ok(())
}

fn missing_scores(stage: &'static str) -> OracleError {
    OracleError::Unscorable {
        stage,
        reason: "component scores are missing".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_policy_parses_config_values() {
        assert_eq!(UnknownActionPolicy::parse("reject"), Some(UnknownActionPolicy::FailClosed));
        assert_eq!(UnknownActionPolicy::parse(" Approve "), Some(UnknownActionPolicy::Approve));
        assert_eq!(UnknownActionPolicy::parse("maybe"), None);
        assert_eq!(UnknownActionPolicy::default(), UnknownActionPolicy::FailClosed);
    }

    #[test]
    fn interrupt_payload_carries_summary_and_instructions() {
        let mut state = StudyPlanState::new("CS101");
        state.scheduling_score = Some(60);
        state.alignment_score = Some(55);
        state.alignment_reasoning = Some("Half on program.".into());
        state.workload_score = Some(60);
        state.weighted_avg = Some(58.75);
        state.color = Some(Color::Yellow);

        let payload = InterruptPayload::for_state(&state);
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["message"], REVIEW_MESSAGE);
        assert_eq!(json["evaluation_summary"]["color"], "yellow");
        assert_eq!(json["evaluation_summary"]["scheduling_reasoning"], "N/A");
        assert_eq!(json["evaluation_summary"]["alignment_score"], 55);
        assert_eq!(json["instructions"]["action"], REVIEW_ACTION_HINT);
    }

    #[test]
    fn override_scores_above_range_are_rejected() {
        assert!(validate_scores(&ScoreCard::new(100, 0, 50)).is_ok());
        assert_eq!(
            validate_scores(&ScoreCard::new(90, 101, 50)),
            Err(ValidationError::ScoreOutOfRange {
                field: "alignment_score",
                value: 101
            })
        );
    }
}
