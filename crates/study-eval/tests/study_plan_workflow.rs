use std::sync::Arc;

use study_eval::workflows::catalog::ReferenceCatalog;
use study_eval::workflows::study_plan::{
    CaseMemory, CatalogOracle, CheckpointStore, Color, DecisionSource, EngineError,
    FileCheckpointStore, HumanDecision, InMemoryCheckpointStore, ResumePayload, RunOutcome,
    ScoreCard, SessionError, SessionId, StudyPlanState, ToolRegistry, WorkflowEngine,
};

const GREEN_PLAN: &str = include_str!("../../../data/plans/green.txt");
const YELLOW_PLAN: &str = include_str!("../../../data/plans/yellow.txt");
const RED_PLAN: &str = include_str!("../../../data/plans/red.txt");

fn reference_tools() -> Arc<ToolRegistry> {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../../data/reference");
    let catalog = ReferenceCatalog::from_dir(dir).expect("reference tables load");
    Arc::new(ToolRegistry::new(Arc::new(catalog)))
}

fn engine_with<C: CheckpointStore + 'static>(
    checkpoints: Arc<C>,
    memory: Arc<CaseMemory>,
) -> WorkflowEngine<CatalogOracle, C> {
    WorkflowEngine::new(
        Arc::new(CatalogOracle::new()),
        checkpoints,
        reference_tools(),
        memory,
    )
}

fn engine() -> WorkflowEngine<CatalogOracle, InMemoryCheckpointStore> {
    engine_with(
        Arc::new(InMemoryCheckpointStore::new()),
        Arc::new(CaseMemory::in_memory()),
    )
}

fn session(id: &str) -> SessionId {
    SessionId(id.to_string())
}

fn expect_completed(outcome: RunOutcome) -> StudyPlanState {
    match outcome {
        RunOutcome::Completed(state) => state,
        RunOutcome::Suspended(checkpoint) => {
            panic!("expected completion, suspended at {:?}", checkpoint.stage)
        }
    }
}

#[test]
fn conflict_free_plan_is_green_without_review() {
    let engine = engine();
    let state = expect_completed(engine.start(session("green"), GREEN_PLAN).expect("start"));

    assert_eq!(state.stage_scores(), Some(ScoreCard::new(100, 100, 80)));
    assert_eq!(state.num_courses, Some(5));
    assert_eq!(state.weighted_avg, Some(90.0));
    assert_eq!(state.color, Some(Color::Green));
    assert!(state.human_decision.is_none());

    let evaluation = state.final_evaluation.expect("final evaluation");
    assert_eq!(evaluation.color, Color::Green);
    assert!(evaluation.reasoning.contains("without human review"));
}

#[test]
fn overloaded_off_program_plan_is_red() {
    let state = engine().evaluate(RED_PLAN).expect("evaluate");

    assert_eq!(state.stage_scores(), Some(ScoreCard::new(55, 7, 30)));
    assert_eq!(state.num_courses, Some(12));
    assert_eq!(state.weighted_avg, Some(30.5));
    assert_eq!(state.color, Some(Color::Red));
    assert!(state
        .alignment_reasoning
        .as_deref()
        .expect("alignment reasoning")
        .contains("MUS101"));
}

#[test]
fn borderline_plan_waits_for_review_then_completes() {
    let engine = engine();
    let id = session("yellow-approve");

    let checkpoint = match engine.start(id.clone(), YELLOW_PLAN).expect("start") {
        RunOutcome::Suspended(checkpoint) => checkpoint,
        RunOutcome::Completed(state) => panic!("expected suspension, got {:?}", state.color),
    };
    assert_eq!(checkpoint.session_id, id);
    assert_eq!(checkpoint.interrupt.evaluation_summary.weighted_avg, 66.25);
    assert_eq!(checkpoint.interrupt.evaluation_summary.color, Color::Yellow);
    assert!(checkpoint.state.final_evaluation.is_none());
    assert!(checkpoint
        .state
        .scheduling_reasoning
        .as_deref()
        .expect("scheduling reasoning")
        .contains("lecture clash on Mon slot 1"));

    let state = engine
        .resume(&id, ResumePayload::decision(HumanDecision::Approve))
        .expect("resume");
    assert_eq!(state.color, Some(Color::Yellow));
    assert_eq!(state.human_decision, Some(HumanDecision::Approve));
    assert_eq!(state.human_decision_source, Some(DecisionSource::Human));
    assert!(state.is_terminal());
}

#[test]
fn approved_case_is_reused_for_the_same_plan() {
    let engine = engine();
    let first = session("first");
    engine.start(first.clone(), YELLOW_PLAN).expect("start");
    engine
        .resume(&first, ResumePayload::decision(HumanDecision::Approve))
        .expect("resume");

    let state = expect_completed(engine.start(session("second"), YELLOW_PLAN).expect("start"));
    assert!(state.memory_used);
    assert_eq!(state.memory_match_score, Some(1.0));
    assert_eq!(state.human_decision_source, Some(DecisionSource::Memory));
    assert_eq!(state.color, Some(Color::Yellow));
    assert!(state
        .final_evaluation
        .expect("final evaluation")
        .reasoning
        .contains("case memory entry"));
}

#[test]
fn reviewer_edit_rescores_the_plan() {
    let engine = engine();
    let id = session("yellow-edit");
    engine.start(id.clone(), YELLOW_PLAN).expect("start");

    let state = engine
        .resume(&id, ResumePayload::edit(ScoreCard::new(90, 90, 90)))
        .expect("resume");
    assert_eq!(state.human_override_scores, Some(ScoreCard::new(90, 90, 90)));
    assert_eq!(state.weighted_avg, Some(90.0));
    assert_eq!(state.color, Some(Color::Green));

    let evaluation = state.final_evaluation.expect("final evaluation");
    assert_eq!(evaluation.scores, ScoreCard::new(90, 90, 90));
    assert!(evaluation.reasoning.contains("scheduling 75"));
}

#[test]
fn rejection_forces_red_and_sessions_resume_once() {
    let engine = engine();
    let id = session("yellow-reject");
    engine.start(id.clone(), YELLOW_PLAN).expect("start");

    let state = engine
        .resume(&id, ResumePayload::decision(HumanDecision::Reject))
        .expect("resume");
    assert_eq!(state.color, Some(Color::Red));
    assert_eq!(state.weighted_avg, Some(66.25));
    assert_eq!(
        state.reviewer_note.as_deref(),
        Some("Study plan requires major revisions.")
    );

    let err = engine
        .resume(&id, ResumePayload::decision(HumanDecision::Approve))
        .expect_err("second resume");
    assert!(matches!(
        err,
        EngineError::Session(SessionError::AlreadyCompleted(_))
    ));
}

#[test]
fn file_checkpoints_survive_an_engine_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let memory = Arc::new(CaseMemory::in_memory());
    let id = session("durable");

    {
        let store = FileCheckpointStore::with_dir(dir.path()).expect("store");
        let engine = engine_with(Arc::new(store), memory.clone());
        let outcome = engine.start(id.clone(), YELLOW_PLAN).expect("start");
        assert!(matches!(outcome, RunOutcome::Suspended(_)));
    }

    let store = FileCheckpointStore::with_dir(dir.path()).expect("reopened store");
    let engine = engine_with(Arc::new(store), memory);
    let state = engine
        .resume(
            &id,
            ResumePayload::decision(HumanDecision::Approve).with_message("Checked with the advisor."),
        )
        .expect("resume after restart");
    assert_eq!(state.color, Some(Color::Yellow));
    assert_eq!(state.reviewer_note.as_deref(), Some("Checked with the advisor."));
}
