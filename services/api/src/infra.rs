use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use study_eval::config::EvaluationSettings;
use study_eval::error::AppError;
use study_eval::workflows::catalog::ReferenceCatalog;
use study_eval::workflows::study_plan::{
    CaseMemory, CatalogOracle, Checkpoint, CheckpointStore, FileCheckpointStore,
    InMemoryCheckpointStore, JsonlCaseLog, ScoreCard, SessionError, SessionId,
    StudyPlanReviewService, ToolRegistry, WorkflowEngine,
};
use tracing::info;

pub(crate) type ReviewService = StudyPlanReviewService<CatalogOracle, ConfiguredCheckpointStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Checkpoint backend chosen by `STUDY_EVAL_CHECKPOINT_DIR`.
#[derive(Debug)]
pub(crate) enum ConfiguredCheckpointStore {
    InMemory(InMemoryCheckpointStore),
    File(FileCheckpointStore),
}

impl ConfiguredCheckpointStore {
    pub(crate) fn from_settings(settings: &EvaluationSettings) -> Result<Self, SessionError> {
        match &settings.checkpoint_dir {
            Some(dir) => Ok(Self::File(
                FileCheckpointStore::with_dir(dir)?.with_ttl(settings.session_ttl),
            )),
            None => Ok(Self::InMemory(InMemoryCheckpointStore::with_ttl(
                settings.session_ttl,
            ))),
        }
    }

    fn backend(&self) -> &dyn CheckpointStore {
        match self {
            Self::InMemory(store) => store,
            Self::File(store) => store,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "memory",
            Self::File(_) => "file",
        }
    }
}

impl CheckpointStore for ConfiguredCheckpointStore {
    fn save_new(&self, checkpoint: Checkpoint) -> Result<(), SessionError> {
        self.backend().save_new(checkpoint)
    }

    fn claim(&self, session_id: &SessionId) -> Result<Checkpoint, SessionError> {
        self.backend().claim(session_id)
    }

    fn restore(&self, checkpoint: Checkpoint) -> Result<(), SessionError> {
        self.backend().restore(checkpoint)
    }

    fn complete(&self, session_id: &SessionId) -> Result<(), SessionError> {
        self.backend().complete(session_id)
    }
}

pub(crate) fn case_memory(settings: &EvaluationSettings) -> CaseMemory {
    let memory = match &settings.memory_log {
        Some(path) => CaseMemory::new(Arc::new(JsonlCaseLog::new(path))),
        None => CaseMemory::in_memory(),
    };
    memory
        .with_threshold(settings.memory_threshold)
        .with_scan_limit(settings.memory_scan_limit)
}

/// Assemble the review service from reference data, case memory, and the
/// configured checkpoint store.
pub(crate) fn build_review_service(settings: &EvaluationSettings) -> Result<ReviewService, AppError> {
    let catalog = ReferenceCatalog::from_dir(&settings.reference_dir)?;
    let checkpoints = ConfiguredCheckpointStore::from_settings(settings)?;

    info!(
        reference_dir = %settings.reference_dir.display(),
        checkpoints = checkpoints.label(),
        memory_log = settings
            .memory_log
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "in-process".to_string()),
        "study plan workflow configured"
    );

    let engine = WorkflowEngine::new(
        Arc::new(CatalogOracle::new()),
        Arc::new(checkpoints),
        Arc::new(ToolRegistry::new(Arc::new(catalog))),
        Arc::new(case_memory(settings)),
    )
    .with_unknown_action(settings.unknown_action);

    Ok(StudyPlanReviewService::new(engine))
}

/// Parse `scheduling,alignment,workload` for the CLI.
pub(crate) fn parse_scores(raw: &str) -> Result<ScoreCard, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [scheduling, alignment, workload] = parts.as_slice() else {
        return Err(format!(
            "expected three comma-separated scores (scheduling,alignment,workload), got '{raw}'"
        ));
    };

    let parse = |label: &str, value: &str| -> Result<u8, String> {
        value
            .parse::<u8>()
            .ok()
            .filter(|score| *score <= 100)
            .ok_or_else(|| format!("{label} score must be an integer between 0 and 100 (got '{value}')"))
    };

    Ok(ScoreCard::new(
        parse("scheduling", scheduling)?,
        parse("alignment", alignment)?,
        parse("workload", workload)?,
    ))
}
