use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::workflows::catalog::ReferenceCatalog;
use crate::workflows::study_plan::checkpoint::InMemoryCheckpointStore;
use crate::workflows::study_plan::memory::{CaseMemory, InMemoryCaseLog};
use crate::workflows::study_plan::scoring::{
    OracleError, ScoringOracle, SubScore, ToolRegistry, ToolScope, WorkloadAssessment,
};
use crate::workflows::study_plan::{study_plan_router, StudyPlanReviewService, WorkflowEngine};

pub(super) const YELLOW_PLAN: &str = "Major: Computer Science\nFall: CS101, CS102, MA201, PHY110";
pub(super) const OTHER_PLAN: &str = "Major: History\nSpring: HIS210 HIS220 ART101 LAT300 PHI150";

/// Oracle returning fixed scores and counting how often it was consulted.
pub(super) struct ScriptedOracle {
    scheduling: u8,
    alignment: u8,
    workload: u8,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub(super) fn new(scheduling: u8, alignment: u8, workload: u8) -> Self {
        Self {
            scheduling,
            alignment,
            workload,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn uniform(score: u8) -> Self {
        Self::new(score, score, score)
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScoringOracle for ScriptedOracle {
    fn evaluate_scheduling(
        &self,
        _study_plan: &str,
        _tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SubScore {
            score: self.scheduling,
            reasoning: format!("Scheduling scripted at {}.", self.scheduling),
        })
    }

    fn evaluate_alignment(
        &self,
        _study_plan: &str,
        _tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SubScore {
            score: self.alignment,
            reasoning: format!("Alignment scripted at {}.", self.alignment),
        })
    }

    fn evaluate_workload(
        &self,
        _study_plan: &str,
        _tools: &ToolScope<'_>,
    ) -> Result<WorkloadAssessment, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(WorkloadAssessment {
            workload_score: self.workload,
            num_courses: 4,
        })
    }
}

/// Oracle whose alignment stage cannot produce a score.
pub(super) struct FailingOracle;

impl ScoringOracle for FailingOracle {
    fn evaluate_scheduling(
        &self,
        _study_plan: &str,
        _tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError> {
        Ok(SubScore {
            score: 70,
            reasoning: "fine".to_string(),
        })
    }

    fn evaluate_alignment(
        &self,
        _study_plan: &str,
        _tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError> {
        Err(OracleError::Unscorable {
            stage: "alignment",
            reason: "upstream model returned no score".to_string(),
        })
    }

    fn evaluate_workload(
        &self,
        _study_plan: &str,
        _tools: &ToolScope<'_>,
    ) -> Result<WorkloadAssessment, OracleError> {
        Ok(WorkloadAssessment {
            workload_score: 80,
            num_courses: 3,
        })
    }
}

pub(super) struct Harness<O> {
    pub(super) oracle: Arc<O>,
    pub(super) log: Arc<InMemoryCaseLog>,
    pub(super) checkpoints: Arc<InMemoryCheckpointStore>,
}

impl<O: ScoringOracle + 'static> Harness<O> {
    pub(super) fn new(oracle: O) -> Self {
        Self {
            oracle: Arc::new(oracle),
            log: Arc::new(InMemoryCaseLog::new()),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
        }
    }

    pub(super) fn engine(&self) -> WorkflowEngine<O, InMemoryCheckpointStore> {
        WorkflowEngine::new(
            self.oracle.clone(),
            self.checkpoints.clone(),
            tool_registry(),
            Arc::new(CaseMemory::new(self.log.clone())),
        )
    }

    pub(super) fn service(&self) -> StudyPlanReviewService<O, InMemoryCheckpointStore> {
        StudyPlanReviewService::new(self.engine())
    }

    pub(super) fn router(&self) -> axum::Router {
        study_plan_router(Arc::new(self.service()))
    }
}

pub(super) fn tool_registry() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::new(Arc::new(ReferenceCatalog::default())))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
