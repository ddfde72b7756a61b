//! Scoring capabilities behind the evaluation stages.
//!
//! An oracle produces the scheduling, alignment, and workload assessments. It may
//! only reach reference data through the [`ToolScope`] handed to it for the stage
//! it is serving, so the set of reachable tools stays closed and auditable.

mod catalog_oracle;
mod weighting;
mod workload;

pub use catalog_oracle::CatalogOracle;
pub use weighting::{classify, classify_with, color_for_average, Classification, Weights};
pub use workload::{extract_course_codes, workload_score};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{ScoreCard, Stage};
use crate::workflows::catalog::{Dataset, QueryOutcome, ReferenceCatalog};

/// Score and short rationale from one evaluation dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScore {
    pub score: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadAssessment {
    pub workload_score: u8,
    pub num_courses: u32,
}

/// A stage could not produce a usable score. Fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("{stage} stage produced score {score}, outside 0..=100")]
    OutOfRange { stage: &'static str, score: u32 },
    #[error("{stage} stage could not score the plan: {reason}")]
    Unscorable { stage: &'static str, reason: String },
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Evaluators backing the three scoring stages.
///
/// Implementations hold immutable configuration only, so one instance can be
/// shared by every request behind an `Arc`.
pub trait ScoringOracle: Send + Sync {
    fn evaluate_scheduling(
        &self,
        study_plan: &str,
        tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError>;

    fn evaluate_alignment(
        &self,
        study_plan: &str,
        tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError>;

    fn evaluate_workload(
        &self,
        study_plan: &str,
        tools: &ToolScope<'_>,
    ) -> Result<WorkloadAssessment, OracleError>;
}

impl<T: ScoringOracle + ?Sized> ScoringOracle for Arc<T> {
    fn evaluate_scheduling(
        &self,
        study_plan: &str,
        tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError> {
        (**self).evaluate_scheduling(study_plan, tools)
    }

    fn evaluate_alignment(
        &self,
        study_plan: &str,
        tools: &ToolScope<'_>,
    ) -> Result<SubScore, OracleError> {
        (**self).evaluate_alignment(study_plan, tools)
    }

    fn evaluate_workload(
        &self,
        study_plan: &str,
        tools: &ToolScope<'_>,
    ) -> Result<WorkloadAssessment, OracleError> {
        (**self).evaluate_workload(study_plan, tools)
    }
}

/// Closed set of tools an oracle can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    ExamsQuery,
    LecturesQuery,
    CourseDescriptionQuery,
    CourseMasterlistQuery,
    WorkloadScore,
    WeightedScore,
}

impl ToolId {
    pub const fn name(self) -> &'static str {
        match self {
            ToolId::ExamsQuery => "exams_tool",
            ToolId::LecturesQuery => "lectures_tool",
            ToolId::CourseDescriptionQuery => "course_description_tool",
            ToolId::CourseMasterlistQuery => "course_masterlist_tool",
            ToolId::WorkloadScore => "workload_score_tool",
            ToolId::WeightedScore => "weighted_score_tool",
        }
    }

    /// Tools a stage is allowed to call.
    pub fn for_stage(stage: Stage) -> &'static [ToolId] {
        match stage {
            Stage::Scheduling => &[ToolId::ExamsQuery, ToolId::LecturesQuery],
            Stage::Alignment => &[ToolId::CourseDescriptionQuery, ToolId::CourseMasterlistQuery],
            Stage::Workload => &[ToolId::WorkloadScore],
            Stage::Synthesis => &[ToolId::WeightedScore],
            Stage::Memory | Stage::HumanReview | Stage::Done => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Query(String),
    CourseCount(u32),
    Scores(ScoreCard),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Rows(QueryOutcome),
    Workload(u8),
    Weighted(Classification),
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool {} is not available to the {stage} stage", .tool.name())]
    NotPermitted { tool: ToolId, stage: &'static str },
    #[error("tool {} does not accept {input}", .tool.name())]
    InvalidInput { tool: ToolId, input: &'static str },
    #[error("tool {} is not registered", .tool.name())]
    Unregistered { tool: ToolId },
}

type ToolHandler = Box<dyn Fn(ToolInput) -> Result<ToolOutput, ToolError> + Send + Sync>;

/// Lookup table from tool id to handler, built once at startup.
pub struct ToolRegistry {
    handlers: HashMap<ToolId, ToolHandler>,
}

impl ToolRegistry {
    pub fn new(catalog: Arc<ReferenceCatalog>) -> Self {
        let mut handlers: HashMap<ToolId, ToolHandler> = HashMap::new();

        for (tool, dataset) in [
            (ToolId::ExamsQuery, Dataset::Exams),
            (ToolId::LecturesQuery, Dataset::Lectures),
            (ToolId::CourseDescriptionQuery, Dataset::CourseDescription),
            (ToolId::CourseMasterlistQuery, Dataset::CourseMasterlist),
        ] {
            let catalog = Arc::clone(&catalog);
            handlers.insert(
                tool,
                Box::new(move |input| match input {
                    ToolInput::Query(expression) => {
                        Ok(ToolOutput::Rows(catalog.query(dataset, &expression)))
                    }
                    other => Err(ToolError::InvalidInput {
                        tool,
                        input: input_kind(&other),
                    }),
                }),
            );
        }

        handlers.insert(
            ToolId::WorkloadScore,
            Box::new(|input| match input {
                ToolInput::CourseCount(count) => Ok(ToolOutput::Workload(workload_score(count))),
                other => Err(ToolError::InvalidInput {
                    tool: ToolId::WorkloadScore,
                    input: input_kind(&other),
                }),
            }),
        );
        handlers.insert(
            ToolId::WeightedScore,
            Box::new(|input| match input {
                ToolInput::Scores(scores) => Ok(ToolOutput::Weighted(classify(scores))),
                other => Err(ToolError::InvalidInput {
                    tool: ToolId::WeightedScore,
                    input: input_kind(&other),
                }),
            }),
        );

        Self { handlers }
    }

    /// Restrict the registry to the tools `stage` may call.
    pub fn scope(&self, stage: Stage) -> ToolScope<'_> {
        ToolScope {
            registry: self,
            stage,
            allowed: ToolId::for_stage(stage).iter().copied().collect(),
        }
    }

    fn invoke(&self, tool: ToolId, input: ToolInput) -> Result<ToolOutput, ToolError> {
        let handler = self
            .handlers
            .get(&tool)
            .ok_or(ToolError::Unregistered { tool })?;
        handler(input)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tools: Vec<&'static str> = self.handlers.keys().map(|tool| tool.name()).collect();
        tools.sort_unstable();
        f.debug_struct("ToolRegistry").field("tools", &tools).finish()
    }
}

/// View of the registry limited to one stage's tools.
pub struct ToolScope<'a> {
    registry: &'a ToolRegistry,
    stage: Stage,
    allowed: HashSet<ToolId>,
}

impl ToolScope<'_> {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn invoke(&self, tool: ToolId, input: ToolInput) -> Result<ToolOutput, ToolError> {
        if !self.allowed.contains(&tool) {
            return Err(ToolError::NotPermitted {
                tool,
                stage: self.stage.label(),
            });
        }
        tracing::trace!(tool = tool.name(), stage = self.stage.label(), "tool invoked");
        self.registry.invoke(tool, input)
    }

    /// Run a reference query; bad expressions come back as `QueryOutcome::Failed`.
    pub fn query(&self, tool: ToolId, expression: impl Into<String>) -> Result<QueryOutcome, ToolError> {
        match self.invoke(tool, ToolInput::Query(expression.into()))? {
            ToolOutput::Rows(outcome) => Ok(outcome),
            _ => Err(ToolError::InvalidInput {
                tool,
                input: "query",
            }),
        }
    }
}

fn input_kind(input: &ToolInput) -> &'static str {
    match input {
        ToolInput::Query(_) => "query",
        ToolInput::CourseCount(_) => "course count",
        ToolInput::Scores(_) => "scores",
    }
}
