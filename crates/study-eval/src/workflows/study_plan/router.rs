use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};

use super::checkpoint::CheckpointStore;
use super::domain::ValidationError;
use super::scoring::ScoringOracle;
use super::service::{
    DecisionRequest, EvaluateRequest, StartRequest, StudyPlanReviewService, StudyPlanServiceError,
};

/// Router builder exposing synchronous and review-enabled evaluation endpoints.
pub fn study_plan_router<O, C>(service: Arc<StudyPlanReviewService<O, C>>) -> Router
where
    O: ScoringOracle + 'static,
    C: CheckpointStore + 'static,
{
    Router::new()
        .route("/evaluate", post(evaluate_handler::<O, C>))
        .route("/api/v1/study-plans/hitl/start", post(start_handler::<O, C>))
        .route(
            "/api/v1/study-plans/hitl/decision",
            post(decision_handler::<O, C>),
        )
        .with_state(service)
}

/// Run the blocking evaluation off the async executor.
async fn run_blocking<O, C, T, F>(
    service: Arc<StudyPlanReviewService<O, C>>,
    job: F,
) -> Response
where
    O: ScoringOracle + 'static,
    C: CheckpointStore + 'static,
    T: IntoResponse + Send + 'static,
    F: FnOnce(&StudyPlanReviewService<O, C>) -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(move || job(&service)).await {
        Ok(response) => response.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "evaluation task failed");
            let payload = serde_json::json!({ "error": "evaluation failed" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

/// Body extraction failures answer like any other validation error.
fn request_body<T>(payload: Result<axum::Json<T>, JsonRejection>) -> Result<T, Response> {
    payload.map(|axum::Json(request)| request).map_err(|rejection| {
        StudyPlanServiceError::from(ValidationError::MalformedBody(rejection.body_text()))
            .into_response()
    })
}

pub(crate) async fn evaluate_handler<O, C>(
    State(service): State<Arc<StudyPlanReviewService<O, C>>>,
    payload: Result<axum::Json<EvaluateRequest>, JsonRejection>,
) -> Response
where
    O: ScoringOracle + 'static,
    C: CheckpointStore + 'static,
{
    let request = match request_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    run_blocking(service, move |service| {
        match service.evaluate(&request.study_plan) {
            Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
            Err(err) => err.into_response(),
        }
    })
    .await
}

pub(crate) async fn start_handler<O, C>(
    State(service): State<Arc<StudyPlanReviewService<O, C>>>,
    payload: Result<axum::Json<StartRequest>, JsonRejection>,
) -> Response
where
    O: ScoringOracle + 'static,
    C: CheckpointStore + 'static,
{
    let request = match request_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    run_blocking(service, move |service| {
        match service.start_evaluation(&request.study_plan, request.thread_id.as_deref()) {
            Ok(outcome) => (outcome.status_code(), axum::Json(outcome)).into_response(),
            Err(err) => err.into_response(),
        }
    })
    .await
}

pub(crate) async fn decision_handler<O, C>(
    State(service): State<Arc<StudyPlanReviewService<O, C>>>,
    payload: Result<axum::Json<DecisionRequest>, JsonRejection>,
) -> Response
where
    O: ScoringOracle + 'static,
    C: CheckpointStore + 'static,
{
    let request = match request_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    run_blocking(service, move |service| match service.submit_decision(request) {
        Ok(outcome) => (outcome.status_code(), axum::Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    })
    .await
}
