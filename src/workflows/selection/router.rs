use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{Candidate, QuizSubmission, SpeechSubmission};
use super::pipeline::{PipelineError, SelectionPipeline};
use super::services::{NotificationService, QuestionGenerationService, SpeechAnalysisService};
use super::store::TabularStore;

type SharedPipeline<S, N, A, G> = Arc<SelectionPipeline<S, N, A, G>>;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GenerateQuizRequest {
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterCandidatesRequest {
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuizInvitationRequest {
    pub quiz_link: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuizResponsesRequest {
    pub submissions: Vec<QuizSubmission>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SpeechSubmissionsRequest {
    pub submissions: Vec<SpeechSubmission>,
}

/// Router exposing each pipeline stage and the derived status over HTTP.
pub fn selection_router<S, N, A, G>(pipeline: SharedPipeline<S, N, A, G>) -> Router
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    Router::new()
        .route("/api/v1/selection/status", get(status_handler::<S, N, A, G>))
        .route("/api/v1/selection/quiz", post(generate_quiz_handler::<S, N, A, G>))
        .route(
            "/api/v1/selection/candidates",
            post(register_candidates_handler::<S, N, A, G>),
        )
        .route(
            "/api/v1/selection/invitations",
            post(quiz_invitations_handler::<S, N, A, G>),
        )
        .route(
            "/api/v1/selection/responses",
            post(quiz_responses_handler::<S, N, A, G>),
        )
        .route(
            "/api/v1/selection/shortlist",
            get(shortlist_handler::<S, N, A, G>).post(extract_shortlist_handler::<S, N, A, G>),
        )
        .route(
            "/api/v1/selection/speech",
            post(speech_submissions_handler::<S, N, A, G>),
        )
        .route(
            "/api/v1/selection/finalize",
            post(finalize_handler::<S, N, A, G>),
        )
        .route(
            "/api/v1/selection/results",
            get(final_results_handler::<S, N, A, G>),
        )
        .with_state(pipeline)
}

fn respond<T: Serialize>(result: Result<T, PipelineError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn error_response(err: PipelineError) -> Response {
    let status = match err {
        PipelineError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Generation(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Interrupted => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}

pub(crate) async fn status_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.status())
}

pub(crate) async fn generate_quiz_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
    Json(request): Json<GenerateQuizRequest>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.generate_quiz(&request.topics))
}

pub(crate) async fn register_candidates_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
    Json(request): Json<RegisterCandidatesRequest>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.register_candidates(&request.candidates))
}

pub(crate) async fn quiz_invitations_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
    Json(request): Json<QuizInvitationRequest>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.send_quiz_invitations(&request.quiz_link))
}

pub(crate) async fn quiz_responses_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
    Json(request): Json<QuizResponsesRequest>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.check_quiz_responses(&request.submissions))
}

pub(crate) async fn extract_shortlist_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.extract_shortlist())
}

pub(crate) async fn shortlist_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.shortlist())
}

pub(crate) async fn speech_submissions_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
    Json(request): Json<SpeechSubmissionsRequest>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.process_speech_submissions(&request.submissions))
}

pub(crate) async fn finalize_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.finalize())
}

pub(crate) async fn final_results_handler<S, N, A, G>(
    State(pipeline): State<SharedPipeline<S, N, A, G>>,
) -> Response
where
    S: TabularStore + 'static,
    N: NotificationService + 'static,
    A: SpeechAnalysisService + 'static,
    G: QuestionGenerationService + 'static,
{
    respond(pipeline.final_results())
}
