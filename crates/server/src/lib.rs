pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Math Solver API",
        version = "0.1.0",
        description = "API for the staged AI math tutoring pipeline"
    ),
    paths(
        routes::health_check,
        routes::solve_problem,
        routes::solve_stream,
        routes::cancel_run,
        routes::ingest,
        routes::record_feedback,
        routes::list_history,
        routes::get_history_entry,
        routes::get_view_state,
        routes::put_view_state,
        routes::clear_view_state,
        routes::list_knowledge,
        routes::create_knowledge,
        routes::sse::events_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::SolveRequest,
        routes::SolveResponse,
        routes::CancelResponse,
        routes::IngestRequest,
        routes::IngestResponse,
        routes::FeedbackRequest,
        routes::FeedbackResponse,
        routes::PutViewStateRequest,
        routes::CreateKnowledgeRequest,
        solver_core::SolutionResult,
        solver_core::TraceEntry,
        solver_core::SourceRef,
        solver_core::HitlReason,
        solver_core::ViewState,
        solver_core::Modality,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "solve", description = "Problem solving endpoints"),
        (name = "runs", description = "Run control endpoints"),
        (name = "ingest", description = "Input normalization endpoints"),
        (name = "feedback", description = "Solution feedback endpoints"),
        (name = "history", description = "Stored solution endpoints"),
        (name = "session", description = "Session view state endpoints"),
        (name = "knowledge", description = "Knowledge base endpoints"),
        (name = "events", description = "Real-time event streaming (SSE)"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route("/api/solve", post(routes::solve_problem))
        .route("/api/solve/stream", post(routes::solve_stream))
        .route("/api/runs/{id}/cancel", post(routes::cancel_run))
        .route("/api/ingest", post(routes::ingest))
        .route("/api/feedback", post(routes::record_feedback))
        .route("/api/history", get(routes::list_history))
        .route("/api/history/{id}", get(routes::get_history_entry))
        .route(
            "/api/session/{id}/view-state",
            get(routes::get_view_state)
                .put(routes::put_view_state)
                .delete(routes::clear_view_state),
        )
        .route(
            "/api/knowledge",
            get(routes::list_knowledge).post(routes::create_knowledge),
        )
        .route("/api/events", get(routes::sse::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
