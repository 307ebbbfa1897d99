use crate::api::{handlers, AppState};
use crate::metrics::track_metrics;
use crate::websocket::websocket_handler;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the Admin API router
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let mut router = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        // Incidents
        .route(
            "/api/incidents",
            get(handlers::list_incidents).post(handlers::create_incident),
        )
        .route("/api/incidents/search", get(handlers::search_incidents))
        .route(
            "/api/incidents/:id",
            get(handlers::get_incident)
                .patch(handlers::update_incident)
                .delete(handlers::delete_incident),
        )
        .route(
            "/api/incidents/:id/solutions",
            get(handlers::list_solutions).post(handlers::add_solution),
        )
        .route("/api/incidents/:id/lessons", post(handlers::extract_lessons))
        // Solutions & lessons
        .route(
            "/api/solutions/:id",
            get(handlers::get_solution)
                .patch(handlers::update_solution)
                .delete(handlers::delete_solution),
        )
        .route("/api/lessons", get(handlers::list_lessons))
        // Knowledge
        .route("/api/knowledge/export", get(handlers::export_knowledge))
        .route("/api/stats", get(handlers::stats));

    if let Some(ws) = state.websocket.clone() {
        if ws.settings.enabled {
            router = router.route("/ws", get(websocket_handler).with_state(ws));
        }
    }

    router
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
