use super::{HTTP_CONNECTIONS_ACTIVE, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Axum middleware recording request count, latency and in-flight requests.
///
/// Paths are labelled by their route template so ids do not explode cardinality.
///
/// ```no_run
/// use axum::{middleware, Router};
/// use incident_kb::metrics::track_metrics;
///
/// let app: Router = Router::new().layer(middleware::from_fn(track_metrics));
/// ```
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    HTTP_CONNECTIONS_ACTIVE.inc();
    let start = Instant::now();

    let response = next.run(req).await;

    HTTP_CONNECTIONS_ACTIVE.dec();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    response
}
