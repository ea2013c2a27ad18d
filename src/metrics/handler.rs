use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::Response;

use crate::app::AppContext;

/// Handler for the metrics exposition endpoint
pub async fn metrics_handler(State(ctx): State<AppContext>) -> Result<Response<Body>, StatusCode> {
    use prometheus::Encoder;

    let Some(collector) = ctx.collector.as_ref() else {
        return Err(StatusCode::NOT_FOUND);
    };

    collector
        .sources_attached
        .set(ctx.multiplexer.attached() as i64);

    let encoder = prometheus::TextEncoder::new();
    let metric_families = collector.registry().gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from(buffer))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
