use crate::error::{AssetwayError, Result};
use crate::registry::{HandlerOutcome, OutcomeBody};
use axum::{
    body::Body,
    http::{
        HeaderValue,
        header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, LOCATION},
    },
    response::{IntoResponse, Response},
};

/// Project a handler outcome onto an HTTP response.
///
/// Status, content type and cache policy always come from the outcome;
/// `etag` and `location` are set only when the handler supplied them.
pub fn project(outcome: HandlerOutcome) -> Result<Response> {
    let body = match outcome.body {
        OutcomeBody::Empty => Body::empty(),
        OutcomeBody::Bytes(bytes) => Body::from(bytes),
        OutcomeBody::Json(value) => Body::from(serde_json::to_vec(&value)?),
        OutcomeBody::Stream(stream) => Body::from_stream(stream),
    };

    let mut response = Response::new(body);
    *response.status_mut() = outcome.status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, header_value("content-type", &outcome.mime_type)?);
    headers.insert(
        CACHE_CONTROL,
        header_value("cache-control", &outcome.cache_control)?,
    );
    if let Some(etag) = &outcome.etag {
        headers.insert(ETAG, header_value("etag", etag)?);
    }
    if let Some(location) = &outcome.location {
        headers.insert(LOCATION, header_value("location", location)?);
    }

    Ok(response)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        AssetwayError::internal(format!("handler produced an invalid {} header", name))
    })
}

impl IntoResponse for HandlerOutcome {
    fn into_response(self) -> Response {
        project(self).unwrap_or_else(IntoResponse::into_response)
    }
}

/// Marks a response as never cacheable.
#[derive(Debug)]
pub struct NoStore<T>(pub T);

impl<T: IntoResponse> IntoResponse for NoStore<T> {
    fn into_response(self) -> Response {
        let mut response = self.0.into_response();
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}
