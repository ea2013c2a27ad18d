use crate::app::AppContext;
use crate::config::ServerConfig;
use axum::{Router, extract::DefaultBodyLimit, http::Request};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Assigns a v4 UUID `x-request-id` to requests that arrive without one.
#[derive(Clone, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let request_id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(request_id))
    }
}

/// Wrap the router in the standard layer stack.
///
/// Order from inner to outer: body limit, request id propagation, request id
/// assignment, HTTP trace. The id must be assigned outside the propagation
/// layer or generated ids never reach the response.
pub(crate) fn apply(router: Router<AppContext>, server: &ServerConfig) -> Router<AppContext> {
    router
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_generates_distinct_ids() {
        let request = Request::new(Body::empty());
        let mut make = MakeRequestUuid;

        let a = make.make_request_id(&request).unwrap();
        let b = make.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
        assert!(Uuid::parse_str(a.header_value().to_str().unwrap()).is_ok());
    }
}
