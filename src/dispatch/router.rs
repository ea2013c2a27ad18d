use super::table::{self, RouteEntry};
use crate::app::AppContext;
use crate::auth::{Claims, TokenExtractor};
use crate::error::{AssetwayError, Result};
use crate::http::{CanonicalRequestParams, Kind, RouteModule, normalize};
use crate::registry::HandlerRequest;
use crate::tenancy::strip_port;
use axum::{
    Router,
    body::Bytes,
    extract::{FromRequest, OriginalUri, Request, State},
    http::{
        HeaderMap, HeaderValue,
        header::{ALLOW, HOST},
    },
    response::{IntoResponse, Response},
    routing::any,
};

/// Registry routes: one catch-all per route kind, resolved through the route table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryRoutes;

impl RouteModule for RegistryRoutes {
    fn routes(&self) -> Router<AppContext> {
        Kind::ALL.iter().fold(Router::new(), |router, kind| {
            router.route(&format!("/{}/{{*path}}", kind), any(dispatch))
        })
    }
}

/// Entry point for every registry request.
///
/// The raw path is normalized before anything else. Mutating routes verify
/// the bearer token before the body is read or their handler is looked up,
/// and the handler's outcome is projected onto the response unchanged.
pub async fn dispatch(
    State(ctx): State<AppContext>,
    OriginalUri(uri): OriginalUri,
    request: Request,
) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let headers = parts.headers.clone();

    let params = normalize(uri.path())?;

    let entry = match table::find(params.kind, params.shape(), &method) {
        Ok(entry) => entry,
        Err(err @ AssetwayError::MethodNotAllowed(_)) => {
            return Ok(method_not_allowed(err, &params));
        }
        Err(err) => return Err(err),
    };

    let claims = authorize(&ctx, entry, &headers)?;

    let body = Bytes::from_request(Request::from_parts(parts, body), &ctx)
        .await
        .map_err(|rejection| AssetwayError::with_status(rejection.status(), rejection.body_text()))?;

    let handler = ctx.handlers.get(entry.operation).ok_or_else(|| {
        AssetwayError::internal(format!(
            "no handler registered for {}",
            entry.operation.as_str()
        ))
    })?;

    tracing::debug!(
        operation = entry.operation.as_str(),
        kind = %params.kind,
        name = %params.full_name(),
        "Dispatching registry request"
    );

    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.host())
        .map(|host| strip_port(host).to_string());

    let request = HandlerRequest {
        method,
        uri,
        host,
        headers,
        body,
    };

    let outcome = handler
        .handle(request, &params, &ctx.organizations, claims.as_ref())
        .await?;

    Ok(outcome.into_response())
}

fn authorize(ctx: &AppContext, entry: &RouteEntry, headers: &HeaderMap) -> Result<Option<Claims>> {
    if !entry.mutating {
        return Ok(None);
    }

    let bearer = TokenExtractor::from_headers(headers)?;
    let claims = ctx.auth.verify(bearer.as_deref())?;
    Ok(Some(claims))
}

fn method_not_allowed(err: AssetwayError, params: &CanonicalRequestParams) -> Response {
    let allow = table::allowed_methods(params.kind, params.shape());
    let mut response = err.into_response();
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}
