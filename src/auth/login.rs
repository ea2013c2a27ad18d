use crate::app::AppContext;
use crate::error::{AssetwayError, Result};
use crate::http::{NoStore, RouteModule};
use axum::{
    Form, Json, Router,
    extract::{FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    routing::post,
};
use serde::{Deserialize, Serialize};

/// Credential exchange body, accepted as JSON or urlencoded form.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// `POST /auth/login`
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthRoutes;

impl RouteModule for AuthRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/login", post(login_handler))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/auth")
    }
}

/// Exchange the bootstrap credential for a bearer token.
pub async fn login_handler(
    State(ctx): State<AppContext>,
    request: Request,
) -> Result<NoStore<Json<LoginResponse>>> {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    let login = if is_json {
        Json::<LoginRequest>::from_request(request, &ctx)
            .await
            .map(|Json(login)| login)
            .map_err(|rejection| {
                tracing::debug!(error = %rejection, "Unreadable login body");
                AssetwayError::InvalidCredential
            })?
    } else {
        Form::<LoginRequest>::from_request(request, &ctx)
            .await
            .map(|Form(login)| login)
            .map_err(|rejection| {
                tracing::debug!(error = %rejection, "Unreadable login body");
                AssetwayError::InvalidCredential
            })?
    };

    let issued = ctx.auth.issue_token(&login.key)?;
    Ok(NoStore(Json(LoginResponse {
        token: issued.token,
    })))
}
