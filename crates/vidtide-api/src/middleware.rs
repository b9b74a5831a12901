use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::error::ApiError;
use crate::{AppState, user_view};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// The authenticated identity attached to every gated request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// Store-side id, kept as the canonical string form.
    pub id: String,
    pub user: vidtide_types::api::UserView,
}

/// Auth gate: pull the access token from the `accessToken` cookie or the
/// `Authorization: Bearer` header, verify it, and load the referenced user.
/// Fails closed: any verification failure or missing user rejects the
/// request before business logic runs.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_or_cookie(&jar, &req)
        .ok_or_else(|| ApiError::Unauthorized("missing access token".into()))?;

    let claims = state.tokens.verify_access(&token)?;

    let store = state.store.clone();
    let id = claims.sub.to_string();
    let user = tokio::task::spawn_blocking(move || store.find_by_id(&id))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::Unauthorized("user no longer exists".into()))?;

    req.extensions_mut().insert(CurrentUser {
        id: user.id.clone(),
        user: user_view(&user),
    });
    Ok(next.run(req).await)
}

fn bearer_or_cookie(jar: &CookieJar, req: &Request) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}
