use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT claims --

/// Access-token claims shared between the token service (issuance) and the
/// auth middleware (verification). Canonical definition lives here in
/// vidtide-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub handle: String,
    pub display_name: String,
    pub exp: usize,
}

/// Refresh-token claims. Identity only; everything else is re-read from the
/// store when the token is exchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Response envelope --

/// Uniform JSON envelope every endpoint responds with, success or failure.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub status: u16,
    pub data: T,
    pub message: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginRequest {
    /// Handle or email.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateDetailsRequest {
    pub display_name: String,
    pub email: String,
}

/// Login/refresh response body: the sanitized user plus both tokens, mirrored
/// into the `accessToken`/`refreshToken` cookies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: UserView,
    pub access_token: String,
    pub refresh_token: String,
}

// -- Views --

/// Sanitized user projection. Deliberately has no password or refresh-token
/// fields, so neither can leak through any response path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregated public profile of a channel, as seen by a viewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: Uuid,
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub subscribers_count: i64,
    pub channels_subscribed_count: i64,
    pub is_subscribed: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOwnerView {
    pub handle: String,
    pub display_name: String,
    pub avatar: String,
}

/// One watch-history entry: the video plus its owner's public fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryVideoView {
    pub id: Uuid,
    pub title: String,
    pub media_url: String,
    pub thumbnail_url: String,
    pub duration_secs: i64,
    pub created_at: String,
    pub owner: VideoOwnerView,
}
