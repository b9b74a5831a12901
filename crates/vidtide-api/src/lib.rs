pub mod accounts;
pub mod channels;
pub mod error;
pub mod middleware;
pub mod token;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use tracing::warn;
use uuid::Uuid;

use vidtide_db::models::{ChannelProfileRow, UserRow, WatchHistoryRow};
use vidtide_db::{AccountStore, StoreError};
use vidtide_media::MediaStore;
use vidtide_types::api::{ChannelView, HistoryVideoView, UserView, VideoOwnerView};

use crate::error::ApiError;
use crate::middleware::require_auth;
use crate::token::TokenService;

/// Upload limit for multipart bodies (avatar/cover files).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub struct AppStateInner {
    pub store: Arc<dyn AccountStore>,
    pub media: Arc<dyn MediaStore>,
    pub tokens: TokenService,
    pub spool_dir: PathBuf,
}

pub type AppState = Arc<AppStateInner>;

/// Build the account-subsystem router. The server binary layers CORS,
/// tracing, timeouts and media serving on top.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/refresh-token", post(accounts::refresh_token));

    let protected = Router::new()
        .route("/", get(accounts::current_user))
        .route("/current-user", get(accounts::current_user))
        .route("/logout", post(accounts::logout))
        .route("/change-password", post(accounts::change_password))
        .route("/update-details", patch(accounts::update_details))
        .route("/update-avatar", patch(accounts::update_avatar))
        .route("/update-cover-image", patch(accounts::update_cover_image))
        .route("/c/{handle}", get(channels::channel_profile))
        .route("/history", get(channels::watch_history))
        .layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

pub(crate) async fn run_store<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::from)
}

pub(crate) fn user_view(row: &UserRow) -> UserView {
    UserView {
        id: parse_id(&row.id, "user"),
        handle: row.handle.clone(),
        email: row.email.clone(),
        display_name: row.display_name.clone(),
        avatar: row.avatar_url.clone(),
        cover_image: row.cover_image_url.clone(),
        created_at: row.created_at.clone(),
        updated_at: row.updated_at.clone(),
    }
}

pub(crate) fn channel_view(row: &ChannelProfileRow) -> ChannelView {
    ChannelView {
        id: parse_id(&row.id, "user"),
        handle: row.handle.clone(),
        email: row.email.clone(),
        display_name: row.display_name.clone(),
        avatar: row.avatar_url.clone(),
        cover_image: row.cover_image_url.clone(),
        subscribers_count: row.subscribers_count,
        channels_subscribed_count: row.channels_subscribed_count,
        is_subscribed: row.is_subscribed,
        created_at: row.created_at.clone(),
    }
}

pub(crate) fn history_view(row: &WatchHistoryRow) -> HistoryVideoView {
    HistoryVideoView {
        id: parse_id(&row.video_id, "video"),
        title: row.title.clone(),
        media_url: row.media_url.clone(),
        thumbnail_url: row.thumbnail_url.clone(),
        duration_secs: row.duration_secs,
        created_at: row.created_at.clone(),
        owner: VideoOwnerView {
            handle: row.owner_handle.clone(),
            display_name: row.owner_display_name.clone(),
            avatar: row.owner_avatar_url.clone(),
        },
    }
}

fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {what} id '{raw}': {e}");
        Uuid::default()
    })
}
