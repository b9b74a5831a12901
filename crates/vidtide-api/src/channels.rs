use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use vidtide_types::api::HistoryVideoView;

use crate::error::{ApiError, respond};
use crate::middleware::CurrentUser;
use crate::{AppState, channel_view, history_view, run_store};

/// GET /c/{handle} — aggregated public profile as seen by the viewer.
/// The lookup is an exact match against the stored (lowercased) handle.
pub async fn channel_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(handle): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let row = {
        let store = state.store.clone();
        let viewer = current.id.clone();
        let handle = handle.clone();
        run_store(move || store.channel_profile(&handle, Some(&viewer))).await?
    }
    .ok_or_else(|| ApiError::NotFound(format!("channel '{handle}' does not exist")))?;

    Ok(respond(
        StatusCode::OK,
        channel_view(&row),
        "channel profile fetched",
    ))
}

/// GET /history — the user's watch history, oldest entry first, each video
/// carrying its owner's public fields.
pub async fn watch_history(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = {
        let store = state.store.clone();
        let id = current.id.clone();
        run_store(move || store.watch_history(&id)).await?
    };

    let history: Vec<HistoryVideoView> = rows.iter().map(history_view).collect();
    Ok(respond(StatusCode::OK, history, "watch history fetched"))
}
