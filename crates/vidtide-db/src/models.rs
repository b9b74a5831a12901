/// Database row types — these map directly to SQLite rows.
/// Distinct from the vidtide-types API models to keep the DB layer
/// independent.

#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub avatar_url: String,
    pub cover_image_url: String,
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input to `create_user`. Handle and email arrive already lowercased.
pub struct NewUser {
    pub id: String,
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub avatar_url: String,
    pub cover_image_url: String,
}

/// A channel profile with both subscription edges aggregated in.
pub struct ChannelProfileRow {
    pub id: String,
    pub handle: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: String,
    pub cover_image_url: String,
    pub created_at: String,
    pub subscribers_count: i64,
    pub channels_subscribed_count: i64,
    pub is_subscribed: bool,
}

/// A watch-history entry joined with its video and the video owner's
/// public fields.
pub struct WatchHistoryRow {
    pub video_id: String,
    pub title: String,
    pub media_url: String,
    pub thumbnail_url: String,
    pub duration_secs: i64,
    pub created_at: String,
    pub owner_handle: String,
    pub owner_display_name: String,
    pub owner_avatar_url: String,
}
