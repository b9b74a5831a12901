use thiserror::Error;

use crate::models::{ChannelProfileRow, NewUser, UserRow, WatchHistoryRow};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A UNIQUE constraint fired; the field name is user-facing.
    #[error("{0} already taken")]
    Duplicate(&'static str),
    #[error("row not found")]
    NotFound,
    #[error("database lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Storage port for the account subsystem. `Database` is the SQLite
/// implementation; handlers and the token service only see this trait.
pub trait AccountStore: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Option<UserRow>, StoreError>;

    /// Single lookup used by login: the identifier may be a handle or an
    /// email address.
    fn find_by_handle_or_email(&self, identifier: &str) -> Result<Option<UserRow>, StoreError>;

    fn create_user(&self, user: &NewUser) -> Result<UserRow, StoreError>;

    fn update_details(
        &self,
        id: &str,
        display_name: &str,
        email: &str,
    ) -> Result<UserRow, StoreError>;

    fn update_avatar(&self, id: &str, url: &str) -> Result<UserRow, StoreError>;

    fn update_cover_image(&self, id: &str, url: &str) -> Result<UserRow, StoreError>;

    fn update_password(&self, id: &str, password_hash: &str) -> Result<(), StoreError>;

    /// Overwrite the single refresh-token slot. `None` clears it (logout).
    fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<(), StoreError>;

    /// Compare-and-swap on the refresh-token slot: the write happens only if
    /// the stored value still equals `current`. Returns whether it did.
    /// Rotation correctness under concurrent refreshes hinges on this being
    /// a single conditional UPDATE.
    fn swap_refresh_token(&self, id: &str, current: &str, next: &str)
    -> Result<bool, StoreError>;

    fn channel_profile(
        &self,
        handle: &str,
        viewer_id: Option<&str>,
    ) -> Result<Option<ChannelProfileRow>, StoreError>;

    fn watch_history(&self, user_id: &str) -> Result<Vec<WatchHistoryRow>, StoreError>;
}
