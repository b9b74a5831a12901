use rusqlite::Connection;

use crate::Database;
use crate::models::{ChannelProfileRow, NewUser, UserRow, WatchHistoryRow};
use crate::store::{AccountStore, StoreError};

const USER_COLUMNS: &str = "id, handle, email, display_name, password, avatar_url, \
     cover_image_url, refresh_token, created_at, updated_at";

impl AccountStore for Database {
    fn find_by_id(&self, id: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &[&id]))
    }

    fn find_by_handle_or_email(&self, identifier: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            query_user(conn, "handle = ?1 OR email = ?1", &[&identifier])
        })
    }

    fn create_user(&self, user: &NewUser) -> Result<UserRow, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, handle, email, display_name, password, avatar_url, cover_image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    user.id,
                    user.handle,
                    user.email,
                    user.display_name,
                    user.password,
                    user.avatar_url,
                    user.cover_image_url,
                ],
            )
            .map_err(map_unique)?;

            query_user(conn, "id = ?1", &[&user.id.as_str()])?.ok_or(StoreError::NotFound)
        })
    }

    fn update_details(
        &self,
        id: &str,
        display_name: &str,
        email: &str,
    ) -> Result<UserRow, StoreError> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET display_name = ?2, email = ?3, updated_at = datetime('now')
                     WHERE id = ?1",
                    rusqlite::params![id, display_name, email],
                )
                .map_err(map_unique)?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            query_user(conn, "id = ?1", &[&id])?.ok_or(StoreError::NotFound)
        })
    }

    fn update_avatar(&self, id: &str, url: &str) -> Result<UserRow, StoreError> {
        self.update_media_url(id, "avatar_url", url)
    }

    fn update_cover_image(&self, id: &str, url: &str) -> Result<UserRow, StoreError> {
        self.update_media_url(id, "cover_image_url", url)
    }

    fn update_password(&self, id: &str, password_hash: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?2, updated_at = datetime('now') WHERE id = ?1",
                rusqlite::params![id, password_hash],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?2, updated_at = datetime('now') WHERE id = ?1",
                rusqlite::params![id, token],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    fn swap_refresh_token(
        &self,
        id: &str,
        current: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            // Conditional update: only the caller holding the live token wins.
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?3, updated_at = datetime('now')
                 WHERE id = ?1 AND refresh_token = ?2",
                rusqlite::params![id, current, next],
            )?;
            Ok(changed == 1)
        })
    }

    fn channel_profile(
        &self,
        handle: &str,
        viewer_id: Option<&str>,
    ) -> Result<Option<ChannelProfileRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.handle, u.email, u.display_name, u.avatar_url, u.cover_image_url,
                        u.created_at,
                        (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id),
                        (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id),
                        EXISTS(SELECT 1 FROM subscriptions s
                               WHERE s.channel_id = u.id AND s.subscriber_id = ?2)
                 FROM users u
                 WHERE u.handle = ?1",
            )?;

            let row = stmt
                .query_row(
                    rusqlite::params![handle, viewer_id.unwrap_or("")],
                    |row| {
                        Ok(ChannelProfileRow {
                            id: row.get(0)?,
                            handle: row.get(1)?,
                            email: row.get(2)?,
                            display_name: row.get(3)?,
                            avatar_url: row.get(4)?,
                            cover_image_url: row.get(5)?,
                            created_at: row.get(6)?,
                            subscribers_count: row.get(7)?,
                            channels_subscribed_count: row.get(8)?,
                            is_subscribed: row.get::<_, i64>(9)? != 0,
                        })
                    },
                )
                .optional()?;

            Ok(row)
        })
    }

    fn watch_history(&self, user_id: &str) -> Result<Vec<WatchHistoryRow>, StoreError> {
        self.with_conn(|conn| {
            // One two-level join: history -> videos -> owning users. Bounds
            // the whole projection to a single round-trip.
            let mut stmt = conn.prepare(
                "SELECT v.id, v.title, v.media_url, v.thumbnail_url, v.duration_secs,
                        v.created_at, o.handle, o.display_name, o.avatar_url
                 FROM watch_history h
                 JOIN videos v ON v.id = h.video_id
                 JOIN users o ON o.id = v.owner_id
                 WHERE h.user_id = ?1
                 ORDER BY h.position ASC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(WatchHistoryRow {
                        video_id: row.get(0)?,
                        title: row.get(1)?,
                        media_url: row.get(2)?,
                        thumbnail_url: row.get(3)?,
                        duration_secs: row.get(4)?,
                        created_at: row.get(5)?,
                        owner_handle: row.get(6)?,
                        owner_display_name: row.get(7)?,
                        owner_avatar_url: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

impl Database {
    fn update_media_url(
        &self,
        id: &str,
        column: &'static str,
        url: &str,
    ) -> Result<UserRow, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE users SET {column} = ?2, updated_at = datetime('now') WHERE id = ?1"
            );
            let changed = conn.execute(&sql, rusqlite::params![id, url])?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            query_user(conn, "id = ?1", &[&id])?.ok_or(StoreError::NotFound)
        })
    }

    // -- Seed/product-side writes, not part of the account port --

    pub fn insert_video(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
        media_url: &str,
        thumbnail_url: &str,
        duration_secs: i64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO videos (id, owner_id, title, media_url, thumbnail_url, duration_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, owner_id, title, media_url, thumbnail_url, duration_secs],
            )?;
            Ok(())
        })
    }

    pub fn add_subscription(
        &self,
        id: &str,
        subscriber_id: &str,
        channel_id: &str,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO subscriptions (id, subscriber_id, channel_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, subscriber_id, channel_id],
            )
            .map_err(map_unique)?;
            Ok(())
        })
    }

    /// Append a video to the user's watch history, after any existing entries.
    pub fn push_watch_history(&self, user_id: &str, video_id: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO watch_history (user_id, position, video_id)
                 VALUES (?1,
                         COALESCE((SELECT MAX(position) + 1 FROM watch_history WHERE user_id = ?1), 0),
                         ?2)",
                rusqlite::params![user_id, video_id],
            )?;
            Ok(())
        })
    }
}

fn query_user(
    conn: &Connection,
    predicate: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<UserRow>, StoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row(params, |row| {
            Ok(UserRow {
                id: row.get(0)?,
                handle: row.get(1)?,
                email: row.get(2)?,
                display_name: row.get(3)?,
                password: row.get(4)?,
                avatar_url: row.get(5)?,
                cover_image_url: row.get(6)?,
                refresh_token: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_unique(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(err, Some(msg)) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            if msg.contains("users.handle") {
                return StoreError::Duplicate("handle");
            }
            if msg.contains("users.email") {
                return StoreError::Duplicate("email");
            }
            if msg.contains("subscriptions.") {
                return StoreError::Duplicate("subscription");
            }
        }
    }
    StoreError::Sqlite(e)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, StoreError>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
