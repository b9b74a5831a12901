use rusqlite::Connection;
use tracing::info;

use crate::store::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            handle          TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL UNIQUE,
            display_name    TEXT NOT NULL,
            password        TEXT NOT NULL,
            avatar_url      TEXT NOT NULL,
            cover_image_url TEXT NOT NULL DEFAULT '',
            refresh_token   TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            id              TEXT PRIMARY KEY,
            subscriber_id   TEXT NOT NULL REFERENCES users(id),
            channel_id      TEXT NOT NULL REFERENCES users(id),
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(subscriber_id, channel_id)
        );

        CREATE INDEX IF NOT EXISTS idx_subscriptions_channel
            ON subscriptions(channel_id);

        CREATE TABLE IF NOT EXISTS videos (
            id              TEXT PRIMARY KEY,
            owner_id        TEXT NOT NULL REFERENCES users(id),
            title           TEXT NOT NULL,
            media_url       TEXT NOT NULL,
            thumbnail_url   TEXT NOT NULL DEFAULT '',
            duration_secs   INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS watch_history (
            user_id     TEXT NOT NULL REFERENCES users(id),
            position    INTEGER NOT NULL,
            video_id    TEXT NOT NULL REFERENCES videos(id),
            watched_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY(user_id, position)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
