//! Postgres-backed user and track stores.
//!
//! Schema lives in `migrations/0001_bookmarks.sql` and is applied idempotently by
//! [`apply_schema`]. Bookmarks and track history are child tables ordered by an explicit
//! `position` column, so list order survives round trips.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database (any code) | `Database` |
//! | PoolClosed / PoolTimedOut / Io | `Unavailable` |
//! | ColumnDecode / Decode / ColumnNotFound | `Corrupt` |
//! | Other | `Database` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use parcelmark_core::{StatusId, TrackId, UserId};
use parcelmark_tracking::{Bookmark, HistoryEntry, Status, StatusRef, Track, User};

use super::{StoreError, TrackStore, UserStore};

const SCHEMA: &str = include_str!("../../migrations/0001_bookmarks.sql");

/// Open a connection pool and make sure the schema exists.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))?;
    apply_schema(&pool).await?;
    Ok(pool)
}

/// Create the tables and indexes the stores rely on (no-op when they exist).
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("apply_schema", e))?;
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Database(format!("{} failed: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{} failed: {}", operation, err))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{} returned an unreadable row: {}", operation, err))
        }
        _ => StoreError::Database(format!("{} failed: {}", operation, err)),
    }
}

/// Postgres-backed user store.
#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: Arc<PgPool>,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn bookmark_from_row(row: &PgRow) -> Result<Bookmark, sqlx::Error> {
    Ok(Bookmark {
        track_number: row.try_get("track_number")?,
        track_id: row
            .try_get::<Option<Uuid>, _>("track_id")?
            .map(TrackId::from_uuid),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        description: row.try_get("description")?,
    })
}

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, phone FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let phone: String = row
            .try_get("phone")
            .map_err(|e| map_sqlx_error("find_user", e))?;

        let rows = sqlx::query(
            r#"
            SELECT track_number, track_id, created_at, description
            FROM bookmarks
            WHERE user_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_bookmarks", e))?;

        let bookmarks = rows
            .iter()
            .map(bookmark_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("load_bookmarks", e))?;

        Ok(Some(User {
            id,
            phone,
            bookmarks,
        }))
    }

    #[instrument(skip(self), fields(user_id = %user_id, track_id = %track_id), err)]
    async fn set_bookmark_track_id(
        &self,
        user_id: UserId,
        track_number: &str,
        track_id: TrackId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE bookmarks
            SET track_id = $3
            WHERE user_id = $1
              AND position = (
                  SELECT MIN(position) FROM bookmarks
                  WHERE user_id = $1 AND track_number = $2
              )
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(track_number)
        .bind(track_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_bookmark_track_id", e))?;

        Ok(result.rows_affected() > 0)
    }
}

/// Postgres-backed track store.
///
/// Statuses are joined with a `LEFT JOIN`, so a history entry whose status row is gone
/// loads with no status, like an unresolvable reference.
#[derive(Debug, Clone)]
pub struct PostgresTrackStore {
    pool: Arc<PgPool>,
}

impl PostgresTrackStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn load_track(&self, row: Option<PgRow>, populate: bool) -> Result<Option<Track>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut track = track_from_row(&row).map_err(|e| map_sqlx_error("load_track", e))?;
        track.history = if populate {
            self.populated_history(track.id).await?
        } else {
            self.plain_history(track.id).await?
        };
        Ok(Some(track))
    }

    async fn plain_history(&self, id: TrackId) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status_id, occurred_at
            FROM track_history
            WHERE track_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_history", e))?;

        rows.iter()
            .map(|row| {
                Ok(HistoryEntry {
                    status: row
                        .try_get::<Option<Uuid>, _>("status_id")?
                        .map(|id| StatusRef::Id(StatusId::from_uuid(id))),
                    timestamp: row.try_get("occurred_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("load_history", e))
    }

    async fn populated_history(&self, id: TrackId) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id AS status_id, s.status_text, h.occurred_at
            FROM track_history h
            LEFT JOIN statuses s ON s.id = h.status_id
            WHERE h.track_id = $1
            ORDER BY h.position ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_history_with_statuses", e))?;

        rows.iter()
            .map(|row| {
                let status_id: Option<Uuid> = row.try_get("status_id")?;
                let status_text: Option<String> = row.try_get("status_text")?;
                let status = match (status_id, status_text) {
                    (Some(id), Some(text)) => Some(StatusRef::Resolved(Status::new(StatusId::from_uuid(id), text))),
                    _ => None,
                };
                Ok(HistoryEntry {
                    status,
                    timestamp: row.try_get("occurred_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("load_history_with_statuses", e))
    }
}

fn track_from_row(row: &PgRow) -> Result<Track, sqlx::Error> {
    Ok(Track {
        id: TrackId::from_uuid(row.try_get("id")?),
        track: row.try_get("track")?,
        user: row.try_get("user_phone")?,
        price: row.try_get("price")?,
        weight: row.try_get("weight")?,
        history: Vec::new(),
    })
}

#[async_trait]
impl TrackStore for PostgresTrackStore {
    #[instrument(skip(self), err)]
    async fn find_by_number(&self, track_number: &str) -> Result<Option<Track>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, track, user_phone, price, weight
            FROM tracks
            WHERE track = $1
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(track_number)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_track_by_number", e))?;

        self.load_track(row, false).await
    }

    #[instrument(skip(self), fields(track_id = %id), err)]
    async fn find_with_statuses(&self, id: TrackId) -> Result<Option<Track>, StoreError> {
        let row = sqlx::query("SELECT id, track, user_phone, price, weight FROM tracks WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_track", e))?;

        self.load_track(row, true).await
    }

    #[instrument(skip(self, track), fields(track_id = %track.id), err)]
    async fn save(&self, track: &Track) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tracks (id, track, user_phone, price, weight)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                track = EXCLUDED.track,
                user_phone = EXCLUDED.user_phone,
                price = EXCLUDED.price,
                weight = EXCLUDED.weight
            "#,
        )
        .bind(track.id.as_uuid())
        .bind(&track.track)
        .bind(track.user.as_deref())
        .bind(track.price)
        .bind(track.weight)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_track", e))?;

        Ok(())
    }
}
