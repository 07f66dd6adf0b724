use crate::error::DbError;
use crate::models::{ViewStateRow, ViewStateSnapshot};
use solver_core::ViewState;
use sqlx::SqlitePool;
use tracing::warn;

#[derive(Clone)]
pub struct ViewStateRepository {
    pool: SqlitePool,
}

impl ViewStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert the snapshot for a session.
    ///
    /// Transient states are rejected; a session stuck mid-run must restore
    /// to `Input`, never replay a half-finished pipeline.
    pub async fn save(&self, snapshot: &ViewStateSnapshot) -> Result<(), DbError> {
        if !snapshot.state.is_persistable() {
            return Err(DbError::UnpersistableState(
                snapshot.state.as_str().to_string(),
            ));
        }

        let row = ViewStateRow::from(snapshot);

        sqlx::query(
            r#"
            INSERT INTO view_states (session_id, state, transcript, extraction_confidence, entry_id, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                state = excluded.state,
                transcript = excluded.transcript,
                extraction_confidence = excluded.extraction_confidence,
                entry_id = excluded.entry_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.session_id)
        .bind(&row.state)
        .bind(&row.transcript)
        .bind(row.extraction_confidence)
        .bind(&row.entry_id)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the snapshot for a session, if one was ever saved.
    ///
    /// Rows written before the persistability guard existed may still hold
    /// a transient state; those restore as a fresh `Input` snapshot.
    pub async fn load(&self, session_id: &str) -> Result<Option<ViewStateSnapshot>, DbError> {
        let row: Option<ViewStateRow> = sqlx::query_as(
            r#"
            SELECT session_id, state, transcript, extraction_confidence, entry_id, updated_at
            FROM view_states
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let snapshot = r.into_domain();
            if snapshot.state == ViewState::Processing {
                warn!(session_id = %snapshot.session_id, "discarding stale processing state");
                ViewStateSnapshot::initial(snapshot.session_id)
            } else {
                snapshot
            }
        }))
    }

    pub async fn clear(&self, session_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM view_states WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
