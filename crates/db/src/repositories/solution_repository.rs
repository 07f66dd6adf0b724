use crate::error::DbError;
use crate::models::{SolutionEntry, SolutionRow};
use chrono::Utc;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct SolutionRepository {
    pool: SqlitePool,
}

impl SolutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, entry: &SolutionEntry) -> Result<SolutionEntry, DbError> {
        let row = SolutionRow::from(entry);

        sqlx::query(
            r#"
            INSERT INTO solutions (
                id, original_input, modality, parsed_question, topic,
                final_answer, explanation, confidence, requires_human_review,
                hitl_reasons, sources, trace, metadata,
                user_feedback, feedback_comment, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.original_input)
        .bind(&row.modality)
        .bind(&row.parsed_question)
        .bind(&row.topic)
        .bind(&row.final_answer)
        .bind(&row.explanation)
        .bind(row.confidence)
        .bind(row.requires_human_review)
        .bind(&row.hitl_reasons)
        .bind(&row.sources)
        .bind(&row.trace)
        .bind(&row.metadata)
        .bind(&row.user_feedback)
        .bind(&row.feedback_comment)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(entry.clone())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<SolutionEntry>, DbError> {
        let row: Option<SolutionRow> = sqlx::query_as(
            r#"
            SELECT id, original_input, modality, parsed_question, topic,
                   final_answer, explanation, confidence, requires_human_review,
                   hitl_reasons, sources, trace, metadata,
                   user_feedback, feedback_comment, created_at, updated_at
            FROM solutions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn find_recent(&self, limit: i64) -> Result<Vec<SolutionEntry>, DbError> {
        let rows: Vec<SolutionRow> = sqlx::query_as(
            r#"
            SELECT id, original_input, modality, parsed_question, topic,
                   final_answer, explanation, confidence, requires_human_review,
                   hitl_reasons, sources, trace, metadata,
                   user_feedback, feedback_comment, created_at, updated_at
            FROM solutions
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Record a correctness rating against a stored solution.
    ///
    /// Returns `false` when no entry with the given id exists. Nothing is
    /// written in that case.
    pub async fn update_feedback(
        &self,
        id: &str,
        is_correct: bool,
        comment: Option<&str>,
    ) -> Result<bool, DbError> {
        let feedback = if is_correct { "correct" } else { "incorrect" };

        let result = sqlx::query(
            r#"
            UPDATE solutions
            SET user_feedback = ?, feedback_comment = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(feedback)
        .bind(comment)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM solutions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
