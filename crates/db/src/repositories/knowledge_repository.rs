use crate::error::DbError;
use crate::models::{KnowledgeEntry, KnowledgeRow};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct KnowledgeRepository {
    pool: SqlitePool,
}

impl KnowledgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &KnowledgeEntry) -> Result<(), DbError> {
        let row = KnowledgeRow::from(entry);

        sqlx::query(
            r#"
            INSERT INTO knowledge (id, topic, content, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.topic)
        .bind(&row.content)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<KnowledgeEntry>, DbError> {
        let rows: Vec<KnowledgeRow> = sqlx::query_as(
            r#"
            SELECT id, topic, content, created_at
            FROM knowledge
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM knowledge")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Load starter documents on first boot so retrieval has something to
    /// match against. Idempotent.
    pub async fn seed_defaults(&self) -> Result<usize, DbError> {
        if self.count().await? > 0 {
            return Ok(0);
        }

        let defaults = [
            (
                "algebra",
                "To solve a linear equation ax + b = c, subtract b from both \
                 sides and divide by a. Always verify by substituting back.",
            ),
            (
                "algebra",
                "A quadratic ax^2 + bx + c = 0 is solved by factoring, \
                 completing the square, or the quadratic formula \
                 x = (-b +/- sqrt(b^2 - 4ac)) / 2a.",
            ),
            (
                "geometry",
                "The Pythagorean theorem relates the legs and hypotenuse of a \
                 right triangle: a^2 + b^2 = c^2.",
            ),
            (
                "arithmetic",
                "Order of operations: parentheses first, then exponents, then \
                 multiplication and division left to right, then addition and \
                 subtraction left to right.",
            ),
            (
                "fractions",
                "To add fractions, rewrite them over a common denominator \
                 before summing the numerators. Reduce the result.",
            ),
        ];

        for (topic, content) in defaults {
            self.insert(&KnowledgeEntry::new(topic, content)).await?;
        }

        Ok(defaults.len())
    }
}
