use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, NewQuote, Quote};

impl Database {
    // ========================================================================
    // Quote Operations
    // ========================================================================

    /// Insert quotes, skipping any (author, text) pair already stored.
    /// Returns the number of new rows.
    pub async fn insert_quotes(&self, quotes: &[NewQuote]) -> Result<usize, DatabaseError> {
        if quotes.is_empty() {
            return Ok(0);
        }

        const BATCH_SIZE: usize = 100;
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in quotes.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO quotes (author, text, source) ");

            builder.push_values(chunk, |mut b, quote| {
                b.push_bind(quote.author.trim())
                    .push_bind(quote.text.trim())
                    .push_bind(&quote.source);
            });

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// The quote due next: never published first, then least recently
    /// published, ties broken by insertion order.
    pub async fn next_quote(&self) -> Result<Option<Quote>, DatabaseError> {
        let quote = sqlx::query_as::<_, Quote>(
            r#"
            SELECT id, author, text, source, last_published_at
            FROM quotes
            ORDER BY last_published_at IS NOT NULL, last_published_at ASC, id ASC
            LIMIT 1
        "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(quote)
    }

    pub async fn mark_quote_published(&self, quote_id: i64, now: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE quotes SET last_published_at = ? WHERE id = ?")
            .bind(now)
            .bind(quote_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
