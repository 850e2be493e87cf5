use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, NewSource, Source};

impl Database {
    // ========================================================================
    // Source Operations
    // ========================================================================

    pub async fn count_sources(&self) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sources")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Insert or update sources keyed by platform user id.
    ///
    /// Handle and display name follow the latest lookup; `last_checked_at` and
    /// curated items are never touched. Sources are never deleted.
    pub async fn upsert_sources(&self, sources: &[NewSource]) -> Result<(), DatabaseError> {
        if sources.is_empty() {
            return Ok(());
        }

        const BATCH_SIZE: usize = 100;
        let mut tx = self.pool.begin().await?;

        for chunk in sources.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO sources (user_id, handle, display_name) ");

            builder.push_values(chunk, |mut b, source| {
                b.push_bind(&source.user_id)
                    .push_bind(&source.handle)
                    .push_bind(&source.display_name);
            });

            builder.push(
                " ON CONFLICT(user_id) DO UPDATE SET handle = excluded.handle, display_name = excluded.display_name",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_sources(&self) -> Result<Vec<Source>, DatabaseError> {
        let sources = sqlx::query_as::<_, Source>(
            "SELECT id, user_id, handle, display_name, last_checked_at FROM sources ORDER BY handle COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// The source most overdue for a scan: never-checked first, then oldest
    /// `last_checked_at`, ties broken by insertion order.
    pub async fn next_source_to_check(&self) -> Result<Option<Source>, DatabaseError> {
        let source = sqlx::query_as::<_, Source>(
            r#"
            SELECT id, user_id, handle, display_name, last_checked_at
            FROM sources
            ORDER BY last_checked_at IS NOT NULL, last_checked_at ASC, id ASC
            LIMIT 1
        "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    /// Record a scan attempt that produced nothing to merge (e.g. a failed fetch).
    pub async fn mark_source_attempted(&self, source_id: i64, now: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE sources SET last_checked_at = ? WHERE id = ?")
            .bind(now)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_source(user_id: &str, handle: &str) -> NewSource {
        NewSource {
            user_id: user_id.to_string(),
            handle: handle.to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_by_user_id() {
        let db = Database::open(":memory:").await.unwrap();
        db.upsert_sources(&[new_source("1", "alice"), new_source("2", "bob")])
            .await
            .unwrap();
        db.mark_source_attempted(1, 500).await.unwrap();

        // Renamed handle, same account
        db.upsert_sources(&[new_source("1", "alice_renamed")])
            .await
            .unwrap();

        assert_eq!(db.count_sources().await.unwrap(), 2);
        let sources = db.get_sources().await.unwrap();
        let alice = sources.iter().find(|s| s.user_id == "1").unwrap();
        assert_eq!(alice.handle, "alice_renamed");
        assert_eq!(alice.last_checked_at, Some(500));
    }

    #[tokio::test]
    async fn test_upsert_empty_is_noop() {
        let db = Database::open(":memory:").await.unwrap();
        db.upsert_sources(&[]).await.unwrap();
        assert_eq!(db.count_sources().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_next_source_on_empty_table() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(db.next_source_to_check().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_source_prefers_never_checked_then_oldest() {
        let db = Database::open(":memory:").await.unwrap();
        db.upsert_sources(&[
            new_source("1", "recent"),
            new_source("2", "stale"),
            new_source("3", "never"),
        ])
        .await
        .unwrap();

        let now = 1_700_000_000;
        db.mark_source_attempted(1, now - 60).await.unwrap();
        db.mark_source_attempted(2, now - 3 * 86_400).await.unwrap();

        let first = db.next_source_to_check().await.unwrap().unwrap();
        assert_eq!(first.handle, "never");
        db.mark_source_attempted(first.id, now).await.unwrap();

        let second = db.next_source_to_check().await.unwrap().unwrap();
        assert_eq!(second.handle, "stale");
        db.mark_source_attempted(second.id, now).await.unwrap();

        let third = db.next_source_to_check().await.unwrap().unwrap();
        assert_eq!(third.handle, "recent");
    }

    #[tokio::test]
    async fn test_next_source_ties_follow_insertion_order() {
        let db = Database::open(":memory:").await.unwrap();
        db.upsert_sources(&[new_source("9", "first"), new_source("3", "second")])
            .await
            .unwrap();
        let next = db.next_source_to_check().await.unwrap().unwrap();
        assert_eq!(next.handle, "first");
    }
}
