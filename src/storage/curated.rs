use sqlx::{QueryBuilder, Sqlite};

use super::schema::Database;
use super::types::{ContentItem, CuratedItem, CuratedRow, CurationState, DatabaseError, MergeOutcome};

/// Default page size of the review queries.
pub const REVIEW_PAGE_SIZE: i64 = 8;

const CURATED_SELECT: &str = r#"
    SELECT
        c.id, c.item_id, c.source_id, s.handle, c.state,
        c.selected_at, c.checked_at, c.published_at,
        i.text, i.created_at, i.favorite_count, i.repost_count
    FROM curated_items c
    JOIN sources s ON s.id = c.source_id
    JOIN content_items i ON i.id = c.item_id
"#;

impl Database {
    // ========================================================================
    // Selection Merge
    // ========================================================================

    /// Merge one scan's ranked items into the curated set, atomically.
    ///
    /// - unseen item: stored and curated as `Unscreened` with `selected_at = now`
    /// - still `Unscreened`: counters and `selected_at` refreshed
    /// - anything past `Unscreened`: left untouched
    ///
    /// The source's `last_checked_at` is stamped in the same transaction, so a
    /// failed merge leaves the source exactly as it was.
    pub async fn merge_selection(
        &self,
        source_id: i64,
        items: &[ContentItem],
        now: i64,
    ) -> Result<MergeOutcome, DatabaseError> {
        let mut outcome = MergeOutcome::default();
        let mut tx = self.pool.begin().await?;

        for item in items {
            let existing: Option<(i64,)> =
                sqlx::query_as("SELECT state FROM curated_items WHERE item_id = ?")
                    .bind(&item.id)
                    .fetch_optional(&mut *tx)
                    .await?;

            match existing {
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO content_items
                            (id, created_at, text, reply_count, repost_count, favorite_count, quote_count)
                        VALUES (?, ?, ?, ?, ?, ?, ?)
                        ON CONFLICT(id) DO UPDATE SET
                            reply_count = excluded.reply_count,
                            repost_count = excluded.repost_count,
                            favorite_count = excluded.favorite_count,
                            quote_count = excluded.quote_count
                    "#,
                    )
                    .bind(&item.id)
                    .bind(&item.created_at)
                    .bind(&item.text)
                    .bind(item.reply_count)
                    .bind(item.repost_count)
                    .bind(item.favorite_count)
                    .bind(item.quote_count)
                    .execute(&mut *tx)
                    .await?;

                    sqlx::query(
                        "INSERT INTO curated_items (item_id, source_id, state, selected_at) VALUES (?, ?, ?, ?)",
                    )
                    .bind(&item.id)
                    .bind(source_id)
                    .bind(CurationState::Unscreened.as_i64())
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;

                    outcome.inserted += 1;
                }
                Some((state,)) if state == CurationState::Unscreened.as_i64() => {
                    sqlx::query(
                        r#"
                        UPDATE content_items SET
                            reply_count = ?, repost_count = ?, favorite_count = ?, quote_count = ?
                        WHERE id = ?
                    "#,
                    )
                    .bind(item.reply_count)
                    .bind(item.repost_count)
                    .bind(item.favorite_count)
                    .bind(item.quote_count)
                    .bind(&item.id)
                    .execute(&mut *tx)
                    .await?;

                    sqlx::query(
                        "UPDATE curated_items SET selected_at = ? WHERE item_id = ? AND state = ?",
                    )
                    .bind(now)
                    .bind(&item.id)
                    .bind(CurationState::Unscreened.as_i64())
                    .execute(&mut *tx)
                    .await?;

                    outcome.refreshed += 1;
                }
                Some((state,)) => {
                    tracing::debug!(item_id = %item.id, state = state, "Item already reviewed, leaving untouched");
                    outcome.untouched += 1;
                }
            }
        }

        sqlx::query("UPDATE sources SET last_checked_at = ? WHERE id = ?")
            .bind(now)
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    // ========================================================================
    // Review Queries
    // ========================================================================

    /// Curated items in `state`, newest item identity first.
    ///
    /// `older_than` pages backwards: only identities numerically below it.
    pub async fn curated_by_state(
        &self,
        state: CurationState,
        older_than: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CuratedItem>, DatabaseError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(CURATED_SELECT);
        builder.push(" WHERE c.state = ");
        builder.push_bind(state.as_i64());
        push_older_than(&mut builder, older_than);
        push_newest_first(&mut builder, limit);

        let rows: Vec<CuratedRow> = builder.build_query_as::<CuratedRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(CuratedRow::into_curated).collect()
    }

    /// Curated items of one source (handle compared case-insensitively), any
    /// state, newest item identity first.
    pub async fn curated_by_handle(
        &self,
        handle: &str,
        older_than: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CuratedItem>, DatabaseError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(CURATED_SELECT);
        builder.push(" WHERE lower(s.handle) = lower(");
        builder.push_bind(handle.trim_start_matches('@'));
        builder.push(")");
        push_older_than(&mut builder, older_than);
        push_newest_first(&mut builder, limit);

        let rows: Vec<CuratedRow> = builder.build_query_as::<CuratedRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(CuratedRow::into_curated).collect()
    }

    pub async fn get_curated(&self, item_id: &str) -> Result<Option<CuratedItem>, DatabaseError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(CURATED_SELECT);
        builder.push(" WHERE c.item_id = ");
        builder.push_bind(item_id);

        let row: Option<CuratedRow> = builder.build_query_as::<CuratedRow>().fetch_optional(&self.pool).await?;
        row.map(CuratedRow::into_curated).transpose()
    }

    // ========================================================================
    // Review Decisions
    // ========================================================================

    /// Apply a review decision, returning the previous state.
    ///
    /// Stamps `checked_at`, and `published_at` when moving to `Published`.
    pub async fn set_curated_state(
        &self,
        item_id: &str,
        to: CurationState,
        now: i64,
    ) -> Result<CurationState, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64,)> =
            sqlx::query_as("SELECT state FROM curated_items WHERE item_id = ?")
                .bind(item_id)
                .fetch_optional(&mut *tx)
                .await?;
        let from = match current {
            Some((state,)) => CurationState::try_from(state)?,
            None => return Err(DatabaseError::NotFound(item_id.to_string())),
        };

        if !from.can_transition_to(to) {
            return Err(DatabaseError::InvalidTransition {
                item_id: item_id.to_string(),
                from,
                to,
            });
        }

        let published_at = (to == CurationState::Published).then_some(now);
        sqlx::query(
            r#"
            UPDATE curated_items
            SET state = ?, checked_at = ?, published_at = COALESCE(?, published_at)
            WHERE item_id = ?
        "#,
        )
        .bind(to.as_i64())
        .bind(now)
        .bind(published_at)
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(item_id = %item_id, from = %from, to = %to, "Review decision recorded");
        Ok(from)
    }
}

/// Identities are unsigned decimal strings without leading zeros, so a longer
/// string is a larger number and equal lengths compare lexically.
fn push_older_than(builder: &mut QueryBuilder<Sqlite>, older_than: Option<&str>) {
    if let Some(bound) = older_than {
        builder.push(" AND (length(c.item_id) < length(");
        builder.push_bind(bound.to_string());
        builder.push(") OR (length(c.item_id) = length(");
        builder.push_bind(bound.to_string());
        builder.push(") AND c.item_id < ");
        builder.push_bind(bound.to_string());
        builder.push("))");
    }
}

fn push_newest_first(builder: &mut QueryBuilder<Sqlite>, limit: i64) {
    builder.push(" ORDER BY length(c.item_id) DESC, c.item_id DESC LIMIT ");
    builder.push_bind(limit);
}
