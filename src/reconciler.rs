use crate::store::Store;
use crate::types::{NewEntry, Result, Source};
use chrono::Utc;
use tracing::debug;

/// Merge freshly fetched entries into the item store for one source.
///
/// Entries whose `(source_id, guid)` already exists are skipped, since items are
/// immutable once stored, so content drift at the origin is not applied
/// retroactively. The whole operation runs in a single transaction: a storage
/// error rolls back every pending creation and leaves prior state untouched.
/// Returns the number of newly created items.
pub async fn reconcile(store: &Store, source: &Source, entries: &[NewEntry]) -> Result<usize> {
    let mut tx = store.pool().begin().await?;
    let now = Utc::now().naive_utc();
    let mut created = 0usize;

    for entry in entries {
        let existing = sqlx::query("SELECT 1 FROM items WHERE source_id = ? AND guid = ?")
            .bind(source.id)
            .bind(&entry.guid)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            continue;
        }

        // A concurrent update pass may have raced us past the existence check;
        // the uniqueness constraint absorbs the duplicate attempt silently.
        let result = sqlx::query(
            r#"
            INSERT INTO items (source_id, title, link, description, guid, published, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source_id, guid) DO NOTHING
            "#,
        )
        .bind(source.id)
        .bind(&entry.title)
        .bind(&entry.link)
        .bind(&entry.description)
        .bind(&entry.guid)
        .bind(entry.published.coerce())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        created += result.rows_affected() as usize;
    }

    sqlx::query("UPDATE sources SET last_updated = ? WHERE id = ?")
        .bind(now)
        .bind(source.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    debug!(source = %source.name, fetched = entries.len(), created, "reconciled entries");
    Ok(created)
}
