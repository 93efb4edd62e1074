use crate::types::{
    AggregateError, Group, Item, ItemWindow, Result, SelectorRules, Source, SourceKind,
};
use chrono::{NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

/// SQLite-backed persistent store for sources, items and aggregate groups.
///
/// Identity invariants live in the schema: `(source_id, guid)` is unique,
/// items cascade-delete with their source, and group membership rows cascade
/// with either side while leaving the other intact.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database on a single connection, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                url TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                include_in_aggregate INTEGER NOT NULL DEFAULT 1,
                selectors TEXT,
                last_updated TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                link TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                guid TEXT NOT NULL,
                published TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (source_id, guid)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                active INTEGER NOT NULL DEFAULT 1,
                last_updated TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS group_members (
                group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
                PRIMARY KEY (group_id, source_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // --- sources ---

    pub async fn add_source(
        &self,
        name: &str,
        kind: SourceKind,
        url: &str,
        selectors: Option<&SelectorRules>,
    ) -> Result<Source> {
        let created_at = Utc::now().naive_utc();
        let selectors_json = selectors.map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO sources (name, kind, url, active, include_in_aggregate, selectors, created_at)
            VALUES (?, ?, ?, 1, 1, ?, ?)
            "#,
        )
        .bind(name)
        .bind(kind.as_str())
        .bind(url)
        .bind(&selectors_json)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(id, name, %kind, url, "added source");
        self.get_source(id).await
    }

    pub async fn get_source(&self, id: i64) -> Result<Source> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row_to_source(&row),
            None => Err(AggregateError::SourceNotFound { id }),
        }
    }

    pub async fn list_sources(&self, only_active: bool) -> Result<Vec<Source>> {
        let query = if only_active {
            "SELECT * FROM sources WHERE active = 1 ORDER BY id"
        } else {
            "SELECT * FROM sources ORDER BY id"
        };
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_source).collect()
    }

    /// Active sources flagged for inclusion in the combined aggregate view;
    /// also the default membership for a newly created group.
    pub async fn list_aggregate_sources(&self) -> Result<Vec<Source>> {
        let rows =
            sqlx::query("SELECT * FROM sources WHERE active = 1 AND include_in_aggregate = 1 ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_source).collect()
    }

    /// Replace the extraction rule set of a source.
    pub async fn set_selectors(&self, id: i64, selectors: &SelectorRules) -> Result<()> {
        let json = serde_json::to_string(selectors)?;
        let result = sqlx::query("UPDATE sources SET selectors = ? WHERE id = ?")
            .bind(json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AggregateError::SourceNotFound { id });
        }
        Ok(())
    }

    /// Deactivation suppresses future updates and publication but keeps history.
    pub async fn set_source_active(&self, id: i64, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE sources SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AggregateError::SourceNotFound { id });
        }
        Ok(())
    }

    /// Opt a source in or out of the combined aggregate view.
    pub async fn set_include_in_aggregate(&self, id: i64, include: bool) -> Result<()> {
        let result = sqlx::query("UPDATE sources SET include_in_aggregate = ? WHERE id = ?")
            .bind(include)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AggregateError::SourceNotFound { id });
        }
        Ok(())
    }

    /// Deleting a source cascades to its items and its group memberships.
    pub async fn delete_source(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AggregateError::SourceNotFound { id });
        }
        info!(id, "deleted source");
        Ok(())
    }

    // --- items ---

    pub async fn count_items(&self, source_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM items WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn items_for_source(&self, source_id: i64, window: ItemWindow) -> Result<Vec<Item>> {
        let (limit, offset) = window_bounds(window);
        let rows = sqlx::query(
            r#"
            SELECT * FROM items
            WHERE source_id = ?
            ORDER BY published DESC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(source_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    /// Combined view across all active sources flagged for aggregation,
    /// strictly newest-first. Ties on `published` break by insertion order
    /// (ascending id), consistently across pages.
    pub async fn recent_items(&self, window: ItemWindow) -> Result<Vec<Item>> {
        let (limit, offset) = window_bounds(window);
        let rows = sqlx::query(
            r#"
            SELECT i.* FROM items i
            JOIN sources s ON s.id = i.source_id
            WHERE s.active = 1 AND s.include_in_aggregate = 1
            ORDER BY i.published DESC, i.id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    /// Merged item view for one group: the union of its currently active
    /// members, ordered by publication timestamp descending with the same
    /// insertion-order tie-break as [`Store::recent_items`].
    pub async fn group_items(&self, group_id: i64, window: ItemWindow) -> Result<Vec<Item>> {
        let (limit, offset) = window_bounds(window);
        let rows = sqlx::query(
            r#"
            SELECT i.* FROM items i
            JOIN sources s ON s.id = i.source_id
            JOIN group_members m ON m.source_id = s.id
            WHERE m.group_id = ? AND s.active = 1
            ORDER BY i.published DESC, i.id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    // --- groups ---

    pub async fn add_group(&self, name: &str, slug: &str, description: &str) -> Result<Group> {
        let created_at = Utc::now().naive_utc();
        let result = sqlx::query(
            "INSERT INTO groups (name, slug, description, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(id, name, slug, "added group");
        self.get_group(id).await
    }

    pub async fn get_group(&self, id: i64) -> Result<Group> {
        let row = sqlx::query("SELECT * FROM groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row_to_group(&row),
            None => Err(AggregateError::GroupNotFound {
                slug: id.to_string(),
            }),
        }
    }

    pub async fn get_group_by_slug(&self, slug: &str) -> Result<Group> {
        let row = sqlx::query("SELECT * FROM groups WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row_to_group(&row),
            None => Err(AggregateError::GroupNotFound {
                slug: slug.to_string(),
            }),
        }
    }

    pub async fn list_groups(&self, only_active: bool) -> Result<Vec<Group>> {
        let query = if only_active {
            "SELECT * FROM groups WHERE active = 1 ORDER BY id"
        } else {
            "SELECT * FROM groups ORDER BY id"
        };
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_group).collect()
    }

    pub async fn add_group_member(&self, group_id: i64, source_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO group_members (group_id, source_id) VALUES (?, ?) \
             ON CONFLICT (group_id, source_id) DO NOTHING",
        )
        .bind(group_id)
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_group_member(&self, group_id: i64, source_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM group_members WHERE group_id = ? AND source_id = ?")
            .bind(group_id)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deleting a group removes its membership rows only; member sources and
    /// their items stay.
    pub async fn delete_group(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AggregateError::GroupNotFound {
                slug: id.to_string(),
            });
        }
        info!(id, "deleted group");
        Ok(())
    }

    pub async fn touch_active_groups(&self, at: NaiveDateTime) -> Result<()> {
        sqlx::query("UPDATE groups SET last_updated = ? WHERE active = 1")
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn window_bounds(window: ItemWindow) -> (i64, i64) {
    match window {
        ItemWindow::Page { page, per_page } => {
            let page = page.max(1) as i64;
            (per_page as i64, (page - 1) * per_page as i64)
        }
        ItemWindow::Limit(n) => (n as i64, 0),
        // LIMIT -1 is SQLite for "no limit".
        ItemWindow::All => (-1, 0),
    }
}

fn row_to_source(row: &SqliteRow) -> Result<Source> {
    let kind: String = row.try_get("kind")?;
    let kind = SourceKind::parse(&kind)
        .ok_or_else(|| AggregateError::General(format!("unknown source kind: {kind}")))?;

    let selectors: Option<String> = row.try_get("selectors")?;
    let selectors = selectors
        .as_deref()
        .map(serde_json::from_str::<SelectorRules>)
        .transpose()?;

    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind,
        url: row.try_get("url")?,
        active: row.try_get("active")?,
        include_in_aggregate: row.try_get("include_in_aggregate")?,
        selectors,
        last_updated: row.try_get("last_updated")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_item(row: &SqliteRow) -> Result<Item> {
    Ok(Item {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        title: row.try_get("title")?,
        link: row.try_get("link")?,
        description: row.try_get("description")?,
        guid: row.try_get("guid")?,
        published: row.try_get("published")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_group(row: &SqliteRow) -> Result<Group> {
    Ok(Group {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        active: row.try_get("active")?,
        last_updated: row.try_get("last_updated")?,
        created_at: row.try_get("created_at")?,
    })
}
