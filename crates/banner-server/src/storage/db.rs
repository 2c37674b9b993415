//! SQLite banner store (embedded, no external dependencies)

use anyhow::Context;
use async_trait::async_trait;
use banner_core::{validate, BannerError, BannerStore, Result};
use banner_types::{Banner, BannerFilter, BannerPatch, NewBanner, Slot};
use serde_json::Value;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use super::query::{bind_values, ListQuery, SqlValue, UpdateQuery};

/// Database path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

pub struct Database {
    pool: Arc<SqlitePool>,
}

/// Which taxonomy member a referential violation maps to.
#[derive(Debug, Clone, Copy)]
enum Mutation {
    /// Unknown tag or feature is bad input on create
    Create,
    /// Unknown tag or feature is a missing target on update
    Update,
}

impl Database {
    pub async fn new(database_path: &str, max_connections: u32) -> anyhow::Result<Self> {
        if database_path == MEMORY_PATH {
            return Self::in_memory().await;
        }

        tracing::info!("Opening SQLite database at: {}", database_path);

        // Create parent directory if needed
        if let Some(parent) = std::path::Path::new(database_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| {
                format!("Failed to connect to SQLite database at: {}", database_path)
            })?;

        tracing::info!("SQLite connection established, running migrations...");

        Self::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        tracing::info!("Database initialization complete");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Open a fresh in-memory database.
    ///
    /// Every SQLite connection to `:memory:` sees its own database, so the
    /// pool is pinned to one connection that is never recycled.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
        // Referential anchors
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feature (
                id INTEGER PRIMARY KEY
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tag (
                id INTEGER PRIMARY KEY
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Banners table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS banner (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content JSON NOT NULL CHECK (json_valid(content)),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                feature_id INTEGER NOT NULL REFERENCES feature (id),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Tag slots; feature_id is denormalized to back the uniqueness rule
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS banner_tag (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                banner_id INTEGER NOT NULL REFERENCES banner (id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tag (id),
                feature_id INTEGER NOT NULL,
                CONSTRAINT unique_tag_feature UNIQUE (tag_id, feature_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_banner_tag_banner_id ON banner_tag (banner_id)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn fetch_banners(&self, op: &str, query: ListQuery) -> Result<Vec<Banner>> {
        let (sql, values) = query.build();

        let rows = bind_values(sqlx::query(&sql), values)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| internal(op, e))?;

        let rows = rows
            .iter()
            .map(BannerRow::from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| internal(op, e))?;

        coalesce_rows(rows)
    }
}

#[async_trait]
impl BannerStore for Database {
    async fn create_banner(&self, banner: &NewBanner) -> Result<i64> {
        const OP: &str = "storage.db.create_banner";

        let banner = validate::new_banner(banner)?;
        let content = serde_json::to_string(&banner.content)?;

        let mut tx = self.pool.begin().await.map_err(|e| internal(OP, e))?;

        let banner_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO banner (content, is_active, feature_id)
            VALUES (?1, ?2, ?3)
            RETURNING id
            "#,
        )
        .bind(&content)
        .bind(banner.is_active)
        .bind(banner.feature_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| classify(OP, e, Mutation::Create))?;

        for tag_id in &banner.tag_ids {
            // Any failure drops `tx`, rolling the banner row back with it
            sqlx::query(
                r#"
                INSERT INTO banner_tag (banner_id, tag_id, feature_id)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(banner_id)
            .bind(tag_id)
            .bind(banner.feature_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(OP, e, Mutation::Create))?;
        }

        tx.commit().await.map_err(|e| internal(OP, e))?;

        tracing::debug!(
            banner_id,
            feature_id = banner.feature_id,
            tags = banner.tag_ids.len(),
            "banner created"
        );

        Ok(banner_id)
    }

    async fn update_banner(&self, banner_id: i64, patch: &BannerPatch) -> Result<Vec<Slot>> {
        const OP: &str = "storage.db.update_banner";

        validate::require_id("banner_id", banner_id)?;
        let patch = validate::patch(patch)?;

        let mut tx = self.pool.begin().await.map_err(|e| internal(OP, e))?;

        let current_feature: i64 = sqlx::query_scalar(
            r#"
            SELECT feature_id FROM banner WHERE id = ?1
            "#,
        )
        .bind(banner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| internal(OP, e))?
        .ok_or_else(|| BannerError::NotExists(format!("{}: banner {}", OP, banner_id)))?;

        let mut affected = Vec::new();

        // Tag slots do not follow the banner to a new feature
        let feature_id = match patch.feature_id {
            Some(feature_id) if feature_id != current_feature => {
                let dropped: Vec<i64> = sqlx::query_scalar(
                    r#"
                    DELETE FROM banner_tag
                    WHERE banner_id = ?1 AND feature_id = ?2
                    RETURNING tag_id
                    "#,
                )
                .bind(banner_id)
                .bind(current_feature)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| internal(OP, e))?;

                affected.extend(
                    dropped
                        .into_iter()
                        .map(|tag_id| Slot::new(tag_id, current_feature)),
                );
                feature_id
            }
            _ => current_feature,
        };

        let mut update = UpdateQuery::new("banner");
        if let Some(content) = &patch.content {
            update.set("content", SqlValue::Text(serde_json::to_string(content)?));
        }
        if let Some(is_active) = patch.is_active {
            update.set("is_active", SqlValue::Bool(is_active));
        }
        if let Some(new_feature) = patch.feature_id {
            update.set("feature_id", SqlValue::Int(new_feature));
        }
        update.touch("updated_at");

        let (sql, values) = update.build("id", banner_id);
        bind_values(sqlx::query(&sql), values)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(OP, e, Mutation::Update))?;

        if let Some(tag_ids) = &patch.tag_ids {
            for tag_id in tag_ids {
                // Repoints the slot if another banner holds it
                sqlx::query(
                    r#"
                    INSERT INTO banner_tag (banner_id, tag_id, feature_id)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT (tag_id, feature_id) DO UPDATE SET banner_id = excluded.banner_id
                    "#,
                )
                .bind(banner_id)
                .bind(tag_id)
                .bind(feature_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| classify(OP, e, Mutation::Update))?;
            }
        }

        let held = held_slots(&mut *tx, banner_id)
            .await
            .map_err(|e| internal(OP, e))?;

        tx.commit().await.map_err(|e| internal(OP, e))?;

        affected.extend(held);
        affected.sort();
        affected.dedup();

        tracing::debug!(banner_id, slots = affected.len(), "banner updated");

        Ok(affected)
    }

    async fn delete_banner(&self, banner_id: i64) -> Result<Vec<Slot>> {
        const OP: &str = "storage.db.delete_banner";

        validate::require_id("banner_id", banner_id)?;

        let mut tx = self.pool.begin().await.map_err(|e| internal(OP, e))?;

        let held = held_slots(&mut *tx, banner_id)
            .await
            .map_err(|e| internal(OP, e))?;

        let result = sqlx::query(
            r#"
            DELETE FROM banner WHERE id = ?1
            "#,
        )
        .bind(banner_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| internal(OP, e))?;

        if result.rows_affected() == 0 {
            return Err(BannerError::NotExists(format!(
                "{}: banner {}",
                OP, banner_id
            )));
        }

        tx.commit().await.map_err(|e| internal(OP, e))?;

        tracing::debug!(banner_id, slots = held.len(), "banner deleted");

        Ok(held)
    }

    async fn get_banner(&self, tag_id: i64, feature_id: i64) -> Result<Value> {
        const OP: &str = "storage.db.get_banner";

        validate::require_id("tag_id", tag_id)?;
        validate::require_id("feature_id", feature_id)?;

        let content: Option<String> = sqlx::query_scalar(
            r#"
            SELECT json(b.content)
            FROM banner b
            JOIN banner_tag bt ON b.id = bt.banner_id
            WHERE bt.feature_id = ?1 AND bt.tag_id = ?2
            "#,
        )
        .bind(feature_id)
        .bind(tag_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| internal(OP, e))?;

        let content = content.ok_or_else(|| {
            BannerError::NotFound(format!("{}: tag {} feature {}", OP, tag_id, feature_id))
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    async fn get_banner_by_id(&self, banner_id: i64) -> Result<Banner> {
        const OP: &str = "storage.db.get_banner_by_id";

        validate::require_id("banner_id", banner_id)?;

        let mut query = ListQuery::new();
        query.filter("b.id = {}", SqlValue::Int(banner_id));

        self.fetch_banners(OP, query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BannerError::NotExists(format!("{}: banner {}", OP, banner_id)))
    }

    async fn list_banners(&self, filter: &BannerFilter) -> Result<Vec<Banner>> {
        const OP: &str = "storage.db.list_banners";

        if filter.limit.is_some_and(|limit| limit < 0) || filter.offset < 0 {
            return Err(BannerError::InvalidData(
                "limit and offset must not be negative".to_string(),
            ));
        }
        // Zero means "not supplied" for every optional field
        let feature_id = supplied("feature_id", filter.feature_id)?;
        let tag_id = supplied("tag_id", filter.tag_id)?;
        let limit = filter.limit.filter(|limit| *limit > 0);

        let mut query = ListQuery::new();
        if let Some(feature_id) = feature_id {
            query.filter("b.feature_id = {}", SqlValue::Int(feature_id));
        }
        if let Some(tag_id) = tag_id {
            query.filter(
                "EXISTS (SELECT 1 FROM banner_tag f WHERE f.banner_id = b.id AND f.tag_id = {})",
                SqlValue::Int(tag_id),
            );
        }
        query.paginate(limit, filter.offset);

        self.fetch_banners(OP, query).await
    }

    async fn register_references(&self, feature_id: Option<i64>, tag_ids: &[i64]) -> Result<()> {
        const OP: &str = "storage.db.register_references";

        if let Some(feature_id) = feature_id {
            validate::require_id("feature_id", feature_id)?;
        }
        for tag_id in tag_ids {
            validate::require_id("tag_id", *tag_id)?;
        }

        let mut tx = self.pool.begin().await.map_err(|e| internal(OP, e))?;

        if let Some(feature_id) = feature_id {
            sqlx::query(
                r#"
                INSERT INTO feature (id) VALUES (?1) ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(feature_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| internal(OP, e))?;
        }

        for tag_id in tag_ids {
            sqlx::query(
                r#"
                INSERT INTO tag (id) VALUES (?1) ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| internal(OP, e))?;
        }

        tx.commit().await.map_err(|e| internal(OP, e))?;

        Ok(())
    }
}

/// Slots currently held by a banner, ordered by tag id.
async fn held_slots(conn: &mut SqliteConnection, banner_id: i64) -> sqlx::Result<Vec<Slot>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT tag_id, feature_id FROM banner_tag
        WHERE banner_id = ?1
        ORDER BY tag_id
        "#,
    )
    .bind(banner_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(tag_id, feature_id)| Slot::new(tag_id, feature_id))
        .collect())
}

fn supplied(field: &str, id: Option<i64>) -> Result<Option<i64>> {
    match id {
        None | Some(0) => Ok(None),
        Some(id) => validate::require_id(field, id).map(|()| Some(id)),
    }
}

fn internal(op: &str, err: impl std::fmt::Display) -> BannerError {
    BannerError::Internal(format!("{}: {}", op, err))
}

/// Map constraint violations onto the taxonomy; everything else is internal.
fn classify(op: &str, err: sqlx::Error, mutation: Mutation) -> BannerError {
    if let sqlx::Error::Database(db_err) = &err {
        let detail = format!("{}: {}", op, db_err.message());
        match (db_err.kind(), mutation) {
            (ErrorKind::UniqueViolation, _) => return BannerError::AlreadyExists(detail),
            (ErrorKind::ForeignKeyViolation, Mutation::Create) => {
                return BannerError::InvalidData(detail)
            }
            (ErrorKind::ForeignKeyViolation, Mutation::Update) => {
                return BannerError::NotExists(detail)
            }
            (ErrorKind::NotNullViolation | ErrorKind::CheckViolation, _) => {
                return BannerError::InvalidData(detail)
            }
            _ => {}
        }
    }
    internal(op, err)
}

// Helper struct for the fanned-out listing rows
#[derive(Debug, sqlx::FromRow)]
struct BannerRow {
    id: i64,
    content: String,
    is_active: bool,
    feature_id: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    tag_id: Option<i64>,
}

/// Fold one-row-per-tag join output back into banners.
///
/// Banners keep first-seen order and first-seen field values; every
/// non-null `tag_id` is appended to its banner.
fn coalesce_rows(rows: Vec<BannerRow>) -> Result<Vec<Banner>> {
    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut banners: Vec<Banner> = Vec::new();

    for row in rows {
        let pos = match index.get(&row.id) {
            Some(&pos) => pos,
            None => {
                banners.push(Banner {
                    banner_id: row.id,
                    tag_ids: Vec::new(),
                    feature_id: row.feature_id,
                    content: serde_json::from_str(&row.content)?,
                    is_active: row.is_active,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                });
                index.insert(row.id, banners.len() - 1);
                banners.len() - 1
            }
        };

        if let Some(tag_id) = row.tag_id {
            banners[pos].tag_ids.push(tag_id);
        }
    }

    Ok(banners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup() -> Database {
        let db = Database::in_memory().await.unwrap();
        db.register_references(Some(1), &[1, 2, 3, 4, 5]).await.unwrap();
        db.register_references(Some(2), &[]).await.unwrap();
        db
    }

    async fn count(db: &Database, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&*db.pool)
            .await
            .unwrap()
    }

    async fn slots(db: &Database, banner_id: i64) -> Vec<Slot> {
        let mut conn = db.pool.acquire().await.unwrap();
        held_slots(&mut *conn, banner_id).await.unwrap()
    }

    async fn slot_holders(db: &Database, tag_id: i64, feature_id: i64) -> Vec<i64> {
        sqlx::query_scalar(
            "SELECT banner_id FROM banner_tag WHERE tag_id = ?1 AND feature_id = ?2",
        )
        .bind(tag_id)
        .bind(feature_id)
        .fetch_all(&*db.pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = setup().await;

        let id = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({"a": 1}), true))
            .await
            .unwrap();
        assert!(id > 0);

        assert_eq!(db.get_banner(1, 1).await.unwrap(), json!({"a": 1}));
        assert_eq!(db.get_banner(2, 1).await.unwrap(), json!({"a": 1}));
        assert!(matches!(
            db.get_banner(3, 1).await,
            Err(BannerError::NotFound(_))
        ));

        let banner = db.get_banner_by_id(id).await.unwrap();
        assert_eq!(banner.feature_id, 1);
        assert_eq!(banner.tag_ids, vec![1, 2]);
        assert!(banner.is_active);
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let db = setup().await;

        let first = db
            .create_banner(&NewBanner::new(1, vec![1], json!({}), true))
            .await
            .unwrap();
        db.delete_banner(first).await.unwrap();
        let second = db
            .create_banner(&NewBanner::new(1, vec![1], json!({}), true))
            .await
            .unwrap();

        assert!(second > first);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let db = setup().await;

        for banner in [
            NewBanner::new(0, vec![1], json!({"a": 1}), true),
            NewBanner::new(1, vec![], json!({"a": 1}), true),
            NewBanner::new(1, vec![1], Value::Null, true),
        ] {
            assert!(matches!(
                db.create_banner(&banner).await,
                Err(BannerError::InvalidData(_))
            ));
        }
        assert_eq!(count(&db, "banner").await, 0);
    }

    #[tokio::test]
    async fn test_create_collision_is_atomic() {
        let db = setup().await;

        let existing = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({"a": 1}), true))
            .await
            .unwrap();

        // Tag 3 is free but tag 1 collides: nothing may be written
        let result = db
            .create_banner(&NewBanner::new(1, vec![3, 1], json!({"b": 2}), false))
            .await;
        assert!(matches!(result, Err(BannerError::AlreadyExists(_))));

        assert_eq!(count(&db, "banner").await, 1);
        assert_eq!(count(&db, "banner_tag").await, 2);
        assert!(slot_holders(&db, 3, 1).await.is_empty());

        let banner = db.get_banner_by_id(existing).await.unwrap();
        assert_eq!(banner.content, json!({"a": 1}));
        assert_eq!(banner.tag_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_same_tag_different_feature_is_allowed() {
        let db = setup().await;

        db.create_banner(&NewBanner::new(1, vec![1], json!({"f": 1}), true))
            .await
            .unwrap();
        db.create_banner(&NewBanner::new(2, vec![1], json!({"f": 2}), true))
            .await
            .unwrap();

        assert_eq!(db.get_banner(1, 1).await.unwrap(), json!({"f": 1}));
        assert_eq!(db.get_banner(1, 2).await.unwrap(), json!({"f": 2}));
    }

    #[tokio::test]
    async fn test_create_with_unknown_reference() {
        let db = setup().await;

        let unknown_tag = db
            .create_banner(&NewBanner::new(1, vec![1, 99], json!({}), true))
            .await;
        assert!(matches!(unknown_tag, Err(BannerError::InvalidData(_))));

        let unknown_feature = db
            .create_banner(&NewBanner::new(42, vec![1], json!({}), true))
            .await;
        assert!(matches!(unknown_feature, Err(BannerError::InvalidData(_))));

        assert_eq!(count(&db, "banner").await, 0);
        assert_eq!(count(&db, "banner_tag").await, 0);
    }

    #[tokio::test]
    async fn test_partial_update_content_only() {
        let db = setup().await;

        let id = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({"a": 1}), true))
            .await
            .unwrap();
        let before = db.get_banner_by_id(id).await.unwrap();

        db.update_banner(id, &BannerPatch::new().content(json!({"a": 2})))
            .await
            .unwrap();

        let after = db.get_banner_by_id(id).await.unwrap();
        assert_eq!(after.content, json!({"a": 2}));
        assert_eq!(after.feature_id, before.feature_id);
        assert_eq!(after.is_active, before.is_active);
        assert_eq!(after.tag_ids, before.tag_ids);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn test_update_active_and_add_tag() {
        let db = setup().await;

        let id = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({"a": 1}), true))
            .await
            .unwrap();

        let affected = db
            .update_banner(id, &BannerPatch::new().tag_ids(vec![3]).is_active(false))
            .await
            .unwrap();

        let banner = db.get_banner_by_id(id).await.unwrap();
        assert!(!banner.is_active);
        assert_eq!(banner.content, json!({"a": 1}));
        assert_eq!(banner.tag_ids, vec![1, 2, 3]);
        assert_eq!(
            affected,
            vec![Slot::new(1, 1), Slot::new(2, 1), Slot::new(3, 1)]
        );
    }

    #[tokio::test]
    async fn test_update_steals_slot_from_other_banner() {
        let db = setup().await;

        let first = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({"who": "first"}), true))
            .await
            .unwrap();
        let second = db
            .create_banner(&NewBanner::new(1, vec![5], json!({"who": "second"}), true))
            .await
            .unwrap();

        db.update_banner(second, &BannerPatch::new().tag_ids(vec![1]))
            .await
            .unwrap();

        assert_eq!(slot_holders(&db, 1, 1).await, vec![second]);
        assert_eq!(db.get_banner(1, 1).await.unwrap(), json!({"who": "second"}));
        assert_eq!(db.get_banner_by_id(first).await.unwrap().tag_ids, vec![2]);
        assert_eq!(slots(&db, second).await.len(), 2);
    }

    #[tokio::test]
    async fn test_update_feature_drops_old_slots() {
        let db = setup().await;

        let id = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({}), true))
            .await
            .unwrap();

        let affected = db
            .update_banner(id, &BannerPatch::new().feature_id(2).tag_ids(vec![4]))
            .await
            .unwrap();

        assert_eq!(slots(&db, id).await, vec![Slot::new(4, 2)]);
        assert!(matches!(
            db.get_banner(1, 1).await,
            Err(BannerError::NotFound(_))
        ));
        assert_eq!(db.get_banner_by_id(id).await.unwrap().feature_id, 2);
        assert!(affected.contains(&Slot::new(1, 1)));
        assert!(affected.contains(&Slot::new(2, 1)));
        assert!(affected.contains(&Slot::new(4, 2)));
    }

    #[tokio::test]
    async fn test_update_same_feature_keeps_slots() {
        let db = setup().await;

        let id = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({}), true))
            .await
            .unwrap();
        db.update_banner(id, &BannerPatch::new().feature_id(1))
            .await
            .unwrap();

        assert_eq!(db.get_banner_by_id(id).await.unwrap().tag_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_update_missing_targets() {
        let db = setup().await;

        assert!(matches!(
            db.update_banner(999, &BannerPatch::new().is_active(true))
                .await,
            Err(BannerError::NotExists(_))
        ));

        let id = db
            .create_banner(&NewBanner::new(1, vec![1], json!({}), true))
            .await
            .unwrap();

        assert!(matches!(
            db.update_banner(id, &BannerPatch::new().tag_ids(vec![77])).await,
            Err(BannerError::NotExists(_))
        ));
        assert!(matches!(
            db.update_banner(id, &BannerPatch::new().feature_id(55)).await,
            Err(BannerError::NotExists(_))
        ));

        // Failed updates leave the banner as it was
        let banner = db.get_banner_by_id(id).await.unwrap();
        assert_eq!(banner.feature_id, 1);
        assert_eq!(banner.tag_ids, vec![1]);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let db = setup().await;

        let id = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({}), true))
            .await
            .unwrap();
        let removed = db.delete_banner(id).await.unwrap();

        assert_eq!(removed.len(), 2);
        assert!(slots(&db, id).await.is_empty());
        assert_eq!(count(&db, "banner_tag").await, 0);
        assert!(db
            .list_banners(&BannerFilter::new().feature(1))
            .await
            .unwrap()
            .iter()
            .all(|b| b.banner_id != id));
    }

    #[tokio::test]
    async fn test_delete_twice_reports_not_exists() {
        let db = setup().await;

        let id = db
            .create_banner(&NewBanner::new(1, vec![1], json!({}), true))
            .await
            .unwrap();
        db.delete_banner(id).await.unwrap();

        assert!(matches!(
            db.delete_banner(id).await,
            Err(BannerError::NotExists(_))
        ));
        assert!(matches!(
            db.delete_banner(999_999).await,
            Err(BannerError::NotExists(_))
        ));
        assert!(matches!(
            db.delete_banner(0).await,
            Err(BannerError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = setup().await;

        let a = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({"n": "a"}), true))
            .await
            .unwrap();
        let b = db
            .create_banner(&NewBanner::new(1, vec![3], json!({"n": "b"}), false))
            .await
            .unwrap();
        let c = db
            .create_banner(&NewBanner::new(2, vec![1], json!({"n": "c"}), true))
            .await
            .unwrap();

        let ids = |banners: Vec<Banner>| banners.iter().map(|b| b.banner_id).collect::<Vec<_>>();

        assert_eq!(ids(db.list_banners(&BannerFilter::new()).await.unwrap()), vec![a, b, c]);
        assert_eq!(
            ids(db.list_banners(&BannerFilter::new().feature(1)).await.unwrap()),
            vec![a, b]
        );
        assert_eq!(
            ids(db.list_banners(&BannerFilter::new().tag(1)).await.unwrap()),
            vec![a, c]
        );
        assert_eq!(
            ids(db
                .list_banners(&BannerFilter::new().feature(2).tag(1))
                .await
                .unwrap()),
            vec![c]
        );

        // Tag filtering selects banners but still reports their full tag set
        let tagged = db.list_banners(&BannerFilter::new().tag(2)).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].tag_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_list_pages_over_banners() {
        let db = setup().await;

        let mut created = Vec::new();
        for tag_id in 1..=4 {
            created.push(
                db.create_banner(&NewBanner::new(1, vec![tag_id], json!({"t": tag_id}), true))
                    .await
                    .unwrap(),
            );
        }
        // A second tag fans the first banner out into two rows
        db.update_banner(created[0], &BannerPatch::new().tag_ids(vec![5]))
            .await
            .unwrap();

        let page = db
            .list_banners(&BannerFilter::new().paginate(2, 0))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].banner_id, created[0]);
        assert_eq!(page[0].tag_ids, vec![1, 5]);

        let page = db
            .list_banners(&BannerFilter::new().paginate(2, 2))
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|b| b.banner_id).collect();
        assert_eq!(ids, vec![created[2], created[3]]);

        let page = db
            .list_banners(&BannerFilter {
                offset: 3,
                ..BannerFilter::new()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);

        assert!(matches!(
            db.list_banners(&BannerFilter::new().paginate(-1, 0)).await,
            Err(BannerError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_list_surfaces_untagged_banner() {
        let db = setup().await;

        let id = db
            .create_banner(&NewBanner::new(1, vec![1], json!({}), true))
            .await
            .unwrap();
        db.update_banner(id, &BannerPatch::new().feature_id(2).tag_ids(vec![]))
            .await
            .unwrap();

        let banners = db.list_banners(&BannerFilter::new().feature(2)).await.unwrap();
        assert_eq!(banners.len(), 1);
        assert!(banners[0].tag_ids.is_empty());
    }

    #[tokio::test]
    async fn test_list_treats_zero_as_unset() {
        let db = setup().await;

        let x = db
            .create_banner(&NewBanner::new(1, vec![1, 2], json!({"x": 1}), true))
            .await
            .unwrap();
        let y = db
            .create_banner(&NewBanner::new(1, vec![3], json!({"y": 1}), true))
            .await
            .unwrap();
        let z = db
            .create_banner(&NewBanner::new(2, vec![1], json!({"z": 1}), true))
            .await
            .unwrap();
        db.delete_banner(x).await.unwrap();

        let survivors = db
            .list_banners(&BannerFilter::new().feature(1).paginate(0, 0))
            .await
            .unwrap();
        let ids: Vec<i64> = survivors.iter().map(|b| b.banner_id).collect();
        assert_eq!(ids, vec![y]);
        assert_eq!(survivors[0].tag_ids, vec![3]);

        let all = db
            .list_banners(&BannerFilter::new().feature(0).tag(0).paginate(0, 0))
            .await
            .unwrap();
        let ids: Vec<i64> = all.iter().map(|b| b.banner_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&y) && ids.contains(&z));

        assert!(matches!(
            db.list_banners(&BannerFilter::new().tag(-1)).await,
            Err(BannerError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_register_references_is_idempotent() {
        let db = Database::in_memory().await.unwrap();

        db.register_references(Some(7), &[1, 2]).await.unwrap();
        db.register_references(Some(7), &[2, 3]).await.unwrap();

        assert_eq!(count(&db, "feature").await, 1);
        assert_eq!(count(&db, "tag").await, 3);
    }

    #[test]
    fn test_coalesce_rows_groups_by_first_seen() {
        let now = chrono::Utc::now();
        let row = |id: i64, tag_id: Option<i64>, content: &str| BannerRow {
            id,
            content: content.to_string(),
            is_active: true,
            feature_id: 1,
            created_at: now,
            updated_at: now,
            tag_id,
        };

        let banners = coalesce_rows(vec![
            row(2, Some(10), r#"{"x":1}"#),
            row(1, Some(11), r#"{"y":1}"#),
            row(2, Some(12), r#"{"ignored":true}"#),
            row(3, None, "[]"),
        ])
        .unwrap();

        assert_eq!(banners.len(), 3);
        assert_eq!(banners[0].banner_id, 2);
        assert_eq!(banners[0].tag_ids, vec![10, 12]);
        assert_eq!(banners[0].content, json!({"x": 1}));
        assert_eq!(banners[1].tag_ids, vec![11]);
        assert!(banners[2].tag_ids.is_empty());
    }
}
