use std::path::Path;

use async_trait::async_trait;
use cairn_model::{MediaItem, MediaType};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::Result;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS media_items (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name      TEXT NOT NULL,
    file_path      TEXT NOT NULL UNIQUE,
    file_type      TEXT NOT NULL,
    tags           TEXT,
    duration_secs  REAL NOT NULL DEFAULT 0,
    thumbnail_path TEXT,
    width          INTEGER,
    height         INTEGER,
    added_at       TEXT NOT NULL
)";

/// Repository over the single local SQLite database file.
#[derive(Clone, Debug)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MediaItemRow {
    id: i64,
    file_name: String,
    file_path: String,
    file_type: String,
    tags: Option<String>,
    duration_secs: f64,
    thumbnail_path: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    added_at: DateTime<Utc>,
}

impl From<MediaItemRow> for MediaItem {
    fn from(row: MediaItemRow) -> Self {
        MediaItem {
            id: row.id,
            file_name: row.file_name,
            file_path: row.file_path,
            file_type: MediaType::from_str_lossy(&row.file_type),
            tags: row.tags,
            duration_secs: row.duration_secs,
            thumbnail_path: row.thumbnail_path,
            width: row.width.map(|w| w as u32),
            height: row.height.map(|h| h as u32),
            added_at: row.added_at,
        }
    }
}

impl SqliteCatalog {
    /// Open (creating if missing) the catalog database at `db_path`.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        info!("catalog database ready at '{}'", db_path.display());

        Ok(Self { pool })
    }

    fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Prefix used for folder-scoped path matching.
    fn folder_prefix(folder: &str) -> String {
        let sep = std::path::MAIN_SEPARATOR;
        if folder.ends_with(sep) {
            folder.to_string()
        } else {
            format!("{folder}{sep}")
        }
    }

    fn folder_filter_query<'a>(
        select: &str,
        folder: &'a str,
        filter: Option<&'a str>,
    ) -> QueryBuilder<'a, sqlx::Sqlite> {
        let mut builder = QueryBuilder::new(select);
        builder.push(" WHERE file_path LIKE ");
        builder.push_bind(format!("{}%", Self::folder_prefix(folder)));

        if let Some(filter) = filter {
            for term in filter.split_whitespace() {
                builder.push(" AND tags LIKE ");
                builder.push_bind(format!("%{term}%"));
            }
        }

        builder
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn insert_media_item(&self, item: &MediaItem) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO media_items \
             (file_name, file_path, file_type, tags, duration_secs, thumbnail_path, width, height, added_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.file_name)
        .bind(&item.file_path)
        .bind(item.file_type.as_str())
        .bind(&item.tags)
        .bind(item.duration_secs)
        .bind(&item.thumbnail_path)
        .bind(item.width.map(|w| w as i64))
        .bind(item.height.map(|h| h as i64))
        .bind(item.added_at)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                "media item with path '{}' already exists, skipping",
                item.file_path
            );
            return Ok(false);
        }
        Ok(true)
    }

    async fn update_media_item(&self, item: &MediaItem) -> Result<()> {
        sqlx::query(
            "UPDATE media_items SET file_name = ?, file_type = ?, tags = ?, duration_secs = ?, \
             thumbnail_path = ?, width = ?, height = ? WHERE file_path = ?",
        )
        .bind(&item.file_name)
        .bind(item.file_type.as_str())
        .bind(&item.tags)
        .bind(item.duration_secs)
        .bind(&item.thumbnail_path)
        .bind(item.width.map(|w| w as i64))
        .bind(item.height.map(|h| h as i64))
        .bind(&item.file_path)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_by_path(&self, path: &str) -> Result<Option<MediaItem>> {
        let row = sqlx::query_as::<_, MediaItemRow>(
            "SELECT * FROM media_items WHERE file_path = ?",
        )
        .bind(path)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(MediaItem::from))
    }

    async fn delete_by_path(&self, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM media_items WHERE file_path = ?")
            .bind(path)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn delete_many_by_paths(&self, paths: &[String]) -> Result<u64> {
        let mut tx = self.pool().begin().await?;
        let mut deleted = 0u64;
        for path in paths {
            let result = sqlx::query("DELETE FROM media_items WHERE file_path = ?")
                .bind(path)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;

        info!("deleted {} catalog rows in one transaction", deleted);
        Ok(deleted)
    }

    async fn items_for_folder<'a>(
        &self,
        folder: &str,
        page: u32,
        page_size: u32,
        filter: Option<&'a str>,
    ) -> Result<Vec<MediaItem>> {
        let page = page.max(1);
        let mut builder =
            Self::folder_filter_query("SELECT * FROM media_items", folder, filter);
        builder.push(" ORDER BY id LIMIT ");
        builder.push_bind(page_size as i64);
        builder.push(" OFFSET ");
        builder.push_bind(((page - 1) * page_size) as i64);

        let rows = builder
            .build_query_as::<MediaItemRow>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(MediaItem::from).collect())
    }

    async fn item_count_for_folder<'a>(
        &self,
        folder: &str,
        filter: Option<&'a str>,
    ) -> Result<i64> {
        let mut builder =
            Self::folder_filter_query("SELECT COUNT(*) FROM media_items", folder, filter);
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    async fn file_paths_for_folder(&self, folder: &str) -> Result<Vec<String>> {
        let paths: Vec<String> =
            sqlx::query_scalar("SELECT file_path FROM media_items WHERE file_path LIKE ?")
                .bind(format!("{}%", Self::folder_prefix(folder)))
                .fetch_all(self.pool())
                .await?;
        Ok(paths)
    }

    async fn update_file_path(&self, old_path: &str, new_path: &str) -> Result<()> {
        sqlx::query("UPDATE media_items SET file_path = ? WHERE file_path = ?")
            .bind(new_path)
            .bind(old_path)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_catalog() -> (tempfile::TempDir, SqliteCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = SqliteCatalog::connect(&dir.path().join("test.db"))
            .await
            .unwrap();
        (dir, catalog)
    }

    fn item(path: &str) -> MediaItem {
        let name = Path::new(path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        MediaItem::new(name, path.to_string(), MediaType::Image)
    }

    #[tokio::test]
    async fn duplicate_path_insert_is_a_skip() -> anyhow::Result<()> {
        let (_dir, catalog) = temp_catalog().await;

        assert!(catalog.insert_media_item(&item("/media/a.png")).await?);
        assert!(!catalog.insert_media_item(&item("/media/a.png")).await?);
        assert_eq!(catalog.item_count_for_folder("/media", None).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn folder_scoping_uses_path_prefix() -> anyhow::Result<()> {
        let (_dir, catalog) = temp_catalog().await;

        catalog.insert_media_item(&item("/media/a.png")).await?;
        catalog.insert_media_item(&item("/other/b.png")).await?;

        let paths = catalog.file_paths_for_folder("/media").await?;
        assert_eq!(paths, vec!["/media/a.png".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn batch_delete_removes_exactly_the_given_paths() -> anyhow::Result<()> {
        let (_dir, catalog) = temp_catalog().await;

        catalog.insert_media_item(&item("/media/a.png")).await?;
        catalog.insert_media_item(&item("/media/b.png")).await?;
        catalog.insert_media_item(&item("/media/c.png")).await?;

        let deleted = catalog
            .delete_many_by_paths(&["/media/a.png".into(), "/media/c.png".into()])
            .await?;
        assert_eq!(deleted, 2);
        assert_eq!(
            catalog.file_paths_for_folder("/media").await?,
            vec!["/media/b.png".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn tag_filter_requires_every_term() -> anyhow::Result<()> {
        let (_dir, catalog) = temp_catalog().await;

        let mut tagged = item("/media/beach.png");
        tagged.tags = Some("summer beach holiday".to_string());
        catalog.insert_media_item(&tagged).await?;

        let mut other = item("/media/city.png");
        other.tags = Some("summer city".to_string());
        catalog.insert_media_item(&other).await?;

        let hits = catalog
            .items_for_folder("/media", 1, 10, Some("summer beach"))
            .await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "/media/beach.png");

        assert_eq!(
            catalog
                .item_count_for_folder("/media", Some("summer"))
                .await?,
            2
        );
        Ok(())
    }

    #[tokio::test]
    async fn pagination_is_one_based_and_ordered() -> anyhow::Result<()> {
        let (_dir, catalog) = temp_catalog().await;

        for n in 0..5 {
            catalog
                .insert_media_item(&item(&format!("/media/{n}.png")))
                .await?;
        }

        let first = catalog.items_for_folder("/media", 1, 2, None).await?;
        let second = catalog.items_for_folder("/media", 2, 2, None).await?;
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_ne!(first[0].file_path, second[0].file_path);
        Ok(())
    }

    #[tokio::test]
    async fn rename_rekeys_the_row() -> anyhow::Result<()> {
        let (_dir, catalog) = temp_catalog().await;

        catalog.insert_media_item(&item("/media/old.png")).await?;
        catalog
            .update_file_path("/media/old.png", "/media/new.png")
            .await?;

        assert!(catalog.get_by_path("/media/old.png").await?.is_none());
        let renamed = catalog.get_by_path("/media/new.png").await?.unwrap();
        assert_eq!(renamed.file_name, "old.png");
        Ok(())
    }
}
