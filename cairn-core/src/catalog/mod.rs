//! Catalog persistence.
//!
//! [`Catalog`] is the trait seam the pipeline consumes; [`SqliteCatalog`] is
//! the pool-backed repository over the single local database file.

use async_trait::async_trait;
use cairn_model::MediaItem;

use crate::error::Result;

mod sqlite;

pub use sqlite::SqliteCatalog;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Insert keyed by `file_path`. Returns `false` when a row for that path
    /// already exists; the existing row is never overwritten.
    async fn insert_media_item(&self, item: &MediaItem) -> Result<bool>;

    async fn update_media_item(&self, item: &MediaItem) -> Result<()>;

    async fn get_by_path(&self, path: &str) -> Result<Option<MediaItem>>;

    async fn delete_by_path(&self, path: &str) -> Result<()>;

    /// Batch ghost cleanup; all deletions commit in one transaction.
    async fn delete_many_by_paths(&self, paths: &[String]) -> Result<u64>;

    /// Paginated folder query. `page` is 1-based; `filter` is whitespace
    /// separated tag terms, all of which must match.
    async fn items_for_folder<'a>(
        &self,
        folder: &str,
        page: u32,
        page_size: u32,
        filter: Option<&'a str>,
    ) -> Result<Vec<MediaItem>>;

    async fn item_count_for_folder<'a>(
        &self,
        folder: &str,
        filter: Option<&'a str>,
    ) -> Result<i64>;

    /// Every catalogued path under the folder, for reconciliation diffs.
    async fn file_paths_for_folder(&self, folder: &str) -> Result<Vec<String>>;

    /// Re-key a row after an external rename.
    async fn update_file_path(&self, old_path: &str, new_path: &str) -> Result<()>;
}
