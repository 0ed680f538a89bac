//! Catalog ↔ disk reconciliation for the media folder.
//!
//! Both directions diff the catalog against a single directory snapshot:
//! ghost records (rows whose file is gone) are deleted in one transaction,
//! and orphan files (files with no row) are handed to the processor for
//! import. Running ghosts-then-orphans converges catalog and disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::processor::MediaItemProcessor;
use crate::progress::ProgressSink;

pub struct SynchronizationService {
    catalog: Arc<dyn Catalog>,
    processor: Arc<MediaItemProcessor>,
}

impl SynchronizationService {
    pub fn new(catalog: Arc<dyn Catalog>, processor: Arc<MediaItemProcessor>) -> Self {
        Self { catalog, processor }
    }

    /// Remove catalog rows whose file no longer exists in `folder`.
    /// Returns the number of rows deleted.
    pub async fn delete_ghost_records(&self, folder: &Path) -> Result<u64> {
        let on_disk = snapshot_files(folder).await?;
        let catalogued = self
            .catalog
            .file_paths_for_folder(&folder.display().to_string())
            .await?;

        let ghosts: Vec<String> = catalogued
            .into_iter()
            .filter(|path| !on_disk.contains(Path::new(path)))
            .collect();
        if ghosts.is_empty() {
            return Ok(0);
        }

        let deleted = self.catalog.delete_many_by_paths(&ghosts).await?;
        info!("deleted {} ghost records from the catalog", deleted);
        Ok(deleted)
    }

    /// Import files present in `folder` but absent from the catalog.
    /// Returns the number of items persisted.
    pub async fn synchronize_orphan_files(
        &self,
        folder: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<usize> {
        let on_disk = snapshot_files(folder).await?;
        let catalogued: HashSet<String> = self
            .catalog
            .file_paths_for_folder(&folder.display().to_string())
            .await?
            .into_iter()
            .collect();

        let orphans: Vec<PathBuf> = on_disk
            .into_iter()
            .filter(|path| !catalogued.contains(&path.display().to_string()))
            .collect();
        if orphans.is_empty() {
            return Ok(0);
        }

        info!("found {} orphan files to synchronize", orphans.len());
        self.processor.process_orphan_files(&orphans, progress).await
    }

    /// Full reconciliation: ghosts first, then orphans, so a file that was
    /// replaced on disk ends up with exactly one fresh row.
    pub async fn synchronize(&self, folder: &Path, progress: &dyn ProgressSink) -> Result<usize> {
        self.delete_ghost_records(folder).await?;
        self.synchronize_orphan_files(folder, progress).await
    }
}

/// One snapshot of the folder's regular files. A missing folder is an empty
/// snapshot, not an error, so a misconfigured path cannot trigger a mass
/// ghost deletion of valid rows pointing elsewhere.
async fn snapshot_files(folder: &Path) -> Result<HashSet<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("media folder '{}' does not exist", folder.display());
            return Ok(HashSet::new());
        }
        Err(err) => return Err(err.into()),
    };

    let mut files = HashSet::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.insert(entry.path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    use cairn_model::{MediaItem, MediaType};

    use crate::catalog::SqliteCatalog;
    use crate::config::CoreConfig;
    use crate::fs_watch::PauseHandle;
    use crate::probe::{MediaProbe, MockMediaProbe};
    use crate::progress::NullProgress;
    use crate::thumbs::{MockVideoFrameExtractor, ThumbnailCache};

    async fn service_in(dir: &Path) -> (SynchronizationService, Arc<SqliteCatalog>) {
        let config = CoreConfig::with_data_dir(&dir.join("data"));
        let catalog = Arc::new(
            SqliteCatalog::connect(&config.catalog_db_path())
                .await
                .unwrap(),
        );

        let mut probe = MockMediaProbe::new();
        probe.expect_classify().returning(|path| {
            Ok(
                match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
                    "png" => MediaType::Image,
                    "mp4" => MediaType::Video,
                    _ => MediaType::Unknown,
                },
            )
        });
        probe.expect_duration_secs().returning(|_| Ok(60.0));
        probe.expect_dimensions().returning(|_, _| Ok(None));
        let probe: Arc<dyn MediaProbe> = Arc::new(probe);

        let mut extractor = MockVideoFrameExtractor::new();
        extractor.expect_extract_frame().returning(|_, _, dest| {
            image::RgbImage::new(8, 8).save(dest).expect("frame write");
            Ok(())
        });
        let thumbnails = Arc::new(ThumbnailCache::new(&config, Arc::clone(&probe), Arc::new(extractor)));

        let processor = Arc::new(MediaItemProcessor::new(
            Arc::clone(&catalog) as Arc<dyn Catalog>,
            probe,
            thumbnails,
            PauseHandle::default(),
        ));
        let service =
            SynchronizationService::new(Arc::clone(&catalog) as Arc<dyn Catalog>, processor);
        (service, catalog)
    }

    fn ghost_row(path: &Path) -> MediaItem {
        MediaItem::new(
            path.file_name().unwrap().to_string_lossy().into_owned(),
            path.display().to_string(),
            MediaType::Image,
        )
    }

    #[tokio::test]
    async fn ghost_rows_are_deleted_and_live_rows_survive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (service, catalog) = service_in(dir.path()).await;

        let media = dir.path().join("media");
        tokio::fs::create_dir_all(&media).await?;
        let alive = media.join("alive.png");
        image::RgbImage::new(8, 8).save(&alive)?;

        catalog.insert_media_item(&ghost_row(&alive)).await?;
        catalog
            .insert_media_item(&ghost_row(&media.join("ghost-one.png")))
            .await?;
        catalog
            .insert_media_item(&ghost_row(&media.join("ghost-two.png")))
            .await?;

        let deleted = service.delete_ghost_records(&media).await?;
        assert_eq!(deleted, 2);

        let folder = media.display().to_string();
        let remaining = catalog.file_paths_for_folder(&folder).await?;
        assert_eq!(remaining, vec![alive.display().to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn orphans_are_imported_and_catalogued_files_are_left_alone() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (service, catalog) = service_in(dir.path()).await;

        let media = dir.path().join("media");
        tokio::fs::create_dir_all(&media).await?;
        let known = media.join("known.png");
        let orphan = media.join("stray.png");
        image::RgbImage::new(8, 8).save(&known)?;
        image::RgbImage::new(16, 16).save(&orphan)?;

        catalog.insert_media_item(&ghost_row(&known)).await?;

        let imported = service
            .synchronize_orphan_files(&media, &NullProgress)
            .await?;
        assert_eq!(imported, 1);
        assert_eq!(
            catalog
                .item_count_for_folder(&media.display().to_string(), None)
                .await?,
            2
        );
        Ok(())
    }

    #[tokio::test]
    async fn full_synchronize_converges_catalog_to_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (service, catalog) = service_in(dir.path()).await;

        let media = dir.path().join("media");
        tokio::fs::create_dir_all(&media).await?;
        let fresh = media.join("fresh.png");
        image::RgbImage::new(8, 8).save(&fresh)?;
        catalog
            .insert_media_item(&ghost_row(&media.join("ghost.png")))
            .await?;

        service.synchronize(&media, &NullProgress).await?;

        let folder = media.display().to_string();
        let catalogued: HashSet<String> =
            catalog.file_paths_for_folder(&folder).await?.into_iter().collect();
        let on_disk: HashSet<String> = snapshot_files(&media)
            .await?
            .into_iter()
            .map(|p| p.display().to_string())
            .collect();
        assert_eq!(catalogued, on_disk);
        Ok(())
    }

    #[tokio::test]
    async fn missing_folder_is_an_empty_snapshot() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (service, catalog) = service_in(dir.path()).await;

        let elsewhere = dir.path().join("elsewhere");
        tokio::fs::create_dir_all(&elsewhere).await?;
        let row_path = elsewhere.join("kept.png");
        catalog.insert_media_item(&ghost_row(&row_path)).await?;

        // Folder path never created; its rows must not be treated as ghosts
        // of some other folder.
        let missing = dir.path().join("media");
        assert_eq!(service.delete_ghost_records(&missing).await?, 0);
        assert_eq!(
            service
                .synchronize_orphan_files(&missing, &NullProgress)
                .await?,
            0
        );
        Ok(())
    }

    #[tokio::test]
    async fn subdirectories_are_ignored_by_the_snapshot() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let media = dir.path().join("media");
        tokio::fs::create_dir_all(media.join("nested")).await?;
        let file = media.join("flat.png");
        tokio::fs::write(&file, b"png-ish").await?;

        let snapshot = snapshot_files(&media).await?;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&file));
        Ok(())
    }
}
