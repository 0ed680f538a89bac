//! Single-file and batch ingestion orchestration.
//!
//! `MediaItemProcessor` drives classify → probe → thumbnail → persist for one
//! file and the three batch entry points built on top of it (uploads, orphan
//! sync, watcher hits). The central resilience contract lives here: per-file
//! failures are caught at the file boundary and never abort the remaining
//! batch, while infrastructure failures (catalog unreachable) surface to the
//! caller. Every bulk entry point holds a watcher pause guard for its whole
//! duration so the folder watcher never reacts to the pipeline's own writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_model::{MediaItem, MediaType};
use tracing::{error, info, warn};

use crate::addressing::canonical_file_name;
use crate::catalog::Catalog;
use crate::error::{MediaError, Result};
use crate::fs_watch::PauseHandle;
use crate::probe::MediaProbe;
use crate::progress::ProgressSink;
use crate::thumbs::ThumbnailCache;

/// Thumbnail reference stored for audio rows instead of a cache artifact.
/// The UI resolves it to a bundled placeholder image.
pub const AUDIO_THUMBNAIL_PLACEHOLDER: &str = "builtin://audio-placeholder.jpg";

const REPAIR_PAGE_SIZE: u32 = 500;

pub struct MediaItemProcessor {
    catalog: Arc<dyn Catalog>,
    probe: Arc<dyn MediaProbe>,
    thumbnails: Arc<ThumbnailCache>,
    watcher_pause: PauseHandle,
}

impl std::fmt::Debug for MediaItemProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaItemProcessor").finish_non_exhaustive()
    }
}

impl MediaItemProcessor {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        probe: Arc<dyn MediaProbe>,
        thumbnails: Arc<ThumbnailCache>,
        watcher_pause: PauseHandle,
    ) -> Self {
        Self {
            catalog,
            probe,
            thumbnails,
            watcher_pause,
        }
    }

    /// Ingest one file already sitting at its final path.
    ///
    /// `original_path` supplies the display name (the name the file had
    /// before canonical renaming). `hinted_type` pins the classification;
    /// without it the file is re-classified. Returns `None` for anything
    /// skipped — unidentifiable files and duplicate paths — which batch
    /// callers treat as continue, never abort.
    pub async fn process_new_file(
        &self,
        original_path: &Path,
        final_path: &Path,
        hinted_type: Option<MediaType>,
    ) -> Result<Option<MediaItem>> {
        let media_type = match hinted_type {
            Some(pinned) => pinned,
            None => self.probe.classify(final_path).await?,
        };
        if media_type == MediaType::Unknown {
            info!(
                "skipping unsupported file type for '{}'",
                final_path.display()
            );
            return Ok(None);
        }

        let duration_secs = match media_type {
            MediaType::Video | MediaType::Audio => {
                match self.probe.duration_secs(final_path).await {
                    Ok(duration) => duration,
                    Err(err) => {
                        // The repair pass fills this in later.
                        warn!(
                            "failed to probe duration for '{}': {}",
                            final_path.display(),
                            err
                        );
                        0.0
                    }
                }
            }
            MediaType::Image | MediaType::Gif | MediaType::Unknown => 0.0,
        };

        let thumbnail_path = match media_type {
            MediaType::Audio => Some(AUDIO_THUMBNAIL_PLACEHOLDER.to_string()),
            _ => self
                .thumbnails
                .create_thumbnail(final_path, media_type)
                .await
                .map(|path| path.display().to_string()),
        };

        let file_name = original_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut item = MediaItem::new(
            file_name,
            final_path.display().to_string(),
            media_type,
        );
        item.duration_secs = duration_secs;
        item.thumbnail_path = thumbnail_path;

        if !self.catalog.insert_media_item(&item).await? {
            return Ok(None);
        }

        info!("processed and saved new media item '{}'", item.file_name);
        Ok(Some(item))
    }

    /// Copy external files into the media folder under content-hash names
    /// and catalog them. Identical content collapses onto one stored file;
    /// the duplicate is a reported skip, not an error. Returns the number of
    /// items actually persisted.
    pub async fn process_uploaded_files(
        &self,
        sources: &[PathBuf],
        dest_folder: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<usize> {
        // Watcher stays paused until this guard drops, on every exit path.
        let _guard = self.watcher_pause.pause();

        let total = sources.len();
        let mut persisted = 0usize;

        for (index, source) in sources.iter().enumerate() {
            match self.ingest_upload(source, dest_folder, progress).await {
                Ok(Some(_)) => persisted += 1,
                Ok(None) => {}
                Err(err @ MediaError::Database(_)) => return Err(err),
                Err(err) => {
                    error!("failed to upload '{}': {}", source.display(), err);
                }
            }
            progress.report_detail("Uploading files", &format!("{} of {}", index + 1, total));
        }

        Ok(persisted)
    }

    async fn ingest_upload(
        &self,
        source: &Path,
        dest_folder: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<Option<MediaItem>> {
        let canonical_name = canonical_file_name(source).await?;
        let dest = dest_folder.join(&canonical_name);

        if dest.exists() {
            info!(
                "'{}' already present as '{}', skipping copy",
                source.display(),
                dest.display()
            );
            let display_name = source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            progress.report(&format!("'{display_name}' already in media folder, skipped"));
            return Ok(None);
        }

        tokio::fs::copy(source, &dest).await?;
        self.process_new_file(source, &dest, None).await
    }

    /// Normalize orphan files to the canonical content-hash name, then
    /// catalog them. Renaming comes first so both caches key off the
    /// canonical path and no file is ever imported twice under two names.
    pub async fn process_orphan_files(
        &self,
        orphans: &[PathBuf],
        progress: &dyn ProgressSink,
    ) -> Result<usize> {
        let _guard = self.watcher_pause.pause();

        let total = orphans.len();
        let mut persisted = 0usize;

        for (index, orphan) in orphans.iter().enumerate() {
            match self.ingest_orphan(orphan).await {
                Ok(Some(_)) => persisted += 1,
                Ok(None) => {}
                Err(err @ MediaError::Database(_)) => return Err(err),
                Err(err) => {
                    error!("failed to import orphan '{}': {}", orphan.display(), err);
                }
            }
            progress.report_detail(
                "Synchronizing orphan files",
                &format!("{} of {}", index + 1, total),
            );
        }

        Ok(persisted)
    }

    async fn ingest_orphan(&self, orphan: &Path) -> Result<Option<MediaItem>> {
        let canonical_name = canonical_file_name(orphan).await?;
        let canonical_path = orphan.with_file_name(&canonical_name);

        if canonical_path != orphan {
            if canonical_path.exists() {
                warn!(
                    "orphan '{}' duplicates already-stored content, leaving in place",
                    orphan.display()
                );
                return Ok(None);
            }
            tokio::fs::rename(orphan, &canonical_path).await?;
        }

        self.process_new_file(orphan, &canonical_path, None).await
    }

    /// Explicit repair pass over the folder's rows: re-probe missing
    /// durations, regenerate missing or stale thumbnails, and lazily fill
    /// pixel dimensions. Per-item failures are logged and skipped. Returns
    /// the number of rows updated.
    pub async fn repair_catalog(&self, folder: &str) -> Result<usize> {
        let mut repaired = 0usize;
        let mut page = 1u32;

        loop {
            let items = self
                .catalog
                .items_for_folder(folder, page, REPAIR_PAGE_SIZE, None)
                .await?;
            if items.is_empty() {
                break;
            }

            for item in items {
                match self.repair_item(item).await {
                    Ok(true) => repaired += 1,
                    Ok(false) => {}
                    Err(err @ MediaError::Database(_)) => return Err(err),
                    Err(err) => warn!("repair pass skipped an item: {}", err),
                }
            }
            page += 1;
        }

        if repaired > 0 {
            info!("repair pass updated {} catalog rows", repaired);
        }
        Ok(repaired)
    }

    async fn repair_item(&self, mut item: MediaItem) -> Result<bool> {
        let path = PathBuf::from(&item.file_path);
        let mut changed = false;

        if item.file_type == MediaType::Video && item.duration_secs == 0.0 {
            if let Ok(duration) = self.probe.duration_secs(&path).await {
                if duration > 0.0 {
                    item.duration_secs = duration;
                    changed = true;
                }
            }
        }

        if item.file_type != MediaType::Audio && thumbnail_is_stale(&item) {
            if let Some(thumb) = self
                .thumbnails
                .create_thumbnail(&path, item.file_type)
                .await
            {
                item.thumbnail_path = Some(thumb.display().to_string());
                changed = true;
            }
        }

        if item.width.is_none() || item.height.is_none() {
            if let Ok(Some((width, height))) =
                self.probe.dimensions(&path, item.file_type).await
            {
                item.width = Some(width);
                item.height = Some(height);
                changed = true;
            }
        }

        if changed {
            self.catalog.update_media_item(&item).await?;
        }
        Ok(changed)
    }

    /// Remove a catalogued file and its thumbnail artifact from disk, then
    /// the catalog row. Disk failures surface; the row only goes away once
    /// disk state is clean.
    pub async fn delete_media_file(&self, item: &MediaItem) -> Result<()> {
        let media_path = PathBuf::from(&item.file_path);
        if media_path.exists() {
            tokio::fs::remove_file(&media_path).await?;
            info!("deleted media file '{}'", media_path.display());
        }

        if let Some(thumb) = &item.thumbnail_path {
            if !thumb.starts_with("builtin://") {
                let thumb_path = PathBuf::from(thumb);
                if thumb_path.exists() {
                    tokio::fs::remove_file(&thumb_path).await?;
                    info!("deleted thumbnail '{}'", thumb_path.display());
                }
            }
        }

        self.catalog.delete_by_path(&item.file_path).await?;
        Ok(())
    }
}

/// A stored thumbnail reference is stale unless it still resolves to an
/// existing file; bundled placeholder references are always valid.
fn thumbnail_is_stale(item: &MediaItem) -> bool {
    match &item.thumbnail_path {
        None => true,
        Some(reference) if reference.starts_with("builtin://") => false,
        Some(reference) => !Path::new(reference).exists(),
    }
}
