//! Preview thumbnail cache.
//!
//! Keyed by a hash of the lowercased source path; the existence of the cache
//! file *is* the record, there is no separate index. Every failure mode
//! returns `None` and logs — a missing thumbnail never blocks ingestion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cairn_model::MediaType;
use image::imageops::FilterType;
use tokio::process::Command;
use tokio::task::spawn_blocking;
use tracing::{error, info, warn};

use crate::addressing::cache_key;
use crate::config::CoreConfig;
use crate::error::{MediaError, Result};
use crate::probe::MediaProbe;

/// Seam for pulling one still frame out of a video file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoFrameExtractor: Send + Sync {
    /// Write the frame at `at_secs` into `dest` as an image file.
    async fn extract_frame(&self, source: &Path, at_secs: f64, dest: &Path) -> Result<()>;
}

/// Production extractor shelling out to `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    ffmpeg_path: String,
}

impl FfmpegFrameExtractor {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
        }
    }
}

#[async_trait]
impl VideoFrameExtractor for FfmpegFrameExtractor {
    async fn extract_frame(&self, source: &Path, at_secs: f64, dest: &Path) -> Result<()> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-y", "-v", "quiet", "-ss", &format!("{at_secs:.3}")])
            .arg("-i")
            .arg(source)
            .args(["-frames:v", "1"])
            .arg(dest)
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::InvalidMedia(format!(
                "frame extraction failed for '{}'",
                source.display()
            )));
        }
        Ok(())
    }
}

/// Produces and retrieves fixed-square preview images.
pub struct ThumbnailCache {
    cache_dir: PathBuf,
    edge: u32,
    probe: Arc<dyn MediaProbe>,
    extractor: Arc<dyn VideoFrameExtractor>,
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("cache_dir", &self.cache_dir)
            .field("edge", &self.edge)
            .finish()
    }
}

impl ThumbnailCache {
    pub fn new(
        config: &CoreConfig,
        probe: Arc<dyn MediaProbe>,
        extractor: Arc<dyn VideoFrameExtractor>,
    ) -> Self {
        Self {
            cache_dir: config.thumbnail_cache_dir(),
            edge: config.thumbnail_size,
            probe,
            extractor,
        }
    }

    /// Cache file location for a source path, whether or not it exists yet.
    pub fn cache_path_for(&self, source: &Path) -> PathBuf {
        self.cache_dir.join(format!("{}.jpg", cache_key(source)))
    }

    /// Produce (or fetch) the preview for `source`. A cache hit returns the
    /// existing artifact without any decode work. Returns `None` on any
    /// failure; thumbnails are best-effort by contract.
    pub async fn create_thumbnail(&self, source: &Path, media_type: MediaType) -> Option<PathBuf> {
        let cache_path = self.cache_path_for(source);
        if cache_path.exists() {
            info!("thumbnail cache hit for '{}'", source.display());
            return Some(cache_path);
        }

        match self.render_thumbnail(source, media_type, &cache_path).await {
            Ok(Some(path)) => {
                info!("created and cached thumbnail for '{}'", source.display());
                Some(path)
            }
            Ok(None) => None,
            Err(err) => {
                error!(
                    "failed to create thumbnail for '{}': {}",
                    source.display(),
                    err
                );
                None
            }
        }
    }

    async fn render_thumbnail(
        &self,
        source: &Path,
        media_type: MediaType,
        cache_path: &Path,
    ) -> Result<Option<PathBuf>> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let decode_source: PathBuf;
        // Held until the end of the call so extraction temp files always
        // disappear, even when decode or resize fails.
        let mut _temp_frame: Option<tempfile::TempPath> = None;

        match media_type {
            MediaType::Image | MediaType::Gif => {
                decode_source = source.to_path_buf();
            }
            MediaType::Video => {
                let duration = self.probe.duration_secs(source).await.unwrap_or(0.0);
                // 10% in: late enough to skip title cards, early enough to
                // stay clear of credits.
                let at_secs = duration / 10.0;

                let temp = tempfile::Builder::new()
                    .prefix("cairn-frame-")
                    .suffix(".png")
                    .tempfile()?
                    .into_temp_path();

                if let Err(err) = self.extractor.extract_frame(source, at_secs, &temp).await {
                    warn!(
                        "failed to extract frame from video '{}': {}",
                        source.display(),
                        err
                    );
                    return Ok(None);
                }

                decode_source = temp.to_path_buf();
                _temp_frame = Some(temp);
            }
            MediaType::Audio | MediaType::Unknown => return Ok(None),
        }

        let edge = self.edge;
        let target = cache_path.to_path_buf();
        spawn_blocking(move || -> Result<()> {
            let decoded = image::ImageReader::open(&decode_source)
                .map_err(MediaError::Io)?
                .with_guessed_format()
                .map_err(MediaError::Io)?
                .decode()
                .map_err(|err| MediaError::InvalidMedia(err.to_string()))?;

            // resize_to_fill scales then center-crops to the exact square.
            let thumb = decoded.resize_to_fill(edge, edge, FilterType::Lanczos3);
            thumb
                .to_rgb8()
                .save_with_format(&target, image::ImageFormat::Jpeg)
                .map_err(|err| MediaError::Internal(err.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|err| MediaError::Internal(format!("thumbnail task panicked: {err}")))??;

        Ok(Some(cache_path.to_path_buf()))
    }
}
