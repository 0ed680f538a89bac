//! Playback-compatible transcode cache.
//!
//! Same path-hash key scheme as the thumbnail cache, with the same staleness
//! trade-off: keys derive from the canonical (post-rename) path, so entries
//! created before ingestion normalized a file's name are simply never looked
//! up again. Transcoding is the only cancellable operation in the pipeline;
//! cancellation must stop the encoder process itself and surfaces as the
//! distinct [`MediaError::Cancelled`], with partial-output cleanup left to
//! the caller.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::addressing::cache_key;
use crate::config::CoreConfig;
use crate::error::{MediaError, Result};
use crate::probe::MediaProbe;

/// Seam over the external encoder.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoTranscoder: Send + Sync {
    /// Re-encode `input` into `output` with the configured codec pair,
    /// honoring mid-run cancellation.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        token: CancellationToken,
    ) -> Result<()>;
}

/// Production transcoder driving an `ffmpeg` child process.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    video_codec: String,
    audio_codec: String,
}

impl FfmpegTranscoder {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            video_codec: config.target_video_codec.clone(),
            audio_codec: config.target_audio_codec.clone(),
        }
    }
}

#[async_trait]
impl VideoTranscoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        token: CancellationToken,
    ) -> Result<()> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-y", "-v", "error"])
            .arg("-i")
            .arg(input)
            .args(["-c:v", &self.video_codec, "-c:a", &self.audio_codec])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if !status.success() {
                    return Err(MediaError::InvalidMedia(format!(
                        "ffmpeg exited with {} for '{}'",
                        status,
                        input.display()
                    )));
                }
                Ok(())
            }
            _ = token.cancelled() => {
                // Stop the encoder itself, not just our await on it.
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(MediaError::Cancelled(format!(
                    "transcode of '{}' cancelled",
                    input.display()
                )))
            }
        }
    }
}

/// Produces and retrieves playback-compatible video copies.
pub struct TranscodeCache {
    cache_dir: PathBuf,
    compatible_codec: String,
    probe: Arc<dyn MediaProbe>,
    transcoder: Arc<dyn VideoTranscoder>,
}

impl std::fmt::Debug for TranscodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeCache")
            .field("cache_dir", &self.cache_dir)
            .field("compatible_codec", &self.compatible_codec)
            .finish()
    }
}

impl TranscodeCache {
    pub fn new(
        config: &CoreConfig,
        probe: Arc<dyn MediaProbe>,
        transcoder: Arc<dyn VideoTranscoder>,
    ) -> Self {
        Self {
            cache_dir: config.transcode_cache_dir(),
            compatible_codec: config.compatible_video_codec.clone(),
            probe,
            transcoder,
        }
    }

    pub fn cache_path_for(&self, source: &Path) -> PathBuf {
        self.cache_dir.join(format!("{}.mp4", cache_key(source)))
    }

    /// Whether playing `path` would need the encoder. Probe failures assume
    /// no transcoding, matching the playback fallback of
    /// [`TranscodeCache::ensure_playable`].
    pub async fn is_transcoding_required(&self, path: &Path) -> bool {
        match self.probe.primary_video_codec(path).await {
            Ok(Some(codec)) if codec == self.compatible_codec => false,
            Ok(_) => !self.cache_path_for(path).exists(),
            Err(err) => {
                error!(
                    "failed to determine if transcoding is required for '{}': {}. Assuming not.",
                    path.display(),
                    err
                );
                false
            }
        }
    }

    /// Resolve a path the player can open directly.
    ///
    /// Compatible codec: the original path, zero-copy. Cache hit: the cached
    /// copy. Otherwise the encoder runs to the hash-derived cache path.
    /// Cancellation propagates distinctly; any other failure falls back to
    /// the original (possibly unplayable) path.
    pub async fn ensure_playable(
        &self,
        path: &Path,
        token: CancellationToken,
    ) -> Result<PathBuf> {
        let codec = match self.probe.primary_video_codec(path).await {
            Ok(codec) => codec,
            Err(err) => {
                error!(
                    "failed to probe '{}' before transcoding: {}. Returning original.",
                    path.display(),
                    err
                );
                return Ok(path.to_path_buf());
            }
        };

        if codec.as_deref() == Some(self.compatible_codec.as_str()) {
            info!(
                "video '{}' is already in a compatible format, playing directly",
                path.display()
            );
            return Ok(path.to_path_buf());
        }

        let cache_path = self.cache_path_for(path);
        if cache_path.exists() {
            info!("found transcoded copy in cache for '{}'", path.display());
            return Ok(cache_path);
        }

        info!(
            "video '{}' has an incompatible codec ({:?}), starting transcode",
            path.display(),
            codec
        );
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        match self
            .transcoder
            .transcode(path, &cache_path, token)
            .await
        {
            Ok(()) => {
                info!("transcoded '{}' into cache", path.display());
                Ok(cache_path)
            }
            Err(err @ MediaError::Cancelled(_)) => Err(err),
            Err(err) => {
                error!(
                    "failed to transcode '{}': {}. Returning original as fallback.",
                    path.display(),
                    err
                );
                Ok(path.to_path_buf())
            }
        }
    }

    /// Best-effort removal of the whole cache directory.
    pub async fn clear_cache(&self) {
        match tokio::fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => info!("cleared transcode cache"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("failed to clear transcode cache: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MockMediaProbe;

    fn probe_with_codec(codec: &'static str) -> MockMediaProbe {
        let mut probe = MockMediaProbe::new();
        probe
            .expect_primary_video_codec()
            .returning(move |_| Ok(Some(codec.to_string())));
        probe
    }

    #[tokio::test]
    async fn compatible_codec_never_invokes_the_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::with_data_dir(dir.path());

        let mut transcoder = MockVideoTranscoder::new();
        transcoder.expect_transcode().times(0);

        let cache = TranscodeCache::new(
            &config,
            Arc::new(probe_with_codec("h264")),
            Arc::new(transcoder),
        );

        let source = dir.path().join("movie.mp4");
        assert!(!cache.is_transcoding_required(&source).await);
        let playable = cache
            .ensure_playable(&source, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(playable, source);
    }

    #[tokio::test]
    async fn incompatible_codec_is_transcoded_into_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::with_data_dir(dir.path());

        let mut transcoder = MockVideoTranscoder::new();
        transcoder
            .expect_transcode()
            .times(1)
            .returning(|_, output, _| {
                std::fs::write(output, b"encoded").unwrap();
                Ok(())
            });

        let cache = TranscodeCache::new(
            &config,
            Arc::new(probe_with_codec("mpeg4")),
            Arc::new(transcoder),
        );

        let source = dir.path().join("old.avi");
        assert!(cache.is_transcoding_required(&source).await);

        let playable = cache
            .ensure_playable(&source, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(playable, cache.cache_path_for(&source));
        assert!(playable.exists());

        // With the cache populated no further work is required.
        assert!(!cache.is_transcoding_required(&source).await);
        let again = cache
            .ensure_playable(&source, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(again, playable);
    }

    #[tokio::test]
    async fn encoder_failure_falls_back_to_the_original_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::with_data_dir(dir.path());

        let mut transcoder = MockVideoTranscoder::new();
        transcoder
            .expect_transcode()
            .returning(|_, _, _| Err(MediaError::InvalidMedia("boom".into())));

        let cache = TranscodeCache::new(
            &config,
            Arc::new(probe_with_codec("vp9")),
            Arc::new(transcoder),
        );

        let source = dir.path().join("clip.webm");
        let playable = cache
            .ensure_playable(&source, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(playable, source);
    }

    /// Encoder stand-in that writes a partial file and then blocks until
    /// cancelled, like a real mid-run ffmpeg.
    struct BlockingTranscoder;

    #[async_trait]
    impl VideoTranscoder for BlockingTranscoder {
        async fn transcode(
            &self,
            _input: &Path,
            output: &Path,
            token: CancellationToken,
        ) -> Result<()> {
            tokio::fs::write(output, b"partial").await?;
            token.cancelled().await;
            Err(MediaError::Cancelled("encoder stopped".to_string()))
        }
    }

    #[tokio::test]
    async fn cancellation_propagates_distinctly_and_leaves_partial_for_caller() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::with_data_dir(dir.path());

        let cache = Arc::new(TranscodeCache::new(
            &config,
            Arc::new(probe_with_codec("hevc")),
            Arc::new(BlockingTranscoder),
        ));

        let source = dir.path().join("feature.mkv");
        let token = CancellationToken::new();

        let task = tokio::spawn({
            let cache = Arc::clone(&cache);
            let source = source.clone();
            let token = token.clone();
            async move { cache.ensure_playable(&source, token).await }
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(MediaError::Cancelled(_))));

        // The partial output is the caller's to clean up.
        let partial = cache.cache_path_for(&source);
        assert!(partial.exists());
        tokio::fs::remove_file(&partial).await.unwrap();
    }

    #[tokio::test]
    async fn clear_cache_is_best_effort_and_silent_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::with_data_dir(dir.path());
        let cache = TranscodeCache::new(
            &config,
            Arc::new(MockMediaProbe::new()),
            Arc::new(MockVideoTranscoder::new()),
        );

        // Nothing there yet: still fine.
        cache.clear_cache().await;

        tokio::fs::create_dir_all(config.transcode_cache_dir())
            .await
            .unwrap();
        tokio::fs::write(config.transcode_cache_dir().join("x.mp4"), b"data")
            .await
            .unwrap();
        cache.clear_cache().await;
        assert!(!config.transcode_cache_dir().exists());
    }
}
