use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use cairn_model::MediaType;
use tokio::process::Command;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::{MediaError, Result};
use crate::probe::{wait_until_ready, MediaProbe};

const GIF_EXTENSION: &str = "gif";

/// Production probe: `image` crate for still formats, `ffprobe` for streams.
#[derive(Debug, Clone)]
pub struct FfprobeMediaProbe {
    ffprobe_path: String,
    ready_timeout: Duration,
    ready_poll: Duration,
}

impl FfprobeMediaProbe {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            ffprobe_path: config.ffprobe_path.clone(),
            ready_timeout: Duration::from_millis(config.file_ready_timeout_ms),
            ready_poll: Duration::from_millis(config.file_ready_poll_ms),
        }
    }

    /// Raw `ffprobe` JSON for streams and container format.
    async fn analyse(&self, path: &Path) -> Result<serde_json::Value> {
        let path_arg = path
            .to_str()
            .ok_or_else(|| MediaError::InvalidMedia("non-UTF8 file path".to_string()))?;

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
                path_arg,
            ])
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::InvalidMedia(format!(
                "ffprobe failed for '{}'",
                path.display()
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    fn stream_of_type<'a>(
        analysis: &'a serde_json::Value,
        codec_type: &str,
    ) -> Option<&'a serde_json::Value> {
        analysis["streams"]
            .as_array()?
            .iter()
            .find(|stream| stream["codec_type"].as_str() == Some(codec_type))
    }

    async fn identify_image(path: &Path) -> Option<(u32, u32)> {
        let path = PathBuf::from(path);
        spawn_blocking(move || {
            image::ImageReader::open(&path)
                .ok()?
                .with_guessed_format()
                .ok()?
                .into_dimensions()
                .ok()
        })
        .await
        .ok()
        .flatten()
    }
}

#[async_trait]
impl MediaProbe for FfprobeMediaProbe {
    async fn classify(&self, path: &Path) -> Result<MediaType> {
        if !wait_until_ready(path, self.ready_timeout, self.ready_poll).await {
            warn!(
                "file '{}' was not ready within {:?}, skipping for now",
                path.display(),
                self.ready_timeout
            );
            return Ok(MediaType::Unknown);
        }

        // GIFs probe as single-stream video, so the extension check comes first.
        let is_gif = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(GIF_EXTENSION));
        if is_gif {
            info!("identified '{}' as gif", path.display());
            return Ok(MediaType::Gif);
        }

        if Self::identify_image(path).await.is_some() {
            info!("identified '{}' as image", path.display());
            return Ok(MediaType::Image);
        }

        match self.analyse(path).await {
            Ok(analysis) => {
                if Self::stream_of_type(&analysis, "video").is_some() {
                    info!("identified '{}' as video", path.display());
                    return Ok(MediaType::Video);
                }
                if Self::stream_of_type(&analysis, "audio").is_some() {
                    info!("identified '{}' as audio", path.display());
                    return Ok(MediaType::Audio);
                }
            }
            Err(err) => {
                debug!("ffprobe could not analyse '{}': {}", path.display(), err);
            }
        }

        warn!("could not identify '{}', skipping", path.display());
        Ok(MediaType::Unknown)
    }

    async fn duration_secs(&self, path: &Path) -> Result<f64> {
        let analysis = self.analyse(path).await?;
        let duration = analysis["format"]["duration"]
            .as_str()
            .and_then(|raw| raw.parse::<f64>().ok())
            .unwrap_or(0.0);
        Ok(duration)
    }

    async fn primary_video_codec(&self, path: &Path) -> Result<Option<String>> {
        let analysis = self.analyse(path).await?;
        Ok(Self::stream_of_type(&analysis, "video")
            .and_then(|stream| stream["codec_name"].as_str())
            .map(str::to_string))
    }

    async fn dimensions(&self, path: &Path, media_type: MediaType) -> Result<Option<(u32, u32)>> {
        match media_type {
            MediaType::Image | MediaType::Gif => Ok(Self::identify_image(path).await),
            MediaType::Video => {
                let analysis = self.analyse(path).await?;
                let stream = Self::stream_of_type(&analysis, "video");
                let width = stream.and_then(|s| s["width"].as_u64());
                let height = stream.and_then(|s| s["height"].as_u64());
                match (width, height) {
                    (Some(w), Some(h)) => Ok(Some((w as u32, h as u32))),
                    _ => Ok(None),
                }
            }
            MediaType::Audio | MediaType::Unknown => Ok(None),
        }
    }
}
