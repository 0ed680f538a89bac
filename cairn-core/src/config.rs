use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Tunables for the ingestion pipeline and both artifact caches.
///
/// All fields carry defaults so embedders can supply a partial payload and
/// pick up new knobs without a config migration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application data directory; the catalog database and both caches live
    /// underneath it, independent of the watched media folder.
    pub data_dir: PathBuf,
    /// Binary invoked for stream probing.
    pub ffprobe_path: String,
    /// Binary invoked for frame extraction and transcoding.
    pub ffmpeg_path: String,
    /// Quiet period after the last raw filesystem event before a batch flush.
    pub debounce_window_ms: u64,
    /// Edge length of the square preview thumbnails, in pixels.
    pub thumbnail_size: u32,
    /// The single video codec treated as directly playable.
    pub compatible_video_codec: String,
    /// Encoder codec pair targeted when transcoding is required.
    pub target_video_codec: String,
    pub target_audio_codec: String,
    /// How long to poll a possibly mid-write file before giving up on it.
    pub file_ready_timeout_ms: u64,
    pub file_ready_poll_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("cairn-data"),
            ffprobe_path: "ffprobe".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            debounce_window_ms: 2_000,
            thumbnail_size: 250,
            compatible_video_codec: "h264".to_string(),
            target_video_codec: "libx264".to_string(),
            target_audio_codec: "aac".to_string(),
            file_ready_timeout_ms: 30_000,
            file_ready_poll_ms: 500,
        }
    }
}

impl CoreConfig {
    /// Defaults rooted at the given data directory.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Location of the single local catalog database file.
    pub fn catalog_db_path(&self) -> PathBuf {
        self.data_dir.join("cairn.db")
    }

    pub fn thumbnail_cache_dir(&self) -> PathBuf {
        self.data_dir.join("thumbnails")
    }

    pub fn transcode_cache_dir(&self) -> PathBuf {
        self.data_dir.join("transcode-cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dirs_live_under_data_dir() {
        let config = CoreConfig::with_data_dir("/tmp/cairn");
        assert_eq!(
            config.thumbnail_cache_dir(),
            PathBuf::from("/tmp/cairn/thumbnails")
        );
        assert_eq!(
            config.transcode_cache_dir(),
            PathBuf::from("/tmp/cairn/transcode-cache")
        );
        assert_eq!(config.catalog_db_path(), PathBuf::from("/tmp/cairn/cairn.db"));
    }
}
