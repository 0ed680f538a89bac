//! Media inspection capabilities.
//!
//! [`MediaProbe`] is the seam between the ingestion pipeline and the actual
//! inspection machinery; the production implementation shells out to
//! `ffprobe` and uses the `image` crate for still formats.

use std::path::Path;

use async_trait::async_trait;
use cairn_model::MediaType;

use crate::error::Result;

mod ffprobe;
mod ready;

pub use ffprobe::FfprobeMediaProbe;
pub use ready::wait_until_ready;

/// Stream inspection seam consumed by the processor and both caches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Classify a file, tolerating files still being written. A file that
    /// never becomes readable within the readiness window classifies as
    /// `Unknown` and is skipped for now, not failed.
    async fn classify(&self, path: &Path) -> Result<MediaType>;

    /// Stream duration in seconds.
    async fn duration_secs(&self, path: &Path) -> Result<f64>;

    /// Codec name of the primary video stream, if any.
    async fn primary_video_codec(&self, path: &Path) -> Result<Option<String>>;

    /// Pixel dimensions, where the type supports them.
    async fn dimensions(
        &self,
        path: &Path,
        media_type: MediaType,
    ) -> Result<Option<(u32, u32)>>;
}
