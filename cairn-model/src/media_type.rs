use std::fmt::Display;
use std::fmt::Formatter;

/// Broad classification of a catalogued file.
///
/// Persisted as text in the catalog; once a row is written the type is only
/// re-derived through an explicit repair pass, never silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MediaType {
    /// Still image (PNG, JPEG, WebP, ...)
    Image,
    /// Animated GIF, kept distinct so playback widgets can loop it
    Gif,
    /// File with at least one video stream
    Video,
    /// File with audio streams only
    Audio,
    /// Classification failed; the file is skipped, not catalogued
    Unknown,
}

impl MediaType {
    /// Stable textual form used for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Gif => "gif",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Unknown => "unknown",
        }
    }

    /// Inverse of [`MediaType::as_str`]. Unrecognized input maps to `Unknown`.
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "image" => MediaType::Image,
            "gif" => MediaType::Gif,
            "video" => MediaType::Video,
            "audio" => MediaType::Audio,
            _ => MediaType::Unknown,
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_form_round_trips() {
        for ty in [
            MediaType::Image,
            MediaType::Gif,
            MediaType::Video,
            MediaType::Audio,
            MediaType::Unknown,
        ] {
            assert_eq!(MediaType::from_str_lossy(ty.as_str()), ty);
        }
    }

    #[test]
    fn unrecognized_text_is_unknown() {
        assert_eq!(MediaType::from_str_lossy("mpeg-dash"), MediaType::Unknown);
    }
}
