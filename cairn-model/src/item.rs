use chrono::{DateTime, Utc};

use crate::media_type::MediaType;

/// One catalogued media file.
///
/// `file_path` is the unique key across the catalog. `thumbnail_path` may
/// reference a cache file or a bundled placeholder; a value that no longer
/// resolves to an existing file is stale and must be regenerated, not
/// trusted. `width`/`height` are filled lazily by the repair pass.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MediaItem {
    pub id: i64,
    /// Name the file had when it entered the catalog, before canonical renaming.
    pub file_name: String,
    pub file_path: String,
    pub file_type: MediaType,
    /// Free-form space-separated tag text.
    pub tags: Option<String>,
    /// Stream duration; zero for still images and unprobed rows.
    pub duration_secs: f64,
    pub thumbnail_path: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub added_at: DateTime<Utc>,
}

impl MediaItem {
    /// A not-yet-persisted item; the catalog assigns the real id on insert.
    pub fn new(file_name: String, file_path: String, file_type: MediaType) -> Self {
        Self {
            id: 0,
            file_name,
            file_path,
            file_type,
            tags: None,
            duration_secs: 0.0,
            thumbnail_path: None,
            width: None,
            height: None,
            added_at: Utc::now(),
        }
    }
}
