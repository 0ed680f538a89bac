//! # Cairn Core
//!
//! Core library for the Cairn media catalog, keeping a persistent catalog of
//! one user-chosen media folder and the derived artifacts that make that
//! folder instantly browsable.
//!
//! ## Overview
//!
//! `cairn-core` provides:
//!
//! - **Content addressing**: stored files are named by the hash of their
//!   bytes, so duplicate content collapses onto one file ([`addressing`])
//! - **Classification and probing**: extension, header, and `ffprobe`-based
//!   media type detection with metadata extraction ([`probe`])
//! - **Catalog**: a SQLite-backed store of media rows, scoped per folder and
//!   queried with pagination and tag filters ([`catalog`])
//! - **Derived artifact caches**: persistent thumbnail and transcode caches
//!   keyed by source path ([`thumbs`], [`transcode`])
//! - **Ingestion pipeline**: classify, probe, thumbnail, and persist for
//!   single files and batches ([`processor`])
//! - **Reconciliation**: ghost-record cleanup and orphan-file import that
//!   converge catalog and disk ([`sync`])
//! - **Folder watching**: debounced, pausable filesystem change detection
//!   delivering consolidated change-sets ([`fs_watch`])

pub mod addressing;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fs_watch;
pub mod probe;
pub mod processor;
pub mod progress;
pub mod sync;
pub mod thumbs;
pub mod transcode;

pub use cairn_model::{ChangeSet, MediaItem, MediaType};

pub use catalog::{Catalog, SqliteCatalog};
pub use config::CoreConfig;
pub use error::{MediaError, Result};
pub use fs_watch::{FolderWatcher, PauseGuard, PauseHandle};
pub use probe::{FfprobeMediaProbe, MediaProbe};
pub use processor::MediaItemProcessor;
pub use progress::{ChannelProgress, NullProgress, ProgressSink};
pub use sync::SynchronizationService;
pub use thumbs::{FfmpegFrameExtractor, ThumbnailCache, VideoFrameExtractor};
pub use transcode::{FfmpegTranscoder, TranscodeCache, VideoTranscoder};
