//! Core data model definitions shared across Cairn crates.

pub mod changes;
pub mod item;
pub mod media_type;

pub use changes::ChangeSet;
pub use item::MediaItem;
pub use media_type::MediaType;
