use std::collections::HashMap;
use std::path::PathBuf;

/// One consolidated batch of filesystem changes, produced per debounce flush.
///
/// Transient and one-shot: the watcher builds it from drained event buffers
/// and the orchestrator consumes it exactly once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Paths that appeared and were not explained by a rename.
    pub new_files: Vec<PathBuf>,
    /// Genuine renames, old path to new path.
    pub renamed: HashMap<PathBuf, PathBuf>,
    /// Paths that disappeared.
    pub deleted: Vec<PathBuf>,
}

impl ChangeSet {
    /// An empty change-set is never emitted by the watcher.
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.renamed.is_empty() && self.deleted.is_empty()
    }
}
