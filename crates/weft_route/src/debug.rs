//! Thread-safe debug log for the partition-tree router.
//!
//! Routing tasks on any worker may append lines concurrently; each line is
//! prefixed with a hash of the appending thread's ID so interleaved
//! schedules stay readable. The controller persists the buffer to
//! `partition_tree.log` at the end of a run.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// A thread-safe, append-only line log.
#[derive(Debug, Default)]
pub struct PartitionTreeLog {
    lines: Mutex<Vec<String>>,
}

/// File name the log is persisted under.
pub const PARTITION_TREE_LOG_FILE: &str = "partition_tree.log";

impl PartitionTreeLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message, prefixed with the calling thread's ID hash.
    pub fn log(&self, msg: impl AsRef<str>) {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        let line = format!("[thread {}] {}", hasher.finish(), msg.as_ref());
        self.lines.lock().unwrap().push(line);
    }

    /// Number of lines accumulated so far.
    pub fn len(&self) -> usize {
        self.lines.lock().unwrap().len()
    }

    /// Returns whether no lines have been logged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of all lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Writes the buffered lines to `path`, one per line.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let mut f = std::fs::File::create(path)?;
        for line in self.lines.lock().unwrap().iter() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
