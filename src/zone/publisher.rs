//! Atomic zone publication.
//!
//! The live zone file is typically bind-mounted into the name-server
//! container, so a rename-based swap would replace the inode and detach
//! the mount: the server would keep reading the stale file forever.
//! Publication therefore truncates and rewrites the existing inode, then
//! flushes it to disk. Writers racing on the same inode can interleave
//! partial writes, so every zone path gets its own lock and the
//! truncate-write-sync sequence runs as a critical section.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Serializes writes per zone file and performs mount-safe publication.
///
/// Cloning shares the lock table, so every writer in the process (scaling
/// actors and rotation loops alike) contends on the same per-path lock.
#[derive(Clone, Default)]
pub struct ZonePublisher {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl ZonePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("publisher lock table poisoned");
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Write `content` into the live zone file at `path`.
    ///
    /// The file is created if missing; an existing file keeps its inode.
    /// Content is flushed with `sync_all` before the lock is released, so
    /// a concurrent reader observes either the previous complete zone or
    /// the new complete zone, never a partial write.
    pub fn publish(&self, path: &Path, content: &str) -> io::Result<()> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().expect("zone file lock poisoned");

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        log::debug!("published {} bytes to {}", content.len(), path.display());
        Ok(())
    }
}
