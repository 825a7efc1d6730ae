//! Agent pool manifests.
//!
//! Each rotating network has a manifest file listing its candidate agent
//! addresses, one per line. Scaling operations write it; rotation loops
//! read it on every tick. Line order is the pool order: round-robin
//! selection indexes into this sequence, so the file is rewritten as a
//! whole rather than edited in place.

use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Handle to one network's agent manifest file.
#[derive(Debug, Clone)]
pub struct AgentManifest {
    path: PathBuf,
}

impl AgentManifest {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current pool in file order.
    ///
    /// A missing manifest reads as an empty pool; callers treat that as
    /// "nothing to rotate yet", not as an error. Unparseable lines are
    /// skipped with a warning so one bad entry never takes the whole pool
    /// offline.
    pub fn read(&self) -> Vec<Ipv4Addr> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                log::warn!("could not read agent manifest {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|l| match l.parse::<Ipv4Addr>() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    log::warn!(
                        "skipping unparseable address '{}' in {}",
                        l,
                        self.path.display()
                    );
                    None
                }
            })
            .collect()
    }

    /// Rewrite the manifest with a new address list.
    ///
    /// If a directory was accidentally created at the manifest path (a
    /// misconfigured bind mount does this), it is moved aside to a
    /// timestamped backup instead of being deleted.
    pub fn write(&self, addresses: &[Ipv4Addr]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        if self.path.is_dir() {
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let backup = self.path.with_extension(format!("txt.backup_{}", stamp));
            fs::rename(&self.path, &backup)?;
            log::warn!(
                "moved directory at {} aside to {}",
                self.path.display(),
                backup.display()
            );
        }

        let mut body = addresses
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        if !addresses.is_empty() {
            body.push('\n');
        }
        fs::write(&self.path, body)
    }

    /// Append one address, preserving existing order. Returns the new pool.
    pub fn add(&self, address: Ipv4Addr) -> io::Result<Vec<Ipv4Addr>> {
        let mut pool = self.read();
        if !pool.contains(&address) {
            pool.push(address);
            self.write(&pool)?;
        }
        Ok(pool)
    }

    /// Remove one address if present. Returns the new pool.
    pub fn remove(&self, address: Ipv4Addr) -> io::Result<Vec<Ipv4Addr>> {
        let mut pool = self.read();
        let before = pool.len();
        pool.retain(|a| *a != address);
        if pool.len() != before {
            self.write(&pool)?;
        }
        Ok(pool)
    }
}
