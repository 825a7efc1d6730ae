//! Address selection policies.
//!
//! Two policies decide which pool address gets published next: `random`
//! picks uniformly on every call, `round-robin` walks the pool in order
//! using a durable cursor. The cursor holds the last-used slot; selection
//! advances it first and wraps at the pool length, so the value stays
//! bounded and a restart resumes the walk where it stopped.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

/// How the next published address is chosen from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationPolicy {
    /// Uniform random choice; stateless, the cursor is untouched.
    #[serde(rename = "random")]
    Random,
    /// Walk the pool in order, resuming across restarts.
    #[serde(rename = "round-robin", alias = "roundrobin", alias = "round_robin")]
    RoundRobin,
}

impl fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationPolicy::Random => write!(f, "random"),
            RotationPolicy::RoundRobin => write!(f, "round-robin"),
        }
    }
}

impl FromStr for RotationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(RotationPolicy::Random),
            "round-robin" | "roundrobin" | "round_robin" => Ok(RotationPolicy::RoundRobin),
            other => Err(format!(
                "unknown rotation policy '{}' (expected random or round-robin)",
                other
            )),
        }
    }
}

/// One selection result: the address to publish and the cursor value to
/// persist for the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub address: Ipv4Addr,
    pub cursor: u64,
}

/// Pick the next address from `pool` under `policy`.
///
/// Returns `None` on an empty pool: "no candidate" is an expected
/// steady-state condition for the caller, not an error. The pool slice
/// must not be reordered between the index computation and the lookup;
/// both happen here against the same borrow.
pub fn select(pool: &[Ipv4Addr], policy: RotationPolicy, cursor: u64) -> Option<Selection> {
    if pool.is_empty() {
        return None;
    }
    match policy {
        RotationPolicy::Random => {
            let address = *pool.choose(&mut rand::thread_rng())?;
            Some(Selection { address, cursor })
        }
        RotationPolicy::RoundRobin => {
            let len = pool.len() as u64;
            let next = (cursor + 1) % len;
            Some(Selection {
                address: pool[next as usize],
                cursor: next,
            })
        }
    }
}

/// Durable cursor, one file per network-policy pair.
///
/// A missing or unreadable file reads as cursor 0; round-robin then
/// resumes from the start of the pool rather than failing the tick.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> u64 {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn store(&self, cursor: u64) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pool() -> Vec<Ipv4Addr> {
        vec![
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            "10.0.0.3".parse().unwrap(),
        ]
    }

    #[test]
    fn test_round_robin_wraps_to_pool_start() {
        let selection = select(&pool(), RotationPolicy::RoundRobin, 2).unwrap();
        assert_eq!(selection.address, "10.0.0.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(selection.cursor, 0);
    }

    #[test]
    fn test_round_robin_visits_every_element_once_per_cycle() {
        let pool = pool();
        let mut cursor = 0;
        let mut seen = Vec::new();
        for _ in 0..pool.len() {
            let s = select(&pool, RotationPolicy::RoundRobin, cursor).unwrap();
            seen.push(s.address);
            cursor = s.cursor;
        }
        // One full cycle covers the pool in order before repeating.
        assert_eq!(
            seen,
            vec![pool[1], pool[2], pool[0]],
            "cycle must walk the pool in order from the cursor"
        );
        let again = select(&pool, RotationPolicy::RoundRobin, cursor).unwrap();
        assert_eq!(again.address, seen[0]);
    }

    #[test]
    fn test_random_always_returns_pool_member() {
        let pool = pool();
        for _ in 0..50 {
            let s = select(&pool, RotationPolicy::Random, 7).unwrap();
            assert!(pool.contains(&s.address));
            // Random selection never mutates the cursor.
            assert_eq!(s.cursor, 7);
        }
    }

    #[test]
    fn test_empty_pool_yields_no_candidate() {
        assert!(select(&[], RotationPolicy::Random, 0).is_none());
        assert!(select(&[], RotationPolicy::RoundRobin, 5).is_none());
    }

    #[test]
    fn test_cursor_survives_reload() {
        let dir = TempDir::new().unwrap();
        let store = CursorStore::new(dir.path().join("cursor_demo_round-robin.txt"));
        assert_eq!(store.load(), 0);
        store.store(2).unwrap();
        assert_eq!(store.load(), 2);
    }

    #[test]
    fn test_garbage_cursor_resets_to_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cursor.txt");
        fs::write(&path, "not a number\n").unwrap();
        assert_eq!(CursorStore::new(path).load(), 0);
    }

    #[test]
    fn test_policy_parsing_accepts_both_spellings() {
        assert_eq!(
            "roundrobin".parse::<RotationPolicy>().unwrap(),
            RotationPolicy::RoundRobin
        );
        assert_eq!(
            "round-robin".parse::<RotationPolicy>().unwrap(),
            RotationPolicy::RoundRobin
        );
        assert_eq!(
            "random".parse::<RotationPolicy>().unwrap(),
            RotationPolicy::Random
        );
        assert!("weighted".parse::<RotationPolicy>().is_err());
    }
}
