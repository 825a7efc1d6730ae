//! Zone file management.
//!
//! This module owns everything that touches authoritative zone content:
//!
//! - `serial`: next-serial computation from existing zone text
//! - `compiler`: structured line-oriented record rewriting
//! - `publisher`: mount-safe atomic publication with per-file locking
//!
//! plus the deterministic on-disk layout. Every network's files live under
//! one data directory, keyed by network name, so collaborating processes
//! (name-server containers, monitoring exporters) can find them without
//! coordination.

pub mod compiler;
pub mod publisher;
pub mod serial;

use std::path::{Path, PathBuf};

/// Authoritative zone file for a network.
pub fn zone_file_path(data_dir: &Path, network: &str) -> PathBuf {
    data_dir.join(format!("db.{}.zone", network))
}

/// Agent manifest (one address per line) for a rotating network.
pub fn agents_file_path(data_dir: &Path, network: &str) -> PathBuf {
    data_dir.join(format!("flux_agents_{}.txt", network))
}

/// Durable round-robin cursor, one file per network-policy pair.
pub fn cursor_file_path(data_dir: &Path, network: &str, policy: &str) -> PathBuf {
    data_dir.join(format!("cursor_{}_{}.txt", network, policy))
}

/// Render a complete fresh zone for a network: TTL and origin directives,
/// an SOA carrying the rewritable serial marker, the nameserver's own
/// records, and the initial A record for the managed name.
pub fn render_initial_zone(
    domain: &str,
    record_name: &str,
    dns_ip: &str,
    initial_address: &str,
    ttl: u32,
    serial: u64,
) -> String {
    format!(
        "$TTL {ttl}\n\
$ORIGIN {domain}.\n\
@       IN SOA  ns.{domain}. root.{domain}. (\n\
                 {serial} {marker}\n\
                 30M\n\
                 15M\n\
                 1W\n\
                 1M )\n\
@       IN NS   ns.{domain}.\n\
ns      IN A {dns_ip}\n\
\n\
{record_name} IN A {initial_address}\n",
        marker = serial::SERIAL_MARKER,
    )
}
