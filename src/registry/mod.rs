//! # Topology State Registry
//!
//! The registry is the authoritative in-memory model of every simulated
//! network and the single writer for all of them. Scaling and tuning
//! commands come in through here; rotation loops and the status layer
//! read from here.
//!
//! ## Responsibilities
//!
//! - **Network catalog**: name-unique CRUD over [`Network`] entities
//! - **Subnet allocation**: monotonic, non-overlapping 172.x.0.0/24
//!   blocks, retired when a network is destroyed
//! - **Attribute discipline**: kind-appropriate settings only (an
//!   `lb_algo` on a flux network is a caller bug, not a silent no-op)
//! - **Synchronous regeneration**: every mutation rewrites the artifacts
//!   it invalidates (zone records, agent manifests) before returning
//! - **Snapshot**: `registry.json`, the read-only desired-state view for
//!   the monitoring exporter and the compose layer
//!
//! ## Single-writer discipline
//!
//! All consumers share one registry behind [`SharedRegistry`]
//! (`Arc<Mutex<TopologyRegistry>>`). Rotation loops never hold the lock
//! across a tick; they copy the parameters they need and release it, so
//! a slow publish cannot stall a scaling command.

mod network;
mod store;

pub use network::{LbAlgo, Network, NetworkKind, DEFAULT_ROTATION_INTERVAL, DEFAULT_TTL};
pub use store::{
    RegistryError, SharedRegistry, TopologyRegistry, BASE_SUBNET_OCTET, MAX_AGENTS,
};
