//! # FluxSim - DNS zone rotation and topology-state engine
//!
//! This library provides the core of a fast-flux DNS simulation lab: a
//! registry of simulated networks whose DNS answers rotate live across a
//! pool of backing agent addresses.
//!
//! ## Overview
//!
//! FluxSim owns the authoritative mapping from logical network → record
//! policy → live agent addresses. It mutates each network's zone file
//! safely under concurrent access, selects the next published address on
//! every rotation tick, and coordinates with an external BIND-style
//! name-server so changes become visible without breaking in-flight
//! queries.
//!
//! ## Key Features
//!
//! - **Topology kinds**: plain origin, fast-flux rotation, load-balanced
//!   pools, and CDN-style multi-A edge sets
//! - **Live scaling**: agent pools grow and shrink while rotation runs
//! - **Monotonic serials**: `YYYYMMDDnn` serials recomputed from the zone
//!   file itself, surviving process restarts
//! - **Mount-safe publication**: truncate-and-write into the live inode,
//!   never a rename swap that would detach a bind mount
//! - **Fail-static**: a dying name-server stops one network's loop and
//!   leaves its last published zone intact
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `config`: YAML and environment configuration with validation
//! - `registry`: topology state registry, subnet allocation, snapshots
//! - `pool`: agent pool manifest files
//! - `zone`: serial allocation, zone compilation, atomic publication
//! - `nameserver`: control capabilities of the external server process
//! - `rotate`: per-network rotation loops and selection policies
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fluxsim::nameserver::BindControl;
//! use fluxsim::registry::{NetworkKind, TopologyRegistry};
//! use fluxsim::zone::publisher::ZonePublisher;
//!
//! let control = Arc::new(BindControl::new(
//!     None,
//!     None,
//!     "named",
//!     Duration::from_secs(10),
//! ));
//! let publisher = ZonePublisher::new();
//! let mut registry = TopologyRegistry::new(
//!     "sim.local",
//!     std::path::Path::new("dns_config"),
//!     control,
//!     publisher,
//! );
//! registry.add_network("fluxy", NetworkKind::Flux)?;
//! registry.apply_agents("fluxy", &["172.60.0.11".parse()?])?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Library seams return typed errors (`thiserror`); the binary entry
//! point reports through `color_eyre`. Expected steady-state conditions
//! (an empty agent pool, a rejected candidate zone) are tick outcomes,
//! never errors driving control flow.

pub mod config;
pub mod nameserver;
pub mod pool;
pub mod registry;
pub mod rotate;
pub mod zone;
