//! Topology state store.
//!
//! `TopologyRegistry` is the single writer for every `Network` and its
//! agent pool. Consumers hold it behind `Arc<Mutex<_>>` (see
//! [`SharedRegistry`]), so scaling commands and rotation reads never
//! observe a partially applied mutation. Every mutation synchronously
//! regenerates the downstream artifacts it invalidates (zone content,
//! agent manifests) and rewrites the JSON snapshot that the monitoring
//! and orchestration layers consume, so a status query issued right after
//! a scaling command already reflects it.

use chrono::Local;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::nameserver::NameServerControl;
use crate::pool::AgentManifest;
use crate::rotate::policy::RotationPolicy;
use crate::zone::publisher::ZonePublisher;
use crate::zone::{self, compiler, serial};

use super::network::{LbAlgo, Network, NetworkKind};

/// Upper bound on agents/workers/edges per network.
pub const MAX_AGENTS: usize = 10;

/// First octet tried when allocating 172.<octet>.0.0/24 blocks.
pub const BASE_SUBNET_OCTET: u8 = 60;

/// Registry handle shared between the CLI layer and rotation loops.
pub type SharedRegistry = Arc<Mutex<TopologyRegistry>>;

/// Errors from registry mutations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("network '{0}' already exists")]
    NameTaken(String),

    #[error("unknown network '{0}'")]
    UnknownNetwork(String),

    #[error("exhausted 172.x.0.0/24 subnet range")]
    SubnetExhausted,

    #[error("operation requires a {expected} network, but '{name}' is {actual}")]
    KindMismatch {
        name: String,
        expected: NetworkKind,
        actual: NetworkKind,
    },

    #[error("size {0} out of range (1..={MAX_AGENTS})")]
    SizeOutOfRange(usize),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not serialize registry snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Monitoring-friendly view of one network, written to `registry.json`.
#[derive(Debug, Serialize)]
struct NetworkSnapshot {
    name: String,
    kind: NetworkKind,
    subnet_octet: u8,
    subnet: String,
    size: usize,
    ttl: u32,
    rotation_interval_secs: u64,
    rotation_policy: RotationPolicy,
    fqdn: String,
    dns_ip: String,
}

#[derive(Debug, Serialize)]
struct RegistrySnapshot {
    updated_at: u64,
    networks: BTreeMap<String, NetworkSnapshot>,
}

/// Owner of all Network and Agent Pool state.
pub struct TopologyRegistry {
    domain: String,
    data_dir: PathBuf,
    snapshot_path: PathBuf,
    publisher: ZonePublisher,
    control: Arc<dyn NameServerControl>,
    networks: BTreeMap<String, Network>,
    next_octet: u8,
}

impl TopologyRegistry {
    pub fn new(
        domain: &str,
        data_dir: &Path,
        control: Arc<dyn NameServerControl>,
        publisher: ZonePublisher,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            data_dir: data_dir.to_path_buf(),
            snapshot_path: data_dir.join("registry.json"),
            publisher,
            control,
            networks: BTreeMap::new(),
            next_octet: BASE_SUBNET_OCTET,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn get(&self, name: &str) -> Option<&Network> {
        self.networks.get(name)
    }

    pub fn networks(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Network, RegistryError> {
        self.networks
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownNetwork(name.to_string()))
    }

    fn require_kind(&self, name: &str, expected: NetworkKind) -> Result<&Network, RegistryError> {
        let net = self
            .networks
            .get(name)
            .ok_or_else(|| RegistryError::UnknownNetwork(name.to_string()))?;
        if net.kind != expected {
            return Err(RegistryError::KindMismatch {
                name: name.to_string(),
                expected,
                actual: net.kind,
            });
        }
        Ok(net)
    }

    /// Next unused subnet octet. Allocation only moves forward, but
    /// octets freed by network removal become reusable once the walk
    /// reaches them again.
    fn next_free_octet(&mut self) -> Result<u8, RegistryError> {
        let used: Vec<u8> = self.networks.values().map(|n| n.subnet_octet).collect();
        let mut candidate = self.next_octet;
        while used.contains(&candidate) {
            if candidate == u8::MAX {
                return Err(RegistryError::SubnetExhausted);
            }
            candidate += 1;
        }
        self.next_octet = candidate;
        Ok(candidate)
    }

    /// Create a network, allocate its subnet, and seed its zone file and
    /// (for flux kinds) an empty agent manifest.
    pub fn add_network(&mut self, name: &str, kind: NetworkKind) -> Result<Network, RegistryError> {
        if self.networks.contains_key(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        let octet = self.next_free_octet()?;
        let net = Network::new(name, kind, octet);

        fs::create_dir_all(&self.data_dir)?;
        let zone_path = zone::zone_file_path(&self.data_dir, name);
        let today = Local::now().date_naive();
        let body = zone::render_initial_zone(
            &self.domain,
            net.record_name(),
            &net.dns_ip().to_string(),
            &net.initial_address().to_string(),
            net.ttl,
            serial::next_serial("", today),
        );
        self.publisher.publish(&zone_path, &body)?;

        if kind == NetworkKind::Flux {
            AgentManifest::new(zone::agents_file_path(&self.data_dir, name)).write(&[])?;
        }

        log::info!("added {} network '{}' ({})", kind, name, net.subnet());
        self.networks.insert(name.to_string(), net.clone());
        self.write_snapshot()?;
        Ok(net)
    }

    /// Destroy a network: its subnet allocation is retired and its zone,
    /// manifest, and cursor files removed.
    pub fn remove_network(&mut self, name: &str) -> Result<(), RegistryError> {
        let net = self
            .networks
            .remove(name)
            .ok_or_else(|| RegistryError::UnknownNetwork(name.to_string()))?;

        let mut stale = vec![
            zone::zone_file_path(&self.data_dir, name),
            zone::agents_file_path(&self.data_dir, name),
        ];
        for policy in [RotationPolicy::Random, RotationPolicy::RoundRobin] {
            stale.push(zone::cursor_file_path(
                &self.data_dir,
                name,
                &policy.to_string(),
            ));
        }
        for path in stale {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("could not remove {}: {}", path.display(), e),
            }
        }

        log::info!("removed {} network '{}'", net.kind, name);
        self.write_snapshot()?;
        Ok(())
    }

    /// Set the desired pool size. Meaningful for every kind that scales;
    /// `normal` networks have nothing to scale.
    pub fn set_size(&mut self, name: &str, size: usize) -> Result<(), RegistryError> {
        if size == 0 || size > MAX_AGENTS {
            return Err(RegistryError::SizeOutOfRange(size));
        }
        let net = self.get_mut(name)?;
        if net.kind == NetworkKind::Normal {
            return Err(RegistryError::KindMismatch {
                name: name.to_string(),
                expected: NetworkKind::Flux,
                actual: NetworkKind::Normal,
            });
        }
        net.size = size;
        log::info!("{}: desired size set to {}", name, size);
        self.write_snapshot()
    }

    /// Apply the discovered agent addresses for a flux network. The
    /// manifest rewrite happens before this returns, so the next rotation
    /// tick sees the new pool.
    pub fn apply_agents(&mut self, name: &str, addresses: &[Ipv4Addr]) -> Result<(), RegistryError> {
        self.require_kind(name, NetworkKind::Flux)?;
        AgentManifest::new(zone::agents_file_path(&self.data_dir, name)).write(addresses)?;
        let net = self.get_mut(name)?;
        if !addresses.is_empty() {
            net.size = addresses.len();
        }
        log::info!("{}: agent manifest rewritten with {} address(es)", name, addresses.len());
        self.request_reload(name);
        self.write_snapshot()
    }

    /// Add one agent to a flux network's pool.
    pub fn add_agent(&mut self, name: &str, address: Ipv4Addr) -> Result<(), RegistryError> {
        self.require_kind(name, NetworkKind::Flux)?;
        let manifest = AgentManifest::new(zone::agents_file_path(&self.data_dir, name));
        if manifest.read().len() >= MAX_AGENTS {
            return Err(RegistryError::SizeOutOfRange(MAX_AGENTS + 1));
        }
        let pool = manifest.add(address)?;
        let net = self.get_mut(name)?;
        net.size = pool.len();
        log::info!("{}: agent {} added (pool now {})", name, address, pool.len());
        self.request_reload(name);
        self.write_snapshot()
    }

    /// Remove one agent from a flux network's pool.
    pub fn remove_agent(&mut self, name: &str, address: Ipv4Addr) -> Result<(), RegistryError> {
        self.require_kind(name, NetworkKind::Flux)?;
        let manifest = AgentManifest::new(zone::agents_file_path(&self.data_dir, name));
        let pool = manifest.remove(address)?;
        let net = self.get_mut(name)?;
        net.size = pool.len().max(1);
        log::info!("{}: agent {} removed (pool now {})", name, address, pool.len());
        self.request_reload(name);
        self.write_snapshot()
    }

    /// Publish a static A record for a normal or load-balanced network.
    pub fn set_static_address(&mut self, name: &str, address: Ipv4Addr) -> Result<(), RegistryError> {
        let net = self.get_mut(name)?;
        if !matches!(net.kind, NetworkKind::Normal | NetworkKind::Lb) {
            return Err(RegistryError::KindMismatch {
                name: name.to_string(),
                expected: NetworkKind::Normal,
                actual: net.kind,
            });
        }
        let record = net.record_name().to_string();
        self.rewrite_zone(name, |doc| doc.set_address(&record, &address.to_string()))?;
        self.request_reload(name);
        self.write_snapshot()
    }

    /// Publish the full edge address set of a CDN network as multi-A
    /// records, replacing the previous set.
    pub fn apply_edges(&mut self, name: &str, addresses: &[Ipv4Addr]) -> Result<(), RegistryError> {
        let record = self
            .require_kind(name, NetworkKind::Cdn)?
            .record_name()
            .to_string();
        let rendered: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
        self.rewrite_zone(name, |doc| doc.set_addresses(&record, &rendered))?;
        let net = self.get_mut(name)?;
        if !addresses.is_empty() {
            net.size = addresses.len();
        }
        log::info!("{}: published {} edge record(s)", name, addresses.len());
        self.request_reload(name);
        self.write_snapshot()
    }

    /// Update the record TTL live: the stored value, the `$TTL` directive
    /// in the zone, and a serial bump so running servers notice.
    pub fn set_ttl(&mut self, name: &str, ttl: u32) -> Result<(), RegistryError> {
        let ttl = ttl.max(1);
        self.get_mut(name)?.ttl = ttl;
        self.rewrite_zone(name, |doc| doc.set_ttl(ttl))?;
        log::info!("{}: zone TTL set to {}", name, ttl);
        self.request_reload(name);
        self.write_snapshot()
    }

    /// Tune how often a flux network rotates.
    pub fn set_rotation_interval(&mut self, name: &str, interval: Duration) -> Result<(), RegistryError> {
        self.require_kind(name, NetworkKind::Flux)?;
        let interval = interval.max(Duration::from_secs(1));
        self.get_mut(name)?.rotation_interval = interval;
        log::info!("{}: rotation interval set to {:?}", name, interval);
        self.write_snapshot()
    }

    /// Tune how a flux network selects the next address.
    pub fn set_rotation_policy(&mut self, name: &str, policy: RotationPolicy) -> Result<(), RegistryError> {
        self.require_kind(name, NetworkKind::Flux)?;
        self.get_mut(name)?.rotation_policy = policy;
        log::info!("{}: rotation policy set to {}", name, policy);
        self.write_snapshot()
    }

    /// Set the upstream algorithm for a load-balanced network.
    pub fn set_lb_algo(&mut self, name: &str, algo: LbAlgo) -> Result<(), RegistryError> {
        self.require_kind(name, NetworkKind::Lb)?;
        self.get_mut(name)?.lb_algo = algo;
        log::info!("{}: load balancer algorithm set to {}", name, algo);
        self.write_snapshot()
    }

    /// Read-modify-publish one network's zone, bumping the serial as part
    /// of the edit. The publisher serializes the write against any
    /// concurrent rotation tick on the same file.
    fn rewrite_zone<F>(&self, name: &str, edit: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut compiler::ZoneDocument),
    {
        let zone_path = zone::zone_file_path(&self.data_dir, name);
        let text = fs::read_to_string(&zone_path)?;
        let mut doc = compiler::ZoneDocument::parse(&text);
        edit(&mut doc);
        doc.set_serial(serial::next_serial(&text, Local::now().date_naive()));
        self.publisher.publish(&zone_path, &doc.render())?;
        Ok(())
    }

    /// Ask the name-server to pick up regenerated zone content. Failure
    /// here degrades freshness, not correctness, so it is logged and the
    /// mutation still succeeds.
    fn request_reload(&self, name: &str) {
        if self.control.reload_domain(&self.domain).is_ok() {
            return;
        }
        if let Err(e) = self.control.reload_signal() {
            log::warn!("{}: zone reload request failed: {}", name, e);
        }
    }

    /// Rewrite `registry.json`, the read-only desired-state view consumed
    /// by monitoring and orchestration.
    pub fn write_snapshot(&self) -> Result<(), RegistryError> {
        fs::create_dir_all(&self.data_dir)?;
        let snapshot = RegistrySnapshot {
            updated_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            networks: self
                .networks
                .iter()
                .map(|(name, net)| {
                    (
                        name.clone(),
                        NetworkSnapshot {
                            name: net.name.clone(),
                            kind: net.kind,
                            subnet_octet: net.subnet_octet,
                            subnet: net.subnet(),
                            size: net.size,
                            ttl: net.ttl,
                            rotation_interval_secs: net.rotation_interval.as_secs(),
                            rotation_policy: net.rotation_policy,
                            fqdn: net.fqdn(&self.domain),
                            dns_ip: net.dns_ip().to_string(),
                        },
                    )
                })
                .collect(),
        };
        let body = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.snapshot_path, body)?;
        Ok(())
    }
}
