//! Network entity model.
//!
//! A `Network` describes one simulated topology: its kind, its allocated
//! subnet, and the tuning knobs consumed by zone generation and the
//! rotation loops. Addresses inside a network follow a fixed layout so
//! collaborating processes can derive them without coordination: the
//! name-server lives at host .53, the origin/first agent at host .5.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::rotate::policy::RotationPolicy;

/// Default record TTL in seconds.
pub const DEFAULT_TTL: u32 = 60;

/// Default rotation interval.
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(5);

/// Topology kind of a simulated network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    /// Single origin server, static A record.
    Normal,
    /// Fast-flux: rotating proxy agents published one at a time.
    Flux,
    /// Load balancer fronting a worker pool, static A record for the LB.
    Lb,
    /// CDN-style edge set published as multiple A records.
    Cdn,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkKind::Normal => "normal",
            NetworkKind::Flux => "flux",
            NetworkKind::Lb => "lb",
            NetworkKind::Cdn => "cdn",
        };
        write!(f, "{}", s)
    }
}

/// Upstream selection algorithm for load-balanced networks. Only
/// meaningful when the kind is `lb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LbAlgo {
    #[serde(rename = "round_robin")]
    RoundRobin,
    #[serde(rename = "ip_hash")]
    IpHash,
}

impl fmt::Display for LbAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LbAlgo::RoundRobin => write!(f, "round_robin"),
            LbAlgo::IpHash => write!(f, "ip_hash"),
        }
    }
}

/// One simulated network and its scaling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub kind: NetworkKind,
    /// Second octet of the allocated 172.<octet>.0.0/24 block.
    pub subnet_octet: u8,
    /// Desired agent/worker/edge count.
    pub size: usize,
    pub ttl: u32,
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,
    pub rotation_policy: RotationPolicy,
    pub lb_algo: LbAlgo,
}

impl Network {
    pub fn new(name: &str, kind: NetworkKind, subnet_octet: u8) -> Self {
        Self {
            name: name.to_string(),
            kind,
            subnet_octet,
            // CDN networks answer with an edge set, so they start with
            // enough edges to make the multi-A answer visible.
            size: if kind == NetworkKind::Cdn { 3 } else { 1 },
            ttl: DEFAULT_TTL,
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
            rotation_policy: RotationPolicy::Random,
            lb_algo: LbAlgo::RoundRobin,
        }
    }

    /// The allocated CIDR block.
    pub fn subnet(&self) -> String {
        format!("172.{}.0.0/24", self.subnet_octet)
    }

    /// Address of this network's name-server.
    pub fn dns_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(172, self.subnet_octet, 0, 53)
    }

    /// Address the zone is seeded with before real agents are discovered.
    pub fn initial_address(&self) -> Ipv4Addr {
        Ipv4Addr::new(172, self.subnet_octet, 0, 5)
    }

    /// The owner name of this network's managed record. Records are
    /// published under the network's own label.
    pub fn record_name(&self) -> &str {
        &self.name
    }

    /// Fully qualified domain name clients resolve.
    pub fn fqdn(&self, domain: &str) -> String {
        format!("{}.{}", self.name, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_addresses_follow_subnet_layout() {
        let net = Network::new("fluxy", NetworkKind::Flux, 60);
        assert_eq!(net.subnet(), "172.60.0.0/24");
        assert_eq!(net.dns_ip(), Ipv4Addr::new(172, 60, 0, 53));
        assert_eq!(net.initial_address(), Ipv4Addr::new(172, 60, 0, 5));
        assert_eq!(net.fqdn("sim.local"), "fluxy.sim.local");
    }

    #[test]
    fn test_cdn_defaults_to_three_edges() {
        assert_eq!(Network::new("cdn1", NetworkKind::Cdn, 61).size, 3);
        assert_eq!(Network::new("plain", NetworkKind::Normal, 62).size, 1);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&NetworkKind::Flux).unwrap(),
            "\"flux\""
        );
        assert_eq!(serde_json::to_string(&LbAlgo::IpHash).unwrap(), "\"ip_hash\"");
    }
}
