//! Rotation loops.
//!
//! Each rotating network runs one loop on its own thread: read the agent
//! pool, pick the next address under the network's policy, compile a new
//! zone body with a fresh serial, validate it, publish it, ask the
//! name-server to reload, then sleep until the next tick. The tick body
//! takes the date as an argument and performs no sleeping of its own, so
//! tests drive it deterministically; the sleep phase is the only point
//! that observes the stop flag, which keeps in-flight publishes intact
//! during shutdown.
//!
//! Failures stay local: an empty pool or a rejected candidate skips the
//! tick, a failed write or reload is retried next tick, and only a dead
//! name-server process terminates the loop, leaving the last published
//! zone content in place for that network and every sibling loop running.

pub mod policy;

use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::nameserver::NameServerControl;
use crate::pool::AgentManifest;
use crate::zone::publisher::ZonePublisher;
use crate::zone::{self, compiler, serial};
use policy::{CursorStore, RotationPolicy};

/// Phases of one rotation cycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    WaitingPool,
    Selecting,
    Compiling,
    Validating,
    Publishing,
    Idle,
}

/// Why a tick published nothing. All of these are expected steady-state
/// conditions, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Agent manifest empty or missing; rotation resumes when repopulated.
    EmptyPool,
    /// Selected address is already live; no serial is consumed.
    Unchanged,
    /// Candidate zone was rejected (or no checker under strict mode).
    ValidationRejected,
}

/// Outcome of one tick, recorded on the status board after every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// New zone content is live. `reloaded` is false when both reload
    /// paths failed; the server will pick the content up on its next
    /// own reload or restart.
    Published {
        address: Ipv4Addr,
        serial: u64,
        reloaded: bool,
    },
    Skipped(SkipReason),
    /// Write or read failure; retried on the next tick.
    PublishFailed(String),
}

/// Fatal loop termination causes.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("name server process for network '{0}' is not running")]
    ServerUnavailable(String),
}

/// Last known rotation status per network, shared between loops and the
/// status/CLI layer.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<HashMap<String, NetworkStatus>>>,
}

/// Per-network view the status layer reads.
#[derive(Debug, Clone, Default)]
pub struct NetworkStatus {
    pub last_outcome: Option<TickOutcome>,
    pub fatal: Option<String>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, network: &str, outcome: TickOutcome) {
        let mut inner = self.inner.lock().expect("status board poisoned");
        inner.entry(network.to_string()).or_default().last_outcome = Some(outcome);
    }

    fn record_fatal(&self, network: &str, reason: String) {
        let mut inner = self.inner.lock().expect("status board poisoned");
        inner.entry(network.to_string()).or_default().fatal = Some(reason);
    }

    pub fn get(&self, network: &str) -> Option<NetworkStatus> {
        self.inner
            .lock()
            .expect("status board poisoned")
            .get(network)
            .cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, NetworkStatus> {
        self.inner.lock().expect("status board poisoned").clone()
    }
}

/// One network's rotation driver.
pub struct RotationLoop {
    network: String,
    domain: String,
    record_name: String,
    zone_path: PathBuf,
    manifest: AgentManifest,
    cursor: CursorStore,
    policy: RotationPolicy,
    interval: Duration,
    strict_validation: bool,
    control: Arc<dyn NameServerControl>,
    publisher: ZonePublisher,
    status: StatusBoard,
    state: LoopState,
    last_applied: Option<(Ipv4Addr, u64)>,
}

impl RotationLoop {
    pub fn new(
        network: &str,
        domain: &str,
        record_name: &str,
        data_dir: &std::path::Path,
        policy: RotationPolicy,
        interval: Duration,
        strict_validation: bool,
        control: Arc<dyn NameServerControl>,
        publisher: ZonePublisher,
        status: StatusBoard,
    ) -> Self {
        Self {
            network: network.to_string(),
            domain: domain.to_string(),
            record_name: record_name.to_string(),
            zone_path: zone::zone_file_path(data_dir, network),
            manifest: AgentManifest::new(zone::agents_file_path(data_dir, network)),
            cursor: CursorStore::new(zone::cursor_file_path(
                data_dir,
                network,
                &policy.to_string(),
            )),
            policy,
            interval,
            strict_validation,
            control,
            publisher,
            status,
            state: LoopState::Idle,
            last_applied: None,
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run one rotation attempt for the given date.
    ///
    /// Serials are recomputed from the file on every attempt, so a tick
    /// that fails after computing one persists nothing.
    pub fn tick(&mut self, today: NaiveDate) -> TickOutcome {
        self.state = LoopState::WaitingPool;
        let pool = self.manifest.read();
        if pool.is_empty() {
            log::debug!("{}: agent pool empty, skipping rotation", self.network);
            self.state = LoopState::Idle;
            return TickOutcome::Skipped(SkipReason::EmptyPool);
        }

        self.state = LoopState::Selecting;
        let cursor = self.cursor.load();
        let selection = match policy::select(&pool, self.policy, cursor) {
            Some(selection) => selection,
            None => {
                self.state = LoopState::Idle;
                return TickOutcome::Skipped(SkipReason::EmptyPool);
            }
        };
        if self.policy == RotationPolicy::RoundRobin {
            // Selection consumes a pool position even if the rest of the
            // tick fails; the cursor is the walk's durable memory.
            if let Err(e) = self.cursor.store(selection.cursor) {
                log::warn!("{}: could not persist rotation cursor: {}", self.network, e);
            }
        }

        let zone_text = match fs::read_to_string(&self.zone_path) {
            Ok(text) => text,
            Err(e) => {
                self.state = LoopState::Idle;
                return TickOutcome::PublishFailed(format!(
                    "could not read zone file {}: {}",
                    self.zone_path.display(),
                    e
                ));
            }
        };

        // Skip when the chosen address is already the one we last put
        // live and nobody rewrote the zone underneath us.
        if let Some((last_address, _)) = self.last_applied {
            let live = compiler::ZoneDocument::parse(&zone_text)
                .addresses_of(&self.record_name);
            if selection.address == last_address
                && live == vec![selection.address.to_string()]
            {
                self.state = LoopState::Idle;
                return TickOutcome::Skipped(SkipReason::Unchanged);
            }
        }

        self.state = LoopState::Compiling;
        let next_serial = serial::next_serial(&zone_text, today);
        let candidate = compiler::compile_single_record(
            &zone_text,
            &self.record_name,
            &selection.address.to_string(),
            next_serial,
        );

        self.state = LoopState::Validating;
        if !self.validate(&candidate) {
            log::warn!(
                "{}: candidate zone rejected, keeping current content",
                self.network
            );
            self.state = LoopState::Idle;
            return TickOutcome::Skipped(SkipReason::ValidationRejected);
        }

        self.state = LoopState::Publishing;
        if let Err(e) = self.publisher.publish(&self.zone_path, &candidate) {
            self.state = LoopState::Idle;
            return TickOutcome::PublishFailed(format!(
                "could not write zone file {}: {}",
                self.zone_path.display(),
                e
            ));
        }

        let reloaded = self.request_reload();
        self.last_applied = Some((selection.address, next_serial));
        log::info!(
            "{}: published {} -> {} (serial {}{})",
            self.network,
            self.record_name,
            selection.address,
            next_serial,
            if reloaded { "" } else { ", reload pending" }
        );
        self.state = LoopState::Idle;
        TickOutcome::Published {
            address: selection.address,
            serial: next_serial,
            reloaded,
        }
    }

    /// Check candidate content without exposing it as the live file. The
    /// candidate is written next to the zone under a distinct name and
    /// removed afterwards.
    fn validate(&self, candidate: &str) -> bool {
        let candidate_path = self.zone_path.with_extension("zone.candidate");
        if let Err(e) = fs::write(&candidate_path, candidate) {
            log::warn!(
                "{}: could not stage candidate zone for checking: {}",
                self.network,
                e
            );
            return !self.strict_validation;
        }

        let verdict = self.control.check_zone(&self.domain, &candidate_path);
        let _ = fs::remove_file(&candidate_path);

        match verdict {
            Some(ok) => ok,
            None => {
                if self.strict_validation {
                    log::warn!(
                        "{}: no zone checker available and strict validation is on",
                        self.network
                    );
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Preferred path first, raw signal second; either succeeding counts.
    /// Both failing is reported as degraded but never rolls back the
    /// already-published content.
    fn request_reload(&self) -> bool {
        match self.control.reload_domain(&self.domain) {
            Ok(()) => return true,
            Err(e) => log::debug!(
                "{}: domain reload unavailable ({}), falling back to signal",
                self.network,
                e
            ),
        }
        match self.control.reload_signal() {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "{}: reload failed on both paths ({}); server will pick up the zone on its next reload",
                    self.network,
                    e
                );
                false
            }
        }
    }

    /// Drive ticks until the stop flag is set or the name-server dies.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), RotationError> {
        while !stop.load(Ordering::Relaxed) {
            if !self.control.is_alive() {
                let reason = format!(
                    "name server process for '{}' is not running",
                    self.network
                );
                self.status.record_fatal(&self.network, reason);
                return Err(RotationError::ServerUnavailable(self.network.clone()));
            }

            let outcome = self.tick(Local::now().date_naive());
            self.status.record(&self.network, outcome);

            // Sliced sleep: the only interruptible point, so shutdown
            // never lands mid-publish.
            let deadline = Instant::now() + self.interval;
            while Instant::now() < deadline {
                if stop.load(Ordering::Relaxed) {
                    return Ok(());
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                std::thread::sleep(remaining.min(Duration::from_millis(100)));
            }
        }
        Ok(())
    }
}

/// Owns the rotation threads and the shared stop flag.
#[derive(Default)]
pub struct Supervisor {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag shared with signal handlers; setting it stops every loop at
    /// its next interruptible point.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Start one network's loop on a dedicated thread.
    pub fn spawn(&mut self, mut rotation: RotationLoop) {
        let stop = self.stop.clone();
        let name = format!("rotate-{}", rotation.network());
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || match rotation.run(&stop) {
                Ok(()) => log::info!("{}: rotation loop stopped", rotation.network()),
                Err(e) => log::error!("{}: rotation loop terminated: {}", rotation.network(), e),
            })
            .unwrap_or_else(|e| panic!("could not spawn thread {}: {}", name, e));
        self.handles.push(handle);
    }

    /// Signal every loop to stop and wait for in-flight work to finish.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.handles {
            if let Err(e) = handle.join() {
                log::error!("rotation thread panicked: {:?}", e);
            }
        }
    }
}
