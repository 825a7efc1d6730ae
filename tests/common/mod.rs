//! Shared test doubles for the integration suite.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use fluxsim::nameserver::{ControlError, NameServerControl};

/// Programmable stand-in for the external name-server process.
///
/// Defaults to a healthy server with both reload paths working and no
/// zone checker configured.
pub struct FakeControl {
    pub alive: AtomicBool,
    /// Verdict returned by `check_zone`; `None` models "no checker".
    pub verdict: Mutex<Option<bool>>,
    pub domain_reload_ok: AtomicBool,
    pub signal_reload_ok: AtomicBool,
    pub domain_reloads: AtomicUsize,
    pub signal_reloads: AtomicUsize,
    pub checks: AtomicUsize,
}

impl Default for FakeControl {
    fn default() -> Self {
        Self {
            alive: AtomicBool::new(true),
            verdict: Mutex::new(None),
            domain_reload_ok: AtomicBool::new(true),
            signal_reload_ok: AtomicBool::new(true),
            domain_reloads: AtomicUsize::new(0),
            signal_reloads: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
        }
    }
}

impl FakeControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdict(verdict: Option<bool>) -> Self {
        let control = Self::default();
        *control.verdict.lock().unwrap() = verdict;
        control
    }

    pub fn reload_count(&self) -> usize {
        self.domain_reloads.load(Ordering::SeqCst) + self.signal_reloads.load(Ordering::SeqCst)
    }
}

impl NameServerControl for FakeControl {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn reload_domain(&self, _domain: &str) -> Result<(), ControlError> {
        if self.domain_reload_ok.load(Ordering::SeqCst) {
            self.domain_reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(ControlError::NotConfigured("rndc"))
        }
    }

    fn reload_signal(&self) -> Result<(), ControlError> {
        if self.signal_reload_ok.load(Ordering::SeqCst) {
            self.signal_reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(ControlError::CommandFailed {
                command: "pkill -HUP named".to_string(),
                status: "exit status: 1".to_string(),
            })
        }
    }

    fn check_zone(&self, _domain: &str, _zone_path: &Path) -> Option<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        *self.verdict.lock().unwrap()
    }
}
