//! Name-server process control.
//!
//! The engine never serves DNS itself; an external authoritative server
//! (BIND-style) reads the zone files this crate writes. What the engine
//! needs from that server is narrow: a liveness check, a way to request a
//! zone reload, and optionally a zone-correctness check. Those
//! capabilities are modeled as a trait so rotation logic is testable with
//! a fake, and so "this deployment has no checker" is an explicit variant
//! rather than a runtime probe.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Errors from interacting with the name-server process.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("could not spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("'{command}' did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// Capabilities the rotation engine requires from the name-server.
pub trait NameServerControl: Send + Sync {
    /// Whether the server process is currently running.
    fn is_alive(&self) -> bool;

    /// Ask the server to re-read the zone for one domain without a
    /// restart. Preferred reload path.
    fn reload_domain(&self, domain: &str) -> Result<(), ControlError>;

    /// Signal the server process to reload everything. Fallback when the
    /// per-domain control channel is unavailable.
    fn reload_signal(&self) -> Result<(), ControlError>;

    /// Check candidate zone content before it goes live.
    ///
    /// `None` means no checker is available in this deployment; whether
    /// that blocks publication is the caller's `strict_validation`
    /// setting, not something decided here.
    fn check_zone(&self, domain: &str, zone_path: &Path) -> Option<bool>;
}

/// Control implementation for a BIND-style server reachable through local
/// binaries: `rndc` for per-domain reloads, `named-checkzone` for
/// validation, process signals for the fallback path.
///
/// Binary paths are explicit configuration; `None` documents that the
/// capability is absent rather than silently degrading when a probe
/// misses.
pub struct BindControl {
    rndc: Option<PathBuf>,
    checkzone: Option<PathBuf>,
    process_name: String,
    timeout: Duration,
}

impl BindControl {
    pub fn new(
        rndc: Option<PathBuf>,
        checkzone: Option<PathBuf>,
        process_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            rndc,
            checkzone,
            process_name: process_name.into(),
            timeout,
        }
    }

    /// Run a command to completion with a bounded wait. A hung binary is
    /// killed and reported as a timeout instead of stalling the caller.
    fn run(&self, mut command: Command) -> Result<(), ControlError> {
        let rendered = format!("{:?}", command);
        command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let mut child = command.spawn().map_err(|source| ControlError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(ControlError::CommandFailed {
                        command: rendered,
                        status: status.to_string(),
                    });
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ControlError::Timeout {
                            command: rendered,
                            timeout: self.timeout,
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(source) => {
                    return Err(ControlError::Spawn {
                        command: rendered,
                        source,
                    });
                }
            }
        }
    }
}

impl NameServerControl for BindControl {
    fn is_alive(&self) -> bool {
        let mut command = Command::new("pgrep");
        command.arg("-x").arg(&self.process_name);
        match self.run(command) {
            Ok(()) => true,
            Err(ControlError::CommandFailed { .. }) => false,
            Err(e) => {
                log::warn!("liveness check for '{}' failed: {}", self.process_name, e);
                false
            }
        }
    }

    fn reload_domain(&self, domain: &str) -> Result<(), ControlError> {
        let rndc = self
            .rndc
            .as_ref()
            .ok_or(ControlError::NotConfigured("rndc"))?;
        let mut command = Command::new(rndc);
        command.arg("reload").arg(domain);
        self.run(command)
    }

    fn reload_signal(&self) -> Result<(), ControlError> {
        let mut command = Command::new("pkill");
        command.arg("-HUP").arg("-x").arg(&self.process_name);
        self.run(command)
    }

    fn check_zone(&self, domain: &str, zone_path: &Path) -> Option<bool> {
        let checkzone = self.checkzone.as_ref()?;
        let mut command = Command::new(checkzone);
        command.arg(domain).arg(zone_path);
        match self.run(command) {
            Ok(()) => Some(true),
            Err(ControlError::CommandFailed { .. }) => Some(false),
            Err(e) => {
                // Checker present but unusable: report "unavailable" and
                // let the strictness setting decide what happens.
                log::warn!("zone check for {} did not run: {}", domain, e);
                None
            }
        }
    }
}
