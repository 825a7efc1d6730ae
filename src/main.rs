use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use fluxsim::config::{self, NetworkSpec, RotationSettings};
use fluxsim::nameserver::{BindControl, NameServerControl};
use fluxsim::registry::{NetworkKind, TopologyRegistry};
use fluxsim::rotate::{RotationLoop, StatusBoard, Supervisor};
use fluxsim::zone::publisher::ZonePublisher;

/// DNS zone rotation and topology-state engine for fast-flux simulations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the topology configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Override the data directory from the configuration
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Require zone validation to pass before publishing
    #[arg(long)]
    strict_validation: bool,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Starting FluxSim rotation engine");
    info!("Configuration file: {:?}", args.config);

    let mut cfg = config::load_config(&args.config)
        .wrap_err_with(|| format!("Failed to load configuration '{}'", args.config.display()))?;
    if let Some(data_dir) = args.data_dir {
        cfg.general.data_dir = data_dir;
    }
    if args.strict_validation {
        cfg.general.strict_validation = true;
    }
    info!("Data directory: {:?}", cfg.general.data_dir);

    let ns = &cfg.general.nameserver;
    let control = Arc::new(BindControl::new(
        ns.rndc_path.clone(),
        ns.checkzone_path.clone(),
        ns.process_name.clone(),
        ns.command_timeout,
    ));
    if !control.is_alive() {
        warn!(
            "Name-server process '{}' is not running yet; rotation loops will stop if it stays down",
            ns.process_name
        );
    }

    let publisher = ZonePublisher::new();
    let mut registry = TopologyRegistry::new(
        &cfg.general.domain,
        &cfg.general.data_dir,
        control.clone(),
        publisher.clone(),
    );

    // Environment settings supply the rotation defaults for networks the
    // config file leaves untuned.
    let env_defaults = RotationSettings::from_env()
        .wrap_err("Invalid rotation settings in environment")?;
    info!(
        "Rotation defaults: interval {:?}, policy {}",
        env_defaults.interval, env_defaults.policy
    );

    for spec in &cfg.networks {
        seed_network(&mut registry, spec, &env_defaults)
            .wrap_err_with(|| format!("Failed to create network '{}'", spec.name))?;
    }
    info!("Registered {} network(s)", cfg.networks.len());

    // Spawn one rotation loop per flux network
    let status = StatusBoard::new();
    let mut supervisor = Supervisor::new();
    let mut rotating = 0usize;
    for net in registry.networks() {
        if net.kind != NetworkKind::Flux {
            continue;
        }
        let rotation = RotationLoop::new(
            &net.name,
            &cfg.general.domain,
            net.record_name(),
            &cfg.general.data_dir,
            net.rotation_policy,
            net.rotation_interval,
            cfg.general.strict_validation,
            control.clone(),
            publisher.clone(),
            status.clone(),
        );
        supervisor.spawn(rotation);
        rotating += 1;
    }
    info!("Started {} rotation loop(s)", rotating);

    let stop = supervisor.stop_flag();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::Relaxed);
    })
    .wrap_err("Failed to install shutdown handler")?;

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!("Shutting down; waiting for in-flight publishes to finish");
    supervisor.shutdown();

    for (network, state) in status.snapshot() {
        match state.fatal {
            Some(reason) => warn!("{}: stopped degraded ({})", network, reason),
            None => info!("{}: last outcome {:?}", network, state.last_outcome),
        }
    }

    info!("Rotation engine stopped");
    Ok(())
}

/// Create one configured network and apply its overrides, falling back
/// to the environment defaults for untuned flux networks.
fn seed_network(
    registry: &mut TopologyRegistry,
    spec: &NetworkSpec,
    env_defaults: &RotationSettings,
) -> std::result::Result<(), fluxsim::registry::RegistryError> {
    registry.add_network(&spec.name, spec.kind)?;
    if let Some(size) = spec.size {
        registry.set_size(&spec.name, size)?;
    }
    if let Some(ttl) = spec.ttl {
        registry.set_ttl(&spec.name, ttl)?;
    }
    if spec.kind == NetworkKind::Flux {
        let interval = spec.rotation_interval.unwrap_or(env_defaults.interval);
        registry.set_rotation_interval(&spec.name, interval)?;
        let policy = spec.rotation_policy.unwrap_or(env_defaults.policy);
        registry.set_rotation_policy(&spec.name, policy)?;
    }
    if let Some(algo) = spec.lb_algo {
        registry.set_lb_algo(&spec.name, algo)?;
    }
    Ok(())
}
