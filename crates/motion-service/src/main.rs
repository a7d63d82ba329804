mod config;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use motion_protocol::DeviceRegistry;
use motion_transport::{
    LocalAddressProvider, MulticastManager, Scheduler, UdpTransportFactory,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServiceConfig;

#[derive(Parser, Debug)]
#[command(name = "motion-service", about = "Motion Blinds multicast bridge")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/motion.toml")]
    config: PathBuf,

    /// Local IPv4 address to bind the multicast socket to (overrides config)
    #[arg(long, env = "MOTION_PRIMARY_ADDRESS")]
    primary_address: Option<Ipv4Addr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServiceConfig::load(&args.config).await?;
    let multicast = config.multicast()?;
    let primary_override = match args.primary_address {
        Some(addr) => Some(addr),
        None => config.primary_address()?,
    };

    let registry = Arc::new(DeviceRegistry::new());
    let scheduler = Scheduler::current();
    let manager = MulticastManager::new(
        multicast,
        Arc::new(LocalAddressProvider::new(primary_override)),
        Arc::new(UdpTransportFactory),
        registry.clone(),
        scheduler.clone(),
    );

    info!(
        group = %manager.config().group,
        bind_port = manager.config().bind_port,
        target_port = manager.config().target_port,
        "Motion bridge starting"
    );
    manager.start();

    let mut timers: Vec<JoinHandle<()>> = Vec::new();

    // Periodic ping so every motor on the segment answers with its state
    if config.poll.interval_secs > 0 {
        let period = Duration::from_secs(config.poll.interval_secs);
        let payload = config.poll.payload.clone();
        let manager = manager.clone();
        timers.push(scheduler.schedule_repeating(period, period, move || {
            let queued = manager.send(payload.clone());
            async move {
                if !queued {
                    warn!("Poll request dropped, outbound queue full");
                }
            }
        }));
    }

    if config.status.interval_secs > 0 {
        let period = Duration::from_secs(config.status.interval_secs);
        let manager = manager.clone();
        let registry = Arc::clone(&registry);
        timers.push(scheduler.schedule_repeating(period, period, move || {
            log_status(&manager, &registry);
            async {}
        }));
    }

    info!("Bridge running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    for timer in timers {
        timer.abort();
    }
    manager.shutdown().await;

    log_status(&manager, &registry);
    Ok(())
}

fn log_status(manager: &MulticastManager, registry: &DeviceRegistry) {
    let counters = manager.counters();
    info!(
        state = ?manager.state(),
        interface = ?manager.bound_interface(),
        devices = registry.len(),
        counters = %serde_json::to_string(&counters).unwrap_or_default(),
        "Bridge status"
    );

    for motor in registry.snapshot() {
        let data = serde_json::to_string(&motor.heartbeat_data()).unwrap_or_default();
        info!(
            mac = %motor.mac,
            device_type = %motor.device_type,
            data = %data,
            "Motor"
        );
    }
}
