//! vswitch daemon entry point
//!
//! Usage:
//!   vswitchd --config switch.toml
//!   vswitchd --settings vswitch.toml --config switch.toml --run-for 30 --save out.toml
//!   vswitchd --config switch.toml --connect cm0 --connect cm1

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use vswitch_config::ContextSettings;
use vswitch_core::{init_logging, ComponentKind, Context, Reactor};

#[derive(Parser, Debug)]
#[command(name = "vswitchd")]
#[command(about = "vswitch component host")]
#[command(version)]
struct Args {
    /// Context settings file (TOML)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Component snapshot to instantiate
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overrides the settings file (e.g. "debug" or "vswitch_core=trace")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Stop after this many seconds instead of when no events remain
    #[arg(long)]
    run_for: Option<u64>,

    /// Write the live snapshot here before exiting
    #[arg(long)]
    save: Option<PathBuf>,

    /// Start a connect on the named connection manager (repeatable)
    #[arg(long = "connect", value_name = "MANAGER")]
    connects: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = ContextSettings::load(args.settings.as_deref())?;
    let filter = args.log_level.as_deref().unwrap_or(&settings.log.level);
    init_logging(filter);

    info!("Starting vswitchd");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let reactor = Rc::new(Reactor::new());
    let mut ctx = Context::with_settings(settings);
    ctx.init(reactor.clone())
        .context("Failed to initialize context")?;

    if let Some(path) = &args.config {
        let created = ctx
            .config_load(path)
            .with_context(|| format!("Failed to load component snapshot {:?}", path))?;
        info!(components = created.len(), "snapshot loaded from {:?}", path);
    }

    for name in &args.connects {
        start_connect(&ctx, name)?;
    }

    let dispatched = match args.run_for {
        Some(secs) => run_for(&reactor, Duration::from_secs(secs))?,
        None => reactor.run_until_idle(Duration::MAX)?,
    };
    info!(dispatched, "event loop finished");

    if let Some(path) = &args.save {
        ctx.config_save(path)
            .with_context(|| format!("Failed to save snapshot to {:?}", path))?;
        info!("snapshot saved to {:?}", path);
    }

    ctx.fini();
    ctx.delete();
    info!("vswitchd stopped");
    Ok(())
}

/// Dispatch for `limit` even while nothing is registered
fn run_for(reactor: &Reactor, limit: Duration) -> Result<usize> {
    let deadline = Instant::now() + limit;
    let mut dispatched = 0;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Ok(dispatched);
        }
        if reactor.pending() == 0 {
            std::thread::sleep(left);
            continue;
        }
        dispatched += reactor.run_once(Some(left))?;
    }
}

fn start_connect(ctx: &Context, name: &str) -> Result<()> {
    let Some(manager) = ctx.get_component(name) else {
        bail!("No component named '{}'", name);
    };
    if manager.kind() != ComponentKind::ConnectionManager {
        bail!("'{}' is a {}, not a connection manager", name, manager.kind());
    }

    manager
        .connect(
            |manager| info!(manager = manager.name(), "connect succeeded"),
            |manager, err| error!(manager = manager.name(), %err, "connect failed"),
        )
        .with_context(|| format!("Failed to start connect on '{}'", name))?;
    info!(manager = name, "connect started");
    Ok(())
}
