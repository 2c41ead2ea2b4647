use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use printwatch_core::{
    entities, Assembler, CacheStore, Coordinator, CoordinatorConfig, Credentials, DeviceConfig, DeviceIdentity,
    FleetConfig, JsonFileStore, Registry, ReplayClient, Snapshot, SnapshotStore, WebInterfaceProbe,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod viewer;

type Device = Coordinator<ReplayClient, JsonFileStore>;

#[derive(Debug, Parser)]
#[command(name = "printwatchd")]
#[command(about = "Network printer monitor with offline cache fallback (read-only)")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Single device to monitor; ignored when --config is given.
    #[arg(long, global = true)]
    host: Option<String>,

    #[arg(long, global = true, default_value_t = printwatch_core::config::DEFAULT_PORT)]
    port: u16,

    #[arg(long, global = true, default_value = "public")]
    community: String,

    /// Device dump answered by the replay client.
    #[arg(long, global = true)]
    dump: Option<PathBuf>,

    /// Fleet config (JSON) listing every device.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    interval_secs: Option<u64>,

    #[arg(long, global = true, default_value_t = 10_000)]
    query_timeout_ms: u64,

    #[arg(long, global = true)]
    no_web_probe: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one refresh cycle and print the result.
    Once {
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    Run {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    Watch {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    View,
    /// Print the persisted snapshot without contacting the device.
    Cache,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Ndjson,
    Entities,
}

struct Setup {
    devices: Vec<DeviceConfig>,
    cache_dir: PathBuf,
    base: CoordinatorConfig,
}

impl Cli {
    fn setup(&self) -> Result<Setup> {
        let mut base = CoordinatorConfig {
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            probe_web_interface: !self.no_web_probe,
            ..CoordinatorConfig::default()
        };
        if let Some(secs) = self.interval_secs {
            base.update_interval = Duration::from_secs(secs);
        }

        let (devices, config_cache_dir) = match &self.config {
            Some(path) => {
                let fleet = FleetConfig::load(path)?;
                (fleet.devices, fleet.cache_dir)
            }
            None => {
                let Some(host) = &self.host else {
                    bail!("either --host or --config is required");
                };
                let mut device = DeviceConfig::new(host.clone());
                device.port = self.port;
                device.credentials = Credentials::V2c {
                    community: self.community.clone(),
                };
                device.dump = self.dump.clone();
                device.validate()?;
                (vec![device], None)
            }
        };
        if devices.is_empty() {
            bail!("no devices configured");
        }

        let cache_dir = self
            .cache_dir
            .clone()
            .or(config_cache_dir)
            .unwrap_or_else(|| PathBuf::from("./data/cache"));

        Ok(Setup {
            devices,
            cache_dir,
            base,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let setup = cli.setup()?;
    let probe = if cli.no_web_probe {
        None
    } else {
        Some(WebInterfaceProbe::new().context("failed to build web interface probe")?)
    };

    match cli.command {
        Command::Once { format } => {
            let device = &setup.devices[0];
            let coordinator = build_coordinator(device, &setup, probe).await?;
            let snapshot = coordinator
                .initial_refresh()
                .await
                .with_context(|| format!("refresh of {} failed", coordinator.identity()))?;
            print_snapshot(device, &snapshot, format)?;
        }
        Command::Run { format } | Command::Watch { format } => {
            stream_loop(&setup, probe, format).await?;
        }
        Command::View => {
            let device = &setup.devices[0];
            let coordinator = build_coordinator(device, &setup, probe).await?;
            // A failed first cycle is logged; the dashboard waits for data.
            let _ = coordinator.initial_refresh().await;
            let handle = coordinator.spawn();
            let result = viewer::run_viewer(&coordinator, &device.host).await;
            handle.shutdown().await;
            result?;
        }
        Command::Cache => {
            for device in &setup.devices {
                let store = JsonFileStore::new(&setup.cache_dir, &device.device_identity());
                match store.read().await? {
                    Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                    None => println!("no cached snapshot for {} at {}", device.device_identity(), store.path().display()),
                }
            }
        }
    }

    Ok(())
}

async fn build_coordinator(device: &DeviceConfig, setup: &Setup, probe: Option<WebInterfaceProbe>) -> Result<Device> {
    let Some(dump) = &device.dump else {
        bail!("device {} has no dump configured", device.device_identity());
    };
    let identity = device.device_identity();
    let config = device.coordinator_config(&setup.base);

    let client = ReplayClient::new(dump.clone(), device.credentials.clone());
    let mut assembler = Assembler::new(client, device.host.clone(), config.query_timeout);
    if let (true, Some(probe)) = (config.probe_web_interface, probe) {
        assembler = assembler.with_web_probe(probe);
    }

    let store = JsonFileStore::new(&setup.cache_dir, &identity);
    let cache = CacheStore::new(store, identity, config.store_timeout);
    Ok(Coordinator::new(assembler, cache, config).await)
}

async fn stream_loop(setup: &Setup, probe: Option<WebInterfaceProbe>, format: OutputFormat) -> Result<()> {
    let registry = Registry::new();
    let (tx, mut rx) = mpsc::channel::<(usize, Arc<Snapshot>)>(16);

    for (idx, device) in setup.devices.iter().enumerate() {
        let coordinator = registry
            .add_device(build_coordinator(device, setup, probe.clone()).await?)
            .await?;

        let mut published = coordinator.subscribe();
        let tx = tx.clone();
        tokio::spawn(async move {
            // The first cycle already ran; emit its snapshot before waiting.
            loop {
                let current = published.borrow_and_update().clone();
                if let Some(snapshot) = current {
                    if tx.send((idx, snapshot)).await.is_err() {
                        break;
                    }
                }
                if published.changed().await.is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);
    info!(devices = setup.devices.len(), "monitoring started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping");
                break;
            }
            next = rx.recv() => {
                let Some((idx, snapshot)) = next else { break };
                print_snapshot(&setup.devices[idx], &snapshot, format)?;
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}

fn print_snapshot(device: &DeviceConfig, snapshot: &Snapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(snapshot)?);
        }
        OutputFormat::Ndjson => {
            let line = serde_json::json!({
                "device": device.device_identity(),
                "ts": chrono::Utc::now().to_rfc3339(),
                "snapshot": snapshot,
            });
            println!("{}", serde_json::to_string(&line)?);
        }
        OutputFormat::Entities => {
            let out = serde_json::json!({
                "device": DeviceIdentity::from_snapshot(snapshot, &device.host),
                "entities": entities(snapshot, &device.host),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Human => print_human(device, snapshot),
    }
    Ok(())
}

fn print_human(device: &DeviceConfig, snapshot: &Snapshot) {
    let data = snapshot.data();
    let identity = DeviceIdentity::from_snapshot(snapshot, &device.host);

    println!("=== Printer Snapshot ===");
    println!("Device:     {} ({} {})", device.device_identity(), identity.manufacturer, identity.model);
    match snapshot.offline_since() {
        Some(since) => println!("State:      offline, cached data from {}", since.to_rfc3339()),
        None => println!("State:      {}", data.status.state.as_str()),
    }
    if let Some(total) = data.page_count.total {
        println!("Pages:      {total}");
    }
    println!("Cover:      {}", data.cover_status.state.as_str());
    println!("Display:    {}", data.display_text.as_deref().unwrap_or("unknown"));
    println!("Errors:     {}", data.errors.as_deref().unwrap_or("none"));

    if !data.supplies.is_empty() {
        println!("Supplies:");
        for supply in &data.supplies {
            println!("  {:<32} {}", supply.description, percent(supply.percentage));
        }
    }
    if !data.input_trays.is_empty() {
        println!("Trays:");
        for tray in &data.input_trays {
            println!(
                "  {:<32} {} {}",
                tray.description,
                percent(tray.percentage),
                tray.media_name.as_deref().unwrap_or("")
            );
        }
    }
    if let Some(url) = identity.configuration_url {
        println!("Web UI:     {url}");
    }
}

fn percent(value: Option<u8>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:>3}%"))
}
