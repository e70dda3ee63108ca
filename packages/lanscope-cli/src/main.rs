//! lanscope CLI - LAN discovery daemon
//!
//! This binary can:
//! - Sweep the local subnet once and print the classified host table
//! - Run as a background daemon publishing the table over WebSocket
//! - Diagnose interfaces, tool availability and vendor lookups

mod daemon;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lanscope_core::config::{self, AgentConfig};
use lanscope_core::network;
use lanscope_core::persistence;
use lanscope_core::scanner::privileges;
use lanscope_core::{DiscoveryEngine, Hub, VendorDirectory};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lanscope")]
#[command(author = "lanscope contributors")]
#[command(version)]
#[command(about = "LAN discovery and device classification daemon")]
#[command(long_about = "
lanscope sweeps the local private subnet, looks up hardware vendors,
classifies devices from their mDNS/DNS-SD advertisements and publishes
the resulting host table to WebSocket subscribers.

Quick start:
  1. Check tools:     lanscope check
  2. Run a scan:      sudo lanscope scan
  3. Start daemon:    sudo lanscope daemon

Subscribers connect to ws://<host>:8181 and receive {\"type\":\"hosts\",...} events.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file (default: ~/.config/lanscope/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one discovery cycle and print the host table
    Scan,

    /// Publish the host table and rediscover periodically
    Daemon {
        /// Discovery interval in minutes (default from config, 5)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Publication address, e.g. 0.0.0.0:8181
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Show local interfaces and the selected vantage point
    Interfaces,

    /// Look up the vendor of a hardware address
    Vendor {
        /// MAC address, e.g. 00:1A:2B:3C:4D:5E
        mac: String,
    },

    /// Check that the discovery tools are available
    Check,

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    format!("lanscope={},lanscope_core={}", log_level, log_level).into()
                }),
        )
        .with_target(false)
        .init();

    let listen = match &cli.command {
        Commands::Daemon { listen, .. } => listen.clone(),
        _ => None,
    };
    let config = resolve_config(&cli, listen)?;

    match &cli.command {
        Commands::Scan => cmd_scan(&cli, &config).await,
        Commands::Daemon { interval, .. } => daemon::run_daemon(&config, *interval).await,
        Commands::Interfaces => cmd_interfaces(&cli).await,
        Commands::Vendor { mac } => cmd_vendor(&cli, &config, mac).await,
        Commands::Check => cmd_check(&cli, &config).await,
        Commands::Config => cmd_config(&cli, &config),
    }
}

fn resolve_config(cli: &Cli, listen: Option<String>) -> Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config(),
    };
    config.apply_overrides(listen);
    tracing::debug!("Configuration from {}", config.source);
    Ok(config)
}

/// Engine wired to the system tools and the configured host table file.
pub fn build_engine(config: &AgentConfig, hub: Arc<Hub>) -> Result<DiscoveryEngine> {
    let source = config.system_source()?;
    let rules = config.rule_set().context("Invalid [rules] configuration")?;
    Ok(DiscoveryEngine::new(Arc::new(source), rules, hub).with_store(config.hosts_path()?))
}

async fn cmd_scan(cli: &Cli, config: &AgentConfig) -> Result<()> {
    match cli.format {
        OutputFormat::Text => println!("Scanning network..."),
        OutputFormat::Json => {}
    }

    let engine = build_engine(config, Arc::new(Hub::new()))?;
    let report = engine.run_cycle().await?;
    let hosts = engine.snapshot();

    match cli.format {
        OutputFormat::Text => {
            println!();
            println!(
                "Found {} hosts on {} via {} ({:.1}s):",
                report.hosts,
                report.vantage.subnet,
                report.vantage.interface,
                report.elapsed.as_secs_f64()
            );
            println!();
            for host in hosts.iter() {
                let mac = host.hardware_address.as_deref().unwrap_or("-");
                let vendor = host.vendor.as_deref().unwrap_or("");
                println!("  {:15} {:17} {:10} {}", host.address, mac, host.device_type, vendor);
            }
            if report.classification_degraded {
                println!();
                println!("Service browse failed; device types are Unknown. Run 'lanscope check'.");
            }
            if report.vendors_degraded {
                println!("Vendor data unavailable; vendors are blank.");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "scanned_at": chrono::Local::now().to_rfc3339(),
                "vantage": report.vantage,
                "hosts": hosts.as_ref(),
                "service_records": report.services,
                "classification_degraded": report.classification_degraded,
                "vendors_degraded": report.vendors_degraded,
            }));
        }
    }

    Ok(())
}

async fn cmd_interfaces(cli: &Cli) -> Result<()> {
    let interfaces = network::list_interfaces().await?;
    let vantage = network::select_vantage_point(&interfaces);

    match cli.format {
        OutputFormat::Text => {
            println!("Interfaces:");
            for iface in &interfaces {
                println!(
                    "  {:10} {:18} {:17} {}",
                    iface.name,
                    iface.network.to_string(),
                    iface.mac.as_deref().unwrap_or("-"),
                    if network::is_private(iface.address()) { "private" } else { "" }
                );
            }
            println!();
            match &vantage {
                Ok(v) => println!(
                    "Vantage point: {} on {} (subnet {})",
                    v.address, v.interface, v.subnet
                ),
                Err(e) => println!("Vantage point: none ({})", e),
            }
        }
        OutputFormat::Json => {
            let list: Vec<_> = interfaces
                .iter()
                .map(|iface| serde_json::json!({
                    "name": iface.name,
                    "network": iface.network.to_string(),
                    "mac": iface.mac,
                    "loopback": iface.loopback,
                    "private": network::is_private(iface.address()),
                }))
                .collect();
            println!("{}", serde_json::json!({
                "interfaces": list,
                "vantage": vantage.as_ref().ok(),
            }));
        }
    }

    Ok(())
}

async fn cmd_vendor(cli: &Cli, config: &AgentConfig, mac: &str) -> Result<()> {
    let directory = VendorDirectory::load(&config.vendor_cache_path()?, &config.vendors.url).await?;
    let vendor = directory.lookup(mac);

    match cli.format {
        OutputFormat::Text => match &vendor {
            Some(name) => println!("{} {}", mac.to_uppercase(), name),
            None => println!("{} no matching vendor prefix", mac.to_uppercase()),
        },
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "mac": mac.to_uppercase(),
                "vendor": vendor,
                "prefixes": directory.len(),
            }));
        }
    }

    Ok(())
}

async fn cmd_check(cli: &Cli, config: &AgentConfig) -> Result<()> {
    let caps =
        privileges::detect_capabilities(&config.scan.sweep_program, &config.scan.browse_program)
            .await;

    match cli.format {
        OutputFormat::Text => {
            println!("Sweep tool:    {} ({})", config.scan.sweep_program, yes_no(caps.can_sweep));
            println!("Browse tool:   {} ({})", config.scan.browse_program, yes_no(caps.can_browse));
            println!("Elevated:      {}", yes_no(caps.is_elevated));
            println!();
            println!("{}", privileges::format_capabilities_message(&caps));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&caps)?);
        }
    }

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn cmd_config(cli: &Cli, config: &AgentConfig) -> Result<()> {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(config::get_config_file_path_string);
    let hosts_path = config.hosts_path().map(|p| p.display().to_string());
    let vendor_cache = config.vendor_cache_path().map(|p| p.display().to_string());
    let data_dir = persistence::data_dir().map(|p| p.display().to_string());

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {} (from {})", config_path, config.source);
            println!("Listen address:   {}", config.server.listen);
            println!("Scan interval:    {} minutes", config.scan.interval_minutes);
            println!("Sweep program:    {}", config.scan.sweep_program);
            println!("Browse program:   {}", config.scan.browse_program);
            println!("Host table:       {}", hosts_path.as_deref().unwrap_or("-"));
            println!("Vendor cache:     {}", vendor_cache.as_deref().unwrap_or("-"));
            println!("Vendor dataset:   {}", config.vendors.url);
            println!();
            println!("Environment variables:");
            println!("  LANSCOPE_LISTEN - Override listen address");
            println!("  RUST_LOG        - Override log filter");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "config_source": config.source.to_string(),
                "data_dir": data_dir.ok(),
                "hosts_file": hosts_path.ok(),
                "vendor_cache": vendor_cache.ok(),
                "settings": config,
            }));
        }
    }

    Ok(())
}
