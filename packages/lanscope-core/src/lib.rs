//! lanscope core library
//!
//! This crate provides LAN discovery and device classification:
//! - Vantage point selection among private-use IPv4 interfaces
//! - Subnet sweep with MAC OUI vendor lookup
//! - Device classification from mDNS/DNS-SD service advertisements
//! - Publication of the host table to WebSocket subscribers
//!
//! # Example
//!
//! ```no_run
//! use lanscope_core::{config, DiscoveryEngine, Hub};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config();
//!     let hub = Arc::new(Hub::new());
//!     let engine = DiscoveryEngine::new(
//!         Arc::new(config.system_source()?),
//!         config.rule_set()?,
//!         hub,
//!     );
//!
//!     let report = engine.run_cycle().await?;
//!     println!("Found {} hosts", report.hosts);
//!     for host in engine.snapshot().iter() {
//!         println!("{} {}", host.address, host.device_type);
//!     }
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod config;
pub mod engine;
pub mod network;
pub mod persistence;
pub mod publish;
pub mod scanner;

// Re-export commonly used types
pub use classify::{classify, Rule, RuleDef, RuleKind, RuleSet, RulesConfig};
pub use config::{AgentConfig, ConfigSource};
pub use engine::{CycleReport, DiscoveryEngine, EngineState};
pub use network::{is_in_range, InterfaceInfo, VantagePoint};
pub use publish::{Event, Hub, HOSTS_EVENT};
pub use scanner::{
    DiscoveryError, DiscoverySource, Host, ScanCapabilities, ServiceRecord, SystemSource,
    VendorDirectory,
};
