//! External discovery tools and the data they produce.
//!
//! Provides the adapters the discovery engine drives:
//! - Subnet sweep (`nmap -sn`, XML output)
//! - Service advertisement browse (`avahi-browse`, parsable output)
//! - MAC OUI vendor directory (Wireshark `manuf` dataset)
//! - Tool availability and privilege checks

mod browse;
pub mod oui;
pub mod privileges;
mod sweep;

pub use browse::{browse_services, parse_browse_output, IPV4_MARKER};
pub use oui::{VendorDirectory, VendorEntry};
pub use privileges::ScanCapabilities;
pub use sweep::{parse_sweep_xml, sweep_subnet, Neighbor};

use crate::network::{self, InterfaceInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;

/// Category assigned to hosts no classification rule matched.
pub const UNKNOWN_DEVICE_TYPE: &str = "Unknown";

/// Discovery errors, split by how the engine reacts to them.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No active private-use IPv4 interface, so there is no subnet to sweep
    #[error("No private IPv4 interface found")]
    NoInterfaceFound,

    /// Neither the vendor cache nor the dataset download could be read
    #[error("Vendor data unavailable: {0}")]
    VendorDataUnavailable(String),

    /// The sweep tool failed or produced output that is not well-formed XML
    #[error("Subnet sweep failed: {0}")]
    SweepTool(String),

    /// The advertisement browser could not be run
    #[error("Service browse failed: {0}")]
    AdvertisementTool(String),

    /// A discovery cycle is already running against the host table
    #[error("A discovery cycle is already in progress")]
    CycleInProgress,

    /// An operator-supplied classification pattern does not compile
    #[error("Invalid classification rule '{pattern}': {reason}")]
    InvalidRule { pattern: String, reason: String },
}

impl DiscoveryError {
    /// Whether this error aborts a discovery cycle (as opposed to degrading it).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DiscoveryError::NoInterfaceFound
                | DiscoveryError::SweepTool(_)
                | DiscoveryError::CycleInProgress
        )
    }
}

/// One discovered network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// IPv4 dotted quad, unique within a table
    #[serde(rename = "ip")]
    pub address: String,
    /// Uppercase colon-delimited MAC, if the sweep could resolve it
    #[serde(rename = "mac")]
    pub hardware_address: Option<String>,
    /// Vendor from MAC OUI lookup
    pub vendor: Option<String>,
    /// Category inferred from advertised services
    #[serde(default = "unknown_device_type")]
    pub device_type: String,
}

fn unknown_device_type() -> String {
    UNKNOWN_DEVICE_TYPE.to_string()
}

impl Host {
    pub fn new(address: impl Into<String>, hardware_address: Option<String>) -> Self {
        Self {
            address: address.into(),
            hardware_address,
            vendor: None,
            device_type: unknown_device_type(),
        }
    }
}

/// One resolved service advertisement.
///
/// Fields follow the positional layout of the browser's parsable output; any field
/// past the end of a short line is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub record_type: Option<String>,
    pub interface_name: Option<String>,
    pub protocol_family: Option<String>,
    pub service_name: Option<String>,
    pub full_record_string: Option<String>,
    pub domain: Option<String>,
    pub hostname: Option<String>,
    pub address: Option<String>,
    pub port: Option<String>,
    pub attribute_string: Option<String>,
}

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Create a Command that hides the console window on Windows.
pub fn hidden_command(program: &str) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

/// Everything the engine needs from the outside world.
///
/// The system implementation shells out to real tools; tests substitute
/// in-memory data.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Active local IPv4 interfaces.
    async fn interfaces(&self) -> anyhow::Result<Vec<InterfaceInfo>>;

    /// Live neighbours on `subnet`, in tool output order.
    async fn sweep(&self, subnet: &str) -> Result<Vec<Neighbor>, DiscoveryError>;

    /// IPv4 service records, in tool output order.
    async fn browse(&self) -> Result<Vec<ServiceRecord>, DiscoveryError>;

    /// Vendor prefix table.
    async fn load_vendors(&self) -> Result<VendorDirectory, DiscoveryError>;
}

/// [`DiscoverySource`] backed by `nmap`, `avahi-browse` and the cached
/// vendor dataset.
#[derive(Debug, Clone)]
pub struct SystemSource {
    pub sweep_program: String,
    pub browse_program: String,
    pub vendor_cache: PathBuf,
    pub vendor_url: String,
}

#[async_trait]
impl DiscoverySource for SystemSource {
    async fn interfaces(&self) -> anyhow::Result<Vec<InterfaceInfo>> {
        network::list_interfaces().await
    }

    async fn sweep(&self, subnet: &str) -> Result<Vec<Neighbor>, DiscoveryError> {
        sweep_subnet(&self.sweep_program, subnet).await
    }

    async fn browse(&self) -> Result<Vec<ServiceRecord>, DiscoveryError> {
        browse_services(&self.browse_program).await
    }

    async fn load_vendors(&self) -> Result<VendorDirectory, DiscoveryError> {
        VendorDirectory::load(&self.vendor_cache, &self.vendor_url).await
    }
}
