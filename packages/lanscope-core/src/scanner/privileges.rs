//! Privilege and tool availability detection for discovery
//!
//! The sweep tool only reports hardware addresses (and so vendors) when it can
//! send raw ARP requests, which needs root or CAP_NET_RAW on Linux. The browse tool
//! needs a running mDNS daemon but no special privileges.

use super::hidden_command;
use serde::{Deserialize, Serialize};

/// Scan mode indicating the level of access available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Sweep, hardware address resolution and service browse all available
    Full,
    /// Discovery runs but some enrichment will be missing
    Limited,
    /// The sweep tool is missing, every cycle will fail
    Unavailable,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Full => write!(f, "full"),
            ScanMode::Limited => write!(f, "limited"),
            ScanMode::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// What the current process can do with the configured tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCapabilities {
    pub mode: ScanMode,
    pub can_sweep: bool,
    pub can_browse: bool,
    pub can_resolve_mac: bool,
    pub is_elevated: bool,
    pub warning: Option<String>,
}

/// Check if the current process is running with elevated privileges
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Test whether `program` can be started at all.
pub async fn test_program(program: &str, version_arg: &str) -> bool {
    match hidden_command(program).arg(version_arg).output().await {
        Ok(output) => output.status.success(),
        Err(e) => {
            tracing::debug!("{} not runnable: {}", program, e);
            false
        }
    }
}

/// Detect discovery capabilities for the given tools
pub async fn detect_capabilities(sweep_program: &str, browse_program: &str) -> ScanCapabilities {
    let elevated = is_elevated();
    let (can_sweep, can_browse) = tokio::join!(
        test_program(sweep_program, "--version"),
        test_program(browse_program, "--version"),
    );
    let can_resolve_mac = can_sweep && elevated;

    let mode = if !can_sweep {
        ScanMode::Unavailable
    } else if can_browse && can_resolve_mac {
        ScanMode::Full
    } else {
        ScanMode::Limited
    };

    let warning = match mode {
        ScanMode::Full => None,
        ScanMode::Unavailable => Some(format!(
            "'{}' was not found. Install nmap to discover hosts.",
            sweep_program
        )),
        ScanMode::Limited => {
            let mut parts = Vec::new();
            if !can_resolve_mac {
                parts.push("not running as root: hardware addresses and vendors will be missing");
            }
            if !can_browse {
                parts.push("service browser not found: every device type will be Unknown");
            }
            Some(parts.join("; "))
        }
    };

    ScanCapabilities {
        mode,
        can_sweep,
        can_browse,
        can_resolve_mac,
        is_elevated: elevated,
        warning,
    }
}

/// Get platform-specific instructions for running with elevated privileges
pub fn get_elevation_instructions() -> String {
    #[cfg(target_os = "linux")]
    {
        "To resolve hardware addresses on Linux:\n\
         \n\
         Option 1 - Run as root:\n\
         $ sudo lanscope daemon\n\
         \n\
         Option 2 - Grant raw socket capabilities to nmap:\n\
         $ sudo setcap cap_net_raw,cap_net_admin+eip $(which nmap)\n\
         and run nmap with --privileged (set scan.sweep_program to a wrapper)."
            .to_string()
    }

    #[cfg(target_os = "macos")]
    {
        "To resolve hardware addresses on macOS, run as root:\n\
         $ sudo lanscope daemon"
            .to_string()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        "Elevated privileges may be required for hardware address resolution.\n\
         Please consult your operating system documentation."
            .to_string()
    }
}

/// Format a user-friendly message about current capabilities
pub fn format_capabilities_message(caps: &ScanCapabilities) -> String {
    if caps.mode == ScanMode::Full {
        return "Discovering with full capabilities".to_string();
    }

    let mut msg = format!("Discovering with {} capabilities:\n", caps.mode);
    if !caps.can_sweep {
        msg.push_str("  - Subnet sweep unavailable\n");
    }
    if !caps.can_resolve_mac {
        msg.push_str("  - Hardware address and vendor resolution unavailable\n");
    }
    if !caps.can_browse {
        msg.push_str("  - Service browse unavailable\n");
    }
    if caps.can_sweep && !caps.can_resolve_mac {
        msg.push('\n');
        msg.push_str(&get_elevation_instructions());
    }
    msg
}
