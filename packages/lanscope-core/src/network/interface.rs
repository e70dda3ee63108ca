//! Local interface enumeration and vantage point selection.

use super::range::is_private;
use crate::scanner::{hidden_command, DiscoveryError};
use anyhow::{Context, Result};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// One IPv4 address bound to a local interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    /// Interface address together with its prefix length.
    pub network: Ipv4Network,
    pub mac: Option<String>,
    pub loopback: bool,
    pub up: bool,
}

impl InterfaceInfo {
    pub fn address(&self) -> Ipv4Addr {
        self.network.ip()
    }
}

/// The local machine's own position on the network, used as the sweep base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VantagePoint {
    pub interface: String,
    pub address: Ipv4Addr,
    pub hardware_address: Option<String>,
    /// Network address and prefix, e.g. `192.168.1.0/24`
    pub subnet: String,
}

/// Pick the first active, non-loopback interface whose address is private.
pub fn select_vantage_point(interfaces: &[InterfaceInfo]) -> Result<VantagePoint, DiscoveryError> {
    let iface = interfaces
        .iter()
        .filter(|i| i.up && !i.loopback)
        .find(|i| is_private(i.address()))
        .ok_or(DiscoveryError::NoInterfaceFound)?;

    let subnet = format!("{}/{}", iface.network.network(), iface.network.prefix());
    tracing::debug!(
        "Vantage point: {} on {} (subnet {})",
        iface.address(),
        iface.name,
        subnet
    );

    Ok(VantagePoint {
        interface: iface.name.clone(),
        address: iface.address(),
        hardware_address: iface.mac.as_ref().map(|m| m.to_uppercase()),
        subnet,
    })
}

/// Enumerate active IPv4 interfaces using the platform's own tools.
pub async fn list_interfaces() -> Result<Vec<InterfaceInfo>> {
    #[cfg(target_os = "linux")]
    {
        list_interfaces_linux().await
    }

    #[cfg(target_os = "macos")]
    {
        list_interfaces_macos().await
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        tracing::warn!("Interface enumeration is not supported on this platform");
        Ok(Vec::new())
    }
}

#[cfg(target_os = "linux")]
async fn list_interfaces_linux() -> Result<Vec<InterfaceInfo>> {
    let output = hidden_command("ip")
        .args(["-o", "-4", "addr", "show", "up"])
        .output()
        .await
        .context("Failed to run ip addr command")?;

    if !output.status.success() {
        anyhow::bail!("ip addr exited with {}", output.status);
    }

    let mut interfaces = parse_ip_addr(&String::from_utf8_lossy(&output.stdout));
    for iface in interfaces.iter_mut() {
        let path = format!("/sys/class/net/{}/address", iface.name);
        iface.mac = tokio::fs::read_to_string(&path)
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }

    Ok(interfaces)
}

#[cfg(target_os = "macos")]
async fn list_interfaces_macos() -> Result<Vec<InterfaceInfo>> {
    let output = hidden_command("ifconfig")
        .output()
        .await
        .context("Failed to run ifconfig command")?;

    Ok(parse_ifconfig(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `ip -o -4 addr show up` output. Hardware addresses are filled in later.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_ip_addr(output: &str) -> Vec<InterfaceInfo> {
    let mut interfaces = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(inet_pos) = parts.iter().position(|&p| p == "inet") else {
            continue;
        };
        let (Some(name), Some(cidr)) = (parts.get(1), parts.get(inet_pos + 1)) else {
            continue;
        };
        let Ok(network) = cidr.parse::<Ipv4Network>() else {
            continue;
        };

        // veth pairs show up as "veth0@if5"
        let name = name.split('@').next().unwrap_or_default().to_string();
        interfaces.push(InterfaceInfo {
            loopback: name == "lo" || network.ip().is_loopback(),
            name,
            network,
            mac: None,
            up: true,
        });
    }

    interfaces
}

/// Parse BSD-style `ifconfig` output.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn parse_ifconfig(output: &str) -> Vec<InterfaceInfo> {
    struct Block {
        name: String,
        up: bool,
        loopback: bool,
        mac: Option<String>,
        networks: Vec<Ipv4Network>,
    }

    fn flush(block: Option<Block>, out: &mut Vec<InterfaceInfo>) {
        if let Some(b) = block {
            for network in b.networks {
                out.push(InterfaceInfo {
                    name: b.name.clone(),
                    network,
                    mac: b.mac.clone(),
                    loopback: b.loopback || network.ip().is_loopback(),
                    up: b.up,
                });
            }
        }
    }

    let mut interfaces = Vec::new();
    let mut current: Option<Block> = None;

    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) && line.contains(": flags=") {
            flush(current.take(), &mut interfaces);
            let name = line.split(':').next().unwrap_or_default().to_string();
            let flags = line
                .split_once('<')
                .and_then(|(_, rest)| rest.split_once('>'))
                .map(|(flags, _)| flags)
                .unwrap_or_default();
            current = Some(Block {
                name,
                up: flags.split(',').any(|f| f == "UP"),
                loopback: flags.split(',').any(|f| f == "LOOPBACK"),
                mac: None,
                networks: Vec::new(),
            });
            continue;
        }

        let Some(block) = current.as_mut() else {
            continue;
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.first() {
            Some(&"ether") => block.mac = parts.get(1).map(|s| s.to_string()),
            Some(&"inet") => {
                let ip = parts.get(1).and_then(|s| s.parse::<Ipv4Addr>().ok());
                let prefix = parts
                    .iter()
                    .position(|&p| p == "netmask")
                    .and_then(|i| parts.get(i + 1))
                    .and_then(|m| u32::from_str_radix(m.trim_start_matches("0x"), 16).ok())
                    .map(|mask| mask.count_ones() as u8);
                if let (Some(ip), Some(prefix)) = (ip, prefix) {
                    if let Ok(network) = Ipv4Network::new(ip, prefix) {
                        block.networks.push(network);
                    }
                }
            }
            _ => {}
        }
    }
    flush(current, &mut interfaces);

    interfaces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, cidr: &str, loopback: bool) -> InterfaceInfo {
        InterfaceInfo {
            name: name.to_string(),
            network: cidr.parse().unwrap(),
            mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
            loopback,
            up: true,
        }
    }

    #[test]
    fn test_select_prefers_private_interface() {
        let interfaces = vec![
            iface("lo", "127.0.0.1/8", true),
            iface("wan0", "203.0.113.7/24", false),
            iface("eth0", "192.168.1.50/24", false),
        ];

        let vp = select_vantage_point(&interfaces).unwrap();
        assert_eq!(vp.address, Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(vp.interface, "eth0");
        assert_eq!(vp.subnet, "192.168.1.0/24");
        assert_eq!(vp.hardware_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_select_fails_without_private_interface() {
        let interfaces = vec![
            iface("lo", "127.0.0.1/8", true),
            iface("wan0", "203.0.113.7/24", false),
        ];

        assert!(matches!(
            select_vantage_point(&interfaces),
            Err(DiscoveryError::NoInterfaceFound)
        ));
        assert!(matches!(
            select_vantage_point(&[]),
            Err(DiscoveryError::NoInterfaceFound)
        ));
    }

    #[test]
    fn test_select_skips_down_interfaces() {
        let mut down = iface("eth1", "10.0.0.2/8", false);
        down.up = false;
        let interfaces = vec![down, iface("wlan0", "172.16.4.9/20", false)];

        let vp = select_vantage_point(&interfaces).unwrap();
        assert_eq!(vp.interface, "wlan0");
        assert_eq!(vp.subnet, "172.16.0.0/20");
    }

    #[test]
    fn test_parse_ip_addr() {
        let output = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: eth0    inet 192.168.1.50/24 brd 192.168.1.255 scope global dynamic eth0\\       valid_lft 86000sec preferred_lft 86000sec
5: veth1@if4    inet 10.2.0.1/16 scope global veth1\\       valid_lft forever preferred_lft forever
";
        let interfaces = parse_ip_addr(output);
        assert_eq!(interfaces.len(), 3);
        assert!(interfaces[0].loopback);
        assert_eq!(interfaces[1].name, "eth0");
        assert_eq!(interfaces[1].address(), Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(interfaces[1].network.prefix(), 24);
        assert_eq!(interfaces[2].name, "veth1");
    }

    #[test]
    fn test_parse_ifconfig() {
        let output = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\tinet 127.0.0.1 netmask 0xff000000
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether a4:83:e7:12:34:56
\tinet 192.168.1.23 netmask 0xffffff00 broadcast 192.168.1.255
\tstatus: active
en1: flags=8822<BROADCAST,SMART,SIMPLEX,MULTICAST> mtu 1500
\tether a4:83:e7:00:00:01
";
        let interfaces = parse_ifconfig(output);
        assert_eq!(interfaces.len(), 2);
        assert!(interfaces[0].loopback);
        assert_eq!(interfaces[1].name, "en0");
        assert_eq!(interfaces[1].network.prefix(), 24);
        assert_eq!(interfaces[1].mac.as_deref(), Some("a4:83:e7:12:34:56"));

        let vp = select_vantage_point(&interfaces).unwrap();
        assert_eq!(vp.subnet, "192.168.1.0/24");
    }
}
