//! Ping sweep using `nmap -sn` with XML output

use super::{hidden_command, DiscoveryError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::time::Instant;

/// A live host reported by the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub address: String,
    pub hardware_address: Option<String>,
}

/// Sweep `subnet` (CIDR) for live hosts. No port scan is performed.
pub async fn sweep_subnet(program: &str, subnet: &str) -> Result<Vec<Neighbor>, DiscoveryError> {
    let start = Instant::now();
    tracing::info!("Scanning {} using {}...", subnet, program);

    let output = hidden_command(program)
        .args(["-sn", subnet, "-oX", "-"])
        .output()
        .await
        .map_err(|e| DiscoveryError::SweepTool(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DiscoveryError::SweepTool(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    let neighbors = parse_sweep_xml(&String::from_utf8_lossy(&output.stdout))?;
    tracing::info!(
        "Sweep complete: {} responding hosts in {:.1}s",
        neighbors.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(neighbors)
}

/// Parse sweep XML into neighbours, in document order.
///
/// The root element may hold any number of `<host>` elements, each with any
/// number of `<address addr=".." addrtype="ipv4|mac"/>` children. Hosts without
/// an IPv4 address are dropped. Output that is not a single well-formed element
/// tree is an error.
pub fn parse_sweep_xml(xml: &str) -> Result<Vec<Neighbor>, DiscoveryError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut neighbors = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    // (ipv4, mac) of the <host> currently open
    let mut current: Option<(Option<String>, Option<String>)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if depth == 0 {
                    if saw_root {
                        return Err(malformed("multiple root elements"));
                    }
                    saw_root = true;
                }
                depth += 1;
                match e.name().as_ref() {
                    b"host" => current = Some((None, None)),
                    b"address" => record_address(&e, current.as_mut())?,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if depth == 0 {
                    if saw_root {
                        return Err(malformed("multiple root elements"));
                    }
                    saw_root = true;
                }
                if e.name().as_ref() == b"address" {
                    record_address(&e, current.as_mut())?;
                }
            }
            Ok(Event::End(e)) => {
                depth = depth.saturating_sub(1);
                if e.name().as_ref() == b"host" {
                    if let Some((Some(address), hardware_address)) = current.take() {
                        neighbors.push(Neighbor {
                            address,
                            hardware_address,
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(malformed(&format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }

    if !saw_root {
        return Err(malformed("no root element"));
    }
    if depth != 0 {
        return Err(malformed("unexpected end of document"));
    }

    Ok(neighbors)
}

fn record_address(
    element: &BytesStart<'_>,
    host: Option<&mut (Option<String>, Option<String>)>,
) -> Result<(), DiscoveryError> {
    let Some((ipv4, mac)) = host else {
        return Ok(());
    };

    let mut addr = None;
    let mut addrtype = None;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| malformed(&format!("bad attribute: {e}")))?;
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(&format!("bad attribute value: {e}")))?
            .into_owned();
        match attr.key.as_ref() {
            b"addr" => addr = Some(value),
            b"addrtype" => addrtype = Some(value),
            _ => {}
        }
    }

    match addrtype.as_deref() {
        Some("ipv4") if ipv4.is_none() => *ipv4 = addr,
        Some("mac") if mac.is_none() => *mac = addr,
        _ => {}
    }
    Ok(())
}

fn malformed(detail: &str) -> DiscoveryError {
    DiscoveryError::SweepTool(format!("unparsable sweep output: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NMAP_OUTPUT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<?xml-stylesheet href="file:///usr/bin/../share/nmap/nmap.xsl" type="text/xsl"?>
<!-- Nmap 7.94 scan initiated as: nmap -sn -oX - 192.168.1.0/24 -->
<nmaprun scanner="nmap" args="nmap -sn -oX - 192.168.1.0/24" version="7.94">
<verbose level="0"/>
<host><status state="up" reason="arp-response" reason_ttl="0"/>
<address addr="192.168.1.1" addrtype="ipv4"/>
<address addr="F0:9F:C2:11:22:33" addrtype="mac" vendor="Ubiquiti Networks"/>
<hostnames>
</hostnames>
<times srtt="1520" rttvar="5000" to="100000"/>
</host>
<host><status state="up" reason="localhost-response" reason_ttl="0"/>
<address addr="192.168.1.50" addrtype="ipv4"/>
<hostnames>
</hostnames>
</host>
<host><status state="up" reason="arp-response" reason_ttl="0"/>
<address addr="AA:BB:CC:DD:EE:FF" addrtype="mac"/>
</host>
<runstats><finished time="1700000000" elapsed="2.10"/><hosts up="3" down="253" total="256"/>
</runstats>
</nmaprun>
"#;

    #[test]
    fn test_parse_nmap_output() {
        let neighbors = parse_sweep_xml(NMAP_OUTPUT).unwrap();
        assert_eq!(
            neighbors,
            vec![
                Neighbor {
                    address: "192.168.1.1".to_string(),
                    hardware_address: Some("F0:9F:C2:11:22:33".to_string()),
                },
                Neighbor {
                    address: "192.168.1.50".to_string(),
                    hardware_address: None,
                },
            ]
        );
    }

    #[test]
    fn test_parse_root_without_hosts() {
        let neighbors = parse_sweep_xml(r#"<nmaprun scanner="nmap"></nmaprun>"#).unwrap();
        assert!(neighbors.is_empty());

        let neighbors = parse_sweep_xml(r#"<nmaprun/>"#).unwrap();
        assert!(neighbors.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_output() {
        assert!(matches!(
            parse_sweep_xml(""),
            Err(DiscoveryError::SweepTool(_))
        ));
        assert!(matches!(
            parse_sweep_xml("Starting Nmap 7.94"),
            Err(DiscoveryError::SweepTool(_))
        ));
        assert!(matches!(
            parse_sweep_xml("<nmaprun><host><address addr=\"10.0.0.1\" addrtype=\"ipv4\"/>"),
            Err(DiscoveryError::SweepTool(_))
        ));
        assert!(matches!(
            parse_sweep_xml("<nmaprun><host></nmaprun>"),
            Err(DiscoveryError::SweepTool(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_sweep_error() {
        let result = sweep_subnet("lanscope-no-such-sweeper", "10.0.0.0/24").await;
        assert!(matches!(result, Err(DiscoveryError::SweepTool(_))));
    }

    #[cfg(unix)]
    const ECHO_ONE_HOST: &str =
        "echo '<nmaprun><host><address addr=\"10.0.0.7\" addrtype=\"ipv4\"/></host></nmaprun>'";

    /// Write an executable shell script that stands in for an external tool.
    #[cfg(unix)]
    fn fake_tool(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tool.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_sweep_error() {
        let result = sweep_subnet("false", "10.0.0.0/24").await;
        assert!(matches!(result, Err(DiscoveryError::SweepTool(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_discards_partial_output() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            tmp.path(),
            &format!("{ECHO_ONE_HOST}\necho 'requires root privileges' >&2\nexit 1"),
        );
        match sweep_subnet(&tool, "10.0.0.0/24").await {
            Err(DiscoveryError::SweepTool(message)) => {
                assert!(message.contains("requires root privileges"));
            }
            other => panic!("expected sweep error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_is_parsed() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            tmp.path(),
            ECHO_ONE_HOST,
        );
        let neighbors = sweep_subnet(&tool, "10.0.0.0/24").await.unwrap();
        assert_eq!(
            neighbors,
            vec![Neighbor {
                address: "10.0.0.7".to_string(),
                hardware_address: None,
            }]
        );
    }
}
