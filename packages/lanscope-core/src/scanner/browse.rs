//! Service advertisement browsing using `avahi-browse`

use super::{hidden_command, DiscoveryError, ServiceRecord};
use std::time::Instant;

/// Protocol family field value of records that are kept.
pub const IPV4_MARKER: &str = "IPv4";

/// Number of `;`-separated fields in a fully resolved record.
const FIELD_COUNT: usize = 10;

/// Browse all advertised services once, resolving each, and return the IPv4 records.
pub async fn browse_services(program: &str) -> Result<Vec<ServiceRecord>, DiscoveryError> {
    let start = Instant::now();
    tracing::info!("Scanning for services using {}...", program);

    let output = hidden_command(program)
        .args(["--all", "--terminate", "--resolve", "--parsable"])
        .output()
        .await
        .map_err(|e| DiscoveryError::AdvertisementTool(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        // The browser still prints whatever it resolved before failing (for
        // instance when the daemon drops the connection), so keep it.
        tracing::warn!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let records = parse_browse_output(&String::from_utf8_lossy(&output.stdout));
    tracing::info!(
        "Service browse complete: {} IPv4 records in {:.1}s",
        records.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(records)
}

/// Parse `--parsable` output, one record per line.
///
/// Lines whose protocol family is not [`IPV4_MARKER`] are dropped, which also
/// drops blank and truncated lines. Lines shorter than a resolved record are
/// kept with the missing fields set to `None`. Semicolons past the ninth
/// separator stay inside the attribute string.
pub fn parse_browse_output(output: &str) -> Vec<ServiceRecord> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(FIELD_COUNT, ';').map(str::to_string);
            let record = ServiceRecord {
                record_type: parts.next(),
                interface_name: parts.next(),
                protocol_family: parts.next(),
                service_name: parts.next(),
                full_record_string: parts.next(),
                domain: parts.next(),
                hostname: parts.next(),
                address: parts.next(),
                port: parts.next(),
                attribute_string: parts.next(),
            };
            (record.protocol_family.as_deref() == Some(IPV4_MARKER)).then_some(record)
        })
        .collect()
}
