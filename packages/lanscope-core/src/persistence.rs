//! Host table persistence.
//!
//! The merged table is written as a pretty-printed JSON array in the same shape
//! subscribers receive, so a restart can serve the last known table before the
//! first cycle completes.

use crate::scanner::Host;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "lanscope";
const HOSTS_FILE: &str = "hosts.json";
const VENDOR_CACHE_FILE: &str = "oui.txt";

/// Per-user data directory for lanscope.
pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .context("Could not find data directory")?;
    Ok(data_dir.join(APP_DIR))
}

/// Default location of the persisted host table
pub fn default_hosts_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(HOSTS_FILE))
}

/// Default location of the cached vendor dataset
pub fn default_vendor_cache_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(VENDOR_CACHE_FILE))
}

/// Load a persisted table. A missing file is an empty table.
pub fn load_hosts(path: &Path) -> Result<Vec<Host>> {
    if !path.exists() {
        tracing::debug!("No host table at {:?}", path);
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read host table {:?}", path))?;
    let hosts: Vec<Host> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse host table {:?}", path))?;

    tracing::debug!("Loaded {} hosts from {:?}", hosts.len(), path);
    Ok(hosts)
}

/// Overwrite the persisted table, creating the parent directory if needed.
pub fn save_hosts(path: &Path, hosts: &[Host]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let content = serde_json::to_string_pretty(hosts).context("Failed to serialize host table")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

    tracing::debug!("Saved {} hosts to {:?}", hosts.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let hosts = load_hosts(&tmp.path().join("absent.json")).unwrap();
        assert!(hosts.is_empty());
    }

    #[test]
    fn test_save_creates_parent_and_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("hosts.json");

        let mut printer = Host::new("192.168.1.30", Some("AA:BB:CC:00:00:30".to_string()));
        printer.vendor = Some("Brother".to_string());
        save_hosts(&path, &[Host::new("192.168.1.2", None), printer.clone()]).unwrap();
        assert_eq!(load_hosts(&path).unwrap().len(), 2);

        save_hosts(&path, &[printer.clone()]).unwrap();
        assert_eq!(load_hosts(&path).unwrap(), vec![printer]);
    }

    #[test]
    fn test_file_uses_wire_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hosts.json");
        save_hosts(&path, &[Host::new("10.0.0.1", None)]).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!([{
                "ip": "10.0.0.1",
                "mac": null,
                "vendor": null,
                "deviceType": "Unknown"
            }])
        );
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hosts.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_hosts(&path).is_err());
    }
}
