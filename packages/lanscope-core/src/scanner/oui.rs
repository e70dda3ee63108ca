//! MAC OUI (Organizationally Unique Identifier) vendor lookup
//!
//! Uses the Wireshark `manuf` dataset, downloaded once and cached verbatim on
//! disk. The cache never expires; delete the file to force a refresh.

use super::DiscoveryError;
use std::path::Path;

/// Default source of the vendor prefix dataset.
pub const DEFAULT_VENDOR_URL: &str = "https://www.wireshark.org/download/automated/data/manuf";

/// A hardware-address prefix and the vendor it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorEntry {
    /// Uppercase colon-delimited prefix, e.g. `00:1A:2B`
    pub prefix: String,
    /// First word of the registered organization name, if the line has one
    pub vendor: Option<String>,
}

/// Prefix table in dataset file order.
#[derive(Debug, Clone, Default)]
pub struct VendorDirectory {
    entries: Vec<VendorEntry>,
}

impl VendorDirectory {
    pub fn new(entries: Vec<VendorEntry>) -> Self {
        Self { entries }
    }

    /// Load from `cache_path`, downloading from `url` first if the cache is
    /// missing or holds no prefixes.
    pub async fn load(cache_path: &Path, url: &str) -> Result<Self, DiscoveryError> {
        let cache_problem = match tokio::fs::read_to_string(cache_path).await {
            Ok(text) => {
                let directory = Self::parse(&text);
                if !directory.is_empty() {
                    tracing::info!(
                        "Vendor directory ready: {} prefixes from {:?}",
                        directory.len(),
                        cache_path
                    );
                    return Ok(directory);
                }
                "no vendor prefixes in cache".to_string()
            }
            Err(e) => e.to_string(),
        };

        tracing::info!(
            "Vendor cache {:?} unusable ({}), downloading {}",
            cache_path,
            cache_problem,
            url
        );
        let text = fetch_dataset(url).await.map_err(|e| {
            DiscoveryError::VendorDataUnavailable(format!(
                "cache unusable ({cache_problem}) and download failed ({e})"
            ))
        })?;

        let directory = Self::parse(&text);
        if directory.is_empty() {
            return Err(DiscoveryError::VendorDataUnavailable(format!(
                "no vendor prefixes in dataset from {url}"
            )));
        }
        if let Err(e) = write_cache(cache_path, &text).await {
            tracing::warn!("Failed to write vendor cache {:?}: {}", cache_path, e);
        }

        tracing::info!("Vendor directory ready: {} prefixes", directory.len());
        Ok(directory)
    }

    /// Parse `manuf` text: `prefix<TAB>short name<TAB>full name` per line.
    ///
    /// Comment and blank lines are skipped. A line without a full name column
    /// still claims its prefix, with no vendor.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.split('\t').map(str::trim);
                let prefix = fields.next().filter(|p| !p.is_empty())?;
                let vendor = fields
                    .nth(1)
                    .and_then(|full| full.split_whitespace().next())
                    .map(str::to_string);
                Some(VendorEntry {
                    prefix: prefix.to_uppercase(),
                    vendor,
                })
            })
            .collect();

        Self { entries }
    }

    /// Vendor of the first entry (in file order) whose prefix starts `mac`.
    ///
    /// Matching is case-insensitive. There is no longest-prefix preference, and
    /// a matching entry without a vendor ends the search.
    pub fn lookup(&self, mac: &str) -> Option<String> {
        let mac = mac.to_uppercase();
        let found = self
            .entries
            .iter()
            .find(|entry| mac.starts_with(&entry.prefix))
            .and_then(|entry| entry.vendor.clone());

        match &found {
            Some(vendor) => tracing::debug!("OUI lookup for {}: {}", mac, vendor),
            None => tracing::debug!("OUI lookup for {}: not found", mac),
        }
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn fetch_dataset(url: &str) -> reqwest::Result<String> {
    reqwest::get(url).await?.error_for_status()?.text().await
}

/// Write through a sibling temp file so an interrupted write never leaves a
/// truncated cache behind.
async fn write_cache(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = path.with_extension("partial");
    tokio::fs::write(&partial, text).await?;
    tokio::fs::rename(&partial, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# This file is generated
#
AC:DE:48\tVendor1\tVendor1 Inc
AC:DE:49\tVendor2\tVendor2
AC:DE\tWide\tWide Prefix Corp
00:1B:C5\tShortOnly
";

    #[test]
    fn test_parse_skips_comments_keeps_short_lines() {
        let dir = VendorDirectory::parse(SAMPLE);
        assert_eq!(dir.len(), 4);
        assert!(VendorDirectory::parse("# only comments\n\n").is_empty());
    }

    #[test]
    fn test_entry_without_vendor_stops_search() {
        let dir = VendorDirectory::parse("00:1B:C5\tShortOnly\n00:1B\tWide\tWide Prefix Corp\n");
        assert_eq!(dir.lookup("00:1B:C5:00:00:01"), None);
        assert_eq!(dir.lookup("00:1B:C6:00:00:01").as_deref(), Some("Wide"));
    }

    #[test]
    fn test_lookup_first_word_case_insensitive() {
        let dir = VendorDirectory::new(vec![
            VendorEntry {
                prefix: "AC:DE:48".to_string(),
                vendor: Some("Vendor1".to_string()),
            },
            VendorEntry {
                prefix: "AC:DE:49".to_string(),
                vendor: Some("Vendor2".to_string()),
            },
        ]);
        assert_eq!(dir.lookup("ac:de:48:00:00:01").as_deref(), Some("Vendor1"));

        let parsed = VendorDirectory::parse(SAMPLE);
        assert_eq!(parsed.lookup("ac:de:48:00:00:01").as_deref(), Some("Vendor1"));
        assert_eq!(parsed.lookup("AC:DE:49:12:34:56").as_deref(), Some("Vendor2"));
    }

    #[test]
    fn test_lookup_first_match_in_file_order_wins() {
        // The wider AC:DE prefix comes after the AC:DE:48 entry, so it only
        // catches what the earlier entries did not.
        let dir = VendorDirectory::parse(SAMPLE);
        assert_eq!(dir.lookup("AC:DE:48:00:00:01").as_deref(), Some("Vendor1"));
        assert_eq!(dir.lookup("AC:DE:50:00:00:01").as_deref(), Some("Wide"));

        let reversed =
            VendorDirectory::parse("AC:DE\tWide\tWide Prefix Corp\nAC:DE:48\tV1\tVendor1 Inc\n");
        assert_eq!(reversed.lookup("AC:DE:48:00:00:01").as_deref(), Some("Wide"));
    }

    #[test]
    fn test_lookup_unknown() {
        let dir = VendorDirectory::parse(SAMPLE);
        assert_eq!(dir.lookup("FF:FF:FF:00:00:00"), None);
        assert_eq!(VendorDirectory::default().lookup("AC:DE:48:00:00:01"), None);
    }

    #[tokio::test]
    async fn test_load_prefers_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("oui.txt");
        std::fs::write(&cache, SAMPLE).unwrap();

        // Unroutable URL: the load must not need it.
        let dir = VendorDirectory::load(&cache, "http://127.0.0.1:9/manuf")
            .await
            .unwrap();
        assert_eq!(dir.len(), 4);
    }

    #[tokio::test]
    async fn test_load_fails_without_cache_or_network() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("missing.txt");

        let result = VendorDirectory::load(&cache, "http://127.0.0.1:9/manuf").await;
        assert!(matches!(
            result,
            Err(DiscoveryError::VendorDataUnavailable(_))
        ));
        assert!(!cache.exists());
    }

    #[tokio::test]
    async fn test_empty_cache_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("oui.txt");
        std::fs::write(&cache, "").unwrap();

        // The empty file is not trusted, so the unreachable download is tried.
        let result = VendorDirectory::load(&cache, "http://127.0.0.1:9/manuf").await;
        assert!(matches!(
            result,
            Err(DiscoveryError::VendorDataUnavailable(_))
        ));
    }

    /// Serve `body` to the first HTTP request on a local port.
    async fn serve_once(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        format!("http://{}/manuf", addr)
    }

    #[tokio::test]
    async fn test_empty_cache_is_refetched_and_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("oui.txt");
        std::fs::write(&cache, "# truncated\n").unwrap();

        let url = serve_once(SAMPLE).await;
        let dir = VendorDirectory::load(&cache, &url).await.unwrap();
        assert_eq!(dir.lookup("AC:DE:48:00:00:01").as_deref(), Some("Vendor1"));

        assert_eq!(std::fs::read_to_string(&cache).unwrap(), SAMPLE);
        assert!(!cache.with_extension("partial").exists());
    }
}
