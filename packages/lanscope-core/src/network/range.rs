//! IPv4 range tests.
//!
//! Ranges are inclusive and compared octet by octet from the most significant
//! octet down, which is the ordinary big-endian numeric comparison. This is not a
//! CIDR mask test: `[10.0.0.0, 10.255.255.255]` and `[172.16.0.0, 172.31.255.255]`
//! just happen to line up with prefixes.

use std::net::Ipv4Addr;

/// Reserved private-use ranges, in the order they are tried.
pub const PRIVATE_RANGES: [(Ipv4Addr, Ipv4Addr); 3] = [
    (Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 255, 255, 255)),
    (Ipv4Addr::new(172, 16, 0, 0), Ipv4Addr::new(172, 31, 255, 255)),
    (Ipv4Addr::new(192, 168, 0, 0), Ipv4Addr::new(192, 168, 255, 255)),
];

/// Check whether a dotted-quad address lies in `[range_start, range_end]`.
///
/// Any malformed input (empty string for an interface that has no address yet,
/// wrong octet count, octet above 255) makes the comparison fail and yields
/// `false` instead of an error.
pub fn is_in_range(address: &str, range_start: &str, range_end: &str) -> bool {
    match (octets(address), octets(range_start), octets(range_end)) {
        (Some(ip), Some(start), Some(end)) => ip >= start && ip <= end,
        _ => false,
    }
}

/// Typed variant of [`is_in_range`].
pub fn is_addr_in_range(address: Ipv4Addr, range_start: Ipv4Addr, range_end: Ipv4Addr) -> bool {
    let ip = address.octets();
    ip >= range_start.octets() && ip <= range_end.octets()
}

/// Whether the address falls in any of [`PRIVATE_RANGES`].
pub fn is_private(address: Ipv4Addr) -> bool {
    PRIVATE_RANGES
        .iter()
        .any(|(start, end)| is_addr_in_range(address, *start, *end))
}

fn octets(address: &str) -> Option<[u8; 4]> {
    let mut parts = address.trim().split('.');
    let mut out = [0u8; 4];
    for slot in out.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_boundaries() {
        let (start, end) = ("192.168.0.0", "192.168.255.255");
        assert!(is_in_range("192.168.0.0", start, end));
        assert!(is_in_range("192.168.255.255", start, end));
        assert!(is_in_range("192.168.1.50", start, end));
        assert!(!is_in_range("192.167.255.255", start, end));
        assert!(!is_in_range("192.169.0.0", start, end));
    }

    #[test]
    fn test_range_is_lexicographic_not_per_octet() {
        // Lower octets of the address may exceed the end bound's lower octets
        // as long as a more significant octet is already smaller.
        assert!(is_in_range("172.20.255.255", "172.16.0.0", "172.31.0.0"));
        assert!(!is_in_range("172.31.0.1", "172.16.0.0", "172.31.0.0"));
        assert!(is_in_range("10.0.0.5", "10.0.0.1", "10.0.0.9"));
        assert!(!is_in_range("10.0.0.0", "10.0.0.1", "10.0.0.9"));
        assert!(!is_in_range("10.0.0.10", "10.0.0.1", "10.0.0.9"));
    }

    #[test]
    fn test_malformed_input_is_not_in_range() {
        assert!(!is_in_range("", "10.0.0.0", "10.255.255.255"));
        assert!(!is_in_range("10.0.0", "10.0.0.0", "10.255.255.255"));
        assert!(!is_in_range("10.0.0.256", "10.0.0.0", "10.255.255.255"));
        assert!(!is_in_range("10.0.0.1.2", "10.0.0.0", "10.255.255.255"));
        assert!(!is_in_range("10.0.0.1", "garbage", "10.255.255.255"));
    }

    #[test]
    fn test_is_private() {
        assert!(is_private(Ipv4Addr::new(10, 1, 2, 3)));
        assert!(is_private(Ipv4Addr::new(172, 16, 0, 0)));
        assert!(is_private(Ipv4Addr::new(172, 31, 255, 255)));
        assert!(!is_private(Ipv4Addr::new(172, 32, 0, 0)));
        assert!(!is_private(Ipv4Addr::new(172, 15, 255, 255)));
        assert!(is_private(Ipv4Addr::new(192, 168, 1, 50)));
        assert!(!is_private(Ipv4Addr::new(8, 8, 8, 8)));
    }
}
