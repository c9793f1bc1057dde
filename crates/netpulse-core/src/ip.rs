//! IPv4 address and CIDR range utilities.

use crate::contracts::IpRange;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Parse dotted-decimal text into its 32-bit value.
///
/// Requires exactly four octets, each in 0..=255.
pub fn parse_ipv4(text: &str) -> Result<u32> {
    text.parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| Error::InvalidAddress(text.to_string()))
}

/// Format a 32-bit value as dotted-decimal. Inverse of [`parse_ipv4`].
pub fn format_ipv4(value: u32) -> String {
    Ipv4Addr::from(value).to_string()
}

/// Resolve `"a.b.c.d/n"` to its usable host range.
///
/// For masks up to /30 the network and broadcast addresses are excluded.
/// /31 and /32 keep both boundary addresses (point-to-point and host
/// routes have no network/broadcast convention).
pub fn cidr_to_range(cidr: &str) -> Result<IpRange> {
    let (base, mask) = cidr
        .split_once('/')
        .ok_or_else(|| Error::InvalidCidr(cidr.to_string()))?;
    let base = parse_ipv4(base).map_err(|_| Error::InvalidCidr(cidr.to_string()))?;
    let bits: u32 = mask
        .parse()
        .map_err(|_| Error::InvalidCidr(cidr.to_string()))?;
    if bits > 32 {
        return Err(Error::InvalidCidr(cidr.to_string()));
    }

    let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
    let network = u64::from(base & mask);
    let host_count = 1u64 << (32 - bits);
    let broadcast = network + host_count - 1;

    let (from, to) = if bits >= 31 {
        (network, broadcast)
    } else {
        (network + 1, broadcast - 1)
    };

    Ok(IpRange {
        from: from as u32,
        to: to as u32,
    })
}

/// Every address in `[from, to]`, ascending. Empty when `to < from`.
pub fn expand_range(range: &IpRange) -> Vec<u32> {
    if range.to < range.from {
        return Vec::new();
    }
    (range.from..=range.to).collect()
}
