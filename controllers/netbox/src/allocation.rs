//! Allocation engine.
//!
//! Pure functions over the free-space listings NetBox reports under a parent
//! prefix:
//! - [`best_fit_prefix`] picks the smallest free block that can host a child
//!   prefix and narrows it to the requested length
//! - [`find_consecutive_run`] finds the first run of N consecutive free addresses
//!
//! Nothing in here talks to NetBox; callers fetch the listings and parse them
//! into [`IpNet`] / [`IpAddr`] values first.

use ipnet::{IpNet, Ipv4AddrRange, Ipv6AddrRange};
use std::net::{IpAddr, Ipv6Addr};
use thiserror::Error;

/// Reasons an allocation attempt can fail
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("invalid prefix length '{0}'")]
    InvalidPrefixLength(String),

    #[error("invalid prefix '{0}'")]
    InvalidPrefix(String),

    #[error("invalid IP address '{0}'")]
    InvalidAddress(String),

    #[error("requesting the entire parent prefix range is disallowed")]
    EntireParentRequested,

    #[error("requested prefix length /{requested} is shorter than the parent prefix length /{parent}")]
    RequestedLargerThanParent { parent: u8, requested: u8 },

    #[error("prefix length /{requested} exceeds the {width} bit address family")]
    LengthExceedsFamily { requested: u8, width: u8 },

    #[error("parent prefix exhausted")]
    PoolExhausted,

    #[error("no available prefix matches size criteria")]
    NoPrefixMatchesSize,

    #[error("not enough consecutive IP addresses available")]
    NotEnoughConsecutive,

    #[error("invalid IP range size {0}, must be between 2 and 50")]
    InvalidRangeSize(u32),
}

/// Smallest and largest number of addresses an IP range claim may request
pub const MIN_RANGE_SIZE: u32 = 2;
pub const MAX_RANGE_SIZE: u32 = 50;

/// Parse a prefix literal such as "10.0.0.0/24" or "2001:db8::/48"
pub fn parse_prefix(value: &str) -> Result<IpNet, AllocationError> {
    value
        .trim()
        .parse::<IpNet>()
        .map_err(|_| AllocationError::InvalidPrefix(value.to_string()))
}

/// Single-host prefix (/32 or /128) for an address
pub fn host_prefix(addr: IpAddr) -> IpNet {
    IpNet::from(addr)
}

/// Parse an address that may carry a mask ("10.0.0.5/24" or "10.0.0.5")
pub fn parse_host(address: &str) -> Result<IpAddr, AllocationError> {
    let trimmed = address.trim();
    trimmed
        .parse::<IpNet>()
        .map(|net| net.addr())
        .or_else(|_| trimmed.parse::<IpAddr>())
        .map_err(|_| AllocationError::InvalidAddress(address.to_string()))
}

/// Parse a requested prefix length, with or without the leading slash
pub fn parse_prefix_length(value: &str) -> Result<u8, AllocationError> {
    value
        .trim()
        .trim_start_matches('/')
        .parse::<u8>()
        .map_err(|_| AllocationError::InvalidPrefixLength(value.to_string()))
}

/// Check that a child of `requested` length can be carved from `parent`
pub fn validate_prefix_length(parent: &IpNet, requested: u8) -> Result<(), AllocationError> {
    let width = parent.max_prefix_len();
    if requested > width {
        return Err(AllocationError::LengthExceedsFamily { requested, width });
    }
    if requested == parent.prefix_len() {
        return Err(AllocationError::EntireParentRequested);
    }
    if requested < parent.prefix_len() {
        return Err(AllocationError::RequestedLargerThanParent {
            parent: parent.prefix_len(),
            requested,
        });
    }
    Ok(())
}

/// Check the number of addresses requested by an IP range claim
pub fn validate_range_size(size: u32) -> Result<(), AllocationError> {
    if (MIN_RANGE_SIZE..=MAX_RANGE_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(AllocationError::InvalidRangeSize(size))
    }
}

/// Best-fit selection of a child prefix from the free blocks of a parent.
///
/// NetBox lists free space as maximal blocks, not blocks of the requested
/// size. An exact-length block is returned as is. Otherwise the smallest block
/// that is still larger than requested (longest prefix length, first on ties)
/// is narrowed to the requested length by clearing its host bits.
pub fn best_fit_prefix(available: &[IpNet], requested: u8) -> Result<IpNet, AllocationError> {
    if available.is_empty() {
        return Err(AllocationError::PoolExhausted);
    }

    if let Some(exact) = available.iter().find(|net| net.prefix_len() == requested) {
        return Ok(*exact);
    }

    let mut best: Option<&IpNet> = None;
    for candidate in available.iter().filter(|net| net.prefix_len() < requested) {
        if best.is_none_or(|b| candidate.prefix_len() > b.prefix_len()) {
            best = Some(candidate);
        }
    }

    let block = best.ok_or(AllocationError::NoPrefixMatchesSize)?;
    IpNet::new(block.network(), requested)
        .map(|net| net.trunc())
        .map_err(|_| AllocationError::LengthExceedsFamily {
            requested,
            width: block.max_prefix_len(),
        })
}

/// First free address of a listing, as a host prefix
pub fn first_available_ip(available: &[IpAddr]) -> Result<IpNet, AllocationError> {
    available
        .first()
        .map(|ip| host_prefix(*ip))
        .ok_or(AllocationError::PoolExhausted)
}

/// `true` when `next` is exactly one greater than `prev`.
///
/// v4 compares 32 bit values. v6 compares two 64 bit halves and carries from
/// the low half into the high half.
fn is_successor(prev: IpAddr, next: IpAddr) -> bool {
    match (prev, next) {
        (IpAddr::V4(p), IpAddr::V4(n)) => u32::from(p).checked_add(1) == Some(u32::from(n)),
        (IpAddr::V6(p), IpAddr::V6(n)) => {
            let (p_hi, p_lo) = halves(p);
            let (n_hi, n_lo) = halves(n);
            if p_lo == u64::MAX {
                p_hi.checked_add(1) == Some(n_hi) && n_lo == 0
            } else {
                p_hi == n_hi && p_lo + 1 == n_lo
            }
        }
        _ => false,
    }
}

fn halves(addr: Ipv6Addr) -> (u64, u64) {
    let value = u128::from(addr);
    ((value >> 64) as u64, value as u64)
}

/// First run of `count` consecutive addresses in an ordered listing.
///
/// Returns the first and last address of the run. The scan restarts the run
/// at every gap, so the lowest qualifying run wins rather than the largest.
pub fn find_consecutive_run(available: &[IpAddr], count: u32) -> Result<(IpAddr, IpAddr), AllocationError> {
    if count == 0 {
        return Err(AllocationError::InvalidRangeSize(count));
    }
    let Some(first) = available.first() else {
        return Err(AllocationError::PoolExhausted);
    };

    let mut run_start = *first;
    let mut run_len: u32 = 1;
    if run_len == count {
        return Ok((run_start, run_start));
    }

    for pair in available.windows(2) {
        let (prev, current) = (pair[0], pair[1]);
        if is_successor(prev, current) {
            run_len += 1;
        } else {
            run_start = current;
            run_len = 1;
        }
        if run_len == count {
            return Ok((run_start, current));
        }
    }

    Err(AllocationError::NotEnoughConsecutive)
}

/// Number of addresses from `start` to `end` inclusive, `None` when reversed or mixed
pub fn range_size(start: IpAddr, end: IpAddr) -> Option<u128> {
    let (s, e) = match (start, end) {
        (IpAddr::V4(s), IpAddr::V4(e)) => (u128::from(u32::from(s)), u128::from(u32::from(e))),
        (IpAddr::V6(s), IpAddr::V6(e)) => (u128::from(s), u128::from(e)),
        _ => return None,
    };
    (e >= s).then(|| e - s + 1)
}

/// Every address from `start` to `end` inclusive.
///
/// Empty when the range is reversed, mixes families or holds more than
/// [`MAX_RANGE_SIZE`] addresses.
pub fn expand_range(start: IpAddr, end: IpAddr) -> Vec<IpAddr> {
    if range_size(start, end).is_none_or(|size| size > u128::from(MAX_RANGE_SIZE)) {
        return Vec::new();
    }
    match (start, end) {
        (IpAddr::V4(s), IpAddr::V4(e)) => Ipv4AddrRange::new(s, e).map(IpAddr::V4).collect(),
        (IpAddr::V6(s), IpAddr::V6(e)) => Ipv6AddrRange::new(s, e).map(IpAddr::V6).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nets(values: &[&str]) -> Vec<IpNet> {
        values.iter().map(|v| v.parse().unwrap()).collect()
    }

    fn ips(values: &[&str]) -> Vec<IpAddr> {
        values.iter().map(|v| v.parse().unwrap()).collect()
    }

    #[test]
    fn test_parse_prefix_and_host() {
        assert_eq!(parse_prefix(" 10.0.1.77/26 ").unwrap().trunc().to_string(), "10.0.1.64/26");
        assert_eq!(parse_prefix("2001:db8::1234/64").unwrap().trunc().to_string(), "2001:db8::/64");
        assert_eq!(parse_prefix("10.0.0.0"), Err(AllocationError::InvalidPrefix("10.0.0.0".to_string())));
        assert!(parse_prefix("10.0.0.0/33").is_err());

        assert_eq!(host_prefix("10.0.0.9".parse().unwrap()).to_string(), "10.0.0.9/32");
        assert_eq!(host_prefix("2001:db8::9".parse().unwrap()).to_string(), "2001:db8::9/128");
        assert_eq!(parse_host("10.0.0.1/24").unwrap().to_string(), "10.0.0.1");
        assert_eq!(parse_host("10.0.0.1").unwrap().to_string(), "10.0.0.1");
        assert!(parse_host("10.0.0/24").is_err());
    }

    #[test]
    fn test_parent_containment() {
        let parent = parse_prefix("10.0.0.0/16").unwrap();
        assert!(parent.contains(&parse_prefix("10.0.3.0/24").unwrap()));
        assert!(parent.contains(&host_prefix("10.0.200.7".parse().unwrap())));
        assert!(!parent.contains(&parse_prefix("10.1.0.0/24").unwrap()));
        assert!(!parent.contains(&parse_prefix("10.0.0.0/8").unwrap()));
        assert!(!parent.contains(&parse_prefix("2001:db8::/64").unwrap()));
    }

    #[test]
    fn test_parse_prefix_length() {
        assert_eq!(parse_prefix_length("/28").unwrap(), 28);
        assert_eq!(parse_prefix_length("24").unwrap(), 24);
        assert!(parse_prefix_length("/abc").is_err());
    }

    #[test]
    fn test_validate_prefix_length() {
        let parent = parse_prefix("10.0.0.0/24").unwrap();
        assert!(validate_prefix_length(&parent, 28).is_ok());
        assert_eq!(validate_prefix_length(&parent, 24), Err(AllocationError::EntireParentRequested));
        assert_eq!(
            validate_prefix_length(&parent, 16),
            Err(AllocationError::RequestedLargerThanParent { parent: 24, requested: 16 })
        );
        assert_eq!(
            validate_prefix_length(&parent, 40),
            Err(AllocationError::LengthExceedsFamily { requested: 40, width: 32 })
        );
    }

    #[test]
    fn test_best_fit_prefers_smallest_sufficient_block() {
        let available = nets(&["10.0.2.0/23", "10.0.0.32/27", "10.0.0.64/26"]);
        let picked = best_fit_prefix(&available, 28).unwrap();
        assert_eq!(picked.to_string(), "10.0.0.32/28");
    }

    #[test]
    fn test_best_fit_exact_match_is_returned_unmodified() {
        let available = nets(&["10.0.4.0/22", "10.0.0.48/28", "10.0.0.128/25"]);
        let picked = best_fit_prefix(&available, 28).unwrap();
        assert_eq!(picked.to_string(), "10.0.0.48/28");
    }

    #[test]
    fn test_best_fit_ties_take_first_candidate() {
        let available = nets(&["10.0.0.64/26", "10.0.1.0/26"]);
        assert_eq!(best_fit_prefix(&available, 28).unwrap().to_string(), "10.0.0.64/28");
    }

    #[test]
    fn test_best_fit_only_smaller_blocks_fails_with_size_error() {
        let available = nets(&["10.0.0.4/30", "10.0.0.8/30"]);
        assert_eq!(best_fit_prefix(&available, 28), Err(AllocationError::NoPrefixMatchesSize));
    }

    #[test]
    fn test_best_fit_empty_listing_is_exhaustion() {
        assert_eq!(best_fit_prefix(&[], 28), Err(AllocationError::PoolExhausted));
    }

    #[test]
    fn test_best_fit_from_untouched_parent() {
        // An untouched parent is reported as its own single free block
        let parent = parse_prefix("10.0.0.0/24").unwrap();
        assert_eq!(validate_prefix_length(&parent, 24), Err(AllocationError::EntireParentRequested));
        assert_eq!(best_fit_prefix(&[parent], 26).unwrap().to_string(), "10.0.0.0/26");
    }

    #[test]
    fn test_best_fit_ipv6() {
        let available = nets(&["2001:db8:0:1::/64", "2001:db8:0:8000::/49"]);
        assert_eq!(best_fit_prefix(&available, 64).unwrap().to_string(), "2001:db8:0:1::/64");
        assert_eq!(best_fit_prefix(&available, 56).unwrap().to_string(), "2001:db8:0:8000::/56");
    }

    #[test]
    fn test_first_available_ip() {
        let available = ips(&["10.0.0.5", "10.0.0.6"]);
        assert_eq!(first_available_ip(&available).unwrap().to_string(), "10.0.0.5/32");
        assert_eq!(first_available_ip(&[]), Err(AllocationError::PoolExhausted));
    }

    #[test]
    fn test_consecutive_run_takes_first_qualifying_run() {
        let available = ips(&["10.0.0.1", "10.0.0.3", "10.0.0.5", "10.0.0.6", "10.0.0.7", "10.0.0.8"]);
        let (start, end) = find_consecutive_run(&available, 3).unwrap();
        assert_eq!(start.to_string(), "10.0.0.5");
        assert_eq!(end.to_string(), "10.0.0.7");
    }

    #[test]
    fn test_consecutive_run_not_enough() {
        let available = ips(&["10.0.0.1", "10.0.0.3", "10.0.0.5", "10.0.0.6", "10.0.0.7", "10.0.0.8"]);
        assert_eq!(find_consecutive_run(&available, 5), Err(AllocationError::NotEnoughConsecutive));
        assert_eq!(find_consecutive_run(&[], 2), Err(AllocationError::PoolExhausted));
        assert_eq!(find_consecutive_run(&available, 0), Err(AllocationError::InvalidRangeSize(0)));
    }

    #[test]
    fn test_validate_range_size() {
        assert_eq!(validate_range_size(1), Err(AllocationError::InvalidRangeSize(1)));
        assert!(validate_range_size(MIN_RANGE_SIZE).is_ok());
        assert!(validate_range_size(MAX_RANGE_SIZE).is_ok());
        assert_eq!(validate_range_size(51), Err(AllocationError::InvalidRangeSize(51)));
        assert_eq!(validate_range_size(u32::MAX), Err(AllocationError::InvalidRangeSize(u32::MAX)));
    }

    #[test]
    fn test_consecutive_run_resets_counter_to_one() {
        // .2 breaks the first run; the run restarting at .4 must count .4 itself
        let available = ips(&["10.0.0.0", "10.0.0.1", "10.0.0.4", "10.0.0.5", "10.0.0.6"]);
        let (start, end) = find_consecutive_run(&available, 3).unwrap();
        assert_eq!((start.to_string(), end.to_string()), ("10.0.0.4".to_string(), "10.0.0.6".to_string()));
    }

    #[test]
    fn test_consecutive_run_ipv6_carries_between_halves() {
        let available = ips(&["2001:db8::ffff:ffff:ffff:ffff", "2001:db8:0:1::", "2001:db8:0:1::1"]);
        let (start, end) = find_consecutive_run(&available, 3).unwrap();
        assert_eq!(start.to_string(), "2001:db8::ffff:ffff:ffff:ffff");
        assert_eq!(end.to_string(), "2001:db8:0:1::1");
    }

    #[test]
    fn test_consecutive_run_v4_does_not_wrap() {
        let available = ips(&["255.255.255.255", "0.0.0.0"]);
        assert_eq!(find_consecutive_run(&available, 2), Err(AllocationError::NotEnoughConsecutive));
    }

    #[test]
    fn test_range_helpers() {
        let start: IpAddr = "10.0.0.10".parse().unwrap();
        let end: IpAddr = "10.0.0.12".parse().unwrap();
        assert_eq!(range_size(start, end), Some(3));
        assert_eq!(range_size(end, start), None);
        let expanded: Vec<String> = expand_range(start, end).iter().map(|ip| ip.to_string()).collect();
        assert_eq!(expanded, vec!["10.0.0.10", "10.0.0.11", "10.0.0.12"]);

        let far: IpAddr = "10.0.255.255".parse().unwrap();
        assert_eq!(range_size(start, far), Some(65526));
        assert!(expand_range(start, far).is_empty());
        assert!(expand_range(start, "2001:db8::1".parse().unwrap()).is_empty());
    }
}
