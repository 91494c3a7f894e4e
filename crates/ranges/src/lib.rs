//! Target and port range sets.
//!
//! A scan addresses the Cartesian product of targets × ports, which for
//! internet-scale target specs can run into the millions. The interval
//! set never materializes its elements: it keeps sorted disjoint
//! `[lo, hi]` spans with cumulative counts, so `count()` is O(1) and
//! `pick(k)` (the k-th element in ascending order) is a binary search.
//!
//! Supported token forms, comma-joined:
//! - targets: `192.0.2.1`, `192.0.2.1-192.0.2.9`, `10.0.0.0/8`
//! - ports: `80`, `1-1024`

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid range '{spec}': {reason}")]
    InvalidRange { spec: String, reason: String },
}

impl RangeError {
    fn new(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

/// One merged span plus the number of elements in the set up to and
/// including it, which is what `pick` binary-searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    lo: u64,
    hi: u64,
    cum: u64,
}

/// Sorted disjoint closed intervals with O(log n) ordinal lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    spans: Vec<Span>,
    total: u64,
}

impl RangeSet {
    /// Build a set from raw `[lo, hi]` intervals; overlapping and
    /// adjacent intervals merge, order does not matter.
    pub fn from_intervals(mut intervals: Vec<(u64, u64)>) -> Self {
        intervals.sort_unstable();
        let mut spans: Vec<Span> = Vec::with_capacity(intervals.len());
        for (lo, hi) in intervals {
            match spans.last_mut() {
                Some(last) if lo <= last.hi + 1 => {
                    last.hi = last.hi.max(hi);
                }
                _ => spans.push(Span { lo, hi, cum: 0 }),
            }
        }
        let mut total = 0u64;
        for span in &mut spans {
            total += span.hi - span.lo + 1;
            span.cum = total;
        }
        Self { spans, total }
    }

    /// Number of elements in the set.
    #[inline]
    pub fn count(&self) -> u64 {
        self.total
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// The k-th element in ascending order, `0 <= k < count()`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is out of range; callers index with `i % count()`.
    pub fn pick(&self, k: u64) -> u64 {
        assert!(k < self.total, "pick({k}) out of range 0..{}", self.total);
        let idx = self.spans.partition_point(|s| s.cum <= k);
        let span = &self.spans[idx];
        let before = span.cum - (span.hi - span.lo + 1);
        span.lo + (k - before)
    }

    /// Ascending iteration over all elements; test and debug use only,
    /// the engine always goes through `pick`.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.spans.iter().flat_map(|s| s.lo..=s.hi)
    }
}

/// Parse a comma-separated target spec into a set over the u32 address
/// domain. CIDR blocks expand bit-exactly from network to broadcast.
pub fn parse_targets(spec: &str) -> Result<RangeSet, RangeError> {
    let mut intervals = Vec::new();
    for token in split_tokens(spec, "no targets specified")? {
        if let Some((a, b)) = token.split_once('-') {
            let lo = parse_addr(token, a)?;
            let hi = parse_addr(token, b)?;
            if lo > hi {
                return Err(RangeError::new(token, "start address above end address"));
            }
            intervals.push((u64::from(lo), u64::from(hi)));
        } else if token.contains('/') {
            let net: Ipv4Net = token
                .parse()
                .map_err(|e| RangeError::new(token, format!("bad CIDR: {e}")))?;
            let lo = u32::from(net.network());
            let hi = u32::from(net.broadcast());
            intervals.push((u64::from(lo), u64::from(hi)));
        } else {
            let addr = parse_addr(token, token)?;
            intervals.push((u64::from(addr), u64::from(addr)));
        }
    }
    Ok(RangeSet::from_intervals(intervals))
}

/// Parse a comma-separated port spec into a set over the u16 domain.
pub fn parse_ports(spec: &str) -> Result<RangeSet, RangeError> {
    let mut intervals = Vec::new();
    for token in split_tokens(spec, "no ports specified")? {
        if let Some((a, b)) = token.split_once('-') {
            let lo = parse_port(token, a)?;
            let hi = parse_port(token, b)?;
            if lo > hi {
                return Err(RangeError::new(token, "start port above end port"));
            }
            intervals.push((u64::from(lo), u64::from(hi)));
        } else {
            let port = parse_port(token, token)?;
            intervals.push((u64::from(port), u64::from(port)));
        }
    }
    Ok(RangeSet::from_intervals(intervals))
}

fn split_tokens<'a>(spec: &'a str, empty_msg: &str) -> Result<Vec<&'a str>, RangeError> {
    let tokens: Vec<&str> = spec
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(RangeError::new(spec, empty_msg));
    }
    Ok(tokens)
}

fn parse_addr(token: &str, s: &str) -> Result<u32, RangeError> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| RangeError::new(token, format!("bad IPv4 address '{}'", s.trim())))
}

fn parse_port(token: &str, s: &str) -> Result<u16, RangeError> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| RangeError::new(token, format!("bad port '{}'", s.trim())))
}
