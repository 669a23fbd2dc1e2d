//! Origin address resolution and internal/external classification.
//!
//! # Responsibilities
//! - Pick the claimed client address (peer, or left-most forwarded entry)
//! - Parse it as IPv4/IPv6, tolerating a trailing port
//! - Fold IPv4-mapped IPv6 addresses back to IPv4
//! - Test membership against the snapshot's internal ranges
//!
//! # Design Decisions
//! - Anything unparseable is external; classification never fails
//! - Membership is a plain union, no precedence between ranges
//! - Forwarded headers are ignored unless explicitly trusted

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::error::GateError;
use crate::policy::snapshot::CompiledRange;

/// Where the resolved address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    Peer,
    Forwarded,
    Unresolved,
}

/// Rate-limiting and classification key for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OriginKey {
    Address(IpAddr),
    /// Every origin that failed to parse shares this key.
    Unresolved,
}

impl OriginKey {
    pub fn address(&self) -> Option<IpAddr> {
        match self {
            OriginKey::Address(ip) => Some(*ip),
            OriginKey::Unresolved => None,
        }
    }
}

impl fmt::Display for OriginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginKey::Address(ip) => write!(f, "{ip}"),
            OriginKey::Unresolved => f.write_str("unresolved"),
        }
    }
}

/// Outcome of classifying one request's origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub origin: OriginKey,
    pub is_internal: bool,
    pub source: AddressSource,
    /// Set when no usable address was found.
    pub error: Option<GateError>,
}

/// Classifier over one snapshot's internal ranges.
#[derive(Debug, Clone, Copy)]
pub struct AddressClassifier<'a> {
    ranges: &'a [CompiledRange],
}

impl<'a> AddressClassifier<'a> {
    pub fn new(ranges: &'a [CompiledRange]) -> Self {
        Self { ranges }
    }

    /// Resolve and classify an origin.
    ///
    /// `raw_peer` is the transport-level address. `forwarded` holds the raw
    /// forwarded-address header values in arrival order; it is consulted only
    /// when `trust_proxy_headers` is set.
    pub fn classify(&self, raw_peer: &str, trust_proxy_headers: bool, forwarded: &[&str]) -> Classification {
        match resolve_origin(raw_peer, trust_proxy_headers, forwarded) {
            Ok((ip, source)) => Classification {
                origin: OriginKey::Address(ip),
                is_internal: self.is_internal(ip),
                source,
                error: None,
            },
            Err(err) => {
                tracing::warn!(
                    peer = %raw_peer,
                    error = %err,
                    "Origin classification error; treating as external"
                );
                Classification {
                    origin: OriginKey::Unresolved,
                    is_internal: false,
                    source: AddressSource::Unresolved,
                    error: Some(err),
                }
            }
        }
    }

    /// True when `ip` falls inside any configured range.
    pub fn is_internal(&self, ip: IpAddr) -> bool {
        let ip = normalize_address(ip);
        self.ranges.iter().any(|r| r.net.contains(&ip))
    }
}

/// Choose the claimed client address.
pub fn resolve_origin(
    raw_peer: &str,
    trust_proxy_headers: bool,
    forwarded: &[&str],
) -> Result<(IpAddr, AddressSource), GateError> {
    if trust_proxy_headers {
        if let Some(claimed) = leftmost_forwarded(forwarded) {
            match parse_address(claimed) {
                Some(ip) => return Ok((ip, AddressSource::Forwarded)),
                None => tracing::debug!(
                    forwarded = %claimed,
                    "Malformed forwarded address, falling back to peer"
                ),
            }
        }
    }

    parse_address(raw_peer)
        .map(|ip| (ip, AddressSource::Peer))
        .ok_or_else(|| GateError::MalformedAddress(raw_peer.to_string()))
}

/// Left-most entry of the first forwarded header value, trimmed.
///
/// An empty entry is returned as-is; it fails to parse and the caller falls
/// back to the peer rather than trusting a later hop.
pub fn leftmost_forwarded<'h>(chain: &[&'h str]) -> Option<&'h str> {
    chain
        .first()
        .and_then(|value| value.split(',').next())
        .map(str::trim)
}

/// Parse an address as it appears on the wire: bare, `v4:port`, `[v6]` or
/// `[v6]:port`. The result is normalized.
pub fn parse_address(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim().trim_matches('"');
    if raw.is_empty() {
        return None;
    }
    let ip = raw
        .parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
        .or_else(|| {
            raw.strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .and_then(|inner| inner.parse::<IpAddr>().ok())
        })?;
    Some(normalize_address(ip))
}

/// Fold `::ffff:a.b.c.d` into `a.b.c.d` so v4 ranges match it.
pub fn normalize_address(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
