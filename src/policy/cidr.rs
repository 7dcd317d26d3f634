//! CIDR ranges and the fixed set of disallowed destinations.

use std::net::IpAddr;

use ipnet::{AddrParseError, IpNet};

/// Ranges the proxy never forwards to: loopback, link-local, RFC 1918,
/// carrier-grade NAT, unique-local IPv6 and the unspecified addresses.
pub const DEFAULT_BLOCKED_CIDRS: &[&str] = &[
    "0.0.0.0/32",
    "127.0.0.0/8",
    "::1/128",
    "::/128",
    "169.254.0.0/16",
    "fe80::/10",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "100.64.0.0/10",
    "fc00::/7",
];

/// Error returned when a CIDR string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid CIDR `{cidr}`: {source}")]
pub struct CidrParseError {
    cidr: String,
    #[source]
    source: AddrParseError,
}

/// Parse a single range such as `10.0.0.0/8`.
pub fn parse_cidr(cidr: &str) -> Result<IpNet, CidrParseError> {
    cidr.trim().parse().map_err(|source| CidrParseError {
        cidr: cidr.to_string(),
        source,
    })
}

/// Immutable set of disallowed ranges, built once at startup and shared
/// read-only by every request.
#[derive(Debug, Clone)]
pub struct DisallowedRanges {
    ranges: Vec<IpNet>,
}

impl DisallowedRanges {
    /// Build a set from CIDR strings.
    pub fn from_cidrs<I, S>(cidrs: I) -> Result<Self, CidrParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ranges = cidrs
            .into_iter()
            .map(|c| parse_cidr(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ranges })
    }

    /// The fixed default set plus any extra ranges.
    pub fn with_extra<I, S>(extra: I) -> Result<Self, CidrParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for cidr in extra {
            set.ranges.push(parse_cidr(cidr.as_ref())?);
        }
        Ok(set)
    }

    /// First range containing `ip`, after IPv4-mapped IPv6 normalization.
    pub fn matching(&self, ip: IpAddr) -> Option<&IpNet> {
        let ip = normalize(ip);
        self.ranges.iter().find(|range| range.contains(&ip))
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.matching(ip).is_some()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl Default for DisallowedRanges {
    fn default() -> Self {
        let ranges = DEFAULT_BLOCKED_CIDRS
            .iter()
            .filter_map(|c| parse_cidr(c).ok())
            .collect();
        Self { ranges }
    }
}

/// Collapse `::ffff:a.b.c.d` to `a.b.c.d`.
pub fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}
