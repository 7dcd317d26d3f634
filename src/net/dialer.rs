//! Dial-time destination enforcement.
//!
//! # Responsibilities
//! - Re-resolve a host name at the moment a connection is opened
//! - Reject the whole dial if any answer is disallowed
//! - Hand the HTTP client exactly one approved address
//!
//! # Design Decisions
//! - Plugged into `reqwest` as its DNS resolver, so it runs for every new
//!   connection; the client keeps no idle connections, so every request and
//!   every redirect hop dials afresh
//! - IP literals never reach a resolver inside the client, so they are
//!   checked with [`SafeDialer::check_literal`] right before each send

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use url::{Host, Url};

use crate::observability::metrics;
use crate::policy::cidr::normalize;
use crate::policy::{LookupError, NetworkPolicy};

/// Reasons a connection attempt is refused before any socket is opened.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("dial to blocked IP {address} for host {host}")]
    Blocked { host: String, address: IpAddr },

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Connection factory that only ever yields policy-approved addresses.
#[derive(Debug, Clone)]
pub struct SafeDialer {
    policy: Arc<NetworkPolicy>,
}

impl SafeDialer {
    pub fn new(policy: Arc<NetworkPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &NetworkPolicy {
        &self.policy
    }

    /// Choose the address to connect to for `host`, resolving it now.
    pub async fn pick_address(&self, host: &str) -> Result<IpAddr, DialError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.approve(host, ip);
        }

        let addrs = self.policy.resolve(host).await?;
        if let Some(&address) = addrs.iter().find(|ip| self.policy.is_blocked_addr(**ip)) {
            metrics::record_blocked("dial");
            return Err(DialError::Blocked {
                host: host.to_string(),
                address: normalize(address),
            });
        }

        let chosen = normalize(addrs[0]);
        tracing::debug!(host = %host, address = %chosen, candidates = addrs.len(), "Dialing approved address");
        Ok(chosen)
    }

    /// Validate a URL whose host is an IP literal. Names pass through; they
    /// are checked when the client resolves them.
    pub fn check_literal(&self, url: &Url) -> Result<(), DialError> {
        let (host, ip) = match url.host() {
            Some(Host::Ipv4(v4)) => (v4.to_string(), IpAddr::V4(v4)),
            Some(Host::Ipv6(v6)) => (v6.to_string(), IpAddr::V6(v6)),
            _ => return Ok(()),
        };
        self.approve(&host, ip).map(|_| ())
    }

    fn approve(&self, host: &str, ip: IpAddr) -> Result<IpAddr, DialError> {
        if self.policy.is_blocked_addr(ip) {
            metrics::record_blocked("dial");
            return Err(DialError::Blocked {
                host: host.to_string(),
                address: normalize(ip),
            });
        }
        Ok(normalize(ip))
    }
}

impl Resolve for SafeDialer {
    fn resolve(&self, name: Name) -> Resolving {
        let dialer = self.clone();
        Box::pin(async move {
            let ip = dialer.pick_address(name.as_str()).await?;
            // Port 0 is replaced by the client with the URL's port.
            let addrs: Addrs = Box::new(std::iter::once(SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}
