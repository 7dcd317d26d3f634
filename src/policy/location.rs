//! Network location policy: decides whether a host may be contacted.
//!
//! # Rules
//! - An optional `:port` suffix is ignored
//! - IP literals are checked directly (IPv4-mapped IPv6 collapsed first)
//! - Host names are resolved and *every* answer is checked
//! - A failed, empty or timed-out lookup blocks (fail closed)
//! - Bypass mode allows everything and is opt-in only

use std::fmt;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::policy::cidr::{normalize, DisallowedRanges};
use crate::policy::resolver::{Resolver, SystemResolver};

/// Default bound on a single name lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a name lookup produced no usable answer.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("lookup {host}: {source}")]
    Failed {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("lookup {host}: timed out after {timeout:?}")]
    TimedOut { host: String, timeout: Duration },

    #[error("lookup {0}: no addresses")]
    Empty(String),
}

/// Process-wide destination policy. Immutable once built.
#[derive(Clone)]
pub struct NetworkPolicy {
    ranges: Arc<DisallowedRanges>,
    resolver: Arc<dyn Resolver>,
    lookup_timeout: Duration,
    bypass: bool,
}

impl fmt::Debug for NetworkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkPolicy")
            .field("ranges", &self.ranges)
            .field("lookup_timeout", &self.lookup_timeout)
            .field("bypass", &self.bypass)
            .finish_non_exhaustive()
    }
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self::new(DisallowedRanges::default())
    }
}

impl NetworkPolicy {
    /// Enforcing policy over `ranges` using the system resolver.
    pub fn new(ranges: DisallowedRanges) -> Self {
        Self {
            ranges: Arc::new(ranges),
            resolver: Arc::new(SystemResolver),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            bypass: false,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Disable all enforcement. Only for development deployments.
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn ranges(&self) -> &DisallowedRanges {
        &self.ranges
    }

    /// Check an already resolved address.
    pub fn is_blocked_addr(&self, ip: IpAddr) -> bool {
        if self.bypass {
            return false;
        }
        match self.ranges.matching(ip) {
            Some(range) => {
                warn!(address = %normalize(ip), range = %range, "Address in disallowed range");
                true
            }
            None => false,
        }
    }

    /// Check a host name, IP literal or `host:port` authority.
    pub async fn is_blocked(&self, host_or_authority: &str) -> bool {
        if self.bypass {
            return false;
        }

        let host = strip_port(host_or_authority);
        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.is_blocked_addr(ip);
        }

        match self.resolve(host).await {
            Ok(addrs) => {
                debug!(host = %host, addresses = ?addrs, "Resolved host for policy check");
                addrs.into_iter().any(|ip| self.is_blocked_addr(ip))
            }
            Err(e) => {
                warn!(host = %host, error = %e, "Blocking host that failed to resolve");
                true
            }
        }
    }

    /// Fresh, time-bounded lookup of `host`. Never served from a cache.
    pub async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let lookup = self.resolver.lookup(host);
        let addrs = match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(source)) => {
                return Err(LookupError::Failed {
                    host: host.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(LookupError::TimedOut {
                    host: host.to_string(),
                    timeout: self.lookup_timeout,
                })
            }
        };

        if addrs.is_empty() {
            return Err(LookupError::Empty(host.to_string()));
        }
        Ok(addrs)
    }
}

/// Drop a trailing `:port`, and the brackets around an IPv6 literal.
///
/// A bare IPv6 address (several colons, no brackets) is returned unchanged.
pub fn strip_port(input: &str) -> &str {
    if let Some(rest) = input.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => input,
        };
    }
    match input.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::resolver::StaticResolver;
    use futures_util::future::BoxFuture;

    fn policy_with(resolver: StaticResolver) -> NetworkPolicy {
        NetworkPolicy::default().with_resolver(Arc::new(resolver))
    }

    #[test]
    fn strip_port_variants() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("10.0.0.1:80"), "10.0.0.1");
        assert_eq!(strip_port("[::1]:443"), "::1");
        assert_eq!(strip_port("[fe80::1]"), "fe80::1");
        assert_eq!(strip_port("::1"), "::1");
        assert_eq!(strip_port(""), "");
    }

    #[tokio::test]
    async fn literals_in_disallowed_ranges_are_blocked() {
        let policy = policy_with(StaticResolver::new());
        for host in [
            "127.0.0.1",
            "127.0.0.1:8080",
            "169.254.169.254",
            "10.0.0.5",
            "172.16.3.4",
            "192.168.0.1:443",
            "100.64.1.1",
            "0.0.0.0",
            "[::1]:80",
            "::",
            "fe80::abcd",
            "fd00::1",
            "::ffff:127.0.0.1",
            "[::ffff:169.254.169.254]:80",
        ] {
            assert!(policy.is_blocked(host).await, "{host} should be blocked");
        }
    }

    #[tokio::test]
    async fn public_literals_are_allowed() {
        let policy = policy_with(StaticResolver::new());
        for host in ["8.8.8.8", "1.1.1.1:443", "[2606:4700:4700::1111]:443", "::ffff:8.8.4.4"] {
            assert!(!policy.is_blocked(host).await, "{host} should be allowed");
        }
    }

    #[tokio::test]
    async fn any_private_answer_blocks_the_name() {
        let resolver = StaticResolver::new()
            .with_host("public.test", vec!["93.184.216.34".parse().unwrap()])
            .with_host(
                "mixed.test",
                vec!["93.184.216.34".parse().unwrap(), "10.0.0.5".parse().unwrap()],
            )
            .with_host("internal-service.local", vec!["10.0.0.5".parse().unwrap()]);
        let policy = policy_with(resolver);

        assert!(!policy.is_blocked("public.test").await);
        assert!(!policy.is_blocked("public.test:8443").await);
        assert!(policy.is_blocked("mixed.test").await);
        assert!(policy.is_blocked("internal-service.local").await);
    }

    #[tokio::test]
    async fn resolution_failure_fails_closed() {
        let policy = policy_with(StaticResolver::new().with_host("empty.test", Vec::new()));
        assert!(policy.is_blocked("this-host-does-not-exist.invalid").await);
        assert!(policy.is_blocked("empty.test").await);
        assert!(policy.is_blocked("").await);
    }

    struct HangingResolver;

    impl Resolver for HangingResolver {
        fn lookup<'a>(&'a self, _host: &'a str) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn slow_lookup_times_out_and_blocks() {
        let policy = NetworkPolicy::default()
            .with_resolver(Arc::new(HangingResolver))
            .with_lookup_timeout(Duration::from_millis(20));

        assert!(matches!(
            policy.resolve("slow.test").await,
            Err(LookupError::TimedOut { .. })
        ));
        assert!(policy.is_blocked("slow.test").await);
    }

    #[tokio::test]
    async fn bypass_allows_everything() {
        let policy = policy_with(StaticResolver::new()).with_bypass(true);
        assert!(policy.is_bypassed());
        assert!(!policy.is_blocked("127.0.0.1").await);
        assert!(!policy.is_blocked("unresolvable.invalid").await);
        assert!(!policy.is_blocked_addr("169.254.169.254".parse().unwrap()));
    }

    #[test]
    fn enforcement_is_the_default() {
        assert!(!NetworkPolicy::default().is_bypassed());
    }
}
