//! Hostname resolution, cached for the lifetime of the process.
//!
//! The original tooling re-resolved hostnames on every packet for display.
//! Per the re-architecture notes, this cache makes resolution a one-time
//! cost at config-load time instead of a per-packet one.

use std::collections::HashMap;
use std::net::{Ipv4Addr, ToSocketAddrs};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to resolve hostname {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("hostname {0} resolved to no addresses")]
    NoAddresses(String),
}

/// Caches hostname → IPv4 resolutions.
#[derive(Debug, Default)]
pub struct HostnameResolver {
    cache: HashMap<String, Ipv4Addr>,
}

impl HostnameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `host` to an IPv4 address, consulting and populating the
    /// cache. A bare dotted-quad is parsed directly without a DNS lookup.
    pub fn resolve(&mut self, host: &str) -> Result<Ipv4Addr, ResolveError> {
        if let Some(ip) = self.cache.get(host) {
            return Ok(*ip);
        }

        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            self.cache.insert(host.to_string(), ip);
            return Ok(ip);
        }

        let ip = (host, 0)
            .to_socket_addrs()
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?
            .find_map(|addr| match addr.ip() {
                std::net::IpAddr::V4(ip) => Some(ip),
                std::net::IpAddr::V6(_) => None,
            })
            .ok_or_else(|| ResolveError::NoAddresses(host.to_string()))?;

        self.cache.insert(host.to_string(), ip);
        Ok(ip)
    }
}
