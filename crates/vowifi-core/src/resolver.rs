//! Network-scoped name resolution
//!
//! All lookups go through a [`NetworkResolver`] keyed by the session's
//! network id, so names are only ever resolved on the VoWiFi bearer. The
//! session then orders the answer by its address family preference.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::state::SessionSnapshot;

/// Per-network resolver primitive provided by the platform
#[async_trait]
pub trait NetworkResolver: Send + Sync {
    /// Resolve `host` using only the network identified by `network_id`
    async fn lookup(&self, host: &str, network_id: i32) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the system resolver
///
/// IP literals are answered without a lookup. The network id is not used:
/// routing the query onto a specific network is the platform's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl NetworkResolver for SystemResolver {
    async fn lookup(&self, host: &str, network_id: i32) -> io::Result<Vec<IpAddr>> {
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        debug!("System lookup of '{}' for network {}", host, network_id);
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Fixed host table, for bearers whose names are provisioned out of band
/// and for tests
#[derive(Debug, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
    queries: Mutex<Vec<(String, i32)>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the addresses returned for `host`, in order
    pub fn with_host(mut self, host: impl Into<String>, addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        self.hosts.insert(host.into(), addrs.into_iter().collect());
        self
    }

    /// Every `(host, network_id)` pair looked up so far
    pub fn queries(&self) -> Vec<(String, i32)> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl NetworkResolver for StaticResolver {
    async fn lookup(&self, host: &str, network_id: i32) -> io::Result<Vec<IpAddr>> {
        self.queries.lock().push((host.to_string(), network_id));
        match self.hosts.get(host) {
            Some(addrs) => Ok(addrs.clone()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no entry for '{}'", host),
            )),
        }
    }
}

/// Whether `addr` belongs to the preferred address family
pub fn is_preferred_family(addr: &IpAddr, prefer_ipv4: bool) -> bool {
    addr.is_ipv4() == prefer_ipv4
}

/// Stable partition: preferred-family addresses first, then the rest, each
/// group keeping the resolver's relative order
pub fn order_by_family(addrs: Vec<IpAddr>, prefer_ipv4: bool) -> Vec<IpAddr> {
    let (mut ordered, secondary): (Vec<IpAddr>, Vec<IpAddr>) = addrs
        .into_iter()
        .partition(|addr| is_preferred_family(addr, prefer_ipv4));

    for addr in &ordered {
        debug!("Add to list, found matching address: {}", addr);
    }
    for addr in &secondary {
        debug!("Add to list as secondary address: {}", addr);
    }

    ordered.extend(secondary);
    ordered
}

/// Resolution handle bound to one session's live fields
///
/// Cheap to clone; the socket factory and the HTTP DNS hook each hold one.
#[derive(Clone)]
pub struct SessionResolver {
    fields: Arc<Mutex<SessionSnapshot>>,
    resolver: Arc<dyn NetworkResolver>,
}

impl SessionResolver {
    pub(crate) fn new(fields: Arc<Mutex<SessionSnapshot>>, resolver: Arc<dyn NetworkResolver>) -> Self {
        Self { fields, resolver }
    }

    /// Current address family preference
    pub fn prefers_ipv4(&self) -> bool {
        self.fields.lock().prefer_ipv4
    }

    async fn lookup(&self, host: &str) -> Result<(Vec<IpAddr>, bool)> {
        // Read what we need, then drop the lock before awaiting
        let (network_id, prefer_ipv4) = {
            let fields = self.fields.lock();
            (fields.network_id, fields.prefer_ipv4)
        };

        match self.resolver.lookup(host, network_id).await {
            Ok(addrs) => Ok((addrs, prefer_ipv4)),
            Err(e) => {
                error!("Lookup of '{}' on network {} failed: {}", host, network_id, e);
                Err(Error::unknown_host(host))
            }
        }
    }

    /// All addresses of `host` on this network, preferred family first
    pub async fn resolve_all(&self, host: &str) -> Result<Vec<IpAddr>> {
        let (addrs, prefer_ipv4) = self.lookup(host).await?;
        if addrs.is_empty() {
            error!("Failed to get any address for host '{}'", host);
            return Err(Error::unknown_host(host));
        }
        Ok(order_by_family(addrs, prefer_ipv4))
    }

    /// First address of `host` in the preferred family
    ///
    /// Returns `None` when only the other family is available: unlike
    /// [`resolve_all`](Self::resolve_all) there is no fallback.
    pub async fn resolve_one(&self, host: &str) -> Result<Option<IpAddr>> {
        let (addrs, prefer_ipv4) = self.lookup(host).await?;
        if addrs.is_empty() {
            error!("Failed to get address for host '{}'", host);
            return Ok(None);
        }

        let found = addrs
            .into_iter()
            .find(|addr| is_preferred_family(addr, prefer_ipv4));
        if let Some(addr) = &found {
            debug!("Found matching address: {}", addr);
        }
        Ok(found)
    }
}
