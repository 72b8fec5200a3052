//! The VoWiFi network session
//!
//! A [`NetworkSession`] describes one VoWiFi bearer: which network it runs
//! on, the addresses the bearer was given, and which address family to
//! prefer. All MMS traffic for the bearer is created through it.
//!
//! Every field lives in one record behind one lock. Accessors hold the lock
//! for a single read or write only, and no lock is held while resolving or
//! connecting.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::net::IpAddr;
use tracing::debug;

use crate::config::PoolSettings;
use crate::error::Result;
use crate::http::{ConnectionProxy, HttpConnection, HttpConnectionFactory};
use crate::parcel;
use crate::resolver::{NetworkResolver, SessionResolver, SystemResolver};
use crate::socket::BoundSocketFactory;
use crate::state::{ApnType, SessionSnapshot, SessionState};

/// One VoWiFi bearer and the factories bound to it
pub struct NetworkSession {
    fields: Arc<Mutex<SessionSnapshot>>,
    resolver: Arc<dyn NetworkResolver>,
    pool_settings: PoolSettings,
    socket_factory: OnceCell<Arc<BoundSocketFactory>>,
    connection_factory: OnceCell<Arc<HttpConnectionFactory>>,
}

impl NetworkSession {
    /// Create an MMS session in the given state
    pub fn new(network_id: i32, session_id: i32, sub_id: i32, state: SessionState) -> Self {
        Self::from_snapshot(SessionSnapshot::new(network_id, session_id, sub_id, ApnType::MMS, state))
    }

    /// Create a session for `apn_type` whose state is not known yet
    pub fn with_apn_type(network_id: i32, session_id: i32, sub_id: i32, apn_type: ApnType) -> Self {
        Self::from_snapshot(SessionSnapshot::new(
            network_id,
            session_id,
            sub_id,
            apn_type,
            SessionState::Unknown,
        ))
    }

    /// Start building a session with its addresses known up front
    pub fn builder(network_id: i32, session_id: i32) -> NetworkSessionBuilder {
        NetworkSessionBuilder::new(network_id, session_id)
    }

    /// Create a session from a plain value, using the system resolver
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            fields: Arc::new(Mutex::new(snapshot)),
            resolver: Arc::new(SystemResolver),
            pool_settings: *PoolSettings::global(),
            socket_factory: OnceCell::new(),
            connection_factory: OnceCell::new(),
        }
    }

    /// Decode a session written by [`encode`](Self::encode)
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(Self::from_snapshot(parcel::decode(data)?))
    }

    /// Encode every field for cross-process transfer
    pub fn encode(&self) -> Bytes {
        parcel::encode(&self.snapshot())
    }

    /// Replace the per-network resolver
    ///
    /// Factories already built keep resolving through the old one, so this
    /// belongs right after construction.
    pub fn with_resolver(mut self, resolver: Arc<dyn NetworkResolver>) -> Self {
        self.resolver = resolver;
        self.socket_factory = OnceCell::new();
        self.connection_factory = OnceCell::new();
        self
    }

    /// Override the process-wide pool settings for this session
    pub fn with_pool_settings(mut self, pool_settings: PoolSettings) -> Self {
        self.pool_settings = pool_settings;
        self.connection_factory = OnceCell::new();
        self
    }

    /// All fields, copied under a single lock acquisition
    pub fn snapshot(&self) -> SessionSnapshot {
        self.fields.lock().clone()
    }

    /// Change several fields in one critical section
    ///
    /// Readers and [`snapshot`](Self::snapshot) see either none or all of
    /// the changes. The closure runs with the lock held and must not block.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionSnapshot) -> R) -> R {
        f(&mut *self.fields.lock())
    }

    pub fn state(&self) -> SessionState {
        self.fields.lock().state
    }

    /// Set the bearer state; any transition is accepted
    pub fn set_state(&self, state: SessionState) {
        self.fields.lock().state = state;
    }

    pub fn apn_type(&self) -> ApnType {
        self.fields.lock().apn_type
    }

    pub fn sub_id(&self) -> i32 {
        self.fields.lock().sub_id
    }

    pub fn session_id(&self) -> i32 {
        self.fields.lock().session_id
    }

    pub fn network_id(&self) -> i32 {
        self.fields.lock().network_id
    }

    pub fn set_network_id(&self, network_id: i32) {
        self.fields.lock().network_id = network_id;
    }

    pub fn ipv4_addr(&self) -> Option<String> {
        self.fields.lock().local_ipv4.clone()
    }

    pub fn set_ipv4_addr(&self, addr: Option<String>) {
        self.fields.lock().local_ipv4 = addr;
    }

    pub fn ipv6_addr(&self) -> Option<String> {
        self.fields.lock().local_ipv6.clone()
    }

    pub fn set_ipv6_addr(&self, addr: Option<String>) {
        self.fields.lock().local_ipv6 = addr;
    }

    pub fn ipv4_pcscf_addr(&self) -> Option<String> {
        self.fields.lock().pcscf_ipv4.clone()
    }

    pub fn set_ipv4_pcscf_addr(&self, addr: Option<String>) {
        self.fields.lock().pcscf_ipv4 = addr;
    }

    pub fn ipv6_pcscf_addr(&self) -> Option<String> {
        self.fields.lock().pcscf_ipv6.clone()
    }

    pub fn set_ipv6_pcscf_addr(&self, addr: Option<String>) {
        self.fields.lock().pcscf_ipv6 = addr;
    }

    pub fn ipv4_dns_addr(&self) -> Option<String> {
        self.fields.lock().dns_ipv4.clone()
    }

    pub fn set_ipv4_dns_addr(&self, addr: Option<String>) {
        self.fields.lock().dns_ipv4 = addr;
    }

    pub fn ipv6_dns_addr(&self) -> Option<String> {
        self.fields.lock().dns_ipv6.clone()
    }

    pub fn set_ipv6_dns_addr(&self, addr: Option<String>) {
        self.fields.lock().dns_ipv6 = addr;
    }

    pub fn prefers_ipv4(&self) -> bool {
        self.fields.lock().prefer_ipv4
    }

    /// Switch the address family preference
    ///
    /// Resolution follows the new preference immediately; a socket factory
    /// that already exists keeps the bind address it chose.
    pub fn set_prefer_ipv4(&self, prefer_ipv4: bool) {
        self.fields.lock().prefer_ipv4 = prefer_ipv4;
    }

    /// Resolution handle scoped to this session's network
    pub fn name_resolver(&self) -> SessionResolver {
        SessionResolver::new(self.fields.clone(), self.resolver.clone())
    }

    /// Resolve `host` on this network, preferred family first
    pub async fn resolve_all(&self, host: &str) -> Result<Vec<IpAddr>> {
        self.name_resolver().resolve_all(host).await
    }

    /// First address of `host` in the preferred family, without fallback
    pub async fn resolve_one(&self, host: &str) -> Result<Option<IpAddr>> {
        self.name_resolver().resolve_one(host).await
    }

    /// The socket factory bound to this session, built on first use
    pub fn socket_factory(&self) -> Arc<BoundSocketFactory> {
        self.socket_factory
            .get_or_init(|| {
                debug!("Building socket factory for session {}", self.session_id());
                Arc::new(BoundSocketFactory::new(&self.snapshot(), self.name_resolver()))
            })
            .clone()
    }

    /// The HTTP connection factory owning this session's private pool,
    /// built at most once
    pub fn connection_factory(&self) -> Result<Arc<HttpConnectionFactory>> {
        self.connection_factory
            .get_or_try_init(|| {
                let local_addr = self.socket_factory().local_addr();
                HttpConnectionFactory::new(self.name_resolver(), local_addr, self.pool_settings).map(Arc::new)
            })
            .cloned()
    }

    /// Open `url` on this network without a proxy
    pub fn open_connection(&self, url: &str) -> Result<HttpConnection> {
        self.connection_factory()?.open_connection(url)
    }

    /// Open `url` on this network through `proxy`
    pub fn open_connection_via(&self, url: &str, proxy: &ConnectionProxy) -> Result<HttpConnection> {
        self.connection_factory()?.open_connection_via(url, proxy)
    }
}

impl Clone for NetworkSession {
    /// Copy every field atomically; the copy builds its own factories
    fn clone(&self) -> Self {
        Self {
            fields: Arc::new(Mutex::new(self.snapshot())),
            resolver: self.resolver.clone(),
            pool_settings: self.pool_settings,
            socket_factory: OnceCell::new(),
            connection_factory: OnceCell::new(),
        }
    }
}

impl fmt::Display for NetworkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.snapshot(), f)
    }
}

impl fmt::Debug for NetworkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkSession")
            .field("fields", &self.snapshot())
            .field("pool_settings", &self.pool_settings)
            .finish()
    }
}

/// Builder for a session whose addresses are known when it is created
pub struct NetworkSessionBuilder {
    snapshot: SessionSnapshot,
    resolver: Option<Arc<dyn NetworkResolver>>,
    pool_settings: Option<PoolSettings>,
}

impl NetworkSessionBuilder {
    fn new(network_id: i32, session_id: i32) -> Self {
        Self {
            snapshot: SessionSnapshot::new(network_id, session_id, 0, ApnType::DEFAULT, SessionState::Unknown),
            resolver: None,
            pool_settings: None,
        }
    }

    pub fn sub_id(mut self, sub_id: i32) -> Self {
        self.snapshot.sub_id = sub_id;
        self
    }

    pub fn apn_type(mut self, apn_type: ApnType) -> Self {
        self.snapshot.apn_type = apn_type;
        self
    }

    pub fn state(mut self, state: SessionState) -> Self {
        self.snapshot.state = state;
        self
    }

    pub fn local_ipv4(mut self, addr: impl Into<String>) -> Self {
        self.snapshot.local_ipv4 = Some(addr.into());
        self
    }

    pub fn local_ipv6(mut self, addr: impl Into<String>) -> Self {
        self.snapshot.local_ipv6 = Some(addr.into());
        self
    }

    pub fn pcscf_ipv4(mut self, addr: impl Into<String>) -> Self {
        self.snapshot.pcscf_ipv4 = Some(addr.into());
        self
    }

    pub fn pcscf_ipv6(mut self, addr: impl Into<String>) -> Self {
        self.snapshot.pcscf_ipv6 = Some(addr.into());
        self
    }

    pub fn dns_ipv4(mut self, addr: impl Into<String>) -> Self {
        self.snapshot.dns_ipv4 = Some(addr.into());
        self
    }

    pub fn dns_ipv6(mut self, addr: impl Into<String>) -> Self {
        self.snapshot.dns_ipv6 = Some(addr.into());
        self
    }

    pub fn prefer_ipv4(mut self, prefer_ipv4: bool) -> Self {
        self.snapshot.prefer_ipv4 = prefer_ipv4;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn NetworkResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn pool_settings(mut self, pool_settings: PoolSettings) -> Self {
        self.pool_settings = Some(pool_settings);
        self
    }

    pub fn build(self) -> NetworkSession {
        let mut session = NetworkSession::from_snapshot(self.snapshot);
        if let Some(resolver) = self.resolver {
            session = session.with_resolver(resolver);
        }
        if let Some(pool_settings) = self.pool_settings {
            session = session.with_pool_settings(pool_settings);
        }
        session
    }
}
