//! HTTP connections that egress through one session
//!
//! Each session owns a private `reqwest` connection pool. Names are resolved
//! through the session's network and every connection is bound to the socket
//! factory's local address, so nothing travels over the default route.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::{Client, Method, RequestBuilder};
use tracing::{debug, info};
use url::Url;

use crate::config::PoolSettings;
use crate::error::{Error, Result};
use crate::resolver::SessionResolver;

/// Proxy to use for a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionProxy {
    /// Connect straight to the origin
    Direct,

    /// Tunnel through an HTTP proxy
    Http(Url),
}

impl ConnectionProxy {
    /// HTTP proxy at `url`
    pub fn http(url: &str) -> Result<Self> {
        parse_http_url(url).map(Self::Http)
    }
}

/// DNS hook handing every lookup to the session resolver
struct SessionDns {
    lookup: SessionResolver,
}

impl Resolve for SessionDns {
    fn resolve(&self, name: Name) -> Resolving {
        let lookup = self.lookup.clone();
        Box::pin(async move {
            let host = name.as_str().to_string();
            debug!("DNS lookup on session network for '{}'", host);

            let addrs = lookup
                .resolve_all(&host)
                .await
                .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

            // The connector fills in the port from the URL
            let addrs: Addrs = Box::new(addrs.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok::<Addrs, Box<dyn StdError + Send + Sync>>(addrs)
        })
    }
}

/// Everything needed to build one of the session's clients
#[derive(Clone)]
struct ClientSettings {
    dns: Arc<SessionDns>,
    local_addr: Option<IpAddr>,
    pool: PoolSettings,
}

impl ClientSettings {
    fn build(&self, proxy: Option<&Url>) -> Result<Client> {
        let builder = Client::builder()
            .dns_resolver(self.dns.clone())
            .local_address(self.local_addr)
            .pool_max_idle_per_host(self.pool.max_idle_connections)
            .pool_idle_timeout(self.pool.keep_alive_duration);

        let builder = match proxy {
            Some(url) => builder.proxy(reqwest::Proxy::all(url.clone())?),
            None => builder.no_proxy(),
        };

        Ok(builder.build()?)
    }
}

/// The session's HTTP client and its private connection pool
pub struct HttpConnectionFactory {
    settings: ClientSettings,
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
}

impl HttpConnectionFactory {
    pub(crate) fn new(lookup: SessionResolver, local_addr: Option<IpAddr>, pool: PoolSettings) -> Result<Self> {
        let settings = ClientSettings {
            dns: Arc::new(SessionDns { lookup }),
            local_addr,
            pool,
        };
        let direct = settings.build(None)?;

        info!(
            "Created session HTTP pool (max idle {}, keep-alive {:?}, local address {:?})",
            pool.max_idle_connections, pool.keep_alive_duration, local_addr
        );

        Ok(Self {
            settings,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    /// Pool sizing this factory was built with
    pub fn pool_settings(&self) -> PoolSettings {
        self.settings.pool
    }

    /// Local address outgoing connections are bound to
    pub fn local_addr(&self) -> Option<IpAddr> {
        self.settings.local_addr
    }

    /// Open `url` without a proxy
    pub fn open_connection(&self, url: &str) -> Result<HttpConnection> {
        self.open_connection_via(url, &ConnectionProxy::Direct)
    }

    /// Open `url` through `proxy`
    ///
    /// Proxied clients are created on first use of each proxy and reuse the
    /// same session-private settings.
    pub fn open_connection_via(&self, url: &str, proxy: &ConnectionProxy) -> Result<HttpConnection> {
        let url = parse_http_url(url)?;

        let client = match proxy {
            ConnectionProxy::Direct => self.direct.clone(),
            ConnectionProxy::Http(proxy_url) => {
                let mut proxied = self.proxied.lock();
                match proxied.get(proxy_url.as_str()) {
                    Some(client) => client.clone(),
                    None => {
                        debug!("Creating session HTTP client for proxy {}", proxy_url);
                        let client = self.settings.build(Some(proxy_url))?;
                        proxied.insert(proxy_url.as_str().to_string(), client.clone());
                        client
                    }
                }
            }
        };

        Ok(HttpConnection { client, url })
    }
}

impl std::fmt::Debug for HttpConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnectionFactory")
            .field("local_addr", &self.settings.local_addr)
            .field("pool", &self.settings.pool)
            .finish()
    }
}

fn parse_http_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| Error::malformed_url(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::malformed_url(format!("unsupported protocol '{}' in {}", other, url))),
    }
}

/// A URL opened on a session, ready to issue requests
#[derive(Debug, Clone)]
pub struct HttpConnection {
    client: Client,
    url: Url,
}

impl HttpConnection {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The session client backing this connection
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn request(&self, method: Method) -> RequestBuilder {
        self.client.request(method, self.url.clone())
    }

    pub fn get(&self) -> RequestBuilder {
        self.request(Method::GET)
    }

    pub fn post(&self) -> RequestBuilder {
        self.request(Method::POST)
    }
}
