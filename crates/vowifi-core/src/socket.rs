//! Sockets bound to a session's VoWiFi address
//!
//! The factory decides its local bind address once, when it is built. Later
//! changes to the session's local addresses are not picked up by a factory
//! that already exists.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::resolver::SessionResolver;
use crate::state::SessionSnapshot;

/// Local side of a connection: an optional address plus a port
///
/// A missing address means the wildcard address of the remote's family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocalEndpoint {
    ip: Option<IpAddr>,
    port: u16,
}

impl LocalEndpoint {
    fn bind_addr_for(&self, remote: &SocketAddr) -> Option<SocketAddr> {
        match self.ip {
            Some(ip) => Some(SocketAddr::new(ip, self.port)),
            // Wildcard with an ephemeral port is what connect() does anyway
            None if self.port == 0 => None,
            None => Some(SocketAddr::new(unspecified(remote.is_ipv4()), self.port)),
        }
    }
}

fn unspecified(ipv4: bool) -> IpAddr {
    if ipv4 {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    }
}

/// Create a non-blocking TCP socket for `family_of`'s family, optionally
/// bound to `local`
fn open_socket(family_of: SocketAddr, local: Option<LocalEndpoint>) -> io::Result<TcpSocket> {
    let socket = Socket::new(Domain::for_address(family_of), Type::STREAM, Some(Protocol::TCP))?;

    if let Some(bind_addr) = local.and_then(|l| l.bind_addr_for(&family_of)) {
        socket.bind(&SockAddr::from(bind_addr))?;
    }

    socket.set_nonblocking(true)?;
    let std_stream: std::net::TcpStream = socket.into();
    Ok(TcpSocket::from_std_stream(std_stream))
}

/// Try each candidate in order until one attempt succeeds
///
/// Only the last candidate's error is returned; earlier ones are dropped.
/// No candidates at all means the host is unknown.
pub(crate) async fn connect_candidates<T, F, Fut>(host: &str, candidates: &[IpAddr], mut attempt: F) -> Result<T>
where
    F: FnMut(IpAddr) -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut last_error = None;

    for (index, ip) in candidates.iter().enumerate() {
        match attempt(*ip).await {
            Ok(value) => {
                debug!("Connected to '{}' via {} (candidate {} of {})", host, ip, index + 1, candidates.len());
                return Ok(value);
            }
            Err(e) => {
                debug!("Candidate {} for '{}' failed: {}", ip, host, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(Error::Io(e)),
        None => Err(Error::unknown_host(host)),
    }
}

/// Produces TCP sockets whose traffic leaves from the session's local address
/// and whose names are resolved on the session's network
pub struct BoundSocketFactory {
    lookup: SessionResolver,
    local_addr: Option<IpAddr>,
    prefer_ipv4: bool,
}

impl BoundSocketFactory {
    pub(crate) fn new(snapshot: &SessionSnapshot, lookup: SessionResolver) -> Self {
        let local_addr = match snapshot.preferred_local_addr() {
            Some(text) => match text.parse::<IpAddr>() {
                Ok(ip) => {
                    debug!("Set local bind address to {}", ip);
                    Some(ip)
                }
                Err(_) => {
                    warn!("Ignoring unparsable local address '{}'", text);
                    None
                }
            },
            None => {
                error!(
                    "Local {} address not set, sockets will not be bound to the VoWiFi address",
                    if snapshot.prefer_ipv4 { "IPv4" } else { "IPv6" }
                );
                None
            }
        };

        Self {
            lookup,
            local_addr,
            prefer_ipv4: snapshot.prefer_ipv4,
        }
    }

    /// Local address every socket is bound to, if one was available when
    /// the factory was built
    pub fn local_addr(&self) -> Option<IpAddr> {
        self.local_addr
    }

    /// Connect to `host`, binding to `local_port` on the session address
    ///
    /// `local_host` is only used when the factory has no address of its own.
    pub async fn connect_host_from(
        &self,
        host: &str,
        port: u16,
        local_host: Option<IpAddr>,
        local_port: u16,
    ) -> Result<TcpStream> {
        let local = LocalEndpoint {
            ip: self.local_addr.or(local_host),
            port: local_port,
        };
        self.connect_to_host(host, port, Some(local)).await
    }

    /// Connect to `host` from the session address with an ephemeral port
    pub async fn connect_host(&self, host: &str, port: u16) -> Result<TcpStream> {
        let local = self.local_addr.map(|ip| LocalEndpoint { ip: Some(ip), port: 0 });
        self.connect_to_host(host, port, local).await
    }

    /// Connect to a concrete address, binding to `local_port` on the session
    /// address (or `local_addr` when the factory has none)
    pub async fn connect_addr_from(
        &self,
        addr: IpAddr,
        port: u16,
        local_addr: Option<IpAddr>,
        local_port: u16,
    ) -> Result<TcpStream> {
        let remote = SocketAddr::new(addr, port);
        let local = LocalEndpoint {
            ip: self.local_addr.or(local_addr),
            port: local_port,
        };
        let socket = open_socket(remote, Some(local))?;
        Ok(socket.connect(remote).await?)
    }

    /// Connect to a concrete address with no caller-supplied local endpoint
    pub async fn connect_addr(&self, addr: IpAddr, port: u16) -> Result<TcpStream> {
        let remote = SocketAddr::new(addr, port);
        let local = self.local_addr.map(|ip| LocalEndpoint { ip: Some(ip), port: 0 });
        let socket = open_socket(remote, local)?;
        Ok(socket.connect(remote).await?)
    }

    /// A socket bound to the session address but not yet connected
    ///
    /// Without a session address the socket is left unbound, in the
    /// session's preferred family.
    pub fn unconnected(&self) -> Result<TcpSocket> {
        let family_of = SocketAddr::new(self.local_addr.unwrap_or_else(|| unspecified(self.prefer_ipv4)), 0);
        let local = self.local_addr.map(|ip| LocalEndpoint { ip: Some(ip), port: 0 });
        Ok(open_socket(family_of, local)?)
    }

    async fn connect_to_host(&self, host: &str, port: u16, local: Option<LocalEndpoint>) -> Result<TcpStream> {
        // Lookup addresses only on this network
        let candidates = self.lookup.resolve_all(host).await?;

        connect_candidates(host, &candidates, move |ip| {
            let remote = SocketAddr::new(ip, port);
            async move {
                let socket = open_socket(remote, local)?;
                socket.connect(remote).await
            }
        })
        .await
    }
}

impl std::fmt::Debug for BoundSocketFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.local_addr {
            Some(addr) => write!(f, "BoundSocketFactory({})", addr),
            None => write!(f, "BoundSocketFactory(<unbound>)"),
        }
    }
}
