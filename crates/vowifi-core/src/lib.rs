//! Network-bound sessions for MMS over VoWiFi.
//!
//! A [`NetworkSession`] represents one Wi-Fi calling bearer. Everything MMS
//! sends over that bearer is created through the session:
//!
//! - names are resolved on the bearer's network only, preferred address
//!   family first ([`NetworkSession::resolve_all`]);
//! - TCP sockets are bound to the bearer's local address before they connect
//!   ([`BoundSocketFactory`]);
//! - HTTP requests use a client with a connection pool private to the session
//!   ([`HttpConnectionFactory`]).
//!
//! Sessions can be shipped across process boundaries with the fixed-order
//! encoding in [`parcel`].

// Error handling
pub mod error;

// Process-wide pool settings
pub mod config;

// Session state and value record
pub mod state;

// Network-scoped resolution
pub mod resolver;

// Bound sockets
pub mod socket;

// Session HTTP client
pub mod http;

// Cross-process encoding
pub mod parcel;

// The session itself
pub mod session;

// Public exports
pub use config::PoolSettings;
pub use error::{Error, Result};
pub use http::{ConnectionProxy, HttpConnection, HttpConnectionFactory};
pub use resolver::{NetworkResolver, SessionResolver, StaticResolver, SystemResolver};
pub use session::{NetworkSession, NetworkSessionBuilder};
pub use socket::BoundSocketFactory;
pub use state::{ApnType, SessionSnapshot, SessionState};

/// Re-export of common types
pub mod prelude {
    pub use super::{
        ApnType, BoundSocketFactory, ConnectionProxy, Error, HttpConnection, NetworkResolver,
        NetworkSession, PoolSettings, Result, SessionSnapshot, SessionState,
    };
}
