//! Session state, APN tag and the plain value record behind a session

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Bearer state of a VoWiFi network session
///
/// Transitions are owned by the bearer-management layer; any state may be
/// set from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Bearer is being established
    Connecting,

    /// Bearer is up and usable
    Connected,

    /// Bearer has been torn down
    Disconnected,

    /// Nothing is known about the bearer yet
    Unknown,
}

impl SessionState {
    /// Wire name used by the parcel encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECTING" => Ok(Self::Connecting),
            "CONNECTED" => Ok(Self::Connected),
            "DISCONNECTED" => Ok(Self::Disconnected),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(Error::decode(format!("unknown session state '{}'", other))),
        }
    }
}

/// Purpose tag of the bearer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApnType(pub i32);

impl ApnType {
    /// Generic data bearer
    pub const DEFAULT: ApnType = ApnType(0);

    /// MMS bearer
    pub const MMS: ApnType = ApnType(1);

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for ApnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every field of a session, copied out atomically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub network_id: i32,
    pub session_id: i32,
    pub sub_id: i32,
    pub apn_type: ApnType,
    pub state: SessionState,
    pub local_ipv4: Option<String>,
    pub local_ipv6: Option<String>,
    pub pcscf_ipv4: Option<String>,
    pub pcscf_ipv6: Option<String>,
    pub dns_ipv4: Option<String>,
    pub dns_ipv6: Option<String>,
    pub prefer_ipv4: bool,
}

impl SessionSnapshot {
    /// A snapshot with no addresses, preferring IPv4
    pub fn new(network_id: i32, session_id: i32, sub_id: i32, apn_type: ApnType, state: SessionState) -> Self {
        Self {
            network_id,
            session_id,
            sub_id,
            apn_type,
            state,
            local_ipv4: None,
            local_ipv6: None,
            pcscf_ipv4: None,
            pcscf_ipv6: None,
            dns_ipv4: None,
            dns_ipv6: None,
            prefer_ipv4: true,
        }
    }

    /// Local address of the preferred family, if configured
    pub fn preferred_local_addr(&self) -> Option<&str> {
        let addr = if self.prefer_ipv4 {
            self.local_ipv4.as_deref()
        } else {
            self.local_ipv6.as_deref()
        };
        addr.filter(|a| !a.is_empty())
    }
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show(addr: &Option<String>) -> &str {
            addr.as_deref().unwrap_or("null")
        }

        write!(
            f,
            "[sessionId: {}, subId: {}, apnType: {}, state: {}, localIPv4: {}, localIPv6: {}, \
             pcscfIPv4: {}, pcscfIPv6: {}, dnsIPv4: {}, dnsIPv6: {}, preferIPv4: {}, networkId: {}]",
            self.session_id,
            self.sub_id,
            self.apn_type,
            self.state,
            show(&self.local_ipv4),
            show(&self.local_ipv6),
            show(&self.pcscf_ipv4),
            show(&self.pcscf_ipv6),
            show(&self.dns_ipv4),
            show(&self.dns_ipv6),
            self.prefer_ipv4,
            self.network_id,
        )
    }
}
