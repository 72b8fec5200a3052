//! `mms-vowifi`: drive a VoWiFi session from the command line
//!
//! Useful for checking what an MMS transaction would see on a given bearer:
//! which addresses a name resolves to, whether the MMSC answers over the
//! session's HTTP pool, how recipient numbers normalize, and what a session
//! looks like on the wire.

mod logging;

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use mms_phone_core::{NumberNormalizer, StaticCountryProvider};
use mms_vowifi_core::{ConnectionProxy, NetworkSession, SessionState, StaticResolver};

use crate::logging::{parse_log_level, setup_logging, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "mms-vowifi", version, about = "Inspect MMS VoWiFi sessions")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "MMS_VOWIFI_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Include source file and line in log lines
    #[arg(long, global = true)]
    log_file_info: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a host name through the session
    Resolve {
        #[command(flatten)]
        session: SessionArgs,

        /// Print only the first address of the preferred family
        #[arg(long)]
        one: bool,

        host: String,
    },

    /// Issue a GET through the session's HTTP pool
    Fetch {
        #[command(flatten)]
        session: SessionArgs,

        /// HTTP proxy to route the request through
        #[arg(long)]
        proxy: Option<String>,

        url: String,
    },

    /// Open a bound TCP connection to host:port
    Connect {
        #[command(flatten)]
        session: SessionArgs,

        host: String,

        port: u16,
    },

    /// Normalize a recipient number to its national digits
    Normalize {
        /// Country of the SIM (ISO 3166 alpha-2)
        #[arg(long)]
        country: Option<String>,

        /// Country used when the SIM has none
        #[arg(long)]
        default_country: Option<String>,

        #[arg(long, default_value_t = 0)]
        sub_id: i32,

        number: String,
    },

    /// Print the parcel encoding of a session as hex
    Encode {
        #[command(flatten)]
        session: SessionArgs,

        #[arg(long, default_value = "CONNECTED")]
        state: SessionState,
    },

    /// Decode a hex parcel and print the session
    Decode { hex: String },
}

/// Session parameters shared by the network commands
#[derive(Args, Debug)]
struct SessionArgs {
    #[arg(long, default_value_t = 0)]
    network_id: i32,

    #[arg(long, default_value_t = 1)]
    session_id: i32,

    #[arg(long, default_value_t = 0)]
    sub_id: i32,

    /// Local IPv4 address of the bearer
    #[arg(long)]
    local_ipv4: Option<String>,

    /// Local IPv6 address of the bearer
    #[arg(long)]
    local_ipv6: Option<String>,

    #[arg(long)]
    prefer_ipv6: bool,

    /// Static host entry `name=ip`, may repeat; replaces the system resolver
    #[arg(long = "host-entry", value_parser = parse_host_entry)]
    host_entries: Vec<(String, IpAddr)>,
}

impl SessionArgs {
    fn session(&self, state: SessionState) -> NetworkSession {
        let mut builder = NetworkSession::builder(self.network_id, self.session_id)
            .sub_id(self.sub_id)
            .state(state)
            .prefer_ipv4(!self.prefer_ipv6);

        if let Some(addr) = &self.local_ipv4 {
            builder = builder.local_ipv4(addr.clone());
        }
        if let Some(addr) = &self.local_ipv6 {
            builder = builder.local_ipv6(addr.clone());
        }

        if !self.host_entries.is_empty() {
            builder = builder.resolver(Arc::new(self.static_resolver()));
        }

        builder.build()
    }

    fn static_resolver(&self) -> StaticResolver {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.host_entries {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }

        names.into_iter().fold(StaticResolver::new(), |resolver, name| {
            let addrs = self
                .host_entries
                .iter()
                .filter(|(entry, _)| entry == name)
                .map(|(_, addr)| *addr);
            resolver.with_host(name, addrs)
        })
    }
}

fn parse_host_entry(s: &str) -> Result<(String, IpAddr)> {
    let (name, addr) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected name=ip, got '{}'", s))?;
    let addr = addr
        .parse::<IpAddr>()
        .with_context(|| format!("invalid address in host entry '{}'", s))?;
    Ok((name.to_string(), addr))
}

fn logging_config(cli: &Cli) -> Result<LoggingConfig> {
    let mut logging = LoggingConfig::new(parse_log_level(&cli.log_level)?);
    if cli.json_logs {
        logging = logging.with_json();
    }
    if cli.log_file_info {
        logging = logging.with_file_info();
    }
    Ok(logging)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&logging_config(&cli)?)?;

    match cli.command {
        Command::Resolve { session, one, host } => {
            let session = session.session(SessionState::Connected);
            debug!("Resolving {} on {}", host, session);
            if one {
                match session.resolve_one(&host).await? {
                    Some(addr) => println!("{}", addr),
                    None => println!("no address of the preferred family"),
                }
            } else {
                for addr in session.resolve_all(&host).await? {
                    println!("{}", addr);
                }
            }
        }

        Command::Fetch { session, proxy, url } => {
            let session = session.session(SessionState::Connected);
            let connection = match proxy {
                Some(proxy) => {
                    let proxy = ConnectionProxy::http(&proxy)?;
                    session.open_connection_via(&url, &proxy)?
                }
                None => session.open_connection(&url)?,
            };

            let response = connection.get().send().await?;
            info!("GET {} -> {}", connection.url(), response.status());
            println!("{}", response.status());
            for (name, value) in response.headers() {
                println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
            }
        }

        Command::Connect { session, host, port } => {
            let session = session.session(SessionState::Connected);
            let stream = session.socket_factory().connect_host(&host, port).await?;
            println!("{} -> {}", stream.local_addr()?, stream.peer_addr()?);
        }

        Command::Normalize {
            country,
            default_country,
            sub_id,
            number,
        } => {
            let mut countries = StaticCountryProvider::new();
            if let Some(country) = country {
                countries = countries.with_sim(sub_id, country);
            }
            if let Some(country) = default_country {
                countries = countries.with_default(country);
            }

            let normalizer = NumberNormalizer::with_countries(Arc::new(countries));
            println!("{}", normalizer.normalize(sub_id, &number));
        }

        Command::Encode { session, state } => {
            let session = session.session(state);
            println!("{}", hex::encode(session.encode()));
        }

        Command::Decode { hex: encoded } => {
            let data = hex::decode(encoded.trim()).context("parcel is not valid hex")?;
            let session = NetworkSession::decode(&data)?;
            println!("{}", session);
        }
    }

    Ok(())
}
