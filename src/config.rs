use std::fs::read_to_string;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    ///
    /// caster listen addresses
    ///
    /// Multiple addresses can be bound at once; both ipv4 and ipv6 are
    /// accepted.
    ///
    #[serde(default = "ServerConfig::listen")]
    pub listen: Vec<SocketAddr>,
    ///
    /// server identification string
    ///
    /// Sent as the `Server:` header on every response and used to build the
    /// sourcetable's own `Software` banner.
    ///
    #[serde(default = "ServerConfig::server_name")]
    pub server_name: String,
    ///
    /// global cap on simultaneously admitted clients
    ///
    #[serde(default = "ServerConfig::max_clients")]
    pub max_clients: usize,
    ///
    /// per-mountpoint cap on simultaneously admitted clients
    ///
    #[serde(default = "ServerConfig::max_clients_per_source")]
    pub max_clients_per_source: usize,
    ///
    /// caster software version string, reported in the sourcetable header
    ///
    #[serde(default = "ServerConfig::version")]
    pub version: String,
    ///
    /// Ntrip-Version header value advertised in responses
    ///
    #[serde(default = "ServerConfig::ntrip_version")]
    pub ntrip_version: String,
}

impl ServerConfig {
    fn listen() -> Vec<SocketAddr> {
        vec!["0.0.0.0:2101".parse().unwrap()]
    }

    fn server_name() -> String {
        "NTRIP Caster".to_string()
    }

    fn max_clients() -> usize {
        256
    }

    fn max_clients_per_source() -> usize {
        64
    }

    fn version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn ntrip_version() -> String {
        "Ntrip/2.0".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
            server_name: Self::server_name(),
            max_clients: Self::max_clients(),
            max_clients_per_source: Self::max_clients_per_source(),
            version: Self::version(),
            ntrip_version: Self::ntrip_version(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct AuthConfig {
    ///
    /// mount authentication file
    ///
    /// Lines of the form `/mount:user1:pass1,user2:pass2`. Reloaded
    /// wholesale on a stale mtime, see `rehash-interval-secs`.
    ///
    pub mount_file: PathBuf,
    ///
    /// how often the background sweep checks the mount file's mtime
    ///
    #[serde(default = "AuthConfig::rehash_interval_secs")]
    pub rehash_interval_secs: u64,
}

impl AuthConfig {
    fn rehash_interval_secs() -> u64 {
        60
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct SourcetableConfig {
    ///
    /// sourcetable.dat file served to clients requesting `/`
    ///
    /// When absent, the caster still runs but answers every sourcetable
    /// request with "NO SOURCETABLE AVAILABLE".
    ///
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for SourcetableConfig {
    fn default() -> Self {
        Self { file: None }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub sourcetable: SourcetableConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    ///
    /// Specify the configuration file path
    ///
    /// Example: ntrip-caster --config /etc/ntrip-caster/config.toml
    ///
    #[arg(long, short)]
    config: String,
}

impl Config {
    ///
    /// Load configuration from the file named on the command line.
    ///
    pub fn load() -> Result<Self> {
        Ok(toml::from_str::<Self>(&read_to_string(Cli::parse().config)?)?)
    }
}
