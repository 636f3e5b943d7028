use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "ADREST";

#[derive(Parser, Debug)]
#[command(name = "adrest")]
#[command(about = "A REST/JSON facade over Active Directory")]
#[command(version)]
pub struct CliArgs {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_address: String,

    /// YAML file persisting connection profiles
    #[arg(long, value_name = "FILE")]
    pub profiles: Option<PathBuf>,

    /// YAML file with extra attribute definitions
    #[arg(long, value_name = "FILE")]
    pub schema: Option<PathBuf>,

    /// Serve an in-memory directory seeded from this YAML file instead of
    /// connecting to LDAP servers
    #[arg(long, value_name = "FILE")]
    pub sandbox: Option<PathBuf>,

    /// Settings file (Kerberos tools, timeouts)
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Set log level: debug, info, warn, error
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KerberosSettings {
    #[serde(default = "default_klist")]
    pub klist: PathBuf,
    #[serde(default = "default_kinit")]
    pub kinit: PathBuf,
}

fn default_klist() -> PathBuf {
    PathBuf::from("/usr/bin/klist")
}

fn default_kinit() -> PathBuf {
    PathBuf::from("/usr/bin/kinit")
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for KerberosSettings {
    fn default() -> Self {
        Self {
            klist: default_klist(),
            kinit: default_kinit(),
        }
    }
}

/// Layered runtime settings: an optional file, then `ADREST_*` variables
/// (nested keys joined with `__`, e.g. `ADREST_KERBEROS__KINIT`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub kerberos: KerberosSettings,
    /// Seconds allowed for the LDAP TCP/TLS handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kerberos: KerberosSettings::default(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Settings {
    pub fn load(file: Option<&Path>) -> crate::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::AdRestError::Config(format!("Invalid settings: {}", e)))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub profiles_file: Option<PathBuf>,
    pub schema_file: Option<PathBuf>,
    pub sandbox_file: Option<PathBuf>,
    pub settings: Settings,
    pub log_level: tracing::Level,
}

pub fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

impl Config {
    pub fn from_cli_args(args: CliArgs) -> crate::Result<Self> {
        // Handle IPv6 addresses by adding brackets if needed
        let bind_address = if args.bind_address.contains(':') && !args.bind_address.starts_with('[')
        {
            format!("[{}]:{}", args.bind_address, args.port)
        } else {
            format!("{}:{}", args.bind_address, args.port)
        };

        let bind_address = bind_address
            .parse()
            .map_err(|e| crate::AdRestError::Config(format!("Invalid bind address: {}", e)))?;

        let log_level = if args.verbose {
            tracing::Level::DEBUG
        } else {
            parse_log_level(&args.log_level)
        };

        let settings = Settings::load(args.settings.as_deref())?;

        Ok(Config {
            bind_address,
            profiles_file: args.profiles,
            schema_file: args.schema,
            sandbox_file: args.sandbox,
            settings,
            log_level,
        })
    }

    pub fn is_sandbox(&self) -> bool {
        self.sandbox_file.is_some()
    }
}
