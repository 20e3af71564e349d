//! Process-wide configuration, loaded at startup.
//!
//! A `clap::Parser` CLI struct layered over environment variables, each field
//! resolved with a `config_defaults` fallback function rather than scattered
//! `env::var` calls at the point of use.

use std::net::IpAddr;

use clap::Parser;
use uuid::Uuid;

/// CLI arguments for the Flow402 gateway server.
#[derive(Parser, Debug)]
#[command(name = "flow402")]
#[command(about = "Flow402 credit-metering gateway")]
struct CliArgs {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Bind address host.
    #[arg(long, env = "HOST")]
    host: Option<IpAddr>,

    /// Bind address port.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// The single tenant this process is authorized to serve.
    #[arg(long, env = "FLOW402_TENANT_ID")]
    tenant_id: Option<Uuid>,

    /// HMAC timestamp skew window, in seconds.
    #[arg(long, env = "SIGNATURE_SKEW_SECONDS")]
    signature_skew_seconds: Option<u64>,

    /// Idempotency reservation TTL, in hours.
    #[arg(long, env = "IDEMPOTENCY_TTL_HOURS")]
    idempotency_ttl_hours: Option<i64>,
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub tenant_id: Uuid,
    pub signature_skew_seconds: u64,
    pub idempotency_ttl_hours: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is required (set the env var or pass --database-url)")]
    MissingDatabaseUrl,
    #[error("FLOW402_TENANT_ID is required (set the env var or pass --tenant-id)")]
    MissingTenantId,
}

pub mod config_defaults {
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8402;
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_SIGNATURE_SKEW_SECONDS: u64 = flow402_gateway::signature::DEFAULT_SKEW_SECONDS;
    pub const DEFAULT_IDEMPOTENCY_TTL_HOURS: i64 = flow402_gateway::idempotency::DEFAULT_TTL_HOURS;

    pub fn default_host() -> IpAddr {
        DEFAULT_HOST.parse().expect("DEFAULT_HOST is a valid IPv4 literal")
    }
}

impl Config {
    /// Parses CLI args (falling back to env vars via `clap`'s `env` attribute),
    /// then layers hardcoded defaults on top for anything still unset.
    pub fn load() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Ok(Self {
            database_url: args.database_url.ok_or(ConfigError::MissingDatabaseUrl)?,
            host: args.host.unwrap_or_else(config_defaults::default_host),
            port: args.port.unwrap_or(config_defaults::DEFAULT_PORT),
            tenant_id: args.tenant_id.ok_or(ConfigError::MissingTenantId)?,
            signature_skew_seconds: args
                .signature_skew_seconds
                .unwrap_or(config_defaults::DEFAULT_SIGNATURE_SKEW_SECONDS),
            idempotency_ttl_hours: args
                .idempotency_ttl_hours
                .unwrap_or(config_defaults::DEFAULT_IDEMPOTENCY_TTL_HOURS),
        })
    }
}
