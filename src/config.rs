use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// External base URL that download references are minted under.
    pub public_base_url: String,
    /// Background-removal API endpoint; removal is skipped when unset.
    pub removal_endpoint: Option<String>,
    /// API key for the background-removal service.
    pub removal_api_key: Option<String>,
    pub upload_max_attempts: u32,
    pub upload_base_delay_secs: u64,
    pub settle_delay_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Scan catalog and alarm service")]
pub struct Args {
    /// Host to bind to (overrides WAKESCAN_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides WAKESCAN_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blob payloads are stored (overrides WAKESCAN_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides WAKESCAN_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL for download references (overrides WAKESCAN_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Background-removal endpoint (overrides WAKESCAN_REMOVAL_ENDPOINT)
    #[arg(long)]
    pub removal_endpoint: Option<String>,

    /// Background-removal API key (overrides WAKESCAN_REMOVAL_API_KEY)
    #[arg(long)]
    pub removal_api_key: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("WAKESCAN_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = optional_number::<u16>("WAKESCAN_PORT")?.unwrap_or(3000);
        let env_storage =
            env::var("WAKESCAN_STORAGE_DIR").unwrap_or_else(|_| "./data/blobs".into());
        let env_db = env::var("WAKESCAN_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/wakescan.db".into());
        let env_public_base = env::var("WAKESCAN_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into());
        let env_removal_endpoint = env::var("WAKESCAN_REMOVAL_ENDPOINT").ok();
        let env_removal_key = env::var("WAKESCAN_REMOVAL_API_KEY").ok();
        let upload_max_attempts = optional_number::<u32>("WAKESCAN_UPLOAD_MAX_ATTEMPTS")?
            .unwrap_or(3)
            .max(1);
        let upload_base_delay_secs =
            optional_number::<u64>("WAKESCAN_UPLOAD_BASE_DELAY_SECS")?.unwrap_or(2);
        let settle_delay_secs = optional_number::<u64>("WAKESCAN_SETTLE_DELAY_SECS")?.unwrap_or(2);

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url: args.public_base_url.unwrap_or(env_public_base),
            removal_endpoint: args.removal_endpoint.or(env_removal_endpoint),
            removal_api_key: args.removal_api_key.or(env_removal_key),
            upload_max_attempts,
            upload_base_delay_secs,
            settle_delay_secs,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Endpoint + key for the background-removal service, if both are set.
    pub fn removal(&self) -> Option<(&str, &str)> {
        match (&self.removal_endpoint, &self.removal_api_key) {
            (Some(endpoint), Some(key)) => Some((endpoint, key)),
            _ => None,
        }
    }
}

/// Read an optional numeric env var, failing loudly on malformed values.
fn optional_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => {
            let parsed = value
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value))?;
            Ok(Some(parsed))
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
