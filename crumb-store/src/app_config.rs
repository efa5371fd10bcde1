use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Base URL of the storage REST API, e.g. `https://<project>.supabase.co/storage/v1`.
    pub url: String,
    pub service_key: String,
    pub slip_bucket: String,
    pub product_bucket: String,
    /// When set, checkout fails (and rolls back) if no slip upload URL can be issued.
    #[serde(default = "default_require_slip_url")]
    pub require_slip_url: bool,
}

fn default_require_slip_url() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `CRUMB__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("CRUMB").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
