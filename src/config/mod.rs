use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// When unset, users live in an in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    /// Offset from UTC used when formatting expiry timestamps for clients.
    pub display_offset_minutes: i32,
    pub leeway_secs: u64,
    pub revocation_sweep_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Self::defaults()?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only; no files or environment variables are read.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        Self::defaults()?
            .set_override("environment", "test")?
            .set_override("auth.jwt_secret", "test_secret")?
            .set_override("database.max_connections", 2)?
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 5)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("auth.jwt_secret", "development_secret")?
            .set_default("auth.issuer", "bearer-auth-server")?
            .set_default("auth.access_ttl_minutes", 3)?
            .set_default("auth.refresh_ttl_minutes", 4)?
            .set_default("auth.display_offset_minutes", 420)?
            .set_default("auth.leeway_secs", 0)?
            .set_default("auth.revocation_sweep_secs", 60)?
            .set_default("cors.enabled", true)?
            .set_default("cors.allow_any_origin", false)?
            .set_default("cors.allowed_origins", Vec::<String>::new())?
            .set_default("cors.max_age", 3600)
    }
}
