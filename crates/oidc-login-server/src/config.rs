use oidc_login_auth::config::AuthConfig;
use oidc_login_auth::federation::Provider;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Discovery, token, login and bearer settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Trusted OpenID Connect providers, tried in this order for bearer tokens
    #[serde(default)]
    pub providers: Vec<Provider>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout.is_zero() {
            return Err("server.request_timeout must be > 0".into());
        }

        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }

        self.auth.validate().map_err(|e| format!("auth: {e}"))?;

        let mut ids = HashSet::new();
        let mut identifiers = HashSet::new();
        let mut client_ids = HashSet::new();
        for provider in &self.providers {
            if provider.identifier.trim().is_empty() {
                return Err(format!("providers[id={}].identifier must not be empty", provider.id));
            }
            if !ids.insert(provider.id) {
                return Err(format!("duplicate provider id {}", provider.id));
            }
            if !identifiers.insert(provider.identifier.as_str()) {
                return Err(format!("duplicate provider identifier '{}'", provider.identifier));
            }
            if !client_ids.insert(provider.client_id.as_str()) {
                return Err(format!("duplicate provider client_id '{}'", provider.client_id));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let ip: std::net::IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::from((ip, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for handling one request, provider calls included
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File, FileFormat};
    use std::path::PathBuf;

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "oidc-login.toml";

    /// Prefix of environment overrides, e.g. `OIDC_LOGIN__SERVER__PORT=9090`.
    pub const ENV_PREFIX: &str = "OIDC_LOGIN";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        load_config_with_env(path, None)
    }

    /// Loads configuration, reading overrides from `env` instead of the
    /// process environment when given.
    pub fn load_config_with_env(
        path: Option<&str>,
        env: Option<config::Map<String, String>>,
    ) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf).format(FileFormat::Toml));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__")
                .source(env),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
