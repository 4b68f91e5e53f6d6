/// `load_config` module: reads the static YAML config and injects credentials from the environment.
///
/// The YAML file holds no secrets. The application password comes only from
/// `WP_USERNAME` and `WP_APP_PASSWORD`, which `main` may have loaded from a `.env` file
/// through `dotenvy`.
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::{anyhow, Result};
use press_sync_core::config::Config;
use press_sync_core::contract::Credentials;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

pub const USERNAME_ENV: &str = "WP_USERNAME";
pub const APP_PASSWORD_ENV: &str = "WP_APP_PASSWORD";

#[derive(Debug)]
pub struct CliConfig {
    pub config: Config,
    pub credentials: Option<Credentials>,
}

/// Loads a static YAML config file (no secrets) and picks up credentials from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let config: Config = match serde_yaml::from_str(&config_content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.site.host.trim().is_empty() {
        error!(config_path = ?path_ref, "Config has an empty site.host");
        return Err(anyhow!("site.host must not be empty"));
    }
    if config.site.page_size == 0 {
        return Err(anyhow!("site.page_size must be at least 1"));
    }
    config.trace_loaded();

    Ok(CliConfig {
        config,
        credentials: credentials_from_env(),
    })
}

/// Both variables must be set and non-empty; a lone username is ignored with a warning.
pub fn credentials_from_env() -> Option<Credentials> {
    let read = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
    match (read(USERNAME_ENV), read(APP_PASSWORD_ENV)) {
        (Some(username), Some(app_password)) => {
            info!(username = %username, "Credentials found in environment");
            Some(Credentials::new(username, app_password))
        }
        (None, None) => None,
        (username, _) => {
            warn!(
                has_username = username.is_some(),
                "Only one of {USERNAME_ENV} and {APP_PASSWORD_ENV} is set; continuing unauthenticated"
            );
            None
        }
    }
}
