use std::{path::PathBuf, time::Duration};

use clap::Args;
use serde::Deserialize;

use crate::error::Result;

const DEFAULT_CONFIG_PATH: &str = "config/turtle.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub session_file: PathBuf,
    pub timeout_secs: u64,
    pub history_limit: u32,
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            session_file: PathBuf::from("config/turtle_session.json"),
            timeout_secs: 45,
            history_limit: 90,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Global flags shared by every subcommand.
#[derive(Debug, Args)]
pub struct Overrides {
    /// Optional config file path (TOML).
    #[arg(long, global = true)]
    config: Option<String>,
    /// Override API base URL (e.g. http://127.0.0.1:8000/api).
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Override the file holding the session token.
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,
    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    level: Option<String>,
}

pub fn load(overrides: &Overrides) -> Result<AppConfig> {
    let config_path = overrides.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let mut builder = config::Config::builder();
    builder = builder.add_source(config::File::with_name(config_path).required(false));
    builder = builder.add_source(config::Environment::with_prefix("TURTLE"));
    let mut settings: AppConfig = builder.build()?.try_deserialize()?;

    if let Some(base_url) = &overrides.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(session_file) = &overrides.session_file {
        settings.session_file = session_file.clone();
    }
    if let Some(level) = &overrides.level {
        settings.level = level.clone();
    }

    Ok(settings)
}
