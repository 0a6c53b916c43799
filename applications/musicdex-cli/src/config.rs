/// CLI configuration
use anyhow::{bail, Context, Result};
use musicdex_client::{ClientConfig, DEFAULT_API_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CliConfig {
    #[serde(default = "default_server")]
    pub server: ServerSettings,

    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthSettings {
    /// Bearer token of a logged-in session; absent means anonymous
    pub access_token: Option<String>,
}

impl CliConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        let config_path = path.map_or_else(|| PathBuf::from("musicdex.toml"), Path::to_path_buf);
        if config_path.exists() {
            settings = settings.add_source(config::File::from(config_path));
        } else if path.is_some() {
            bail!("Config file not found: {}", config_path.display());
        }

        // Override with environment variables, e.g. MUSICDEX_AUTH__ACCESS_TOKEN
        settings = settings.add_source(
            config::Environment::with_prefix("MUSICDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        settings
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.url.is_empty() {
            bail!("Server URL is required (set MUSICDEX_SERVER__URL)");
        }

        if self.server.timeout_secs == 0 {
            bail!("Request timeout must be at least one second");
        }

        if self
            .auth
            .access_token
            .as_deref()
            .is_some_and(|token| token.trim().is_empty())
        {
            bail!("Access token is set but empty");
        }

        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.server.url.clone(),
            api_prefix: self.server.api_prefix.clone(),
            access_token: self.auth.access_token.clone(),
            timeout_secs: self.server.timeout_secs,
        }
    }
}

// Default values
fn default_server() -> ServerSettings {
    ServerSettings {
        url: default_url(),
        api_prefix: default_api_prefix(),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_url() -> String {
    "https://holodex.net/api/v2".to_string()
}

fn default_api_prefix() -> String {
    DEFAULT_API_PREFIX.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            auth: AuthSettings::default(),
        }
    }
}
