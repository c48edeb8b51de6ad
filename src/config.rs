use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure that can be loaded from CLI, config file, or environment
///
/// Example configuration file content
/// # WebP Converter Configuration
///
/// host = "0.0.0.0"
/// listen_on_port = 3000
///
/// # Number of images encoded at the same time
/// permits = 4
///
/// # Largest accepted request body, in bytes
/// max_upload_bytes = 52428800
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = default_port())]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Number of concurrent encoding jobs
    #[arg(short, long, default_value_t = default_permits())]
    #[serde(default = "default_permits")]
    pub permits: usize,

    /// Maximum request body size in bytes
    #[arg(short, long, default_value_t = default_max_upload_bytes())]
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Configuration file path
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            listen_on_port: default_port(),
            permits: default_permits(),
            max_upload_bytes: default_max_upload_bytes(),
            config: None,
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // A CLI value still at its default yields to the file
        if self.host == default_host() {
            self.host = file_config.host;
        }
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.permits == default_permits() {
            self.permits = file_config.permits;
        }
        if self.max_upload_bytes == default_max_upload_bytes() {
            self.max_upload_bytes = file_config.max_upload_bytes;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow::anyhow!("Host cannot be empty"));
        }
        if self.permits == 0 {
            return Err(anyhow::anyhow!("Permits must be at least 1"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload bytes must be at least 1"));
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.listen_on_port)
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_permits() -> usize {
    num_cpus::get().max(1)
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}
