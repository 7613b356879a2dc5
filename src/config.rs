use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Hosted generative-text service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Hosted speech-synthesis service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub default_language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "data/medassist.db".to_string(),
                max_connections: 10,
                busy_timeout_secs: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            generation: GenerationConfig {
                api_key: String::new(),
                model: "gemini-1.5-pro-latest".to_string(),
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                timeout_secs: 30,
            },
            speech: SpeechConfig {
                api_key: String::new(),
                base_url: "https://texttospeech.googleapis.com".to_string(),
                timeout_secs: 30,
                default_language: "en-US".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| anyhow::anyhow!("Failed to serialize default configuration: {}", e))?;

        let config = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables, e.g. MEDASSIST__GENERATION__API_KEY
            .add_source(Environment::with_prefix("MEDASSIST").separator("__"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(anyhow::anyhow!("database.path must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.busy_timeout_secs == 0 {
            return Err(anyhow::anyhow!("busy_timeout_secs must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server.port must be greater than 0"));
        }

        if self.generation.model.trim().is_empty() {
            return Err(anyhow::anyhow!("generation.model must not be empty"));
        }
        if self.generation.base_url.trim().is_empty() || self.speech.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("service base URLs must not be empty"));
        }
        if self.generation.timeout_secs == 0 || self.speech.timeout_secs == 0 {
            return Err(anyhow::anyhow!("service timeouts must be greater than 0"));
        }

        Ok(())
    }

    /// Filesystem path of the SQLite store, accepting `sqlite:` style URLs
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        let raw = self.database.path.as_str();
        let trimmed = raw
            .strip_prefix("sqlite://")
            .or_else(|| raw.strip_prefix("sqlite:"))
            .unwrap_or(raw);
        PathBuf::from(trimmed)
    }

    /// Log file path, if file logging is enabled
    #[must_use]
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging.file_path.as_ref().map(PathBuf::from)
    }
}
