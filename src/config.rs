//! Configuration management
//!
//! Manages assistant configuration: learning store tuning, the user
//! preferences file, the Gmail account and the web search endpoint.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interaction learning settings
    #[serde(default)]
    pub learning: LearningConfig,
    /// User preferences (saved reminders)
    #[serde(default)]
    pub preferences: PreferencesConfig,
    /// Gmail account and mail defaults
    #[serde(default)]
    pub mail: MailConfig,
    /// Web search settings
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Learning data file (default: <data dir>/learning_data.json)
    #[serde(default)]
    pub data_file: Option<PathBuf>,
    /// Recorded interactions between saves
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Minimum success rate before a response is reused
    #[serde(default = "default_reuse_threshold")]
    pub reuse_threshold: f64,
}

fn default_flush_threshold() -> usize {
    5
}

fn default_reuse_threshold() -> f64 {
    0.8
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            flush_threshold: default_flush_threshold(),
            reuse_threshold: default_reuse_threshold(),
        }
    }
}

impl LearningConfig {
    /// Resolved path of the learning data file
    pub fn data_path(&self) -> Result<PathBuf> {
        match &self.data_file {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("learning_data.json")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// Preferences file (default: <data dir>/user_preferences.json)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl PreferencesConfig {
    pub fn path(&self) -> Result<PathBuf> {
        match &self.file {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("user_preferences.json")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailConfig {
    /// Address mail is sent from
    #[serde(default)]
    pub sender_email: Option<String>,
    /// Subject used for dictated mail
    #[serde(default = "default_subject")]
    pub default_subject: String,
    /// How many messages "check email" reads out
    #[serde(default = "default_inbox_preview")]
    pub inbox_preview: usize,
    /// OAuth access token (env: GMAIL_ACCESS_TOKEN)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// OAuth refresh token (env: GMAIL_REFRESH_TOKEN)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OAuth client id (env: GMAIL_CLIENT_ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// OAuth client secret (env: GMAIL_CLIENT_SECRET)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Gmail API root for the signed-in user
    #[serde(default = "default_gmail_api")]
    pub api_base_url: String,
    /// OAuth token endpoint used with the refresh token
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

fn default_subject() -> String {
    "msg from vc assistant".to_string()
}

fn default_inbox_preview() -> usize {
    3
}

fn default_gmail_api() -> String {
    "https://gmail.googleapis.com/gmail/v1/users/me".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sender_email: None,
            default_subject: default_subject(),
            inbox_preview: default_inbox_preview(),
            access_token: None,
            refresh_token: None,
            client_id: None,
            client_secret: None,
            api_base_url: default_gmail_api(),
            token_url: default_token_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search endpoint, the query goes into `q`
    #[serde(default = "default_search_url")]
    pub base_url: String,
}

fn default_search_url() -> String {
    "https://www.google.com/search".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a specific file, creating it if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "voice-assistant", "voice-assistant")
        .context("Failed to get project directories")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("Configuration: {}", config_path()?.display());
    println!();
    println!("Learning:");
    println!("  data file:        {}", config.learning.data_path()?.display());
    println!("  flush threshold:  {}", config.learning.flush_threshold);
    println!("  reuse threshold:  {}", config.learning.reuse_threshold);
    println!("Preferences:");
    println!("  file:             {}", config.preferences.path()?.display());
    println!("Mail:");
    println!("  sender:           {}", config.mail.sender_email.as_deref().unwrap_or("(not set)"));
    println!("  default subject:  {}", config.mail.default_subject);
    println!("  inbox preview:    {}", config.mail.inbox_preview);
    println!("  access token:     {}", if config.mail.access_token.is_some() { "(set)" } else { "(not set)" });
    println!("  refresh token:    {}", if config.mail.refresh_token.is_some() { "(set)" } else { "(not set)" });
    println!("  api:              {}", config.mail.api_base_url);
    println!("Search:");
    println!("  base url:         {}", config.search.base_url);
    Ok(())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.learning.flush_threshold, 5);
        assert_eq!(config.learning.reuse_threshold, 0.8);
        assert_eq!(config.mail.default_subject, "msg from vc assistant");
        assert_eq!(config.mail.inbox_preview, 3);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[learning]\nflush_threshold = 10\n").unwrap();
        assert_eq!(config.learning.flush_threshold, 10);
        assert_eq!(config.learning.reuse_threshold, 0.8);
        assert_eq!(config.search.base_url, "https://www.google.com/search");
        assert_eq!(config.mail.api_base_url, "https://gmail.googleapis.com/gmail/v1/users/me");
        assert!(config.mail.refresh_token.is_none());
    }

    #[test]
    fn test_mail_credentials_from_file() {
        let config: Config = toml::from_str(
            "[mail]\nsender_email = \"me@example.com\"\nrefresh_token = \"r\"\nclient_id = \"id\"\nclient_secret = \"s\"\n",
        )
        .unwrap();
        assert_eq!(config.mail.sender_email.as_deref(), Some("me@example.com"));
        assert_eq!(config.mail.refresh_token.as_deref(), Some("r"));
        assert_eq!(config.mail.default_subject, "msg from vc assistant");
        assert_eq!(config.mail.token_url, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_load_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());

        let mut changed = config.clone();
        changed.learning.data_file = Some(dir.path().join("data.json"));
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), changed);
    }

    #[test]
    fn test_default_toml_parses() {
        let parsed: Config = toml::from_str(&default_config_toml()).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
