//! Configuration and settings management
//!
//! Settings are layered from optional YAML files under `config/` and from
//! environment variables. Trigger patterns and access lists are resolved
//! once at startup.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// One access list entry, either a numeric Telegram id or a name
///
/// Group lists match against the chat id or title, user lists against the
/// user id or username.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AccessEntry {
    /// Numeric chat or user id
    Id(i64),
    /// User name or group title
    Name(String),
}

/// Application settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,
    /// API key for the OpenAI-compatible backend
    pub openai_api_key: String,
    /// Base URL overriding the default `https://api.openai.com/v1`
    pub openai_api_base: Option<String>,

    /// Model used for chat completions and summaries
    #[serde(default = "default_chat_model_name")]
    pub chat_model_name: String,
    /// Token budget for a stored conversation, also the completion cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature for completions
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Generated image size as `WIDTHxHEIGHT`
    #[serde(default = "default_image_size")]
    pub image_size: String,
    /// Fixed per-message overhead used by the token counter
    #[serde(default = "default_tokens_per_message")]
    pub tokens_per_message: usize,

    /// Pattern routing group text to the chat flow
    #[serde(default = "default_chat_trigger")]
    pub chat_trigger_regex: String,
    /// Pattern routing text and captions to image generation
    #[serde(default = "default_image_trigger")]
    pub image_trigger_regex: String,
    /// Pattern routing photo captions to image editing
    #[serde(default = "default_image_edit_trigger")]
    pub image_edit_trigger_regex: String,
    /// Pattern for photo captions asking about the attached image
    #[serde(default = "default_image_vision_trigger")]
    pub image_vision_trigger_regex: String,

    /// Groups always allowed; when non-empty the blacklist is ignored
    #[serde(default)]
    pub group_whitelist: Vec<AccessEntry>,
    /// Groups denied when no group whitelist is configured
    #[serde(default)]
    pub group_blacklist: Vec<AccessEntry>,
    /// Users always allowed; when non-empty the blacklist is ignored
    #[serde(default)]
    pub user_whitelist: Vec<AccessEntry>,
    /// Users denied when no user whitelist is configured
    #[serde(default)]
    pub user_blacklist: Vec<AccessEntry>,

    /// Directory holding the per-user history files
    #[serde(default = "default_history_dir")]
    pub history_dir: String,
}

fn default_chat_model_name() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_temperature() -> f32 {
    0.7
}

fn default_image_size() -> String {
    "512x512".to_string()
}

const fn default_tokens_per_message() -> usize {
    3
}

fn default_chat_trigger() -> String {
    "бот,".to_string()
}

fn default_image_trigger() -> String {
    "нарисуй".to_string()
}

fn default_image_edit_trigger() -> String {
    "измени".to_string()
}

fn default_image_vision_trigger() -> String {
    "что на".to_string()
}

fn default_history_dir() -> String {
    "./history".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chat_relay_rs::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if required values are missing or a value
    /// cannot be deserialized.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .add_source(Environment::default().ignore_empty(true))
            .build()?
            .try_deserialize()
    }

    /// Parse `image_size` into `(width, height)`
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the value is not `WIDTHxHEIGHT`.
    pub fn image_dimensions(&self) -> Result<(u32, u32), ConfigError> {
        parse_image_size(&self.image_size).ok_or_else(|| {
            ConfigError::Message(format!(
                "invalid image_size '{}', expected WIDTHxHEIGHT",
                self.image_size
            ))
        })
    }
}

fn parse_image_size(value: &str) -> Option<(u32, u32)> {
    let (width, height) = value.split_once('x')?;
    Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
}

/// HTTP timeout for backend requests in seconds
///
/// Reads `BACKEND_HTTP_TIMEOUT_SECS`, defaulting to 120.
#[must_use]
pub fn get_backend_http_timeout_secs() -> u64 {
    std::env::var("BACKEND_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(120)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_settings;
    use std::env;

    // Tests run sequentially to avoid environment variable race conditions
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("TELEGRAM_TOKEN", "dummy_token");
        env::set_var("OPENAI_API_KEY", "dummy_key");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy_token");
        assert_eq!(settings.openai_api_key, "dummy_key");
        assert_eq!(settings.chat_model_name, "gpt-4o-mini");
        assert_eq!(settings.max_tokens, 4096);
        assert_eq!(settings.history_dir, "./history");
        assert!(settings.group_whitelist.is_empty());

        // Empty optional values are treated as unset.
        env::set_var("OPENAI_API_BASE", "");
        let settings = Settings::new()?;
        assert_eq!(settings.openai_api_base, None);

        env::set_var("OPENAI_API_BASE", "https://example.com/v1");
        let settings = Settings::new()?;
        assert_eq!(
            settings.openai_api_base,
            Some("https://example.com/v1".to_string())
        );

        env::remove_var("OPENAI_API_BASE");
        env::remove_var("OPENAI_API_KEY");
        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }

    #[test]
    fn test_image_size_parsing() {
        let mut settings = test_settings();
        assert_eq!(settings.image_dimensions().expect("valid size"), (512, 512));

        settings.image_size = "1024x768".to_string();
        assert_eq!(
            settings.image_dimensions().expect("valid size"),
            (1024, 768)
        );

        settings.image_size = "huge".to_string();
        assert!(settings.image_dimensions().is_err());

        settings.image_size = "512x".to_string();
        assert!(settings.image_dimensions().is_err());
    }

    #[test]
    fn test_access_entry_deserialization() {
        let entries: Vec<AccessEntry> =
            serde_json::from_str(r#"[42, "My Group", -100123]"#).expect("valid list");
        assert_eq!(
            entries,
            vec![
                AccessEntry::Id(42),
                AccessEntry::Name("My Group".to_string()),
                AccessEntry::Id(-100_123),
            ]
        );
    }
}
