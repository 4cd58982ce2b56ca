use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
}

impl OpenAiConfig {
    /// Returns the effective base_url: the configured value without a
    /// trailing slash, or the public OpenAI endpoint when unset.
    pub fn effective_base_url(&self) -> &str {
        if self.base_url.is_empty() {
            return DEFAULT_OPENAI_BASE_URL;
        }
        self.base_url.trim_end_matches('/')
    }
}

/// Prompt templates and runtime switches.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SettingsConfig {
    /// Preamble for /topic and /phrase
    #[serde(default)]
    pub preamble_text: String,
    /// Preamble for /anything
    #[serde(default)]
    pub preamble_text_alt: String,
    #[serde(default)]
    pub debug_mode: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Read, override through `lookup`, and validate the config at `path`.
    pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides(lookup)?;
        config.validate()?;

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML configuration")
    }

    /// Overrides file values with `SECTION_KEY` variables resolved through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = v;
        }
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = v;
        }
        if let Some(v) = lookup("SETTINGS_PREAMBLE_TEXT") {
            self.settings.preamble_text = v;
        }
        if let Some(v) = lookup("SETTINGS_PREAMBLE_TEXT_ALT") {
            self.settings.preamble_text_alt = v;
        }
        if let Some(v) = lookup("SETTINGS_DEBUG_MODE") {
            self.settings.debug_mode = parse_bool(&v)
                .with_context(|| format!("SETTINGS_DEBUG_MODE is not a boolean: {:?}", v))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("telegram.bot_token is missing (set it in the config file or TELEGRAM_BOT_TOKEN)");
        }
        if self.openai.api_key.trim().is_empty() {
            bail!("openai.api_key is missing (set it in the config file or OPENAI_API_KEY)");
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
