//! Ollabot Configuration
//!
//! TOML configuration loading with `.env` and environment variable overrides

pub mod env_file;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub const DEFAULT_BACKEND_HOST: &str = "http://localhost:11434";
pub const DEFAULT_THINK_OPEN: &str = "<think>";
pub const DEFAULT_THINK_CLOSE: &str = "</think>";

/// CJK Unified Ideographs, the block `STRIP_CJK` filters out.
pub const CJK_UNIFIED_IDEOGRAPHS: CharRangeConfig = CharRangeConfig {
    start: 0x4E00,
    end: 0x9FFF,
};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub postprocess: PostprocessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    pub data_dir: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    pub poll_timeout_secs: Option<u64>,
    pub client_recreate_interval_secs: Option<u64>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_timeout_secs: None,
            client_recreate_interval_secs: None,
            language: default_language(),
        }
    }
}

impl TelegramConfig {
    /// Numeric bot id, the part of the token before `:`.
    pub fn bot_id(&self) -> &str {
        self.bot_token.split(':').next().unwrap_or("default")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_host")]
    pub host: String,
    /// No timeout when unset: a hung backend call waits forever.
    pub request_timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelSourceKind {
    #[default]
    Catalog,
    Static,
}

impl std::str::FromStr for ModelSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "catalog" | "dynamic" => Ok(ModelSourceKind::Catalog),
            "static" => Ok(ModelSourceKind::Static),
            other => anyhow::bail!("Unknown model source '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub source: ModelSourceKind,
    #[serde(default)]
    pub static_models: Vec<String>,
    /// Models whose reasoning markup may be hidden. `None` means every model.
    #[serde(default)]
    pub thinking_allow_list: Option<Vec<String>>,
    #[serde(default = "default_vision_families")]
    pub vision_families: Vec<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            source: ModelSourceKind::default(),
            static_models: Vec::new(),
            thinking_allow_list: None,
            vision_families: default_vision_families(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostprocessConfig {
    #[serde(default = "default_think_open")]
    pub think_open: String,
    #[serde(default = "default_think_close")]
    pub think_close: String,
    #[serde(default)]
    pub strip_ranges: Vec<CharRangeConfig>,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            think_open: default_think_open(),
            think_close: default_think_close(),
            strip_ranges: Vec::new(),
        }
    }
}

/// Inclusive range of Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharRangeConfig {
    pub start: u32,
    pub end: u32,
}

impl CharRangeConfig {
    pub fn to_range(self) -> Option<RangeInclusive<char>> {
        let start = char::from_u32(self.start)?;
        let end = char::from_u32(self.end)?;
        (start <= end).then_some(start..=end)
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_backend_host() -> String {
    DEFAULT_BACKEND_HOST.to_string()
}

fn default_vision_families() -> Vec<String> {
    ["gemma3", "llava", "llama3.2-vision"]
        .iter()
        .map(|family| family.to_string())
        .collect()
}

fn default_think_open() -> String {
    DEFAULT_THINK_OPEN.to_string()
}

fn default_think_close() -> String {
    DEFAULT_THINK_CLOSE.to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Builds the effective configuration from an optional file and an
    /// environment lookup. The lookup wins over file values.
    pub fn resolve<F>(file: Option<&Path>, env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                toml::from_str::<Config>(&content)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Config::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ollabot").join("config.toml"))
    }

    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = self.core.data_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            if dir == "~" || dir.starts_with("~/") {
                if let Some(home) = dirs::home_dir() {
                    return home.join(dir.trim_start_matches('~').trim_start_matches('/'));
                }
            }
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|dir| dir.join("ollabot"))
            .unwrap_or_else(|| PathBuf::from(".ollabot"))
    }

    pub fn apply_env<F>(&mut self, env: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = non_empty(env("BOT_TOKEN")) {
            self.telegram.bot_token = token;
        }
        if let Some(language) = non_empty(env("BOT_LANGUAGE")) {
            self.telegram.language = language;
        }
        if let Some(host) = non_empty(env("OLLAMA_HOST")) {
            self.backend.host = host;
        }
        if let Some(source) = non_empty(env("MODEL_SOURCE")) {
            self.models.source = source.parse()?;
        }

        let pair: Vec<String> = [env("DEFAULT_MODEL"), env("ALT_MODEL")]
            .into_iter()
            .filter_map(non_empty)
            .collect();
        if !pair.is_empty() {
            self.models.static_models = pair;
        }

        if let Some(models) = non_empty(env("THINKING_MODELS")) {
            self.models.thinking_allow_list = Some(split_csv(&models));
        }
        if env("STRIP_CJK").is_some_and(|v| parse_flag(&v))
            && !self
                .postprocess
                .strip_ranges
                .contains(&CJK_UNIFIED_IDEOGRAPHS)
        {
            self.postprocess.strip_ranges.push(CJK_UNIFIED_IDEOGRAPHS);
        }

        self.backend.host = self.backend.host.trim().trim_end_matches('/').to_string();
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("BOT_TOKEN is not set (telegram.bot_token)");
        }

        match self.telegram.language.trim().to_ascii_lowercase().as_str() {
            "en" | "english" | "ru" | "russian" => {}
            other => anyhow::bail!("Unsupported language '{}'", other),
        }

        let host = self.backend.host.trim();
        if host.is_empty() {
            anyhow::bail!("Backend host cannot be empty");
        }
        if !host.starts_with("http://") && !host.starts_with("https://") {
            anyhow::bail!("Backend host '{}' must start with http:// or https://", host);
        }

        if self.models.source == ModelSourceKind::Static
            && self.models.static_models.iter().all(|m| m.trim().is_empty())
        {
            anyhow::bail!("Static model source requires at least one model");
        }

        if self.models.vision_families.iter().any(|f| f.trim().is_empty()) {
            anyhow::bail!("Vision family names cannot be empty");
        }

        if self.postprocess.think_open.is_empty() || self.postprocess.think_close.is_empty() {
            anyhow::bail!("Reasoning delimiters cannot be empty");
        }

        for range in &self.postprocess.strip_ranges {
            if range.to_range().is_none() {
                anyhow::bail!(
                    "Invalid strip range {:#X}..={:#X}",
                    range.start,
                    range.end
                );
            }
        }

        Ok(())
    }
}
