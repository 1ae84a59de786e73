//! Run configuration, fixed at agent construction.
//!
//! Values come from the process environment (a `.env` file is loaded by the
//! binary) and can be overridden field by field before `validate` is called.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_MAX_STEPS: usize = 20;
pub const DEFAULT_HTML_MAX_CHARS: usize = 4000;
pub const DEFAULT_SCREENSHOT_DIR: &str = "screenshots";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub model: ModelConfig,
    pub browser: BrowserConfig,
    pub agent: AgentConfig,
}

/// Settings for the remote model endpoint.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// Attach to an already running Chrome instead of launching one.
    pub attach_url: Option<String>,
    pub element_timeout: Duration,
    pub window_size: (u32, u32),
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub verbose: bool,
    /// Where screenshots are written. `None` keeps them in memory only.
    pub screenshot_dir: Option<PathBuf>,
    pub html_max_chars: usize,
}

impl ModelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("OPENROUTER_API_KEY"));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("MODEL_NAME", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(invalid(
                "MODEL_TEMPERATURE",
                format!("{} is outside 0..=1", self.temperature),
            ));
        }
        if self.max_tokens == 0 {
            return Err(invalid("MODEL_MAX_TOKENS", "must be positive"));
        }
        Ok(())
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            attach_url: None,
            element_timeout: Duration::from_secs(10),
            window_size: (1280, 900),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            verbose: true,
            screenshot_dir: Some(PathBuf::from(DEFAULT_SCREENSHOT_DIR)),
            html_max_chars: DEFAULT_HTML_MAX_CHARS,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(invalid("MAX_STEPS", "must be positive"));
        }
        if self.html_max_chars == 0 {
            return Err(invalid("HTML_MAX_CHARS", "must be positive"));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset keys take their defaults;
    /// set but unparsable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;
        let mut model = ModelConfig::new(api_key);
        if let Some(url) = get("OPENROUTER_BASE_URL") {
            model.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(name) = get("MODEL_NAME") {
            model.model = name;
        }
        if let Some(raw) = get("MODEL_TEMPERATURE") {
            model.temperature = parse_num("MODEL_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = get("MODEL_MAX_TOKENS") {
            model.max_tokens = parse_num("MODEL_MAX_TOKENS", &raw)?;
        }

        let mut browser = BrowserConfig::default();
        if let Some(raw) = get("HEADLESS") {
            browser.headless = parse_bool("HEADLESS", &raw)?;
        }
        browser.chrome_path = get("CHROME_PATH").map(PathBuf::from);
        browser.attach_url = get("CHROME_ATTACH_URL");

        let mut agent = AgentConfig::default();
        if let Some(raw) = get("MAX_STEPS") {
            agent.max_steps = parse_num("MAX_STEPS", &raw)?;
        }
        if let Some(raw) = get("VERBOSE") {
            agent.verbose = parse_bool("VERBOSE", &raw)?;
        }
        if let Some(dir) = get("SCREENSHOT_DIR") {
            agent.screenshot_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = get("HTML_MAX_CHARS") {
            agent.html_max_chars = parse_num("HTML_MAX_CHARS", &raw)?;
        }

        let config = Self {
            model,
            browser,
            agent,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.agent.validate()
    }
}

fn parse_num<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, format!("'{raw}': {e}")))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "t" | "y" | "yes" => Ok(true),
        "false" | "0" | "f" | "n" | "no" => Ok(false),
        _ => Err(invalid(key, format!("'{raw}' is not a boolean"))),
    }
}
