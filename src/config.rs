use crate::backend::{BackendId, BackendRegistry};
use crate::error::AnalysisError;
use crate::gateway::RetryPolicy;
use crate::router::TaskConfig;
use crate::structure::{AnalysisMode, Level, SegmentationParams};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segmentation: SegmentationConfig,
    pub retry: RetryConfig,
    pub llm: LLMConfig,
    /// Explicit task mapping. When absent, one is derived from backend availability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskConfig>,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub mode: AnalysisMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<Level>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_words: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub timeout_seconds: u64,
    pub fallback_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub max_tokens: u32,
    pub claude: ProviderConfig,
    pub openai: ProviderConfig,
    pub gemini: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub outline_review: bool,
    pub output_directory: PathBuf,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 3000,
            timeout_seconds: 120,
            fallback_enabled: true,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            claude: ProviderConfig::new("claude-3-5-sonnet-20241022"),
            openai: ProviderConfig::new("gpt-4o"),
            gemini: ProviderConfig::new("gemini-2.0-flash"),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            outline_review: true,
            output_directory: PathBuf::from("./reports"),
        }
    }
}

impl ProviderConfig {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            api_key: None,
            base_url: None,
        }
    }
}

impl LLMConfig {
    pub fn provider(&self, id: BackendId) -> &ProviderConfig {
        match id {
            BackendId::Claude => &self.claude,
            BackendId::OpenAI => &self.openai,
            BackendId::Gemini => &self.gemini,
        }
    }

    fn provider_mut(&mut self, id: BackendId) -> &mut ProviderConfig {
        match id {
            BackendId::Claude => &mut self.claude,
            BackendId::OpenAI => &mut self.openai,
            BackendId::Gemini => &mut self.gemini,
        }
    }
}

/// Environment variable holding the API key for a backend.
pub fn api_key_var(id: BackendId) -> &'static str {
    match id {
        BackendId::Claude => "ANTHROPIC_API_KEY",
        BackendId::OpenAI => "OPENAI_API_KEY",
        BackendId::Gemini => "GEMINI_API_KEY",
    }
}

impl Config {
    /// Get the default config file path (~/.thesis-examer.toml)
    pub fn default_config_path() -> crate::Result<PathBuf> {
        let home_dir = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| anyhow::anyhow!("Could not determine home directory"))?;
        Ok(PathBuf::from(home_dir).join(".thesis-examer.toml"))
    }

    /// Load config from the default location, falling back to defaults if the file
    /// doesn't exist. API keys missing from the file are read from the environment.
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::default_config_path()?;

        let mut config = if config_path.exists() {
            info!("loading configuration from {}", config_path.display());
            Self::from_file(&config_path)?
        } else {
            info!("no config file at {}, using defaults", config_path.display());
            Self::default()
        };

        config.apply_env_keys(|var| env::var(var).ok());
        Ok(config)
    }

    /// Load config from `path` if given, otherwise from the default location.
    pub fn load_from(path: Option<&Path>) -> crate::Result<Self> {
        match path {
            Some(path) => {
                let mut config = Self::from_file(path)?;
                config.apply_env_keys(|var| env::var(var).ok());
                Ok(config)
            }
            None => Self::load(),
        }
    }

    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fill API keys absent from the file using `lookup` (the process environment in
    /// production). Blank values count as absent.
    pub fn apply_env_keys(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for id in BackendId::ALL {
            let provider = self.llm.provider_mut(id);
            let has_key = provider
                .api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty());
            if !has_key {
                provider.api_key = lookup(api_key_var(id))
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty());
            }
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.retry.max_attempts == 0 {
            return Err(AnalysisError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.timeout_seconds == 0 {
            return Err(AnalysisError::Config("retry.timeout_seconds must be at least 1".into()));
        }
        if self.llm.max_tokens == 0 {
            return Err(AnalysisError::Config("llm.max_tokens must be at least 1".into()));
        }
        if matches!(&self.segmentation.levels, Some(levels) if levels.is_empty()) {
            return Err(AnalysisError::Config("segmentation.levels cannot be empty".into()));
        }
        Ok(())
    }

    pub fn segmentation_params(&self) -> SegmentationParams {
        let mode = self.segmentation.mode;
        SegmentationParams {
            allowed_levels: self
                .segmentation
                .levels
                .clone()
                .unwrap_or_else(|| mode.levels()),
            min_words: self.segmentation.min_words.unwrap_or_else(|| mode.min_words()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff: Duration::from_millis(self.retry.backoff_ms),
            timeout: Duration::from_secs(self.retry.timeout_seconds),
            fallback_enabled: self.retry.fallback_enabled,
        }
    }

    pub fn task_config(&self, registry: &BackendRegistry) -> TaskConfig {
        self.tasks
            .clone()
            .unwrap_or_else(|| TaskConfig::default_for(registry))
    }

    /// Create a config file with all available options documented
    pub fn create_documented_config() -> String {
        r#"# thesis-examer configuration file
# Controls how a LaTeX manuscript is split into units and which LLM reviews each task.

[segmentation]
# Preset: "rapid" (chapters, >= 100 words), "normal" (chapters + sections, >= 50 words)
# or "detailed" (chapters, sections and subsections, >= 20 words)
mode = "normal"

# Override the preset's levels and minimum length
# levels = ["chapter", "section"]
# min_words = 50

[retry]
# Attempts per backend before falling back
max_attempts = 3

# Pause between attempts, in milliseconds
backoff_ms = 3000

# Per-attempt timeout, in seconds
timeout_seconds = 120

# Try one alternate backend when the requested one is exhausted or unavailable
fallback_enabled = true

[llm]
# Output token ceiling for every call
max_tokens = 4000

# API keys can also be set via environment variables:
# ANTHROPIC_API_KEY, OPENAI_API_KEY, GEMINI_API_KEY

[llm.claude]
model = "claude-3-5-sonnet-20241022"
# api_key = "sk-ant-..."
# base_url = "https://api.anthropic.com"

[llm.openai]
model = "gpt-4o"
# api_key = "sk-..."

[llm.gemini]
model = "gemini-2.0-flash"
# api_key = "AIza..."

# Task to backend mapping. When omitted, Claude handles the analytical tasks and the
# style review goes to Gemini or OpenAI, whichever has a key.
# [tasks]
# scientific = "claude"
# style = "gemini"
# synthesis = "claude"
# outline = "claude"

[analysis]
# Review the overall structure once all units are done
outline_review = true

# Where reports are written
output_directory = "./reports"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn documented_config_parses_to_defaults() {
        let parsed: Config = toml::from_str(&Config::create_documented_config()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn partial_file_keeps_defaults_elsewhere() {
        let parsed: Config = toml::from_str(
            r#"
[segmentation]
mode = "detailed"
min_words = 5

[tasks]
scientific = "openai"
style = "gemini"
synthesis = "openai"
"#,
        )
        .unwrap();

        assert_eq!(parsed.retry, RetryConfig::default());
        let params = parsed.segmentation_params();
        assert_eq!(params.allowed_levels, Level::ALL.to_vec());
        assert_eq!(params.min_words, 5);
        let tasks = parsed.task_config(&BackendRegistry::new());
        assert_eq!(tasks.get("scientific"), Some(BackendId::OpenAI));
        assert_eq!(tasks.get("outline"), None);
    }

    #[test]
    fn unknown_backend_in_tasks_is_rejected() {
        assert!(toml::from_str::<Config>("[tasks]\nstyle = \"bard\"\n").is_err());
    }

    #[test]
    fn env_keys_fill_only_missing_entries() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ANTHROPIC_API_KEY", "env-claude"),
            ("OPENAI_API_KEY", "  "),
            ("GEMINI_API_KEY", " env-gemini "),
        ]);
        let mut config = Config::default();
        config.llm.claude.api_key = Some("file-claude".to_string());

        config.apply_env_keys(|var| env.get(var).map(|v| v.to_string()));

        assert_eq!(config.llm.claude.api_key.as_deref(), Some("file-claude"));
        assert_eq!(config.llm.openai.api_key, None);
        assert_eq!(config.llm.gemini.api_key.as_deref(), Some("env-gemini"));
    }

    #[test]
    fn retry_policy_converts_units() {
        let config = Config::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff, Duration::from_secs(3));
        assert_eq!(policy.timeout, Duration::from_secs(120));
        assert!(policy.fallback_enabled);
    }

    #[test]
    fn validation_rejects_zero_attempts_and_empty_levels() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.segmentation.levels = Some(Vec::new());
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.segmentation.mode = AnalysisMode::Rapid;
        config.tasks = Some(TaskConfig::new().with("style", BackendId::OpenAI));
        config.to_file(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }
}
