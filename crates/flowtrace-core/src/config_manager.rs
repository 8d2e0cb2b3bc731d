use crate::types::{FlowStep, TraceAnchor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for FlowTrace
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowTraceConfig {
    /// Orchestrator loop parameters
    #[serde(default)]
    pub trace: TraceConfig,

    /// Inference service connection
    #[serde(default)]
    pub llm: LLMConfig,

    /// Source locator settings
    #[serde(default)]
    pub locator: LocatorConfig,

    /// Where batch results go
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rule deciding whether a recorded step has reached the end anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnchorMatch {
    /// `(file, line, code)` must be equal.
    Exact,
    /// Same file and line; the step's code, cut to `max_chars`, starts with the
    /// anchor's code cut the same way. Surrounding whitespace is ignored.
    Prefix { max_chars: usize },
}

impl Default for AnchorMatch {
    fn default() -> Self {
        AnchorMatch::Prefix { max_chars: 50 }
    }
}

impl AnchorMatch {
    pub fn matches(&self, step: &FlowStep, anchor: &TraceAnchor) -> bool {
        if step.file != anchor.file || step.line != anchor.line {
            return false;
        }
        match self {
            AnchorMatch::Exact => step.code == anchor.code,
            AnchorMatch::Prefix { max_chars } => {
                let code = truncate_chars(step.code.trim(), *max_chars);
                let expected = truncate_chars(anchor.code.trim(), *max_chars);
                code.starts_with(expected)
            }
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Keys and tags the model uses to shape its replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyVocabulary {
    #[serde(default = "default_action_key")]
    pub action_key: String,

    /// Action value requesting a function lookup
    #[serde(default = "default_fetch_action")]
    pub fetch_action: String,

    /// Action value ending the trace; `None` disables explicit stop
    #[serde(default = "default_stop_action")]
    pub stop_action: Option<String>,

    #[serde(default = "default_func_name_key")]
    pub func_name_key: String,

    /// Treat the bare presence of `func_name_key` as a lookup request
    #[serde(default = "default_true")]
    pub fetch_on_func_name_key: bool,
}

impl Default for ReplyVocabulary {
    fn default() -> Self {
        Self {
            action_key: default_action_key(),
            fetch_action: default_fetch_action(),
            stop_action: default_stop_action(),
            func_name_key: default_func_name_key(),
            fetch_on_func_name_key: true,
        }
    }
}

/// Parameters of the round-bounded tracing loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default = "default_profile_name")]
    pub profile_name: String,

    /// Hard upper bound on rounds; round 1 seeds memory without an inference call
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Sampling temperature sent with every request
    #[serde(default)]
    pub temperature: f32,

    #[serde(default)]
    pub anchor_match: AnchorMatch,

    #[serde(default)]
    pub vocabulary: ReplyVocabulary,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self::privacy()
    }
}

impl TraceConfig {
    /// Original loop: 20 rounds, exact end match, lookups keyed on `func_name`, no stop action.
    pub fn classic() -> Self {
        Self {
            profile_name: "classic".to_string(),
            max_rounds: 20,
            temperature: 0.0,
            anchor_match: AnchorMatch::Exact,
            vocabulary: ReplyVocabulary {
                stop_action: None,
                ..ReplyVocabulary::default()
            },
        }
    }

    /// Privacy-flow loop: 30 rounds, 50-char prefix end match, explicit stop action.
    pub fn privacy() -> Self {
        Self {
            profile_name: default_profile_name(),
            max_rounds: default_max_rounds(),
            temperature: 0.0,
            anchor_match: AnchorMatch::default(),
            vocabulary: ReplyVocabulary::default(),
        }
    }

    pub fn from_profile(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "classic" => Some(Self::classic()),
            "privacy" => Some(Self::privacy()),
            _ => None,
        }
    }
}

/// Inference service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider: "qwen", "qwen-us", "dashscope", "openai", "lmstudio", "ollama", "openai-compatible"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Overrides the provider's endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub max_tokens: Option<usize>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocatorConfig {
    /// Default search root for unscoped lookups
    #[serde(default)]
    pub code_base: Option<PathBuf>,

    /// Directory names never descended into
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Results and per-flow memory files are written here
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,

    #[serde(default = "default_max_flows")]
    pub max_flows: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            result_dir: default_result_dir(),
            max_flows: default_max_flows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_action_key() -> String {
    "action".to_string()
}
fn default_fetch_action() -> String {
    "GetFuncImpl".to_string()
}
fn default_stop_action() -> Option<String> {
    Some("stop".to_string())
}
fn default_func_name_key() -> String {
    "func_name".to_string()
}
fn default_true() -> bool {
    true
}
fn default_profile_name() -> String {
    "privacy".to_string()
}
fn default_max_rounds() -> usize {
    30
}
fn default_llm_provider() -> String {
    "qwen".to_string()
}
fn default_llm_model() -> String {
    "qwen3-coder-plus".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_result_dir() -> PathBuf {
    PathBuf::from("./results")
}
fn default_max_flows() -> usize {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with layered loading
pub struct ConfigManager {
    config: FlowTraceConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.flowtrace.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();
        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load an explicit config file, still honoring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::load_dotenv();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(
        config: FlowTraceConfig,
        config_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());
        Self::validate_config(&config)?;

        info!("Configuration loaded");
        match config_path {
            Some(ref path) => info!("   Config file: {}", path.display()),
            None => info!("   Config file: NONE (using defaults)"),
        }
        info!(
            "   Trace profile: {} ({} rounds, {:?})",
            config.trace.profile_name, config.trace.max_rounds, config.trace.anchor_match
        );
        info!(
            "   LLM: {} / {}",
            config.llm.provider, config.llm.model
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".flowtrace.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .flowtrace.env: {}", e);
                }
            }
        }
    }

    /// Search order: ./.flowtrace.toml, ~/.flowtrace/config.toml, defaults
    fn load_config_file() -> Result<(FlowTraceConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".flowtrace.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".flowtrace").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((FlowTraceConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<FlowTraceConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> Result<FlowTraceConfig, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment overrides; `lookup` resolves a variable name.
    pub fn apply_env_overrides<F>(mut config: FlowTraceConfig, lookup: F) -> FlowTraceConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rounds) = lookup("FLOWTRACE_MAX_ROUNDS") {
            match rounds.parse() {
                Ok(n) => config.trace.max_rounds = n,
                Err(_) => warn!("Ignoring FLOWTRACE_MAX_ROUNDS={}: not a number", rounds),
            }
        }

        if let Some(provider) = lookup("FLOWTRACE_LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Some(model) = lookup("FLOWTRACE_MODEL") {
            config.llm.model = model;
        }
        if let Some(url) = lookup("FLOWTRACE_LLM_BASE_URL") {
            config.llm.base_url = Some(url);
        }
        if config.llm.api_key.is_none() {
            config.llm.api_key = lookup("DASHSCOPE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(code_base) = lookup("FLOWTRACE_CODE_BASE").or_else(|| lookup("DATA_PATH")) {
            config.locator.code_base = Some(PathBuf::from(code_base));
        }
        if let Some(dir) = lookup("FLOWTRACE_RESULT_DIR").or_else(|| lookup("RESULT_PATH")) {
            config.output.result_dir = PathBuf::from(dir);
        }

        if let Some(level) = lookup("RUST_LOG") {
            config.logging.level = level;
        }

        config
    }

    /// Swap in a preset `[trace]` section. Environment overrides that target
    /// the trace section are applied again on top of the preset.
    pub fn apply_trace_profile<F>(
        mut config: FlowTraceConfig,
        profile: TraceConfig,
        lookup: F,
    ) -> FlowTraceConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        config.trace = profile;
        Self::apply_env_overrides(config, lookup)
    }

    pub fn validate_config(config: &FlowTraceConfig) -> Result<(), ConfigError> {
        let trace = &config.trace;
        if trace.max_rounds < 2 {
            return Err(ConfigError::ValidationError(format!(
                "max_rounds must be at least 2 (round 1 only seeds memory), got {}",
                trace.max_rounds
            )));
        }
        if let AnchorMatch::Prefix { max_chars: 0 } = trace.anchor_match {
            return Err(ConfigError::ValidationError(
                "anchor_match.max_chars must be at least 1".to_string(),
            ));
        }

        let vocab = &trace.vocabulary;
        if vocab.action_key.is_empty()
            || vocab.fetch_action.is_empty()
            || vocab.func_name_key.is_empty()
        {
            return Err(ConfigError::ValidationError(
                "reply vocabulary keys must not be empty".to_string(),
            ));
        }
        if let Some(stop) = &vocab.stop_action {
            if stop.is_empty() || *stop == vocab.fetch_action {
                return Err(ConfigError::ValidationError(format!(
                    "stop action '{}' must be non-empty and differ from the fetch action",
                    stop
                )));
            }
        }

        // RUST_LOG may carry a full filter directive; only bare levels are checked
        let level = config.logging.level.as_str();
        if !level.contains('=') && !level.contains(',') {
            match level {
                "trace" | "debug" | "info" | "warn" | "error" => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        other
                    )))
                }
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &FlowTraceConfig {
        &self.config
    }

    pub fn into_config(self) -> FlowTraceConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Write a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = FlowTraceConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
