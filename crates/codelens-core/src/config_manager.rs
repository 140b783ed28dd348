use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::vocabulary::Vocabulary;

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

/// Main configuration for CodeLens
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CodeLensConfig {
    /// Entity registry refresh settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Per-agent toggles and priorities
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Ranking, result caps and execution budgets
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Typo-tolerant matching
    #[serde(default)]
    pub fuzzy: FuzzyConfig,

    /// Semantic expansion vocabularies and thresholds
    #[serde(default)]
    pub semantic: SemanticConfig,

    /// Naming vocabularies used to derive prefixes and suffixes
    #[serde(default)]
    pub vocabulary: Vocabulary,

    /// Guard against repeated orchestration failures
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    /// Seconds between periodic bulk reloads
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// JSON export used by the file-backed entity source
    #[serde(default)]
    pub source_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            source_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower numbers run first
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    #[serde(default = "default_pattern_toggle")]
    pub pattern: AgentToggle,

    #[serde(default = "default_semantic_toggle")]
    pub semantic: AgentToggle,

    #[serde(default = "default_fuzzy_toggle")]
    pub fuzzy: AgentToggle,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern_toggle(),
            semantic: default_semantic_toggle(),
            fuzzy: default_fuzzy_toggle(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Matches below this confidence are dropped after fusion
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Maximum number of ranked matches returned
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Concurrent agent executions per orchestrator
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Budget for a single agent
    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,

    /// Budget for the whole fan-out/fan-in
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Added when a match's entity type fits the detected intent
    #[serde(default = "default_intent_boost")]
    pub intent_boost: f32,

    /// Added when a match satisfies the declared constraints
    #[serde(default = "default_constraint_boost")]
    pub constraint_boost: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_results: default_max_results(),
            worker_threads: default_worker_threads(),
            agent_timeout_ms: default_agent_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            intent_boost: default_intent_boost(),
            constraint_boost: default_constraint_boost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FuzzyConfig {
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: i32,

    #[serde(default = "default_fuzzy_min_confidence")]
    pub min_confidence: f32,

    /// Enable Soundex-based matching
    #[serde(default = "default_true")]
    pub phonetic: bool,

    /// Enable initials matching (`ucs` -> `UserCreationService`)
    #[serde(default = "default_true")]
    pub abbreviations: bool,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            max_edit_distance: default_max_edit_distance(),
            min_confidence: default_fuzzy_min_confidence(),
            phonetic: true,
            abbreviations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticConfig {
    /// Floor for embedding similarity and for the final semantic result list
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_semantic_max_results")]
    pub max_results: usize,

    /// Domain term -> synonyms
    #[serde(default = "default_synonyms")]
    pub synonyms: BTreeMap<String, Vec<String>>,

    /// Domain term -> business concepts usually found next to it
    #[serde(default = "default_business_context")]
    pub business_context: BTreeMap<String, Vec<String>>,

    /// Cluster name -> member terms
    #[serde(default = "default_clusters")]
    pub clusters: BTreeMap<String, Vec<String>>,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_results: default_semantic_max_results(),
            synonyms: default_synonyms(),
            business_context: default_business_context(),
            clusters: default_clusters(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure threshold before opening circuit (default: 5)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Success threshold to close circuit (default: 2)
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Seconds before an open circuit lets probes through (default: 30)
    #[serde(default = "default_circuit_timeout")]
    pub timeout_secs: u64,

    /// Concurrent probes allowed while half-open (default: 1)
    #[serde(default = "default_half_open_probes")]
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout_secs: default_circuit_timeout(),
            half_open_max_probes: default_half_open_probes(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
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
fn default_true() -> bool {
    true
}
fn default_refresh_interval_secs() -> u64 {
    300
}
fn default_pattern_toggle() -> AgentToggle {
    AgentToggle {
        enabled: true,
        priority: 1,
    }
}
fn default_semantic_toggle() -> AgentToggle {
    AgentToggle {
        enabled: true,
        priority: 2,
    }
}
fn default_fuzzy_toggle() -> AgentToggle {
    AgentToggle {
        enabled: true,
        priority: 3,
    }
}
fn default_min_confidence() -> f32 {
    0.3
}
fn default_max_results() -> usize {
    50
}
fn default_worker_threads() -> usize {
    4
}
fn default_agent_timeout_ms() -> u64 {
    3_000
}
fn default_query_timeout_ms() -> u64 {
    5_000
}
fn default_intent_boost() -> f32 {
    0.1
}
fn default_constraint_boost() -> f32 {
    0.05
}
fn default_max_edit_distance() -> i32 {
    2
}
fn default_fuzzy_min_confidence() -> f32 {
    0.5
}
fn default_similarity_threshold() -> f32 {
    0.6
}
fn default_semantic_max_results() -> usize {
    15
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_success_threshold() -> u32 {
    2
}
fn default_circuit_timeout() -> u64 {
    30
}
fn default_half_open_probes() -> u32 {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

fn table(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
        .collect()
}

fn default_synonyms() -> BTreeMap<String, Vec<String>> {
    table(&[
        ("payment", &["billing", "transaction", "charge"]),
        ("user", &["account", "customer", "member", "profile"]),
        ("order", &["purchase", "cart", "checkout"]),
        ("auth", &["authentication", "login", "credential", "security"]),
        ("product", &["item", "catalog", "sku"]),
        ("notification", &["message", "alert", "email"]),
        ("report", &["statistics", "analytics", "summary"]),
        ("config", &["configuration", "settings", "properties"]),
    ])
}

fn default_business_context() -> BTreeMap<String, Vec<String>> {
    table(&[
        ("payment", &["order", "invoice", "refund"]),
        ("user", &["session", "role", "permission"]),
        ("order", &["payment", "shipment", "inventory"]),
        ("product", &["inventory", "price", "catalog"]),
        ("customer", &["account", "address", "contact"]),
    ])
}

fn default_clusters() -> BTreeMap<String, Vec<String>> {
    table(&[
        ("commerce", &["payment", "order", "cart", "checkout", "invoice", "product"]),
        ("identity", &["user", "account", "auth", "role", "permission", "session"]),
        ("messaging", &["notification", "email", "message", "event", "queue"]),
        ("persistence", &["repository", "dao", "entity", "store", "cache"]),
    ])
}

/// Configuration manager with layered loading
pub struct ConfigManager {
    config: CodeLensConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.codelens.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading CodeLens configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!(path = %path.display(), "Configuration loaded"),
            None => info!("Configuration loaded (defaults, no config file)"),
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load an explicit config file, then apply environment overrides.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an already-built configuration after validating it.
    pub fn from_config(config: CodeLensConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
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
            let home_env = home.join(".codelens.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .codelens.env: {}", e);
                }
            }
        }
    }

    /// Search order:
    /// 1. ./.codelens.toml
    /// 2. ~/.codelens/config.toml
    /// 3. Defaults
    fn load_config_file() -> Result<(CodeLensConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".codelens.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".codelens").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((CodeLensConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<CodeLensConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: CodeLensConfig) -> CodeLensConfig {
        fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|v| v.parse().ok())
        }
        fn flag(key: &str) -> Option<bool> {
            std::env::var(key)
                .ok()
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        }

        if let Some(secs) = parsed("CODELENS_REFRESH_INTERVAL_SECS") {
            config.registry.refresh_interval_secs = secs;
        }
        if let Ok(path) = std::env::var("CODELENS_SOURCE_PATH") {
            config.registry.source_path = Some(PathBuf::from(path));
        }

        if let Some(enabled) = flag("CODELENS_PATTERN_ENABLED") {
            config.agents.pattern.enabled = enabled;
        }
        if let Some(enabled) = flag("CODELENS_FUZZY_ENABLED") {
            config.agents.fuzzy.enabled = enabled;
        }
        if let Some(enabled) = flag("CODELENS_SEMANTIC_ENABLED") {
            config.agents.semantic.enabled = enabled;
        }

        if let Some(min) = parsed("CODELENS_MIN_CONFIDENCE") {
            config.orchestrator.min_confidence = min;
        }
        if let Some(max) = parsed("CODELENS_MAX_RESULTS") {
            config.orchestrator.max_results = max;
        }
        if let Some(workers) = parsed("CODELENS_WORKER_THREADS") {
            config.orchestrator.worker_threads = workers;
        }
        if let Some(ms) = parsed("CODELENS_QUERY_TIMEOUT_MS") {
            config.orchestrator.query_timeout_ms = ms;
        }

        if let Some(distance) = parsed("CODELENS_FUZZY_MAX_EDIT_DISTANCE") {
            config.fuzzy.max_edit_distance = distance;
        }
        if let Some(threshold) = parsed("CODELENS_SEMANTIC_THRESHOLD") {
            config.semantic.similarity_threshold = threshold;
        }

        if let Ok(level) = std::env::var("CODELENS_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("CODELENS_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    fn validate_config(config: &CodeLensConfig) -> Result<(), ConfigError> {
        let unit = |name: &str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::ValidationError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )))
            }
        };

        unit("orchestrator.min_confidence", config.orchestrator.min_confidence)?;
        unit("orchestrator.intent_boost", config.orchestrator.intent_boost)?;
        unit("orchestrator.constraint_boost", config.orchestrator.constraint_boost)?;
        unit("fuzzy.min_confidence", config.fuzzy.min_confidence)?;
        unit("semantic.similarity_threshold", config.semantic.similarity_threshold)?;

        if config.orchestrator.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_results must be positive".into(),
            ));
        }
        if config.orchestrator.worker_threads == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.worker_threads must be positive".into(),
            ));
        }
        if config.orchestrator.agent_timeout_ms == 0 || config.orchestrator.query_timeout_ms == 0
        {
            return Err(ConfigError::ValidationError(
                "orchestrator timeouts must be positive".into(),
            ));
        }
        if config.fuzzy.max_edit_distance < 0 {
            return Err(ConfigError::ValidationError(format!(
                "fuzzy.max_edit_distance must not be negative, got {}",
                config.fuzzy.max_edit_distance
            )));
        }
        if config.semantic.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "semantic.max_results must be positive".into(),
            ));
        }
        if config.circuit_breaker.failure_threshold == 0
            || config.circuit_breaker.success_threshold == 0
            || config.circuit_breaker.half_open_max_probes == 0
        {
            return Err(ConfigError::ValidationError(
                "circuit_breaker thresholds must be positive".into(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }
        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &CodeLensConfig {
        &self.config
    }

    pub fn into_config(self) -> CodeLensConfig {
        self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = CodeLensConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
