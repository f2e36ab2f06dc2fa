//! Configuration management.
//!
//! Configuration is read once per process: defaults, then an optional TOML
//! file, then `PATIENT_KG_*` environment overrides.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for all overrides.
pub const ENV_PREFIX: &str = "PATIENT_KG_";

/// Main configuration for the knowledge graph pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of ontology concepts retrieved per patient.
    pub k_ontology: usize,
    /// Number of literature items retrieved per query.
    pub k_literature: usize,
    /// Similarity and recency scoring constants.
    pub scoring: ScoringConfig,
    /// Embedding settings.
    pub embedding: EmbeddingConfig,
    /// Generative backend settings.
    pub llm: LlmConfig,
    /// Ontology data location.
    pub ontology: OntologyConfig,
    /// Literature API settings.
    pub literature: LiteratureConfig,
    /// Triple extraction retry settings.
    pub extraction: ExtractionConfig,
    /// Directory for per-patient triple artifacts (`None` disables persistence).
    pub output_dir: Option<PathBuf>,
}

/// Constants for similarity/recency scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Exponential decay constant per year of publication age.
    pub decay_lambda: f64,
    /// Weight of the similarity term.
    pub alpha: f64,
    /// Weight of the recency term.
    pub beta: f64,
    /// Clamp recency weights of future publication years to 1.0.
    pub clamp_future_years: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            decay_lambda: 0.1,
            alpha: 0.7,
            beta: 0.3,
            clamp_future_years: false,
        }
    }
}

/// Embedding settings.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingConfig {
    /// Number of texts encoded per backend call.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { batch_size: 32 }
    }
}

/// Available generative backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProviderKind {
    /// Ollama (local).
    #[default]
    Ollama,
    /// `OpenAI`-compatible chat completions endpoint.
    OpenAi,
}

impl LlmProviderKind {
    /// Parses a provider string, defaulting to Ollama.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "openai" | "open_ai" | "open-ai" => Self::OpenAi,
            _ => Self::Ollama,
        }
    }
}

/// Generative backend configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider kind.
    pub provider: LlmProviderKind,
    /// Model identifier (provider default when unset).
    pub model: Option<String>,
    /// Maximum output length in tokens.
    pub max_tokens: u32,
    /// Base URL for the provider.
    pub base_url: Option<String>,
    /// API key for hosted providers.
    pub api_key: Option<SecretString>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            model: None,
            max_tokens: 2048,
            base_url: None,
            api_key: None,
            timeout_ms: None,
            connect_timeout_ms: None,
        }
    }
}

/// Ontology data location.
#[derive(Debug, Clone)]
pub struct OntologyConfig {
    /// Directory holding the flat ontology source files.
    pub data_dir: PathBuf,
    /// Directory for parsed snapshots (defaults to `data_dir`).
    pub cache_dir: Option<PathBuf>,
}

impl OntologyConfig {
    /// Returns the effective cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        self.cache_dir.as_deref().unwrap_or(&self.data_dir)
    }
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./resources/umls_data"),
            cache_dir: None,
        }
    }
}

/// How literature search queries are derived from a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiteratureQueryMode {
    /// One search using the whole patient context text.
    #[default]
    WholeContext,
    /// One search per distinct clinical concept name in the patient fields.
    PerConcept,
}

impl FromStr for LiteratureQueryMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "whole-context" | "context" | "whole" => Ok(Self::WholeContext),
            "per-concept" | "concept" | "fields" => Ok(Self::PerConcept),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown literature query mode: {other}"
            ))),
        }
    }
}

/// Literature API settings.
#[derive(Debug, Clone)]
pub struct LiteratureConfig {
    /// Contact e-mail required by the service usage policy.
    pub email: Option<String>,
    /// Optional API key raising the service rate limit.
    pub api_key: Option<SecretString>,
    /// Minimum interval between consecutive API calls in milliseconds.
    pub min_interval_ms: u64,
    /// Query derivation mode.
    pub query_mode: LiteratureQueryMode,
    /// Base URL override (for mirrors and tests).
    pub base_url: Option<String>,
}

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self {
            email: None,
            api_key: None,
            min_interval_ms: 340,
            query_mode: LiteratureQueryMode::default(),
            base_url: None,
        }
    }
}

/// Triple extraction retry settings.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionConfig {
    /// Retries after the first failed extraction attempt.
    pub max_retries: u32,
    /// Pause between attempts in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            k_ontology: 5,
            k_literature: 5,
            scoring: ScoringConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            ontology: OntologyConfig::default(),
            literature: LiteratureConfig::default(),
            extraction: ExtractionConfig::default(),
            output_dir: None,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    /// Ontology retrieval depth.
    pub k_ontology: Option<usize>,
    /// Literature retrieval depth.
    pub k_literature: Option<usize>,
    /// Artifact output directory.
    pub output_dir: Option<String>,
    /// Scoring section.
    pub scoring: Option<ConfigFileScoring>,
    /// Embedding section.
    pub embedding: Option<ConfigFileEmbedding>,
    /// LLM section.
    pub llm: Option<ConfigFileLlm>,
    /// Ontology section.
    pub ontology: Option<ConfigFileOntology>,
    /// Literature section.
    pub literature: Option<ConfigFileLiterature>,
    /// Extraction section.
    pub extraction: Option<ConfigFileExtraction>,
}

/// Scoring section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileScoring {
    /// Decay constant.
    pub decay_lambda: Option<f64>,
    /// Similarity weight.
    pub alpha: Option<f64>,
    /// Recency weight.
    pub beta: Option<f64>,
    /// Clamp future years.
    pub clamp_future_years: Option<bool>,
}

/// Embedding section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileEmbedding {
    /// Batch size.
    pub batch_size: Option<usize>,
}

/// LLM section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileLlm {
    /// Provider name.
    pub provider: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Max output tokens.
    pub max_tokens: Option<u32>,
    /// Base URL.
    pub base_url: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Request timeout.
    pub timeout_ms: Option<u64>,
    /// Connect timeout.
    pub connect_timeout_ms: Option<u64>,
}

/// Ontology section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileOntology {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Cache directory.
    pub cache_dir: Option<String>,
}

/// Literature section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileLiterature {
    /// Contact e-mail.
    pub email: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Minimum interval between calls.
    pub min_interval_ms: Option<u64>,
    /// Query mode.
    pub query_mode: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
}

/// Extraction section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFileExtraction {
    /// Retry count.
    pub max_retries: Option<u32>,
    /// Backoff.
    pub retry_backoff_ms: Option<u64>,
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::SourceUnavailable {
                resource: path.display().to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `<config_dir>/patient-kg/config.toml`, falling back to defaults.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let path = base_dirs.config_dir().join("patient-kg").join("config.toml");
        if path.exists() {
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `PipelineConfig`.
    fn from_config_file(file: ConfigFile) -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(k) = file.k_ontology {
            config.k_ontology = k;
        }
        if let Some(k) = file.k_literature {
            config.k_literature = k;
        }
        if let Some(dir) = file.output_dir {
            config.output_dir = Some(PathBuf::from(dir));
        }
        if let Some(scoring) = file.scoring {
            if let Some(v) = scoring.decay_lambda {
                config.scoring.decay_lambda = v;
            }
            if let Some(v) = scoring.alpha {
                config.scoring.alpha = v;
            }
            if let Some(v) = scoring.beta {
                config.scoring.beta = v;
            }
            if let Some(v) = scoring.clamp_future_years {
                config.scoring.clamp_future_years = v;
            }
        }
        if let Some(batch_size) = file.embedding.and_then(|e| e.batch_size) {
            config.embedding.batch_size = batch_size.max(1);
        }
        if let Some(llm) = file.llm {
            if let Some(provider) = llm.provider {
                config.llm.provider = LlmProviderKind::parse(&provider);
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            config.llm.model = llm.model;
            config.llm.base_url = llm.base_url;
            config.llm.api_key = llm.api_key.map(SecretString::from);
            config.llm.timeout_ms = llm.timeout_ms;
            config.llm.connect_timeout_ms = llm.connect_timeout_ms;
        }
        if let Some(ontology) = file.ontology {
            if let Some(dir) = ontology.data_dir {
                config.ontology.data_dir = PathBuf::from(dir);
            }
            config.ontology.cache_dir = ontology.cache_dir.map(PathBuf::from);
        }
        if let Some(literature) = file.literature {
            config.literature.email = literature.email;
            config.literature.api_key = literature.api_key.map(SecretString::from);
            config.literature.base_url = literature.base_url;
            if let Some(ms) = literature.min_interval_ms {
                config.literature.min_interval_ms = ms;
            }
            if let Some(mode) = literature.query_mode {
                config.literature.query_mode = mode.parse()?;
            }
        }
        if let Some(extraction) = file.extraction {
            if let Some(v) = extraction.max_retries {
                config.extraction.max_retries = v;
            }
            if let Some(v) = extraction.retry_backoff_ms {
                config.extraction.retry_backoff_ms = v;
            }
        }

        Ok(config)
    }

    /// Applies `PATIENT_KG_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the query mode override is not recognized.
    pub fn with_env_overrides(mut self) -> crate::Result<Self> {
        if let Some(v) = env_parse("K_ONTOLOGY") {
            self.k_ontology = v;
        }
        if let Some(v) = env_parse("K_LITERATURE") {
            self.k_literature = v;
        }
        if let Some(v) = env_parse("DECAY_LAMBDA") {
            self.scoring.decay_lambda = v;
        }
        if let Some(v) = env_parse("ALPHA_SIM") {
            self.scoring.alpha = v;
        }
        if let Some(v) = env_parse("BETA_RECENCY") {
            self.scoring.beta = v;
        }
        if let Some(v) = env_parse("CLAMP_FUTURE_YEARS") {
            self.scoring.clamp_future_years = v;
        }
        if let Some(v) = env_parse::<usize>("EMBED_BATCH_SIZE") {
            self.embedding.batch_size = v.max(1);
        }
        if let Some(v) = env_string("LLM_PROVIDER") {
            self.llm.provider = LlmProviderKind::parse(&v);
        }
        if let Some(v) = env_string("LLM_MODEL") {
            self.llm.model = Some(v);
        }
        if let Some(v) = env_parse("LLM_MAX_TOKENS") {
            self.llm.max_tokens = v;
        }
        if let Some(v) = env_string("LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = env_string("LLM_API_KEY") {
            self.llm.api_key = Some(SecretString::from(v));
        }
        if let Some(v) = env_parse("LLM_TIMEOUT_MS") {
            self.llm.timeout_ms = Some(v);
        }
        if let Some(v) = env_string("ONTOLOGY_DIR") {
            self.ontology.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env_string("ONTOLOGY_CACHE_DIR") {
            self.ontology.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env_string("LITERATURE_EMAIL") {
            self.literature.email = Some(v);
        }
        if let Some(v) = env_string("LITERATURE_API_KEY") {
            self.literature.api_key = Some(SecretString::from(v));
        }
        if let Some(v) = env_parse("LITERATURE_MIN_INTERVAL_MS") {
            self.literature.min_interval_ms = v;
        }
        if let Some(v) = env_string("LITERATURE_QUERY_MODE") {
            self.literature.query_mode = v.parse()?;
        }
        if let Some(v) = env_parse("EXTRACTION_MAX_RETRIES") {
            self.extraction.max_retries = v;
        }
        if let Some(v) = env_parse("EXTRACTION_RETRY_BACKOFF_MS") {
            self.extraction.retry_backoff_ms = v;
        }
        if let Some(v) = env_string("OUTPUT_DIR") {
            self.output_dir = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    /// Sets the ontology data directory.
    #[must_use]
    pub fn with_ontology_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.ontology.data_dir = path.into();
        self
    }

    /// Sets the artifact output directory.
    #[must_use]
    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key = %format!("{ENV_PREFIX}{key}"), value = %raw, "Ignoring unparsable environment override");
            None
        },
    }
}
