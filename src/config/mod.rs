//! Configuration management.
//!
//! Configuration is an explicit struct handed to [`Pipeline::new`](crate::Pipeline::new).
//! It can be loaded from a TOML file layered with `LITNOTE_*` environment
//! variables, and individual fields are overridden by CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [output]
//! path = "./notes"
//! bibliography = "reference.bib"
//! transfer = "move"
//! overwrite_notes = false
//! validate_write_permission = false
//! failed_list = true
//!
//! [template]
//! path = "~/templates/paper.md"
//!
//! [template.variables]
//! project = "thesis"
//!
//! [api_keys]
//! openai = "sk-..."
//!
//! [resolver]
//! crossref_base_url = "https://api.crossref.org"
//! doi_base_url = "https://doi.org"
//! llm_base_url = "https://api.openai.com/v1"
//! llm_model = "gpt-4o-mini"
//! similarity_threshold = 0.9
//! max_attempts = 3
//!
//! [batch]
//! workers = 2
//! max_pages = 3
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::RetryConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where artifacts are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Note template settings
    #[serde(default)]
    pub template: TemplateConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeys,

    /// Citation lookup settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Batch processing settings
    #[serde(default)]
    pub batch: BatchConfig,
}

/// How the source PDF reaches the output directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Move,
    Copy,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory for renamed PDFs and notes
    #[serde(default = "default_output_dir")]
    pub path: PathBuf,

    /// Bibliography file; relative paths are resolved against `path`
    #[serde(default = "default_bibliography")]
    pub bibliography: PathBuf,

    /// Move (default) or copy the source PDF
    #[serde(default)]
    pub transfer: TransferMode,

    /// Replace an existing note whose content differs
    #[serde(default)]
    pub overwrite_notes: bool,

    /// Check the output directory is writable before processing a batch
    #[serde(default)]
    pub validate_write_permission: bool,

    /// Write `failed_list.md` when some items fail
    #[serde(default = "default_true")]
    pub failed_list: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_dir(),
            bibliography: default_bibliography(),
            transfer: TransferMode::Move,
            overwrite_notes: false,
            validate_write_permission: false,
            failed_list: true,
        }
    }
}

impl OutputConfig {
    /// Absolute-or-relative path of the bibliography file
    pub fn bibliography_path(&self) -> PathBuf {
        if self.bibliography.is_absolute() {
            self.bibliography.clone()
        } else {
            self.path.join(&self.bibliography)
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bibliography() -> PathBuf {
    PathBuf::from("reference.bib")
}

fn default_true() -> bool {
    true
}

/// Note template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Markdown template; the built-in template is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Extra `{{name}}` substitutions
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// API keys for external services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeys {
    /// OpenAI-compatible key for the title-guessing fallback
    #[serde(default)]
    pub openai: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            openai: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
        }
    }
}

/// Citation lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Skip registry lookups entirely
    #[serde(default)]
    pub offline: bool,

    #[serde(default = "default_crossref_base")]
    pub crossref_base_url: String,

    /// DOI resolver used for BibTeX content negotiation
    #[serde(default = "default_doi_base")]
    pub doi_base_url: String,

    #[serde(default = "default_llm_base")]
    pub llm_base_url: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Contact address sent to CrossRef for the polite pool
    #[serde(default)]
    pub mailto: Option<String>,

    #[serde(default = "default_doi_timeout")]
    pub doi_timeout_secs: u64,

    #[serde(default = "default_title_timeout")]
    pub title_timeout_secs: u64,

    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,

    /// Minimum Jaro-Winkler similarity for a title match
    #[serde(default = "default_similarity")]
    pub similarity_threshold: f64,

    /// Attempts per network call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Characters of extracted text sent to the language model
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            offline: false,
            crossref_base_url: default_crossref_base(),
            doi_base_url: default_doi_base(),
            llm_base_url: default_llm_base(),
            llm_model: default_llm_model(),
            mailto: None,
            doi_timeout_secs: default_doi_timeout(),
            title_timeout_secs: default_title_timeout(),
            llm_timeout_secs: default_llm_timeout(),
            similarity_threshold: default_similarity(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

impl ResolverConfig {
    /// Retry policy for a single network call
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            ..RetryConfig::default()
        }
    }
}

fn default_crossref_base() -> String {
    "https://api.crossref.org".to_string()
}

fn default_doi_base() -> String {
    "https://doi.org".to_string()
}

fn default_llm_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_doi_timeout() -> u64 {
    30
}

fn default_title_timeout() -> u64 {
    45
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_similarity() -> f64 {
    0.90
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_snippet_chars() -> usize {
    1500
}

/// Batch processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items whose lookups may overlap
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pages of text read from each PDF
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_pages: default_max_pages(),
        }
    }
}

impl BatchConfig {
    pub fn effective_workers(&self) -> usize {
        self.workers.clamp(1, 16)
    }
}

fn default_workers() -> usize {
    2
}

fn default_max_pages() -> u32 {
    3
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Load configuration from an optional file layered with `LITNOTE_*` variables
///
/// Nested keys use a double underscore, e.g. `LITNOTE_OUTPUT__PATH`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix("LITNOTE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut config: Config = settings.try_deserialize()?;
    if config.api_keys.openai.is_none() {
        config.api_keys = ApiKeys::default();
    }
    Ok(config)
}

/// Find a configuration file in the default locations
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("litnote.toml");
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("litnote").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Write the given configuration as pretty TOML
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
