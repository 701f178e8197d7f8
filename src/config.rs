//! Run configuration and rule-file loading.
//!
//! The main file is TOML (default `./config/txt2kb.toml`). Every section is
//! optional and falls back to its defaults. Rule files referenced from it
//! are resolved relative to the working directory and loaded once per run.
//!
//! ```toml
//! [run]
//! concurrency = 4
//! output_format = "markdown"
//!
//! [masking]
//! enabled = true
//! rules = "./config/masking_rules.toml"
//!
//! [tagging]
//! rules = "./config/tagging_rules.toml"
//! max_tags = 5
//!
//! [extraction]
//! strategy = "llm"
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! timeout_secs = 30
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::classify::{TagRuleSpec, TaggingRuleSet, DEFAULT_MAX_LABELS};
use crate::extract::SectionSignalSpec;
use crate::mask::{MaskRuleSpec, MaskingRuleSet};

pub const DEFAULT_CONFIG_PATH: &str = "./config/txt2kb.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub masking: MaskingConfig,
    #[serde(default)]
    pub tagging: TaggingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub connector: ConnectorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub output_format: OutputFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            output_format: OutputFormat::default(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Renderer used by `convert`.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaskingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional rule file with customer, hostname and product patterns.
    #[serde(default)]
    pub rules: Option<PathBuf>,
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: None,
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_document_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaggingConfig {
    #[serde(default)]
    pub rules: Option<PathBuf>,
    #[serde(default = "default_max_labels")]
    pub max_tags: usize,
    #[serde(default = "default_max_labels")]
    pub max_categories: usize,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            rules: None,
            max_tags: DEFAULT_MAX_LABELS,
            max_categories: DEFAULT_MAX_LABELS,
        }
    }
}

fn default_max_labels() -> usize {
    DEFAULT_MAX_LABELS
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionStrategy {
    #[default]
    RuleBased,
    Llm,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub strategy: ExtractionStrategy,
    #[serde(default)]
    pub backfill_empty_sections: bool,
    #[serde(default)]
    pub section_signals: SectionSignalSpec,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Shorter texts skip the LLM and use rule-based extraction.
    #[serde(default)]
    pub min_input_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            min_input_chars: 0,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1200
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectorConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mask: Option<bool>,
    pub llm: bool,
    pub max_tags: Option<usize>,
    pub max_categories: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
}

impl Config {
    /// Apply CLI overrides and re-validate.
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(mask) = overrides.mask {
            self.masking.enabled = mask;
        }
        if overrides.llm {
            self.extraction.strategy = ExtractionStrategy::Llm;
        }
        if let Some(max_tags) = overrides.max_tags {
            self.tagging.max_tags = max_tags;
        }
        if let Some(max_categories) = overrides.max_categories {
            self.tagging.max_categories = max_categories;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.llm.timeout_secs = timeout;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.run.concurrency = concurrency;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.concurrency == 0 {
            bail!("run.concurrency must be >= 1");
        }
        if self.masking.max_document_bytes == 0 {
            bail!("masking.max_document_bytes must be > 0");
        }
        if self.tagging.max_tags == 0 || self.tagging.max_categories == 0 {
            bail!("tagging.max_tags and tagging.max_categories must be >= 1");
        }
        if self.llm.timeout_secs == 0 {
            bail!("llm.timeout_secs must be > 0");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be in [0.0, 2.0]");
        }
        match self.llm.provider.as_str() {
            "disabled" => {}
            "openai" => {
                if self.llm.model.trim().is_empty() {
                    bail!("llm.model must be specified when provider is 'openai'");
                }
            }
            other => bail!(
                "Unknown LLM provider: '{}'. Must be disabled or openai.",
                other
            ),
        }
        if self.connector.include_globs.is_empty() {
            bail!("connector.include_globs must not be empty");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `explicit` if given. Otherwise load the default path when it
/// exists, or fall back to built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let default = Path::new(DEFAULT_CONFIG_PATH);
    if default.exists() {
        load_config(default)
    } else {
        tracing::debug!("no config file at {}, using defaults", DEFAULT_CONFIG_PATH);
        Ok(Config::default())
    }
}

#[derive(Debug, Deserialize, Default)]
struct MaskingRuleFile {
    #[serde(default)]
    rules: Vec<MaskRuleSpec>,
}

#[derive(Debug, Deserialize, Default)]
struct TaggingRuleFile {
    #[serde(default)]
    rules: Vec<TagRuleSpec>,
}

/// Built-in IP/MAC rules followed by the rules of `masking.rules`, if set.
pub fn load_masking_rules(config: &MaskingConfig) -> Result<MaskingRuleSet> {
    let Some(path) = &config.rules else {
        return Ok(MaskingRuleSet::builtin());
    };
    let file: MaskingRuleFile = read_rule_file(path)?;
    MaskingRuleSet::with_builtins(&file.rules)
        .with_context(|| format!("Invalid masking rule in {}", path.display()))
}

/// Tagging rules from `tagging.rules`; an empty set when unset.
pub fn load_tagging_rules(config: &TaggingConfig) -> Result<TaggingRuleSet> {
    let specs = match &config.rules {
        Some(path) => read_rule_file::<TaggingRuleFile>(path)?.rules,
        None => Vec::new(),
    };
    let source = config
        .rules
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<none>".to_string());
    TaggingRuleSet::compile(&specs, config.max_tags, config.max_categories)
        .with_context(|| format!("Invalid tagging rule in {}", source))
}

fn read_rule_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse rule file: {}", path.display()))
}
