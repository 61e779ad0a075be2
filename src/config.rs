//! Configuration for the book indexer.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.
//!
//! Layout and index heuristics are plain immutable values handed to each
//! component, so a document with an unusual layout can override them
//! without touching shared state.

use crate::error::{BookIndexError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Thresholds used by line grouping, classification and chapter detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Fragments whose top edges differ by less than this (points) share a line.
    pub line_y_tolerance: f64,
    /// A gap larger than `median_gap * multiplier` starts a new paragraph.
    pub paragraph_gap_multiplier: f64,
    /// Absolute minimum font size for a font-based heading.
    pub heading_font_size_min: f64,
    /// Minimum distance above the page median font size for a font-based heading.
    pub heading_size_above_median: f64,
    /// Lines at least this long are never headings.
    pub heading_max_len: usize,
    /// Unnumbered headings at least this many times the median size get level 1.
    pub heading_level1_ratio: f64,
    /// Fraction of page width on each side that counts as margin.
    pub margin_fraction: f64,
    /// Minimum ratio of math characters for an equation line.
    pub equation_math_ratio_min: f64,
    /// Minimum number of non-space characters for an equation line.
    pub equation_min_len: usize,
    /// Minimum ratio of garbage glyphs for a diagram line.
    pub diagram_garbage_ratio_min: f64,
    /// Minimum rows for a table run.
    pub table_min_rows: usize,
    /// Maximum horizontal distance (points) merged into one column boundary.
    pub table_column_cluster_gap: f64,
    /// More columns than this is treated as word-level splitting, not a table.
    pub table_max_columns: usize,
    /// Average cell length above this looks like prose.
    pub table_max_avg_cell_len: f64,
    /// Number of leading characters of each page scanned for a chapter heading.
    pub chapter_scan_chars: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            line_y_tolerance: 2.5,
            paragraph_gap_multiplier: 1.4,
            heading_font_size_min: 12.5,
            heading_size_above_median: 1.5,
            heading_max_len: 120,
            heading_level1_ratio: 1.6,
            margin_fraction: 0.14,
            equation_math_ratio_min: 0.32,
            equation_min_len: 4,
            diagram_garbage_ratio_min: 0.22,
            table_min_rows: 2,
            table_column_cluster_gap: 15.0,
            table_max_columns: 12,
            table_max_avg_cell_len: 28.0,
            chapter_scan_chars: 800,
        }
    }
}

/// Settings for section resolution and escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Pages before the expected page included in the page-local search window.
    pub window_pages_before: u32,
    /// Pages after the expected page included in the page-local search window.
    pub window_pages_after: u32,
    /// Escalate when more than this fraction of descriptors is unresolved.
    pub max_unresolved_fraction: f64,
    /// Escalate when at least this many nodes have an inverted line range.
    pub inverted_range_threshold: usize,
    /// Seconds to wait for the fallback collaborator.
    pub fallback_timeout_secs: u64,
    /// Build the index from raw headings when no TOC and no metadata exist.
    pub heading_scan_fallback: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            window_pages_before: 3,
            window_pages_after: 2,
            max_unresolved_fraction: 0.5,
            inverted_range_threshold: 2,
            fallback_timeout_secs: 60,
            heading_scan_fallback: true,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,
    /// Layout heuristics
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Index resolution settings
    #[serde(default)]
    pub index: IndexConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    layout: Option<LayoutConfig>,
    index: Option<IndexConfig>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (~/.config/book-indexer/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        if let Ok(api_base) = env::var("LLM_API_BASE") {
            config.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            config.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm.model = model;
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse() {
                config.llm.max_tokens = tokens;
            }
        }

        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            if let Ok(temp) = temperature.parse() {
                config.llm.temperature = temp;
            }
        }

        if let Ok(timeout) = env::var("LLM_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                config.llm.timeout_secs = secs;
                config.index.fallback_timeout_secs = secs;
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BookIndexError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text. Missing sections keep their defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| BookIndexError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                config.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(layout) = file_config.layout {
            config.layout = layout;
        }

        if let Some(index) = file_config.index {
            config.index = index;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "book-indexer")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that the LLM settings needed by the fallback are present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(BookIndexError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(BookIndexError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(BookIndexError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the LLM fallback collaborator can be used.
    pub fn llm_enabled(&self) -> bool {
        self.validate().is_ok()
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
