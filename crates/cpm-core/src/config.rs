use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const MAX_COMPLETION_OFFSET_DAYS: i64 = 365;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("completion_offset_days must be within 0..={max}, got {value}")]
    OffsetOutOfRange { value: i64, max: i64 },
    #[error("min_contract_amount must be a non-negative number, got {0}")]
    NegativeMinAmount(f64),
    #[error("chunk_size must be positive")]
    ZeroChunkSize,
}

/// List setting as written by a user: comma-separated text or a YAML sequence.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListInput {
    Text(String),
    Items(Vec<String>),
}

impl ListInput {
    pub fn into_entries(self) -> Vec<String> {
        match self {
            Self::Text(text) => parse_list(&text),
            Self::Items(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Split comma-separated text into trimmed, non-empty entries.
pub fn parse_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ListInput>::deserialize(deserializer)?
        .map(ListInput::into_entries)
        .unwrap_or_default())
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Per-invocation filtering and export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub completion_offset_days: i64,
    #[serde(default)]
    pub min_contract_amount: f64,
    #[serde(default, deserialize_with = "deserialize_list")]
    pub excluded_types: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_list")]
    pub excluded_keywords: Vec<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            completion_offset_days: 0,
            min_contract_amount: 0.0,
            excluded_types: Vec::new(),
            excluded_keywords: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=MAX_COMPLETION_OFFSET_DAYS).contains(&self.completion_offset_days) {
            return Err(ConfigError::OffsetOutOfRange {
                value: self.completion_offset_days,
                max: MAX_COMPLETION_OFFSET_DAYS,
            });
        }
        if !(self.min_contract_amount >= 0.0) {
            return Err(ConfigError::NegativeMinAmount(self.min_contract_amount));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }

    pub fn with_excluded_types(mut self, text: &str) -> Self {
        self.excluded_types = parse_list(text);
        self
    }

    pub fn with_excluded_keywords(mut self, text: &str) -> Self {
        self.excluded_keywords = parse_list(text);
        self
    }
}
