//! Static code tables: construction type, detail type and the two ordered
//! region tables. Loaded once from YAML and only read afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_NARAJANG_FALLBACK_TYPE_CODE: &str = "99";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("reading lookup tables {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing lookup tables: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{table} entry #{index} has an empty name")]
    EmptyRegionName { table: &'static str, index: usize },
}

/// One `(substring, code)` pair of an ordered region table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub name: String,
    pub code: String,
}

impl RegionEntry {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

fn default_fallback_type_code() -> String {
    DEFAULT_NARAJANG_FALLBACK_TYPE_CODE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupTables {
    #[serde(default)]
    pub construction_types: BTreeMap<String, String>,
    #[serde(default)]
    pub detail_types: BTreeMap<String, String>,
    /// First match wins; keep more specific names earlier.
    #[serde(default)]
    pub provinces: Vec<RegionEntry>,
    #[serde(default)]
    pub sub_regions: Vec<RegionEntry>,
    #[serde(default = "default_fallback_type_code")]
    pub narajang_fallback_type_code: String,
}

impl Default for LookupTables {
    fn default() -> Self {
        Self {
            construction_types: BTreeMap::new(),
            detail_types: BTreeMap::new(),
            provinces: Vec::new(),
            sub_regions: Vec::new(),
            narajang_fallback_type_code: default_fallback_type_code(),
        }
    }
}

impl LookupTables {
    pub fn from_yaml_str(text: &str) -> Result<Self, LookupError> {
        let tables: Self = serde_yaml::from_str(text)?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LookupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    fn validate(&self) -> Result<(), LookupError> {
        for (table, entries) in [("provinces", &self.provinces), ("sub_regions", &self.sub_regions)] {
            if let Some(index) = entries.iter().position(|e| e.name.trim().is_empty()) {
                return Err(LookupError::EmptyRegionName { table, index });
            }
        }
        Ok(())
    }

    pub fn construction_type_code(&self, label: &str) -> Option<&str> {
        self.construction_types.get(label.trim()).map(String::as_str)
    }

    pub fn detail_type_code(&self, label: &str) -> Option<&str> {
        self.detail_types.get(label.trim()).map(String::as_str)
    }
}
