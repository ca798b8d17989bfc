//! Engine and source configuration

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Row limits applied to aggregation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowLimitPolicy {
    /// Groups returned for ordinary datasets
    pub default_limit: usize,

    /// Row count estimate above which a dataset counts as large
    pub large_dataset_threshold: usize,

    /// Groups returned for large datasets
    pub large_dataset_limit: usize,
}

impl Default for RowLimitPolicy {
    fn default() -> Self {
        Self {
            default_limit: 500,
            large_dataset_threshold: 1_000_000,
            large_dataset_limit: 100,
        }
    }
}

impl RowLimitPolicy {
    /// Row limit for a source with `row_estimate` rows, never below one group
    pub fn limit_for(&self, row_estimate: usize) -> usize {
        let limit = if row_estimate > self.large_dataset_threshold {
            self.large_dataset_limit
        } else {
            self.default_limit
        };
        limit.max(1)
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend tag used when a source does not name one
    pub default_backend: String,

    /// Row limit policy
    pub row_limit: RowLimitPolicy,

    /// Preferred order of dimensions when drilling without an explicit next dimension
    pub drill_order: Vec<String>,

    /// Numeric fields exposed as binned dimensions (field -> bin width)
    pub binned_dimensions: IndexMap<String, f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_backend: "memory".to_string(),
            row_limit: RowLimitPolicy::default(),
            drill_order: Vec::new(),
            binned_dimensions: IndexMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&json)?;
        tracing::info!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_backend.trim().is_empty() {
            return Err(EngineError::Config("default_backend must not be empty".to_string()));
        }
        if self.row_limit.default_limit == 0 || self.row_limit.large_dataset_limit == 0 {
            return Err(EngineError::Config("row limits must be at least 1".to_string()));
        }
        if let Some((field, width)) = self
            .binned_dimensions
            .iter()
            .find(|(_, width)| !(**width > 0.0 && width.is_finite()))
        {
            return Err(EngineError::Config(format!(
                "bin width {} for '{}' must be a positive number",
                width, field
            )));
        }
        Ok(())
    }
}

/// Null value configuration for text-based sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullConfig {
    /// Patterns to treat as null
    pub patterns: Vec<String>,

    /// Whether to trim whitespace before checking
    pub trim_whitespace: bool,

    /// Case sensitive matching
    pub case_sensitive: bool,
}

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                String::new(),
                "-".to_string(),
                "N/A".to_string(),
                "null".to_string(),
                "None".to_string(),
            ],
            trim_whitespace: true,
            case_sensitive: false,
        }
    }
}

impl NullConfig {
    /// Check if a value should be treated as null
    pub fn is_null(&self, value: &str) -> bool {
        let test_value = if self.trim_whitespace { value.trim() } else { value };

        self.patterns.iter().any(|pattern| {
            if self.case_sensitive {
                test_value == pattern
            } else {
                test_value.eq_ignore_ascii_case(pattern)
            }
        })
    }
}

/// Which connector to build for a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Connector tag, e.g. "sqlite" or "csv"
    pub kind: String,

    /// Location of the source
    pub path: PathBuf,

    /// Table name for relational sources
    #[serde(default)]
    pub table: Option<String>,

    /// Backend tag overriding the engine default
    #[serde(default)]
    pub backend: Option<String>,

    #[serde(default)]
    pub null_config: NullConfig,
}

impl SourceConfig {
    pub fn new(kind: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
            table: None,
            backend: None,
            null_config: NullConfig::default(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }
}
