//! # Pipeline Configuration Module
//!
//! Configuration parsing and validation for a pipeline run. A configuration
//! names the three tier roots, the analysis window, the join and per-capita
//! policies, and for every source dataset its raw file, its structured table
//! name and the column renames applied when it is normalized.
//!
//! Every field has a default matching the /mnt tier layout, so an empty
//! document (`{}`) is a valid configuration.
//!
//! ## Example Usage
//!
//! ```rust
//! use forestcarbon::input::PipelineConfig;
//!
//! let json = r#"
//! {
//!   "tiers": {
//!     "raw": "s3://tp-bronze",
//!     "structured": "s3://tp-silver",
//!     "curated": "s3://tp-gold"
//!   },
//!   "window": { "start": 1990, "end": 2021 },
//!   "join_mode": "inner"
//! }"#;
//! let config = PipelineConfig::from_json(json)?;
//! assert_eq!(config.window.years().len(), 32);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::datasets::{DatasetKind, PerCapitaPolicy};
use crate::merge::JoinMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Roots of the raw, structured and curated tiers
    pub tiers: TierLocations,
    /// Years kept by the reshaping stage
    pub window: AnalysisWindow,
    /// How the cleansed tables are joined
    pub join_mode: JoinMode,
    /// When the per-capita emission column is dropped
    pub per_capita: PerCapitaPolicy,
    /// chrono format of the composite `Date` field of the carbon dataset
    pub date_format: String,
    /// Name of the curated table
    pub curated_table: String,
    /// Per-dataset raw files, table names and renames
    pub datasets: DatasetConfigs,
}

/// Tier roots, local directories or `s3://` locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLocations {
    pub raw: String,
    pub structured: String,
    pub curated: String,
}

/// Inclusive range of years in the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisWindow {
    pub start: i32,
    pub end: i32,
}

/// Settings of the four source datasets.
///
/// Each field given in a document replaces only that field of the dataset's
/// default; an entry without `renames` keeps the default rename map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DatasetConfigsDocument")]
pub struct DatasetConfigs {
    pub forest_area_km: DatasetConfig,
    pub forest_area_percent: DatasetConfig,
    pub carbon_co2_emissions_by_country: DatasetConfig,
    pub emission_by_country: DatasetConfig,
}

/// Settings of one source dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Path of the CSV file relative to the raw tier root
    pub raw_key: String,
    /// Table name in the structured tier
    pub table: String,
    /// Column renames applied when normalizing (old name -> new name)
    pub renames: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatasetConfigsDocument {
    forest_area_km: Option<DatasetOverride>,
    forest_area_percent: Option<DatasetOverride>,
    carbon_co2_emissions_by_country: Option<DatasetOverride>,
    emission_by_country: Option<DatasetOverride>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatasetOverride {
    raw_key: Option<String>,
    table: Option<String>,
    renames: Option<BTreeMap<String, String>>,
}

impl DatasetOverride {
    fn resolve(entry: Option<Self>, kind: DatasetKind) -> DatasetConfig {
        let default = kind.default_config();
        let Some(entry) = entry else {
            return default;
        };

        DatasetConfig {
            raw_key: entry.raw_key.unwrap_or(default.raw_key),
            table: entry.table.unwrap_or(default.table),
            renames: entry.renames.unwrap_or(default.renames),
        }
    }
}

impl From<DatasetConfigsDocument> for DatasetConfigs {
    fn from(document: DatasetConfigsDocument) -> Self {
        Self {
            forest_area_km: DatasetOverride::resolve(
                document.forest_area_km,
                DatasetKind::ForestAreaKm,
            ),
            forest_area_percent: DatasetOverride::resolve(
                document.forest_area_percent,
                DatasetKind::ForestAreaPercent,
            ),
            carbon_co2_emissions_by_country: DatasetOverride::resolve(
                document.carbon_co2_emissions_by_country,
                DatasetKind::CarbonCo2EmissionsByCountry,
            ),
            emission_by_country: DatasetOverride::resolve(
                document.emission_by_country,
                DatasetKind::EmissionByCountry,
            ),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tiers: TierLocations::default(),
            window: AnalysisWindow::default(),
            join_mode: JoinMode::default(),
            per_capita: PerCapitaPolicy::default(),
            date_format: "%d-%m-%Y".to_string(),
            curated_table: "sweet_golden_data".to_string(),
            datasets: DatasetConfigs::default(),
        }
    }
}

impl Default for TierLocations {
    fn default() -> Self {
        Self {
            raw: "/mnt/tp-bronze".to_string(),
            structured: "/mnt/tp-silver".to_string(),
            curated: "/mnt/tp-gold".to_string(),
        }
    }
}

impl Default for AnalysisWindow {
    fn default() -> Self {
        Self {
            start: 1990,
            end: 2021,
        }
    }
}

impl AnalysisWindow {
    /// Year column names covered by the window, in ascending order
    pub fn years(&self) -> Vec<String> {
        (self.start..=self.end).map(|year| year.to_string()).collect()
    }
}

impl Default for DatasetConfigs {
    fn default() -> Self {
        Self {
            forest_area_km: DatasetKind::ForestAreaKm.default_config(),
            forest_area_percent: DatasetKind::ForestAreaPercent.default_config(),
            carbon_co2_emissions_by_country: DatasetKind::CarbonCo2EmissionsByCountry
                .default_config(),
            emission_by_country: DatasetKind::EmissionByCountry.default_config(),
        }
    }
}

impl DatasetConfigs {
    pub fn get(&self, kind: DatasetKind) -> &DatasetConfig {
        match kind {
            DatasetKind::ForestAreaKm => &self.forest_area_km,
            DatasetKind::ForestAreaPercent => &self.forest_area_percent,
            DatasetKind::CarbonCo2EmissionsByCountry => &self.carbon_co2_emissions_by_country,
            DatasetKind::EmissionByCountry => &self.emission_by_country,
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration from a JSON or YAML file.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
    /// as JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json_str)?)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml_str)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks the configuration for values that would make a run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.start > self.window.end {
            return Err(ConfigError::Invalid(format!(
                "analysis window start {} is after end {}",
                self.window.start, self.window.end
            )));
        }

        for (name, root) in [
            ("raw", &self.tiers.raw),
            ("structured", &self.tiers.structured),
            ("curated", &self.tiers.curated),
        ] {
            if root.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} tier root is empty", name)));
            }
        }

        if self.date_format.trim().is_empty() {
            return Err(ConfigError::Invalid("date_format is empty".to_string()));
        }

        if self.curated_table.trim().is_empty() {
            return Err(ConfigError::Invalid("curated_table is empty".to_string()));
        }

        let mut tables = Vec::new();
        for kind in DatasetKind::ALL {
            let dataset = self.datasets.get(kind);
            if dataset.raw_key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} has an empty raw_key", kind)));
            }
            if dataset.table.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} has an empty table name", kind)));
            }
            if tables.contains(&dataset.table) {
                return Err(ConfigError::Invalid(format!(
                    "table name '{}' is used by more than one dataset",
                    dataset.table
                )));
            }
            tables.push(dataset.table.clone());
        }

        Ok(())
    }
}
