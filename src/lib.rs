//! # forestcarbon
//!
//! A batch pipeline that turns raw forest coverage and CO2 emission datasets
//! into one curated table keyed by country and year.
//!
//! ## Stages
//!
//! 1. Attach the raw, structured and curated tiers
//! 2. Load each raw CSV file
//! 3. Normalize column names and persist a structured table per dataset
//! 4. Clean and reshape each structured table
//! 5. Join the four cleansed tables
//! 6. Persist the curated table, replacing any previous version
//!
//! Every run rewrites every table; nothing is updated incrementally.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forestcarbon::{input::PipelineConfig, run_pipeline};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_file("pipeline.yaml")?;
//! let report = run_pipeline(&config).await?;
//! println!("{} curated rows", report.curated.rows);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! tiers:
//!   raw: s3://tp-bronze
//!   structured: s3://tp-silver
//!   curated: s3://tp-gold
//! window:
//!   start: 1990
//!   end: 2021
//! join_mode: inner
//! per_capita: drop_after_null_check
//! ```

pub mod cli;
pub mod datasets;
pub mod input;
pub mod loader;
pub mod log;
pub mod merge;
pub mod mount;
pub mod output;
pub mod postprocess;
pub mod storage;

#[cfg(test)]
mod cli_tests;

use crate::datasets::{DatasetKind, cleaning_pipeline};
use crate::input::{ConfigError, DatasetConfig, PipelineConfig};
use crate::loader::{LoadError, load_csv};
use crate::merge::{DatasetTables, MergeError, merge_tables};
use crate::mount::{Mount, MountError, Tier, TierMounts};
use crate::output::{OutputError, read_table, write_table};
use crate::postprocess::{ColumnRenamer, PostProcessError, PostProcessor};
use crate::storage::StorageError;
use ::log::{debug, info};
use polars::prelude::DataFrame;
use thiserror::Error;

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("cannot clean {dataset}: {source}")]
    Clean {
        dataset: DatasetKind,
        #[source]
        source: PostProcessError,
    },

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("raw file for {dataset} not found: {path}")]
    MissingInput { dataset: DatasetKind, path: String },
}

/// Shape and location of a written table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub table: String,
    pub path: String,
    pub rows: usize,
    pub columns: usize,
}

impl TableSummary {
    fn new(table: &str, path: String, df: &DataFrame) -> Self {
        TableSummary {
            table: table.to_string(),
            path,
            rows: df.height(),
            columns: df.width(),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub raw_files: Vec<String>,
    pub structured: Vec<TableSummary>,
    pub curated: TableSummary,
}

/// Runs every stage of the pipeline.
///
/// The tiers are detached whether or not the stages succeed.
///
/// # Errors
///
/// Any failing stage aborts the run: invalid configuration, a missing tier
/// container or raw file, malformed CSV or dates, a cleaning step referring
/// to an absent column, duplicate join keys, or a failed write.
pub async fn run_pipeline(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    config.validate()?;

    let mounts = TierMounts::attach(&config.tiers).await?;
    let result = run_stages(config, &mounts).await;
    mounts.detach();

    result
}

async fn run_stages(
    config: &PipelineConfig,
    mounts: &TierMounts,
) -> Result<PipelineReport, PipelineError> {
    let raw_files = mounts.raw.list("").await?;
    debug!("Raw tier holds {} files", raw_files.len());
    for file in &raw_files {
        debug!("  {}", file);
    }

    let mut structured = Vec::with_capacity(DatasetKind::ALL.len());
    for kind in DatasetKind::ALL {
        let dataset = config.datasets.get(kind);
        let raw = load_csv(&mounts.raw, &dataset.raw_key).await?;
        structured.push(normalize_dataset(&mounts.structured, kind, dataset, raw).await?);
    }

    let tables = DatasetTables {
        forest_area_km: clean_dataset(DatasetKind::ForestAreaKm, config, mounts).await?,
        forest_area_percent: clean_dataset(DatasetKind::ForestAreaPercent, config, mounts)
            .await?,
        carbon_co2_emissions_by_country: clean_dataset(
            DatasetKind::CarbonCo2EmissionsByCountry,
            config,
            mounts,
        )
        .await?,
        emission_by_country: clean_dataset(DatasetKind::EmissionByCountry, config, mounts)
            .await?,
    };

    let mut curated = merge_tables(&tables, config.join_mode)?;
    let path = write_table(&mounts.curated, &config.curated_table, &mut curated).await?;
    info!(
        "Curated table {} written with {} rows",
        config.curated_table,
        curated.height()
    );

    Ok(PipelineReport {
        raw_files,
        structured,
        curated: TableSummary::new(&config.curated_table, path, &curated),
    })
}

/// Applies the raw rename map of `dataset` and persists the result as its
/// structured table, replacing any previous version
pub async fn normalize_dataset(
    structured: &Mount,
    kind: DatasetKind,
    dataset: &DatasetConfig,
    raw: DataFrame,
) -> Result<TableSummary, PipelineError> {
    let mut df = ColumnRenamer::new(dataset.renames.clone())
        .process(raw)
        .map_err(|source| PipelineError::Clean {
            dataset: kind,
            source,
        })?;

    let path = write_table(structured, &dataset.table, &mut df).await?;
    info!(
        "Structured table {} written with {} rows",
        dataset.table,
        df.height()
    );

    Ok(TableSummary::new(&dataset.table, path, &df))
}

/// Reads the structured table of `kind` back and runs its cleaning pipeline
pub async fn clean_dataset(
    kind: DatasetKind,
    config: &PipelineConfig,
    mounts: &TierMounts,
) -> Result<DataFrame, PipelineError> {
    let clean_error = |source| PipelineError::Clean {
        dataset: kind,
        source,
    };

    let table = &config.datasets.get(kind).table;
    let df = read_table(&mounts.structured, table).await?;
    let pipeline = cleaning_pipeline(kind, config).map_err(clean_error)?;
    let cleaned = pipeline.execute(df).map_err(clean_error)?;

    debug!("Cleansed {} with shape {:?}", kind, cleaned.shape());
    Ok(cleaned)
}

/// Checks that the configuration is valid and every raw file exists,
/// without writing anything. Returns the full path of each raw file.
pub async fn check_inputs(
    config: &PipelineConfig,
) -> Result<Vec<(DatasetKind, String)>, PipelineError> {
    config.validate()?;

    let raw = Mount::attach(Tier::Raw, &config.tiers.raw).await?;
    let mut found = Vec::with_capacity(DatasetKind::ALL.len());

    for kind in DatasetKind::ALL {
        let key = &config.datasets.get(kind).raw_key;
        let path = raw.path(key);
        if !raw.exists(key).await? {
            raw.detach();
            return Err(PipelineError::MissingInput {
                dataset: kind,
                path,
            });
        }
        found.push((kind, path));
    }

    raw.detach();
    Ok(found)
}

/// Lists every file stored in `tier`
pub async fn list_tier(config: &PipelineConfig, tier: Tier) -> Result<Vec<String>, PipelineError> {
    let root = match tier {
        Tier::Raw => &config.tiers.raw,
        Tier::Structured => &config.tiers.structured,
        Tier::Curated => &config.tiers.curated,
    };

    let mount = Mount::attach(tier, root).await?;
    let files = mount.list("").await;
    mount.detach();

    Ok(files?)
}
