//! # Reshaping and Cleaning Framework
//!
//! DataFrame transformations applied between the structured tier and the
//! merge. Each transformation is a [`PostProcessor`]; processors are chained
//! in a [`ProcessingPipeline`], either built in code or from serde
//! [`ProcessorConfig`] values.
//!
//! ## Built-in Processors
//! - **ColumnRenamer**: Rename columns with mappings
//! - **ColumnDropper**: Drop columns by name
//! - **NullRowFilter**: Drop rows whose measurement columns are all null
//! - **YearRangeFilter**: Keep rows whose year lies in a range
//! - **YearUnpivoter**: Turn one-column-per-year tables into long rows
//! - **YearExtractor**: Parse a date string column into a year column
//! - **YearCaster**: Normalize the dtype of an existing year column
//!
//! ## Example
//! ```rust
//! use forestcarbon::postprocess::{ProcessingPipeline, YearUnpivoter};
//! use polars::prelude::*;
//!
//! let mut pipeline = ProcessingPipeline::with_name("forest".to_string());
//! pipeline.add_processor(Box::new(YearUnpivoter::new(
//!     vec!["country_name".to_string()],
//!     vec!["1990".to_string(), "1991".to_string()],
//!     "forest_area_km".to_string(),
//! )));
//!
//! let wide = df! {
//!     "country_name" => ["Brazil"],
//!     "1990" => [100.0],
//!     "1991" => [110.0],
//! }.unwrap();
//!
//! let long = pipeline.execute(wide).unwrap();
//! assert_eq!(long.height(), 2);
//! ```

use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Name of the year column produced by [`YearUnpivoter`] and [`YearExtractor`]
pub const YEAR_COLUMN: &str = "year";

/// Result type for post-processing operations
pub type PostProcessResult<T> = Result<T, PostProcessError>;

/// Errors that can occur during post-processing
#[derive(Debug)]
pub enum PostProcessError {
    /// Column not found in DataFrame
    ColumnNotFound(String),
    /// A value could not be parsed
    ParseError {
        column: String,
        row: usize,
        value: String,
        reason: String,
    },
    /// Invalid configuration
    ConfigurationError(String),
    /// Polars-specific error
    PolarsError(PolarsError),
}

impl fmt::Display for PostProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostProcessError::ColumnNotFound(col) => {
                write!(f, "Column '{}' not found in DataFrame", col)
            }
            PostProcessError::ParseError {
                column,
                row,
                value,
                reason,
            } => write!(
                f,
                "Cannot parse '{}' in column '{}' at row {}: {}",
                value, column, row, reason
            ),
            PostProcessError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            PostProcessError::PolarsError(e) => write!(f, "Polars error: {}", e),
        }
    }
}

impl Error for PostProcessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PostProcessError::PolarsError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PolarsError> for PostProcessError {
    fn from(error: PolarsError) -> Self {
        PostProcessError::PolarsError(error)
    }
}

/// Core trait for post-processing operations on DataFrames
pub trait PostProcessor: Send + Sync {
    /// Process the DataFrame and return the transformed result
    fn process(&self, df: DataFrame) -> PostProcessResult<DataFrame>;

    /// Get the name/identifier of this processor
    fn name(&self) -> &str;

    /// Get a description of what this processor does
    fn description(&self) -> &str;

    /// Validate that the processor can operate on the given DataFrame schema
    fn validate_schema(&self, schema: &Schema) -> PostProcessResult<()> {
        let _ = schema; // Default implementation does no validation
        Ok(())
    }
}

/// Configuration for an entire processing pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingPipelineConfig {
    /// Optional name for the pipeline
    pub name: Option<String>,
    /// List of processors to execute in order
    pub processors: Vec<ProcessorConfig>,
}

/// Configuration for processing steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorConfig {
    /// Rename columns using a mapping
    RenameColumns { mappings: BTreeMap<String, String> },
    /// Drop columns
    DropColumns { columns: Vec<String> },
    /// Drop rows where every listed column is null
    DropAllNull { columns: Vec<String> },
    /// Keep rows whose year lies in `[min, max]`
    YearRange {
        column: String,
        min: i32,
        #[serde(default)]
        max: Option<i32>,
    },
    /// Unpivot year columns into (year, value) rows
    Unpivot {
        id_columns: Vec<String>,
        year_columns: Vec<String>,
        value_name: String,
    },
    /// Parse a date column into a year column
    ExtractYear {
        source: String,
        format: String,
        #[serde(default = "default_year_column")]
        target: String,
        #[serde(default)]
        drop_source: bool,
    },
    /// Cast a year column to Int32
    CastYear { column: String },
}

fn default_year_column() -> String {
    YEAR_COLUMN.to_string()
}

/// Pipeline that chains multiple post-processors together
pub struct ProcessingPipeline {
    processors: Vec<Box<dyn PostProcessor>>,
    name: String,
}

impl ProcessingPipeline {
    /// Create a new empty processing pipeline
    pub fn new() -> Self {
        Self {
            name: "Unnamed Pipeline".to_string(),
            processors: Vec::new(),
        }
    }

    /// Create a new processing pipeline with a name
    pub fn with_name(name: String) -> Self {
        Self {
            name,
            processors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Names of the processors, in execution order
    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Create a processing pipeline from configuration
    pub fn from_config(config: &ProcessingPipelineConfig) -> PostProcessResult<Self> {
        let mut pipeline = Self::with_name(
            config
                .name
                .clone()
                .unwrap_or_else(|| "Configured Pipeline".to_string()),
        );

        for processor_config in &config.processors {
            pipeline.add_processor(create_processor(processor_config)?);
        }

        Ok(pipeline)
    }

    /// Add a processor to the pipeline
    pub fn add_processor(&mut self, processor: Box<dyn PostProcessor>) {
        self.processors.push(processor);
    }

    /// Execute the processing pipeline on a DataFrame
    pub fn execute(&self, mut df: DataFrame) -> PostProcessResult<DataFrame> {
        debug!(
            "Executing pipeline '{}' with {} processors",
            self.name,
            self.processors.len()
        );

        if self.processors.is_empty() {
            debug!(
                "Pipeline '{}' is empty, returning DataFrame unchanged",
                self.name
            );
            return Ok(df);
        }

        debug!("Initial DataFrame shape: {:?}", df.shape());

        for (i, processor) in self.processors.iter().enumerate() {
            let processor_name = processor.name();
            debug!(
                "Executing processor {} '{}' - input shape: {:?}",
                i + 1,
                processor_name,
                df.shape()
            );

            processor.validate_schema(&df.schema())?;
            df = processor.process(df)?;

            debug!(
                "Processor '{}' completed - output shape: {:?}",
                processor_name,
                df.shape()
            );
        }

        debug!("Pipeline '{}' completed successfully", self.name);
        Ok(df)
    }
}

impl Default for ProcessingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper function to create a processor from configuration
pub fn create_processor(config: &ProcessorConfig) -> PostProcessResult<Box<dyn PostProcessor>> {
    match config {
        ProcessorConfig::RenameColumns { mappings } => {
            Ok(Box::new(ColumnRenamer::new(mappings.clone())))
        }
        ProcessorConfig::DropColumns { columns } => {
            Ok(Box::new(ColumnDropper::new(columns.clone())))
        }
        ProcessorConfig::DropAllNull { columns } => {
            if columns.is_empty() {
                return Err(PostProcessError::ConfigurationError(
                    "drop_all_null needs at least one column".to_string(),
                ));
            }
            Ok(Box::new(NullRowFilter::new(columns.clone())))
        }
        ProcessorConfig::YearRange { column, min, max } => {
            if let Some(max) = max
                && max < min
            {
                return Err(PostProcessError::ConfigurationError(format!(
                    "year range max {} is below min {}",
                    max, min
                )));
            }
            Ok(Box::new(YearRangeFilter::new(column.clone(), *min, *max)))
        }
        ProcessorConfig::Unpivot {
            id_columns,
            year_columns,
            value_name,
        } => {
            let unpivoter =
                YearUnpivoter::new(id_columns.clone(), year_columns.clone(), value_name.clone());
            unpivoter.parsed_years()?;
            Ok(Box::new(unpivoter))
        }
        ProcessorConfig::ExtractYear {
            source,
            format,
            target,
            drop_source,
        } => Ok(Box::new(
            YearExtractor::new(source.clone(), format.clone(), target.clone())
                .with_drop_source(*drop_source),
        )),
        ProcessorConfig::CastYear { column } => Ok(Box::new(YearCaster::new(column.clone()))),
    }
}

/// Create a pipeline from a slice of processor configurations
pub fn create_pipeline(configs: &[ProcessorConfig]) -> PostProcessResult<ProcessingPipeline> {
    let mut pipeline = ProcessingPipeline::new();

    for config in configs {
        pipeline.add_processor(create_processor(config)?);
    }

    Ok(pipeline)
}

fn require_columns(schema: &Schema, columns: &[String]) -> PostProcessResult<()> {
    match columns.iter().find(|c| !schema.contains(c.as_str())) {
        Some(missing) => Err(PostProcessError::ColumnNotFound(missing.clone())),
        None => Ok(()),
    }
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Renames columns; unmapped columns and all rows pass through untouched.
pub struct ColumnRenamer {
    mappings: BTreeMap<String, String>,
}

impl ColumnRenamer {
    pub fn new(mappings: BTreeMap<String, String>) -> Self {
        Self { mappings }
    }
}

impl PostProcessor for ColumnRenamer {
    fn process(&self, mut df: DataFrame) -> PostProcessResult<DataFrame> {
        debug!("Renaming columns with {} mappings", self.mappings.len());

        for (old_name, new_name) in &self.mappings {
            if !has_column(&df, old_name) {
                warn!(
                    "Column '{}' not found in DataFrame, skipping rename",
                    old_name
                );
                continue;
            }

            debug!("Renaming column '{}' to '{}'", old_name, new_name);
            df.rename(old_name, new_name.as_str().into())?;
        }

        Ok(df)
    }

    fn name(&self) -> &str {
        "ColumnRenamer"
    }

    fn description(&self) -> &str {
        "Renames columns based on provided mappings"
    }
}

/// Drops the listed columns that exist in the frame
pub struct ColumnDropper {
    columns: Vec<String>,
}

impl ColumnDropper {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }
}

impl PostProcessor for ColumnDropper {
    fn process(&self, df: DataFrame) -> PostProcessResult<DataFrame> {
        let kept: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .filter(|c| !self.columns.contains(c))
            .collect();

        debug!(
            "Dropping columns {:?}, keeping {} columns",
            self.columns,
            kept.len()
        );
        Ok(df.select(kept)?)
    }

    fn name(&self) -> &str {
        "ColumnDropper"
    }

    fn description(&self) -> &str {
        "Drops columns by name"
    }
}

/// Drops every row in which all of the listed columns are null.
///
/// A row with at least one non-null value among the columns survives.
pub struct NullRowFilter {
    columns: Vec<String>,
}

impl NullRowFilter {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }
}

impl PostProcessor for NullRowFilter {
    fn process(&self, df: DataFrame) -> PostProcessResult<DataFrame> {
        let Some(any_present) = self
            .columns
            .iter()
            .map(|c| col(c.as_str()).is_not_null())
            .reduce(|acc, e| acc.or(e))
        else {
            return Ok(df);
        };

        let before = df.height();
        let result = df.lazy().filter(any_present).collect()?;
        debug!(
            "Dropped {} rows with all of {:?} null",
            before - result.height(),
            self.columns
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "NullRowFilter"
    }

    fn description(&self) -> &str {
        "Drops rows whose measurement columns are all null"
    }

    fn validate_schema(&self, schema: &Schema) -> PostProcessResult<()> {
        require_columns(schema, &self.columns)
    }
}

/// Keeps rows whose year is at least `min` and, when set, at most `max`.
///
/// Rows with a null year are dropped.
pub struct YearRangeFilter {
    column: String,
    min: i32,
    max: Option<i32>,
}

impl YearRangeFilter {
    pub fn new(column: String, min: i32, max: Option<i32>) -> Self {
        Self { column, min, max }
    }
}

impl PostProcessor for YearRangeFilter {
    fn process(&self, df: DataFrame) -> PostProcessResult<DataFrame> {
        let year = col(self.column.as_str()).cast(DataType::Int64);
        let mut predicate = year.clone().gt_eq(lit(self.min as i64));
        if let Some(max) = self.max {
            predicate = predicate.and(year.lt_eq(lit(max as i64)));
        }

        let before = df.height();
        let result = df.lazy().filter(predicate).collect()?;
        debug!(
            "Year filter on '{}' [{}, {:?}] dropped {} rows",
            self.column,
            self.min,
            self.max,
            before - result.height()
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "YearRangeFilter"
    }

    fn description(&self) -> &str {
        "Keeps rows whose year lies in a range"
    }

    fn validate_schema(&self, schema: &Schema) -> PostProcessResult<()> {
        require_columns(schema, std::slice::from_ref(&self.column))
    }
}

/// Wide-to-long reshape over a configured list of year columns.
///
/// Each configured year column present in the input contributes one output
/// row per input row: the id columns, `year` (the column name as Int32) and
/// `value_name` (the cell as Float64, nulls kept). Configured years missing
/// from the input are skipped; input columns outside the list are excluded.
pub struct YearUnpivoter {
    id_columns: Vec<String>,
    year_columns: Vec<String>,
    value_name: String,
}

impl YearUnpivoter {
    pub fn new(id_columns: Vec<String>, year_columns: Vec<String>, value_name: String) -> Self {
        Self {
            id_columns,
            year_columns,
            value_name,
        }
    }

    /// Year columns paired with their numeric year
    fn parsed_years(&self) -> PostProcessResult<Vec<(&str, i32)>> {
        self.year_columns
            .iter()
            .map(|name| {
                name.trim()
                    .parse::<i32>()
                    .map(|year| (name.as_str(), year))
                    .map_err(|_| {
                        PostProcessError::ConfigurationError(format!(
                            "year column '{}' is not a year",
                            name
                        ))
                    })
            })
            .collect()
    }

    fn empty_output(&self, df: &DataFrame) -> PostProcessResult<DataFrame> {
        let mut out = df.select(self.id_columns.clone())?.head(Some(0));
        out.with_column(Series::new_empty(YEAR_COLUMN.into(), &DataType::Int32))?;
        out.with_column(Series::new_empty(
            self.value_name.as_str().into(),
            &DataType::Float64,
        ))?;
        Ok(out)
    }
}

impl PostProcessor for YearUnpivoter {
    fn process(&self, df: DataFrame) -> PostProcessResult<DataFrame> {
        let present: Vec<(&str, i32)> = self
            .parsed_years()?
            .into_iter()
            .filter(|(name, _)| has_column(&df, name))
            .collect();

        debug!(
            "Unpivoting {} of {} configured year columns into '{}'",
            present.len(),
            self.year_columns.len(),
            self.value_name
        );

        if present.is_empty() {
            return self.empty_output(&df);
        }

        let slices: Vec<LazyFrame> = present
            .iter()
            .map(|(name, year)| {
                let mut exprs: Vec<Expr> =
                    self.id_columns.iter().map(|c| col(c.as_str())).collect();
                exprs.push(lit(*year).cast(DataType::Int32).alias(YEAR_COLUMN));
                exprs.push(
                    col(*name)
                        .cast(DataType::Float64)
                        .alias(self.value_name.as_str()),
                );
                df.clone().lazy().select(exprs)
            })
            .collect();

        Ok(concat(slices, UnionArgs::default())?.collect()?)
    }

    fn name(&self) -> &str {
        "YearUnpivoter"
    }

    fn description(&self) -> &str {
        "Turns one column per year into (year, value) rows"
    }

    fn validate_schema(&self, schema: &Schema) -> PostProcessResult<()> {
        require_columns(schema, &self.id_columns)
    }
}

/// Parses a date string column with a chrono format and stores the year.
///
/// Any null or malformed value fails the whole table.
pub struct YearExtractor {
    source: String,
    format: String,
    target: String,
    drop_source: bool,
}

impl YearExtractor {
    pub fn new(source: String, format: String, target: String) -> Self {
        Self {
            source,
            format,
            target,
            drop_source: false,
        }
    }

    pub fn with_drop_source(mut self, drop_source: bool) -> Self {
        self.drop_source = drop_source;
        self
    }

    /// Parses one date string and returns its year
    pub fn extract_year(&self, value: &str) -> Result<i32, chrono::ParseError> {
        NaiveDate::parse_from_str(value.trim(), &self.format).map(|date| date.year())
    }
}

impl PostProcessor for YearExtractor {
    fn process(&self, mut df: DataFrame) -> PostProcessResult<DataFrame> {
        debug!(
            "Extracting '{}' from '{}' with format '{}'",
            self.target, self.source, self.format
        );

        let dates = df.column(&self.source)?.cast(&DataType::String)?;
        let mut years = Vec::with_capacity(dates.len());

        for (row, value) in dates.str()?.into_iter().enumerate() {
            let Some(value) = value else {
                return Err(PostProcessError::ParseError {
                    column: self.source.clone(),
                    row,
                    value: "null".to_string(),
                    reason: "missing date".to_string(),
                });
            };

            let year = self
                .extract_year(value)
                .map_err(|e| PostProcessError::ParseError {
                    column: self.source.clone(),
                    row,
                    value: value.to_string(),
                    reason: e.to_string(),
                })?;
            years.push(year);
        }

        df.with_column(Series::new(self.target.as_str().into(), years))?;

        if self.drop_source && self.source != self.target {
            return ColumnDropper::new(vec![self.source.clone()]).process(df);
        }

        Ok(df)
    }

    fn name(&self) -> &str {
        "YearExtractor"
    }

    fn description(&self) -> &str {
        "Parses a date column into a year column"
    }

    fn validate_schema(&self, schema: &Schema) -> PostProcessResult<()> {
        require_columns(schema, std::slice::from_ref(&self.source))
    }
}

/// Casts an existing year column to Int32
pub struct YearCaster {
    column: String,
}

impl YearCaster {
    pub fn new(column: String) -> Self {
        Self { column }
    }
}

impl PostProcessor for YearCaster {
    fn process(&self, df: DataFrame) -> PostProcessResult<DataFrame> {
        Ok(df
            .lazy()
            .with_columns([col(self.column.as_str()).cast(DataType::Int32)])
            .collect()?)
    }

    fn name(&self) -> &str {
        "YearCaster"
    }

    fn description(&self) -> &str {
        "Casts a year column to Int32"
    }

    fn validate_schema(&self, schema: &Schema) -> PostProcessResult<()> {
        require_columns(schema, std::slice::from_ref(&self.column))
    }
}
