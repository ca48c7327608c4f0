//! # Source Datasets
//!
//! The four source datasets of the pipeline and the cleaning pipeline each
//! one goes through between the structured tier and the merge.

use crate::input::{DatasetConfig, PipelineConfig};
use crate::postprocess::{
    ColumnDropper, ColumnRenamer, NullRowFilter, PostProcessResult, ProcessingPipeline,
    YEAR_COLUMN, YearCaster, YearExtractor, YearRangeFilter, YearUnpivoter,
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Join key shared by every cleansed table
pub const COUNTRY_NAME: &str = "country_name";
pub const COUNTRY_CODE: &str = "country_code";

/// Fuel columns of the emission-by-country dataset
pub const FUEL_COLUMNS: [&str; 6] = ["Coal", "Oil", "Gas", "Cement", "Flaring", "Other"];

/// Column name of the per-capita emission after normalization
pub const PER_CAPITA_COLUMN: &str = "per_capita";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    ForestAreaKm,
    ForestAreaPercent,
    CarbonCo2EmissionsByCountry,
    EmissionByCountry,
}

impl DatasetKind {
    /// Every dataset, in load order
    pub const ALL: [DatasetKind; 4] = [
        DatasetKind::ForestAreaKm,
        DatasetKind::ForestAreaPercent,
        DatasetKind::CarbonCo2EmissionsByCountry,
        DatasetKind::EmissionByCountry,
    ];

    /// Raw file, structured table and renames used when nothing is configured
    pub fn default_config(self) -> DatasetConfig {
        let (raw_key, table, renames): (&str, &str, &[(&str, &str)]) = match self {
            DatasetKind::ForestAreaKm => (
                "forest_area/forest_area_km.csv",
                "delta_forest_area_km",
                &[("Country Name", COUNTRY_NAME), ("Country Code", COUNTRY_CODE)],
            ),
            DatasetKind::ForestAreaPercent => (
                "forest_area/forest_area_percent.csv",
                "delta_forest_area_percent",
                &[("Country Name", COUNTRY_NAME), ("Country Code", COUNTRY_CODE)],
            ),
            DatasetKind::CarbonCo2EmissionsByCountry => (
                "emission/Carbon_(CO2)_Emissions_by_Country.csv",
                "delta_carbon_co2_emissions_by_country",
                &[
                    ("Kilotons of Co2", "kilotons_of_co2"),
                    ("Metric Tons Per Capita", "metric_tons_per_capita"),
                ],
            ),
            DatasetKind::EmissionByCountry => (
                "emission/Emission By Country.csv",
                "delta_emission_by_country",
                &[
                    ("ISO 3166-1 alpha-3", "iso_3166_1"),
                    ("Per Capita", PER_CAPITA_COLUMN),
                ],
            ),
        };

        DatasetConfig {
            raw_key: raw_key.to_string(),
            table: table.to_string(),
            renames: renames
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::ForestAreaKm => write!(f, "forest_area_km"),
            DatasetKind::ForestAreaPercent => write!(f, "forest_area_percent"),
            DatasetKind::CarbonCo2EmissionsByCountry => {
                write!(f, "carbon_co2_emissions_by_country")
            }
            DatasetKind::EmissionByCountry => write!(f, "emission_by_country"),
        }
    }
}

/// When the per-capita emission column is dropped during cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PerCapitaPolicy {
    /// Take part in the all-null check, then drop
    #[default]
    DropAfterNullCheck,
    /// Drop first, so the all-null check only sees the fuel columns
    DropBeforeNullCheck,
    /// Never drop; carried into the curated table
    Keep,
}

/// Name `raw` carries in the structured tier of `kind`
fn structured_name(config: &PipelineConfig, kind: DatasetKind, raw: &str) -> String {
    config
        .datasets
        .get(kind)
        .renames
        .get(raw)
        .cloned()
        .unwrap_or_else(|| raw.to_string())
}

/// Builds the cleaning pipeline of `kind` for a run with `config`.
///
/// Raw headers are resolved through the configured rename map of the
/// dataset, so custom renames reach the same curated vocabulary.
pub fn cleaning_pipeline(
    kind: DatasetKind,
    config: &PipelineConfig,
) -> PostProcessResult<ProcessingPipeline> {
    let mut pipeline = ProcessingPipeline::with_name(format!("clean_{}", kind));
    let name = |raw: &str| structured_name(config, kind, raw);

    match kind {
        DatasetKind::ForestAreaKm | DatasetKind::ForestAreaPercent => {
            let value_name = if kind == DatasetKind::ForestAreaKm {
                "forest_area_km"
            } else {
                "forest_area_percent"
            };
            let country_name = name("Country Name");
            let country_code = name("Country Code");
            pipeline.add_processor(Box::new(YearUnpivoter::new(
                vec![country_name.clone(), country_code.clone()],
                config.window.years(),
                value_name.to_string(),
            )));

            let keys = vocabulary([
                (country_name, COUNTRY_NAME.to_string()),
                (country_code, COUNTRY_CODE.to_string()),
            ]);
            if !keys.is_empty() {
                pipeline.add_processor(Box::new(ColumnRenamer::new(keys)));
            }
        }
        DatasetKind::CarbonCo2EmissionsByCountry => {
            pipeline.add_processor(Box::new(
                YearExtractor::new(name("Date"), config.date_format.clone(), YEAR_COLUMN.to_string())
                    .with_drop_source(true),
            ));
            pipeline.add_processor(Box::new(ColumnRenamer::new(vocabulary([
                (name("Country"), COUNTRY_NAME.to_string()),
                (name("Region"), "region".to_string()),
            ]))));
        }
        DatasetKind::EmissionByCountry => {
            let per_capita = name("Per Capita");
            let mut null_checked: Vec<String> = FUEL_COLUMNS.iter().map(|c| name(*c)).collect();

            match config.per_capita {
                PerCapitaPolicy::DropBeforeNullCheck => {
                    pipeline.add_processor(Box::new(ColumnDropper::new(vec![per_capita.clone()])));
                }
                PerCapitaPolicy::DropAfterNullCheck | PerCapitaPolicy::Keep => {
                    null_checked.push(per_capita.clone());
                }
            }

            pipeline.add_processor(Box::new(NullRowFilter::new(null_checked)));

            if config.per_capita == PerCapitaPolicy::DropAfterNullCheck {
                pipeline.add_processor(Box::new(ColumnDropper::new(vec![per_capita.clone()])));
            }

            let mut pairs = vec![
                (name("ISO 3166-1 alpha-3"), COUNTRY_CODE.to_string()),
                (name("Country"), COUNTRY_NAME.to_string()),
                (name("Total"), "total_co2_emission".to_string()),
                (name("Year"), YEAR_COLUMN.to_string()),
            ];
            pairs.extend(FUEL_COLUMNS.iter().map(|fuel| {
                (name(*fuel), format!("{}_co2_emission", fuel.to_lowercase()))
            }));
            if config.per_capita == PerCapitaPolicy::Keep {
                pairs.push((per_capita, "per_capita_co2_emission".to_string()));
            }
            pipeline.add_processor(Box::new(ColumnRenamer::new(vocabulary(pairs))));
            pipeline.add_processor(Box::new(YearRangeFilter::new(
                YEAR_COLUMN.to_string(),
                config.window.start,
                None,
            )));
            pipeline.add_processor(Box::new(YearCaster::new(YEAR_COLUMN.to_string())));
        }
    }

    Ok(pipeline)
}

/// Rename map without identity pairs
fn vocabulary(pairs: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, String> {
    pairs.into_iter().filter(|(from, to)| from != to).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_default_configs_are_distinct() {
        let tables: Vec<String> = DatasetKind::ALL
            .iter()
            .map(|kind| kind.default_config().table)
            .collect();
        assert_eq!(tables.len(), 4);
        assert!(tables.iter().all(|t| t.starts_with("delta_")));

        let emission = DatasetKind::EmissionByCountry.default_config();
        assert_eq!(emission.raw_key, "emission/Emission By Country.csv");
        assert_eq!(
            emission.renames.get("Per Capita").map(String::as_str),
            Some(PER_CAPITA_COLUMN)
        );
    }

    fn emission_frame() -> DataFrame {
        df! {
            "Country" => ["Brazil", "Brazil", "Chad"],
            "iso_3166_1" => ["BRA", "BRA", "TCD"],
            "Year" => [1989i64, 1990, 1990],
            "Total" => [Some(1.0), Some(2.0), None],
            "Coal" => [Some(1.0), Some(2.0), None],
            "Oil" => [None::<f64>, None, None],
            "Gas" => [None::<f64>, None, None],
            "Cement" => [None::<f64>, None, None],
            "Flaring" => [None::<f64>, None, None],
            "Other" => [None::<f64>, None, None],
            "per_capita" => [None, None, Some(0.1)],
        }
        .unwrap()
    }

    #[test]
    fn test_emission_cleaning_default_policy() {
        let config = PipelineConfig::default();
        let pipeline = cleaning_pipeline(DatasetKind::EmissionByCountry, &config).unwrap();
        let cleaned = pipeline.execute(emission_frame()).unwrap();

        // 1989 is before the window; Chad survives on per_capita alone
        assert_eq!(cleaned.height(), 2);
        let names: Vec<&str> = cleaned
            .get_column_names()
            .iter()
            .map(|s| s.as_str())
            .collect();
        assert!(names.contains(&"country_code"));
        assert!(names.contains(&"total_co2_emission"));
        assert!(!names.contains(&"per_capita"));
        assert!(!names.contains(&"per_capita_co2_emission"));
        assert_eq!(cleaned.column("year").unwrap().dtype(), &DataType::Int32);
    }

    #[test]
    fn test_emission_cleaning_drop_before_null_check() {
        let config = PipelineConfig {
            per_capita: PerCapitaPolicy::DropBeforeNullCheck,
            ..PipelineConfig::default()
        };
        let pipeline = cleaning_pipeline(DatasetKind::EmissionByCountry, &config).unwrap();
        let cleaned = pipeline.execute(emission_frame()).unwrap();

        assert_eq!(cleaned.height(), 1);
    }

    #[test]
    fn test_emission_cleaning_keep_per_capita() {
        let config = PipelineConfig {
            per_capita: PerCapitaPolicy::Keep,
            ..PipelineConfig::default()
        };
        let pipeline = cleaning_pipeline(DatasetKind::EmissionByCountry, &config).unwrap();
        let cleaned = pipeline.execute(emission_frame()).unwrap();

        assert_eq!(cleaned.height(), 2);
        assert!(cleaned.column("per_capita_co2_emission").is_ok());
    }

    #[test]
    fn test_carbon_cleaning_extracts_year() {
        let config = PipelineConfig::default();
        let pipeline =
            cleaning_pipeline(DatasetKind::CarbonCo2EmissionsByCountry, &config).unwrap();
        let raw = df! {
            "Country" => ["Brazil"],
            "Region" => ["Americas"],
            "Date" => ["01-01-1990"],
            "kilotons_of_co2" => [200.0],
            "metric_tons_per_capita" => [1.5],
        }
        .unwrap();

        let cleaned = pipeline.execute(raw).unwrap();
        assert!(cleaned.column("Date").is_err());
        assert_eq!(
            cleaned.column("year").unwrap().i32().unwrap().get(0),
            Some(1990)
        );
        assert!(cleaned.column("country_name").is_ok());
        assert!(cleaned.column("region").is_ok());
    }

    #[test]
    fn test_forest_cleaning_unpivots_window() {
        let mut config = PipelineConfig::default();
        config.window.start = 1990;
        config.window.end = 1992;
        let pipeline = cleaning_pipeline(DatasetKind::ForestAreaPercent, &config).unwrap();
        let raw = df! {
            "country_name" => ["Brazil"],
            "country_code" => ["BRA"],
            "1989" => [1.0],
            "1990" => [2.0],
            "1991" => [3.0],
        }
        .unwrap();

        let cleaned = pipeline.execute(raw).unwrap();
        assert_eq!(cleaned.height(), 2);
        let names: Vec<&str> = cleaned
            .get_column_names()
            .iter()
            .map(|s| s.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["country_name", "country_code", "year", "forest_area_percent"]
        );
    }
}
