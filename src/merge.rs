//! # Merger
//!
//! Joins the four cleansed tables into the curated table. Forest area (km²),
//! forest area (%) and emissions by country are joined on
//! `(country_name, country_code, year)`; the carbon table carries no country
//! code and is joined on `(country_name, year)`. Every table must be unique on
//! its join key, otherwise the merge fails instead of multiplying rows.

use crate::datasets::{COUNTRY_CODE, COUNTRY_NAME, DatasetKind};
use crate::postprocess::YEAR_COLUMN;
use clap::ValueEnum;
use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error(
        "table {table} has {groups} duplicated keys on ({}), e.g. {example}",
        .keys.join(", ")
    )]
    DuplicateKeys {
        table: String,
        keys: Vec<String>,
        example: String,
        groups: usize,
    },

    #[error("table {table} has no join column {column}")]
    MissingKeyColumn { table: String, column: String },

    #[error("merge failed: {0}")]
    Polars(#[from] PolarsError),
}

/// How rows without a partner in every table are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Keep only keys present in all four tables
    #[default]
    Inner,
    /// Keep every row of the forest area (km²) table
    Left,
}

impl JoinMode {
    pub fn join_type(self) -> JoinType {
        match self {
            JoinMode::Inner => JoinType::Inner,
            JoinMode::Left => JoinType::Left,
        }
    }
}

/// The four cleansed tables that feed the merge
#[derive(Debug, Clone)]
pub struct DatasetTables {
    pub forest_area_km: DataFrame,
    pub forest_area_percent: DataFrame,
    pub carbon_co2_emissions_by_country: DataFrame,
    pub emission_by_country: DataFrame,
}

impl DatasetTables {
    pub fn get(&self, kind: DatasetKind) -> &DataFrame {
        match kind {
            DatasetKind::ForestAreaKm => &self.forest_area_km,
            DatasetKind::ForestAreaPercent => &self.forest_area_percent,
            DatasetKind::CarbonCo2EmissionsByCountry => &self.carbon_co2_emissions_by_country,
            DatasetKind::EmissionByCountry => &self.emission_by_country,
        }
    }
}

/// Join key columns of `kind`
pub fn join_keys(kind: DatasetKind) -> &'static [&'static str] {
    match kind {
        DatasetKind::CarbonCo2EmissionsByCountry => &[COUNTRY_NAME, YEAR_COLUMN],
        _ => &[COUNTRY_NAME, COUNTRY_CODE, YEAR_COLUMN],
    }
}

/// Fails if `df` has a key column missing or any key occurring more than once
pub fn ensure_unique_keys(table: &str, df: &DataFrame, keys: &[&str]) -> Result<(), MergeError> {
    for key in keys {
        if !df.get_column_names().iter().any(|c| c.as_str() == *key) {
            return Err(MergeError::MissingKeyColumn {
                table: table.to_string(),
                column: key.to_string(),
            });
        }
    }

    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    let duplicates = df
        .clone()
        .lazy()
        .group_by(key_exprs)
        .agg([len().alias("__rows")])
        .filter(col("__rows").gt(lit(1)))
        .collect()?;

    if duplicates.height() == 0 {
        return Ok(());
    }

    let mut example = Vec::with_capacity(keys.len());
    for key in keys {
        example.push(format!("{}={}", key, duplicates.column(key)?.get(0)?));
    }

    Err(MergeError::DuplicateKeys {
        table: table.to_string(),
        keys: keys.iter().map(|k| k.to_string()).collect(),
        example: example.join(", "),
        groups: duplicates.height(),
    })
}

fn key_exprs(keys: &[&str]) -> Vec<Expr> {
    keys.iter().map(|k| col(*k)).collect()
}

fn with_int32_year(df: &DataFrame) -> LazyFrame {
    df.clone()
        .lazy()
        .with_columns([col(YEAR_COLUMN).cast(DataType::Int32)])
}

/// Joins the four cleansed tables and sorts by `(country_name, year)`
pub fn merge_tables(tables: &DatasetTables, mode: JoinMode) -> Result<DataFrame, MergeError> {
    for kind in DatasetKind::ALL {
        ensure_unique_keys(&kind.to_string(), tables.get(kind), join_keys(kind))?;
    }

    let args = || JoinArgs::new(mode.join_type());
    let full_key = key_exprs(join_keys(DatasetKind::ForestAreaKm));
    let carbon_key = key_exprs(join_keys(DatasetKind::CarbonCo2EmissionsByCountry));

    debug!("Merging tables with {:?} joins", mode);

    let merged = with_int32_year(&tables.forest_area_km)
        .join(
            with_int32_year(&tables.forest_area_percent),
            full_key.clone(),
            full_key.clone(),
            args(),
        )
        .join(
            with_int32_year(&tables.emission_by_country),
            full_key.clone(),
            full_key,
            args(),
        )
        .join(
            with_int32_year(&tables.carbon_co2_emissions_by_country),
            carbon_key.clone(),
            carbon_key,
            args(),
        )
        .sort(
            [COUNTRY_NAME, YEAR_COLUMN],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;

    let anchor_rows = tables.forest_area_km.height();
    if merged.height() < anchor_rows {
        info!(
            "Merge kept {} of {} forest rows ({} without a partner in every table)",
            merged.height(),
            anchor_rows,
            anchor_rows - merged.height()
        );
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest(value_name: &str, rows: &[(&str, &str, i32, f64)]) -> DataFrame {
        let names: Vec<&str> = rows.iter().map(|r| r.0).collect();
        let codes: Vec<&str> = rows.iter().map(|r| r.1).collect();
        let years: Vec<i32> = rows.iter().map(|r| r.2).collect();
        let values: Vec<f64> = rows.iter().map(|r| r.3).collect();
        DataFrame::new(vec![
            Column::new(COUNTRY_NAME.into(), names),
            Column::new(COUNTRY_CODE.into(), codes),
            Column::new(YEAR_COLUMN.into(), years),
            Column::new(value_name.into(), values),
        ])
        .unwrap()
    }

    fn tables() -> DatasetTables {
        DatasetTables {
            forest_area_km: forest(
                "forest_area_km",
                &[
                    ("Brazil", "BRA", 1991, 110.0),
                    ("Brazil", "BRA", 1990, 100.0),
                    ("Chad", "TCD", 1990, 5.0),
                ],
            ),
            forest_area_percent: forest(
                "forest_area_percent",
                &[
                    ("Brazil", "BRA", 1990, 60.0),
                    ("Brazil", "BRA", 1991, 59.0),
                    ("Chad", "TCD", 1990, 4.0),
                ],
            ),
            emission_by_country: df! {
                COUNTRY_NAME => ["Brazil", "Brazil", "Chad"],
                COUNTRY_CODE => ["BRA", "BRA", "TCD"],
                YEAR_COLUMN => [1990i32, 1991, 1990],
                "total_co2_emission" => [10.0, 11.0, 1.0],
            }
            .unwrap(),
            carbon_co2_emissions_by_country: df! {
                COUNTRY_NAME => ["Brazil", "Brazil"],
                "region" => ["Americas", "Americas"],
                YEAR_COLUMN => [1990i32, 1991],
                "kilotons_of_co2" => [200.0, 210.0],
            }
            .unwrap(),
        }
    }

    #[test]
    fn test_inner_merge_sorted_and_complete() {
        let merged = merge_tables(&tables(), JoinMode::Inner).unwrap();

        assert_eq!(merged.height(), 2);
        assert_eq!(merged.width(), 8);
        let years = merged.column(YEAR_COLUMN).unwrap().i32().unwrap();
        assert_eq!(years.get(0), Some(1990));
        assert_eq!(years.get(1), Some(1991));
        let km = merged.column("forest_area_km").unwrap().f64().unwrap();
        assert_eq!(km.get(0), Some(100.0));
        assert_eq!(km.get(1), Some(110.0));
        let kt = merged.column("kilotons_of_co2").unwrap().f64().unwrap();
        assert_eq!(kt.get(1), Some(210.0));
    }

    #[test]
    fn test_left_merge_keeps_unmatched_rows() {
        let merged = merge_tables(&tables(), JoinMode::Left).unwrap();

        assert_eq!(merged.height(), 3);
        let names = merged.column(COUNTRY_NAME).unwrap().str().unwrap();
        assert_eq!(names.get(2), Some("Chad"));
        assert_eq!(merged.column("kilotons_of_co2").unwrap().null_count(), 1);
    }

    #[test]
    fn test_duplicate_keys_fail_merge() {
        let mut tables = tables();
        tables.carbon_co2_emissions_by_country = df! {
            COUNTRY_NAME => ["Brazil", "Brazil"],
            "region" => ["Americas", "Americas"],
            YEAR_COLUMN => [1990i32, 1990],
            "kilotons_of_co2" => [200.0, 201.0],
        }
        .unwrap();

        let result = merge_tables(&tables, JoinMode::Inner);
        match result {
            Err(MergeError::DuplicateKeys {
                table,
                groups,
                example,
                ..
            }) => {
                assert_eq!(table, "carbon_co2_emissions_by_country");
                assert_eq!(groups, 1);
                assert!(example.contains("1990"));
            }
            other => panic!("expected duplicate keys, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_column() {
        let df = df! { COUNTRY_NAME => ["Brazil"] }.unwrap();
        let result = ensure_unique_keys("t", &df, &[COUNTRY_NAME, YEAR_COLUMN]);
        assert!(matches!(
            result,
            Err(MergeError::MissingKeyColumn { column, .. }) if column == YEAR_COLUMN
        ));
    }

    #[test]
    fn test_join_mode_serde() {
        let mode: JoinMode = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(mode, JoinMode::Left);
        assert_eq!(JoinMode::default(), JoinMode::Inner);
    }
}
