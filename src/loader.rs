//! # Raw Loader
//!
//! Reads delimited text files from the raw tier into DataFrames. The first
//! line is the header; column types are inferred from the whole file.

use crate::mount::Mount;
use crate::storage::StorageError;
use log::debug;
use polars::prelude::*;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read raw file {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("cannot parse raw file {key}: {source}")]
    Parse {
        key: String,
        #[source]
        source: PolarsError,
    },
}

/// Parses CSV bytes with a header row, inferring types over every row
pub fn parse_csv(bytes: Vec<u8>) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
}

/// Loads the CSV at `key` under the raw tier
pub async fn load_csv(raw: &Mount, key: &str) -> Result<DataFrame, LoadError> {
    let bytes = raw.read(key).await.map_err(|source| LoadError::Storage {
        key: key.to_string(),
        source,
    })?;

    let df = parse_csv(bytes).map_err(|source| LoadError::Parse {
        key: key.to_string(),
        source,
    })?;

    debug!("Loaded {} with shape {:?}", key, df.shape());
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::Tier;
    use tempfile::TempDir;

    #[test]
    fn test_parse_csv_infers_types() {
        let csv = "Country Name,Country Code,1990,1991\nBrazil,BRA,100,110.5\nChad,TCD,,3\n";
        let df = parse_csv(csv.as_bytes().to_vec()).unwrap();

        assert_eq!(df.shape(), (2, 4));
        assert_eq!(df.column("Country Name").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("1991").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("1990").unwrap().null_count(), 1);
    }

    #[test]
    fn test_parse_csv_header_only() {
        let df = parse_csv(b"a,b\n".to_vec()).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_file() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let raw = Mount::attach(Tier::Raw, &temp_dir.path().to_string_lossy()).await?;

        let result = load_csv(&raw, "emission/missing.csv").await;
        assert!(matches!(result, Err(LoadError::Storage { .. })));

        Ok(())
    }
}
