//! # Table Output Module
//!
//! Tables in the structured and curated tiers are stored as a single Parquet
//! part file under a directory named after the table:
//! `{tier root}/{table}/part-00000.parquet`. Writing a table replaces its
//! previous contents.

use crate::mount::Mount;
use crate::storage::StorageError;
use log::debug;
use polars::prelude::*;
use std::io::Cursor;
use thiserror::Error;

/// File name of the single part of a table
pub const PART_FILE: &str = "part-00000.parquet";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("cannot encode table {table}: {source}")]
    Encode {
        table: String,
        #[source]
        source: PolarsError,
    },

    #[error("cannot decode table {table}: {source}")]
    Decode {
        table: String,
        #[source]
        source: PolarsError,
    },

    #[error("storage error on table {table}: {source}")]
    Storage {
        table: String,
        #[source]
        source: StorageError,
    },
}

/// Key of the part file of `table`, relative to a tier root
pub fn table_key(table: &str) -> String {
    format!("{}/{}", table, PART_FILE)
}

pub fn encode_parquet(df: &mut DataFrame) -> PolarsResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ParquetWriter::new(&mut buffer).finish(df)?;
    Ok(buffer)
}

pub fn decode_parquet(bytes: Vec<u8>) -> PolarsResult<DataFrame> {
    ParquetReader::new(Cursor::new(bytes)).finish()
}

/// Writes `df` as `table` in `mount`, replacing any previous contents.
///
/// Returns the full path of the written part file.
pub async fn write_table(
    mount: &Mount,
    table: &str,
    df: &mut DataFrame,
) -> Result<String, OutputError> {
    let key = table_key(table);
    let path = mount.path(&key);
    debug!("Writing table {} to {}", table, path);

    debug!("DataFrame shape: {:?}", df.shape());
    debug!("DataFrame schema:\n{:?}", df.schema());
    debug!("First few rows:\n{}", df.head(Some(5)));

    let bytes = encode_parquet(df).map_err(|source| OutputError::Encode {
        table: table.to_string(),
        source,
    })?;

    mount
        .write(&key, &bytes)
        .await
        .map_err(|source| OutputError::Storage {
            table: table.to_string(),
            source,
        })?;

    debug!("Successfully wrote table {} ({} bytes)", table, bytes.len());
    Ok(path)
}

/// Reads `table` back from `mount`
pub async fn read_table(mount: &Mount, table: &str) -> Result<DataFrame, OutputError> {
    let bytes = mount
        .read(&table_key(table))
        .await
        .map_err(|source| OutputError::Storage {
            table: table.to_string(),
            source,
        })?;

    decode_parquet(bytes).map_err(|source| OutputError::Decode {
        table: table.to_string(),
        source,
    })
}
