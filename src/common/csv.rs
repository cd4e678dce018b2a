//! CSV reading and writing operations.
//!
//! All tabular IO goes through Polars. Inputs may carry a UTF-8 BOM (common
//! in exports from Chinese GIS tooling); it is stripped before parsing.
//! Artifact writes are atomic.

use std::{fs, io::Cursor, path::Path};

use anyhow::{Context, Result};
use polars::{
    frame::DataFrame,
    io::{SerReader, SerWriter},
    prelude::{CsvReader, CsvWriter, DataType},
};

use super::fs::atomic_write;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Reads a CSV file from `path` into a Polars DataFrame, tolerating a BOM.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let bytes = fs::read(path)
        .with_context(|| format!("[common::csv] Failed to open CSV file: {}", path.display()))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
    CsvReader::new(Cursor::new(body))
        .finish()
        .with_context(|| format!("[common::csv] Failed to read CSV from {}", path.display()))
}

/// Write a DataFrame to CSV bytes.
pub fn write_csv_bytes(df: &DataFrame) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    CsvWriter::new(&mut out)
        .finish(&mut df.clone())
        .context("[common::csv] Failed to write CSV to bytes")?;
    Ok(out)
}

/// Atomically write a DataFrame to a CSV artifact.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let bytes = write_csv_bytes(df)?;
    atomic_write(path, &bytes)
        .with_context(|| format!("[common::csv] Failed to write CSV to {}", path.display()))
}

/// Atomically write a DataFrame to a BOM-prefixed UTF-8 CSV (final tables).
pub fn write_csv_bom(df: &DataFrame, path: &Path) -> Result<()> {
    let mut bytes = UTF8_BOM.to_vec();
    bytes.extend(write_csv_bytes(df)?);
    atomic_write(path, &bytes)
        .with_context(|| format!("[common::csv] Failed to write CSV to {}", path.display()))
}

/// Extract a column as `f64`, casting if needed. Nulls survive as `None`.
pub fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let col = df
        .column(name)
        .with_context(|| format!("[common::csv] Missing column: {name}"))?
        .cast(&DataType::Float64)
        .with_context(|| format!("[common::csv] Column {name} is not numeric"))?;
    Ok(col.f64()?.into_iter().collect())
}

/// Extract a column as `u32` with no nulls allowed (ids and counts).
pub fn u32_column(df: &DataFrame, name: &str) -> Result<Vec<u32>> {
    let col = df
        .column(name)
        .with_context(|| format!("[common::csv] Missing column: {name}"))?
        .cast(&DataType::UInt32)
        .with_context(|| format!("[common::csv] Column {name} is not an unsigned integer"))?;
    let values: Vec<u32> = col.u32()?.into_no_null_iter().collect();
    anyhow::ensure!(
        values.len() == df.height(),
        "[common::csv] Column {name} contains nulls"
    );
    Ok(values)
}

/// Extract a column as strings. Nulls survive as `None`.
pub fn str_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = df
        .column(name)
        .with_context(|| format!("[common::csv] Missing column: {name}"))?
        .cast(&DataType::String)
        .with_context(|| format!("[common::csv] Column {name} cannot be read as text"))?;
    Ok(col.str()?.into_iter().map(|opt| opt.map(|s| s.to_string())).collect())
}
