//! Result records and the delimited table export.
//!
//! One table per successful run: one row per time step, one column per
//! named series plus the leading `timeStamp` column, semicolon-separated
//! fields with a decimal comma, file name carrying the model identity and
//! a second-resolution timestamp.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Sentinel recorded when a solved value could not be obtained for one
/// (variable, time step) pair.
pub const MISSING_VALUE: f64 = -1.0;

/// One named, time-indexed series of solved values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub variable_name: String,
    pub values: Vec<f64>,
}

impl OptimizationResult {
    pub fn new(variable_name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            variable_name: variable_name.into(),
            values,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write result table: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed result table: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed numeric field '{0}'")]
    Number(String),
}

/// Second-resolution timestamp used in result and model file names.
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Writes the result table to `{dir}/{file_stem}_{timestamp}.csv` with
/// `rows` data rows. Series shorter than `rows` are padded with `0.0`,
/// longer ones truncated (the SOC vector carries a terminal entry past
/// the horizon).
pub fn write_result_table(
    dir: &Path,
    file_stem: &str,
    results: &[OptimizationResult],
    rows: usize,
) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{file_stem}_{}.csv", timestamp_now()));
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(&path)?;

    let header = std::iter::once("timeStamp".to_string())
        .chain(results.iter().map(|r| r.variable_name.clone()))
        .collect_vec();
    writer.write_record(&header)?;

    for time_step in 0..rows {
        let record = std::iter::once(format_field(time_step as f64))
            .chain(results.iter().map(|result| {
                format_field(result.values.get(time_step).copied().unwrap_or(0.0))
            }))
            .collect_vec();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!(path = %path.display(), series = results.len(), rows, "wrote result table");
    Ok(path)
}

/// Reads a table produced by [`write_result_table`] back into result
/// records (without the `timeStamp` column).
pub fn read_result_table(path: &Path) -> Result<Vec<OptimizationResult>, ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut results: Vec<OptimizationResult> = headers
        .iter()
        .skip(1)
        .map(|name| OptimizationResult::new(name, Vec::new()))
        .collect();
    for record in reader.records() {
        let record = record?;
        for (column, field) in record.iter().skip(1).enumerate() {
            results[column].values.push(parse_field(field)?);
        }
    }
    Ok(results)
}

/// Fixed decimal-separator convention of the export: comma, not point.
fn format_field(value: f64) -> String {
    format!("{value}").replace('.', ",")
}

fn parse_field(field: &str) -> Result<f64, ExportError> {
    field
        .replace(',', ".")
        .parse()
        .map_err(|_| ExportError::Number(field.to_string()))
}
