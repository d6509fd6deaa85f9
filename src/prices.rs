//! The external price signal driving the objective.
//!
//! Day-ahead prices arrive at hourly resolution (one column, one value per
//! hour, EUR/MWh) and are resampled to the model's temporal resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// EUR/MWh to EUR/kWh, applied once in the objective.
pub const PRICE_UNIT_CONVERSION: f64 = 0.001;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("failed to read price file {path}: {source}")]
    Io {
        path: PathBuf,
        source: csv::Error,
    },
    #[error("malformed price value '{0}'")]
    Number(String),
    #[error("price file {0} contains no values")]
    EmptyFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSignal {
    hourly: Vec<f64>,
}

impl PriceSignal {
    pub fn new(hourly: Vec<f64>) -> Self {
        Self { hourly }
    }

    /// A typical day-ahead curve: cheap at night, morning and evening
    /// peaks. Used when no price file is configured.
    pub fn default_day_ahead() -> Self {
        Self::new(vec![
            42.3, 39.8, 38.1, 37.4, 38.0, 41.2, 48.7, 55.3, 61.8, 58.4, 52.9, 49.5, 47.2, 46.1,
            47.8, 51.3, 57.6, 64.2, 68.9, 63.5, 56.7, 50.2, 45.8, 43.1,
        ])
    }

    /// Loads a single-column CSV of hourly prices, no header row.
    pub fn from_csv(path: &Path) -> Result<Self, PriceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|source| PriceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut hourly = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| PriceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let field = record.get(0).unwrap_or_default().trim();
            if field.is_empty() {
                continue;
            }
            hourly.push(
                field
                    .parse()
                    .map_err(|_| PriceError::Number(field.to_string()))?,
            );
        }
        if hourly.is_empty() {
            return Err(PriceError::EmptyFile(path.to_path_buf()));
        }
        info!(path = %path.display(), hours = hourly.len(), "loaded price signal");
        Ok(Self::new(hourly))
    }

    pub fn hours(&self) -> usize {
        self.hourly.len()
    }

    /// Price per time step at the given resolution. Sub-hour steps repeat
    /// the hourly value; the curve wraps when the horizon outruns it.
    pub fn resampled(&self, resolution_hours: f64, steps: usize) -> Vec<f64> {
        (0..steps)
            .map(|step| {
                let hour = (step as f64 * resolution_hours).floor() as usize;
                self.hourly[hour % self.hourly.len()]
            })
            .collect()
    }
}
