use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub run: RunConfig,
    pub paths: PathsConfig,
    pub prices: PricesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Optimization horizon in hours; the number of time steps is
    /// `round(horizon_hours / temporal_resolution)`.
    pub horizon_hours: f64,
    pub relative_mip_gap: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Parameter document for this run. When the file is absent the most
    /// recently modified file in `input_dir` is used instead.
    pub parameters: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricesConfig {
    /// Single-column CSV of hourly day-ahead prices. Falls back to a
    /// built-in curve when unset.
    pub file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("DM__").split("__"));
        Ok(figment.extract()?)
    }
}
