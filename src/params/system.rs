use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::solver::ObjectiveSense;

use super::{Dependency, ResourceParameters};

/// Global description of the modeled energy system: temporal resolution,
/// boundary carriers with their power envelopes, resources and the
/// dependencies wiring them together. Created once per run from validated
/// input, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemParameters {
    pub name: String,
    /// Length of one time step in hours; strictly positive.
    #[serde(alias = "temporalResolutionOptimizationModel")]
    pub temporal_resolution: f64,
    /// System-level carrier labels, one per boundary port. The bound
    /// vectors below are parallel arrays: one entry per carrier.
    #[serde(default)]
    pub inputs_system: Vec<String>,
    #[serde(default)]
    pub outputs_system: Vec<String>,
    #[serde(default)]
    pub min_power_system_input: Vec<f64>,
    #[serde(default)]
    pub max_power_system_input: Vec<f64>,
    #[serde(default)]
    pub min_power_system_output: Vec<f64>,
    #[serde(default)]
    pub max_power_system_output: Vec<f64>,
    /// Whether the run minimizes cost or maximizes revenue; a static
    /// property of the modeled system variant.
    #[serde(default)]
    pub objective_sense: ObjectiveSense,
    #[serde(alias = "resourceParameters")]
    pub resources: Vec<ResourceParameters>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("failed to read parameter file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse parameter file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("SystemParameters empty")]
    Empty,
    #[error("no parameter file found in {0}")]
    NoParameterFile(PathBuf),
    #[error("invalid system parameters: {0}")]
    Invalid(String),
}

impl SystemParameters {
    /// Looks up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&ResourceParameters> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Cross-field consistency checks on the loaded document. Bound arrays
    /// shorter than their carrier list are tolerated at load time (the
    /// resolver falls back per carrier), longer ones are not.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.resources.is_empty() {
            return Err(ParameterError::Empty);
        }
        if !(self.temporal_resolution > 0.0) {
            return Err(ParameterError::Invalid(format!(
                "temporal resolution must be positive, got {}",
                self.temporal_resolution
            )));
        }
        if self.min_power_system_input.len() > self.inputs_system.len()
            || self.max_power_system_input.len() > self.inputs_system.len()
        {
            return Err(ParameterError::Invalid(
                "system input bounds exceed the input carrier list".into(),
            ));
        }
        if self.min_power_system_output.len() > self.outputs_system.len()
            || self.max_power_system_output.len() > self.outputs_system.len()
        {
            return Err(ParameterError::Invalid(
                "system output bounds exceed the output carrier list".into(),
            ));
        }
        for res in &self.resources {
            if res.name.is_empty() {
                return Err(ParameterError::Invalid("resource without a name".into()));
            }
            if self.resources.iter().filter(|r| r.name == res.name).count() > 1 {
                return Err(ParameterError::Invalid(format!(
                    "duplicate resource name '{}'",
                    res.name
                )));
            }
            if let Some(storage) = &res.storage {
                if storage.charge_efficiency <= 0.0 || storage.discharge_efficiency <= 0.0 {
                    return Err(ParameterError::Invalid(format!(
                        "resource '{}' has non-positive storage efficiency",
                        res.name
                    )));
                }
            }
            for state in &res.system_states {
                if let Some(successors) = &state.allowed_successors {
                    if successors.iter().any(|&s| s >= res.system_states.len()) {
                        return Err(ParameterError::Invalid(format!(
                            "state '{}' of resource '{}' allows an out-of-range successor",
                            state.name, res.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Loads the parameter document from a JSON file.
pub fn load_from_file(path: &Path) -> Result<SystemParameters, ParameterError> {
    let raw = fs::read_to_string(path).map_err(|source| ParameterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let params: SystemParameters =
        serde_json::from_str(&raw).map_err(|source| ParameterError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), system = %params.name, "loaded system parameters");
    Ok(params)
}

/// Loads the configured parameter file; when it does not exist, falls back
/// to the most recently modified file in the input directory.
pub fn load_with_fallback(
    path: &Path,
    input_dir: &Path,
) -> Result<SystemParameters, ParameterError> {
    if path.is_file() {
        return load_from_file(path);
    }
    warn!(
        path = %path.display(),
        dir = %input_dir.display(),
        "parameter file missing, falling back to most recent file in input directory"
    );
    let fallback = most_recent_file(input_dir)?;
    load_from_file(&fallback)
}

fn most_recent_file(dir: &Path) -> Result<PathBuf, ParameterError> {
    let entries = fs::read_dir(dir).map_err(|source| ParameterError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    newest
        .map(|(_, path)| path)
        .ok_or_else(|| ParameterError::NoParameterFile(dir.to_path_buf()))
}
