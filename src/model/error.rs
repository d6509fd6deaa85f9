use thiserror::Error;

use crate::params::ParameterError;
use crate::prices::PriceError;
use crate::results::ExportError;
use crate::solver::SolverError;

use super::registry::RegistryError;

/// Error taxonomy of one model build.
///
/// Only parameter-load failures and solver-API errors propagate to the
/// top-level run; resolution-local problems (bound lookups) and
/// harvest-local problems (missing values) are absorbed where they occur
/// with a logged diagnostic and a safe default.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Parameters(#[from] ParameterError),

    #[error(transparent)]
    Prices(#[from] PriceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A dependency endpoint references a resource that was never
    /// registered: its pattern must be dispatched before any dependency
    /// naming it is bound.
    #[error("unresolved endpoint '{resource}'/'{carrier}': {reason}")]
    UnresolvedEndpoint {
        resource: String,
        carrier: String,
        reason: String,
    },

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    ResultExport(#[from] ExportError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
