//! Dispatch Modeler
//!
//! Assembles a time-indexed mixed-integer linear optimization model from a
//! declarative description of an energy system (generators, storage,
//! conversion units and the dependencies between their ports), solves it
//! through an LP/MILP backend and exports the resulting dispatch schedule
//! as a flat time-series table.
//!
//! The interesting part is not the numeric solve (delegated to the backend
//! behind [`solver::SolverContext`]) but the model-assembly layer in
//! [`model`]: a registry of decision-variable arrays under canonical keys,
//! a resolver that maps symbolic endpoint references (including the
//! system-boundary sentinels) onto concrete arrays, a binder that wires
//! dependencies through the matching coupling pattern, and a harvester
//! that turns solved values back into named time series.

pub mod config;
pub mod model;
pub mod params;
pub mod prices;
pub mod results;
pub mod solver;
pub mod telemetry;
