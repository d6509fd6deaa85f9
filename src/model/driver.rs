use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::params::{self, ResourceParameters, SystemParameters};
use crate::prices::{PriceSignal, PRICE_UNIT_CONVERSION};
use crate::results::{self, timestamp_now};
use crate::solver::{LinExpr, SolveStatus, SolverContext};

use super::binder::DependencyBinder;
use super::error::ModelError;
use super::harvest::harvest_results;
use super::key::{Direction, VariableKey};
use super::patterns;
use super::registry::VariableRegistry;

/// Terminal state of one run. An unsolvable model is an expected outcome,
/// not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Solved {
        objective: f64,
        results_file: PathBuf,
        solve_time: Duration,
    },
    NotSolved,
}

/// Orchestrates one model build and solve: parameter loading, resource
/// pattern dispatch, dependency binding, objective assembly, model
/// export, solve and result emission.
pub struct ModelDriver {
    run_id: Uuid,
    config: Config,
    params: SystemParameters,
    prices: PriceSignal,
}

impl ModelDriver {
    /// Loads and validates everything the run needs. A missing or empty
    /// parameter document is fatal for the run.
    pub fn from_config(config: Config) -> Result<Self, ModelError> {
        let params =
            params::load_with_fallback(&config.paths.parameters, &config.paths.input_dir)?;
        params.validate()?;
        let prices = match &config.prices.file {
            Some(path) => PriceSignal::from_csv(path)?,
            None => PriceSignal::default_day_ahead(),
        };
        Ok(Self::new(config, params, prices))
    }

    pub fn new(config: Config, params: SystemParameters, prices: PriceSignal) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            params,
            prices,
        }
    }

    /// Number of time steps for this run.
    pub fn array_length(&self) -> usize {
        (self.config.run.horizon_hours / self.params.temporal_resolution).round() as usize
    }

    /// Executes one run. The solver context is released on every exit
    /// path; release failures are logged, never propagated, since the
    /// run's outcome is already determined by then.
    pub fn run(&self) -> Result<RunOutcome, ModelError> {
        let array_length = self.array_length();
        if array_length == 0 {
            return Err(params::ParameterError::Invalid(format!(
                "horizon of {} h at a resolution of {} h yields no time steps",
                self.config.run.horizon_hours, self.params.temporal_resolution
            ))
            .into());
        }
        info!(
            run_id = %self.run_id,
            system = %self.params.name,
            array_length,
            time_step_hours = self.params.temporal_resolution,
            "assembling optimization model"
        );

        let mut ctx = SolverContext::new(self.config.run.relative_mip_gap);
        let outcome = self.build_and_solve(&mut ctx, array_length);
        if let Err(error) = ctx.close() {
            warn!(%error, "failed to release solver context");
        }
        outcome
    }

    fn build_and_solve(
        &self,
        ctx: &mut SolverContext,
        array_length: usize,
    ) -> Result<RunOutcome, ModelError> {
        let mut registry = VariableRegistry::new();

        self.create_boundary_variables(ctx, &mut registry, array_length)?;

        for resource in &self.params.resources {
            self.dispatch_resource(ctx, &mut registry, resource, array_length)?;
        }

        let binder = DependencyBinder::new(&self.params, array_length);
        binder.bind_all(ctx, &mut registry, &self.params.dependencies)?;

        self.assemble_objective(ctx, &registry, array_length)?;

        let model_name = format!("OptModel_{}", self.params.name);
        let model_path = self
            .config
            .paths
            .output_dir
            .join(format!("{model_name}_{}.lp", timestamp_now()));
        ctx.export_model(&model_path)?;
        info!(path = %model_path.display(), "exported model for audit");

        let started = Instant::now();
        match ctx.solve()? {
            SolveStatus::Optimal { objective } => {
                let solve_time = started.elapsed();
                info!(
                    objective,
                    solve_time_ms = solve_time.as_millis() as u64,
                    "model solved"
                );
                let harvested = harvest_results(ctx, &registry);
                let results_file = results::write_result_table(
                    &self.config.paths.output_dir,
                    &model_name,
                    &harvested,
                    array_length,
                )?;
                Ok(RunOutcome::Solved {
                    objective,
                    results_file,
                    solve_time,
                })
            }
            SolveStatus::NotSolved => {
                warn!("model not solved");
                Ok(RunOutcome::NotSolved)
            }
        }
    }

    /// Pre-creates the primary boundary Power ports, bounded by the
    /// declared system envelope where known.
    fn create_boundary_variables(
        &self,
        ctx: &mut SolverContext,
        registry: &mut VariableRegistry,
        array_length: usize,
    ) -> Result<(), ModelError> {
        let max_input = self
            .params
            .max_power_system_input
            .first()
            .copied()
            .unwrap_or(f64::INFINITY);
        let vars = ctx.num_var_array(array_length, 0.0, max_input)?;
        registry.put_vector(VariableKey::system(Direction::Input, None), vars)?;

        let max_output = self
            .params
            .max_power_system_output
            .first()
            .copied()
            .unwrap_or(f64::INFINITY);
        let vars = ctx.num_var_array(array_length, 0.0, max_output)?;
        registry.put_vector(VariableKey::system(Direction::Output, None), vars)?;
        Ok(())
    }

    /// Behavior pattern selection by flag combination: conversion
    /// resources get the piecewise input/output relationship, storage and
    /// secondary resources the energy balance; the state patterns are
    /// additive for any resource declaring discrete states.
    fn dispatch_resource(
        &self,
        ctx: &mut SolverContext,
        registry: &mut VariableRegistry,
        resource: &ResourceParameters,
        array_length: usize,
    ) -> Result<(), ModelError> {
        let dt = self.params.temporal_resolution;
        if resource.uses_storage_pattern() {
            patterns::energy_balance_storage(ctx, registry, resource, array_length, dt)?;
        } else {
            patterns::input_output_relationship(ctx, registry, resource, array_length)?;
        }
        if !resource.system_states.is_empty() {
            patterns::system_state_selection_by_power_limits(
                ctx,
                registry,
                resource,
                array_length,
            )?;
            patterns::state_sequences_and_holding_duration(
                ctx,
                registry,
                resource,
                array_length,
            )?;
            patterns::ramp_limits(ctx, registry, resource, Direction::Input, array_length, dt)?;
        }
        Ok(())
    }

    /// Linear objective over the primary system output port:
    /// `Σ_t dt · 0.001 · price[t] · sysout[t]`, sense per system variant.
    fn assemble_objective(
        &self,
        ctx: &mut SolverContext,
        registry: &VariableRegistry,
        array_length: usize,
    ) -> Result<(), ModelError> {
        let system_output = registry.vector(&VariableKey::system(Direction::Output, None))?;
        let dt = self.params.temporal_resolution;
        let prices = self.prices.resampled(dt, array_length);
        let mut objective = LinExpr::new();
        for (t, var) in system_output.iter().enumerate() {
            objective.add(*var, dt * PRICE_UNIT_CONVERSION * prices[t]);
        }
        ctx.set_objective(objective, self.params.objective_sense)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathsConfig, PricesConfig, RunConfig};
    use crate::model::key::QuantityKind;
    use crate::params::{Dependency, DependencyKind, EndpointRef, PiecewiseSegment};
    use crate::solver::ObjectiveSense;

    fn config(dir: &std::path::Path) -> Config {
        Config {
            run: RunConfig {
                horizon_hours: 10.0,
                relative_mip_gap: 0.001,
            },
            paths: PathsConfig {
                parameters: dir.join("systemParameters.json"),
                input_dir: dir.to_path_buf(),
                output_dir: dir.join("output"),
            },
            prices: PricesConfig { file: None },
        }
    }

    fn two_unit_params() -> SystemParameters {
        SystemParameters {
            name: "two_unit".into(),
            temporal_resolution: 2.5,
            inputs_system: vec!["gas".into()],
            outputs_system: vec!["electricity".into()],
            min_power_system_input: vec![0.0],
            max_power_system_input: vec![500.0],
            min_power_system_output: vec![0.0],
            max_power_system_output: vec![100.0],
            objective_sense: ObjectiveSense::Maximize,
            resources: vec![
                ResourceParameters {
                    name: "A".into(),
                    energy_carrier_inputs: vec!["gas".into()],
                    energy_carrier_output: "electricity".into(),
                    max_power_input: 200.0,
                    max_power_output: 80.0,
                    efficiency_segments: vec![PiecewiseSegment {
                        slope: 0.4,
                        intercept: 0.0,
                        min_input: 0.0,
                        max_input: 200.0,
                    }],
                    ..Default::default()
                },
                ResourceParameters {
                    name: "B".into(),
                    energy_carrier_inputs: vec!["gas".into()],
                    energy_carrier_output: "electricity".into(),
                    max_power_input: 150.0,
                    max_power_output: 60.0,
                    ..Default::default()
                },
            ],
            dependencies: vec![Dependency {
                relevant_inputs: vec![EndpointRef::new("SystemOutput", "electricity")],
                relevant_outputs: vec![EndpointRef::new("A", "electricity")],
                kind: DependencyKind::Correlative,
            }],
        }
    }

    #[test]
    fn array_length_rounds_horizon_over_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ModelDriver::new(
            config(dir.path()),
            two_unit_params(),
            PriceSignal::default_day_ahead(),
        );
        assert_eq!(driver.array_length(), 4);
    }

    #[test]
    fn assembly_registers_expected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let driver = ModelDriver::new(
            config(dir.path()),
            two_unit_params(),
            PriceSignal::default_day_ahead(),
        );
        let mut ctx = SolverContext::new(0.001);
        let mut registry = VariableRegistry::new();
        driver
            .create_boundary_variables(&mut ctx, &mut registry, 4)
            .unwrap();
        for resource in &driver.params.resources {
            driver
                .dispatch_resource(&mut ctx, &mut registry, resource, 4)
                .unwrap();
        }
        let binder = DependencyBinder::new(&driver.params, 4);
        binder
            .bind_all(&mut ctx, &mut registry, &driver.params.dependencies)
            .unwrap();

        for key in [
            VariableKey::system(Direction::Output, None),
            VariableKey::system(Direction::Input, None),
            VariableKey::indexed("A", Direction::Input, 0, QuantityKind::Power),
            VariableKey::single("A", Direction::Output, QuantityKind::Power),
            VariableKey::single("B", Direction::Output, QuantityKind::Power),
        ] {
            assert!(registry.contains(&key), "missing {key}");
        }
    }

    #[test]
    fn zero_time_steps_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.run.horizon_hours = 0.0;
        let driver = ModelDriver::new(cfg, two_unit_params(), PriceSignal::default_day_ahead());
        assert!(matches!(
            driver.run(),
            Err(ModelError::Parameters(params::ParameterError::Invalid(_)))
        ));
    }
}
