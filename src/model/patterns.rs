//! Constraint pattern library.
//!
//! Each pattern creates and registers the decision variables a resource
//! needs and adds the constraints expressing its physics against the
//! [`SolverContext`]. The two dependency patterns at the bottom only wire
//! already-resolved arrays together; the binder guarantees variable
//! identity and ordering, the pattern owns the constraint math.

use tracing::debug;

use crate::params::{DependencyKind, ResourceParameters};
use crate::solver::{LinExpr, Relation, SolverContext, VarId};

use super::error::ModelError;
use super::key::{Direction, QuantityKind, VariableKey};
use super::registry::VariableRegistry;

/// Big-M constant for selector couplings.
const NOLIMIT: f64 = 9999.0;

/// Piecewise input/output relationship for conversion resources.
///
/// Registers one input array per carrier and the single output array.
/// With zero or one regression segments the coupling is a plain linear
/// relation; with several, segment power and segment selection matrices
/// enforce exactly one active segment per time step.
pub fn input_output_relationship(
    ctx: &mut SolverContext,
    registry: &mut VariableRegistry,
    resource: &ResourceParameters,
    array_length: usize,
) -> Result<(), ModelError> {
    debug!(resource = %resource.name, "applying input/output relationship");
    for (index, _carrier) in resource.energy_carrier_inputs.iter().enumerate() {
        let vars = ctx.num_var_array(
            array_length,
            resource.min_power_input,
            resource.max_power_input,
        )?;
        registry.put_vector(
            VariableKey::indexed(&resource.name, Direction::Input, index, QuantityKind::Power),
            vars,
        )?;
    }
    let output = ctx.num_var_array(
        array_length,
        resource.min_power_output,
        resource.max_power_output,
    )?;
    registry.put_vector(
        VariableKey::single(&resource.name, Direction::Output, QuantityKind::Power),
        output.clone(),
    )?;

    let inputs = input_power_arrays(registry, resource)?;

    match resource.efficiency_segments.len() {
        0 => {
            // No regression available: output mirrors the summed input.
            for t in 0..array_length {
                let mut input_sum = LinExpr::new();
                for array in &inputs {
                    input_sum.add(array[t], 1.0);
                }
                ctx.add_constraint(LinExpr::term(output[t], 1.0), Relation::Eq, input_sum)?;
            }
        }
        1 => {
            let segment = resource.efficiency_segments[0];
            for t in 0..array_length {
                let mut rhs = LinExpr::constant(segment.intercept);
                for array in &inputs {
                    rhs.add(array[t], segment.slope);
                }
                ctx.add_constraint(LinExpr::term(output[t], 1.0), Relation::Eq, rhs)?;
            }
        }
        segments => {
            let mut segment_power: Vec<Vec<VarId>> = Vec::with_capacity(segments);
            let mut segment_active: Vec<Vec<VarId>> = Vec::with_capacity(segments);
            for _ in 0..segments {
                segment_power.push(ctx.num_var_array(
                    array_length,
                    0.0,
                    resource.max_power_input,
                )?);
                segment_active.push(ctx.bool_var_array(array_length)?);
            }
            registry.put_matrix(
                VariableKey::single(&resource.name, Direction::Input, QuantityKind::Segment),
                segment_power.clone(),
            )?;
            registry.put_matrix(
                VariableKey::single(&resource.name, Direction::Input, QuantityKind::Binary),
                segment_active.clone(),
            )?;

            for t in 0..array_length {
                // Exactly one active segment carrying the whole input.
                let mut active_sum = LinExpr::new();
                let mut power_sum = LinExpr::new();
                let mut output_rhs = LinExpr::new();
                for s in 0..segments {
                    let seg = resource.efficiency_segments[s];
                    active_sum.add(segment_active[s][t], 1.0);
                    power_sum.add(segment_power[s][t], 1.0);
                    output_rhs.add(segment_power[s][t], seg.slope);
                    output_rhs.add(segment_active[s][t], seg.intercept);
                    // Segment power confined to its validity range while
                    // active, forced to zero otherwise.
                    ctx.add_constraint(
                        LinExpr::term(segment_power[s][t], 1.0),
                        Relation::Geq,
                        LinExpr::term(segment_active[s][t], seg.min_input),
                    )?;
                    ctx.add_constraint(
                        LinExpr::term(segment_power[s][t], 1.0),
                        Relation::Leq,
                        LinExpr::term(segment_active[s][t], seg.max_input),
                    )?;
                }
                ctx.add_constraint(active_sum, Relation::Eq, LinExpr::constant(1.0))?;
                let mut input_sum = LinExpr::new();
                for array in &inputs {
                    input_sum.add(array[t], 1.0);
                }
                ctx.add_constraint(input_sum, Relation::Eq, power_sum)?;
                ctx.add_constraint(LinExpr::term(output[t], 1.0), Relation::Eq, output_rhs)?;
            }
        }
    }
    Ok(())
}

/// Energy balance for storage (and secondary) resources.
///
/// Registers one combined charge port, the discharge port and a state of
/// charge vector of length `array_length + 1`.
pub fn energy_balance_storage(
    ctx: &mut SolverContext,
    registry: &mut VariableRegistry,
    resource: &ResourceParameters,
    array_length: usize,
    time_step_hours: f64,
) -> Result<(), ModelError> {
    debug!(resource = %resource.name, "applying storage energy balance");
    let storage = resource.storage.unwrap_or_default();

    let charge = ctx.num_var_array(array_length, 0.0, resource.max_power_input)?;
    registry.put_vector(
        VariableKey::single(&resource.name, Direction::Input, QuantityKind::Power),
        charge.clone(),
    )?;
    let discharge = ctx.num_var_array(array_length, 0.0, resource.max_power_output)?;
    registry.put_vector(
        VariableKey::single(&resource.name, Direction::Output, QuantityKind::Power),
        discharge.clone(),
    )?;
    let soc = ctx.num_var_array(array_length + 1, storage.soc_min, storage.soc_max)?;
    registry.put_vector(
        VariableKey::single(&resource.name, Direction::Output, QuantityKind::Soc),
        soc.clone(),
    )?;

    ctx.add_constraint(
        LinExpr::term(soc[0], 1.0),
        Relation::Eq,
        LinExpr::constant(storage.initial_soc),
    )?;
    for t in 0..array_length {
        // soc[t+1] = soc[t] + dt * (eta_c * charge - discharge / eta_d)
        let rhs = LinExpr::term(soc[t], 1.0)
            .with(charge[t], time_step_hours * storage.charge_efficiency)
            .with(discharge[t], -time_step_hours / storage.discharge_efficiency);
        ctx.add_constraint(LinExpr::term(soc[t + 1], 1.0), Relation::Eq, rhs)?;
    }
    Ok(())
}

/// Discrete operating-state selection by power limits.
///
/// Registers a `[time_step][state]` binary matrix, enforces exactly one
/// active state per step and confines the summed input power to the
/// active state's envelope.
pub fn system_state_selection_by_power_limits(
    ctx: &mut SolverContext,
    registry: &mut VariableRegistry,
    resource: &ResourceParameters,
    array_length: usize,
) -> Result<(), ModelError> {
    debug!(resource = %resource.name, "applying state selection");
    let state_count = resource.system_states.len();
    let mut rows = Vec::with_capacity(array_length);
    for _ in 0..array_length {
        rows.push(ctx.bool_var_array(state_count)?);
    }
    registry.put_matrix(
        VariableKey::single(&resource.name, Direction::Input, QuantityKind::State),
        rows.clone(),
    )?;

    let inputs = input_power_arrays(registry, resource)?;
    for t in 0..array_length {
        let mut selected = LinExpr::new();
        let mut lower_envelope = LinExpr::new();
        let mut upper_envelope = LinExpr::new();
        for (s, state) in resource.system_states.iter().enumerate() {
            selected.add(rows[t][s], 1.0);
            lower_envelope.add(rows[t][s], state.min_power);
            upper_envelope.add(rows[t][s], state.max_power);
        }
        ctx.add_constraint(selected, Relation::Eq, LinExpr::constant(1.0))?;
        let mut input_sum = LinExpr::new();
        for array in &inputs {
            input_sum.add(array[t], 1.0);
        }
        ctx.add_constraint(input_sum.clone(), Relation::Geq, lower_envelope)?;
        ctx.add_constraint(input_sum, Relation::Leq, upper_envelope)?;
    }
    Ok(())
}

/// State sequencing and minimum holding duration.
///
/// Forbids transitions outside a state's successor list and forces a
/// state to persist for its holding duration after being entered.
pub fn state_sequences_and_holding_duration(
    ctx: &mut SolverContext,
    registry: &mut VariableRegistry,
    resource: &ResourceParameters,
    array_length: usize,
) -> Result<(), ModelError> {
    debug!(resource = %resource.name, "applying state sequencing");
    let key = VariableKey::single(&resource.name, Direction::Input, QuantityKind::State);
    let rows = registry.matrix(&key)?.rows.clone();

    for (s, state) in resource.system_states.iter().enumerate() {
        if let Some(successors) = &state.allowed_successors {
            for s2 in 0..resource.system_states.len() {
                if s2 == s || successors.contains(&s2) {
                    continue;
                }
                for t in 0..array_length.saturating_sub(1) {
                    // state[t][s] + state[t+1][s2] <= 1
                    ctx.add_constraint(
                        LinExpr::term(rows[t][s], 1.0).with(rows[t + 1][s2], 1.0),
                        Relation::Leq,
                        LinExpr::constant(1.0),
                    )?;
                }
            }
        }
        if state.holding_steps >= 2 {
            for t in 1..array_length {
                let hold_until = (t + state.holding_steps).min(array_length);
                for k in (t + 1)..hold_until {
                    // Entering s at t (state[t][s] - state[t-1][s] == 1)
                    // keeps it active through the holding window.
                    ctx.add_constraint(
                        LinExpr::term(rows[t][s], 1.0).with(rows[t - 1][s], -1.0),
                        Relation::Leq,
                        LinExpr::term(rows[k][s], 1.0),
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// Symmetric ramp limit on a resource's port power between consecutive
/// time steps. A no-op for resources without a declared ramp slope.
pub fn ramp_limits(
    ctx: &mut SolverContext,
    registry: &mut VariableRegistry,
    resource: &ResourceParameters,
    direction: Direction,
    array_length: usize,
    time_step_hours: f64,
) -> Result<(), ModelError> {
    let Some(ramp_per_hour) = resource.ramp_per_hour else {
        debug!(resource = %resource.name, "no ramp slope declared, skipping ramp limits");
        return Ok(());
    };
    let limit = ramp_per_hour * time_step_hours;
    let arrays = match direction {
        Direction::Input => input_power_arrays(registry, resource)?,
        Direction::Output => vec![registry
            .vector(&VariableKey::single(
                &resource.name,
                Direction::Output,
                QuantityKind::Power,
            ))?
            .clone()],
    };
    for array in &arrays {
        for t in 1..array_length.min(array.len()) {
            let delta = LinExpr::term(array[t], 1.0).with(array[t - 1], -1.0);
            ctx.add_constraint(delta.clone(), Relation::Leq, LinExpr::constant(limit))?;
            ctx.add_constraint(delta, Relation::Geq, LinExpr::constant(-limit))?;
        }
    }
    Ok(())
}

/// Equality coupling: at every time step the summed outputs equal the
/// summed inputs.
pub fn correlative_dependency(
    ctx: &mut SolverContext,
    outputs: &[Vec<VarId>],
    inputs: &[Vec<VarId>],
) -> Result<(), ModelError> {
    let steps = coupled_steps(outputs, inputs);
    for t in 0..steps {
        let mut output_sum = LinExpr::new();
        for array in outputs {
            output_sum.add(array[t], 1.0);
        }
        let mut input_sum = LinExpr::new();
        for array in inputs {
            input_sum.add(array[t], 1.0);
        }
        ctx.add_constraint(output_sum, Relation::Eq, input_sum)?;
    }
    Ok(())
}

/// Mode-selectable coupling: per time step exactly one input option is
/// active and the summed outputs track it; the big-M relaxation frees the
/// inactive options. Returns the selector binaries, which are owned by
/// the pattern and intentionally not registered.
pub fn restrictive_dependency(
    ctx: &mut SolverContext,
    outputs: &[Vec<VarId>],
    inputs: &[Vec<VarId>],
) -> Result<Vec<Vec<VarId>>, ModelError> {
    let steps = coupled_steps(outputs, inputs);
    let mut selectors = Vec::with_capacity(inputs.len());
    for _ in 0..inputs.len() {
        selectors.push(ctx.bool_var_array(steps)?);
    }
    for t in 0..steps {
        let mut selected = LinExpr::new();
        for selector in &selectors {
            selected.add(selector[t], 1.0);
        }
        ctx.add_constraint(selected, Relation::Eq, LinExpr::constant(1.0))?;

        for (option, array) in inputs.iter().enumerate() {
            let mut deviation = LinExpr::new();
            for output in outputs {
                deviation.add(output[t], 1.0);
            }
            deviation.add(array[t], -1.0);
            // |outputs - input_option| <= NOLIMIT * (1 - selector)
            ctx.add_constraint(
                deviation.clone().with(selectors[option][t], NOLIMIT),
                Relation::Leq,
                LinExpr::constant(NOLIMIT),
            )?;
            ctx.add_constraint(
                deviation.with(selectors[option][t], -NOLIMIT),
                Relation::Geq,
                LinExpr::constant(-NOLIMIT),
            )?;
        }
    }
    Ok(selectors)
}

/// Selects the coupling pattern for a dependency kind; exists so the
/// binder's dispatch stays a one-line exhaustive match.
pub fn apply_dependency(
    ctx: &mut SolverContext,
    kind: DependencyKind,
    outputs: &[Vec<VarId>],
    inputs: &[Vec<VarId>],
) -> Result<(), ModelError> {
    match kind {
        DependencyKind::Correlative => correlative_dependency(ctx, outputs, inputs),
        DependencyKind::Restrictive => restrictive_dependency(ctx, outputs, inputs).map(|_| ()),
    }
}

/// The input power arrays of a resource, in port order. Storage-pattern
/// resources expose one combined port.
fn input_power_arrays(
    registry: &VariableRegistry,
    resource: &ResourceParameters,
) -> Result<Vec<Vec<VarId>>, ModelError> {
    if resource.uses_storage_pattern() || resource.energy_carrier_inputs.is_empty() {
        return Ok(vec![registry
            .vector(&VariableKey::single(
                &resource.name,
                Direction::Input,
                QuantityKind::Power,
            ))?
            .clone()]);
    }
    (0..resource.energy_carrier_inputs.len())
        .map(|index| {
            registry
                .vector(&VariableKey::indexed(
                    &resource.name,
                    Direction::Input,
                    index,
                    QuantityKind::Power,
                ))
                .cloned()
                .map_err(ModelError::from)
        })
        .collect()
}

/// Shortest shared horizon across both endpoint lists; protects against
/// arrays of unequal length reaching a coupling.
fn coupled_steps(outputs: &[Vec<VarId>], inputs: &[Vec<VarId>]) -> usize {
    outputs
        .iter()
        .chain(inputs.iter())
        .map(Vec::len)
        .min()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{OperatingState, PiecewiseSegment, StorageParameters};

    fn conversion_resource() -> ResourceParameters {
        ResourceParameters {
            name: "chp_unit".into(),
            energy_carrier_inputs: vec!["gas".into()],
            energy_carrier_output: "electricity".into(),
            min_power_input: 0.0,
            max_power_input: 200.0,
            min_power_output: 0.0,
            max_power_output: 80.0,
            efficiency_segments: vec![PiecewiseSegment {
                slope: 0.4,
                intercept: 0.0,
                min_input: 0.0,
                max_input: 200.0,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn conversion_registers_ports_and_couples_them() {
        let mut ctx = SolverContext::new(0.001);
        let mut registry = VariableRegistry::new();
        let resource = conversion_resource();
        input_output_relationship(&mut ctx, &mut registry, &resource, 4).unwrap();

        assert!(registry.contains(&VariableKey::indexed(
            "chp_unit",
            Direction::Input,
            0,
            QuantityKind::Power
        )));
        assert!(registry.contains(&VariableKey::single(
            "chp_unit",
            Direction::Output,
            QuantityKind::Power
        )));
        // One equality per time step.
        assert_eq!(ctx.constraint_count(), 4);
    }

    #[test]
    fn multi_segment_conversion_registers_matrices() {
        let mut ctx = SolverContext::new(0.001);
        let mut registry = VariableRegistry::new();
        let mut resource = conversion_resource();
        resource.efficiency_segments = vec![
            PiecewiseSegment {
                slope: 0.5,
                intercept: 0.0,
                min_input: 0.0,
                max_input: 100.0,
            },
            PiecewiseSegment {
                slope: 0.3,
                intercept: 20.0,
                min_input: 100.0,
                max_input: 200.0,
            },
        ];
        input_output_relationship(&mut ctx, &mut registry, &resource, 3).unwrap();

        let segment_key =
            VariableKey::single("chp_unit", Direction::Input, QuantityKind::Segment);
        let matrix = registry.matrix(&segment_key).unwrap();
        assert_eq!(matrix.rows.len(), 2);
        assert_eq!(matrix.rows[0].len(), 3);
        assert!(registry.contains(&VariableKey::single(
            "chp_unit",
            Direction::Input,
            QuantityKind::Binary
        )));
    }

    #[test]
    fn storage_soc_has_terminal_entry() {
        let mut ctx = SolverContext::new(0.001);
        let mut registry = VariableRegistry::new();
        let resource = ResourceParameters {
            name: "buffer".into(),
            is_storage: true,
            max_power_input: 30.0,
            max_power_output: 30.0,
            storage: Some(StorageParameters {
                capacity: 120.0,
                soc_min: 10.0,
                soc_max: 110.0,
                initial_soc: 60.0,
                charge_efficiency: 0.95,
                discharge_efficiency: 0.95,
            }),
            ..Default::default()
        };
        energy_balance_storage(&mut ctx, &mut registry, &resource, 4, 0.5).unwrap();

        let soc = registry
            .vector(&VariableKey::single(
                "buffer",
                Direction::Output,
                QuantityKind::Soc,
            ))
            .unwrap();
        assert_eq!(soc.len(), 5);
        assert_eq!(ctx.bounds(soc[0]), Some((10.0, 110.0)));
        // Initial SOC pin plus one balance row per step.
        assert_eq!(ctx.constraint_count(), 5);
    }

    fn stateful_resource() -> ResourceParameters {
        ResourceParameters {
            name: "m1".into(),
            energy_carrier_inputs: vec!["electricity".into()],
            max_power_input: 50.0,
            system_states: vec![
                OperatingState {
                    name: "off".into(),
                    min_power: 0.0,
                    max_power: 0.0,
                    holding_steps: 0,
                    allowed_successors: Some(vec![1]),
                },
                OperatingState {
                    name: "on".into(),
                    min_power: 10.0,
                    max_power: 50.0,
                    holding_steps: 2,
                    allowed_successors: None,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn state_selection_builds_time_major_matrix() {
        let mut ctx = SolverContext::new(0.001);
        let mut registry = VariableRegistry::new();
        let resource = stateful_resource();
        input_output_relationship(&mut ctx, &mut registry, &resource, 4).unwrap();
        system_state_selection_by_power_limits(&mut ctx, &mut registry, &resource, 4).unwrap();

        let matrix = registry
            .matrix(&VariableKey::single("m1", Direction::Input, QuantityKind::State))
            .unwrap();
        assert_eq!(matrix.rows.len(), 4);
        assert_eq!(matrix.rows[0].len(), 2);
    }

    #[test]
    fn sequencing_adds_transition_and_holding_rows() {
        let mut ctx = SolverContext::new(0.001);
        let mut registry = VariableRegistry::new();
        let resource = stateful_resource();
        input_output_relationship(&mut ctx, &mut registry, &resource, 4).unwrap();
        system_state_selection_by_power_limits(&mut ctx, &mut registry, &resource, 4).unwrap();
        let before = ctx.constraint_count();
        state_sequences_and_holding_duration(&mut ctx, &mut registry, &resource, 4).unwrap();
        assert!(ctx.constraint_count() > before);
    }

    #[test]
    fn ramp_without_slope_is_a_no_op() {
        let mut ctx = SolverContext::new(0.001);
        let mut registry = VariableRegistry::new();
        let resource = conversion_resource();
        input_output_relationship(&mut ctx, &mut registry, &resource, 4).unwrap();
        let before = ctx.constraint_count();
        ramp_limits(&mut ctx, &mut registry, &resource, Direction::Input, 4, 0.5).unwrap();
        assert_eq!(ctx.constraint_count(), before);
    }

    #[test]
    fn ramp_bounds_consecutive_steps() {
        let mut ctx = SolverContext::new(0.001);
        let mut registry = VariableRegistry::new();
        let mut resource = conversion_resource();
        resource.ramp_per_hour = Some(40.0);
        input_output_relationship(&mut ctx, &mut registry, &resource, 4).unwrap();
        let before = ctx.constraint_count();
        ramp_limits(&mut ctx, &mut registry, &resource, Direction::Input, 4, 0.5).unwrap();
        // Two inequalities per consecutive pair.
        assert_eq!(ctx.constraint_count(), before + 6);
    }

    #[test]
    fn correlative_couples_each_step() {
        let mut ctx = SolverContext::new(0.001);
        let a = ctx.num_var_array(4, 0.0, 10.0).unwrap();
        let b = ctx.num_var_array(4, 0.0, 10.0).unwrap();
        correlative_dependency(&mut ctx, &[a], &[b]).unwrap();
        assert_eq!(ctx.constraint_count(), 4);
    }

    #[test]
    fn restrictive_allocates_one_selector_per_option() {
        let mut ctx = SolverContext::new(0.001);
        let out = ctx.num_var_array(3, 0.0, 10.0).unwrap();
        let opt_a = ctx.num_var_array(3, 0.0, 10.0).unwrap();
        let opt_b = ctx.num_var_array(3, 0.0, 10.0).unwrap();
        let selectors =
            restrictive_dependency(&mut ctx, &[out], &[opt_a, opt_b]).unwrap();
        assert_eq!(selectors.len(), 2);
        assert_eq!(selectors[0].len(), 3);
        // Per step: one exactly-one row plus two big-M rows per option.
        assert_eq!(ctx.constraint_count(), 3 * (1 + 2 * 2));
    }
}
