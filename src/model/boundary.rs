use tracing::{debug, warn};

use crate::params::{EndpointRef, SystemParameters};
use crate::solver::{SolverContext, VarId};

use super::error::ModelError;
use super::key::{Direction, QuantityKind, VariableKey};
use super::registry::VariableRegistry;

/// Resolves one symbolic dependency endpoint to a concrete
/// decision-variable array.
///
/// System boundary references are created lazily with the declared
/// per-carrier bounds; references to internal resources must already have
/// been registered by their pattern. Two references to the same physical
/// port always resolve to the identical array: existing registry entries
/// are reused before anything new is created.
pub struct BoundaryResolver<'a> {
    params: &'a SystemParameters,
    array_length: usize,
}

impl<'a> BoundaryResolver<'a> {
    pub fn new(params: &'a SystemParameters, array_length: usize) -> Self {
        Self {
            params,
            array_length,
        }
    }

    /// Resolves an endpoint from a dependency's relevant-inputs list:
    /// either the system's output port or an internal resource's input
    /// port. `position` is the endpoint's index within that list.
    pub fn resolve_input(
        &self,
        ctx: &mut SolverContext,
        registry: &mut VariableRegistry,
        endpoint: &EndpointRef,
        position: usize,
    ) -> Result<Vec<VarId>, ModelError> {
        if endpoint.is_system_output() {
            self.resolve_boundary(ctx, registry, endpoint, position, Direction::Output)
        } else {
            self.resolve_resource_input(registry, endpoint)
        }
    }

    /// Resolves an endpoint from a dependency's relevant-outputs list:
    /// either the system's input port or an internal resource's output
    /// port.
    pub fn resolve_output(
        &self,
        ctx: &mut SolverContext,
        registry: &mut VariableRegistry,
        endpoint: &EndpointRef,
        position: usize,
    ) -> Result<Vec<VarId>, ModelError> {
        if endpoint.is_system_input() {
            self.resolve_boundary(ctx, registry, endpoint, position, Direction::Input)
        } else {
            self.resolve_resource_output(registry, endpoint)
        }
    }

    /// System boundary branch. Carrier index comes from a label scan of
    /// the matching system carrier list, falling back to the endpoint's
    /// list position for unknown labels. Index 0 is the primary port and
    /// reuses the pre-created primary array; all other indices create
    /// (unless an identically-keyed array already exists).
    fn resolve_boundary(
        &self,
        ctx: &mut SolverContext,
        registry: &mut VariableRegistry,
        endpoint: &EndpointRef,
        position: usize,
        direction: Direction,
    ) -> Result<Vec<VarId>, ModelError> {
        let carriers = match direction {
            Direction::Input => &self.params.inputs_system,
            Direction::Output => &self.params.outputs_system,
        };
        let matched = carriers.iter().position(|c| c == &endpoint.carrier);
        let carrier_index = matched.unwrap_or(position);
        debug!(
            carrier = %endpoint.carrier,
            %direction,
            carrier_index,
            label_matched = matched.is_some(),
            "resolving system boundary endpoint"
        );

        if carrier_index == 0 {
            let key = VariableKey::system(direction, None);
            if let Ok(existing) = registry.vector(&key) {
                return Ok(existing.clone());
            }
            let (lower, upper) = self.boundary_bounds(endpoint, direction, 0, matched.is_some());
            let vars = ctx.num_var_array(self.array_length, lower, upper)?;
            registry.put_vector(key, vars.clone())?;
            return Ok(vars);
        }

        let key = VariableKey::system(direction, Some(carrier_index));
        if let Ok(existing) = registry.vector(&key) {
            return Ok(existing.clone());
        }
        let (lower, upper) =
            self.boundary_bounds(endpoint, direction, carrier_index, matched.is_some());
        let vars = ctx.num_var_array(self.array_length, lower, upper)?;
        registry.put_vector(key, vars.clone())?;
        Ok(vars)
    }

    /// Per-carrier power envelope for a boundary port. Any lookup failure
    /// (unmatched label, bound array shorter than the carrier list) is
    /// non-fatal and falls back to `[0, +inf)`.
    fn boundary_bounds(
        &self,
        endpoint: &EndpointRef,
        direction: Direction,
        carrier_index: usize,
        label_matched: bool,
    ) -> (f64, f64) {
        let (mins, maxs) = match direction {
            Direction::Input => (
                &self.params.min_power_system_input,
                &self.params.max_power_system_input,
            ),
            Direction::Output => (
                &self.params.min_power_system_output,
                &self.params.max_power_system_output,
            ),
        };
        if label_matched {
            if let (Some(&lower), Some(&upper)) = (mins.get(carrier_index), maxs.get(carrier_index))
            {
                return (lower, upper);
            }
        }
        warn!(
            carrier = %endpoint.carrier,
            %direction,
            carrier_index,
            "no system bounds for boundary carrier, falling back to [0, +inf)"
        );
        (0.0, f64::INFINITY)
    }

    /// Internal resource branch, inputs side. The carrier label selects
    /// the port index; storage-pattern resources register all carriers
    /// under one combined port, forcing the single-port sub-index.
    fn resolve_resource_input(
        &self,
        registry: &VariableRegistry,
        endpoint: &EndpointRef,
    ) -> Result<Vec<VarId>, ModelError> {
        let resource = self.params.resource(&endpoint.resource_name).ok_or_else(|| {
            ModelError::UnresolvedEndpoint {
                resource: endpoint.resource_name.clone(),
                carrier: endpoint.carrier.clone(),
                reason: "unknown resource".into(),
            }
        })?;
        let sub_index = if resource.uses_storage_pattern() {
            None
        } else {
            resource.input_carrier_index(&endpoint.carrier)
        };
        let key = VariableKey {
            resource: resource.name.clone(),
            direction: Direction::Input,
            sub_index,
            quantity: QuantityKind::Power,
        };
        registry
            .vector(&key)
            .cloned()
            .map_err(|_| ModelError::UnresolvedEndpoint {
                resource: endpoint.resource_name.clone(),
                carrier: endpoint.carrier.clone(),
                reason: format!("no registered variable under key {key}"),
            })
    }

    /// Internal resource branch, outputs side: always the single output
    /// port.
    fn resolve_resource_output(
        &self,
        registry: &VariableRegistry,
        endpoint: &EndpointRef,
    ) -> Result<Vec<VarId>, ModelError> {
        let key = VariableKey::single(
            endpoint.resource_name.clone(),
            Direction::Output,
            QuantityKind::Power,
        );
        registry
            .vector(&key)
            .cloned()
            .map_err(|_| ModelError::UnresolvedEndpoint {
                resource: endpoint.resource_name.clone(),
                carrier: endpoint.carrier.clone(),
                reason: format!("no registered variable under key {key}"),
            })
    }
}
