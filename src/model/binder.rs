use tracing::debug;

use crate::params::{Dependency, SystemParameters};
use crate::solver::SolverContext;

use super::boundary::BoundaryResolver;
use super::error::ModelError;
use super::patterns;
use super::registry::VariableRegistry;

/// Binds the declared dependencies to the assembled model.
///
/// For each dependency, in list order, both endpoint lists are resolved
/// through the [`BoundaryResolver`] into ordered arrays-of-arrays (list
/// index = array index), then the coupling pattern matching the
/// dependency kind is invoked. Dependencies are never reordered; every
/// referenced resource must have had its pattern dispatched beforehand.
pub struct DependencyBinder<'a> {
    resolver: BoundaryResolver<'a>,
}

impl<'a> DependencyBinder<'a> {
    pub fn new(params: &'a SystemParameters, array_length: usize) -> Self {
        Self {
            resolver: BoundaryResolver::new(params, array_length),
        }
    }

    pub fn bind_all(
        &self,
        ctx: &mut SolverContext,
        registry: &mut VariableRegistry,
        dependencies: &[Dependency],
    ) -> Result<(), ModelError> {
        for (index, dependency) in dependencies.iter().enumerate() {
            debug!(index, kind = ?dependency.kind, "binding dependency");
            self.bind(ctx, registry, dependency)?;
        }
        Ok(())
    }

    pub fn bind(
        &self,
        ctx: &mut SolverContext,
        registry: &mut VariableRegistry,
        dependency: &Dependency,
    ) -> Result<(), ModelError> {
        let mut inputs = Vec::with_capacity(dependency.relevant_inputs.len());
        for (position, endpoint) in dependency.relevant_inputs.iter().enumerate() {
            inputs.push(self.resolver.resolve_input(ctx, registry, endpoint, position)?);
        }
        let mut outputs = Vec::with_capacity(dependency.relevant_outputs.len());
        for (position, endpoint) in dependency.relevant_outputs.iter().enumerate() {
            outputs.push(self.resolver.resolve_output(ctx, registry, endpoint, position)?);
        }
        patterns::apply_dependency(ctx, dependency.kind, &outputs, &inputs)
    }
}
