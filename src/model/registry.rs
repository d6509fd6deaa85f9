use std::collections::BTreeMap;

use thiserror::Error;

use crate::solver::VarId;

use super::key::{QuantityKind, VariableKey};

/// Memory layout of a matrix-shaped decision variable.
///
/// Discrete-state matrices are indexed `[time_step][state_index]`; every
/// other matrix kind is indexed `[sub_index][time_step]`. The layout is
/// fixed by the quantity kind at insertion and drives how the harvester
/// slices the matrix into named series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixLayout {
    TimeMajor,
    SubIndexMajor,
}

impl MatrixLayout {
    pub fn for_quantity(quantity: QuantityKind) -> Self {
        match quantity {
            QuantityKind::State => MatrixLayout::TimeMajor,
            _ => MatrixLayout::SubIndexMajor,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarMatrix {
    pub layout: MatrixLayout,
    pub rows: Vec<Vec<VarId>>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no decision variable registered under key {0}")]
    NotFound(String),
    #[error("decision variable already registered under key {0}")]
    Duplicate(String),
}

/// Canonical-key store of every decision-variable array of one model
/// build. Two physically distinct stores: flat time-indexed vectors and
/// matrices with an explicit [`MatrixLayout`].
///
/// The registry never deduplicates by value; callers check existence
/// before creating boundary variables so that two references to the same
/// physical port resolve to the identical array. Discarded after one run.
#[derive(Debug, Default)]
pub struct VariableRegistry {
    vectors: BTreeMap<VariableKey, Vec<VarId>>,
    matrices: BTreeMap<VariableKey, VarMatrix>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_vector(
        &mut self,
        key: VariableKey,
        vars: Vec<VarId>,
    ) -> Result<(), RegistryError> {
        if self.contains(&key) {
            return Err(RegistryError::Duplicate(key.to_string()));
        }
        self.vectors.insert(key, vars);
        Ok(())
    }

    pub fn put_matrix(
        &mut self,
        key: VariableKey,
        rows: Vec<Vec<VarId>>,
    ) -> Result<(), RegistryError> {
        if self.contains(&key) {
            return Err(RegistryError::Duplicate(key.to_string()));
        }
        let layout = MatrixLayout::for_quantity(key.quantity);
        self.matrices.insert(key, VarMatrix { layout, rows });
        Ok(())
    }

    pub fn vector(&self, key: &VariableKey) -> Result<&Vec<VarId>, RegistryError> {
        self.vectors
            .get(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    pub fn matrix(&self, key: &VariableKey) -> Result<&VarMatrix, RegistryError> {
        self.matrices
            .get(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    pub fn contains(&self, key: &VariableKey) -> bool {
        self.vectors.contains_key(key) || self.matrices.contains_key(key)
    }

    pub fn vectors(&self) -> impl Iterator<Item = (&VariableKey, &Vec<VarId>)> {
        self.vectors.iter()
    }

    pub fn matrices(&self) -> impl Iterator<Item = (&VariableKey, &VarMatrix)> {
        self.matrices.iter()
    }

    pub fn len(&self) -> usize {
        self.vectors.len() + self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty() && self.matrices.is_empty()
    }
}
