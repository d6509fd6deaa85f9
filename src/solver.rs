//! Solver capability layer.
//!
//! [`SolverContext`] is an explicit, caller-owned value holding the symbolic
//! model (variables, linear constraints, objective) that every assembly
//! component writes into. The numeric solve is delegated to good_lp's
//! default backend (CBC) behind the `optimization` feature; without it the
//! solve call fails with a clear error instead of silently doing nothing.
//!
//! The context has a strict lifecycle: created at the start of assembly,
//! shared by every component during the run, then released exactly once via
//! [`SolverContext::close`]. Any use after release fails fast.

use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Handle to one decision variable inside a [`SolverContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Continuous,
    Binary,
}

#[derive(Debug, Clone, Copy)]
struct VarDef {
    lower: f64,
    upper: f64,
    kind: VarKind,
}

/// A linear expression over decision variables: `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(var: VarId, coef: f64) -> Self {
        Self {
            terms: vec![(var, coef)],
            constant: 0.0,
        }
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn add(&mut self, var: VarId, coef: f64) {
        self.terms.push((var, coef));
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    pub fn with(mut self, var: VarId, coef: f64) -> Self {
        self.add(var, coef);
        self
    }

    pub fn offset(mut self, value: f64) -> Self {
        self.add_constant(value);
        self
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_part(&self) -> f64 {
        self.constant
    }

    fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }

    /// Terms combined per variable, for rendering.
    fn combined(&self) -> Vec<(usize, f64)> {
        let mut by_var = std::collections::BTreeMap::new();
        for (var, coef) in &self.terms {
            *by_var.entry(var.0).or_insert(0.0) += coef;
        }
        by_var.into_iter().collect()
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        LinExpr::term(var, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Relation {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "<=")]
    Leq,
    #[strum(serialize = ">=")]
    Geq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
}

#[derive(Debug, Clone)]
struct Row {
    lhs: LinExpr,
    relation: Relation,
    rhs: LinExpr,
}

/// Outcome of one solve invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveStatus {
    Optimal { objective: f64 },
    /// The backend found no feasible (bounded) solution. A normal terminal
    /// state of a run, not an error.
    NotSolved,
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver context already released")]
    ContextClosed,
    #[error("no solution available")]
    NoSolution,
    #[error("no solved value for variable {0}")]
    ValueUnavailable(VarId),
    #[error("objective not set")]
    MissingObjective,
    #[error("solver backend disabled; rebuild with the 'optimization' feature")]
    BackendDisabled,
    #[error("solver backend failed: {0}")]
    Backend(String),
    #[error("model export failed: {0}")]
    Export(#[from] std::io::Error),
}

/// The symbolic model store plus the backend bridge.
#[derive(Debug)]
pub struct SolverContext {
    relative_gap: f64,
    vars: Vec<VarDef>,
    rows: Vec<Row>,
    objective: Option<(LinExpr, ObjectiveSense)>,
    solution: Option<Vec<f64>>,
    objective_value: Option<f64>,
    closed: bool,
}

impl SolverContext {
    pub fn new(relative_gap: f64) -> Self {
        Self {
            relative_gap,
            vars: Vec::new(),
            rows: Vec::new(),
            objective: None,
            solution: None,
            objective_value: None,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), SolverError> {
        if self.closed {
            Err(SolverError::ContextClosed)
        } else {
            Ok(())
        }
    }

    /// Creates one bounded continuous variable.
    pub fn num_var(&mut self, lower: f64, upper: f64) -> Result<VarId, SolverError> {
        self.ensure_open()?;
        let id = VarId(self.vars.len());
        self.vars.push(VarDef {
            lower,
            upper,
            kind: VarKind::Continuous,
        });
        Ok(id)
    }

    /// Creates a time-indexed array of bounded continuous variables.
    pub fn num_var_array(
        &mut self,
        len: usize,
        lower: f64,
        upper: f64,
    ) -> Result<Vec<VarId>, SolverError> {
        (0..len).map(|_| self.num_var(lower, upper)).collect()
    }

    pub fn bool_var(&mut self) -> Result<VarId, SolverError> {
        self.ensure_open()?;
        let id = VarId(self.vars.len());
        self.vars.push(VarDef {
            lower: 0.0,
            upper: 1.0,
            kind: VarKind::Binary,
        });
        Ok(id)
    }

    pub fn bool_var_array(&mut self, len: usize) -> Result<Vec<VarId>, SolverError> {
        (0..len).map(|_| self.bool_var()).collect()
    }

    pub fn add_constraint(
        &mut self,
        lhs: LinExpr,
        relation: Relation,
        rhs: LinExpr,
    ) -> Result<(), SolverError> {
        self.ensure_open()?;
        self.rows.push(Row { lhs, relation, rhs });
        Ok(())
    }

    pub fn set_objective(
        &mut self,
        expr: LinExpr,
        sense: ObjectiveSense,
    ) -> Result<(), SolverError> {
        self.ensure_open()?;
        self.objective = Some((expr, sense));
        Ok(())
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.rows.len()
    }

    pub fn bounds(&self, var: VarId) -> Option<(f64, f64)> {
        self.vars.get(var.0).map(|def| (def.lower, def.upper))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.objective_value
    }

    /// Solves the assembled model. Infeasibility and unboundedness are
    /// reported as [`SolveStatus::NotSolved`]; backend failures are errors.
    pub fn solve(&mut self) -> Result<SolveStatus, SolverError> {
        self.ensure_open()?;
        let (objective, _) = self
            .objective
            .as_ref()
            .ok_or(SolverError::MissingObjective)?;
        info!(
            variables = self.vars.len(),
            constraints = self.rows.len(),
            relative_gap = self.relative_gap,
            "invoking solver backend"
        );
        match self.run_backend()? {
            Some(values) => {
                let objective_value = objective.eval(&values);
                self.objective_value = Some(objective_value);
                self.solution = Some(values);
                Ok(SolveStatus::Optimal {
                    objective: objective_value,
                })
            }
            None => Ok(SolveStatus::NotSolved),
        }
    }

    /// Solved value of one variable. Fails per variable, never globally:
    /// the harvester substitutes a sentinel and keeps going.
    pub fn value(&self, var: VarId) -> Result<f64, SolverError> {
        self.ensure_open()?;
        let solution = self.solution.as_ref().ok_or(SolverError::NoSolution)?;
        solution
            .get(var.0)
            .copied()
            .ok_or(SolverError::ValueUnavailable(var))
    }

    /// Writes the assembled model in LP text format, as an audit artifact.
    pub fn export_model(&self, path: &Path) -> Result<(), SolverError> {
        self.ensure_open()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        writeln!(out, "\\ {} variables, {} constraints", self.vars.len(), self.rows.len())?;
        let (sense, rendered) = match self.objective.as_ref() {
            Some((expr, sense)) => (*sense, render_terms(&expr.combined())),
            None => (ObjectiveSense::Minimize, "0".to_string()),
        };
        match sense {
            ObjectiveSense::Maximize => writeln!(out, "Maximize")?,
            ObjectiveSense::Minimize => writeln!(out, "Minimize")?,
        }
        writeln!(out, " obj: {rendered}")?;
        writeln!(out, "Subject To")?;
        for (index, row) in self.rows.iter().enumerate() {
            let mut normalized = row.lhs.clone();
            for (var, coef) in row.rhs.terms() {
                normalized.add(*var, -coef);
            }
            let rhs_constant = row.rhs.constant_part() - row.lhs.constant_part();
            writeln!(
                out,
                " c{index}: {} {} {rhs_constant}",
                render_terms(&normalized.combined()),
                row.relation
            )?;
        }
        writeln!(out, "Bounds")?;
        for (index, def) in self.vars.iter().enumerate() {
            if def.kind == VarKind::Binary {
                continue;
            }
            if def.lower.is_infinite() && def.upper.is_infinite() {
                writeln!(out, " x{index} free")?;
            } else if def.upper.is_infinite() {
                writeln!(out, " x{index} >= {}", def.lower)?;
            } else {
                writeln!(out, " {} <= x{index} <= {}", def.lower, def.upper)?;
            }
        }
        let binaries: Vec<String> = self
            .vars
            .iter()
            .enumerate()
            .filter(|(_, def)| def.kind == VarKind::Binary)
            .map(|(index, _)| format!("x{index}"))
            .collect();
        if !binaries.is_empty() {
            writeln!(out, "Binaries")?;
            writeln!(out, " {}", binaries.join(" "))?;
        }
        writeln!(out, "End")?;
        out.flush()?;
        debug!(path = %path.display(), "exported model");
        Ok(())
    }

    /// Releases the context. Every subsequent operation fails with
    /// [`SolverError::ContextClosed`].
    pub fn close(&mut self) -> Result<(), SolverError> {
        self.ensure_open()?;
        self.closed = true;
        self.solution = None;
        debug!("solver context released");
        Ok(())
    }

    #[cfg(feature = "optimization")]
    fn run_backend(&self) -> Result<Option<Vec<f64>>, SolverError> {
        use good_lp::{default_solver, variable, Expression, ProblemVariables, Solution, SolverModel};

        let (objective, sense) = self
            .objective
            .as_ref()
            .ok_or(SolverError::MissingObjective)?;

        let mut problem = ProblemVariables::new();
        let handles: Vec<good_lp::Variable> = self
            .vars
            .iter()
            .map(|def| {
                let mut var = variable();
                if def.lower.is_finite() {
                    var = var.min(def.lower);
                }
                if def.upper.is_finite() {
                    var = var.max(def.upper);
                }
                if def.kind == VarKind::Binary {
                    var = var.binary();
                }
                problem.add(var)
            })
            .collect();

        let to_expression = |expr: &LinExpr| -> Expression {
            expr.terms()
                .iter()
                .map(|(var, coef)| *coef * handles[var.0])
                .sum::<Expression>()
                + expr.constant_part()
        };

        let objective_expr = to_expression(objective);
        let mut model = match sense {
            ObjectiveSense::Minimize => problem.minimise(objective_expr).using(default_solver),
            ObjectiveSense::Maximize => problem.maximise(objective_expr).using(default_solver),
        };
        for row in &self.rows {
            let lhs = to_expression(&row.lhs);
            let rhs = to_expression(&row.rhs);
            let constraint = match row.relation {
                Relation::Eq => good_lp::constraint::eq(lhs, rhs),
                Relation::Leq => good_lp::constraint::leq(lhs, rhs),
                Relation::Geq => good_lp::constraint::geq(lhs, rhs),
            };
            model = model.with(constraint);
        }

        match model.solve() {
            Ok(solution) => Ok(Some(
                handles.iter().map(|handle| solution.value(*handle)).collect(),
            )),
            Err(good_lp::ResolutionError::Infeasible) => Ok(None),
            Err(good_lp::ResolutionError::Unbounded) => Ok(None),
            Err(other) => Err(SolverError::Backend(other.to_string())),
        }
    }

    #[cfg(not(feature = "optimization"))]
    fn run_backend(&self) -> Result<Option<Vec<f64>>, SolverError> {
        Err(SolverError::BackendDisabled)
    }

    #[cfg(test)]
    pub(crate) fn inject_solution(&mut self, values: Vec<f64>) {
        self.solution = Some(values);
    }
}

fn render_terms(terms: &[(usize, f64)]) -> String {
    if terms.is_empty() {
        return "0".to_string();
    }
    let mut rendered = String::new();
    for (position, (index, coef)) in terms.iter().enumerate() {
        if position == 0 {
            rendered.push_str(&format!("{coef} x{index}"));
        } else if *coef < 0.0 {
            rendered.push_str(&format!(" - {} x{index}", -coef));
        } else {
            rendered.push_str(&format!(" + {coef} x{index}"));
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_arrays_carry_their_bounds() {
        let mut ctx = SolverContext::new(0.001);
        let vars = ctx.num_var_array(4, 0.0, 250.0).unwrap();
        assert_eq!(vars.len(), 4);
        assert_eq!(ctx.bounds(vars[2]), Some((0.0, 250.0)));
        let bin = ctx.bool_var().unwrap();
        assert_eq!(ctx.bounds(bin), Some((0.0, 1.0)));
        assert_eq!(ctx.var_count(), 5);
    }

    #[test]
    fn closed_context_fails_fast() {
        let mut ctx = SolverContext::new(0.001);
        let var = ctx.num_var(0.0, 1.0).unwrap();
        ctx.close().unwrap();
        assert!(matches!(
            ctx.num_var(0.0, 1.0),
            Err(SolverError::ContextClosed)
        ));
        assert!(matches!(ctx.value(var), Err(SolverError::ContextClosed)));
        assert!(matches!(ctx.close(), Err(SolverError::ContextClosed)));
    }

    #[test]
    fn value_before_solve_is_an_error() {
        let mut ctx = SolverContext::new(0.001);
        let var = ctx.num_var(0.0, 1.0).unwrap();
        assert!(matches!(ctx.value(var), Err(SolverError::NoSolution)));
    }

    #[test]
    fn injected_solution_is_per_variable() {
        let mut ctx = SolverContext::new(0.001);
        let a = ctx.num_var(0.0, 10.0).unwrap();
        let b = ctx.num_var(0.0, 10.0).unwrap();
        ctx.inject_solution(vec![3.5]);
        assert_eq!(ctx.value(a).unwrap(), 3.5);
        assert!(matches!(
            ctx.value(b),
            Err(SolverError::ValueUnavailable(_))
        ));
    }

    #[test]
    fn export_renders_lp_text() {
        let mut ctx = SolverContext::new(0.001);
        let x = ctx.num_var(0.0, 5.0).unwrap();
        let y = ctx.num_var(0.0, f64::INFINITY).unwrap();
        ctx.add_constraint(
            LinExpr::term(x, 1.0).with(y, 1.0),
            Relation::Leq,
            LinExpr::constant(8.0),
        )
        .unwrap();
        ctx.set_objective(LinExpr::term(x, 2.0), ObjectiveSense::Maximize)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.lp");
        ctx.export_model(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Maximize"));
        assert!(text.contains("c0: 1 x0 + 1 x1 <= 8"));
        assert!(text.contains("0 <= x0 <= 5"));
        assert!(text.contains("x1 >= 0"));
        assert!(text.ends_with("End\n"));
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn solves_a_small_lp() {
        let mut ctx = SolverContext::new(0.001);
        let x = ctx.num_var(0.0, 10.0).unwrap();
        ctx.add_constraint(
            LinExpr::term(x, 1.0),
            Relation::Leq,
            LinExpr::constant(5.0),
        )
        .unwrap();
        ctx.set_objective(LinExpr::term(x, 1.0), ObjectiveSense::Maximize)
            .unwrap();
        match ctx.solve().unwrap() {
            SolveStatus::Optimal { objective } => {
                assert!((objective - 5.0).abs() < 1e-6);
                assert!((ctx.value(x).unwrap() - 5.0).abs() < 1e-6);
            }
            SolveStatus::NotSolved => panic!("expected an optimal solution"),
        }
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn infeasible_model_is_not_an_error() {
        let mut ctx = SolverContext::new(0.001);
        let x = ctx.num_var(0.0, 1.0).unwrap();
        ctx.add_constraint(
            LinExpr::term(x, 1.0),
            Relation::Geq,
            LinExpr::constant(2.0),
        )
        .unwrap();
        ctx.set_objective(LinExpr::term(x, 1.0), ObjectiveSense::Minimize)
            .unwrap();
        assert_eq!(ctx.solve().unwrap(), SolveStatus::NotSolved);
    }
}
