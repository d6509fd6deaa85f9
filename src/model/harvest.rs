use tracing::warn;

use crate::results::{OptimizationResult, MISSING_VALUE};
use crate::solver::{SolverContext, VarId};

use super::registry::{MatrixLayout, VariableRegistry};

/// Converts the registry plus the solved model into a uniform list of
/// named time series.
///
/// Every vector entry yields one record. Matrix entries yield one record
/// per state column (`[t][s]`, name suffixed `-{s}`) or per sub-index row
/// (`[s][t]`, same suffix) depending on layout, so the column/row count,
/// not the variable count, determines how many series a matrix produces.
/// A per-step lookup failure is recorded as the `-1` sentinel and logged;
/// it never aborts the record or the export.
pub fn harvest_results(
    ctx: &SolverContext,
    registry: &VariableRegistry,
) -> Vec<OptimizationResult> {
    let mut results = Vec::with_capacity(registry.len());

    for (key, vars) in registry.vectors() {
        results.push(series(ctx, key.to_string(), vars.iter().copied()));
    }

    for (key, matrix) in registry.matrices() {
        match matrix.layout {
            MatrixLayout::TimeMajor => {
                let columns = matrix.rows.first().map_or(0, Vec::len);
                for column in 0..columns {
                    results.push(series(
                        ctx,
                        format!("{key}-{column}"),
                        matrix.rows.iter().map(|row| row[column]),
                    ));
                }
            }
            MatrixLayout::SubIndexMajor => {
                for (row_index, row) in matrix.rows.iter().enumerate() {
                    results.push(series(
                        ctx,
                        format!("{key}-{row_index}"),
                        row.iter().copied(),
                    ));
                }
            }
        }
    }

    results
}

fn series(
    ctx: &SolverContext,
    name: String,
    vars: impl Iterator<Item = VarId>,
) -> OptimizationResult {
    let values = vars
        .enumerate()
        .map(|(time_step, var)| match ctx.value(var) {
            Ok(value) => value,
            Err(error) => {
                warn!(variable = %name, time_step, %error, "value not found, recording sentinel");
                MISSING_VALUE
            }
        })
        .collect();
    OptimizationResult::new(name, values)
}
