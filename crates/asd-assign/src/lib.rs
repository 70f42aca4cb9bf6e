//! Rectangular linear assignment (min-cost bipartite matching) used by the
//! tracker's cascaded assignment step.

use pathfinding::matrix::Matrix;
use pathfinding::prelude::kuhn_munkres_min;
use tracing::warn;

/// Result of an `RlapSolve` call: 0 means every row was matched, >0 is a
/// warning code for a degraded-but-usable result, matching the spec's
/// `RLAPSolve(cost, out rows, out cols) -> exitCode` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlapExit {
    Ok,
    InvalidCostMatrix,
    Infeasible,
    Unknown(i32),
}

impl RlapExit {
    pub fn code(self) -> i32 {
        match self {
            RlapExit::Ok => 0,
            RlapExit::InvalidCostMatrix => 1,
            RlapExit::Infeasible => 2,
            RlapExit::Unknown(c) => c,
        }
    }

    pub fn is_warning(self) -> bool {
        self != RlapExit::Ok
    }
}

/// A committed (track_row, detection_col) pair with its cost, as returned
/// by a solver run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub row: usize,
    pub col: usize,
    pub cost: f32,
}

/// Pluggable RLAP backend, so the tracker can be tested against a fake
/// solver without pulling in `pathfinding`.
pub trait RlapSolver: Send + Sync {
    fn solve(&self, cost: &[Vec<f32>]) -> (RlapExit, Vec<Assignment>);
}

/// Default solver: Kuhn-Munkres (Hungarian algorithm) via `pathfinding`,
/// padded to square with a high sentinel cost so fewer tracks than
/// detections (or vice versa) still produce a dense matrix the algorithm
/// accepts, then rows/columns entirely in the padding are dropped from the
/// result.
#[derive(Debug, Default)]
pub struct KuhnMunkresRlapSolver;

/// Cost assigned to padding cells; large enough that the solver never
/// prefers a padded pairing over a real one unless it is forced to.
const SENTINEL_COST: f32 = 1.0e6;
/// Kuhn-Munkres works over integers in `pathfinding`; costs are scaled up
/// before rounding to preserve enough precision for tie-breaking.
const FIXED_POINT_SCALE: f32 = 1_000.0;

impl RlapSolver for KuhnMunkresRlapSolver {
    fn solve(&self, cost: &[Vec<f32>]) -> (RlapExit, Vec<Assignment>) {
        let rows = cost.len();
        if rows == 0 {
            return (RlapExit::Ok, Vec::new());
        }
        let cols = cost[0].len();
        if cols == 0 || cost.iter().any(|row| row.len() != cols) {
            warn!(rows, cols, "rlap received a ragged or empty cost matrix");
            return (RlapExit::InvalidCostMatrix, Vec::new());
        }

        let n = rows.max(cols);
        let mut data = Vec::with_capacity(n * n);
        for r in 0..n {
            for c in 0..n {
                let value = if r < rows && c < cols {
                    cost[r][c]
                } else {
                    SENTINEL_COST
                };
                if !value.is_finite() {
                    warn!(row = r, col = c, "rlap cost matrix contains a non-finite entry");
                    return (RlapExit::InvalidCostMatrix, Vec::new());
                }
                data.push((value * FIXED_POINT_SCALE).round() as i64);
            }
        }

        let matrix = match Matrix::from_vec(n, n, data) {
            Ok(m) => m,
            Err(_) => return (RlapExit::InvalidCostMatrix, Vec::new()),
        };

        let (_, col_for_row) = kuhn_munkres_min(&matrix);

        let mut assignments = Vec::with_capacity(rows.min(cols));
        for (row, &col) in col_for_row.iter().enumerate() {
            if row < rows && col < cols {
                assignments.push(Assignment {
                    row,
                    col,
                    cost: cost[row][col],
                });
            }
        }

        if assignments.is_empty() && rows > 0 && cols > 0 {
            (RlapExit::Infeasible, assignments)
        } else {
            (RlapExit::Ok, assignments)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_a_simple_square_matrix() {
        let solver = KuhnMunkresRlapSolver;
        let cost = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        let (exit, assignments) = solver.solve(&cost);
        assert_eq!(exit, RlapExit::Ok);
        assert_eq!(assignments.len(), 2);
        let total: f32 = assignments.iter().map(|a| a.cost).sum();
        assert!((total - 2.0).abs() < 1e-3);
    }

    #[test]
    fn handles_more_tracks_than_detections() {
        let solver = KuhnMunkresRlapSolver;
        let cost = vec![vec![0.5], vec![0.9], vec![0.1]];
        let (exit, assignments) = solver.solve(&cost);
        assert_eq!(exit, RlapExit::Ok);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].row, 2);
    }

    #[test]
    fn handles_more_detections_than_tracks() {
        let solver = KuhnMunkresRlapSolver;
        let cost = vec![vec![0.2, 0.8, 0.4]];
        let (exit, assignments) = solver.solve(&cost);
        assert_eq!(exit, RlapExit::Ok);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].col, 0);
    }

    #[test]
    fn ragged_matrix_is_invalid() {
        let solver = KuhnMunkresRlapSolver;
        let cost = vec![vec![1.0, 2.0], vec![1.0]];
        let (exit, assignments) = solver.solve(&cost);
        assert_eq!(exit, RlapExit::InvalidCostMatrix);
        assert!(assignments.is_empty());
    }

    #[test]
    fn non_finite_cost_is_invalid() {
        let solver = KuhnMunkresRlapSolver;
        let cost = vec![vec![f32::NAN]];
        let (exit, _) = solver.solve(&cost);
        assert_eq!(exit, RlapExit::InvalidCostMatrix);
    }

    #[test]
    fn empty_matrix_is_ok_noop() {
        let solver = KuhnMunkresRlapSolver;
        let (exit, assignments) = solver.solve(&[]);
        assert_eq!(exit, RlapExit::Ok);
        assert!(assignments.is_empty());
    }
}
