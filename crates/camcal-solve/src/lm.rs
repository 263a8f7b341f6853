//! Levenberg–Marquardt over block-structured residuals.
//!
//! A problem is a set of residual blocks, each touching a small subset of the
//! global parameter vector (the shared intrinsics plus one view pose, say).
//! Jacobians are taken per block by central differences and placed into the
//! stacked Jacobian; the trust-region iteration itself is the MINPACK-style
//! solver from `levenberg-marquardt`.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// Residual blocks over a shared parameter vector.
pub trait BlockProblem {
    fn num_params(&self) -> usize;

    fn num_blocks(&self) -> usize;

    /// Free global parameter indices block `block` depends on. Parameters left
    /// out of every block stay fixed.
    fn block_params(&self, block: usize) -> &[usize];

    fn block_residuals(&self, block: usize, x: &DVector<f64>) -> DVector<f64>;
}

/// Stopping rules for [`solve`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LmOptions {
    /// Evaluation budget, in units of `free parameters + 1`.
    pub max_iters: usize,
    /// Relative cost decrease below which the solve is converged.
    pub ftol: f64,
    /// Relative step size below which the solve is converged.
    pub xtol: f64,
    /// Orthogonality between residuals and Jacobian columns below which the
    /// solve is converged.
    pub gtol: f64,
    /// Initial trust-region radius as a factor of the scaled start point.
    pub stepbound: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-14,
            xtol: 1e-14,
            gtol: 1e-14,
            stepbound: 100.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Residual evaluations spent by the solver.
    pub iterations: usize,
    /// `0.5 * Σ r²` before and after.
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
}

/// `0.5 * Σ r²` over all blocks.
pub fn total_cost<P: BlockProblem + ?Sized>(problem: &P, x: &DVector<f64>) -> f64 {
    (0..problem.num_blocks())
        .map(|b| 0.5 * problem.block_residuals(b, x).norm_squared())
        .sum()
}

fn derivative_step(value: f64) -> f64 {
    1e-6 * value.abs().max(1.0)
}

/// Exposes only the parameters some block touches to the solver; the rest of
/// `full` rides along unchanged.
struct BlockLeastSquares<'a, P: BlockProblem + ?Sized> {
    problem: &'a P,
    full: DVector<f64>,
    free: Vec<usize>,
    /// Solver column of each global parameter, if it is free.
    column: Vec<Option<usize>>,
}

impl<'a, P: BlockProblem + ?Sized> BlockLeastSquares<'a, P> {
    fn new(problem: &'a P, x0: DVector<f64>) -> Self {
        let mut column = vec![None; problem.num_params()];
        let mut free = Vec::new();
        for b in 0..problem.num_blocks() {
            for &p in problem.block_params(b) {
                if column[p].is_none() {
                    column[p] = Some(free.len());
                    free.push(p);
                }
            }
        }
        Self {
            problem,
            full: x0,
            free,
            column,
        }
    }
}

impl<P: BlockProblem + ?Sized> LeastSquaresProblem<f64, Dyn, Dyn> for BlockLeastSquares<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        for (&p, &v) in self.free.iter().zip(x.iter()) {
            self.full[p] = v;
        }
    }

    fn params(&self) -> DVector<f64> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&p| self.full[p]))
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let blocks: Vec<DVector<f64>> = (0..self.problem.num_blocks())
            .map(|b| self.problem.block_residuals(b, &self.full))
            .collect();
        let len = blocks.iter().map(|r| r.len()).sum();
        Some(DVector::from_iterator(
            len,
            blocks.iter().flat_map(|r| r.iter().copied()),
        ))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let blocks: Vec<DMatrix<f64>> = (0..self.problem.num_blocks())
            .map(|b| self.block_jacobian(b))
            .collect::<Option<_>>()?;
        let rows = blocks.iter().map(|j| j.nrows()).sum();
        let mut jac = DMatrix::<f64>::zeros(rows, self.free.len());
        let mut row = 0;
        for (b, local) in blocks.iter().enumerate() {
            for (k, &p) in self.problem.block_params(b).iter().enumerate() {
                let col = self.column[p]?;
                jac.view_mut((row, col), (local.nrows(), 1))
                    .copy_from(&local.column(k));
            }
            row += local.nrows();
        }
        Some(jac)
    }
}

impl<P: BlockProblem + ?Sized> BlockLeastSquares<'_, P> {
    /// Central differences over the parameters of one block.
    fn block_jacobian(&self, block: usize) -> Option<DMatrix<f64>> {
        let idx = self.problem.block_params(block);
        let rows = self.problem.block_residuals(block, &self.full).len();
        let mut jac = DMatrix::<f64>::zeros(rows, idx.len());
        let mut shifted = self.full.clone();
        for (col, &p) in idx.iter().enumerate() {
            let h = derivative_step(self.full[p]);
            shifted[p] = self.full[p] + h;
            let plus = self.problem.block_residuals(block, &shifted);
            shifted[p] = self.full[p] - h;
            let minus = self.problem.block_residuals(block, &shifted);
            shifted[p] = self.full[p];
            if plus.len() != rows || minus.len() != rows {
                return None;
            }
            jac.set_column(col, &((plus - minus) / (2.0 * h)));
        }
        Some(jac)
    }
}

/// Minimize `0.5 * Σ‖r_b(x)‖²` starting from `x0`.
pub fn solve<P: BlockProblem + ?Sized>(
    problem: &P,
    x0: DVector<f64>,
    opts: &LmOptions,
) -> (DVector<f64>, SolveReport) {
    let initial_cost = total_cost(problem, &x0);
    let wrapper = BlockLeastSquares::new(problem, x0);
    if wrapper.free.is_empty() {
        let report = SolveReport {
            iterations: 0,
            initial_cost,
            final_cost: initial_cost,
            converged: true,
        };
        return (wrapper.full, report);
    }

    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_stepbound(opts.stepbound)
        .with_patience(opts.max_iters.max(1));
    let (wrapper, report) = lm.minimize(wrapper);
    log::trace!(
        "lm: {:?} after {} evaluations, cost {:.6e} -> {:.6e}",
        report.termination,
        report.number_of_evaluations,
        initial_cost,
        report.objective_function
    );

    let report = SolveReport {
        iterations: report.number_of_evaluations,
        initial_cost,
        final_cost: report.objective_function,
        converged: report.termination.was_successful(),
    };
    (wrapper.full, report)
}
