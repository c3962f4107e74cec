//! Mixed precision solver.
//!
//! [`solve`] factors the matrix in reduced precision with the distributed driver, then recovers
//! a full precision solution with iterative refinement: the residual is computed in `f64`, and
//! the correction is obtained from the `f32` factors. The refinement itself runs on world rank
//! `0`, after the factors are gathered there, and the solution is broadcast to every rank.

use super::{
    dist::DistMatrix,
    pgesv::{factor, FactorParams, LuFactors},
};
use crate::{
    assert,
    comm::{broadcast, Communicator, Tag},
    context::Context,
    error::SolveError,
    kernel::Kernel,
    mat::{Mat, MatRef},
    utils::as_bytes_mut,
    Real,
};

/// Iterative refinement parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct RefineParams {
    /// Largest number of correction steps.
    pub max_iters: usize,
    /// The solution is accepted once its scaled residual is below this value.
    pub threshold: f64,
    /// Parameters of the reduced precision factorization.
    pub factor: FactorParams,
}

impl Default for RefineParams {
    #[inline]
    fn default() -> Self {
        Self {
            max_iters: 50,
            threshold: 16.0,
            factor: FactorParams::default(),
        }
    }
}

impl RefineParams {
    #[inline]
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    #[inline]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    #[inline]
    pub fn with_factor(mut self, factor: FactorParams) -> Self {
        self.factor = factor;
        self
    }
}

/// Outcome of [`solve`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SolveInfo {
    /// Number of correction steps performed.
    pub iterations: usize,
    /// Scaled residual of the returned solution.
    pub residual: f64,
    /// Whether the residual went below [`RefineParams::threshold`].
    pub converged: bool,
}

fn inf_norm(a: MatRef<'_, f64>) -> f64 {
    (0..a.nrows())
        .map(|i| (0..a.ncols()).map(|j| a.read(i, j).abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

fn max_abs(x: &[f64]) -> f64 {
    x.iter().fold(0.0, |acc, v| f64::max(acc, v.abs()))
}

/// Computes `r = b - A x` and returns `‖r‖ / (ε (‖A‖ ‖x‖ + ‖b‖) n)`, with infinity norms.
fn residual_into(
    kernel: &dyn Kernel<f64>,
    a: MatRef<'_, f64>,
    a_norm: f64,
    x: &[f64],
    b: &[f64],
    b_norm: f64,
    r: &mut [f64],
) -> f64 {
    kernel.copy(b, r);
    kernel.gemv(-1.0, a, x, 1.0, r);
    let r_norm = max_abs(r);
    if r_norm == 0.0 {
        return 0.0;
    }
    r_norm / (f64::EPSILON * (a_norm * max_abs(x) + b_norm) * a.nrows() as f64)
}

/// Returns the scaled residual `‖b - A x‖ / (ε (‖A‖ ‖x‖ + ‖b‖) n)`, with infinity norms.
///
/// # Panics
/// Panics if the dimensions do not match.
#[track_caller]
pub fn scaled_residual(kernel: &dyn Kernel<f64>, a: MatRef<'_, f64>, x: &[f64], b: &[f64]) -> f64 {
    assert!(all(
        a.nrows() == a.ncols(),
        x.len() == a.ncols(),
        b.len() == a.nrows(),
    ));
    let mut r = vec![0.0; b.len()];
    residual_into(kernel, a, inf_norm(a), x, b, max_abs(b), &mut r)
}

fn refine(
    reduced: &dyn Kernel<f32>,
    full: &dyn Kernel<f64>,
    factors: &LuFactors,
    lu: MatRef<'_, f32>,
    a: MatRef<'_, f64>,
    b: &[f64],
    x: &mut [f64],
    params: RefineParams,
) -> SolveInfo {
    let n = b.len();
    let a_norm = inf_norm(a);
    let b_norm = max_abs(b);
    let mut r = vec![0.0; n];
    let mut d = vec![0.0f32; n];

    for (d, &b) in d.iter_mut().zip(b) {
        *d = f32::demote(b);
    }
    factors.solve_in_place(reduced, lu, &mut d);
    for (x, d) in x.iter_mut().zip(&d) {
        *x = d.promote();
    }

    let mut iterations = 0;
    loop {
        let residual = residual_into(full, a, a_norm, x, b, b_norm, &mut r);
        log::debug!(target: "hplai", "refinement step {iterations}, scaled residual {residual:e}");
        if residual < params.threshold {
            return SolveInfo {
                iterations,
                residual,
                converged: true,
            };
        }
        if iterations == params.max_iters || !residual.is_finite() {
            return SolveInfo {
                iterations,
                residual,
                converged: false,
            };
        }

        for (d, &r) in d.iter_mut().zip(&r) {
            *d = f32::demote(r);
        }
        factors.solve_in_place(reduced, lu, &mut d);
        for (x, d) in x.iter_mut().zip(&d) {
            *x += d.promote();
        }
        iterations += 1;
    }
}

/// Solves `A x = b`, where `A` is the `n x n` matrix whose element `(i, j)` is `a(i, j)`.
///
/// `A` is distributed with block size `nb` and factored in `f32`, then the solution is refined in
/// `f64`. Every rank of the context must call this function with the same arguments, and every
/// rank receives the same solution.
///
/// Not reaching the threshold within [`RefineParams::max_iters`] steps is not an error: the
/// last iterate is returned, with [`SolveInfo::converged`] unset.
pub fn solve<C: Communicator>(
    ctx: &Context<C>,
    n: usize,
    nb: usize,
    a: impl Fn(usize, usize) -> f64,
    b: &[f64],
    params: RefineParams,
) -> Result<(Vec<f64>, SolveInfo), SolveError> {
    if nb == 0 {
        return Err(SolveError::InvalidParameter("the block size must be positive"));
    }
    if b.len() != n {
        return Err(SolveError::InvalidParameter(
            "the right hand side length must match the matrix dimension",
        ));
    }

    let grid = ctx.grid();
    let mut lu = DistMatrix::from_fn(grid, n, n, nb, |i, j| f32::demote(a(i, j)));
    let factors = factor(ctx, &mut lu, params.factor)?;
    if let Some(column) = factors.info().singular_column {
        return Err(SolveError::Singular { column });
    }
    let lu = lu.gather(grid, 0)?;

    let mut x = vec![0.0; n];
    // iterations, residual bits, converged
    let mut meta = [0u64; 3];
    if let Some(lu) = lu {
        let a = Mat::from_fn(n, n, &a);
        let info = refine(
            ctx.kernel::<f32>(),
            ctx.kernel::<f64>(),
            &factors,
            lu.as_ref(),
            a.as_ref(),
            b,
            &mut x,
            params,
        );
        meta = [
            info.iterations as u64,
            info.residual.to_bits(),
            info.converged as u64,
        ];
    }

    let world = grid.world();
    broadcast(world, 0, Tag::BCAST, as_bytes_mut(&mut x))?;
    broadcast(world, 0, Tag::BCAST, as_bytes_mut(&mut meta))?;
    let info = SolveInfo {
        iterations: meta[0] as usize,
        residual: f64::from_bits(meta[1]),
        converged: meta[2] != 0,
    };
    if !info.converged {
        log::warn!(
            target: "hplai",
            "refinement stopped after {} steps with scaled residual {:e}",
            info.iterations,
            info.residual,
        );
    }
    Ok((x, info))
}
