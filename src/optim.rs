// Copyright 2025- adalpc-rs developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Constrained quadratic minimization for prediction coefficients.
//!
//! The coefficient vector `c` (with `c[0]` pinned at -1) is refined every
//! block so that `c` approximately minimizes `cᵀ Q c` for the current
//! quadratic-form matrix `Q`. With `A = Q[1:, 1:]` and `b = Q[0, 1:]` this
//! is the unconstrained problem `min_x xᵀAx - 2xᵀb` over `x = c[1:]`,
//! solved with a few iterations of preconditioned conjugate gradient,
//! warm-started from the previous block's coefficients.

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::config;
use super::constant::minimizer::LOADING_WIDENING;
use super::constant::minimizer::MAX_LOADING_RETRIES;
use super::error::AnalysisError;
use super::toeplitz;

/// Preconditioner strategy for the CG iteration.
///
/// `ToeplitzInverse` applies the inverse of the Toeplitz matrix implied by
/// the long-horizon autocorrelation statistics, a smoother estimate of the
/// curvature than the windowed quadratic form itself. `Identity` disables
/// preconditioning and exists for differential testing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Preconditioner {
    Identity,
    ToeplitzInverse,
}

/// Coefficient solver configured for one stream.
#[derive(Clone, Debug)]
pub struct CoeffOptimizer {
    order: usize,
    max_iters: usize,
    convergence_threshold: f64,
    preconditioner: Preconditioner,
    diagonal_loading: f64,
}

impl CoeffOptimizer {
    /// Constructs an optimizer for the given prediction order.
    pub fn new(order: usize, config: &config::Minimizer) -> Self {
        Self {
            order,
            max_iters: config.max_iters,
            convergence_threshold: config.convergence_threshold,
            preconditioner: config.preconditioner,
            diagonal_loading: config.diagonal_loading,
        }
    }

    /// Returns the configured prediction order.
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Refines `coeffs[1..=order_limit]` in place.
    ///
    /// `quad_mat` is the (DC-corrected) quadratic-form matrix and
    /// `autocorr` the matching long-horizon autocorrelation used for
    /// preconditioning. `order_limit` truncates the problem to a leading
    /// sub-block so that only a coefficient prefix moves during the
    /// startup order ramp; coefficients past the prefix keep their
    /// previous values.
    ///
    /// On error the coefficient vector is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::IllConditioned`] when the sub-problem is
    /// not positive definite, and [`AnalysisError::SingularSystem`] when
    /// the Toeplitz preconditioner stays singular after all
    /// loading-widening retries.
    ///
    /// # Panics
    ///
    /// Panics if `coeffs` or `autocorr` is shorter than `order + 1`, or if
    /// `quad_mat` is smaller than `(order + 1) × (order + 1)`.
    pub fn optimize(
        &self,
        coeffs: &mut [f64],
        quad_mat: &nalgebra::DMatrix<f64>,
        autocorr: &[f64],
        order_limit: usize,
    ) -> Result<(), AnalysisError> {
        self.minimize(coeffs, quad_mat, autocorr, order_limit, None)
    }

    fn minimize(
        &self,
        coeffs: &mut [f64],
        quad_mat: &nalgebra::DMatrix<f64>,
        autocorr: &[f64],
        order_limit: usize,
        mut residual_trace: Option<&mut Vec<f64>>,
    ) -> Result<(), AnalysisError> {
        assert!(coeffs.len() > self.order);
        assert!(autocorr.len() > self.order);
        assert!(quad_mat.nrows() > self.order && quad_mat.ncols() > self.order);
        debug_assert!(
            (coeffs[0] + 1.0).abs() < f64::EPSILON,
            "{}",
            crate::constant::panic_msg::DATA_INCONSISTENT
        );

        let n = order_limit.min(self.order);
        if n == 0 {
            return Ok(());
        }

        let a = quad_mat.view((1, 1), (n, n));
        let b = nalgebra::DVector::from_fn(n, |i, _| quad_mat[(0, i + 1)]);
        let mut x = nalgebra::DVector::from_fn(n, |i, _| coeffs[i + 1]);

        let mut r = b;
        r.gemv(-1.0, &a, &x, 1.0);
        let mut z = nalgebra::DVector::zeros(n);
        self.apply_preconditioner(autocorr, &r, &mut z)?;

        let mut rs_old = r.dot(&z);
        let rs_orig = rs_old;
        if rs_orig == 0.0 {
            // Warm start already at the optimum; nothing to refine.
            return Ok(());
        }
        if rs_orig < 0.0 {
            return Err(AnalysisError::IllConditioned { curvature: rs_orig });
        }

        let mut p = z.clone();
        let mut ap = nalgebra::DVector::zeros(n);
        for _iter in 0..self.max_iters {
            ap.gemv(1.0, &a, &p, 0.0);
            let curvature = p.dot(&ap);
            if curvature <= 0.0 {
                return Err(AnalysisError::IllConditioned { curvature });
            }
            let alpha = rs_old / curvature;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);
            self.apply_preconditioner(autocorr, &r, &mut z)?;
            let rs_new = r.dot(&z);
            debug_assert!(
                rs_new.is_finite(),
                "{}",
                crate::constant::panic_msg::DATA_INCONSISTENT
            );
            if let Some(trace) = residual_trace.as_mut() {
                trace.push(rs_new / rs_orig);
            }
            if rs_new / rs_orig < self.convergence_threshold {
                break;
            }
            p *= rs_new / rs_old;
            p += &z;
            rs_old = rs_new;
        }

        for (i, value) in x.iter().enumerate() {
            coeffs[i + 1] = *value;
        }
        Ok(())
    }

    /// Applies the inverse of the preconditioner to `r`, storing into `z`.
    ///
    /// For the Toeplitz strategy the zero-lag term is loaded by
    /// `diagonal_loading` relative to its magnitude; when the implied
    /// system is still singular the loading is widened by a fixed factor
    /// and the solve retried a bounded number of times.
    fn apply_preconditioner(
        &self,
        autocorr: &[f64],
        r: &nalgebra::DVector<f64>,
        z: &mut nalgebra::DVector<f64>,
    ) -> Result<(), AnalysisError> {
        match self.preconditioner {
            Preconditioner::Identity => {
                z.copy_from(r);
                Ok(())
            }
            Preconditioner::ToeplitzInverse => {
                let n = r.len();
                let mut lag = autocorr[..n].to_vec();
                let mut loading = self.diagonal_loading;
                let mut last_err = AnalysisError::SingularSystem { order: 0 };
                for _retry in 0..=MAX_LOADING_RETRIES {
                    lag[0] = autocorr[0] + autocorr[0].abs() * loading;
                    match toeplitz::solve_symmetric(&lag, r.as_slice(), z.as_mut_slice()) {
                        Ok(()) => return Ok(()),
                        Err(err) => {
                            last_err = err;
                            loading = if loading > 0.0 {
                                loading * LOADING_WIDENING
                            } else {
                                f64::EPSILON
                            };
                        }
                    }
                }
                Err(last_err)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::assert_close;
    use crate::config;
    use crate::test_helper;
    use crate::toeplitz::toeplitz_matrix;

    use rand::Rng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn optimizer(order: usize, preconditioner: Preconditioner, max_iters: usize) -> CoeffOptimizer {
        CoeffOptimizer::new(
            order,
            &config::Minimizer {
                max_iters,
                preconditioner,
                ..config::Minimizer::default()
            },
        )
    }

    /// Builds a positive-definite quadratic form from an autocorrelation
    /// vector, mimicking the stats the driver feeds in.
    fn quad_from_autocorr(r: &[f64]) -> nalgebra::DMatrix<f64> {
        toeplitz_matrix(r)
    }

    #[rstest]
    fn recovers_exact_solution(
        #[values(Preconditioner::Identity, Preconditioner::ToeplitzInverse)]
        preconditioner: Preconditioner,
    ) {
        let order = 6;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xbeef);
        let autocorr = test_helper::random_autocorr(&mut rng, order + 1);
        let quad = quad_from_autocorr(&autocorr);

        // Plenty of iterations and a tight threshold recover the exact
        // constrained minimizer.
        let opt = optimizer(order, preconditioner, 32);
        let mut coeffs = vec![0.0f64; order + 1];
        coeffs[0] = -1.0;
        opt.optimize(&mut coeffs, &quad, &autocorr, order)
            .expect("problem is positive definite");

        let a = quad.view((1, 1), (order, order));
        let b = nalgebra::DVector::from_fn(order, |i, _| quad[(0, i + 1)]);
        let expected = a
            .into_owned()
            .cholesky()
            .expect("A is positive definite")
            .solve(&b);
        for i in 0..order {
            assert_close!(coeffs[i + 1], expected[i], rtol = 1e-6, atol = 1e-8);
        }
        assert_eq!(coeffs[0], -1.0);
    }

    #[test]
    fn residual_ratio_is_non_increasing() {
        let order = 8;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xfeed);
        let autocorr = test_helper::random_autocorr(&mut rng, order + 1);
        let quad = quad_from_autocorr(&autocorr);
        // Precondition with a detuned copy of the curvature so that
        // convergence takes several observable iterations.
        let detuned: Vec<f64> = autocorr
            .iter()
            .enumerate()
            .map(|(i, &v)| v * 0.8f64.powi(i as i32))
            .collect();

        let opt = CoeffOptimizer::new(
            order,
            &config::Minimizer {
                max_iters: 16,
                // Keep iterating; this test watches the whole trace.
                convergence_threshold: 1e-300,
                preconditioner: Preconditioner::ToeplitzInverse,
                ..config::Minimizer::default()
            },
        );
        let mut coeffs = vec![0.0f64; order + 1];
        coeffs[0] = -1.0;
        let mut trace = vec![];
        opt.minimize(&mut coeffs, &quad, &detuned, order, Some(&mut trace))
            .expect("problem is positive definite");

        assert!(!trace.is_empty());
        // Monotonicity is only meaningful above the round-off floor.
        let floor = 1e-12;
        let mut prev = 1.0f64;
        for &ratio in &trace {
            if prev > floor && ratio > floor {
                assert!(
                    ratio <= prev * (1.0 + 1e-9),
                    "residual ratio increased: {:?}",
                    trace
                );
            }
            prev = ratio;
        }
        assert!(trace.last().copied().unwrap() < 1e-3);
    }

    #[test]
    fn warm_start_converges_faster() {
        let order = 8;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xcafe);
        let autocorr = test_helper::random_autocorr(&mut rng, order + 1);
        let quad = quad_from_autocorr(&autocorr);

        let opt = optimizer(order, Preconditioner::ToeplitzInverse, 32);
        let mut coeffs = vec![0.0f64; order + 1];
        coeffs[0] = -1.0;
        opt.optimize(&mut coeffs, &quad, &autocorr, order)
            .expect("problem is positive definite");
        let converged = coeffs.clone();

        // Re-running from the converged point must terminate immediately
        // and leave the solution in place.
        let single_step = optimizer(order, Preconditioner::ToeplitzInverse, 1);
        single_step
            .optimize(&mut coeffs, &quad, &autocorr, order)
            .expect("problem is positive definite");
        for i in 0..=order {
            assert_close!(coeffs[i], converged[i], rtol = 1e-6, atol = 1e-9);
        }
    }

    #[test]
    fn order_limit_freezes_suffix() {
        let order = 10;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x0a0a);
        let autocorr = test_helper::random_autocorr(&mut rng, order + 1);
        let quad = quad_from_autocorr(&autocorr);

        let opt = optimizer(order, Preconditioner::ToeplitzInverse, 8);
        let mut coeffs = vec![0.0f64; order + 1];
        coeffs[0] = -1.0;
        for i in 1..=order {
            coeffs[i] = 100.0 + i as f64;
        }
        let limit = 4;
        opt.optimize(&mut coeffs, &quad, &autocorr, limit)
            .expect("problem is positive definite");

        for i in (limit + 1)..=order {
            assert_eq!(coeffs[i], 100.0 + i as f64);
        }
        for i in 1..=limit {
            assert!(coeffs[i].abs() < 100.0);
        }
    }

    #[test]
    fn zero_order_limit_is_a_no_op() {
        let order = 4;
        let autocorr = [4.0, 1.0, 0.5, 0.25, 0.125];
        let quad = quad_from_autocorr(&autocorr);
        let opt = optimizer(order, Preconditioner::ToeplitzInverse, 4);
        let mut coeffs = [-1.0, 0.5, 0.25, 0.0, 0.0];
        let before = coeffs;
        opt.optimize(&mut coeffs, &quad, &autocorr, 0)
            .expect("no-op cannot fail");
        assert_eq!(coeffs, before);
    }

    #[test]
    fn indefinite_form_is_reported() {
        let order = 1;
        let quad = nalgebra::DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, -1.0]);
        let autocorr = [1.0, 0.0];
        let opt = optimizer(order, Preconditioner::Identity, 4);
        let mut coeffs = [-1.0, 0.0];
        let err = opt.optimize(&mut coeffs, &quad, &autocorr, order).unwrap_err();
        assert!(matches!(err, AnalysisError::IllConditioned { .. }));
        // The coefficient vector must be left untouched on failure.
        assert_eq!(coeffs, [-1.0, 0.0]);
    }

    #[test]
    fn singular_preconditioner_is_loaded_until_solvable() {
        let order = 2;
        // The unloaded system [[1, 1], [1, 1]] is singular; loading the
        // zero-lag term must make it solvable.
        let autocorr = [1.0, 1.0, 0.0];
        let quad = quad_from_autocorr(&[2.0, 0.5, 0.1]);
        let opt = CoeffOptimizer::new(
            order,
            &config::Minimizer {
                preconditioner: Preconditioner::ToeplitzInverse,
                // Start with no loading at all so the widening path runs.
                diagonal_loading: 0.0,
                ..config::Minimizer::default()
            },
        );
        let mut coeffs = [-1.0, 0.0, 0.0];
        opt.optimize(&mut coeffs, &quad, &autocorr, order)
            .expect("loading widening makes the preconditioner regular");
        assert_eq!(coeffs[0], -1.0);
    }

    #[test]
    fn random_problems_keep_constraint() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xd00d);
        for order in [1usize, 3, 9, 17] {
            let autocorr = test_helper::random_autocorr(&mut rng, order + 1);
            let quad = quad_from_autocorr(&autocorr);
            let opt = optimizer(order, Preconditioner::ToeplitzInverse, 3);
            let mut coeffs = vec![0.0f64; order + 1];
            coeffs[0] = -1.0;
            for c in coeffs.iter_mut().skip(1) {
                *c = rng.gen_range(-0.1..0.1);
            }
            opt.optimize(&mut coeffs, &quad, &autocorr, order)
                .expect("problem is positive definite");
            assert_eq!(coeffs[0], -1.0);
        }
    }
}
