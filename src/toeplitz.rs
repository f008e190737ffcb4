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

//! Solver for symmetric Toeplitz linear systems.
//!
//! Unlike the Levinson-Durbin recursion commonly used for normal equations
//! in LPC analysis, the generalized Levinson-Trench-Zohar recursion
//! implemented here accepts an arbitrary right-hand side. This is needed
//! because the preconditioner application inside the coefficient solver
//! multiplies an arbitrary residual vector by the inverse of the
//! autocorrelation Toeplitz matrix.

use super::error::AnalysisError;

/// Builds the dense symmetric Toeplitz matrix defined by `r`.
///
/// The (i, j)-th element of the result is `r[(i - j).abs()]`.
pub fn toeplitz_matrix(r: &[f64]) -> nalgebra::DMatrix<f64> {
    let n = r.len();
    nalgebra::DMatrix::from_fn(n, n, |i, j| r[i.abs_diff(j)])
}

/// Forward/backward predictor pair driving the order recursion.
///
/// After `advance` has been called `n` times, `a[0..=n]` and `b[0..=n]`
/// solve the order-`n` forward and backward prediction problems for the
/// Toeplitz matrix defined by `r`, and `epsilon` is the corresponding
/// prediction-error energy.
struct Recursion {
    a: Vec<f64>,
    b: Vec<f64>,
    a_next: Vec<f64>,
    b_next: Vec<f64>,
    epsilon: f64,
    order: usize,
}

impl Recursion {
    fn new(r: &[f64]) -> Result<Self, AnalysisError> {
        let epsilon = r[0];
        if !epsilon.is_finite() || epsilon == 0.0 {
            return Err(AnalysisError::SingularSystem { order: 0 });
        }
        let mut a = vec![0.0f64; r.len()];
        let mut b = vec![0.0f64; r.len()];
        a[0] = 1.0;
        b[0] = 1.0;
        Ok(Self {
            a,
            b,
            a_next: vec![0.0f64; r.len()],
            b_next: vec![0.0f64; r.len()],
            epsilon,
            order: 0,
        })
    }

    /// Extends the predictor pair from order `self.order` to the next one.
    ///
    /// Returns the two reflection-like scalars `(xi, nu)` of the step. For
    /// a symmetric system the two are analytically equal; both are still
    /// computed and used in the coupled update, and tests check their
    /// near-equality instead of assuming it.
    fn advance(&mut self, r: &[f64]) -> Result<(f64, f64), AnalysisError> {
        let n = self.order + 1;

        let xi: f64 = -r[1..=n]
            .iter()
            .rev()
            .zip(self.a.iter())
            .map(|(x, y)| x * y)
            .sum::<f64>()
            / self.epsilon;
        let nu: f64 = -r[1..=n]
            .iter()
            .zip(self.b.iter())
            .map(|(x, y)| x * y)
            .sum::<f64>()
            / self.epsilon;

        // Coupled update: each new vector is the old one plus a scaled,
        // shifted copy of the other.
        self.a_next[..n].copy_from_slice(&self.a[..n]);
        self.a_next[n] = 0.0;
        for d in 1..=n {
            self.a_next[d] += xi * self.b[d - 1];
        }
        self.b_next[0] = 0.0;
        for d in 1..=n {
            self.b_next[d] = self.b[d - 1];
        }
        for d in 0..n {
            self.b_next[d] += nu * self.a[d];
        }
        self.a[..=n].copy_from_slice(&self.a_next[..=n]);
        self.b[..=n].copy_from_slice(&self.b_next[..=n]);

        self.epsilon *= 1.0 - xi * nu;
        if !self.epsilon.is_finite() || self.epsilon == 0.0 {
            return Err(AnalysisError::SingularSystem { order: n });
        }
        self.order = n;
        Ok((xi, nu))
    }
}

/// Solves "y = T x" where T is the symmetric Toeplitz matrix with the given
/// autocorrelation-like coefficients.
///
/// The (i, j)-th element of "T" is defined by `r[(i - j).abs()]`, and the
/// i-th element of "y" is defined as `y[i]`. The solution "x" will be
/// stored in `dest`.
///
/// # Errors
///
/// Returns [`AnalysisError::SingularSystem`] when a leading principal minor
/// of the system is numerically singular, i.e. the recursion's
/// prediction-error energy becomes zero or non-finite.
///
/// # Panics
///
/// Panics if `dest` or `r` is shorter than `y`, or if `y` is empty.
pub fn solve_symmetric(r: &[f64], y: &[f64], dest: &mut [f64]) -> Result<(), AnalysisError> {
    assert!(!y.is_empty());
    assert!(dest.len() >= y.len());
    assert!(r.len() >= y.len());

    for p in dest.iter_mut() {
        *p = 0.0;
    }

    let mut recursion = Recursion::new(r)?;
    dest[0] = y[0] / recursion.epsilon;

    for n in 1..y.len() {
        recursion.advance(r)?;

        let delta: f64 = r[1..=n]
            .iter()
            .rev()
            .zip(dest.iter())
            .map(|(x, y)| x * y)
            .sum();
        let lambda = (y[n] - delta) / recursion.epsilon;
        for d in 0..=n {
            dest[d] += lambda * recursion.b[d];
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::assert_close;
    use crate::test_helper;

    use rand::Rng;
    use rand::SeedableRng;
    use rstest::rstest;

    #[test]
    fn known_small_system() {
        let r: [f64; 4] = [1.0, 0.5, 0.0, 0.25];
        let y: [f64; 4] = [1.0, -1.0, 1.0, -1.0];
        let expect_x: [f64; 4] = [8.0, -10.0, 10.0, -8.0];

        let mut x: [f64; 4] = [0.0; 4];
        solve_symmetric(&r, &y, &mut x).expect("system is regular");
        eprintln!("Found solution = {:?}", x);
        for (actual, expected) in x.iter().zip(expect_x.iter()) {
            assert_close!(actual, expected);
        }
    }

    #[rstest]
    fn random_round_trip(#[values(1, 2, 8, 16, 31)] order: usize) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x7031 + order as u64);
        let r = test_helper::random_autocorr(&mut rng, order + 1);
        let x_ref: Vec<f64> = (0..=order).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let a = toeplitz_matrix(&r);
        let y = &a * nalgebra::DVector::from_column_slice(&x_ref);

        let mut x = vec![0.0f64; order + 1];
        solve_symmetric(&r, y.as_slice(), &mut x).expect("system is regular");
        for (actual, expected) in x.iter().zip(x_ref.iter()) {
            assert_close!(actual, expected, rtol = 1e-6, atol = 1e-8);
        }
    }

    #[test]
    fn residual_vs_dense_solver() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xa5a5);
        let r = test_helper::random_autocorr(&mut rng, 9);
        let y: Vec<f64> = (0..9).map(|_| rng.gen_range(-2.0..2.0)).collect();

        let mut x = vec![0.0f64; 9];
        solve_symmetric(&r, &y, &mut x).expect("system is regular");

        let a = toeplitz_matrix(&r);
        let reconstructed = &a * nalgebra::DVector::from_column_slice(&x);
        for (actual, expected) in reconstructed.iter().zip(y.iter()) {
            assert_close!(actual, expected, rtol = 1e-8, atol = 1e-8);
        }
    }

    #[test]
    fn reflection_scalars_agree_for_symmetric_systems() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        let r = test_helper::random_autocorr(&mut rng, 13);

        let mut recursion = Recursion::new(&r).expect("zero lag term is nonzero");
        for _n in 1..r.len() {
            let (xi, nu) = recursion.advance(&r).expect("system is regular");
            assert_close!(xi, nu, rtol = 1e-9, atol = 1e-9);
        }
    }

    #[test]
    fn singular_minor_is_reported() {
        // The order-1 leading minor [[1, 1], [1, 1]] is singular.
        let r = [1.0, 1.0, 0.5];
        let y = [1.0, 2.0, 3.0];
        let mut x = [0.0f64; 3];
        let err = solve_symmetric(&r, &y, &mut x).unwrap_err();
        assert_eq!(err, AnalysisError::SingularSystem { order: 1 });
    }

    #[test]
    fn zero_energy_is_reported() {
        let r = [0.0, 0.0];
        let y = [1.0, 1.0];
        let mut x = [0.0f64; 2];
        let err = solve_symmetric(&r, &y, &mut x).unwrap_err();
        assert_eq!(err, AnalysisError::SingularSystem { order: 0 });
    }
}
