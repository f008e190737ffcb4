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

#![allow(clippy::missing_panics_doc)]

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use rand::Rng;

use super::sigen;
use super::sigen::Signal;

#[macro_export]
macro_rules! assert_close {
    ($actual:expr, $expected:expr, rtol = $rtol:expr, atol = $atol:expr) => {{
        let actual = $actual;
        let expected = $expected;
        let err = (actual - expected).abs();
        #[allow(clippy::suboptimal_flops)]
        let tol = $rtol * (expected).abs() + $atol;
        assert!(
            err < tol,
            "assert_close failed: actual={}, expected={}",
            actual,
            expected
        );
    }};
    ($actual:expr, $expected:expr) => {{
        assert_close!($actual, $expected, rtol = 0.00001, atol = 0.00001);
    }};
}

#[macro_export]
macro_rules! assert_finite {
    ($result:expr) => {{
        for (i, &value) in $result.iter().enumerate() {
            assert!(
                value.is_normal() || value == 0.0,
                "{}-th element in a vector is not finite ({}), x={:?}.",
                i,
                value,
                $result
            );
        }
    }};
}

static TEST_SIGNALS: Lazy<BTreeMap<(&str, usize), Vec<f64>>> = Lazy::new(|| {
    BTreeMap::from([
        (
            ("ar2", 0),
            sigen::AutoRegressive::new(&[0.4, -0.2], 1.0, 1000).to_vec(8192),
        ),
        (
            ("ar2", 1),
            sigen::AutoRegressive::new(&[0.4, -0.2], 1.0, 1001).to_vec(8192),
        ),
        (
            ("sine_noise", 0),
            sigen::Sine::new(50, 0.7)
                .noise_with_seed(123, 0.05)
                .to_vec(8192),
        ),
    ])
});

/// Loads a monaural test signal by key and the channel specifier.
pub fn test_signal(src: &str, ch: usize) -> Vec<f64> {
    TEST_SIGNALS
        .get(&(src, ch))
        .expect("Specified test signal not found.")
        .clone()
}

/// Computes the quadratic-form matrix by brute force.
///
/// Entry (i, j) is the sum of `signal[t - i] * signal[t - j]` over
/// `t` in `[order, t_end)`, the oracle that the incremental accumulator
/// must reproduce when the decay is 1.
pub fn brute_force_quad_mat(
    signal: &[f64],
    order: usize,
    t_end: usize,
) -> nalgebra::DMatrix<f64> {
    let size = order + 1;
    let mut quad = nalgebra::DMatrix::zeros(size, size);
    for t in order..t_end {
        for i in 0..size {
            for j in 0..size {
                quad[(i, j)] += signal[t - i] * signal[t - j];
            }
        }
    }
    quad
}

/// Draws an autocorrelation vector of a random nonzero signal.
///
/// The result defines a positive-definite Toeplitz matrix (up to a tiny
/// loading on the zero-lag term that keeps the minors away from zero).
pub fn random_autocorr<R: Rng>(rng: &mut R, len: usize) -> Vec<f64> {
    let signal: Vec<f64> = (0..len * 8).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let mut r = vec![0.0f64; len];
    for lag in 0..len {
        for t in lag..signal.len() {
            r[lag] += signal[t] * signal[t - lag];
        }
    }
    r[0] *= 1.0 + 1e-6;
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn random_autocorr_is_positive_definite() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x1234);
        let r = random_autocorr(&mut rng, 12);
        let matrix = crate::toeplitz::toeplitz_matrix(&r);
        assert!(matrix.cholesky().is_some());
    }

    #[test]
    fn brute_force_quad_mat_on_short_signal() {
        let signal = [1.0, 2.0, 3.0, 4.0];
        let quad = brute_force_quad_mat(&signal, 1, 4);
        // t runs over {1, 2, 3}.
        assert_eq!(quad[(0, 0)], 4.0 + 9.0 + 16.0);
        assert_eq!(quad[(0, 1)], 2.0 + 6.0 + 12.0);
        assert_eq!(quad[(1, 1)], 1.0 + 4.0 + 9.0);
        assert_eq!(quad[(1, 0)], quad[(0, 1)]);
    }
}
