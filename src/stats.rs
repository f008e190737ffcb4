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

//! Decaying autocorrelation and quadratic-form statistics.
//!
//! [`StatsAccumulator`] maintains, over a streaming signal, the windowed
//! sum of outer products of lag-augmented sample vectors (`quad_mat`), a
//! longer-horizon autocorrelation estimate, and the zero/linear moments
//! used to track a running DC offset. All quantities decay by a
//! multiplicative factor once per block, so the memory footprint stays
//! `O(order²)` for arbitrarily long streams.

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::config;
use super::error::AnalysisError;

/// Strategy for maintaining the statistics.
///
/// `Incremental` exploits the almost-Toeplitz structure of the block's
/// contribution and costs `O(block·order + order²)` per update.
/// `Direct` recomputes the identical quantities with plain per-sample
/// loops (`O(block·order²)` with an `O(order³)` edge pass) and exists so
/// that tests can diff the two.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UpdateMode {
    Direct,
    Incremental,
}

/// Decayed second-order statistics of a streaming signal.
#[derive(Clone, Debug)]
pub struct StatsAccumulator {
    order: usize,
    mode: UpdateMode,
    reflection_weight: f64,
    /// Symmetric `(order+1)×(order+1)` windowed sum of outer products of
    /// lag-augmented sample vectors, with block-edge corrections applied.
    quad_mat: nalgebra::DMatrix<f64>,
    /// Long-horizon decayed lag sums, one per lag `0..=order`.
    autocorr: Vec<f64>,
    /// Effective decayed sample count contributing to each lag of
    /// `autocorr`; used to correct for DC bias.
    loading: Vec<f64>,
    /// Decayed count of samples in the window.
    sample_count: f64,
    /// Decayed sum of samples in the window.
    sample_sum: f64,
    // Scratch lag sums for the current block.
    within: Vec<f64>,
    cross: Vec<f64>,
}

impl StatsAccumulator {
    /// Constructs an empty accumulator for the given prediction order.
    pub fn new(order: usize, config: &config::Stats) -> Self {
        let size = order + 1;
        Self {
            order,
            mode: config.update,
            reflection_weight: config.reflection_weight,
            quad_mat: nalgebra::DMatrix::zeros(size, size),
            autocorr: vec![0.0; size],
            loading: vec![0.0; size],
            sample_count: 0.0,
            sample_sum: 0.0,
            within: vec![0.0; size],
            cross: vec![0.0; size],
        }
    }

    /// Returns the prediction order.
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Returns the quadratic-form matrix.
    pub const fn quad_mat(&self) -> &nalgebra::DMatrix<f64> {
        &self.quad_mat
    }

    /// Returns the long-horizon autocorrelation estimate.
    pub fn autocorr(&self) -> &[f64] {
        &self.autocorr
    }

    /// Returns the effective sample count behind each autocorrelation lag.
    pub fn loading(&self) -> &[f64] {
        &self.loading
    }

    /// Returns the decayed number of samples in the window.
    pub const fn sample_count(&self) -> f64 {
        self.sample_count
    }

    /// Returns the decayed sum of samples in the window.
    pub const fn sample_sum(&self) -> f64 {
        self.sample_sum
    }

    /// Folds one completed block into the statistics.
    ///
    /// `samples` is the analysis window: the `order` samples immediately
    /// preceding the block, followed by the block itself. For the first
    /// block of a stream (`first_block == true`) the leading samples must
    /// be the actual start of the signal; lag products confined to that
    /// prefix, which the windowing convention would otherwise drop, are
    /// then folded in as well.
    ///
    /// All previously accumulated statistics are scaled by `decay` before
    /// the new contributions are added.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InsufficientHistory`] if `samples` is too
    /// short to contain a single fully-windowed sample.
    ///
    /// # Panics
    ///
    /// Panics if the block part of the window is shorter than the order,
    /// or if `decay` is outside `(0, 1]`.
    pub fn update(
        &mut self,
        samples: &[f64],
        first_block: bool,
        decay: f64,
    ) -> Result<(), AnalysisError> {
        let order = self.order;
        let size = order + 1;
        if samples.len() < size {
            return Err(AnalysisError::InsufficientHistory {
                required: size,
                actual: samples.len(),
            });
        }
        let t_start = order;
        let t_end = samples.len();
        assert!(
            t_end - t_start >= order,
            "block must hold at least `order` samples"
        );
        assert!(decay > 0.0 && decay <= 1.0);

        self.sample_count *= decay;
        self.sample_sum *= decay;
        self.quad_mat *= decay;
        for p in self.autocorr.iter_mut() {
            *p *= decay;
        }
        for p in self.loading.iter_mut() {
            *p *= decay;
        }

        self.sample_count += (t_end - t_start) as f64;
        self.sample_sum += samples[t_start..].iter().sum::<f64>();

        // Lag sums over the block, split by whether the earlier index of
        // the product still falls inside the block.
        self.within.fill(0.0);
        self.cross.fill(0.0);
        for i in 0..order {
            let x = samples[t_start + i];
            for j in 0..=i {
                self.within[j] += x * samples[t_start + i - j];
            }
            for j in (i + 1)..size {
                self.cross[j] += x * samples[t_start + i - j];
            }
        }
        for t in (t_start + order)..t_end {
            for i in 0..size {
                self.within[i] += samples[t] * samples[t - i];
            }
        }

        self.update_autocorr(samples, first_block, decay);
        self.update_quad_mat(samples);
        Ok(())
    }

    /// Updates the long-horizon autocorrelation estimate and its loading.
    ///
    /// Cross-block products mix a decayed past sample with a fresh one, so
    /// they enter at the geometric mean `sqrt(decay)` of the two regimes.
    /// Virtual products mirroring the signal across the closing block
    /// boundary are added at `reflection_weight` to counter the truncation
    /// bias of the finite window; they are removed again by the next
    /// update once the real continuation is known.
    fn update_autocorr(&mut self, samples: &[f64], first_block: bool, decay: f64) {
        let order = self.order;
        let size = order + 1;
        let t_start = order;
        let t_end = samples.len();
        let sqrt_decay = decay.sqrt();
        let w = self.reflection_weight;

        if !first_block {
            for i in 0..order {
                for j in (i + 1)..order {
                    self.autocorr[j] -= w * samples[t_start - (j - i)] * samples[t_start - 1 - i];
                    self.loading[j] -= w;
                }
            }
        }

        match self.mode {
            UpdateMode::Incremental => {
                if first_block {
                    // Products confined to the first `order` samples, which
                    // the window convention drops everywhere else.
                    for i in 0..order {
                        for j in 0..=i {
                            self.autocorr[j] += samples[i] * samples[i - j];
                        }
                    }
                    for i in 0..size {
                        self.autocorr[i] += self.cross[i] + self.within[i];
                    }
                } else {
                    for i in 0..size {
                        self.autocorr[i] += self.cross[i] * sqrt_decay + self.within[i];
                    }
                }

                let local_start = if first_block { 0 } else { t_start };
                let num_samples = (t_end - local_start) as f64;
                for i in 0..size {
                    self.loading[i] += num_samples - i as f64;
                    if !first_block {
                        self.loading[i] += sqrt_decay * i as f64;
                    }
                }
            }
            UpdateMode::Direct => {
                let local_start = if first_block { 0 } else { t_start };
                for t in local_start..t_end {
                    for i in 0..size {
                        if t < i {
                            continue;
                        }
                        let t_prev = t - i;
                        if t_prev >= local_start {
                            self.autocorr[i] += samples[t] * samples[t_prev];
                            self.loading[i] += 1.0;
                        } else {
                            self.autocorr[i] += samples[t] * samples[t_prev] * sqrt_decay;
                            self.loading[i] += sqrt_decay;
                        }
                    }
                }
            }
        }

        for i in 0..order {
            for j in (i + 1)..order {
                self.autocorr[j] += w * samples[t_end - (j - i)] * samples[t_end - 1 - i];
                self.loading[j] += w;
            }
        }
    }

    /// Folds the block's lag sums into `quad_mat` and applies the
    /// block-edge corrections.
    ///
    /// The Toeplitz fold over-counts products whose later time index
    /// spills past the block end, and drops the previous block's tail
    /// products that belong to this window; the two correction passes
    /// repair both, touching only the upper triangle, which is then
    /// mirrored.
    fn update_quad_mat(&mut self, samples: &[f64]) {
        let order = self.order;
        let size = order + 1;
        let t_start = order;
        let t_end = samples.len();

        for i in 0..size {
            for j in 0..size {
                let lag = i.abs_diff(j);
                self.quad_mat[(i, j)] += self.within[lag] + self.cross[lag];
            }
        }

        match self.mode {
            UpdateMode::Incremental => {
                // Running partial sums over a shifted index turn the cubic
                // edge passes into O(order²).
                for j in 0..order {
                    let mut acc = 0.0;
                    for i in 1..(size - j) {
                        acc += samples[t_start - i] * samples[t_start - i - j];
                        self.quad_mat[(i, i + j)] += acc;
                    }
                }
                for j in 0..order {
                    let mut acc = 0.0;
                    for i in 1..(size - j) {
                        acc += samples[t_end - i] * samples[t_end - i - j];
                        self.quad_mat[(i, i + j)] -= acc;
                    }
                }
            }
            UpdateMode::Direct => {
                for k in 0..order {
                    let t = t_start + k;
                    for i in (k + 1)..size {
                        for j in i..size {
                            self.quad_mat[(i, j)] += samples[t - i] * samples[t - j];
                        }
                    }
                }
                for k in 0..order {
                    // Virtual time beyond the window end; every resolved
                    // index stays inside it.
                    let t = t_end + k;
                    for i in (k + 1)..size {
                        for j in i..size {
                            self.quad_mat[(i, j)] -= samples[t - i] * samples[t - j];
                        }
                    }
                }
            }
        }

        for i in 0..size {
            for j in 0..i {
                self.quad_mat[(i, j)] = self.quad_mat[(j, i)];
            }
        }
    }
}
