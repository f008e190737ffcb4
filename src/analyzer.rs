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

//! Per-stream analysis driver.
//!
//! [`StreamAnalyzer`] owns the statistics accumulator and the coefficient
//! solver for one channel, cycles them once per completed block, and
//! exposes the current coefficients together with residual-energy
//! diagnostics. The coefficients exposed after a block completes are
//! always derived from statistics that exclude the block that will be
//! scored with them next, so a caller that predicts the upcoming block
//! with `coefficients()` never uses information from that block.

use super::config;
use super::constant::analysis::SILENCE_ENERGY;
use super::constant::minimizer::ORDER_RAMP_BLOCKS;
use super::constant::minimizer::ORDER_RAMP_SAMPLES_PER_ORDER;
use super::constant::panic_msg;
use super::constant::MAX_COEFS;
use super::error::Verify;
use super::error::VerifyError;
use super::optim::CoeffOptimizer;
use super::stats::StatsAccumulator;

/// Cumulative residual-energy diagnostics of a stream.
///
/// `predicted_energy` accumulates the squared prediction residuals of each
/// scored block; `raw_energy` accumulates the squared samples. The ratio
/// of the two is a health indicator of the predictor, not an input to any
/// computation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Diagnostics {
    /// Cumulative energy of the prediction residual over scored blocks.
    pub predicted_energy: f64,
    /// Cumulative energy of the raw samples over scored blocks.
    pub raw_energy: f64,
}

impl Diagnostics {
    /// Returns `predicted_energy / raw_energy`, or `None` before any
    /// non-silent block was scored.
    pub fn energy_ratio(&self) -> Option<f64> {
        (self.raw_energy > 0.0).then(|| self.predicted_energy / self.raw_energy)
    }
}

/// Online block-adaptive LPC analyzer for a single channel.
#[derive(Clone, Debug)]
pub struct StreamAnalyzer {
    order: usize,
    block_length: usize,
    decay: f64,
    stats: StatsAccumulator,
    optimizer: CoeffOptimizer,
    /// Current whitening coefficients; element 0 is pinned at -1.
    coeffs: heapless::Vec<f64, MAX_COEFS>,
    /// Buffered samples awaiting a block boundary. Holds the `order`
    /// samples preceding the pending block plus the pending block itself.
    window: Vec<f64>,
    /// Number of samples folded into the statistics so far.
    consumed: usize,
    /// Number of completed blocks.
    blocks: usize,
    diagnostics: Diagnostics,
    // Scratch for the DC-corrected statistics.
    corrected_quad: nalgebra::DMatrix<f64>,
    corrected_autocorr: Vec<f64>,
}

impl StreamAnalyzer {
    /// Constructs an analyzer for one stream.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if `config` is not valid.
    pub fn new(config: &config::Analysis) -> Result<Self, VerifyError> {
        config.verify()?;
        let order = config.order;
        let size = order + 1;
        let mut coeffs = heapless::Vec::new();
        coeffs
            .resize(size, 0.0)
            .expect(panic_msg::COEF_CAPACITY_EXCEEDED);
        coeffs[0] = -1.0;
        Ok(Self {
            order,
            block_length: config.block_length,
            decay: config.decay,
            stats: StatsAccumulator::new(order, &config.stats),
            optimizer: CoeffOptimizer::new(order, &config.minimizer),
            coeffs,
            window: Vec::with_capacity(order + 2 * config.block_length),
            consumed: 0,
            blocks: 0,
            diagnostics: Diagnostics::default(),
            corrected_quad: nalgebra::DMatrix::zeros(size, size),
            corrected_autocorr: vec![0.0; size],
        })
    }

    /// Returns the prediction order.
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Returns the block length in samples.
    pub const fn block_length(&self) -> usize {
        self.block_length
    }

    /// Returns the number of completed blocks.
    pub const fn blocks_completed(&self) -> usize {
        self.blocks
    }

    /// Returns the number of samples folded into the statistics.
    pub const fn samples_consumed(&self) -> usize {
        self.consumed
    }

    /// Returns the current whitening coefficients.
    ///
    /// The slice has `order + 1` elements and its first element is always
    /// -1. The prediction for a sample is the dot product of the
    /// remaining elements with the immediately preceding samples, after
    /// removal of the running DC offset.
    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    /// Returns the cumulative residual-energy diagnostics.
    pub const fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Feeds samples into the analyzer.
    ///
    /// Returns the number of block boundaries crossed by this call; the
    /// coefficients are refreshed once per boundary.
    pub fn push_samples(&mut self, samples: &[f64]) -> usize {
        self.window.extend_from_slice(samples);
        let mut completed = 0;
        while self.window.len() >= self.order + self.block_length {
            self.process_block();
            completed += 1;
        }
        completed
    }

    /// Runs one block cycle: score, accumulate, solve.
    fn process_block(&mut self) {
        let window_len = self.order + self.block_length;
        let first_block = self.blocks == 0;

        self.score_block();

        self.stats
            .update(&self.window[..window_len], first_block, self.decay)
            .expect(panic_msg::DATA_INCONSISTENT);
        self.consumed += if first_block {
            window_len
        } else {
            self.block_length
        };
        self.blocks += 1;

        self.solve();

        // Keep the trailing `order` samples as history for the next block.
        self.window.drain(..self.block_length);
    }

    /// Accumulates residual-energy diagnostics for the pending block using
    /// the coefficients solved from the blocks before it.
    ///
    /// The first two blocks are not scored: the very first has no
    /// coefficients at all, and the second is predicted from a single
    /// block of statistics.
    fn score_block(&mut self) {
        if self.blocks < 2 {
            return;
        }
        let count = self.stats.sample_count();
        let offset = if count > 0.0 {
            self.stats.sample_sum() / count
        } else {
            0.0
        };
        for t in self.order..(self.order + self.block_length) {
            let x = self.window[t];
            let mut residual = 0.0;
            for (i, c) in self.coeffs.iter().enumerate() {
                residual += c * (self.window[t - i] - offset);
            }
            self.diagnostics.raw_energy += x * x;
            self.diagnostics.predicted_energy += residual * residual;
        }
    }

    /// Refreshes the coefficients from the just-updated statistics.
    ///
    /// Failures are contained here: a silent window skips the solve, and a
    /// numerically degenerate one falls back to a reduced order before
    /// giving up and keeping the previous coefficients.
    fn solve(&mut self) {
        let orig_zero = self.stats.quad_mat()[(0, 0)];
        let count = self.stats.sample_count();
        if count <= 0.0 || orig_zero <= SILENCE_ENERGY {
            #[cfg(feature = "log")]
            log::debug!(
                "block {}: silent window, keeping previous coefficients",
                self.blocks
            );
            return;
        }

        // The predictor operates on a zero-mean residual; remove the
        // window's DC contribution from both statistics.
        let mean = self.stats.sample_sum() / count;
        let dc = self.stats.sample_sum() * mean;
        self.corrected_quad.copy_from(self.stats.quad_mat());
        self.corrected_quad.add_scalar_mut(-dc);
        for (p, (&a, &l)) in self.corrected_autocorr.iter_mut().zip(
            self.stats
                .autocorr()
                .iter()
                .zip(self.stats.loading().iter()),
        ) {
            *p = a - mean * mean * l;
        }

        let limit = self.ramp_limit();
        let mut result = self.optimizer.optimize(
            &mut self.coeffs,
            &self.corrected_quad,
            &self.corrected_autocorr,
            limit,
        );
        if result.is_err() && limit > 1 {
            #[cfg(feature = "log")]
            log::warn!(
                "block {}: solve failed at order {} ({}), retrying at order {}",
                self.blocks,
                limit,
                result.as_ref().unwrap_err(),
                limit / 2
            );
            result = self.optimizer.optimize(
                &mut self.coeffs,
                &self.corrected_quad,
                &self.corrected_autocorr,
                limit / 2,
            );
        }
        if let Err(_err) = result {
            // Keep the previous coefficients; the stream stays usable.
            #[cfg(feature = "log")]
            log::warn!(
                "block {}: solve failed ({}), keeping previous coefficients",
                self.blocks,
                _err
            );
            return;
        }

        #[cfg(feature = "log")]
        {
            let mut energy = 0.0;
            for i in 0..=self.order {
                let mut row = 0.0;
                for j in 0..=self.order {
                    row += self.corrected_quad[(i, j)] * self.coeffs[j];
                }
                energy += self.coeffs[i] * row;
            }
            log::debug!(
                "block {}: residual/raw energy ratio {:.6}",
                self.blocks,
                energy / orig_zero
            );
        }
    }

    /// Returns the number of coefficients allowed to move for the current
    /// amount of data.
    ///
    /// While the stream is young the effective order grows with the
    /// consumed sample count, so that the solver never faces a system
    /// estimated from less data than its dimension.
    fn ramp_limit(&self) -> usize {
        if self.consumed > ORDER_RAMP_BLOCKS * self.block_length {
            self.order
        } else {
            (self.consumed / ORDER_RAMP_SAMPLES_PER_ORDER).min(self.order)
        }
    }
}

/// Reorders interleaved samples into a deinterleaved pattern.
///
/// Samples past the end of `interleaved` are written as zero, matching the
/// layout `dest[samples_per_channel * ch + t]`.
///
/// # Panics
///
/// Panics if `channels` is zero or `dest` is not a whole number of
/// channel rows.
pub fn deinterleave(interleaved: &[f64], channels: usize, dest: &mut [f64]) {
    assert!(channels > 0);
    assert!(dest.len() % channels == 0);
    let samples = dest.len() / channels;
    let src_samples = interleaved.len() / channels;
    for t in 0..samples {
        for ch in 0..channels {
            dest[samples * ch + t] = if t < src_samples {
                interleaved[channels * t + ch]
            } else {
                0.0
            };
        }
    }
}

/// Independent per-channel analyzers fed from interleaved input.
///
/// Channels share nothing; this is only a convenience wrapper for callers
/// holding interleaved PCM.
#[derive(Clone, Debug)]
pub struct MultiChannelAnalyzer {
    analyzers: Vec<StreamAnalyzer>,
    scratch: Vec<f64>,
}

impl MultiChannelAnalyzer {
    /// Constructs `channels` independent analyzers with the same config.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if `config` is not valid.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is zero.
    pub fn new(channels: usize, config: &config::Analysis) -> Result<Self, VerifyError> {
        assert!(channels > 0);
        let mut analyzers = Vec::with_capacity(channels);
        for _ch in 0..channels {
            analyzers.push(StreamAnalyzer::new(config)?);
        }
        Ok(Self {
            analyzers,
            scratch: vec![],
        })
    }

    /// Returns the number of channels.
    pub fn channels(&self) -> usize {
        self.analyzers.len()
    }

    /// Returns the analyzer of one channel.
    ///
    /// # Panics
    ///
    /// Panics if `ch` is out of range.
    pub fn channel(&self, ch: usize) -> &StreamAnalyzer {
        &self.analyzers[ch]
    }

    /// Feeds interleaved samples, routing each channel to its analyzer.
    ///
    /// # Panics
    ///
    /// Panics if `samples` is not a whole number of frames.
    pub fn push_interleaved(&mut self, samples: &[f64]) {
        let channels = self.channels();
        assert!(samples.len() % channels == 0);
        self.scratch.resize(samples.len(), 0.0);
        deinterleave(samples, channels, &mut self.scratch);
        let per_channel = samples.len() / channels;
        for (ch, analyzer) in self.analyzers.iter_mut().enumerate() {
            analyzer.push_samples(&self.scratch[ch * per_channel..(ch + 1) * per_channel]);
        }
    }
}
