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

//! Analyzer configuration structs.

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::constant::analysis::DEFAULT_BLOCK_LENGTH;
use super::constant::analysis::DEFAULT_DECAY;
use super::constant::analysis::DEFAULT_ORDER;
use super::constant::minimizer::DEFAULT_CONVERGENCE_THRESHOLD;
use super::constant::minimizer::DEFAULT_DIAGONAL_LOADING;
use super::constant::minimizer::DEFAULT_MAX_ITERS;
use super::constant::stats::REFLECTION_WEIGHT;
use super::constant::MAX_ORDER;
use super::error::verify_range;
use super::error::verify_true;
use super::error::Verify;
use super::error::VerifyError;
use super::optim::Preconditioner;
use super::stats::UpdateMode;

/// Configuration for a per-stream analyzer.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Analysis {
    /// Prediction order, i.e. the number of past samples each sample is
    /// predicted from.
    pub order: usize,
    /// Number of samples accumulated between coefficient refreshes.
    pub block_length: usize,
    /// Per-block multiplicative forgetting rate applied to all running
    /// statistics.
    pub decay: f64,
    /// Configuration for the statistics accumulator.
    pub stats: Stats,
    /// Configuration for the coefficient solver.
    pub minimizer: Minimizer,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            block_length: DEFAULT_BLOCK_LENGTH,
            decay: DEFAULT_DECAY,
            stats: Stats::default(),
            minimizer: Minimizer::default(),
        }
    }
}

impl Verify for Analysis {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("order", self.order, 1..=MAX_ORDER)?;
        verify_true!(
            "block_length",
            self.block_length >= self.order,
            "must be greater than or equal to order"
        )?;
        verify_true!("decay", self.decay > 0.0, "must be positive")?;
        verify_range!("decay", self.decay, ..=1.0)?;
        self.stats.verify().map_err(|e| e.within("stats"))?;
        self.minimizer.verify().map_err(|e| e.within("minimizer"))
    }
}

/// Configuration for the statistics accumulator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Stats {
    /// Strategy used to maintain the quadratic-form statistics.
    ///
    /// `Incremental` is the production setting; `Direct` recomputes the
    /// same quantities with unoptimized loops and exists for differential
    /// testing.
    pub update: UpdateMode,
    /// Weight of the virtual reflected-signal terms added at block
    /// boundaries.
    pub reflection_weight: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            update: UpdateMode::Incremental,
            reflection_weight: REFLECTION_WEIGHT,
        }
    }
}

impl Verify for Stats {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("reflection_weight", self.reflection_weight, 0.0..=1.0)
    }
}

/// Configuration for the conjugate-gradient coefficient solver.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Minimizer {
    /// Maximum number of CG iterations per block.
    pub max_iters: usize,
    /// Early-stop threshold on the ratio of the current to the initial
    /// preconditioned residual energy.
    pub convergence_threshold: f64,
    /// Preconditioner strategy.
    pub preconditioner: Preconditioner,
    /// Relative diagonal loading applied to the zero-lag autocorrelation
    /// term when building the Toeplitz preconditioner.
    pub diagonal_loading: f64,
}

impl Default for Minimizer {
    fn default() -> Self {
        Self {
            max_iters: DEFAULT_MAX_ITERS,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            preconditioner: Preconditioner::ToeplitzInverse,
            diagonal_loading: DEFAULT_DIAGONAL_LOADING,
        }
    }
}

impl Verify for Minimizer {
    fn verify(&self) -> Result<(), VerifyError> {
        verify_range!("max_iters", self.max_iters, 1..)?;
        verify_true!(
            "convergence_threshold",
            self.convergence_threshold > 0.0,
            "must be positive"
        )?;
        verify_true!(
            "diagonal_loading",
            self.diagonal_loading >= 0.0,
            "must be non-negative"
        )
    }
}
