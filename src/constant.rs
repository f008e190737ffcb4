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

//! Configuration constants

// Constants sorted in an alphabetical-order.  Top-level constants first, and
// then sub-modules. Constants that are used only in a specific sub-module or
// its caller should be placed in the corresponding submodule.

/// Maximum number of coefficients (`MAX_ORDER` taps plus the fixed term).
pub const MAX_COEFS: usize = MAX_ORDER + 1;

/// Maximum prediction order supported.
pub const MAX_ORDER: usize = 32;

/// Constants related to the block driver.
pub mod analysis {
    /// Default length of an analysis block in samples.
    pub const DEFAULT_BLOCK_LENGTH: usize = 32;

    /// Default per-block decay applied to all running statistics.
    pub const DEFAULT_DECAY: f64 = 0.75;

    /// Default prediction order.
    pub const DEFAULT_ORDER: usize = 25;

    /// Signal energy at or below this level is treated as silence, and the
    /// coefficient solve for the block is skipped.
    pub const SILENCE_ENERGY: f64 = 0.0;
}

/// Constants related to the conjugate-gradient coefficient solver.
pub mod minimizer {
    /// Default early-stop threshold on the preconditioned residual-energy
    /// ratio.
    pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 1e-5;

    /// Default diagonal loading applied to the zero-lag term when building
    /// the Toeplitz preconditioner, relative to that term.
    pub const DEFAULT_DIAGONAL_LOADING: f64 = 1e-9;

    /// Default number of CG iterations per block.
    pub const DEFAULT_MAX_ITERS: usize = 3;

    /// Multiplier applied to the diagonal loading after each failed
    /// preconditioner solve.
    pub const LOADING_WIDENING: f64 = 10.0;

    /// Number of loading-widening retries before giving up on the Toeplitz
    /// preconditioner for a block.
    pub const MAX_LOADING_RETRIES: usize = 4;

    /// The prediction order is ramped up while fewer than this many blocks
    /// of samples have been consumed.
    pub const ORDER_RAMP_BLOCKS: usize = 5;

    /// One extra order of prediction is enabled per this many consumed
    /// samples during the ramp.
    pub const ORDER_RAMP_SAMPLES_PER_ORDER: usize = 16;
}

/// Constants related to the statistics accumulator.
pub mod stats {
    /// Default weight of the virtual reflected-signal terms added at block
    /// boundaries to reduce truncation bias in the autocorrelation
    /// estimate.
    pub const REFLECTION_WEIGHT: f64 = 0.5;
}

/// Module for internal error messages.
///
/// Use `panic!` and those messages only for env-related unrecoverable errors.
/// It's okay to use them in tests, but it's not okay to add another variable
/// only for test functions.
pub(crate) mod panic_msg {
    pub const COEF_CAPACITY_EXCEEDED: &str =
        "INTERNAL ERROR: Number of coefficients exceeded MAX_COEFS.";
    pub const DATA_INCONSISTENT: &str = "INTERNAL ERROR: Internal variable inconsistency detected.";
}
