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

//! Error and verification traits

use std::error::Error;
use std::fmt;

/// Error object returned when config integrity verification failed.
///
/// This error maintains a path to the component that is actually erroneous
/// in the nested components.
///
/// # Design Notes
///
/// Parameter verification should happen on the public API boundary, i.e. in
/// [`StreamAnalyzer::new`]. Internal functions assume that the provided
/// config is already verified, and only assert the interaction between the
/// arguments they are given.
///
/// [`StreamAnalyzer::new`]: crate::analyzer::StreamAnalyzer::new
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct VerifyError {
    components: Vec<String>,
    reason: String,
}

impl VerifyError {
    /// Makes verification error for an invalid variable `component`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use adalpc::error::*;
    /// let err = VerifyError::new("order", "must be non-negative");
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "verification error: `order` is not valid. reason: must be non-negative"
    /// );
    /// ```
    pub fn new(component: &str, reason: &str) -> Self {
        Self {
            components: vec![component.to_owned()],
            reason: reason.to_owned(),
        }
    }

    /// Prepends the name of an enclosing component to the error location.
    ///
    /// # Examples
    ///
    /// ```
    /// # use adalpc::error::*;
    /// let err = VerifyError::new("order", "must be non-negative");
    /// let err = err.within("analysis");
    /// assert_eq!(
    ///     format!("{}", err),
    ///     "verification error: `analysis.order` is not valid. reason: must be non-negative"
    /// );
    /// ```
    #[must_use]
    pub fn within(self, component: &str) -> Self {
        let mut components = self.components;
        let reason = self.reason;
        components.push(component.to_owned());
        Self { components, reason }
    }

    /// Gets dot-separated path string for the error location.
    ///
    /// # Examples
    ///
    /// ```
    /// # use adalpc::error::*;
    /// let err = VerifyError::new("order", "must be non-negative");
    /// let err = err.within("analysis");
    /// assert_eq!(err.path(), "analysis.order");
    /// ```
    pub fn path(&self) -> String {
        let mut path = String::new();
        for (i, name) in self.components.iter().rev().enumerate() {
            if i != 0 {
                path.push('.');
            }
            path.push_str(name);
        }
        path
    }
}

impl Error for VerifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verification error: `{}` is not valid. reason: {}",
            self.path(),
            self.reason
        )
    }
}

/// Trait for verifiable structs.
pub trait Verify: Sized + seal_verify::Sealed {
    /// Verifies there's no internal data inconsistency.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if there's an invalid variable.
    ///
    /// # Examples
    ///
    /// ```
    /// # use adalpc::error::*;
    /// # use adalpc::config::Analysis;
    /// let mut analysis = Analysis::default();
    /// analysis.decay = 1.5; // invalid setting
    /// assert!(analysis.verify().is_err());
    ///
    /// analysis.decay = 0.9; // valid setting
    /// assert!(analysis.verify().is_ok());
    /// ```
    fn verify(&self) -> Result<(), VerifyError>;
}

/// A wrapping function to make it compatible with "?" operator.
pub(crate) fn verify_macro_impl(cond: bool, varname: &str, msg: &str) -> Result<(), VerifyError> {
    if !cond {
        return Err(VerifyError::new(varname, msg));
    }
    Ok(())
}

/// Checks if `$cond` is true and do `return Err(...)` if so.
///
/// An error object `VerifyErr` is constructed using `$varname` and
/// `$msg` that are formatted using the extra args (`$args`).
macro_rules! verify_true {
    ($varname:literal, $cond:expr, $msg:literal, $($args: expr),*) => {
        crate::error::verify_macro_impl(
            $cond,
            &format!($varname, $($args),*),
            &format!($msg, $($args),*),
        )
    };
    ($varname:literal, $cond:expr, $msg:literal) => {
        verify_true!($varname, $cond, $msg,)
    }
}
pub(crate) use verify_true;

/// Checks if `$actual` is in the range, and emits err with default msgs if not.
///
/// An error is constructed using the same way as [`verify_true`].
macro_rules! verify_range {
    ($varname: literal, $actual:expr, $lowlimit:tt .. $highlimit:tt) => {
        verify_range!($varname, $actual, ($lowlimit)..)
            .and_then(|()| verify_range!($varname, $actual, ..($highlimit)))
    };
    ($varname: literal, $actual:expr, $lowlimit:tt ..= $highlimit:tt) => {
        verify_range!($varname, $actual, ($lowlimit)..)
            .and_then(|()| verify_range!($varname, $actual, ..=($highlimit)))
    };
    ($varname: literal, $actual:expr, $lowlimit:tt ..) => {{
        #[allow(unused_parens)]
        let limit = $lowlimit;
        verify_true!(
            $varname,
            $actual >= limit,
            "must be greater than or equal to {limit}"
        )
    }};
    ($varname: literal, $actual:expr, ..= $highlimit:tt) => {{
        #[allow(unused_parens)]
        let limit = $highlimit;
        verify_true!(
            $varname,
            $actual <= limit,
            "must be less than or equal to {limit}"
        )
    }};
    ($varname: literal, $actual:expr, .. $highlimit:tt) => {{
        #[allow(unused_parens)]
        let limit = $highlimit;
        verify_true!($varname, $actual < limit, "must be less than {limit}")
    }};
}
pub(crate) use verify_range;

/// Enum of numerical failures that can occur while analyzing a stream.
///
/// `SingularSystem` and `IllConditioned` are recoverable at the block level;
/// the driver falls back to a smaller problem or keeps the previous
/// coefficients rather than aborting the stream.
#[non_exhaustive]
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisError {
    /// Not enough samples were available to form the first analysis window.
    InsufficientHistory {
        /// Number of samples the operation needed.
        required: usize,
        /// Number of samples actually available.
        actual: usize,
    },
    /// A leading principal minor of a Toeplitz system was numerically
    /// singular.
    SingularSystem {
        /// Recursion order at which the prediction-error energy vanished.
        order: usize,
    },
    /// The quadratic form presented to the CG solver was not positive
    /// definite.
    IllConditioned {
        /// The offending directional curvature `p^T A p`.
        curvature: f64,
    },
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientHistory { required, actual } => {
                write!(
                    f,
                    "insufficient history: {actual} samples available, {required} required"
                )
            }
            Self::SingularSystem { order } => {
                write!(f, "Toeplitz system is singular at order {order}")
            }
            Self::IllConditioned { curvature } => {
                write!(
                    f,
                    "quadratic form is not positive definite (curvature={curvature})"
                )
            }
        }
    }
}

impl Error for AnalysisError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

mod seal_verify {
    pub trait Sealed {}

    impl Sealed for crate::config::Analysis {}
    impl Sealed for crate::config::Minimizer {}
    impl Sealed for crate::config::Stats {}
}
