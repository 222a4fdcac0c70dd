//! Solver Error Types
//!
//! Unified error type for the solver's fallible boundary operations. The
//! iteration kernels themselves have no runtime error conditions; their
//! preconditions (alignment, ranges, the coloring invariant) are structural
//! and checked with debug assertions. What can fail is joint insertion, where
//! body references cross the API boundary.

use core::fmt;

/// Unified error type for solver operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolverError {
    /// A joint references a body index outside the body array.
    InvalidBodyIndex {
        /// The invalid index that was provided
        index: u32,
        /// Current number of bodies
        count: usize,
    },
    /// A joint is structurally unusable (e.g. both endpoints are the same body).
    InvalidJoint {
        /// Human-readable description of the problem
        reason: &'static str,
    },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBodyIndex { index, count } => {
                write!(f, "body index {index} out of range (count={count})")
            }
            Self::InvalidJoint { reason } => {
                write!(f, "invalid joint: {reason}")
            }
        }
    }
}

impl std::error::Error for SolverError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = SolverError::InvalidBodyIndex { index: 7, count: 3 };
        assert_eq!(err.to_string(), "body index 7 out of range (count=3)");

        let err = SolverError::InvalidJoint {
            reason: "joint endpoints must be distinct bodies",
        };
        assert!(err.to_string().contains("distinct"));
    }
}
