//! Error module for the gene network simulation library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq)]
pub enum GnwError {
    /// Inconsistent configuration, e.g., a step that does not divide a duration.
    InvalidConfiguration(String),
    /// Invalid argument, e.g., an unrecognized solver mode or an out-of-range run index.
    InvalidArgument(String),
    /// Unrecognized stochastic calculus scheme or integration method.
    UnknownScheme(String),
    /// A solver step did not realize the requested elapsed time.
    StepMismatch { expected: f64, obtained: f64 },
    /// Mismatch between the dimensions of a vector or matrix and the network.
    DimensionMismatch(String),
    /// Error for invalid parameters, e.g., a negative concentration passed to a noise model.
    InvalidParameter(String),
    /// Failure of a numerical integrator, e.g., too many rejected steps.
    IntegrationFailure(String),
    /// The run was cancelled between two perturbation indices.
    Cancelled,
    /// Error for I/O operations.
    IOError(String),
}

impl fmt::Display for GnwError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GnwError::InvalidConfiguration(e) => write!(f, "Invalid configuration: {}", e),
            GnwError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            GnwError::UnknownScheme(e) => write!(f, "Unknown scheme: {}", e),
            GnwError::StepMismatch { expected, obtained } => write!(
                f,
                "Solver step mismatch: requested {} but integrated {}",
                expected, obtained
            ),
            GnwError::DimensionMismatch(e) => write!(f, "Dimension mismatch: {}", e),
            GnwError::InvalidParameter(e) => write!(f, "Invalid parameters: {}", e),
            GnwError::IntegrationFailure(e) => write!(f, "Integration failure: {}", e),
            GnwError::Cancelled => write!(f, "Simulation cancelled by the user"),
            GnwError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for GnwError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = GnwError::StepMismatch {
            expected: 50.0,
            obtained: 49.0,
        };
        assert_eq!(
            err.to_string(),
            "Solver step mismatch: requested 50 but integrated 49"
        );
        assert_eq!(
            GnwError::Cancelled.to_string(),
            "Simulation cancelled by the user"
        );
    }
}
