//! Error types for cantopop
//!
//! A single error enum covers the whole crate. Startup failures (corpus,
//! weights, sampler configuration) are fatal; request-time failures are
//! reported to the client inside the JSON body.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for cantopop operations
pub type Result<T> = std::result::Result<T, CantopopError>;

/// Error type for all cantopop operations
#[derive(Debug, Error)]
pub enum CantopopError {
    /// Reading a file from disk failed
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Corpus file cannot produce a usable vocabulary
    #[error("Invalid corpus: {reason}")]
    InvalidCorpus {
        /// Why the corpus was rejected
        reason: String,
    },

    /// Weights file is malformed or does not match the model layout
    #[error("Invalid weights: {reason}")]
    InvalidWeights {
        /// Why the weights were rejected
        reason: String,
    },

    /// Tensor or sequence has the wrong shape
    #[error("Invalid shape: {reason}")]
    InvalidShape {
        /// Description of the mismatch
        reason: String,
    },

    /// Data length disagrees with the declared shape
    #[error("Data size {data_size} does not match shape {shape:?} (expected {expected})")]
    DataShapeMismatch {
        /// Number of elements supplied
        data_size: usize,
        /// Declared shape
        shape: Vec<usize>,
        /// Element count implied by the shape
        expected: usize,
    },

    /// Sampler or server configuration is unusable
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },

    /// Requested length is not an integer
    #[error("invalid length '{input}': {reason}")]
    InvalidLength {
        /// Raw value taken from the request path
        input: String,
        /// Parser message
        reason: String,
    },

    /// Failure inside the sampling loop
    #[error("Generation failed: {reason}")]
    Generation {
        /// Description of the failure
        reason: String,
    },

    /// HTTP server could not bind or crashed
    #[error("Server error: {reason}")]
    Server {
        /// Description of the failure
        reason: String,
    },
}

impl CantopopError {
    /// Returns true for errors that must stop the process at startup
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::InvalidCorpus { .. }
                | Self::InvalidWeights { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Process exit status for an error that ends the CLI
    ///
    /// Configuration faults exit with 2, everything else with 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_configuration() {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_length_message() {
        let err = CantopopError::InvalidLength {
            input: "abc".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid length 'abc': invalid digit found in string"
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = CantopopError::Io {
            path: PathBuf::from("missing.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("missing.txt"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_configuration());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_runtime_errors_exit_with_one() {
        let err = CantopopError::Server {
            reason: "failed to bind 0.0.0.0:5000".to_string(),
        };
        assert!(!err.is_configuration());
        assert_eq!(err.exit_code(), 1);

        let err = CantopopError::InvalidWeights {
            reason: "missing tensor".to_string(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = CantopopError::DataShapeMismatch {
            data_size: 3,
            shape: vec![2, 2],
            expected: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("[2, 2]"));
        assert!(msg.contains('4'));
    }
}
