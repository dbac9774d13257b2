//! Errors
//!
//! Custom error types used throughout the `adaptree` crate.
use thiserror::Error;

/// Errors that can occur while configuring or persisting an adaptive tree.
#[derive(Debug, Error)]
pub enum AdaptreeError {
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// A schema that cannot describe a classification stream.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// Unable to write model to file.
    #[error("Unable to write model to file: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model from a file {0}")]
    UnableToRead(String),
}
