//! Construction and usage errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimerError {
    /// Options were supplied in a shape other than an object.
    #[error("timer options must be an object, got {0}")]
    InvalidOptions(String),

    #[error("no callback function supplied")]
    MissingCallback,

    #[error("invalid timer configuration: {0}")]
    Config(#[from] serde_json::Error),
}
