//! Error types for the detection engine.
//!
//! None of these ever escape an observation path (network call, DOM
//! mutation, timer tick): those paths log and continue. They surface only
//! from setup operations such as loading configuration or compiling rules.

use thiserror::Error;

use crate::dom::DomError;

/// Errors raised by setup and I/O operations
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rule pattern {pattern:?}: {source}")]
    Rule {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;
