//! DTP-prefixed error types with structured error codes.
//!
//! These are the *fatal* errors — bad configuration, bad invocation, a
//! worker pool that cannot start. Failures recovered during traversal
//! (unreadable directories, vanished files) never surface here; they go to
//! the failure sink in [`crate::logger::failures`].

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DtpError>;

/// Top-level error type for dirtop.
#[derive(Debug, Error)]
pub enum DtpError {
    #[error("[DTP-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DTP-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DTP-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DTP-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DTP-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DTP-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DTP-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DtpError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DTP-1001",
            Self::MissingConfig { .. } => "DTP-1002",
            Self::ConfigParse { .. } => "DTP-1003",
            Self::Serialization { .. } => "DTP-2101",
            Self::Io { .. } => "DTP-3002",
            Self::ChannelClosed { .. } => "DTP-3003",
            Self::Runtime { .. } => "DTP-3900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for DtpError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DtpError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
