//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use dirtop::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DtpError, Result};

// Scanner
pub use crate::scanner::aggregate::{SizeAggregator, SurveyOutcome, SurveyStats};
pub use crate::scanner::filter::IgnoreFilter;
pub use crate::scanner::gate::IoGate;
pub use crate::scanner::rank::{DirectorySize, top_n};

// Logging
pub use crate::logger::failures::{
    DiscardFailureSink, FailureSink, FileFailureSink, MemoryFailureSink, StderrFailureSink,
    TraversalFailure,
};

// Report
pub use crate::report::{format_gb, render_text};
