//! Failure logging: append-only timestamped error log with stderr fallback.

pub mod failures;
