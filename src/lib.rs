#![forbid(unsafe_code)]

//! dirtop — one-shot survey of the largest directories under a root path.
//!
//! The pipeline has four stages:
//! 1. **Gate** — a bounded worker pool that admits at most K filesystem
//!    operations at a time, in FIFO order
//! 2. **Aggregator** — recursive fan-out/fan-in size computation; every
//!    directory total is the strict sum of its children's outcomes
//! 3. **Ranker** — recorded totals sorted descending, truncated to N
//! 4. **Report** — ranked list persisted to disk and echoed to the console
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use dirtop::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use dirtop::core::config::Config;
//! use dirtop::scanner::aggregate::SizeAggregator;
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod report;
pub mod scanner;
