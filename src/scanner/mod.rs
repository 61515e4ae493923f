//! Directory survey: ignore filter, concurrency gate, size aggregation, ranking.

pub mod aggregate;
pub mod filter;
pub mod gate;
pub mod rank;
