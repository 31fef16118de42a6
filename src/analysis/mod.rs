//! Comparison maths over evaluation results.

pub mod aggregator;

pub use aggregator::*;
