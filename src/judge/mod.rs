//! LLM-as-judge scoring.
//!
//! This module contains:
//! - Metric definitions and judge prompts
//! - Concurrent per-test-case evaluation
//! - Optional pairwise arena comparison

pub mod arena;
pub mod evaluator;
pub mod metrics;
pub mod parse;

pub use arena::{ArenaJudge, ARENA_CRITERIA};
pub use evaluator::ConversationJudge;
pub use parse::JudgeError;
