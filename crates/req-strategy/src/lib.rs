//! Strategy dispatch for the three requirement kinds (C8 blocking, C9 guard,
//! C10 dynamic), their supporting calculator registry (C7) and the
//! branch-size reference calculator (C15).
//!
//! Ported from the Python original's `blocking_strategy.py`,
//! `guard_strategy.py` and `dynamic_strategy.py`, collapsed from three
//! `RequirementStrategy` subclasses into one `Strategy` enum dispatch, since
//! Rust has no runtime class registry to mirror.

pub mod calculator;
pub mod calculators;
pub mod context;
pub mod git_exec;
pub mod strategies;

pub use context::StrategyContext;
pub use strategies::{Denial, check};
