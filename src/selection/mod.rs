//! Instrument selection
//!
//! Pure decision logic over a market snapshot: no I/O, no store access.
//! The scheduler in `collector::scheduler` supplies the snapshot and applies
//! the result.

pub mod engine;
pub mod rules;

pub use engine::{select, select_with, SelectionOutcome};
pub use rules::{CandidateStats, Category, SelectionRules};
