//! Need/offer matching rules.
//!
//! Category compatibility, dashboard ranking, match statistics and the match
//! response state machine. Everything here is pure: no I/O, no clocks, no
//! logging, so the server and the client core can share it.

pub mod category;
pub mod lifecycle;
pub mod ranking;
pub mod stats;

pub use category::categories_match;
pub use ranking::{Candidate, Ranked, matching_candidates, rank_candidates};
pub use stats::{MatchStats, success_rate};
