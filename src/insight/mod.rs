//! # Insight Engine
//!
//! Turns a simulation snapshot plus member metadata into a list of
//! [`Insight`]s. Entropy decides the [`PassLevel`]; the pass level and the
//! requester's [`Tier`] decide which detectors run:
//!
//! | Stage          | Tier        | Pass level       |
//! |----------------|-------------|------------------|
//! | drift          | any         | any              |
//! | clusters       | PRO, EXPERT | MAPPING or above |
//! | schema check   | PRO, EXPERT | INTEGRATION or above |
//! | deep dive      | EXPERT      | MAPPING or above |
//!
//! The deep dive is the only stage that calls out (to a
//! [`GenerativeModel`](crate::model::GenerativeModel)); it runs under a
//! timeout and degrades to a single low-severity "offline" insight.

pub mod engine;
pub mod prompts;
pub mod types;

pub use engine::InsightEngine;
pub use types::{Insight, InsightMetrics, InsightType, Member, NodeState, PassLevel, Severity, SimState, Tier};
