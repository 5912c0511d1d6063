//! Dispatch contract: the envelope wire format and the governed router.
//!
//! # Modules
//!
//! - [`envelope`]: `RequestEnvelope` (strict), `ReplyEnvelope`, `HoldReply`
//! - [`router`]: `DispatchRouter`, the validate → registry → regime →
//!   entitlement → invoke → tone → spend state machine

pub mod envelope;
pub mod router;

pub use envelope::{EnvelopeError, HoldReply, ReplyEnvelope, RequestEnvelope, ValidationIssue};
pub use router::{DispatchOutcome, DispatchRouter};
