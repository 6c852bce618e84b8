//! Attesta Assertions: Consent-gated yes/no answers about a subject.
//!
//! An assertion is never a new source of truth. Each one points back at the
//! credential, ledger token or provider check that substantiates it, and is
//! only valid for a window matched to how quickly that fact can change.

pub mod engine;
pub mod error;
pub mod query;
pub mod signing;

pub use engine::AssertionEngine;
pub use error::{AssertionError, ConsentRemediation};
pub use query::{AssertionQuery, DEFAULT_REQUIRED_INTEGRITY_LEVEL};
pub use signing::{assertion_schema, verify_assertion_signature};
