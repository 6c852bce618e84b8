//! Attesta Core: Fundamental types, errors, and configuration shared by
//! every layer of the Attesta dual-rail attestation service.

pub mod amount;
pub mod assertion;
pub mod clock;
pub mod config;
pub mod consent;
pub mod error;
pub mod token;
pub mod types;
pub mod verification;

pub use amount::Amount;
pub use assertion::{Assertion, AssertionKind, ProofReference};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::ValidityWindows;
pub use consent::{ConsentGrant, ConsentScope};
pub use error::CoreError;
pub use token::{ComplianceFlags, TokenRecord};
pub use types::{Did, Rail, RequirementMismatch, RequirementSpec};
pub use verification::{FailureReason, VerificationMetadata, VerificationResult};
