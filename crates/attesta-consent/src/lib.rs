//! Attesta Consent: Which requesters may query which facts about a subject.

pub mod error;
pub mod repository;
pub mod store;

pub use error::ConsentError;
pub use repository::{GrantRepository, InMemoryGrantRepository};
pub use store::{ConsentStore, RevokeOutcome};
