//! Attesta Credentials: Issuance, single-rail verification, dual-rail
//! cross-validation, and the adapter interfaces for external registries.

pub mod credential;
pub mod dual_rail;
pub mod error;
pub mod issuer;
pub mod memory;
pub mod providers;
pub mod token;
pub mod verifier;

pub use credential::{
    Credential, CredentialProof, CredentialStatus, CredentialSubject, DeviceAttestationClaim,
    IssuerRef, KycClaim, ProofOfFundsClaim,
};
pub use dual_rail::{CrossValidation, DualRailResult, DualRailValidator};
pub use error::CredentialError;
pub use issuer::{CredentialIssuer, DeviceFacts, KycFacts, ProofOfFundsFacts};
pub use memory::{
    InMemoryCredentialRepository, InMemoryKycProvider, InMemoryLedger, InMemoryRevocationRegistry,
};
pub use providers::{
    call_provider, CredentialRepository, KycProvider, KycVerdict, LedgerRegistry, ProviderError,
    ProviderPolicy, RevocationRegistry,
};
pub use token::TokenVerifier;
pub use verifier::CredentialVerifier;
