//! HTTP API server for the Attesta node.
//!
//! Verification and consent endpoints are open. Issuance, credential
//! revocation and assertions sit behind the API-key middleware.
//!
//! `/consent/grant` and `/consent/revoke` trust the `subjectId` in the body.
//! The node must sit behind an ingress that authenticates the subject and
//! rejects requests whose `subjectId` is not theirs.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use attesta_assertions::{AssertionQuery, DEFAULT_REQUIRED_INTEGRITY_LEVEL};
use attesta_core::{
    Amount, Assertion, AssertionKind, ConsentScope, Did, RequirementSpec, VerificationResult,
};
use attesta_credentials::{Credential, DeviceFacts, DualRailResult, KycFacts, ProofOfFundsFacts};

use crate::auth::{require_api_key, Requester};
use crate::error::ApiError;
use crate::state::AppState;

// --- Request types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default, rename = "vcURI")]
    pub vc_uri: Option<String>,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub required_asset: Option<String>,
    #[serde(default)]
    pub min_amount: Option<Amount>,
}

impl VerifyRequest {
    fn requirements(&self) -> RequirementSpec {
        RequirementSpec::new(self.required_asset.clone(), self.min_amount)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueProofOfFundsRequest {
    #[serde(rename = "holderDID")]
    pub holder_did: String,
    pub token_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueKycRequest {
    #[serde(rename = "holderDID")]
    pub holder_did: String,
    pub kyc_data: KycFacts,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDeviceRequest {
    #[serde(rename = "holderDID")]
    pub holder_did: String,
    pub device_data: DeviceFacts,
}

#[derive(Debug, Deserialize)]
pub struct RevokeCredentialRequest {
    #[serde(rename = "vcURI")]
    pub vc_uri: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionParams {
    #[serde(default)]
    pub min_amount: Option<Amount>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub required_level: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantConsentRequest {
    pub user_id: String,
    pub granted_to: String,
    pub scopes: Vec<String>,
    /// Seconds until the grant lapses.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeConsentRequest {
    pub user_id: String,
    pub revoke_from: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

// --- Response types ---

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredential {
    pub vc: Credential,
    #[serde(rename = "vcURI")]
    pub vc_uri: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeCredentialResponse {
    pub success: bool,
    pub already_revoked: bool,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantConsentResponse {
    pub success: bool,
    pub consent_id: String,
    pub scopes: BTreeSet<ConsentScope>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeConsentResponse {
    pub success: bool,
    pub affected_grants: usize,
    pub revoked_at: DateTime<Utc>,
}

// --- Handlers ---

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Single-rail verification. A credential URI wins over a token id.
async fn handle_verify(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerificationResult>, ApiError> {
    let Json(req) = payload?;
    let requirements = req.requirements();
    let result = match (req.vc_uri.as_deref(), req.token_id.as_deref()) {
        (Some(uri), _) => state.verifier.verify_uri(uri, &requirements).await?,
        (None, Some(token_id)) => state.tokens.verify_id(token_id, &requirements).await?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "one of vcURI or tokenId is required".into(),
            ))
        }
    };
    Ok(Json(result))
}

async fn handle_verify_dual(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<DualRailResult>, ApiError> {
    let Json(req) = payload?;
    let result = state
        .dual_rail
        .verify_dual_refs(
            req.vc_uri.as_deref(),
            req.token_id.as_deref(),
            &req.requirements(),
        )
        .await?;
    Ok(Json(result))
}

async fn handle_issue_pof(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IssueProofOfFundsRequest>, JsonRejection>,
) -> Result<Json<IssuedCredential>, ApiError> {
    let Json(req) = payload?;
    let holder = Did::new(req.holder_did)?;
    let token = state
        .tokens
        .fetch(&req.token_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("ledger has no token {}", req.token_id)))?;
    if !token.valid || token.is_expired_at(state.clock.now()) {
        return Err(ApiError::BadRequest(format!(
            "token {} is invalid or expired and cannot back a credential",
            token.id
        )));
    }

    let facts = ProofOfFundsFacts::from_token(&token)?;
    let credential = state.issuer.issue_proof_of_funds(&holder, &facts)?;
    persist(&state, credential).await
}

async fn handle_issue_kyc(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IssueKycRequest>, JsonRejection>,
) -> Result<Json<IssuedCredential>, ApiError> {
    let Json(req) = payload?;
    let holder = Did::new(req.holder_did)?;
    let credential = state.issuer.issue_kyc(&holder, &req.kyc_data)?;
    persist(&state, credential).await
}

async fn handle_issue_device(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IssueDeviceRequest>, JsonRejection>,
) -> Result<Json<IssuedCredential>, ApiError> {
    let Json(req) = payload?;
    let holder = Did::new(req.holder_did)?;
    let credential = state
        .issuer
        .issue_device_attestation(&holder, &req.device_data)?;
    persist(&state, credential).await
}

/// Store a freshly issued credential and build the issuance response.
async fn persist(state: &AppState, credential: Credential) -> Result<Json<IssuedCredential>, ApiError> {
    let vc_uri = state.verifier.repository().store(&credential).await?;
    tracing::debug!(uri = %vc_uri, subject = %credential.subject_id(), "credential stored");
    Ok(Json(IssuedCredential {
        issued_at: credential.issuance_date,
        vc: credential,
        vc_uri,
    }))
}

async fn handle_revoke_credential(
    State(state): State<Arc<AppState>>,
    Extension(requester): Extension<Requester>,
    payload: Result<Json<RevokeCredentialRequest>, JsonRejection>,
) -> Result<Json<RevokeCredentialResponse>, ApiError> {
    let Json(req) = payload?;
    let credential = state
        .verifier
        .fetch(&req.vc_uri)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no credential stored at {}", req.vc_uri)))?;
    let status_id = credential.status_id().ok_or_else(|| {
        ApiError::BadRequest(format!("credential {} carries no status entry", req.vc_uri))
    })?;

    let newly = state.revocations.revoke(status_id).await?;
    tracing::info!(
        uri = %req.vc_uri,
        status = %status_id,
        requester = %requester.0,
        newly,
        "credential revoked"
    );
    Ok(Json(RevokeCredentialResponse {
        success: true,
        already_revoked: !newly,
        revoked_at: state.clock.now(),
    }))
}

async fn handle_assertion(
    State(state): State<Arc<AppState>>,
    Extension(requester): Extension<Requester>,
    Path((assertion, user_id)): Path<(String, String)>,
    params: Result<Query<AssertionParams>, QueryRejection>,
) -> Result<Json<Assertion>, ApiError> {
    let Query(params) = params?;
    let query = match assertion.parse::<AssertionKind>()? {
        AssertionKind::HasKyc => AssertionQuery::HasKyc,
        AssertionKind::HasBalance => AssertionQuery::HasBalance {
            min_amount: params.min_amount,
            asset: params.asset,
        },
        AssertionKind::IsDeviceCompliant => AssertionQuery::IsDeviceCompliant {
            required_level: params
                .required_level
                .unwrap_or(DEFAULT_REQUIRED_INTEGRITY_LEVEL),
        },
    };

    let answer = state.assertions.assert(&user_id, &requester.0, &query).await?;
    Ok(Json(answer))
}

fn parse_scopes(names: &[String]) -> Result<BTreeSet<ConsentScope>, ApiError> {
    names
        .iter()
        .map(|name| name.parse::<ConsentScope>().map_err(ApiError::from))
        .collect()
}

async fn handle_grant_consent(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GrantConsentRequest>, JsonRejection>,
) -> Result<Json<GrantConsentResponse>, ApiError> {
    let Json(req) = payload?;
    let scopes = parse_scopes(&req.scopes)?;
    let ttl = match req.expires_in {
        Some(secs) => Duration::try_seconds(secs)
            .ok_or_else(|| ApiError::BadRequest(format!("expiresIn of {secs}s is out of range")))?,
        None => state.validity.default_consent_ttl(),
    };

    let grant = state
        .consent
        .grant(&req.user_id, &req.granted_to, scopes, ttl)
        .await?;
    Ok(Json(GrantConsentResponse {
        success: true,
        consent_id: grant.id,
        scopes: grant.scopes,
        expires_at: grant.expires_at,
    }))
}

async fn handle_revoke_consent(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RevokeConsentRequest>, JsonRejection>,
) -> Result<Json<RevokeConsentResponse>, ApiError> {
    let Json(req) = payload?;
    let scopes = req.scopes.as_deref().map(parse_scopes).transpose()?;

    let outcome = state
        .consent
        .revoke(&req.user_id, &req.revoke_from, scopes.as_ref())
        .await?;
    Ok(Json(RevokeConsentResponse {
        success: true,
        affected_grants: outcome.affected_grants,
        revoked_at: outcome.revoked_at,
    }))
}

// --- Server ---

pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/vc/pof", post(handle_issue_pof))
        .route("/vc/kyc", post(handle_issue_kyc))
        .route("/vc/device", post(handle_issue_device))
        .route("/vc/revoke", post(handle_revoke_credential))
        .route("/assertions/{assertion}/{user_id}", get(handle_assertion))
        .route_layer(from_fn_with_state(state.api_keys.clone(), require_api_key));

    Router::new()
        .route("/health", get(handle_health))
        .route("/verify", post(handle_verify))
        .route("/verify/dual", post(handle_verify_dual))
        .route("/consent/grant", post(handle_grant_consent))
        .route("/consent/revoke", post(handle_revoke_consent))
        .merge(protected)
        .with_state(state)
}

/// Serve the API on an already bound listener until `shutdown` resolves.
pub async fn serve_api(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listen_addr: SocketAddr = listener.local_addr()?;
    tracing::info!(%listen_addr, "HTTP API server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("HTTP API server stopped");
    Ok(())
}
