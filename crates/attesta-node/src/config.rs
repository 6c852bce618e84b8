//! Node configuration loading and management.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use attesta_core::{Did, ValidityWindows};
use attesta_credentials::ProviderPolicy;
use attesta_crypto::{KeyPair, SigningDomain};

/// Full configuration for the Attesta node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AttestaConfig {
    /// REST API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Signing domain and issuer key.
    #[serde(default)]
    pub signing: SigningConfig,

    /// API keys for issuance and assertion endpoints.
    #[serde(default)]
    pub auth: AuthConfig,

    /// External provider budget and seed data.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Credential and assertion validity windows.
    #[serde(default)]
    pub validity: ValidityWindows,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Rocksdb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default = "default_domain_name")]
    pub domain_name: String,
    #[serde(default = "default_domain_version")]
    pub domain_version: String,
    /// Network or deployment identifier bound into every signature.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_verifying_registry")]
    pub verifying_registry: String,
    /// Display name on issued credentials.
    #[serde(default = "default_issuer_name")]
    pub issuer_name: String,
    /// Hex-encoded Ed25519 secret key. Takes precedence over `signing_key_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key_hex: Option<String>,
    /// File holding the hex-encoded secret key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key_path: Option<PathBuf>,
    /// Issuer DIDs accepted by the verifier. Empty accepts any correctly signed issuer.
    #[serde(default)]
    pub trusted_issuers: Vec<String>,
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("domain_name", &self.domain_name)
            .field("domain_version", &self.domain_version)
            .field("chain_id", &self.chain_id)
            .field("verifying_registry", &self.verifying_registry)
            .field("issuer_name", &self.issuer_name)
            .field(
                "signing_key_hex",
                &self.signing_key_hex.as_ref().map(|_| "[REDACTED]"),
            )
            .field("signing_key_path", &self.signing_key_path)
            .field("trusted_issuers", &self.trusted_issuers)
            .finish()
    }
}

/// One API key and the requester identity it authenticates as.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub requester: String,
}

impl fmt::Debug for ApiKeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyEntry")
            .field("key", &"[REDACTED]")
            .field("requester", &self.requester)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(flatten)]
    pub policy: ProviderPolicy,
    /// JSON array of token records loaded into the ledger adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_seed: Option<PathBuf>,
    /// JSON object mapping subject ids to KYC verdicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc_seed: Option<PathBuf>,
    #[serde(default = "default_kyc_provider_id")]
    pub kyc_provider_id: String,
}

// Default value functions
fn default_api_addr() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    8080
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_domain_name() -> String {
    "Attesta".into()
}
fn default_domain_version() -> String {
    "1".into()
}
fn default_chain_id() -> u64 {
    1
}
fn default_verifying_registry() -> String {
    "0x0000000000000000000000000000000000000000".into()
}
fn default_issuer_name() -> String {
    "Attesta Issuer".into()
}
fn default_kyc_provider_id() -> String {
    "kyc-seed".into()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: StorageBackend::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            domain_name: default_domain_name(),
            domain_version: default_domain_version(),
            chain_id: default_chain_id(),
            verifying_registry: default_verifying_registry(),
            issuer_name: default_issuer_name(),
            signing_key_hex: None,
            signing_key_path: None,
            trusted_issuers: Vec::new(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            policy: ProviderPolicy::default(),
            ledger_seed: None,
            kyc_seed: None,
            kyc_provider_id: default_kyc_provider_id(),
        }
    }
}

impl AttestaConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AttestaConfig = toml::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings that would fail later at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.providers
            .policy
            .validate()
            .map_err(|e| anyhow::anyhow!("[providers] {e}"))?;
        for did in &self.signing.trusted_issuers {
            Did::new(did.as_str()).with_context(|| format!("[signing] trusted issuer {did}"))?;
        }
        if self.auth.api_keys.iter().any(|k| k.key.is_empty() || k.requester.is_empty()) {
            anyhow::bail!("[auth] api keys need a non-empty key and requester");
        }
        if self.validity.default_consent_ttl_secs <= 0 {
            anyhow::bail!("[validity] default_consent_ttl_secs must be positive");
        }
        self.api_addr()?;
        Ok(())
    }

    pub fn api_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.api.listen_addr, self.api.port)
            .parse()
            .with_context(|| "invalid [api] listen address")
    }

    pub fn signing_domain(&self) -> SigningDomain {
        SigningDomain::new(
            self.signing.domain_name.clone(),
            self.signing.domain_version.clone(),
            self.signing.chain_id,
            self.signing.verifying_registry.clone(),
        )
    }

    /// The configured issuer key, if any.
    pub fn signing_key(&self) -> anyhow::Result<Option<KeyPair>> {
        if let Some(hex) = &self.signing.signing_key_hex {
            return Ok(Some(
                KeyPair::from_hex(hex.trim()).context("[signing] signing_key_hex")?,
            ));
        }
        if let Some(path) = &self.signing.signing_key_path {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading signing key {}", path.display()))?;
            return Ok(Some(
                KeyPair::from_hex(contents.trim()).context("[signing] signing_key_path")?,
            ));
        }
        Ok(None)
    }

    pub fn trusted_issuers(&self) -> anyhow::Result<Vec<Did>> {
        self.signing
            .trusted_issuers
            .iter()
            .map(|d| Did::new(d.as_str()).map_err(Into::into))
            .collect()
    }
}
