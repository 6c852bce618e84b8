//! The Attesta node orchestrator.
//!
//! Opens storage, wires the services from configuration, and runs the HTTP
//! API in a background task until shut down.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use attesta_core::{SharedClock, SystemClock, TokenRecord};
use attesta_credentials::{InMemoryKycProvider, InMemoryLedger, KycVerdict};
use attesta_crypto::KeyPair;

use crate::config::{AttestaConfig, StorageBackend};
use crate::state::{AppState, Backends};
use crate::storage::Storage;

/// A running (or startable) Attesta node.
pub struct AttestaNode {
    config: AttestaConfig,
    signing_key: Option<KeyPair>,
    clock: SharedClock,
    /// Present only with the RocksDB backend, after `start`.
    storage: Option<Arc<Storage>>,
    state: Option<Arc<AppState>>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<Result<()>>>,
}

impl AttestaNode {
    /// Validate the config and load the signing key.
    pub fn new(config: AttestaConfig) -> Result<Self> {
        config.validate()?;
        let signing_key = config.signing_key()?;
        match &signing_key {
            Some(key) => tracing::info!(address = %key.address(), "signing key loaded"),
            None => tracing::warn!("no signing key configured"),
        }

        Ok(Self {
            config,
            signing_key,
            clock: SystemClock::shared(),
            storage: None,
            state: None,
            local_addr: None,
            shutdown_tx: None,
            server: None,
        })
    }

    /// Open storage, build the services and start serving the API.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("starting Attesta node");

        let mut backends = match self.config.storage.backend {
            StorageBackend::Rocksdb => {
                let storage = Arc::new(Storage::open(&self.config.storage.data_dir)?);
                tracing::info!(path = %self.config.storage.data_dir.display(), "storage initialized");
                self.storage = Some(storage.clone());
                Backends {
                    credentials: storage.clone(),
                    revocations: storage.clone(),
                    grants: storage,
                    ..Backends::in_memory()
                }
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage, nothing survives a restart");
                Backends::in_memory()
            }
        };

        if let Some(path) = &self.config.providers.ledger_seed {
            let ledger = load_ledger_seed(path)?;
            tracing::info!(path = %path.display(), tokens = ledger.len(), "ledger seeded");
            backends.ledger = Arc::new(ledger);
        }
        if let Some(path) = &self.config.providers.kyc_seed {
            let kyc = load_kyc_seed(&self.config.providers.kyc_provider_id, path)?;
            tracing::info!(path = %path.display(), subjects = kyc.len(), "KYC provider seeded");
            backends.kyc = Some(Arc::new(kyc));
        }

        let signing_key = self
            .signing_key
            .as_ref()
            .map(|key| KeyPair::from_seed(&key.secret_bytes()));
        let state = Arc::new(AppState::build(
            &self.config,
            backends,
            signing_key,
            self.clock.clone(),
        )?);

        if state.api_keys.is_empty() {
            tracing::warn!("no API keys configured, issuance and assertion endpoints will reject every request");
        }

        let api_addr = self.config.api_addr()?;
        let listener = tokio::net::TcpListener::bind(api_addr)
            .await
            .with_context(|| format!("binding API listener on {api_addr}"))?;
        self.local_addr = Some(listener.local_addr()?);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let api_state = state.clone();
        self.server = Some(tokio::spawn(async move {
            crate::api::serve_api(listener, api_state, async {
                let _ = shutdown_rx.await;
            })
            .await
        }));

        self.state = Some(state);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Wait for the API server to exit.
    pub async fn run(&mut self) -> Result<()> {
        let server = self
            .server
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        // Borrowed so that `shutdown` can still drain the server if this
        // future is dropped first.
        let joined = server.await;
        self.server = None;
        joined.context("API server task panicked")?
    }

    /// Stop serving and flush storage.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down Attesta node");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            if let Err(e) = server.await.context("API server task panicked")? {
                tracing::error!(error = %e, "HTTP API server error");
            }
        }
        if let Some(storage) = self.storage.take() {
            storage.flush()?;
            tracing::info!("storage flushed");
        }
        Ok(())
    }

    /// Address the API actually listens on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> Option<&Arc<AppState>> {
        self.state.as_ref()
    }
}

/// Load a JSON array of token records.
fn load_ledger_seed(path: &Path) -> Result<InMemoryLedger> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading ledger seed {}", path.display()))?;
    let records: Vec<TokenRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing ledger seed {}", path.display()))?;
    Ok(InMemoryLedger::from_records(records))
}

/// Load a JSON object mapping subject ids to verdicts.
fn load_kyc_seed(provider_id: &str, path: &Path) -> Result<InMemoryKycProvider> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading KYC seed {}", path.display()))?;
    let verdicts: BTreeMap<String, KycVerdict> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing KYC seed {}", path.display()))?;
    let provider = InMemoryKycProvider::new(provider_id);
    for (subject, verdict) in verdicts {
        provider.set_verdict(subject, verdict);
    }
    Ok(provider)
}
