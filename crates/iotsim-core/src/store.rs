//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Stage store backends read by the engine's stage poll."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Read-only access to the externally mutable simulation record.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iotsim_schema::{Simulation, Stage};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unable to read stage file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed simulation record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stage store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid stage store endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("stage store unavailable: {0}")]
    Unavailable(String),
}

/// Source of the current simulation record.
#[async_trait]
pub trait StageStore: Send + Sync {
    /// `Ok(None)` when the record does not exist.
    async fn get(&self, sim_id: &str) -> Result<Option<Simulation>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, Simulation>,
    failure: Option<String>,
}

/// Shared in-process store; clones observe the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStageStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl InMemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(simulation: Simulation) -> Self {
        let store = Self::default();
        store.put(simulation);
        store
    }

    pub fn put(&self, simulation: Simulation) {
        self.inner
            .write()
            .records
            .insert(simulation.sim_id.clone(), simulation);
    }

    /// Returns whether the record existed.
    pub fn set_stage(&self, sim_id: &str, stage: Stage) -> bool {
        match self.inner.write().records.get_mut(sim_id) {
            Some(record) => {
                record.stage = stage;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, sim_id: &str) -> Option<Simulation> {
        self.inner.write().records.remove(sim_id)
    }

    /// Make every subsequent read fail until [`InMemoryStageStore::recover`].
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.inner.write().failure = Some(reason.into());
    }

    pub fn recover(&self) {
        self.inner.write().failure = None;
    }
}

#[async_trait]
impl StageStore for InMemoryStageStore {
    async fn get(&self, sim_id: &str) -> Result<Option<Simulation>, StoreError> {
        let guard = self.inner.read();
        if let Some(reason) = &guard.failure {
            return Err(StoreError::Unavailable(reason.clone()));
        }
        Ok(guard.records.get(sim_id).cloned())
    }
}

/// JSON file holding one simulation record or an array of them. The file is
/// re-read on every call so external edits are picked up by the next poll.
#[derive(Debug, Clone)]
pub struct JsonFileStageStore {
    path: PathBuf,
}

impl JsonFileStageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl StageStore for JsonFileStageStore {
    async fn get(&self, sim_id: &str) -> Result<Option<Simulation>, StoreError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        let document: Value = serde_json::from_str(&contents)?;
        let candidates = match document {
            Value::Array(records) => records,
            record => vec![record],
        };
        for candidate in candidates {
            let matches = candidate.get("simId").and_then(Value::as_str) == Some(sim_id);
            if matches {
                return Ok(Some(serde_json::from_value(candidate)?));
            }
        }
        debug!(sim_id, path = %self.path.display(), "simulation not present in stage file");
        Ok(None)
    }
}

/// Reads `GET {base}/simulations/{sim_id}`; a 404 means the record is gone.
#[derive(Debug, Clone)]
pub struct HttpStageStore {
    client: reqwest::Client,
    base: Url,
}

impl HttpStageStore {
    pub fn new(base: Url) -> Result<Self, StoreError> {
        Self::with_timeout(base, iotsim_msg::DEFAULT_REQUEST_TIMEOUT)
    }

    /// A read that takes longer than `timeout` fails the poll.
    pub fn with_timeout(base: Url, timeout: Duration) -> Result<Self, StoreError> {
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidEndpoint(base.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn record_url(&self, sim_id: &str) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .push("simulations")
            .push(sim_id);
        Ok(url)
    }
}

#[async_trait]
impl StageStore for HttpStageStore {
    async fn get(&self, sim_id: &str) -> Result<Option<Simulation>, StoreError> {
        let url = self.record_url(sim_id)?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record = response.error_for_status()?.json::<Simulation>().await?;
        Ok(Some(record))
    }
}
