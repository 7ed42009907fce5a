//! Client configuration loading.

use std::path::Path;

use anyhow::{Context, Result};
use collab_core::{ClientId, SyncConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the collaboration server
    #[serde(default = "default_server")]
    pub server: String,

    /// Name of the document to edit
    #[serde(default = "default_doc")]
    pub doc: String,

    /// Hex client id (generated if not provided)
    #[serde(default)]
    pub client_id: Option<String>,

    /// Insert a welcome text and commit it after loading
    #[serde(default)]
    pub seed_initial_commit: bool,

    /// Backoff and size limits
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_server() -> String {
    "http://localhost:8000".to_string()
}

fn default_doc() -> String {
    "Example".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            doc: default_doc(),
            client_id: None,
            seed_initial_commit: false,
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ClientConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// The configured client id, or a fresh random one.
    pub fn client_id(&self) -> Result<ClientId> {
        match &self.client_id {
            Some(hex) => hex
                .parse()
                .with_context(|| format!("Invalid client id: {}", hex)),
            None => Ok(ClientId::generate()),
        }
    }
}
