//! Named artifact registry
//!
//! A plain map from artifact name (`/{network}-{pool}-history`, …) to the
//! latest payload. Publishing swaps in a new `Arc` under the write lock, so a
//! reader holding the previous `Arc` keeps a complete payload and a reader
//! arriving later gets the complete new one. Nothing expires; freshness comes
//! from the cycle re-publishing.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub mod http;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub name: String,
    pub payload: String,
    /// 1 on first publish, +1 on every replace
    pub version: u64,
    pub content_type: &'static str,
}

#[derive(Debug, Default)]
pub struct PublicationRegistry {
    artifacts: RwLock<HashMap<String, Arc<PublishedArtifact>>>,
}

/// Artifact names always carry a leading `/`
pub fn artifact_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

impl PublicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace `name`; returns the new version
    pub fn publish(&self, name: &str, payload: String) -> u64 {
        let name = artifact_name(name);
        let mut artifacts = self.artifacts.write().unwrap_or_else(PoisonError::into_inner);
        let version = artifacts.get(&name).map(|a| a.version + 1).unwrap_or(1);
        log::debug!("📤 Publishing {} (v{}, {} bytes)", name, version, payload.len());
        artifacts.insert(
            name.clone(),
            Arc::new(PublishedArtifact {
                name,
                payload,
                version,
                content_type: JSON_CONTENT_TYPE,
            }),
        );
        version
    }

    pub fn publish_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<u64, serde_json::Error> {
        let payload = serde_json::to_string(value)?;
        Ok(self.publish(name, payload))
    }

    pub fn serve(&self, name: &str) -> Option<Arc<PublishedArtifact>> {
        let artifacts = self.artifacts.read().unwrap_or_else(PoisonError::into_inner);
        artifacts.get(&artifact_name(name)).cloned()
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted artifact names
    pub fn names(&self) -> Vec<String> {
        let artifacts = self.artifacts.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = artifacts.keys().cloned().collect();
        names.sort();
        names
    }
}
