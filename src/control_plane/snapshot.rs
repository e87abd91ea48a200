use super::{Reader, ResourceObject, VirtualMachine};
use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Reader implementation backed by a JSON snapshot of the control plane,
/// as produced by its export tooling. Useful for development and for sites
/// that stage exports out-of-band instead of querying the API directly.
#[derive(Debug, Default)]
pub struct SnapshotReader {
    snapshot: Snapshot,
}

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    virtual_machines: Vec<Value>,
    #[serde(default)]
    users: Vec<Value>,
    #[serde(default)]
    images: Vec<Value>,
    #[serde(default)]
    hosts: Vec<Value>,
    #[serde(default)]
    clusters: Vec<Value>,
}

impl SnapshotReader {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ExporterError::ControlPlane(format!(
                "failed to read snapshot '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(contents)?;
        debug!(
            vms = snapshot.virtual_machines.len(),
            users = snapshot.users.len(),
            images = snapshot.images.len(),
            hosts = snapshot.hosts.len(),
            clusters = snapshot.clusters.len(),
            "loaded control plane snapshot"
        );
        Ok(Self { snapshot })
    }
}

#[async_trait]
impl Reader for SnapshotReader {
    async fn list_all_virtual_machines(&self) -> Result<Vec<VirtualMachine>> {
        Ok(self
            .snapshot
            .virtual_machines
            .iter()
            .cloned()
            .map(VirtualMachine::new)
            .collect())
    }

    async fn list_all_users(&self) -> Result<Vec<ResourceObject>> {
        Ok(objects(&self.snapshot.users))
    }

    async fn list_all_images(&self) -> Result<Vec<ResourceObject>> {
        Ok(objects(&self.snapshot.images))
    }

    async fn list_all_hosts(&self) -> Result<Vec<ResourceObject>> {
        Ok(objects(&self.snapshot.hosts))
    }

    async fn list_all_clusters(&self) -> Result<Vec<ResourceObject>> {
        Ok(objects(&self.snapshot.clusters))
    }
}

fn objects(docs: &[Value]) -> Vec<ResourceObject> {
    docs.iter().cloned().map(ResourceObject::new).collect()
}
