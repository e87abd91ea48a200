//! Boundary to the cloud-management control plane.
//!
//! Resources arrive as opaque documents whose attributes are looked up by
//! slash-separated string keys. Any lookup can fail — the attribute may be
//! absent or the resource may be in an inconsistent state — so every
//! accessor returns an `Option` and the caller decides the fallback.

use crate::constants;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::net::{Ipv4Addr, Ipv6Addr};

pub mod snapshot;

pub use snapshot::SnapshotReader;

/// Lists the collections of the control plane consumed by the pipeline.
/// Each listing either returns the full collection or a listing error;
/// partial listings are not a thing at this boundary.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn list_all_virtual_machines(&self) -> Result<Vec<VirtualMachine>>;
    async fn list_all_users(&self) -> Result<Vec<ResourceObject>>;
    async fn list_all_images(&self) -> Result<Vec<ResourceObject>>;
    async fn list_all_hosts(&self) -> Result<Vec<ResourceObject>>;
    async fn list_all_clusters(&self) -> Result<Vec<ResourceObject>>;
}

/// Opaque handle into the control plane's object model (user, image, host,
/// cluster). Borrowed for the duration of one preparation, never mutated.
#[derive(Debug, Clone)]
pub struct ResourceObject {
    doc: Value,
}

impl ResourceObject {
    pub fn new(doc: Value) -> Self {
        Self { doc }
    }

    /// Numeric resource ID, when resolvable.
    pub fn id(&self) -> Option<i64> {
        self.doc.get("ID").and_then(value_as_i64)
    }

    /// Resolves a slash-separated attribute path to its string value.
    /// Returns `None` when any path segment is absent, the leaf has the
    /// wrong shape, or the value is empty.
    pub fn attribute(&self, key: &str) -> Option<String> {
        let mut node = &self.doc;
        for part in key.split('/') {
            node = node.get(part)?;
        }
        match node {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn attribute_i64(&self, key: &str) -> Option<i64> {
        let mut node = &self.doc;
        for part in key.split('/') {
            node = node.get(part)?;
        }
        value_as_i64(node)
    }
}

/// A virtual machine handle with typed accessors over the raw document.
#[derive(Debug, Clone)]
pub struct VirtualMachine {
    obj: ResourceObject,
}

impl VirtualMachine {
    pub fn new(doc: Value) -> Self {
        Self {
            obj: ResourceObject::new(doc),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.obj.id()
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.obj.attribute(key)
    }

    /// Name under which the machine was deployed on its hypervisor.
    pub fn deploy_id(&self) -> Option<String> {
        self.obj.attribute(constants::DEPLOY_ID)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.obj.attribute_i64(constants::USER_ID)
    }

    pub fn group_id(&self) -> Option<i64> {
        self.obj.attribute_i64(constants::GROUP_ID)
    }

    pub fn group_name(&self) -> Option<String> {
        self.obj.attribute(constants::GROUP_NAME)
    }

    pub fn state(&self) -> Option<i64> {
        self.obj.attribute_i64(constants::STATE)
    }

    /// Start of the machine's lifetime. The control plane reports epoch
    /// seconds with zero meaning "not set".
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        epoch_attribute(&self.obj, constants::START_TIME)
    }

    /// End of the machine's lifetime; `None` while it is still running.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        epoch_attribute(&self.obj, constants::END_TIME)
    }

    pub fn vcpu(&self) -> Option<u32> {
        self.obj
            .attribute(constants::TEMPLATE_VCPU)
            .and_then(|v| v.parse().ok())
    }

    /// Host-occupancy intervals, oldest first. `None` when the history
    /// section is missing from the document entirely.
    pub fn history(&self) -> Option<Vec<HistoryInterval>> {
        let node = self.obj.doc.get("HISTORY_RECORDS")?.get("HISTORY")?;
        Some(entries(node).into_iter().map(HistoryInterval::parse).collect())
    }

    /// Network interfaces; `None` when the interface list is unavailable.
    pub fn nics(&self) -> Option<Vec<Nic>> {
        let node = self.obj.doc.get("TEMPLATE")?.get("NIC")?;
        Some(entries(node).into_iter().map(Nic::parse).collect())
    }

    /// Attached disks; `None` when the disk list is unavailable.
    pub fn disks(&self) -> Option<Vec<Disk>> {
        let node = self.obj.doc.get("TEMPLATE")?.get("DISK")?;
        Some(entries(node).into_iter().map(Disk::parse).collect())
    }
}

/// One occupancy interval of a virtual machine on a specific host.
/// An absent end means the machine still occupies the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryInterval {
    pub host_id: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl HistoryInterval {
    fn parse(doc: &Value) -> Self {
        Self {
            host_id: doc.get("HID").and_then(value_as_i64),
            start: epoch_field(doc, constants::START_TIME),
            end: epoch_field(doc, constants::END_TIME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nic {
    pub ip: Option<Ipv4Addr>,
    pub ip6_global: Option<Ipv6Addr>,
}

impl Nic {
    fn parse(doc: &Value) -> Self {
        Self {
            ip: doc
                .get("IP")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
            ip6_global: doc
                .get("IP6_GLOBAL")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub size: Option<u64>,
    pub image_id: Option<i64>,
}

impl Disk {
    fn parse(doc: &Value) -> Self {
        Self {
            size: doc
                .get("SIZE")
                .and_then(value_as_i64)
                .and_then(|s| u64::try_from(s).ok()),
            image_id: doc.get("IMAGE_ID").and_then(value_as_i64),
        }
    }
}

/// The control plane serializes repeated sections as a single object when
/// there is one entry and as an array otherwise.
fn entries(node: &Value) -> Vec<&Value> {
    match node {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Numeric values arrive either as JSON numbers or as decimal strings.
fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn epoch_field(doc: &Value, key: &str) -> Option<DateTime<Utc>> {
    let secs = doc.get(key).and_then(value_as_i64)?;
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

fn epoch_attribute(obj: &ResourceObject, key: &str) -> Option<DateTime<Utc>> {
    let secs = obj.attribute_i64(key)?;
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}
