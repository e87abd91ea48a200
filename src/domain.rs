use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical accounting record for one virtual machine, ready for
/// transmission to the remote collection service.
///
/// `vm_uuid`, `site_name`, `machine_name` and `start_time` are mandatory; a
/// resource that cannot produce them yields no record at all. Every other
/// field is optional, where `None` means "not reported" and is distinct from
/// zero. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    pub vm_uuid: String,
    pub site_name: String,
    pub cloud_compute_service: Option<String>,
    pub machine_name: String,
    pub local_user_id: Option<String>,
    pub local_group_id: Option<String>,
    pub global_user_name: Option<String>,
    pub fqan: Option<String>,
    pub status: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub suspend_duration: Option<i64>,
    pub wall_duration: Option<i64>,
    pub cpu_duration: Option<i64>,
    pub cpu_count: u32,
    /// Not derivable from the current attribute set; reserved.
    pub network_type: Option<String>,
    pub network_inbound: Option<u64>,
    pub network_outbound: Option<u64>,
    pub public_ip_count: Option<u64>,
    pub memory: Option<u64>,
    pub disk: Option<u64>,
    pub benchmark_type: Option<String>,
    pub benchmark: Option<f32>,
    /// Link to a storage record; never set for this record type.
    pub storage_record_id: Option<String>,
    pub image_id: Option<String>,
    /// Always emitted, even when empty; the receiver requires the field.
    pub cloud_type: Option<String>,
}
