use super::reference::ReferenceTables;
use crate::config::SiteConfig;
use crate::constants;
use crate::control_plane::VirtualMachine;
use crate::domain::VmRecord;
use crate::error::{ExporterError, Result};
use chrono::{DateTime, Utc};
use std::net::Ipv4Addr;
use tracing::warn;

/// Maps one virtual machine plus the resolved reference tables to one
/// canonical accounting record.
///
/// Field derivations are independent of each other: a missing numeric ID,
/// deployment name, start time, or user ID aborts the whole record, while
/// every other missing attribute degrades to an absent field. Invocations
/// are safe to run concurrently; the tables are read-only and site identity
/// is fixed at construction.
pub struct RecordTransformer {
    site_name: String,
    cloud_type: String,
    cloud_compute_service: Option<String>,
}

impl RecordTransformer {
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            site_name: site.site_name.clone(),
            cloud_type: site.cloud_type.clone(),
            cloud_compute_service: site
                .cloud_compute_service
                .clone()
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn transform(&self, vm: &VirtualMachine, tables: &ReferenceTables) -> Result<VmRecord> {
        self.transform_at(vm, tables, Utc::now())
    }

    /// Like [`transform`](Self::transform) with an explicit "now", which is
    /// the effective end of history intervals that are still open.
    pub fn transform_at(
        &self,
        vm: &VirtualMachine,
        tables: &ReferenceTables,
        now: DateTime<Utc>,
    ) -> Result<VmRecord> {
        let id = vm.id().ok_or(ExporterError::MissingAttribute("ID"))?;
        let machine_name = vm
            .deploy_id()
            .ok_or(ExporterError::MissingAttribute(constants::DEPLOY_ID))?;
        let global_user_name = self.global_user_name(vm, tables)?;
        let start_time = vm
            .start_time()
            .ok_or(ExporterError::MissingAttribute(constants::START_TIME))?;

        let end_time = vm.end_time();
        let wall_duration = wall_duration(vm, now);
        let (benchmark_type, benchmark) = benchmark_fields(vm, tables);

        Ok(VmRecord {
            vm_uuid: id.to_string(),
            site_name: self.site_name.clone(),
            cloud_compute_service: self.cloud_compute_service.clone(),
            machine_name,
            local_user_id: vm.user_id().map(|id| id.to_string()),
            local_group_id: vm.group_id().map(|id| id.to_string()),
            global_user_name,
            fqan: vm
                .group_name()
                .map(|group| format!("/{group}/Role=NULL/Capability=NULL")),
            status: vm
                .state()
                .and_then(constants::vm_state_name)
                .map(str::to_string),
            start_time,
            end_time,
            suspend_duration: suspend_duration(start_time, end_time, wall_duration),
            wall_duration,
            // No separate CPU accounting; the wall clock is charged.
            cpu_duration: wall_duration,
            cpu_count: vm.vcpu().unwrap_or(0),
            network_type: None,
            network_inbound: parse_u64(vm.attribute(constants::MONITORING_NETTX)),
            network_outbound: parse_u64(vm.attribute(constants::MONITORING_NETRX)),
            public_ip_count: public_ip_count(vm),
            memory: parse_u64(vm.attribute(constants::TEMPLATE_MEMORY)),
            disk: disk_sizes(vm),
            benchmark_type,
            benchmark,
            storage_record_id: None,
            image_id: image_uri(vm, tables),
            cloud_type: Some(self.cloud_type.clone()),
        })
    }

    /// A failed user-ID lookup aborts the record; a resolvable user ID with
    /// no known identity only leaves the field absent. The asymmetry is part
    /// of the receiver contract.
    fn global_user_name(
        &self,
        vm: &VirtualMachine,
        tables: &ReferenceTables,
    ) -> Result<Option<String>> {
        let user_id = vm
            .user_id()
            .ok_or(ExporterError::MissingAttribute(constants::USER_ID))?;
        Ok(tables.identity(user_id).map(str::to_string))
    }
}

/// Sum of `effective_end - start` over all history intervals, where an open
/// interval (machine still occupying its host) ends "now". Intervals without
/// a start are skipped; absent only when the history itself is unavailable.
fn wall_duration(vm: &VirtualMachine, now: DateTime<Utc>) -> Option<i64> {
    let history = match vm.history() {
        Some(history) => history,
        None => {
            warn!("error get history records");
            return None;
        }
    };

    let mut sum = 0;
    for interval in &history {
        let Some(start) = interval.start else {
            continue;
        };
        let end = interval.end.unwrap_or(now);
        sum += end.timestamp() - start.timestamp();
    }

    Some(sum)
}

/// `end - start - wall`, only when all three are present. Negative results
/// are reported as-is.
fn suspend_duration(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    wall: Option<i64>,
) -> Option<i64> {
    let end = end?;
    let wall = wall?;
    Some(end.timestamp() - start.timestamp() - wall)
}

fn parse_u64(value: Option<String>) -> Option<u64> {
    value.and_then(|v| v.parse().ok())
}

/// Counts interfaces holding a globally routable address. Absent when the
/// interface list itself is unavailable; an available but empty list counts
/// as zero.
fn public_ip_count(vm: &VirtualMachine) -> Option<u64> {
    let nics = vm.nics()?;
    let count = nics
        .iter()
        .filter(|nic| nic.ip6_global.is_some() || nic.ip.is_some_and(is_public_ipv4))
        .count();
    Some(count as u64)
}

fn is_public_ipv4(ip: Ipv4Addr) -> bool {
    if ip.is_loopback() || ip.is_link_local() {
        return false;
    }

    let octets = ip.octets();
    let private = octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168);
    !private
}

fn disk_sizes(vm: &VirtualMachine) -> Option<u64> {
    let disks = vm.disks()?;
    Some(disks.iter().filter_map(|disk| disk.size).sum())
}

/// Benchmark of the host the machine first ran on. Unknown hosts, empty
/// ratings and non-numeric values all degrade to absent fields.
fn benchmark_fields(
    vm: &VirtualMachine,
    tables: &ReferenceTables,
) -> (Option<String>, Option<f32>) {
    let host_id = vm
        .history()
        .and_then(|history| history.first().and_then(|interval| interval.host_id));
    let Some(host_id) = host_id else {
        return (None, None);
    };
    let Some(benchmark) = tables.benchmark(host_id) else {
        return (None, None);
    };

    let kind = (!benchmark.kind.is_empty()).then(|| benchmark.kind.clone());
    let value = if benchmark.value.is_empty() {
        None
    } else {
        benchmark.value.parse::<f32>().ok()
    };
    (kind, value)
}

/// Provenance URI of the image behind the machine's first disk.
fn image_uri(vm: &VirtualMachine, tables: &ReferenceTables) -> Option<String> {
    let image_id = vm
        .disks()
        .and_then(|disks| disks.first().and_then(|disk| disk.image_id))?;
    tables.image_uri(image_id).map(str::to_string)
}
