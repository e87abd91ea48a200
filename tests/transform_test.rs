use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;

use usage_exporter::config::SiteConfig;
use usage_exporter::control_plane::VirtualMachine;
use usage_exporter::error::ExporterError;
use usage_exporter::pipeline::{Benchmark, RecordTransformer, ReferenceTables};

fn site() -> SiteConfig {
    SiteConfig {
        site_name: "TEST-SITE".to_string(),
        cloud_type: "ACME Cloud".to_string(),
        cloud_compute_service: None,
    }
}

fn transformer() -> RecordTransformer {
    RecordTransformer::new(&site())
}

fn empty_tables() -> ReferenceTables {
    ReferenceTables::default()
}

fn tables_with(
    identities: &[(i64, &str)],
    images: &[(i64, &str)],
    benchmarks: &[(i64, &str, &str)],
) -> ReferenceTables {
    ReferenceTables::new(
        identities
            .iter()
            .map(|(id, v)| (*id, v.to_string()))
            .collect(),
        images.iter().map(|(id, v)| (*id, v.to_string())).collect(),
        benchmarks
            .iter()
            .map(|(id, kind, value)| {
                (
                    *id,
                    Benchmark {
                        kind: kind.to_string(),
                        value: value.to_string(),
                    },
                )
            })
            .collect::<HashMap<_, _>>(),
    )
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

#[test]
fn running_machine_produces_full_record() {
    let start = t0();
    let now = start + chrono::Duration::hours(2);
    let vm = VirtualMachine::new(json!({
        "ID": "42",
        "DEPLOY_ID": "vm-42",
        "UID": "5",
        "STATE": 3,
        "STIME": start.timestamp(),
        "ETIME": 0,
        "TEMPLATE": { "VCPU": "2" },
        "HISTORY_RECORDS": { "HISTORY": { "HID": 1, "STIME": start.timestamp(), "ETIME": 0 } }
    }));

    let record = transformer()
        .transform_at(&vm, &empty_tables(), now)
        .expect("record should be produced");

    assert_eq!(record.vm_uuid, "42");
    assert_eq!(record.machine_name, "vm-42");
    assert_eq!(record.site_name, "TEST-SITE");
    assert_eq!(record.status.as_deref(), Some("ACTIVE"));
    assert_eq!(record.start_time, start);
    assert_eq!(record.end_time, None);
    assert_eq!(record.wall_duration, Some(7200));
    assert_eq!(record.cpu_duration, Some(7200));
    assert_eq!(record.suspend_duration, None);
    assert_eq!(record.cpu_count, 2);
    assert_eq!(record.local_user_id.as_deref(), Some("5"));
    // user resolvable but unknown to the identity table: field absent
    assert_eq!(record.global_user_name, None);
    assert_eq!(record.memory, None);
    assert_eq!(record.disk, None);
    assert_eq!(record.network_inbound, None);
    assert_eq!(record.network_outbound, None);
    assert_eq!(record.public_ip_count, None);
    assert_eq!(record.benchmark_type, None);
    assert_eq!(record.cloud_type.as_deref(), Some("ACME Cloud"));
    assert_eq!(record.network_type, None);
    assert_eq!(record.storage_record_id, None);
}

#[test]
fn mandatory_fields_abort_the_record() {
    let now = t0();
    let complete = json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": now.timestamp()
    });

    for missing in ["ID", "DEPLOY_ID", "UID", "STIME"] {
        let mut doc = complete.clone();
        doc.as_object_mut().unwrap().remove(missing);
        let err = transformer()
            .transform_at(&VirtualMachine::new(doc), &empty_tables(), now)
            .expect_err("record should abort");
        assert!(
            matches!(err, ExporterError::MissingAttribute(_)),
            "unexpected error for {missing}: {err}"
        );
    }
}

#[test]
fn wall_duration_sums_intervals_and_skips_startless_ones() {
    let now = Utc.timestamp_opt(10_000, 0).unwrap();
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 100,
        "HISTORY_RECORDS": { "HISTORY": [
            { "HID": 1, "STIME": 100, "ETIME": 600 },
            { "HID": 2, "STIME": 0, "ETIME": 900 },
            { "HID": 3, "STIME": 9000, "ETIME": 0 }
        ]}
    }));

    let record = transformer()
        .transform_at(&vm, &empty_tables(), now)
        .unwrap();

    // 500 from the closed interval, 1000 from the open one measured to now,
    // nothing from the interval without a start
    assert_eq!(record.wall_duration, Some(1500));
}

#[test]
fn missing_history_leaves_wall_duration_absent() {
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 100
    }));

    let record = transformer()
        .transform_at(&vm, &empty_tables(), t0())
        .unwrap();
    assert_eq!(record.wall_duration, None);
    assert_eq!(record.suspend_duration, None);
}

#[test]
fn suspend_duration_is_not_clamped() {
    let now = Utc.timestamp_opt(10_000, 0).unwrap();
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 1000,
        "ETIME": 2000,
        "HISTORY_RECORDS": { "HISTORY": { "HID": 1, "STIME": 1000, "ETIME": 2500 } }
    }));

    let record = transformer()
        .transform_at(&vm, &empty_tables(), now)
        .unwrap();

    assert_eq!(record.wall_duration, Some(1500));
    // end - start - wall = 1000 - 1500
    assert_eq!(record.suspend_duration, Some(-500));
}

#[test]
fn private_addresses_are_not_public_ips() {
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 100,
        "TEMPLATE": { "NIC": [
            { "IP": "10.0.0.7" },
            { "IP": "172.16.4.1" },
            { "IP": "192.168.1.2" },
            { "IP": "127.0.0.1" },
            { "IP": "169.254.0.9" }
        ]}
    }));

    let record = transformer()
        .transform_at(&vm, &empty_tables(), t0())
        .unwrap();
    assert_eq!(record.public_ip_count, Some(0));
}

#[test]
fn routable_addresses_are_counted() {
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 100,
        "TEMPLATE": { "NIC": [
            { "IP": "8.8.8.8" },
            { "IP": "10.0.0.7", "IP6_GLOBAL": "2001:db8::1" }
        ]}
    }));

    let record = transformer()
        .transform_at(&vm, &empty_tables(), t0())
        .unwrap();
    assert_eq!(record.public_ip_count, Some(2));
}

#[test]
fn known_identity_is_used_verbatim() {
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "GID": "20",
        "GNAME": "physics",
        "STIME": 100
    }));
    let tables = tables_with(&[(5, "CN=alice")], &[], &[]);

    let record = transformer().transform_at(&vm, &tables, t0()).unwrap();
    assert_eq!(record.global_user_name.as_deref(), Some("CN=alice"));
    assert_eq!(record.local_group_id.as_deref(), Some("20"));
    assert_eq!(
        record.fqan.as_deref(),
        Some("/physics/Role=NULL/Capability=NULL")
    );
}

#[test]
fn benchmark_comes_from_the_first_occupied_host() {
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 100,
        "HISTORY_RECORDS": { "HISTORY": [
            { "HID": 7, "STIME": 100, "ETIME": 200 },
            { "HID": 8, "STIME": 200, "ETIME": 300 }
        ]}
    }));
    let tables = tables_with(
        &[],
        &[],
        &[(7, "HEPSPEC06", "11.5"), (8, "HEPSPEC06", "99.0")],
    );

    let record = transformer().transform_at(&vm, &tables, t0()).unwrap();
    assert_eq!(record.benchmark_type.as_deref(), Some("HEPSPEC06"));
    assert_eq!(record.benchmark, Some(11.5));
}

#[test]
fn non_numeric_benchmark_value_is_absent() {
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 100,
        "HISTORY_RECORDS": { "HISTORY": { "HID": 7, "STIME": 100, "ETIME": 200 } }
    }));
    let tables = tables_with(&[], &[], &[(7, "HEPSPEC06", "fast")]);

    let record = transformer().transform_at(&vm, &tables, t0()).unwrap();
    assert_eq!(record.benchmark_type.as_deref(), Some("HEPSPEC06"));
    assert_eq!(record.benchmark, None);
}

#[test]
fn image_uri_comes_from_the_first_disk() {
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 100,
        "TEMPLATE": { "DISK": [
            { "SIZE": "2048", "IMAGE_ID": "3" },
            { "SIZE": "1024", "IMAGE_ID": "4" }
        ]}
    }));
    let tables = tables_with(&[], &[(3, "https://appdb.example.org/image/3")], &[]);

    let record = transformer().transform_at(&vm, &tables, t0()).unwrap();
    assert_eq!(
        record.image_id.as_deref(),
        Some("https://appdb.example.org/image/3")
    );
    assert_eq!(record.disk, Some(3072));
}

#[test]
fn monitoring_counters_parse_as_unsigned() {
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 100,
        "TEMPLATE": { "MEMORY": "4096" },
        "MONITORING": { "NETTX": "123456", "NETRX": "not-a-number" }
    }));

    let record = transformer()
        .transform_at(&vm, &empty_tables(), t0())
        .unwrap();
    assert_eq!(record.memory, Some(4096));
    assert_eq!(record.network_inbound, Some(123456));
    assert_eq!(record.network_outbound, None);
}

#[test]
fn empty_cloud_type_is_still_emitted() {
    let site = SiteConfig {
        site_name: "TEST-SITE".to_string(),
        cloud_type: String::new(),
        cloud_compute_service: None,
    };
    let vm = VirtualMachine::new(json!({
        "ID": "1",
        "DEPLOY_ID": "vm-1",
        "UID": "5",
        "STIME": 100
    }));

    let record = RecordTransformer::new(&site)
        .transform_at(&vm, &empty_tables(), t0())
        .unwrap();
    assert_eq!(record.cloud_type.as_deref(), Some(""));
}

#[test]
fn transformation_is_deterministic() {
    let now = t0();
    let vm = VirtualMachine::new(json!({
        "ID": "42",
        "DEPLOY_ID": "vm-42",
        "UID": "5",
        "STATE": 3,
        "STIME": 100,
        "HISTORY_RECORDS": { "HISTORY": { "HID": 1, "STIME": 100, "ETIME": 0 } }
    }));
    let tables = tables_with(&[(5, "CN=alice")], &[], &[(1, "HEPSPEC06", "11.5")]);

    let transformer = transformer();
    let first = transformer.transform_at(&vm, &tables, now).unwrap();
    let second = transformer.transform_at(&vm, &tables, now).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
