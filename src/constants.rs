//! Attribute keys consumed from the control plane's object model.
//!
//! Attributes are addressed by slash-separated paths into the resource
//! document, e.g. `TEMPLATE/MEMORY`. A lookup can fail for any key when the
//! resource is in an inconsistent state, so every consumer carries its own
//! fallback policy.

/// Default user attribute holding the federated identity string.
pub const TEMPLATE_IDENTITY: &str = "TEMPLATE/IDENTITY";

/// Default image attribute holding the appliance provenance URI.
pub const TEMPLATE_APPLIANCE_URI: &str = "TEMPLATE/CLOUDKEEPER_APPLIANCE_MPURI";

/// Benchmark rating label, present on hosts and clusters.
pub const TEMPLATE_BENCHMARK_TYPE: &str = "TEMPLATE/BENCHMARK_TYPE";

/// Benchmark rating value, present on hosts and clusters.
pub const TEMPLATE_BENCHMARK_VALUE: &str = "TEMPLATE/BENCHMARK_VALUE";

pub const TEMPLATE_MEMORY: &str = "TEMPLATE/MEMORY";
pub const TEMPLATE_VCPU: &str = "TEMPLATE/VCPU";
pub const MONITORING_NETTX: &str = "MONITORING/NETTX";
pub const MONITORING_NETRX: &str = "MONITORING/NETRX";

pub const DEPLOY_ID: &str = "DEPLOY_ID";
pub const USER_ID: &str = "UID";
pub const GROUP_ID: &str = "GID";
pub const GROUP_NAME: &str = "GNAME";
pub const STATE: &str = "STATE";
pub const START_TIME: &str = "STIME";
pub const END_TIME: &str = "ETIME";
pub const CLUSTER_ID: &str = "CLUSTER_ID";

/// Fixed mapping from the control plane's numeric VM state to its
/// display name, indexed by state value.
const VM_STATES: [&str; 12] = [
    "INIT",
    "PENDING",
    "HOLD",
    "ACTIVE",
    "STOPPED",
    "SUSPENDED",
    "DONE",
    "FAILED",
    "POWEROFF",
    "UNDEPLOYED",
    "CLONING",
    "CLONING_FAILURE",
];

/// Maps a numeric VM state to its display name, if the state is known.
pub fn vm_state_name(state: i64) -> Option<&'static str> {
    usize::try_from(state).ok().and_then(|i| VM_STATES.get(i)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_states_map_to_names() {
        assert_eq!(vm_state_name(0), Some("INIT"));
        assert_eq!(vm_state_name(3), Some("ACTIVE"));
        assert_eq!(vm_state_name(8), Some("POWEROFF"));
    }

    #[test]
    fn out_of_range_states_are_unknown() {
        assert_eq!(vm_state_name(-1), None);
        assert_eq!(vm_state_name(12), None);
    }
}
