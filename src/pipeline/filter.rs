use crate::control_plane::VirtualMachine;

/// Admission stage ahead of record transformation. Exists so future
/// policies (e.g. dropping machines by lifecycle state) can be added
/// without touching the pipeline. Implementations must be safe to call
/// concurrently for many resources.
pub trait AdmissionFilter: Send + Sync {
    fn admit(&self, vm: &VirtualMachine) -> bool;
}

/// Current policy: every virtual machine is admitted.
#[derive(Debug, Default)]
pub struct PassAllFilter;

impl AdmissionFilter for PassAllFilter {
    fn admit(&self, _vm: &VirtualMachine) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pass_all_admits_everything() {
        let filter = PassAllFilter;
        assert!(filter.admit(&VirtualMachine::new(json!({ "ID": "1" }))));
        assert!(filter.admit(&VirtualMachine::new(json!({}))));
    }
}
