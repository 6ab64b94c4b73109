use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An application profile in an existing fabric tenant.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "apic.aci.cisco",
    version = "v1alpha1",
    kind = "ApplicationProfile",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationProfileSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tenant: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn resource_identity() {
        assert_eq!(ApplicationProfile::group(&()), crate::GROUP);
        assert_eq!(ApplicationProfile::plural(&()), "applicationprofiles");
        assert_eq!(crate::Tenant::plural(&()), "tenants");
        assert_eq!(crate::SegmentationPolicy::plural(&()), "segmentationpolicies");
    }
}
