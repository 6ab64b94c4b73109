use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A fabric tenant.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "apic.aci.cisco",
    version = "v1alpha1",
    kind = "Tenant",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}
