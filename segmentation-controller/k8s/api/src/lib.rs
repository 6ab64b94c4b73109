#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod application_profile;
pub mod segmentation_policy;
pub mod tenant;

pub use self::{
    application_profile::{ApplicationProfile, ApplicationProfileSpec},
    segmentation_policy::{
        RuleSpec, SegmentationPolicy, SegmentationPolicySpec, SegmentationPolicyStatus,
    },
    tenant::{Tenant, TenantSpec},
};
pub use k8s_openapi::api::core::v1::Namespace;
pub use kube::api::{ObjectMeta, ResourceExt};

/// The API group shared by every resource this controller manages.
pub const GROUP: &str = "apic.aci.cisco";

/// Set on a namespace to the distinguished name of the endpoint group it was
/// placed in.
pub const EPG_ANNOTATION: &str = "apic.aci.cisco/epg";
