#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod fabric;
pub mod naming;
pub mod reconcile;
pub mod resolve;
pub mod sets;
pub mod status;

pub use self::{
    fabric::{EpgRef, FabricGateway},
    reconcile::{FabricConfig, NamespaceMarker, Reconciler, TenantUsage},
    status::{Phase, PolicyStatus, StatusSink},
};
use std::num::NonZeroU16;

/// The desired state of a single segmentation policy, detached from the
/// cluster object that carries it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub tenant: String,
    /// Namespaces the policy wants segmented. May name namespaces that do not
    /// exist in the cluster and may contain duplicates.
    pub namespaces: Vec<String>,
    pub rules: Vec<Rule>,
}

/// An allowed L3/L4 traffic class. Blank fields match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rule {
    pub ether_type: String,
    pub ip_protocol: String,
    pub port: Option<NonZeroU16>,
}

// === impl Rule ===

impl Rule {
    pub fn new(ether_type: impl ToString, ip_protocol: impl ToString, port: u16) -> Self {
        Self {
            ether_type: ether_type.to_string(),
            ip_protocol: ip_protocol.to_string(),
            port: NonZeroU16::new(port),
        }
    }

    /// The port as the fabric expects it, where zero means unrestricted.
    pub fn port_number(&self) -> u16 {
        self.port.map_or(0, NonZeroU16::get)
    }
}
