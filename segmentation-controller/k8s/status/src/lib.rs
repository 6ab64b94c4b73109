#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod metrics;
mod namespace;
mod policy;

#[cfg(test)]
mod tests;

pub use self::{
    metrics::PatchMetrics,
    namespace::{annotation_patch, NamespaceAnnotator},
    policy::{make_patch, StatusWriter},
};
