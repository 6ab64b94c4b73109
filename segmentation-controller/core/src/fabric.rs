//! The capability surface of the network fabric controller.
//!
//! The reconciler is written entirely against [`FabricGateway`]. Every call is
//! a single atomic operation on the fabric; the reconciler never holds locks
//! across calls and instead re-reads fabric state before each write.

pub mod memory;

use crate::Rule;
use std::fmt;

/// Identifies an endpoint group within a tenant's application profile.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpgRef {
    pub tenant: String,
    pub app_profile: String,
    pub name: String,
}

/// An object that may carry ownership annotations.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectId {
    Epg(EpgRef),
    Filter { tenant: String, name: String },
}

/// Where to look when enumerating annotated objects.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnnotationScope {
    /// The endpoint groups of an application profile.
    Epgs { tenant: String, app_profile: String },
    /// The filters of a tenant.
    Filters { tenant: String },
}

/// Contracts consumed and provided by an endpoint group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    pub consumed: Vec<String>,
    pub provided: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    /// Network, authentication, or rate-limit failures. These are never
    /// retried in place; the triggering event is redelivered instead.
    #[error("fabric request failed: {0}")]
    Transient(#[source] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[async_trait::async_trait]
pub trait FabricGateway: Send + Sync {
    async fn create_tenant(&self, name: &str, description: &str) -> Result<()>;

    async fn delete_tenant(&self, name: &str) -> Result<()>;

    /// Creates the application profile or overwrites its attributes.
    async fn create_application_profile(
        &self,
        tenant: &str,
        name: &str,
        description: &str,
    ) -> Result<()>;

    async fn delete_application_profile(&self, tenant: &str, name: &str) -> Result<()>;

    async fn application_profile_exists(&self, tenant: &str, name: &str) -> Result<bool>;

    /// Returns true when the application profile holds no endpoint groups.
    async fn application_profile_is_empty(&self, tenant: &str, name: &str) -> Result<bool>;

    async fn create_epg(
        &self,
        epg: &EpgRef,
        description: &str,
        bridge_domain: &str,
        vmm_domain: &str,
    ) -> Result<()>;

    async fn delete_epg(&self, epg: &EpgRef) -> Result<()>;

    async fn epg_exists(&self, epg: &EpgRef) -> Result<bool>;

    /// Makes `epg` inherit contracts from a master endpoint group in the same
    /// tenant.
    async fn inherit_from_master(
        &self,
        epg: &EpgRef,
        master_app_profile: &str,
        master_epg: &str,
    ) -> Result<()>;

    async fn add_annotation(&self, object: &ObjectId, key: &str, value: &str) -> Result<()>;

    async fn remove_annotation(&self, object: &ObjectId, key: &str) -> Result<()>;

    /// Lists the annotation keys set on `object`.
    async fn list_annotations(&self, object: &ObjectId) -> Result<Vec<String>>;

    /// Lists the names of objects in `scope` annotated with `key`.
    async fn list_objects_with_annotation(
        &self,
        scope: &AnnotationScope,
        key: &str,
    ) -> Result<Vec<String>>;

    /// Creates the contract and its identically named subject, associating
    /// each of `filters` with the subject. Existing associations are kept.
    async fn create_contract(&self, tenant: &str, name: &str, filters: &[String]) -> Result<()>;

    async fn delete_contract(&self, tenant: &str, name: &str) -> Result<()>;

    async fn contract_exists(&self, tenant: &str, name: &str) -> Result<bool>;

    async fn subject_filters(&self, tenant: &str, name: &str) -> Result<Vec<String>>;

    async fn remove_filter_from_subject(&self, tenant: &str, name: &str, filter: &str)
        -> Result<()>;

    async fn consume(&self, epg: &EpgRef, contract: &str) -> Result<()>;

    async fn provide(&self, epg: &EpgRef, contract: &str) -> Result<()>;

    async fn remove_consume(&self, epg: &EpgRef, contract: &str) -> Result<()>;

    async fn remove_provide(&self, epg: &EpgRef, contract: &str) -> Result<()>;

    async fn bindings(&self, epg: &EpgRef) -> Result<Bindings>;

    async fn create_filter(&self, tenant: &str, name: &str, rule: &Rule) -> Result<()>;

    async fn delete_filter(&self, tenant: &str, name: &str) -> Result<()>;

    async fn filter_exists(&self, tenant: &str, name: &str) -> Result<bool>;
}

// === impl EpgRef ===

impl EpgRef {
    pub fn new(tenant: impl ToString, app_profile: impl ToString, name: impl ToString) -> Self {
        Self {
            tenant: tenant.to_string(),
            app_profile: app_profile.to_string(),
            name: name.to_string(),
        }
    }
}

/// Renders the fabric's distinguished name for the endpoint group.
impl fmt::Display for EpgRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uni/tn-{}/ap-{}/epg-{}",
            self.tenant, self.app_profile, self.name
        )
    }
}

// === impl ObjectId ===

impl ObjectId {
    pub fn filter(tenant: impl ToString, name: impl ToString) -> Self {
        Self::Filter {
            tenant: tenant.to_string(),
            name: name.to_string(),
        }
    }
}

impl From<EpgRef> for ObjectId {
    fn from(epg: EpgRef) -> Self {
        Self::Epg(epg)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epg(epg) => epg.fmt(f),
            Self::Filter { tenant, name } => write!(f, "uni/tn-{tenant}/flt-{name}"),
        }
    }
}

// === impl Error ===

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Treats a missing object as an already-satisfied delete or removal.
pub fn ignore_not_found(res: Result<()>) -> Result<()> {
    match res {
        Err(error) if error.is_not_found() => {
            tracing::debug!(%error, "Ignoring missing object");
            Ok(())
        }
        res => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinguished_names() {
        let epg = EpgRef::new("k8s-tenant", "Seg_Pol_k8s-tenant", "ns-a");
        assert_eq!(epg.to_string(), "uni/tn-k8s-tenant/ap-Seg_Pol_k8s-tenant/epg-ns-a");
        assert_eq!(
            ObjectId::filter("k8s-tenant", "segpol1_iptcp80").to_string(),
            "uni/tn-k8s-tenant/flt-segpol1_iptcp80"
        );
        assert_eq!(ObjectId::from(epg.clone()).to_string(), epg.to_string());
    }

    #[test]
    fn not_found_is_ignored() {
        assert!(ignore_not_found(Err(Error::NotFound("x".into()))).is_ok());
        assert!(ignore_not_found(Err(Error::Transient(anyhow::anyhow!("timeout")))).is_err());
    }
}
