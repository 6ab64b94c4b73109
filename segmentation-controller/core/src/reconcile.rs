//! Converges the fabric toward a single policy's desired state.
//!
//! Every reconciliation is a full, level-based pass: the fabric is re-read
//! before each write, so repeating a pass against unchanged inputs issues no
//! mutations at all and a pass interrupted midway is completed by the next
//! one. Ownership of shared endpoint groups is recorded on the fabric itself,
//! as one annotation per owning policy, so no in-process coordination between
//! policies is needed.

mod epgs;
mod filters;


use crate::{
    fabric::{self, AnnotationScope, EpgRef, FabricGateway},
    naming::{self, InvalidName},
    resolve, sets,
    status::{Phase, PolicyStatus, StatusSink},
    Policy, Rule,
};
use tracing::{debug, info, info_span, warn, Instrument};

/// How newly created endpoint groups attach to the fabric.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FabricConfig {
    pub bridge_domain: String,
    pub vmm_domain: String,
    pub master_app_profile: String,
    pub master_epg: String,
}

/// Records which endpoint group a cluster namespace was placed in.
///
/// This is informational only. Failures are logged and never fail a
/// reconciliation.
#[async_trait::async_trait]
pub trait NamespaceMarker: Send + Sync {
    async fn mark(&self, namespace: &str, epg: &EpgRef) -> anyhow::Result<()>;

    async fn unmark(&self, namespace: &str) -> anyhow::Result<()>;
}

/// Reports whether a policy other than the one being reconciled still targets
/// a tenant. A tenant's application profile is only deleted when it is unused.
pub trait TenantUsage: Send + Sync {
    fn in_use(&self, tenant: &str) -> bool;
}

impl<F: Fn(&str) -> bool + Send + Sync> TenantUsage for F {
    fn in_use(&self, tenant: &str) -> bool {
        (self)(tenant)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Gateway(#[from] fabric::Error),

    /// The policy can never be applied as written. Nothing was changed on the
    /// fabric.
    #[error("invalid policy: {0}")]
    Invalid(#[from] InvalidName),
}

#[derive(Clone, Debug)]
pub struct Reconciler<G> {
    gateway: G,
    config: FabricConfig,
}

// === impl Reconciler ===

impl<G: FabricGateway> Reconciler<G> {
    pub fn new(gateway: G, config: FabricConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Creates or updates the fabric objects for `policy`.
    ///
    /// `live` is the set of namespaces that currently exist in the cluster and
    /// `previous` is the status most recently recorded for the policy. Status
    /// is only published when it would change, so a policy that is already
    /// enforced produces neither fabric mutations nor status writes.
    ///
    /// When the tenant has changed since `previous` was recorded, the policy's
    /// objects in the old tenant are removed first, along with that tenant's
    /// application profile if `usage` reports no other policy there.
    pub async fn apply(
        &self,
        policy: &Policy,
        live: &[String],
        previous: &PolicyStatus,
        usage: &impl TenantUsage,
        status: &impl StatusSink,
        marker: &impl NamespaceMarker,
    ) -> Result<(), Error> {
        if let Err(error) = naming::validate(policy) {
            let invalid = PolicyStatus::invalid(&error);
            if previous.message != invalid.message {
                status.publish(&invalid).await;
            }
            return Err(error.into());
        }

        if let Some(tenant) = previous
            .tenant
            .as_deref()
            .filter(|t| *t != policy.tenant && naming::validate_name("tenant", t).is_ok())
        {
            info!(previous = %tenant, "Tenant changed; releasing objects in the previous tenant");
            self.retire(&policy.name, tenant, usage, marker).await?;
        }

        let namespaces = resolve::namespaces(live, &policy.namespaces);
        let progress =
            |phase| PolicyStatus::progress(&policy.tenant, &namespaces, &policy.rules, phase);
        let steady = *previous == progress(Phase::Enforced);
        if !steady {
            status.publish(&progress(Phase::Creating)).await;
        }

        let app_profile = naming::application_profile(&policy.tenant);
        if !self
            .gateway
            .application_profile_exists(&policy.tenant, &app_profile)
            .await?
        {
            self.gateway
                .create_application_profile(&policy.tenant, &app_profile, "")
                .await?;
            info!(%app_profile, "Created application profile");
        }

        for ns in &namespaces {
            let epg = EpgRef::new(&policy.tenant, &app_profile, ns);
            self.claim_epg(&policy.name, &epg, marker).await?;
        }

        let scope = AnnotationScope::Epgs {
            tenant: policy.tenant.clone(),
            app_profile: app_profile.clone(),
        };
        let owned = self.annotated(&scope, &policy.name).await?;
        for ns in sets::unique(&namespaces, &owned) {
            let epg = EpgRef::new(&policy.tenant, &app_profile, ns);
            self.release_epg(&policy.name, &epg, marker).await?;
        }

        if !steady {
            status.publish(&progress(Phase::EpgsCreated)).await;
        }

        self.converge_contract(&policy.name, &policy.tenant, &policy.rules)
            .await?;

        if !steady {
            status.publish(&progress(Phase::Enforced)).await;
            info!(namespaces = namespaces.len(), rules = policy.rules.len(), "Enforced");
        }
        Ok(())
    }

    /// Removes every fabric object `policy` owns and releases its claim on
    /// shared endpoint groups.
    ///
    /// `policy` must be a snapshot taken before the finalizer is released;
    /// nothing here re-reads it. The application profile is deleted once it
    /// holds no endpoint groups, unless `usage` reports that another policy
    /// still targets the tenant.
    pub async fn cleanup(
        &self,
        policy: &Policy,
        previous: &PolicyStatus,
        usage: &impl TenantUsage,
        status: &impl StatusSink,
        marker: &impl NamespaceMarker,
    ) -> Result<(), Error> {
        status
            .publish(&PolicyStatus {
                phase: Some(Phase::Deleting),
                ..PolicyStatus::default()
            })
            .await;

        if let Err(error) = naming::validate_name("policy", &policy.name) {
            // Nothing can have been created under an unusable name.
            debug!(%error, "Skipping teardown");
            return Ok(());
        }

        if let Some(tenant) = previous
            .tenant
            .as_deref()
            .filter(|t| *t != policy.tenant && naming::validate_name("tenant", t).is_ok())
        {
            self.retire(&policy.name, tenant, usage, marker).await?;
        }

        if let Err(error) = naming::validate_name("tenant", &policy.tenant) {
            debug!(%error, "Skipping teardown");
            return Ok(());
        }

        self.teardown(
            &policy.name,
            &policy.tenant,
            &policy.rules,
            &policy.namespaces,
            marker,
        )
        .await?;

        self.release_app_profile(&policy.tenant, usage).await?;

        info!("Released fabric objects");
        Ok(())
    }

    /// Deletes the filters and contract `policy` owns in `tenant` and releases
    /// its endpoint groups there. Objects are found both from the given rules
    /// and namespaces and from the policy's ownership annotations, so this is
    /// complete even when the spec that created them is no longer known.
    async fn teardown(
        &self,
        policy: &str,
        tenant: &str,
        rules: &[Rule],
        namespaces: &[String],
        marker: &impl NamespaceMarker,
    ) -> Result<(), Error> {
        let mut filters = rules
            .iter()
            .map(|rule| naming::filter(policy, rule))
            .filter(|name| naming::validate_name("filter", name).is_ok())
            .collect::<Vec<_>>();
        let scope = AnnotationScope::Filters {
            tenant: tenant.to_string(),
        };
        filters.extend(self.annotated(&scope, policy).await?);
        for filter in sets::dedup(filters) {
            fabric::ignore_not_found(self.gateway.delete_filter(tenant, &filter).await)?;
            debug!(%filter, "Deleted filter");
        }

        fabric::ignore_not_found(
            self.gateway
                .delete_contract(tenant, naming::contract(policy))
                .await,
        )?;
        debug!(contract = %naming::contract(policy), "Deleted contract");

        let app_profile = naming::application_profile(tenant);
        let scope = AnnotationScope::Epgs {
            tenant: tenant.to_string(),
            app_profile: app_profile.clone(),
        };
        let mut epgs = namespaces.to_vec();
        epgs.extend(self.annotated(&scope, policy).await?);
        for ns in sets::dedup(epgs) {
            let epg = EpgRef::new(tenant, &app_profile, ns);
            self.release_epg(policy, &epg, marker).await?;
        }

        Ok(())
    }

    /// Removes everything `policy` left in a tenant it no longer targets.
    async fn retire(
        &self,
        policy: &str,
        tenant: &str,
        usage: &impl TenantUsage,
        marker: &impl NamespaceMarker,
    ) -> Result<(), Error> {
        async {
            self.teardown(policy, tenant, &[], &[], marker).await?;
            self.release_app_profile(tenant, usage).await
        }
        .instrument(info_span!("retire", %tenant))
        .await
    }

    /// Deletes `tenant`'s application profile if it holds no endpoint groups
    /// and no other policy targets the tenant.
    async fn release_app_profile(
        &self,
        tenant: &str,
        usage: &impl TenantUsage,
    ) -> Result<(), Error> {
        let app_profile = naming::application_profile(tenant);
        if usage.in_use(tenant) {
            debug!(%app_profile, "Application profile is still in use");
            return Ok(());
        }
        if !self
            .gateway
            .application_profile_exists(tenant, &app_profile)
            .await?
            || !self
                .gateway
                .application_profile_is_empty(tenant, &app_profile)
                .await?
        {
            return Ok(());
        }
        fabric::ignore_not_found(
            self.gateway
                .delete_application_profile(tenant, &app_profile)
                .await,
        )?;
        info!(%app_profile, "Deleted application profile");
        Ok(())
    }

    /// Lists the objects in `scope` owned by `policy`, treating a missing
    /// container as empty.
    async fn annotated(&self, scope: &AnnotationScope, policy: &str) -> fabric::Result<Vec<String>> {
        match self.gateway.list_objects_with_annotation(scope, policy).await {
            Err(error) if error.is_not_found() => Ok(Vec::new()),
            res => res,
        }
    }
}

async fn mark(marker: &impl NamespaceMarker, epg: &EpgRef) {
    if let Err(error) = marker.mark(&epg.name, epg).await {
        warn!(namespace = %epg.name, %error, "Failed to annotate namespace");
    }
}

async fn unmark(marker: &impl NamespaceMarker, namespace: &str) {
    if let Err(error) = marker.unmark(namespace).await {
        warn!(%namespace, %error, "Failed to clear namespace annotation");
    }
}
