//! Controllers for resources that map one-to-one onto a fabric object.

use crate::{
    core::{fabric, naming, reconcile, FabricGateway},
    k8s::{ApplicationProfile, ResourceExt, Tenant},
    metrics::{Outcome, ReconcileMetrics},
    Error, Result,
};
use kube::{
    api::Api,
    runtime::{
        controller::Action,
        finalizer::{finalizer, Event},
    },
    Client, Resource,
};
use k8s_openapi::NamespaceResourceScope;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, sync::Arc, time::Duration};

/// A custom resource that is created on the fabric when applied and deleted
/// from it when the resource is removed.
#[async_trait::async_trait]
pub(crate) trait FabricObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static
{
    const KIND: &'static str;
    const FINALIZER: &'static str;

    async fn create<G: FabricGateway>(&self, gateway: &G) -> Result<(), reconcile::Error>;

    async fn delete<G: FabricGateway>(&self, gateway: &G) -> Result<(), reconcile::Error>;
}

pub(crate) struct Context<G> {
    pub(crate) client: Client,
    pub(crate) gateway: G,
    pub(crate) requeue_after: Duration,
    pub(crate) error_backoff: Duration,
    pub(crate) metrics: ReconcileMetrics,
}

#[tracing::instrument(skip_all, fields(kind = K::KIND, name = %obj.name_any()))]
pub(crate) async fn reconcile<K, G>(obj: Arc<K>, ctx: Arc<Context<G>>) -> Result<Action>
where
    K: FabricObject,
    G: FabricGateway,
{
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::MissingObjectKey(format!("{} {}", K::KIND, obj.name_any())))?;
    let api = Api::<K>::namespaced(ctx.client.clone(), &namespace);

    let res = finalizer(&api, K::FINALIZER, obj, |event| async {
        match event {
            Event::Apply(obj) => match obj.create(&ctx.gateway).await {
                Ok(()) => {
                    ctx.metrics.record(K::KIND, Outcome::Applied);
                    Ok(Action::requeue(ctx.requeue_after))
                }
                Err(reconcile::Error::Invalid(error)) => {
                    tracing::warn!(%error, "Ignoring invalid resource");
                    ctx.metrics.record(K::KIND, Outcome::Invalid);
                    Ok(Action::await_change())
                }
                Err(error) => Err(Error::from(error)),
            },
            Event::Cleanup(obj) => {
                obj.delete(&ctx.gateway).await?;
                ctx.metrics.record(K::KIND, Outcome::Cleaned);
                Ok::<_, Error>(Action::await_change())
            }
        }
    })
    .await;

    res.map_err(|error| {
        ctx.metrics.record(K::KIND, Outcome::Failed);
        Error::from(error)
    })
}

pub(crate) fn error_policy<K, G>(obj: Arc<K>, error: &Error, ctx: Arc<Context<G>>) -> Action
where
    K: FabricObject,
{
    tracing::warn!(kind = K::KIND, name = %obj.name_any(), %error, "Reconcile failed");
    Action::requeue(ctx.error_backoff)
}

// === impl Tenant ===

#[async_trait::async_trait]
impl FabricObject for Tenant {
    const KIND: &'static str = "Tenant";
    const FINALIZER: &'static str = "finalizers.tenants.apic.aci.cisco/delete";

    async fn create<G: FabricGateway>(&self, gateway: &G) -> Result<(), reconcile::Error> {
        naming::validate_name("tenant", &self.spec.name)?;
        gateway
            .create_tenant(&self.spec.name, &self.spec.description)
            .await?;
        tracing::info!(tenant = %self.spec.name, "Created tenant");
        Ok(())
    }

    async fn delete<G: FabricGateway>(&self, gateway: &G) -> Result<(), reconcile::Error> {
        // An invalid name was never created.
        if naming::validate_name("tenant", &self.spec.name).is_err() {
            return Ok(());
        }
        fabric::ignore_not_found(gateway.delete_tenant(&self.spec.name).await)?;
        tracing::info!(tenant = %self.spec.name, "Deleted tenant");
        Ok(())
    }
}

// === impl ApplicationProfile ===

#[async_trait::async_trait]
impl FabricObject for ApplicationProfile {
    const KIND: &'static str = "ApplicationProfile";
    const FINALIZER: &'static str = "finalizers.applicationprofiles.apic.aci.cisco/delete";

    async fn create<G: FabricGateway>(&self, gateway: &G) -> Result<(), reconcile::Error> {
        naming::validate_name("tenant", &self.spec.tenant)?;
        naming::validate_name("application profile", &self.spec.name)?;
        gateway
            .create_application_profile(&self.spec.tenant, &self.spec.name, &self.spec.description)
            .await?;
        tracing::info!(tenant = %self.spec.tenant, app_profile = %self.spec.name, "Created application profile");
        Ok(())
    }

    async fn delete<G: FabricGateway>(&self, gateway: &G) -> Result<(), reconcile::Error> {
        if naming::validate_name("tenant", &self.spec.tenant).is_err()
            || naming::validate_name("application profile", &self.spec.name).is_err()
        {
            return Ok(());
        }
        fabric::ignore_not_found(
            gateway
                .delete_application_profile(&self.spec.tenant, &self.spec.name)
                .await,
        )?;
        tracing::info!(tenant = %self.spec.tenant, app_profile = %self.spec.name, "Deleted application profile");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{fabric::memory::MemoryFabric, EpgRef},
        k8s::{ApplicationProfileSpec, TenantSpec},
    };

    fn tenant(name: &str) -> Tenant {
        Tenant::new(
            "t",
            TenantSpec {
                name: name.to_string(),
                description: "test tenant".to_string(),
            },
        )
    }

    fn app_profile(tenant: &str, name: &str) -> ApplicationProfile {
        ApplicationProfile::new(
            "ap",
            ApplicationProfileSpec {
                name: name.to_string(),
                description: String::new(),
                tenant: tenant.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn tenant_lifecycle() {
        let fabric = MemoryFabric::default();
        let obj = tenant("k8s-tenant");

        obj.create(&fabric).await.unwrap();
        obj.create(&fabric).await.unwrap();
        assert_eq!(fabric.tenants(), vec!["k8s-tenant".to_string()]);

        obj.delete(&fabric).await.unwrap();
        obj.delete(&fabric).await.unwrap();
        assert!(fabric.tenants().is_empty());
    }

    #[tokio::test]
    async fn invalid_tenants_are_not_created() {
        let fabric = MemoryFabric::default();
        let obj = tenant("no spaces");

        assert!(matches!(
            obj.create(&fabric).await,
            Err(reconcile::Error::Invalid(_))
        ));
        obj.delete(&fabric).await.unwrap();
        assert_eq!(fabric.mutations(), 0);
    }

    #[tokio::test]
    async fn application_profile_lifecycle() {
        let fabric = MemoryFabric::default();
        tenant("k8s-tenant").create(&fabric).await.unwrap();

        let obj = app_profile("k8s-tenant", "web");
        obj.create(&fabric).await.unwrap();
        assert!(fabric
            .application_profile_exists("k8s-tenant", "web")
            .await
            .unwrap());

        let epg = EpgRef::new("k8s-tenant", "web", "frontend");
        fabric.create_epg(&epg, "", "bd", "vmm").await.unwrap();

        obj.delete(&fabric).await.unwrap();
        assert!(!fabric
            .application_profile_exists("k8s-tenant", "web")
            .await
            .unwrap());
        assert!(!fabric.epg_exists(&epg).await.unwrap());
        assert_eq!(fabric.tenants(), vec!["k8s-tenant".to_string()]);
    }

    #[tokio::test]
    async fn application_profiles_require_a_valid_tenant() {
        let fabric = MemoryFabric::default();
        let obj = app_profile("", "web");
        assert!(matches!(
            obj.create(&fabric).await,
            Err(reconcile::Error::Invalid(_))
        ));
        assert_eq!(fabric.mutations(), 0);
    }
}
