use crate::{
    core::{fabric::memory::MemoryFabric, FabricConfig, FabricGateway, Reconciler},
    k8s::{ApplicationProfile, Namespace, SegmentationPolicy, Tenant},
    metrics::ReconcileMetrics,
    objects, policy, router,
    status::PatchMetrics,
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use kube::{
    api::Api,
    runtime::{controller::Action, reflector::ObjectRef, watcher, Controller},
    Client,
};
use prometheus_client::registry::Registry;
use std::{fmt::Display, sync::Arc, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "segmentation",
    about = "Converges SegmentationPolicy resources onto an ACI fabric"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "segmentation=info,warn",
        env = "SEGMENTATION_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The finalizer that guards fabric teardown for SegmentationPolicy resources.
    #[clap(
        long,
        default_value = "finalizers.segmentationpolicies.apic.aci.cisco/delete"
    )]
    finalizer: String,

    /// Bridge domain every created endpoint group is attached to.
    #[clap(long, env = "SEGMENTATION_BRIDGE_DOMAIN")]
    bridge_domain: String,

    /// VMM domain every created endpoint group is associated with.
    #[clap(long, env = "SEGMENTATION_VMM_DOMAIN")]
    vmm_domain: String,

    /// Application profile of the master endpoint group that created groups
    /// inherit contracts from.
    #[clap(long, env = "SEGMENTATION_MASTER_APP_PROFILE")]
    master_app_profile: String,

    #[clap(long, env = "SEGMENTATION_MASTER_EPG")]
    master_epg: String,

    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,

    /// How often an applied resource is reconciled again to repair drift.
    #[clap(long, default_value = "300")]
    requeue_after_secs: u64,

    #[clap(long, default_value = "15")]
    error_backoff_secs: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    /// Runs the controllers against an in-memory fabric.
    ///
    /// No fabric transport is linked into this binary, so nothing is changed on
    /// a real fabric. Use [`Args::run_with`] to supply a gateway.
    pub async fn run(self) -> Result<()> {
        self.serve(MemoryFabric::default(), true).await
    }

    pub async fn run_with<G>(self, gateway: G) -> Result<()>
    where
        G: FabricGateway + Clone + 'static,
    {
        self.serve(gateway, false).await
    }

    async fn serve<G>(self, gateway: G, dry_run: bool) -> Result<()>
    where
        G: FabricGateway + Clone + 'static,
    {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            finalizer,
            bridge_domain,
            vmm_domain,
            master_app_profile,
            master_epg,
            patch_timeout_ms,
            requeue_after_secs,
            error_backoff_secs,
        } = self;

        let config = FabricConfig {
            bridge_domain,
            vmm_domain,
            master_app_profile,
            master_epg,
        };
        let patch_timeout = Duration::from_millis(patch_timeout_ms);
        let requeue_after = Duration::from_secs(requeue_after_secs);
        let error_backoff = Duration::from_secs(error_backoff_secs);

        let mut prom = <Registry>::default();
        let controller = prom.sub_registry_with_prefix("segmentation_controller");
        let patches = PatchMetrics::register(controller);
        let metrics = ReconcileMetrics::register(controller);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        if dry_run {
            tracing::warn!("No fabric gateway configured; changes are only applied in memory");
        }

        let client = runtime.client();
        let (close_tx, close_rx) = tokio::sync::oneshot::channel::<()>();
        let shutdown = close_rx.map(|_| ()).shared();

        // Policies are reconciled whenever they change and whenever a
        // namespace they list changes.
        let policies = Controller::new(
            Api::<SegmentationPolicy>::all(client.clone()),
            watcher::Config::default(),
        );
        let store = policies.store();
        let policies = {
            let store = store.clone();
            policies.watches(
                Api::<Namespace>::all(client.clone()),
                watcher::Config::default(),
                move |ns| router::policies_for_namespace(&store.state(), &ns),
            )
        }
        .graceful_shutdown_on(shutdown.clone())
        .run(
            policy::reconcile,
            policy::error_policy,
            Arc::new(policy::Context {
                client: client.clone(),
                reconciler: Reconciler::new(gateway.clone(), config),
                policies: store,
                finalizer,
                patch_timeout,
                requeue_after,
                error_backoff,
                patches,
                metrics: metrics.clone(),
            }),
        )
        .for_each(log_result)
        .instrument(info_span!("segmentationpolicies"));

        let tenants = objects_controller::<Tenant, G>(
            client.clone(),
            gateway.clone(),
            requeue_after,
            error_backoff,
            metrics.clone(),
            shutdown.clone(),
        )
        .instrument(info_span!("tenants"));

        let app_profiles = objects_controller::<ApplicationProfile, G>(
            client,
            gateway,
            requeue_after,
            error_backoff,
            metrics,
            shutdown,
        )
        .instrument(info_span!("applicationprofiles"));

        let drain = runtime.shutdown_handle();
        tokio::spawn(async move {
            let controllers = future::join3(policies, tenants, app_profiles);
            tokio::pin!(controllers);
            info!("Controllers running");
            tokio::select! {
                _ = (&mut controllers) => {}
                handle = drain.signaled() => {
                    let _ = close_tx.send(());
                    handle.release_after(controllers).await;
                }
            }
        });

        // Block the main thread on the shutdown signal. Once it fires, wait for
        // the controllers to finish their in-flight reconciles before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

fn objects_controller<K, G>(
    client: Client,
    gateway: G,
    requeue_after: Duration,
    error_backoff: Duration,
    metrics: ReconcileMetrics,
    shutdown: impl Future<Output = ()> + Send + Sync + 'static,
) -> impl Future<Output = ()>
where
    K: objects::FabricObject,
    G: FabricGateway + 'static,
{
    Controller::new(Api::<K>::all(client.clone()), watcher::Config::default())
        .graceful_shutdown_on(shutdown)
        .run(
            objects::reconcile::<K, G>,
            objects::error_policy::<K, G>,
            Arc::new(objects::Context {
                client,
                gateway,
                requeue_after,
                error_backoff,
                metrics,
            }),
        )
        .for_each(log_result)
}

async fn log_result<K, E>(res: Result<(ObjectRef<K>, Action), E>)
where
    K: kube::Resource,
    E: Display,
{
    match res {
        Ok((obj, _)) => tracing::debug!(%obj, "Reconciled"),
        Err(error) => tracing::debug!(%error, "Reconcile failed"),
    }
}
