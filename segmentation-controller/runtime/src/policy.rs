use crate::{
    core::{reconcile, FabricGateway, Reconciler},
    k8s::{Namespace, ResourceExt, SegmentationPolicy},
    metrics::{Outcome, ReconcileMetrics},
    router,
    status::{NamespaceAnnotator, PatchMetrics, StatusWriter},
    Error, Result,
};
use kube::{
    api::{Api, ListParams},
    core::PartialObjectMeta,
    runtime::{
        controller::Action,
        finalizer::{finalizer, Event},
        reflector::Store,
    },
    Client,
};
use std::{sync::Arc, time::Duration};

const KIND: &str = "SegmentationPolicy";

pub(crate) struct Context<G> {
    pub(crate) client: Client,
    pub(crate) reconciler: Reconciler<G>,
    pub(crate) policies: Store<SegmentationPolicy>,
    pub(crate) finalizer: String,
    pub(crate) patch_timeout: Duration,
    pub(crate) requeue_after: Duration,
    pub(crate) error_backoff: Duration,
    pub(crate) patches: PatchMetrics,
    pub(crate) metrics: ReconcileMetrics,
}

// === impl Context ===

impl<G> Context<G> {
    fn status(&self, namespace: &str, policy: &SegmentationPolicy) -> StatusWriter {
        StatusWriter::new(
            Api::namespaced(self.client.clone(), namespace),
            policy.name_any(),
            self.patch_timeout,
            self.patches.clone(),
        )
    }

    fn annotator(&self) -> NamespaceAnnotator {
        NamespaceAnnotator::new(
            Api::all(self.client.clone()),
            self.patch_timeout,
            self.patches.clone(),
        )
    }
}

#[tracing::instrument(skip_all, fields(namespace = ?policy.namespace(), name = %policy.name_any()))]
pub(crate) async fn reconcile<G>(
    policy: Arc<SegmentationPolicy>,
    ctx: Arc<Context<G>>,
) -> Result<Action>
where
    G: FabricGateway,
{
    let namespace = policy
        .namespace()
        .ok_or_else(|| Error::MissingObjectKey(format!("{KIND} {}", policy.name_any())))?;
    let api = Api::<SegmentationPolicy>::namespaced(ctx.client.clone(), &namespace);

    let res = finalizer(&api, &ctx.finalizer, policy, |event| async {
        match event {
            Event::Apply(policy) => apply(&namespace, &policy, &ctx).await,
            Event::Cleanup(policy) => cleanup(&namespace, &policy, &ctx).await,
        }
    })
    .await;

    res.map_err(|error| {
        ctx.metrics.record(KIND, Outcome::Failed);
        Error::from(error)
    })
}

pub(crate) fn error_policy<G>(
    policy: Arc<SegmentationPolicy>,
    error: &Error,
    ctx: Arc<Context<G>>,
) -> Action {
    tracing::warn!(
        namespace = ?policy.namespace(),
        name = %policy.name_any(),
        %error,
        "Reconcile failed"
    );
    Action::requeue(ctx.error_backoff)
}

async fn apply<G: FabricGateway>(
    namespace: &str,
    policy: &SegmentationPolicy,
    ctx: &Context<G>,
) -> Result<Action> {
    let namespaces = Api::<Namespace>::all(ctx.client.clone())
        .list_metadata(&ListParams::default())
        .await?;
    let live = live_namespaces(namespaces.items);
    let policies = ctx.policies.state();

    let res = ctx
        .reconciler
        .apply(
            &policy.to_policy(),
            &live,
            &policy.recorded_status(),
            &|tenant: &str| router::tenant_in_use(&policies, policy, tenant),
            &ctx.status(namespace, policy),
            &ctx.annotator(),
        )
        .await;
    match res {
        Ok(()) => {
            ctx.metrics.record(KIND, Outcome::Applied);
            Ok(Action::requeue(ctx.requeue_after))
        }
        Err(reconcile::Error::Invalid(error)) => {
            tracing::warn!(%error, "Policy cannot be applied until it changes");
            ctx.metrics.record(KIND, Outcome::Invalid);
            Ok(Action::await_change())
        }
        Err(error) => Err(error.into()),
    }
}

async fn cleanup<G: FabricGateway>(
    namespace: &str,
    policy: &SegmentationPolicy,
    ctx: &Context<G>,
) -> Result<Action> {
    let policies = ctx.policies.state();
    ctx.reconciler
        .cleanup(
            &policy.to_policy(),
            &policy.recorded_status(),
            &|tenant: &str| router::tenant_in_use(&policies, policy, tenant),
            &ctx.status(namespace, policy),
            &ctx.annotator(),
        )
        .await?;
    tracing::info!("Released policy");
    ctx.metrics.record(KIND, Outcome::Cleaned);
    Ok(Action::await_change())
}

/// Names of the namespaces that exist and are not being deleted.
fn live_namespaces(namespaces: Vec<PartialObjectMeta<Namespace>>) -> Vec<String> {
    namespaces
        .into_iter()
        .filter(|ns| ns.metadata.deletion_timestamp.is_none())
        .filter_map(|ns| ns.metadata.name)
        .collect()
}
