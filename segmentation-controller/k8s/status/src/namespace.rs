use crate::metrics::{Outcome, PatchMetrics};
use anyhow::Context;
use kube::api::{Api, Patch, PatchParams};
use segmentation_controller_core::{EpgRef, NamespaceMarker};
use segmentation_controller_k8s_api::{Namespace, EPG_ANNOTATION};
use std::time::Duration;
use tokio::time;

const KIND: &str = "Namespace";

/// Annotates namespaces with the endpoint group they were placed in.
#[derive(Clone)]
pub struct NamespaceAnnotator {
    api: Api<Namespace>,
    timeout: Duration,
    metrics: PatchMetrics,
}

impl NamespaceAnnotator {
    pub fn new(api: Api<Namespace>, timeout: Duration, metrics: PatchMetrics) -> Self {
        Self {
            api,
            timeout,
            metrics,
        }
    }

    async fn patch(&self, namespace: &str, value: Option<String>) -> anyhow::Result<()> {
        let patch = annotation_patch(value);
        let res = time::timeout(
            self.timeout,
            self.api.patch(namespace, &PatchParams::default(), &patch),
        )
        .await;
        let outcome = match &res {
            Ok(Ok(_)) => Outcome::Succeeded,
            Ok(Err(_)) => Outcome::Failed,
            Err(_) => Outcome::Timeout,
        };
        self.metrics.record(KIND, outcome);
        res.context("namespace patch timed out")?
            .with_context(|| format!("failed to patch namespace {namespace}"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl NamespaceMarker for NamespaceAnnotator {
    async fn mark(&self, namespace: &str, epg: &EpgRef) -> anyhow::Result<()> {
        self.patch(namespace, Some(epg.to_string())).await?;
        tracing::debug!(%namespace, %epg, "Annotated namespace");
        Ok(())
    }

    async fn unmark(&self, namespace: &str) -> anyhow::Result<()> {
        self.patch(namespace, None).await?;
        tracing::debug!(%namespace, "Cleared namespace annotation");
        Ok(())
    }
}

/// Builds a merge patch that sets the endpoint group annotation, or removes it
/// when `value` is `None`.
pub fn annotation_patch(value: Option<String>) -> Patch<serde_json::Value> {
    Patch::Merge(serde_json::json!({
        "metadata": {
            "annotations": {
                EPG_ANNOTATION: value,
            },
        },
    }))
}
