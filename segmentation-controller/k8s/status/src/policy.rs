use crate::metrics::{Outcome, PatchMetrics};
use kube::api::{Api, Patch, PatchParams};
use segmentation_controller_core::{PolicyStatus, StatusSink};
use segmentation_controller_k8s_api::SegmentationPolicy;
use std::time::Duration;
use tokio::time;

const KIND: &str = "SegmentationPolicy";

/// Writes status updates for a single policy.
pub struct StatusWriter {
    api: Api<SegmentationPolicy>,
    name: String,
    timeout: Duration,
    metrics: PatchMetrics,
}

impl StatusWriter {
    pub fn new(
        api: Api<SegmentationPolicy>,
        name: impl ToString,
        timeout: Duration,
        metrics: PatchMetrics,
    ) -> Self {
        Self {
            api,
            name: name.to_string(),
            timeout,
            metrics,
        }
    }
}

#[async_trait::async_trait]
impl StatusSink for StatusWriter {
    async fn publish(&self, status: &PolicyStatus) {
        let patch = make_patch(status);
        let res = time::timeout(
            self.timeout,
            self.api
                .patch_status(&self.name, &PatchParams::default(), &patch),
        )
        .await;
        match res {
            Ok(Ok(_)) => {
                tracing::debug!(name = %self.name, state = ?status.phase, "Patched status");
                self.metrics.record(KIND, Outcome::Succeeded);
            }
            Ok(Err(error)) => {
                tracing::warn!(name = %self.name, %error, "Failed to patch status");
                self.metrics.record(KIND, Outcome::Failed);
            }
            Err(_) => {
                tracing::warn!(name = %self.name, timeout = ?self.timeout, "Status patch timed out");
                self.metrics.record(KIND, Outcome::Timeout);
            }
        }
    }
}

/// Builds a merge patch for the policy's status subresource.
///
/// Unset fields are left untouched, except the message, which is removed when
/// unset.
pub fn make_patch(status: &PolicyStatus) -> Patch<serde_json::Value> {
    let mut fields = serde_json::Map::new();
    let PolicyStatus {
        tenant,
        namespaces,
        rules,
        phase,
        message,
    } = status;
    for (key, value) in [("tenant", tenant), ("namespaces", namespaces), ("rules", rules)] {
        if let Some(value) = value {
            fields.insert(key.to_string(), value.clone().into());
        }
    }
    if let Some(phase) = phase {
        fields.insert("state".to_string(), phase.as_str().into());
    }
    fields.insert("message".to_string(), message.clone().into());

    let value = serde_json::json!({
        "apiVersion": "apic.aci.cisco/v1alpha1",
        "kind": KIND,
        "status": fields,
    });
    Patch::Merge(value)
}
