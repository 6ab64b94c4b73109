use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Counts the patches this controller writes to cluster resources.
#[derive(Clone, Debug, Default)]
pub struct PatchMetrics {
    patches: Family<PatchLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PatchLabels {
    kind: String,
    outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub(crate) enum Outcome {
    Succeeded,
    Failed,
    Timeout,
}

// === impl PatchMetrics ===

impl PatchMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let patches = Family::default();
        prom.register(
            "patches",
            "Count of status and annotation patches by resource kind and outcome",
            patches.clone(),
        );
        Self { patches }
    }

    pub(crate) fn record(&self, kind: &str, outcome: Outcome) {
        self.patches
            .get_or_create(&PatchLabels {
                kind: kind.to_string(),
                outcome,
            })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn count(&self, kind: &str, outcome: Outcome) -> u64 {
        self.patches
            .get_or_create(&PatchLabels {
                kind: kind.to_string(),
                outcome,
            })
            .get()
    }
}
