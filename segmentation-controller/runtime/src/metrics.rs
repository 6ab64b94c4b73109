use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub(crate) struct ReconcileMetrics {
    reconciles: Family<ReconcileLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReconcileLabels {
    kind: String,
    outcome: Outcome,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub(crate) enum Outcome {
    Applied,
    Invalid,
    Cleaned,
    Failed,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub(crate) fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "reconciles",
            "Count of reconciliations by resource kind and outcome",
            reconciles.clone(),
        );
        Self { reconciles }
    }

    pub(crate) fn record(&self, kind: &'static str, outcome: Outcome) {
        self.reconciles
            .get_or_create(&ReconcileLabels {
                kind: kind.to_string(),
                outcome,
            })
            .inc();
    }
}
