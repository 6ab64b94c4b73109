use crate::{annotation_patch, make_patch, metrics::Outcome, PatchMetrics};
use kube::api::Patch;
use pretty_assertions::assert_eq;
use rstest::rstest;
use segmentation_controller_core::{Phase, PolicyStatus, Rule};

fn merged(patch: Patch<serde_json::Value>) -> serde_json::Value {
    match patch {
        Patch::Merge(value) => value,
        patch => panic!("expected a merge patch, got {patch:?}"),
    }
}

#[test]
fn progress_patch() {
    let status = PolicyStatus::progress(
        "k8s-tenant",
        &["ns-b".to_string(), "ns-a".to_string()],
        &[Rule::new("ip", "tcp", 80)],
        Phase::EpgsCreated,
    );
    assert_eq!(
        merged(make_patch(&status)),
        serde_json::json!({
            "apiVersion": "apic.aci.cisco/v1alpha1",
            "kind": "SegmentationPolicy",
            "status": {
                "tenant": "k8s-tenant",
                "namespaces": "ns-a, ns-b",
                "rules": "ip-tcp-80",
                "state": "EPGs Created",
                "message": null,
            },
        })
    );
}

#[test]
fn partial_patches_leave_other_fields() {
    let deleting = PolicyStatus {
        phase: Some(Phase::Deleting),
        ..PolicyStatus::default()
    };
    assert_eq!(
        merged(make_patch(&deleting))["status"],
        serde_json::json!({ "state": "Deleting", "message": null })
    );

    let invalid = PolicyStatus::invalid("tenant name must not be empty");
    assert_eq!(
        merged(make_patch(&invalid))["status"],
        serde_json::json!({ "message": "tenant name must not be empty" })
    );
}

#[rstest]
#[case(Some("uni/tn-t/ap-Seg_Pol_t/epg-ns-a".to_string()), serde_json::json!("uni/tn-t/ap-Seg_Pol_t/epg-ns-a"))]
#[case(None, serde_json::Value::Null)]
fn namespace_annotation(#[case] value: Option<String>, #[case] expected: serde_json::Value) {
    assert_eq!(
        merged(annotation_patch(value)),
        serde_json::json!({
            "metadata": { "annotations": { "apic.aci.cisco/epg": expected } },
        })
    );
}

#[test]
fn patch_outcomes_are_counted() {
    let metrics = PatchMetrics::default();
    metrics.record("Namespace", Outcome::Succeeded);
    metrics.record("Namespace", Outcome::Timeout);
    metrics.record("Namespace", Outcome::Timeout);
    assert_eq!(metrics.count("Namespace", Outcome::Succeeded), 1);
    assert_eq!(metrics.count("Namespace", Outcome::Timeout), 2);
    assert_eq!(metrics.count("SegmentationPolicy", Outcome::Failed), 0);
}
