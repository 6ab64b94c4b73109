//! Maps namespace events onto the policies that list the namespace.

use crate::k8s::{Namespace, ResourceExt, SegmentationPolicy};
use kube::runtime::reflector::ObjectRef;
use std::sync::Arc;

/// Returns a reference to each policy whose spec names `namespace`.
///
/// Namespaces that are being deleted are ignored: their endpoint groups are
/// released the next time each policy reconciles for another reason.
pub(crate) fn policies_for_namespace(
    policies: &[Arc<SegmentationPolicy>],
    namespace: &Namespace,
) -> Vec<ObjectRef<SegmentationPolicy>> {
    if namespace.metadata.deletion_timestamp.is_some() {
        return Vec::new();
    }

    let name = namespace.name_any();
    let mut refs = Vec::new();
    for policy in policies {
        if !policy.spec.namespaces.contains(&name) {
            continue;
        }
        let policy = ObjectRef::from_obj(policy.as_ref());
        if !refs.contains(&policy) {
            refs.push(policy);
        }
    }
    if !refs.is_empty() {
        tracing::debug!(namespace = %name, policies = refs.len(), "Namespace changed");
    }
    refs
}

/// Returns true if a policy other than `policy` targets `tenant`.
pub(crate) fn tenant_in_use(
    policies: &[Arc<SegmentationPolicy>],
    policy: &SegmentationPolicy,
    tenant: &str,
) -> bool {
    policies.iter().any(|other| {
        other.uid() != policy.uid() && !other.is_deleting() && other.spec.tenant == tenant
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::{ObjectMeta, SegmentationPolicySpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use pretty_assertions::assert_eq;

    fn policy(ns: &str, name: &str, tenant: &str, namespaces: &[&str]) -> Arc<SegmentationPolicy> {
        let mut policy = SegmentationPolicy::new(
            name,
            SegmentationPolicySpec {
                tenant: tenant.to_string(),
                namespaces: namespaces.iter().map(|ns| ns.to_string()).collect(),
                rules: vec![],
            },
        );
        policy.metadata.namespace = Some(ns.to_string());
        policy.metadata.uid = Some(format!("{ns}/{name}"));
        Arc::new(policy)
    }

    fn namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn deleted(mut obj: ObjectMeta) -> ObjectMeta {
        obj.deletion_timestamp = Some(Time(Default::default()));
        obj
    }

    #[test]
    fn routes_to_listing_policies() {
        let policies = vec![
            policy("default", "a", "t", &["ns-a", "ns-b"]),
            policy("default", "b", "t", &["ns-b", "ns-b"]),
            policy("other", "a", "t", &["ns-b"]),
            policy("default", "c", "t", &["ns-c"]),
        ];

        assert_eq!(
            policies_for_namespace(&policies, &namespace("ns-b")),
            vec![
                ObjectRef::new("a").within("default"),
                ObjectRef::new("b").within("default"),
                ObjectRef::new("a").within("other"),
            ]
        );
        assert!(policies_for_namespace(&policies, &namespace("ns-z")).is_empty());
    }

    #[test]
    fn ignores_deleted_namespaces() {
        let policies = vec![policy("default", "a", "t", &["ns-a"])];
        let mut ns = namespace("ns-a");
        ns.metadata = deleted(ns.metadata);
        assert!(policies_for_namespace(&policies, &ns).is_empty());
    }

    #[test]
    fn tenant_usage() {
        let a = policy("default", "a", "t1", &[]);
        let b = policy("default", "b", "t1", &[]);
        let c = policy("default", "c", "t2", &[]);

        let all = [a.clone(), b.clone(), c.clone()];
        assert!(tenant_in_use(&all, &a, "t1"));
        assert!(tenant_in_use(&all, &a, "t2"));
        assert!(!tenant_in_use(&all, &c, "t2"));
        assert!(!tenant_in_use(&[a.clone(), c.clone()], &a, "t1"));
        assert!(!tenant_in_use(&all, &a, "t3"));

        // A policy that moved away from t1 no longer holds it.
        assert!(!tenant_in_use(&[a.clone(), c.clone()], &c, "t1"));

        let mut deleting = (*b).clone();
        deleting.metadata = deleted(deleting.metadata);
        assert!(!tenant_in_use(&[a.clone(), Arc::new(deleting)], &a, "t1"));
    }
}
