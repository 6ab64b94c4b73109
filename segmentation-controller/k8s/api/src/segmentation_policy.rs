use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use segmentation_controller_core::{Phase, Policy, PolicyStatus, Rule};
use serde::{Deserialize, Serialize};

/// Segments a set of namespaces into fabric endpoint groups that may only
/// exchange the listed traffic.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "apic.aci.cisco",
    version = "v1alpha1",
    kind = "SegmentationPolicy",
    status = "SegmentationPolicyStatus",
    plural = "segmentationpolicies",
    shortname = "segpol",
    namespaced,
    printcolumn = r#"{"name":"Tenant","type":"string","jsonPath":".spec.tenant"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationPolicySpec {
    pub tenant: String,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

/// Allowed traffic. Omitted fields match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RuleSpec {
    #[serde(default)]
    pub eth: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SegmentationPolicyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// === impl SegmentationPolicy ===

impl SegmentationPolicy {
    pub fn to_policy(&self) -> Policy {
        Policy {
            name: self.name_any(),
            tenant: self.spec.tenant.clone(),
            namespaces: self.spec.namespaces.clone(),
            rules: self.spec.rules.iter().map(Rule::from).collect(),
        }
    }

    /// The status as last recorded on the resource.
    pub fn recorded_status(&self) -> PolicyStatus {
        self.status
            .as_ref()
            .map(PolicyStatus::from)
            .unwrap_or_default()
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

impl From<&RuleSpec> for Rule {
    fn from(rule: &RuleSpec) -> Self {
        Rule::new(&rule.eth, &rule.ip, rule.port.unwrap_or(0))
    }
}

// === impl SegmentationPolicyStatus ===

impl From<&SegmentationPolicyStatus> for PolicyStatus {
    fn from(status: &SegmentationPolicyStatus) -> Self {
        let phase = status.state.as_deref().and_then(|state| {
            state
                .parse::<Phase>()
                .map_err(|error| tracing::debug!(%error, "Ignoring recorded state"))
                .ok()
        });
        Self {
            tenant: status.tenant.clone(),
            namespaces: status.namespaces.clone(),
            rules: status.rules.clone(),
            phase,
            message: status.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(value: serde_json::Value) -> SegmentationPolicy {
        serde_json::from_value(value).expect("policy must parse")
    }

    #[test]
    fn converts_to_policy() {
        let policy = parse(serde_json::json!({
            "apiVersion": "apic.aci.cisco/v1alpha1",
            "kind": "SegmentationPolicy",
            "metadata": { "name": "segpol1", "namespace": "default" },
            "spec": {
                "tenant": "k8s-tenant",
                "namespaces": ["ns-a", "ns-b", "ns-a"],
                "rules": [
                    { "eth": "ip", "ip": "tcp", "port": 80 },
                    { "eth": "ip", "ip": "icmp", "port": 0 },
                    { "eth": "arp" },
                ],
            },
        }));

        assert_eq!(
            policy.to_policy(),
            Policy {
                name: "segpol1".to_string(),
                tenant: "k8s-tenant".to_string(),
                namespaces: vec!["ns-a".to_string(), "ns-b".to_string(), "ns-a".to_string()],
                rules: vec![
                    Rule::new("ip", "tcp", 80),
                    Rule::new("ip", "icmp", 0),
                    Rule::new("arp", "", 0),
                ],
            }
        );
        assert!(!policy.is_deleting());
        assert_eq!(policy.recorded_status(), PolicyStatus::default());
    }

    #[test]
    fn recorded_status() {
        let mut policy = parse(serde_json::json!({
            "apiVersion": "apic.aci.cisco/v1alpha1",
            "kind": "SegmentationPolicy",
            "metadata": { "name": "segpol1", "namespace": "default" },
            "spec": { "tenant": "k8s-tenant" },
            "status": {
                "tenant": "k8s-tenant",
                "namespaces": "ns-a, ns-b",
                "rules": "ip-tcp-80",
                "state": "EPGs Created",
            },
        }));
        assert_eq!(
            policy.recorded_status(),
            PolicyStatus {
                tenant: Some("k8s-tenant".to_string()),
                namespaces: Some("ns-a, ns-b".to_string()),
                rules: Some("ip-tcp-80".to_string()),
                phase: Some(Phase::EpgsCreated),
                message: None,
            }
        );

        policy.status.as_mut().unwrap().state = Some("Unknown".to_string());
        assert_eq!(policy.recorded_status().phase, None);
    }
}
