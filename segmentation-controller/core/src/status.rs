//! Human-readable policy status.

use crate::Rule;
use std::fmt;

/// The last stage a reconciliation completed.
///
/// There is no failed phase: a stalled policy simply never reaches
/// [`Phase::Enforced`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Creating,
    EpgsCreated,
    Enforced,
    Deleting,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase {0:?}")]
pub struct UnknownPhase(String);

/// A status update. Fields left as `None` are not changed, except `message`,
/// which is cleared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyStatus {
    /// The tenant the policy's fabric objects were placed in.
    pub tenant: Option<String>,
    pub namespaces: Option<String>,
    pub rules: Option<String>,
    pub phase: Option<Phase>,
    pub message: Option<String>,
}

/// Receives status updates as a reconciliation progresses.
///
/// Publishing never fails from the reconciler's point of view; sinks are
/// expected to log and drop updates they cannot deliver.
#[async_trait::async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, status: &PolicyStatus);
}

// === impl Phase ===

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "Creating",
            Self::EpgsCreated => "EPGs Created",
            Self::Enforced => "Enforced",
            Self::Deleting => "Deleting",
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Creating" => Ok(Self::Creating),
            "EPGs Created" => Ok(Self::EpgsCreated),
            "Enforced" => Ok(Self::Enforced),
            "Deleting" => Ok(Self::Deleting),
            _ => Err(UnknownPhase(s.to_string())),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl PolicyStatus ===

impl PolicyStatus {
    pub fn progress(tenant: &str, namespaces: &[String], rules: &[Rule], phase: Phase) -> Self {
        let mut namespaces = namespaces.to_vec();
        namespaces.sort();
        namespaces.dedup();
        Self {
            tenant: Some(tenant.to_string()),
            namespaces: Some(namespaces.join(", ")),
            rules: Some(summarize_rules(rules)),
            phase: Some(phase),
            message: None,
        }
    }

    /// A status that reports a rejected spec and leaves everything else as
    /// it was.
    pub fn invalid(message: impl ToString) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::default()
        }
    }
}

/// Renders rules as `eth[-ip][-port]`, comma separated.
pub fn summarize_rules(rules: &[Rule]) -> String {
    rules
        .iter()
        .map(|rule| {
            let mut item = rule.ether_type.clone();
            if !rule.ip_protocol.is_empty() {
                item.push('-');
                item.push_str(&rule.ip_protocol);
            }
            if let Some(port) = rule.port {
                item.push('-');
                item.push_str(&port.to_string());
            }
            item
        })
        .collect::<Vec<_>>()
        .join(", ")
}
