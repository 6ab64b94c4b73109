//! Deterministic names for the fabric objects a policy owns.
//!
//! These names are the only link between a policy and its fabric objects, so
//! they must never change shape.

use crate::{Policy, Rule};

const APP_PROFILE_PREFIX: &str = "Seg_Pol_";

/// The fabric accepts names of at most this many characters.
const MAX_NAME_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidName {
    #[error("{kind} name must not be empty")]
    Empty { kind: &'static str },

    #[error("{kind} name {name:?} exceeds 64 characters")]
    TooLong { kind: &'static str, name: String },

    #[error("{kind} name {name:?} contains invalid character {ch:?}")]
    Character {
        kind: &'static str,
        name: String,
        ch: char,
    },
}

/// The application profile shared by every policy targeting `tenant`.
pub fn application_profile(tenant: &str) -> String {
    format!("{APP_PROFILE_PREFIX}{tenant}")
}

/// The filter implementing `rule` on behalf of `policy`.
///
/// Fields are concatenated without separators and an absent port renders as
/// `0`, e.g. `segpol1_iptcp80` or `segpol1_arp0`.
pub fn filter(policy: &str, rule: &Rule) -> String {
    format!(
        "{policy}_{}{}{}",
        rule.ether_type,
        rule.ip_protocol,
        rule.port_number()
    )
}

/// The contract (and its single subject) owned by `policy`.
pub fn contract(policy: &str) -> &str {
    policy
}

/// Checks that every name derived from `policy` is acceptable to the fabric.
pub fn validate(policy: &Policy) -> Result<(), InvalidName> {
    validate_name("tenant", &policy.tenant)?;
    validate_name("policy", &policy.name)?;
    validate_name("application profile", &application_profile(&policy.tenant))?;
    for rule in &policy.rules {
        validate_name("filter", &filter(&policy.name, rule))?;
    }
    Ok(())
}

/// Checks a single fabric object name. `kind` only labels the error.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), InvalidName> {
    if name.is_empty() {
        return Err(InvalidName::Empty { kind });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(InvalidName::TooLong {
            kind,
            name: name.to_string(),
        });
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')))
    {
        return Err(InvalidName::Character {
            kind,
            name: name.to_string(),
            ch,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Rule::new("ip", "tcp", 80), "segpol1_iptcp80")]
    #[case(Rule::new("ip", "icmp", 0), "segpol1_ipicmp0")]
    #[case(Rule::new("arp", "", 0), "segpol1_arp0")]
    #[case(Rule::new("", "", 0), "segpol1_0")]
    fn filter_names(#[case] rule: Rule, #[case] expected: &str) {
        assert_eq!(filter("segpol1", &rule), expected);
    }

    #[test]
    fn application_profile_is_per_tenant() {
        assert_eq!(application_profile("k8s-tenant"), "Seg_Pol_k8s-tenant");
        assert_eq!(contract("segpol1"), "segpol1");
    }

    #[test]
    fn rejects_unusable_names() {
        let mut policy = Policy {
            name: "segpol1".to_string(),
            tenant: "k8s-tenant".to_string(),
            namespaces: vec![],
            rules: vec![Rule::new("ip", "tcp", 443)],
        };
        assert_eq!(validate(&policy), Ok(()));

        policy.tenant = String::new();
        assert_eq!(
            validate(&policy),
            Err(InvalidName::Empty { kind: "tenant" })
        );

        policy.tenant = "k8s tenant".to_string();
        assert!(matches!(
            validate(&policy),
            Err(InvalidName::Character { ch: ' ', .. })
        ));

        policy.tenant = "k8s-tenant".to_string();
        policy.name = "p".repeat(60);
        assert!(matches!(
            validate(&policy),
            Err(InvalidName::TooLong { kind: "filter", .. })
        ));
    }
}
