use std::collections::BTreeSet;

/// Returns the namespaces that a policy both desires and that exist in the
/// cluster, sorted and without duplicates.
pub fn namespaces<L, D>(live: L, desired: D) -> Vec<String>
where
    L: IntoIterator,
    L::Item: AsRef<str>,
    D: IntoIterator,
    D::Item: AsRef<str>,
{
    let live = live
        .into_iter()
        .map(|ns| ns.as_ref().to_string())
        .collect::<BTreeSet<_>>();
    desired
        .into_iter()
        .map(|ns| ns.as_ref().to_string())
        .filter(|ns| live.contains(ns))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn drops_missing_namespaces() {
        let live = ["default", "kube-system", "ns-a", "ns-b"];
        assert_eq!(namespaces(live, ["ns-b", "ns-z", "ns-a"]), vec!["ns-a", "ns-b"]);
    }

    #[test]
    fn deduplicates() {
        assert_eq!(namespaces(["ns-a"], ["ns-a", "ns-a"]), vec!["ns-a"]);
    }

    #[test]
    fn empty() {
        assert!(namespaces(["ns-a"], Vec::<String>::new()).is_empty());
        assert!(namespaces(Vec::<String>::new(), ["ns-a"]).is_empty());
    }
}
