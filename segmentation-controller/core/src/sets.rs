//! Set algebra over name lists.
//!
//! Fabric and cluster state both arrive as plain lists of names, so these
//! helpers operate on slices and return deduplicated vectors in first-seen
//! order rather than forcing callers through a set type.

use std::{collections::HashSet, hash::Hash};

/// Returns the elements of `b` that also appear in `a`.
pub fn intersect<T>(a: &[T], b: &[T]) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let a = a.iter().collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    b.iter()
        .filter(|e| a.contains(e) && seen.insert(*e))
        .cloned()
        .collect()
}

/// Returns the elements of `b` that do not appear in `a`.
pub fn unique<T>(a: &[T], b: &[T]) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let a = a.iter().collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    b.iter()
        .filter(|e| !a.contains(e) && seen.insert(*e))
        .cloned()
        .collect()
}

pub fn contains<T, Q>(list: &[T], item: &Q) -> bool
where
    T: PartialEq<Q>,
    Q: ?Sized,
{
    list.iter().any(|e| e == item)
}

/// Removes the first occurrence of `item`, returning whether it was present.
pub fn remove<T, Q>(list: &mut Vec<T>, item: &Q) -> bool
where
    T: PartialEq<Q>,
    Q: ?Sized,
{
    match list.iter().position(|e| e == item) {
        Some(i) => {
            list.remove(i);
            true
        }
        None => false,
    }
}

/// Drops repeated elements, keeping the first occurrence of each.
pub fn dedup<T>(list: impl IntoIterator<Item = T>) -> Vec<T>
where
    T: Clone + Eq + Hash,
{
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|e| seen.insert(e.clone()))
        .collect()
}
