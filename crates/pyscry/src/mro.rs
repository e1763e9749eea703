//! Method resolution order.
//!
//! C3 linearization over an abstract class graph: callers supply the base
//! lookup, so the algorithm works the same for source classes, stubbed
//! classes, or test fixtures. Hierarchies C3 rejects can either fail hard
//! or fall back to left-to-right depth-first traversal, which is what
//! attribute lookup wants when analyzing code that would not even import.

use std::collections::HashSet;
use std::hash::Hash;

use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, Error)]
pub enum MroError {
    #[error("cannot compute a consistent method resolution order")]
    Inconsistent,
    #[error("class hierarchy contains a cycle")]
    Cyclic,
}

/// How to linearize hierarchies that C3 cannot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MroPolicy {
    /// Fall back to depth-first, left-to-right, first-occurrence order.
    #[default]
    C3WithDfsFallback,
    /// Surface the inconsistency to the caller.
    C3Strict,
}

/// Linearize `class` and its ancestry. `bases_of` returns the direct
/// bases of a class in declaration order.
pub fn method_resolution_order<T, F>(
    class: T,
    bases_of: &F,
    policy: MroPolicy,
) -> Result<Vec<T>, MroError>
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> Vec<T>,
{
    let mut in_progress = HashSet::new();
    match c3_linearize(&class, bases_of, &mut in_progress) {
        Ok(order) => Ok(order),
        Err(err) => match policy {
            MroPolicy::C3Strict => Err(err),
            MroPolicy::C3WithDfsFallback => {
                trace!("falling back to depth-first linearization");
                let mut seen = HashSet::new();
                let mut order = Vec::new();
                dfs_linearize(&class, bases_of, &mut seen, &mut order);
                Ok(order)
            }
        },
    }
}

fn c3_linearize<T, F>(
    class: &T,
    bases_of: &F,
    in_progress: &mut HashSet<T>,
) -> Result<Vec<T>, MroError>
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> Vec<T>,
{
    if !in_progress.insert(class.clone()) {
        return Err(MroError::Cyclic);
    }
    let bases = bases_of(class);
    let mut sequences: Vec<Vec<T>> = Vec::with_capacity(bases.len() + 1);
    for base in &bases {
        sequences.push(c3_linearize(base, bases_of, in_progress)?);
    }
    sequences.push(bases.clone());
    in_progress.remove(class);

    let mut order = vec![class.clone()];
    order.extend(c3_merge(sequences)?);
    Ok(order)
}

/// The C3 merge step: repeatedly take the first head that appears in no
/// other sequence's tail.
fn c3_merge<T: Clone + Eq>(mut sequences: Vec<Vec<T>>) -> Result<Vec<T>, MroError> {
    let mut merged = Vec::new();
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(merged);
        }
        let next = sequences
            .iter()
            .map(|s| &s[0])
            .find(|head| !sequences.iter().any(|s| s[1..].contains(head)))
            .cloned();
        match next {
            Some(head) => {
                for sequence in &mut sequences {
                    sequence.retain(|c| *c != head);
                }
                merged.push(head);
            }
            None => return Err(MroError::Inconsistent),
        }
    }
}

fn dfs_linearize<T, F>(class: &T, bases_of: &F, seen: &mut HashSet<T>, order: &mut Vec<T>)
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> Vec<T>,
{
    if !seen.insert(class.clone()) {
        return;
    }
    order.push(class.clone());
    for base in bases_of(class) {
        dfs_linearize(&base, bases_of, seen, order);
    }
}
