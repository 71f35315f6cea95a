//! Reconciliation - Make an ordered list of instances represent an ordered
//! list of specifications with as little churn as possible.
//!
//! - An instance already at the right index and matching is never touched
//! - An instance matching a spec at another index is moved, not recreated
//! - Instances matching nothing fall off the end
//!
//! `existing` is a snapshot; all placements go to `target`, so lookups are not
//! disturbed by earlier placements. Among several matching candidates the
//! first one in `existing` order wins.

/// Ordered storage reconciled in place.
pub trait Slots<I> {
    /// Put `instance` at `index`.
    fn insert_at(&mut self, index: usize, instance: I);

    /// Drop everything from `len` on.
    fn truncate_to(&mut self, len: usize);
}

impl<I> Slots<I> for Vec<I> {
    /// Replaces the element at `index`, or appends when `index == len`.
    fn insert_at(&mut self, index: usize, instance: I) {
        if index < self.len() {
            self[index] = instance;
        } else {
            self.push(instance);
        }
    }

    fn truncate_to(&mut self, len: usize) {
        self.truncate(len);
    }
}

/// Reconcile `target` so that position `i` holds an instance matching
/// `desired[i]`. Returns the number of placements made.
///
/// `target` normally starts out as a copy of `existing`.
pub fn reconcile<S, I, E>(
    desired: &[S],
    existing: &[I],
    target: &mut impl Slots<I>,
    mut matches: impl FnMut(&I, &S) -> Result<bool, E>,
    mut make: impl FnMut(&S) -> Result<I, E>,
) -> Result<usize, E>
where
    I: Clone,
{
    let mut placements = 0;
    for (index, spec) in desired.iter().enumerate() {
        if let Some(current) = existing.get(index) {
            if matches(current, spec)? {
                continue;
            }
        }

        let mut reused = None;
        for candidate in existing {
            if matches(candidate, spec)? {
                reused = Some(candidate.clone());
                break;
            }
        }
        let instance = match reused {
            Some(instance) => instance,
            None => make(spec)?,
        };
        target.insert_at(index, instance);
        placements += 1;
    }
    target.truncate_to(desired.len());
    Ok(placements)
}
