//! Merge policies for partial updates.
//!
//! Collection-valued task fields are normally accretive: an update adds the
//! incoming elements that are not already present. A replacement sent as a
//! partial update would then grow the collection instead of replacing it, so
//! [`MergePolicy::Trimmed`] first drops as many leading elements from the
//! current value as the update carries.

use std::collections::BTreeMap;

/// How an incoming collection is folded into the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Incoming value replaces the current one.
    Replace,

    /// Ordered union: incoming elements not yet present are appended.
    Accretive,

    /// Trim `len(incoming)` elements from the front, then accretive union.
    Trimmed,
}

/// Removes up to `count` elements from the front of `collection`.
///
/// ```
/// use vmalloc_reconcile::trim_front;
/// let mut v = vec!["a", "b", "c"];
/// trim_front(&mut v, 1);
/// assert_eq!(v, vec!["b", "c"]);
/// ```
pub fn trim_front<T>(collection: &mut Vec<T>, count: usize) {
    let count = count.min(collection.len());
    collection.drain(..count);
}

/// Appends the incoming elements not already in `current`. Repeats within
/// `incoming` are kept: identical host assignments are distinct slots.
fn union_into<T: PartialEq + Clone>(current: &mut Vec<T>, incoming: &[T]) {
    let existing = current.len();
    for item in incoming {
        if !current[..existing].contains(item) {
            current.push(item.clone());
        }
    }
}

/// Folds `incoming` into `current` under `policy`.
///
/// `None` leaves `current` untouched for every policy. An empty incoming
/// collection is a no-op for the accretive policies.
pub fn merge_collection<T: PartialEq + Clone>(
    current: &mut Vec<T>,
    incoming: Option<&[T]>,
    policy: MergePolicy,
) {
    let Some(incoming) = incoming else {
        return;
    };

    match policy {
        MergePolicy::Replace => {
            *current = incoming.to_vec();
        }
        MergePolicy::Accretive => union_into(current, incoming),
        MergePolicy::Trimmed => {
            if !current.is_empty() && !incoming.is_empty() {
                trim_front(current, incoming.len());
            }
            union_into(current, incoming);
        }
    }
}

/// Layers property maps; later maps win on key collisions.
pub fn merge_properties<'a, I>(layers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a BTreeMap<String, String>>,
{
    let mut merged = BTreeMap::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
