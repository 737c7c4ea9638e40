//! Shallow merging of partial updates into a store's state.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde_json::{Map, Value};

/// A state that can absorb a partial update.
///
/// The merge is shallow: every field present in the partial replaces the corresponding field of
/// the state wholesale, and fields absent from the partial are left alone.
///
/// ```rust
/// use txstore_core::Merge;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Counter { count: i64, label: String }
///
/// #[derive(Default)]
/// struct CounterPatch { count: Option<i64>, label: Option<String> }
///
/// impl Merge for Counter {
///     type Partial = CounterPatch;
///     fn merge(&mut self, patch: CounterPatch) {
///         if let Some(count) = patch.count { self.count = count; }
///         if let Some(label) = patch.label { self.label = label; }
///     }
/// }
///
/// let mut counter = Counter { count: 0, label: "clicks".into() };
/// counter.merge(CounterPatch { count: Some(3), ..Default::default() });
/// assert_eq!(counter, Counter { count: 3, label: "clicks".into() });
/// ```
pub trait Merge {
    type Partial;

    fn merge(&mut self, partial: Self::Partial);
}

impl Merge for Map<String, Value> {
    type Partial = Map<String, Value>;

    fn merge(&mut self, partial: Self::Partial) {
        for (key, value) in partial {
            self.insert(key, value);
        }
    }
}

/// Objects merge key by key; anything else is replaced by the partial
impl Merge for Value {
    type Partial = Value;

    fn merge(&mut self, partial: Self::Partial) {
        match (self, partial) {
            (Value::Object(current), Value::Object(partial)) => current.merge(partial),
            (current, partial) => *current = partial,
        }
    }
}

impl<K: Ord, V> Merge for BTreeMap<K, V> {
    type Partial = BTreeMap<K, V>;

    fn merge(&mut self, partial: Self::Partial) { self.extend(partial) }
}

impl<K: Hash + Eq, V> Merge for HashMap<K, V> {
    type Partial = HashMap<K, V>;

    fn merge(&mut self, partial: Self::Partial) { self.extend(partial) }
}
