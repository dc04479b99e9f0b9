//! `ReferenceMap` — a string-keyed map whose values may be lazy, late-bound
//! references into another map (§3.1, §4.1).
//!
//! `spec.md` §9 suggests modelling cross-map links as handles into a pool to
//! avoid cyclic ownership. The original implementation
//! (`pysyphe/data_structs.py::ReferencesDict.RefValue`) instead holds a
//! direct, GC-managed reference to the target dict. Rust's `Rc<RefCell<_>>`
//! is the faithful analogue of that — shared ownership without a raw
//! pointer, and a cycle of `Rc`s only leaks memory, it never corrupts it —
//! so that is what this implementation follows (see DESIGN.md).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::Error;

/// Bound on `Ref` hop traversal before a lookup is treated as a cycle.
///
/// `spec.md` §9 ties this to "number of maps in pool"; this implementation
/// has no pool, so a fixed generous bound is used instead (§4 of
/// SPEC_FULL.md, Open Question 3).
const MAX_REF_DEPTH: usize = 1024;

/// A value stored in a [`ReferenceMap`]: either a concrete JSON value or a
/// lazy reference to a key in another `ReferenceMap`.
#[derive(Clone)]
pub enum StateValue {
    /// A concrete, owned value.
    Value(serde_json::Value),
    /// A reference to `key` in another map, resolved at read time.
    Ref(ReferenceMap, String),
}

impl fmt::Debug for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "Value({v})"),
            Self::Ref(map, key) => write!(f, "Ref({map:?}, {key:?})"),
        }
    }
}

impl From<serde_json::Value> for StateValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

macro_rules! impl_from_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for StateValue {
                fn from(value: $t) -> Self {
                    Self::Value(serde_json::Value::from(value))
                }
            }
        )*
    };
}

impl_from_scalar!(&str, String, bool, i32, i64, u32, u64, f64);

/// An associative container mapping string keys to [`StateValue`]s, some of
/// which may be lazy references into another `ReferenceMap`.
///
/// Cheaply cloneable — a clone shares the same underlying storage (it is the
/// handle by which a [`Ref`](StateValue::Ref) points at "a live
/// `ReferenceMap` owned elsewhere", per the §3.1 invariant).
#[derive(Clone)]
pub struct ReferenceMap(Rc<RefCell<IndexMap<String, StateValue>>>);

impl fmt::Debug for ReferenceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReferenceMap")
            .field(&Rc::as_ptr(&self.0))
            .finish()
    }
}

impl Default for ReferenceMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(IndexMap::new())))
    }

    /// Create a map pre-populated from `entries`, preserving insertion order.
    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<StateValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map: IndexMap<String, StateValue> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(Rc::new(RefCell::new(map)))
    }

    /// Read a key, following one or more `Ref` hops transitively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyMissing`] if the key (or the terminal key of a
    /// `Ref` chain) does not exist, or if resolution exceeds
    /// [`MAX_REF_DEPTH`] hops (surfaced with `cycle: true`).
    pub fn get(&self, key: &str) -> Result<serde_json::Value, Error> {
        self.get_with_depth(key, MAX_REF_DEPTH)
    }

    fn get_with_depth(&self, key: &str, depth: usize) -> Result<serde_json::Value, Error> {
        if depth == 0 {
            return Err(Error::KeyMissing {
                key: key.to_string(),
                cycle: true,
            });
        }
        let found = self.0.borrow().get(key).cloned();
        match found {
            None => Err(Error::KeyMissing {
                key: key.to_string(),
                cycle: false,
            }),
            Some(StateValue::Value(v)) => Ok(v),
            Some(StateValue::Ref(target, target_key)) => {
                target.get_with_depth(&target_key, depth - 1)
            }
        }
    }

    /// Write `value` to `key`, destroying any `Ref` previously stored there.
    pub fn set(&self, key: impl Into<String>, value: impl Into<StateValue>) {
        self.0.borrow_mut().insert(key.into(), value.into());
    }

    /// Remove `key`, returning its raw (un-dereferenced) stored value.
    pub fn remove(&self, key: &str) -> Option<StateValue> {
        self.0.borrow_mut().shift_remove(key)
    }

    /// `true` if `key` is present (regardless of whether it is a `Ref` that
    /// would fail to resolve).
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    /// Snapshot of all keys currently stored, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Keys whose stored value is currently a `Ref`.
    pub fn ref_keys(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter_map(|(k, v)| matches!(v, StateValue::Ref(..)).then(|| k.clone()))
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// A lazy reference to `key` in this map, suitable for storing as a
    /// value in another `ReferenceMap` (`m2.set("a", m1.ref_to("b"))`).
    pub fn ref_to(&self, key: impl Into<String>) -> StateValue {
        StateValue::Ref(self.clone(), key.into())
    }

    /// Resolve every key to a plain JSON object. Keys whose resolution fails
    /// (dangling or cyclic refs) are omitted rather than propagating an
    /// error — a snapshot is a best-effort diagnostic artifact (used for
    /// event records and `simulate_until` log entries), not a data read.
    pub fn snapshot(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut out = serde_json::Map::new();
        for key in self.keys() {
            if let Ok(value) = self.get(&key) {
                out.insert(key, value);
            }
        }
        out
    }

    /// Merge `after_state` into this map in place, preserving its identity
    /// (§4.3.2) so that other maps holding `Ref`s to it keep observing the
    /// simulated values.
    pub fn merge_in_place(&self, after_state: serde_json::Map<String, serde_json::Value>) {
        let mut inner = self.0.borrow_mut();
        for (key, value) in after_state {
            inner.insert(key, StateValue::Value(value));
        }
    }

    /// `true` if `self` and `other` are the same underlying map (identity,
    /// not structural equality).
    pub fn is_same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_read_write() {
        let m = ReferenceMap::new();
        m.set("a", 10i64);
        assert_eq!(m.get("a").unwrap(), serde_json::json!(10));
    }

    #[test]
    fn missing_key_fails() {
        let m = ReferenceMap::new();
        let err = m.get("missing").unwrap_err();
        assert!(matches!(err, Error::KeyMissing { cycle: false, .. }));
    }

    #[test]
    fn ref_round_trip_and_live_update() {
        // Invariant 9 (spec.md §8): m2[k] = m1.ref_to(k'); m1[k'] = v ⇒ m2[k] == v.
        let m1 = ReferenceMap::new();
        let m2 = ReferenceMap::new();
        m1.set("a", 10i64);
        m2.set("a", m1.ref_to("a"));
        assert_eq!(m2.get("a").unwrap(), serde_json::json!(10));
        m1.set("a", 20i64);
        assert_eq!(m2.get("a").unwrap(), serde_json::json!(20));
    }

    #[test]
    fn writing_over_a_ref_destroys_it() {
        let m1 = ReferenceMap::new();
        let m2 = ReferenceMap::new();
        m1.set("a", 10i64);
        m2.set("a", m1.ref_to("a"));
        m2.set("a", 99i64);
        m1.set("a", 1i64);
        assert_eq!(m2.get("a").unwrap(), serde_json::json!(99));
    }

    #[test]
    fn ref_to_not_yet_written_key_surfaces_key_missing_only_on_deref() {
        let m1 = ReferenceMap::new();
        let m2 = ReferenceMap::new();
        m2.set("a", m1.ref_to("never_written"));
        // Linking never fails; only dereferencing does.
        let err = m2.get("a").unwrap_err();
        assert!(matches!(err, Error::KeyMissing { cycle: false, .. }));
    }

    #[test]
    fn self_referential_cycle_is_bounded_and_reported() {
        let m = ReferenceMap::new();
        m.set("a", m.ref_to("a"));
        let err = m.get("a").unwrap_err();
        assert!(matches!(err, Error::KeyMissing { cycle: true, .. }));
    }

    #[test]
    fn mutual_cycle_is_bounded_and_reported() {
        let m1 = ReferenceMap::new();
        let m2 = ReferenceMap::new();
        m1.set("a", m2.ref_to("b"));
        m2.set("b", m1.ref_to("a"));
        let err = m1.get("a").unwrap_err();
        assert!(matches!(err, Error::KeyMissing { cycle: true, .. }));
    }

    #[test]
    fn ref_keys_reports_only_refs() {
        let m1 = ReferenceMap::new();
        let m2 = ReferenceMap::new();
        m1.set("a", 1i64);
        m2.set("a", m1.ref_to("a"));
        m2.set("b", 2i64);
        assert_eq!(m2.ref_keys(), vec!["a".to_string()]);
    }

    #[test]
    fn snapshot_resolves_refs() {
        let m1 = ReferenceMap::new();
        let m2 = ReferenceMap::new();
        m1.set("a", 1i64);
        m2.set("linked", m1.ref_to("a"));
        m2.set("plain", "x");
        let snap = m2.snapshot();
        assert_eq!(snap.get("linked"), Some(&serde_json::json!(1)));
        assert_eq!(snap.get("plain"), Some(&serde_json::json!("x")));
    }

    #[test]
    fn merge_in_place_preserves_identity() {
        let m1 = ReferenceMap::new();
        let m2 = ReferenceMap::new();
        m2.set("linked", m1.ref_to("a"));
        let mut after = serde_json::Map::new();
        after.insert("a".into(), serde_json::json!(42));
        m1.merge_in_place(after);
        assert!(m1.is_same(&m1.clone()));
        assert_eq!(m2.get("linked").unwrap(), serde_json::json!(42));
    }

    #[test]
    fn remove_destroys_entry() {
        let m = ReferenceMap::new();
        m.set("a", 1i64);
        assert!(m.remove("a").is_some());
        assert!(!m.contains_key("a"));
    }
}
