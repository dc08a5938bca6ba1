// SPDX-License-Identifier: BSD-3-Clause

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::type_id::{FromMetaInfoValue, MetaInfoValue};

/// Typed key→value attribute bag.
///
/// Backed by an [`IndexMap`] so enumeration is stable within a run without
/// promising any particular order externally, while still giving O(1)
/// average lookup. `IndexMap`'s `PartialEq` compares key/value pairs
/// irrespective of order, which is exactly the value-equality `Savepoint`
/// and `FieldMetaInfo` comparison need.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaInfoMap {
    entries: IndexMap<String, MetaInfoValue>,
}

impl MetaInfoMap {
    pub fn new() -> Self { Self::default() }

    /// Inserts a new key. Fails with [`Error::MetaInfoKeyAlreadyExists`] if
    /// the key is already bound — this map never overwrites silently.
    pub fn insert(&mut self, key: impl Into<String>, value: MetaInfoValue) -> Result<(), Error> {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return Err(Error::MetaInfoKeyAlreadyExists(key));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Reads `key` converted to `T`, applying the widening/narrowing
    /// conversion rules of [`FromMetaInfoValue`]. Fails with
    /// [`Error::MetaInfoKeyNotFound`] or [`Error::MetaInfoTypeMismatch`].
    pub fn at<T: FromMetaInfoValue>(&self, key: &str) -> Result<T, Error> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| Error::MetaInfoKeyNotFound(key.to_owned()))?;
        T::from_meta_value(value, key)
    }

    pub fn has(&self, key: &str) -> bool { self.entries.contains_key(key) }

    /// Removes and returns the value bound to `key`, if any.
    pub fn erase(&mut self, key: &str) -> Option<MetaInfoValue> { self.entries.shift_remove(key) }

    pub fn size(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Enumerates entries in insertion order.
    pub fn enumerate(&self) -> impl Iterator<Item = (&str, &MetaInfoValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merges `other` into `self` in place: keys present in both must carry
    /// equal values (used by `FieldMetaInfo::extend`); keys only in `other`
    /// are added. Returns `Err` without mutating `self` if any shared key's
    /// value differs.
    pub(crate) fn try_merge(&mut self, other: &MetaInfoMap) -> Result<(), ()> {
        for (key, value) in other.entries.iter() {
            if let Some(existing) = self.entries.get(key) {
                if existing != value {
                    return Err(());
                }
            }
        }
        for (key, value) in other.entries.iter() {
            self.entries.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Ok(())
    }
}

impl std::hash::Hash for MetaInfoMap {
    /// Order-independent hash: entries are sorted by key before hashing, so
    /// two value-equal maps (equality here ignores insertion order) always
    /// hash equal.
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        for key in keys {
            key.hash(state);
            self.entries[key].hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_duplicate_key_fails() {
        let mut map = MetaInfoMap::new();
        map.insert("a", MetaInfoValue::Int32(1)).unwrap();
        assert!(matches!(
            map.insert("a", MetaInfoValue::Int32(2)),
            Err(Error::MetaInfoKeyAlreadyExists(_))
        ));
    }

    #[test]
    fn at_missing_key_fails() {
        let map = MetaInfoMap::new();
        assert!(matches!(map.at::<i32>("missing"), Err(Error::MetaInfoKeyNotFound(_))));
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let mut a = MetaInfoMap::new();
        a.insert("x", MetaInfoValue::Int32(1)).unwrap();
        a.insert("y", MetaInfoValue::Int32(2)).unwrap();

        let mut b = MetaInfoMap::new();
        b.insert("y", MetaInfoValue::Int32(2)).unwrap();
        b.insert("x", MetaInfoValue::Int32(1)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn erase_removes_entry() {
        let mut map = MetaInfoMap::new();
        map.insert("a", MetaInfoValue::Boolean(true)).unwrap();
        assert!(map.erase("a").is_some());
        assert!(!map.has("a"));
    }
}
