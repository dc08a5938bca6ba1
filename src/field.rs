// SPDX-License-Identifier: BSD-3-Clause

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::meta::MetaInfoMap;
use crate::type_id::TypeId;

/// Per-field schema: element type, dimensions, attached meta-info.
///
/// Once registered, `type_id` and `dims` are immutable; `meta` may only ever
/// gain new keys (see [`FieldMetaInfo::extend`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMetaInfo {
    pub type_id: TypeId,
    pub dims: Vec<usize>,
    #[serde(default)]
    pub meta: MetaInfoMap,
}

impl FieldMetaInfo {
    /// Builds a new field schema. Fails if `dims` is empty or contains a
    /// zero: zero-sized dimensions are rejected at field registration.
    pub fn new(type_id: TypeId, dims: Vec<usize>) -> Result<Self, Error> {
        Self::with_meta(type_id, dims, MetaInfoMap::new())
    }

    pub fn with_meta(type_id: TypeId, dims: Vec<usize>, meta: MetaInfoMap) -> Result<Self, Error> {
        if dims.is_empty() || dims.iter().any(|&d| d == 0) {
            return Err(Error::DimensionMismatch {
                field: String::new(),
                expected: dims.clone(),
                found: dims,
            });
        }
        Ok(Self { type_id, dims, meta })
    }

    /// Idempotent re-registration: succeeds in place iff `type_id` and
    /// `dims` match exactly and every meta key shared with
    /// `other` carries an equal value; new keys from `other` are adopted.
    pub fn extend(&mut self, other: &FieldMetaInfo, name: &str) -> Result<(), Error> {
        if self.type_id != other.type_id || self.dims != other.dims {
            return Err(Error::FieldAlreadyRegisteredButDifferent(name.to_owned()));
        }
        self.meta
            .try_merge(&other.meta)
            .map_err(|_| Error::FieldAlreadyRegisteredButDifferent(name.to_owned()))
    }
}

/// name → [`FieldMetaInfo`], unique by name, enumeration in insertion order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    fields: IndexMap<String, FieldMetaInfo>,
}

impl FieldMap {
    pub fn new() -> Self { Self::default() }

    /// If `name` is absent, inserts `info` and returns `true`. If present,
    /// attempts [`FieldMetaInfo::extend`]; success is a no-op (`false`
    /// returned), failure propagates without mutating the map.
    pub fn register_field(&mut self, name: &str, info: FieldMetaInfo) -> Result<bool, Error> {
        match self.fields.get_mut(name) {
            Some(existing) => {
                existing.extend(&info, name)?;
                Ok(false)
            }
            None => {
                self.fields.insert(name.to_owned(), info);
                Ok(true)
            }
        }
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldMetaInfo> { self.fields.get(name) }

    pub fn contains(&self, name: &str) -> bool { self.fields.contains_key(name) }

    pub fn len(&self) -> usize { self.fields.len() }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// Enumerates fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldMetaInfo)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.fields.keys().map(String::as_str) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(dims: Vec<usize>) -> FieldMetaInfo { FieldMetaInfo::new(TypeId::Float64, dims).unwrap() }

    #[test]
    fn zero_sized_dims_rejected() {
        assert!(FieldMetaInfo::new(TypeId::Int32, vec![3, 0]).is_err());
        assert!(FieldMetaInfo::new(TypeId::Int32, vec![]).is_err());
    }

    #[test]
    fn register_twice_identical_is_idempotent() {
        let mut map = FieldMap::new();
        assert!(map.register_field("T", info(vec![3, 2])).unwrap());
        assert!(!map.register_field("T", info(vec![3, 2])).unwrap());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn register_twice_conflicting_dims_fails_without_mutation() {
        let mut map = FieldMap::new();
        map.register_field("T", info(vec![3, 2])).unwrap();
        let before = map.find_field("T").cloned();
        assert!(map.register_field("T", info(vec![2, 3])).is_err());
        assert_eq!(map.find_field("T").cloned(), before);
    }

    #[test]
    fn enumeration_preserves_insertion_order() {
        let mut map = FieldMap::new();
        map.register_field("b", info(vec![1])).unwrap();
        map.register_field("a", info(vec![1])).unwrap();
        let names: Vec<&str> = map.names().collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
