// SPDX-License-Identifier: BSD-3-Clause

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::savepoint::Savepoint;

/// Opaque handle linking a catalog entry to archive bytes: `(field-name,
/// occurrence)`.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct FieldId {
    pub field_name: String,
    pub occurrence: u32,
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.field_name, self.occurrence)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SavepointEntry {
    savepoint: Savepoint,
    fields: IndexMap<String, FieldId>,
}

/// Ordered sequence of [`Savepoint`]s plus, per savepoint, a mapping
/// field-name → [`FieldId`].
///
/// The occurrence counter is scoped across the *whole* vector, per field
/// name — not per savepoint: the counter for a given field name across the
/// whole `SavepointVector` is strictly increasing in order of writes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SavepointVector {
    entries: Vec<SavepointEntry>,
    #[serde(default)]
    next_occurrence: IndexMap<String, u32>,
}

impl SavepointVector {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn savepoints(&self) -> impl Iterator<Item = &Savepoint> {
        self.entries.iter().map(|e| &e.savepoint)
    }

    /// Appends `sp` and returns its index. Fails with
    /// [`Error::SavepointAlreadyExists`] if an equal savepoint (equality is
    /// name *and* meta) is already present; the same name with different
    /// meta is permitted to coexist.
    pub fn insert(&mut self, sp: Savepoint) -> Result<usize, Error> {
        if self.entries.iter().any(|e| e.savepoint == sp) {
            return Err(Error::SavepointAlreadyExists(sp.name));
        }
        self.entries.push(SavepointEntry { savepoint: sp, fields: IndexMap::new() });
        Ok(self.entries.len() - 1)
    }

    pub fn find_index(&self, sp: &Savepoint) -> Option<usize> {
        self.entries.iter().position(|e| &e.savepoint == sp)
    }

    /// Allocates a fresh [`FieldId`] for `field_name` at savepoint
    /// `sp_index` and records it. Fails with
    /// [`Error::FieldAlreadyExistsAtSavepoint`] without allocating an
    /// occurrence if the cell is already occupied.
    pub fn add_field(&mut self, sp_index: usize, field_name: &str) -> Result<FieldId, Error> {
        let sp_name = self.entries[sp_index].savepoint.name.clone();
        if self.entries[sp_index].fields.contains_key(field_name) {
            return Err(Error::FieldAlreadyExistsAtSavepoint {
                savepoint: sp_name,
                field: field_name.to_owned(),
            });
        }
        let occurrence = self
            .next_occurrence
            .entry(field_name.to_owned())
            .and_modify(|n| *n += 1)
            .or_insert(0);
        let field_id = FieldId { field_name: field_name.to_owned(), occurrence: *occurrence };
        self.entries[sp_index].fields.insert(field_name.to_owned(), field_id.clone());
        Ok(field_id)
    }

    /// Undoes a prior successful [`SavepointVector::add_field`] call — used
    /// to roll back the catalog when a later stage of a write fails.
    pub fn remove_field(&mut self, sp_index: usize, field_name: &str) {
        if let Some(removed) = self.entries[sp_index].fields.shift_remove(field_name) {
            if let Some(counter) = self.next_occurrence.get_mut(field_name) {
                if *counter == removed.occurrence {
                    if removed.occurrence == 0 {
                        self.next_occurrence.shift_remove(field_name);
                    } else {
                        *counter -= 1;
                    }
                }
            }
        }
    }

    /// Undoes a prior successful [`SavepointVector::insert`] call — only
    /// valid when it is still the last entry (the only case the Serializer
    /// ever needs to roll back).
    pub fn remove_last_savepoint(&mut self, sp_index: usize) {
        if sp_index == self.entries.len() - 1 {
            self.entries.pop();
        }
    }

    /// Overwrites the `FieldId` stored for `field_name` at `sp_index`, used
    /// when the archive returns a possibly-updated id from `write`.
    pub fn set_field_id(&mut self, sp_index: usize, field_id: FieldId) {
        self.entries[sp_index].fields.insert(field_id.field_name.clone(), field_id);
    }

    /// Resolves the `FieldId` for `field_name` at `sp_index`. Fails with
    /// [`Error::FieldNotExistsAtSavepoint`].
    pub fn lookup(&self, sp_index: usize, field_name: &str) -> Result<FieldId, Error> {
        self.entries[sp_index].fields.get(field_name).cloned().ok_or_else(|| {
            Error::FieldNotExistsAtSavepoint {
                savepoint: self.entries[sp_index].savepoint.name.clone(),
                field: field_name.to_owned(),
            }
        })
    }

    /// The per-savepoint field mapping, iteration order = insertion order of
    /// each field's first `add_field` call within that savepoint.
    pub fn fields_of(&self, sp_index: usize) -> impl Iterator<Item = (&str, &FieldId)> {
        self.entries[sp_index].fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn savepoint_at(&self, sp_index: usize) -> &Savepoint { &self.entries[sp_index].savepoint }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(name: &str) -> Savepoint { Savepoint::new(name, crate::meta::MetaInfoMap::new()).unwrap() }

    #[test]
    fn duplicate_savepoint_rejected() {
        let mut v = SavepointVector::new();
        v.insert(sp("s1")).unwrap();
        assert!(matches!(v.insert(sp("s1")), Err(Error::SavepointAlreadyExists(_))));
    }

    #[test]
    fn add_field_rejects_duplicate_cell() {
        let mut v = SavepointVector::new();
        let i = v.insert(sp("s1")).unwrap();
        v.add_field(i, "T").unwrap();
        assert!(matches!(
            v.add_field(i, "T"),
            Err(Error::FieldAlreadyExistsAtSavepoint { .. })
        ));
    }

    #[test]
    fn occurrence_counter_strictly_increasing_across_savepoints() {
        let mut v = SavepointVector::new();
        let i0 = v.insert(sp("it0")).unwrap();
        let i1 = v.insert(sp("it1")).unwrap();
        let id0 = v.add_field(i0, "U").unwrap();
        let id1 = v.add_field(i1, "U").unwrap();
        assert_eq!(id0.occurrence, 0);
        assert_eq!(id1.occurrence, 1);
    }

    #[test]
    fn rollback_of_add_field_restores_counter() {
        let mut v = SavepointVector::new();
        let i = v.insert(sp("s1")).unwrap();
        v.add_field(i, "U").unwrap();
        v.remove_field(i, "U");
        let id = v.add_field(i, "U").unwrap();
        assert_eq!(id.occurrence, 0);
    }

    #[test]
    fn lookup_missing_fails() {
        let mut v = SavepointVector::new();
        let i = v.insert(sp("s1")).unwrap();
        assert!(matches!(v.lookup(i, "U"), Err(Error::FieldNotExistsAtSavepoint { .. })));
    }
}
