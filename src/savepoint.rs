// SPDX-License-Identifier: BSD-3-Clause

use serde::{Deserialize, Serialize};

use crate::meta::MetaInfoMap;

/// A named point in caller execution, disambiguated by attached metadata.
///
/// Equality compares `name` first (cheap short-circuit) before falling back
/// to value-equality of `meta`; `Hash` is consistent with that equality
/// (order-independent over `meta`, see [`MetaInfoMap`]'s own `Hash` impl).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Savepoint {
    pub name: String,
    #[serde(default)]
    pub meta: MetaInfoMap,
}

impl Savepoint {
    /// Builds a savepoint. `name` must be non-empty.
    pub fn new(name: impl Into<String>, meta: MetaInfoMap) -> Option<Self> {
        let name = name.into();
        if name.is_empty() {
            return None;
        }
        Some(Self { name, meta })
    }
}

impl PartialEq for Savepoint {
    fn eq(&self, other: &Self) -> bool { self.name == other.name && self.meta == other.meta }
}

impl Eq for Savepoint {}

impl std::hash::Hash for Savepoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.meta.hash(state);
    }
}
