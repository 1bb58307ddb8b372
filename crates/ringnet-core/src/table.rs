//! Identification tables: keyed lookup from an [`Identifier`] to an entity.
//!
//! [`IdentificationTable`] is the frozen form handed to protocol code;
//! [`MutableIdentificationTable`] is only used while something is being built
//! or while a population changes. Iteration order is unspecified in both.

use crate::identifier::{Category, Identifier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map;

/// Immutable mapping from identifiers of category `C` to values `T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: Category, T: Serialize",
    deserialize = "C: Category, T: Deserialize<'de>"
))]
pub struct IdentificationTable<C: Category, T> {
    entries: HashMap<Identifier<C>, T>,
}

impl<C: Category, T> IdentificationTable<C, T> {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, id: &Identifier<C>) -> Option<&T> {
        self.entries.get(id)
    }

    /// Like [`get`](Self::get), but an absent key is an error.
    pub fn require(&self, id: &Identifier<C>) -> Result<&T, TableError> {
        self.entries
            .get(id)
            .ok_or_else(|| TableError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &Identifier<C>) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of distinct keys bound in the table.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Identifier<C>, T> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &Identifier<C>> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Identifier<C>, &T)) {
        for (id, value) in &self.entries {
            f(id, value);
        }
    }

    /// Build a new table with the same keys and transformed values.
    pub fn map<U>(&self, mut f: impl FnMut(&Identifier<C>, &T) -> U) -> IdentificationTable<C, U> {
        IdentificationTable {
            entries: self
                .entries
                .iter()
                .map(|(id, value)| (id.clone(), f(id, value)))
                .collect(),
        }
    }

    pub fn fold<A>(&self, init: A, mut f: impl FnMut(A, &Identifier<C>, &T) -> A) -> A {
        self.entries
            .iter()
            .fold(init, |acc, (id, value)| f(acc, id, value))
    }

    /// Reopen the table for mutation.
    pub fn thaw(self) -> MutableIdentificationTable<C, T> {
        MutableIdentificationTable {
            entries: self.entries,
        }
    }
}

impl<C: Category, T> Default for IdentificationTable<C, T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<C: Category, T> FromIterator<(Identifier<C>, T)> for IdentificationTable<C, T> {
    fn from_iter<I: IntoIterator<Item = (Identifier<C>, T)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a, C: Category, T> IntoIterator for &'a IdentificationTable<C, T> {
    type Item = (&'a Identifier<C>, &'a T);
    type IntoIter = hash_map::Iter<'a, Identifier<C>, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Mutable mapping from identifiers of category `C` to values `T`.
#[derive(Debug, Clone)]
pub struct MutableIdentificationTable<C: Category, T> {
    entries: HashMap<Identifier<C>, T>,
}

impl<C: Category, T> MutableIdentificationTable<C, T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Bind `id` to `value`, returning the binding it replaced.
    pub fn insert(&mut self, id: Identifier<C>, value: T) -> Option<T> {
        self.entries.insert(id, value)
    }

    /// Unbind `id`. `None` means the key was absent and nothing changed.
    pub fn remove(&mut self, id: &Identifier<C>) -> Option<T> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &Identifier<C>) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &Identifier<C>) -> bool {
        self.entries.contains_key(id)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Identifier<C>, T> {
        self.entries.iter()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Identifier<C>, &T)) {
        for (id, value) in &self.entries {
            f(id, value);
        }
    }

    /// Freeze the current bindings into an immutable table.
    pub fn freeze(self) -> IdentificationTable<C, T> {
        IdentificationTable {
            entries: self.entries,
        }
    }
}

impl<C: Category, T: Clone> MutableIdentificationTable<C, T> {
    /// Copy the current bindings out without giving up the mutable table.
    pub fn snapshot(&self) -> IdentificationTable<C, T> {
        IdentificationTable {
            entries: self.entries.clone(),
        }
    }
}

impl<C: Category, T> Default for MutableIdentificationTable<C, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Error looking up an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("identifier not found: {0}")]
    NotFound(String),
}
