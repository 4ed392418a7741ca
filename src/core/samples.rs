// src/core/samples.rs

//! Sample identifiers and the per-output sample store.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::datatype::TypedValue;

/// Identifier of a sample: one name per dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleId(pub Vec<String>);

impl SampleId {
    pub fn single(name: impl Into<String>) -> Self {
        SampleId(vec![name.into()])
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("+"))
    }
}

impl From<&str> for SampleId {
    fn from(value: &str) -> Self {
        SampleId::single(value)
    }
}

/// Position of a sample: one index per dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleIndex(pub Vec<usize>);

impl fmt::Display for SampleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// Either way of addressing a sample.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SampleKey {
    Id(SampleId),
    Index(SampleIndex),
}

impl From<SampleId> for SampleKey {
    fn from(value: SampleId) -> Self {
        SampleKey::Id(value)
    }
}

impl From<SampleIndex> for SampleKey {
    fn from(value: SampleIndex) -> Self {
        SampleKey::Index(value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleItem {
    pub index: SampleIndex,
    pub id: SampleId,
    pub data: Vec<TypedValue>,
}

impl SampleItem {
    pub fn cardinality(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Samples produced on an output, in production order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleCollection {
    items: IndexMap<SampleId, SampleItem>,
}

impl SampleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: SampleItem) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn get(&self, key: &SampleKey) -> Option<&SampleItem> {
        match key {
            SampleKey::Id(id) => self.items.get(id),
            SampleKey::Index(index) => self.items.values().find(|item| &item.index == index),
        }
    }

    pub fn contains(&self, key: &SampleKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleItem> {
        self.items.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id_and_index() {
        let mut samples = SampleCollection::new();
        samples.insert(SampleItem {
            index: SampleIndex(vec![0]),
            id: SampleId::single("a"),
            data: vec![
                TypedValue { datatype: "Int".into(), repr: "1".into() },
                TypedValue { datatype: "Int".into(), repr: "2".into() },
            ],
        });

        let by_id = samples.get(&SampleKey::Id("a".into())).unwrap();
        assert_eq!(by_id.cardinality(), 2);
        assert!(samples.contains(&SampleKey::Index(SampleIndex(vec![0]))));
        assert!(!samples.contains(&SampleKey::Index(SampleIndex(vec![1]))));
    }
}
