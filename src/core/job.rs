// src/core/job.rs

//! The job contract shared with the execution layer.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::datatype::TypedValue;
use crate::core::samples::{SampleId, SampleIndex};

static URL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://").ok());

/// Does a value look like a reference that has to be resolved by a job?
pub fn is_url(value: &str) -> bool {
    URL_RE.as_ref().is_some_and(|re| re.is_match(value))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Finished,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub node: String,
    pub sample_id: SampleId,
    pub sample_index: SampleIndex,
    pub job_data: IndexMap<String, Vec<TypedValue>>,
    pub dependencies: Vec<String>,
    pub datatype: String,
    pub status: JobState,
}

/// Values bound to one argument in a job payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PayloadValue {
    List(Vec<TypedValue>),
    Mapping(IndexMap<String, Vec<TypedValue>>),
}

impl PayloadValue {
    /// Number of values; a mapping counts its keys.
    pub fn len(&self) -> usize {
        match self {
            PayloadValue::List(values) => values.len(),
            PayloadValue::Mapping(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of values held by the `index`-th element.
    pub fn item_len(&self, index: usize) -> Option<usize> {
        match self {
            PayloadValue::List(values) => (index < values.len()).then_some(1),
            PayloadValue::Mapping(map) => map.get_index(index).map(|(_, v)| v.len()),
        }
    }

    /// The only value, when there is exactly one.
    pub fn single(&self) -> Option<&TypedValue> {
        match self {
            PayloadValue::List(values) if values.len() == 1 => values.first(),
            PayloadValue::Mapping(map) if map.len() == 1 => {
                map.values().next().and_then(|v| if v.len() == 1 { v.first() } else { None })
            }
            _ => None,
        }
    }
}

/// Materialised arguments of one job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub inputs: IndexMap<String, PayloadValue>,
    pub outputs: IndexMap<String, PayloadValue>,
}

impl JobPayload {
    /// Look an argument up among the inputs first, then the outputs.
    pub fn get(&self, name: &str) -> Option<&PayloadValue> {
        self.inputs.get(name).or_else(|| self.outputs.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: &str) -> TypedValue {
        TypedValue { datatype: "Int".into(), repr: v.into() }
    }

    #[test]
    fn recognises_urls() {
        assert!(is_url("file:///x"));
        assert!(is_url("vfs://mount/path"));
        assert!(is_url("xnat+https://server/data"));
        assert!(!is_url("5"));
        assert!(!is_url("/tmp/file"));
        assert!(!is_url("://nothing"));
    }

    #[test]
    fn payload_lookup_prefers_inputs() {
        let mut payload = JobPayload::default();
        payload.outputs.insert("n".into(), PayloadValue::List(vec![int("1"), int("2")]));
        assert_eq!(payload.get("n").map(PayloadValue::len), Some(2));

        payload.inputs.insert("n".into(), PayloadValue::List(vec![int("3")]));
        assert_eq!(payload.get("n").and_then(PayloadValue::single), Some(&int("3")));
    }

    #[test]
    fn mapping_items_are_positional() {
        let mut map = IndexMap::new();
        map.insert("first".to_string(), vec![int("1")]);
        map.insert("second".to_string(), vec![int("1"), int("2"), int("3")]);
        let value = PayloadValue::Mapping(map);
        assert_eq!(value.item_len(1), Some(3));
        assert_eq!(value.item_len(2), None);
    }
}
