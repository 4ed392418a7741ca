// src/core/source_data.rs

//! Data handed to a source or constant node, before normalisation.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::core::datatype::RawValue;
use crate::core::samples::SampleId;
use crate::errors::{PlanError, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum SourceData {
    /// Sample id to the values of that sample, in the given order.
    Keyed(IndexMap<SampleId, Vec<RawValue>>),
    /// One value per sample; ids default to `id_0`, `id_1`, ...
    Listed {
        values: Vec<RawValue>,
        ids: Option<Vec<SampleId>>,
    },
    /// A single sample holding all values.
    Tuple(Vec<RawValue>),
    Scalar(RawValue),
}

impl SourceData {
    /// Keyed data from an unordered mapping; samples are ordered by id.
    pub fn from_map<K, I>(map: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Vec<RawValue>)>,
    {
        let sorted: BTreeMap<SampleId, Vec<RawValue>> = map
            .into_iter()
            .map(|(k, v)| (SampleId::single(k), v))
            .collect();
        SourceData::Keyed(sorted.into_iter().collect())
    }

    pub fn listed<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<RawValue>,
    {
        SourceData::Listed {
            values: values.into_iter().map(Into::into).collect(),
            ids: None,
        }
    }

    /// Normalise into an ordered sample map.
    pub fn samples(&self) -> Result<IndexMap<SampleId, Vec<RawValue>>> {
        let samples = match self {
            SourceData::Keyed(map) => map.clone(),
            SourceData::Listed { values, ids: None } => values
                .iter()
                .enumerate()
                .map(|(k, v)| (SampleId::single(format!("id_{k}")), vec![v.clone()]))
                .collect(),
            SourceData::Listed {
                values,
                ids: Some(ids),
            } => {
                if ids.len() != values.len() {
                    return Err(PlanError::Value(format!(
                        "got {} sample ids for {} values",
                        ids.len(),
                        values.len()
                    )));
                }
                let samples: IndexMap<_, _> = ids
                    .iter()
                    .cloned()
                    .zip(values.iter().map(|v| vec![v.clone()]))
                    .collect();
                if samples.len() != ids.len() {
                    return Err(PlanError::Value("sample ids must be unique".to_string()));
                }
                samples
            }
            SourceData::Tuple(values) => {
                IndexMap::from([(SampleId::single("id_0"), values.clone())])
            }
            SourceData::Scalar(value) => {
                IndexMap::from([(SampleId::single("id_0"), vec![value.clone()])])
            }
        };
        Ok(samples)
    }

    pub fn sample_count(&self) -> Result<usize> {
        Ok(self.samples()?.len())
    }
}
