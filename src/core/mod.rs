// src/core/mod.rs

//! Graph-independent building blocks: symbolic cardinalities, dimensions,
//! cardinality specs, datatypes, samples and jobs.

pub mod cardinality;
pub mod datatype;
pub mod dimension;
pub mod job;
pub mod samples;
pub mod source_data;
pub mod symbolic;

pub use cardinality::{CardinalityContext, CardinalitySpec, CardinalityTarget, create_cardinality};
pub use datatype::{RawValue, TypeRegistry, TypedValue};
pub use dimension::{Dimension, ForwardsDimensions, HasDimensions, Size};
pub use job::{Job, JobPayload, JobState, PayloadValue, is_url};
pub use samples::{SampleCollection, SampleId, SampleIndex, SampleItem, SampleKey};
pub use source_data::SourceData;
pub use symbolic::{Cardinality, SymbolId};
