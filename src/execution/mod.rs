// src/execution/mod.rs

//! Run-time counterparts of planning nodes.

pub mod source_run;

pub use source_run::{ConstantNodeRun, SOURCE_JOB_INPUT, SourceNodeRun, SourceRunState};
