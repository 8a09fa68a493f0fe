//! Batch ETL over motorsport timing data: reads lap times, drivers and races,
//! derives driver age and writes the mean lap time per age.

pub mod config;
pub mod dataframe;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod planner;
pub mod storage;
pub mod types;

pub use config::PipelineConfig;
pub use dataframe::DataFrame;
pub use error::{EtlError, EtlResult};
pub use pipeline::{run, Clock, FixedClock, RunSummary, SystemClock};
