pub mod aggregate;
pub mod drop;
pub mod join;
pub mod project;
pub mod scan;
pub mod with_column;

// Export operators for use by executor and planner
pub use aggregate::AggregateOperator;
pub use drop::DropOperator;
pub use join::HashJoinOperator;
pub use project::ProjectOperator;
pub use scan::ScanOperator;
pub use with_column::WithColumnOperator;

use crate::error::EtlResult;
use crate::execution::batch::{RecordBatch, SchemaRef};
use rayon::prelude::*;

/// Trait for per-partition execution operators
/// Operators process RecordBatches in a vectorized manner
pub trait Operator: Send + Sync {
    /// Execute the operator on one partition
    fn execute(&self, input: &RecordBatch) -> EtlResult<RecordBatch>;

    /// Output schema of this operator
    fn schema(&self) -> SchemaRef;

    /// Execute the operator over all partitions.
    /// Default runs `execute` on each partition in parallel, preserving partition order.
    fn execute_many(&self, inputs: &[RecordBatch]) -> EtlResult<Vec<RecordBatch>> {
        inputs.par_iter().map(|batch| self.execute(batch)).collect()
    }
}
