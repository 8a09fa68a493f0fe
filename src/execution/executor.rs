// Execution engine coordinator

use crate::error::{EtlError, EtlResult};
use crate::execution::batch::{total_rows, RecordBatch};
use crate::execution::operators::{
    AggregateOperator, DropOperator, HashJoinOperator, Operator, ProjectOperator, ScanOperator,
    WithColumnOperator,
};
use crate::planner::logical_plan::LogicalPlan;
use tracing::debug;

/// Executor that coordinates the execution of logical plans.
/// Converts plan nodes to physical operators and runs them over partitions.
///
/// Per-partition operators run in parallel; join and aggregate are the only
/// points where all upstream partitions must be complete.
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// Execute a logical plan and return the resulting partitions
    pub fn execute(&self, plan: &LogicalPlan) -> EtlResult<Vec<RecordBatch>> {
        let output = match plan {
            LogicalPlan::Scan {
                path,
                options,
                schema,
            } => {
                let scan = ScanOperator::new(path, options.clone())?;
                if &scan.schema() != schema {
                    return Err(EtlError::InvalidBatch(format!(
                        "header of {} changed after the plan was built",
                        path.display()
                    )));
                }
                scan.read_all()?
            }
            LogicalPlan::Project { input, columns } => {
                let input_batches = self.execute(input)?;
                let project_op = ProjectOperator::new(columns.clone(), input.schema()?)?;
                project_op.execute_many(&input_batches)?
            }
            LogicalPlan::WithColumn { input, name, expr } => {
                let input_batches = self.execute(input)?;
                let derive_op = WithColumnOperator::new(name.clone(), expr.clone(), input.schema()?)?;
                derive_op.execute_many(&input_batches)?
            }
            LogicalPlan::Drop { input, columns } => {
                let input_batches = self.execute(input)?;
                DropOperator::new(columns, input.schema()?).execute_many(&input_batches)?
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggs,
            } => {
                let input_batches = self.execute(input)?;
                let agg_op = AggregateOperator::new(group_by.clone(), aggs.clone(), input.schema()?)?;
                agg_op.execute_many(&input_batches)?
            }
            LogicalPlan::Join {
                left,
                right,
                on,
                right_alias,
            } => {
                let (left_batches, right_batches) =
                    rayon::join(|| self.execute(left), || self.execute(right));
                let (left_batches, right_batches) = (left_batches?, right_batches?);
                let join_op = HashJoinOperator::new(
                    on.clone(),
                    right_alias.clone(),
                    left.schema()?,
                    right.schema()?,
                )?;
                join_op.execute_join(&left_batches, &right_batches)?
            }
        };

        debug!(
            node = plan.name(),
            partitions = output.len(),
            rows = total_rows(&output),
            "plan node complete"
        );
        Ok(output)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
