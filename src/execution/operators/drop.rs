// Column pruning

use crate::error::EtlResult;
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::operators::Operator;
use arrow::datatypes::Schema;
use std::sync::Arc;

/// Removes named columns. Names not present in the input are ignored.
pub struct DropOperator {
    keep_indices: Vec<usize>,
    schema: SchemaRef,
}

impl DropOperator {
    pub fn new(columns: &[String], input_schema: SchemaRef) -> Self {
        let (keep_indices, fields): (Vec<usize>, Vec<_>) = input_schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| !columns.iter().any(|c| c == f.name()))
            .map(|(idx, f)| (idx, f.clone()))
            .unzip();

        Self {
            keep_indices,
            schema: Arc::new(Schema::new(fields)),
        }
    }
}

impl Operator for DropOperator {
    fn execute(&self, input: &RecordBatch) -> EtlResult<RecordBatch> {
        input.select_columns(&self.keep_indices)
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}
