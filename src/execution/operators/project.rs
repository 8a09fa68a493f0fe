// Column selection/projection

use crate::error::{EtlError, EtlResult};
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::operators::Operator;
use arrow::datatypes::Schema;
use std::sync::Arc;

/// Project operator that selects a subset of columns, in the requested order
pub struct ProjectOperator {
    column_indices: Vec<usize>,
    schema: SchemaRef,
}

impl ProjectOperator {
    /// Create a new Project operator. Every requested column must exist in `input_schema`.
    pub fn new(column_names: Vec<String>, input_schema: SchemaRef) -> EtlResult<Self> {
        let mut column_indices = Vec::with_capacity(column_names.len());
        let mut fields = Vec::with_capacity(column_names.len());

        for name in &column_names {
            let (idx, field) = input_schema
                .fields()
                .iter()
                .enumerate()
                .find(|(_, f)| f.name() == name)
                .ok_or_else(|| EtlError::missing_column(name.as_str(), &input_schema))?;

            column_indices.push(idx);
            fields.push(field.clone());
        }

        Ok(Self {
            column_indices,
            schema: Arc::new(Schema::new(fields)),
        })
    }
}

impl Operator for ProjectOperator {
    fn execute(&self, input: &RecordBatch) -> EtlResult<RecordBatch> {
        input.select_columns(&self.column_indices)
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}
