// Derived columns

use crate::error::EtlResult;
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::expr::{cast_array, evaluate};
use crate::execution::operators::Operator;
use crate::planner::logical_plan::{schema_with_field, LogicalExpr};
use arrow::datatypes::{DataType, Field};

/// Adds a column computed from an expression, or replaces the same-named
/// column in place. The derived column is always nullable.
pub struct WithColumnOperator {
    expr: LogicalExpr,
    data_type: DataType,
    /// Position of the column being replaced, if any
    replace_index: Option<usize>,
    schema: SchemaRef,
}

impl WithColumnOperator {
    /// Type-checks `expr` against `input_schema`
    pub fn new(name: String, expr: LogicalExpr, input_schema: SchemaRef) -> EtlResult<Self> {
        let data_type = expr.data_type(&input_schema)?;
        let replace_index = input_schema
            .fields()
            .iter()
            .position(|f| f.name() == &name);
        let schema = schema_with_field(&input_schema, Field::new(name, data_type.clone(), true));

        Ok(Self {
            expr,
            data_type,
            replace_index,
            schema,
        })
    }
}

impl Operator for WithColumnOperator {
    fn execute(&self, input: &RecordBatch) -> EtlResult<RecordBatch> {
        let derived = cast_array(&evaluate(&self.expr, input)?, &self.data_type)?;

        let mut columns = input.columns().to_vec();
        match self.replace_index {
            Some(idx) => columns[idx] = derived,
            None => columns.push(derived),
        }
        RecordBatch::try_new(self.schema.clone(), columns)
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}
