// Logical query plan

use std::path::PathBuf;
use std::sync::Arc;

use arrow::datatypes::{DataType, Schema, SchemaRef};
use chrono::NaiveDate;

use crate::error::{EtlError, EtlResult};
use crate::execution::operators::{
    AggregateOperator, DropOperator, HashJoinOperator, Operator, ProjectOperator,
    WithColumnOperator,
};
use crate::storage::csv_reader::CsvReadOptions;

/// Scalar expression evaluated per row to derive a column
#[derive(Debug, Clone)]
pub enum LogicalExpr {
    /// Column reference by name
    Column(String),
    /// Literal value, repeated for every row
    Literal(LogicalValue),
    /// Whole days from `start` to `end`; both sides are cast to dates first
    DateDiff {
        end: Box<LogicalExpr>,
        start: Box<LogicalExpr>,
    },
    /// Floating point arithmetic: left op right
    Arithmetic {
        left: Box<LogicalExpr>,
        op: ArithmeticOp,
        right: Box<LogicalExpr>,
    },
    /// Explicit type conversion. Values that cannot be converted become null.
    Cast {
        expr: Box<LogicalExpr>,
        data_type: DataType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Literal values in expressions
#[derive(Debug, Clone)]
pub enum LogicalValue {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Date(NaiveDate),
}

impl LogicalValue {
    pub fn data_type(&self) -> DataType {
        match self {
            LogicalValue::Int32(_) => DataType::Int32,
            LogicalValue::Int64(_) => DataType::Int64,
            LogicalValue::Float64(_) => DataType::Float64,
            LogicalValue::String(_) => DataType::Utf8,
            LogicalValue::Date(_) => DataType::Date32,
        }
    }
}

impl LogicalExpr {
    /// Type this expression produces against `schema`.
    /// Fails with `MissingColumn` when a referenced column is absent.
    pub fn data_type(&self, schema: &Schema) -> EtlResult<DataType> {
        match self {
            LogicalExpr::Column(name) => schema
                .fields()
                .iter()
                .find(|f| f.name() == name)
                .map(|f| f.data_type().clone())
                .ok_or_else(|| EtlError::missing_column(name.as_str(), schema)),
            LogicalExpr::Literal(value) => Ok(value.data_type()),
            LogicalExpr::DateDiff { end, start } => {
                end.data_type(schema)?;
                start.data_type(schema)?;
                Ok(DataType::Int32)
            }
            LogicalExpr::Arithmetic { left, right, .. } => {
                left.data_type(schema)?;
                right.data_type(schema)?;
                Ok(DataType::Float64)
            }
            LogicalExpr::Cast { expr, data_type } => {
                let from = expr.data_type(schema)?;
                if !arrow::compute::can_cast_types(&from, data_type) {
                    return Err(EtlError::TypeCastFailure {
                        from,
                        to: data_type.clone(),
                        reason: "no conversion between these types".to_string(),
                    });
                }
                Ok(data_type.clone())
            }
        }
    }
}

/// Aggregate function for GROUP BY aggregations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
}

/// An aggregation expression: function, optional column (None for Count(*)), and output alias
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub function: AggregateFunction,
    pub column: Option<String>,
    pub alias: String,
}

/// Logical plan: a tree of record-set transforms.
/// Each node's schema is derivable without reading any data rows.
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// Read a delimited text file
    Scan {
        path: PathBuf,
        options: CsvReadOptions,
        schema: SchemaRef, // From the header, read at plan construction
    },
    /// Select/project specific columns
    Project {
        input: Box<LogicalPlan>,
        columns: Vec<String>,
    },
    /// Add or replace a column computed from an expression
    WithColumn {
        input: Box<LogicalPlan>,
        name: String,
        expr: LogicalExpr,
    },
    /// Remove columns; absent names are ignored
    Drop {
        input: Box<LogicalPlan>,
        columns: Vec<String>,
    },
    /// Aggregate with GROUP BY
    Aggregate {
        input: Box<LogicalPlan>,
        group_by: Vec<String>,
        aggs: Vec<Aggregation>,
    },
    /// Inner equi-join on shared key columns
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        on: Vec<String>,
        right_alias: String, // Prefix for colliding right-side columns
    },
}

impl LogicalPlan {
    /// Output schema of this plan node.
    /// Delegates to the physical operator constructors so plan and execution agree.
    pub fn schema(&self) -> EtlResult<SchemaRef> {
        match self {
            LogicalPlan::Scan { schema, .. } => Ok(schema.clone()),
            LogicalPlan::Project { input, columns } => {
                Ok(ProjectOperator::new(columns.clone(), input.schema()?)?.schema())
            }
            LogicalPlan::WithColumn { input, name, expr } => {
                Ok(WithColumnOperator::new(name.clone(), expr.clone(), input.schema()?)?.schema())
            }
            LogicalPlan::Drop { input, columns } => {
                Ok(DropOperator::new(columns, input.schema()?).schema())
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggs,
            } => Ok(AggregateOperator::new(group_by.clone(), aggs.clone(), input.schema()?)?.schema()),
            LogicalPlan::Join {
                left,
                right,
                on,
                right_alias,
            } => Ok(HashJoinOperator::new(
                on.clone(),
                right_alias.clone(),
                left.schema()?,
                right.schema()?,
            )?
            .schema()),
        }
    }

    /// Short node label for logging
    pub fn name(&self) -> &'static str {
        match self {
            LogicalPlan::Scan { .. } => "scan",
            LogicalPlan::Project { .. } => "project",
            LogicalPlan::WithColumn { .. } => "with_column",
            LogicalPlan::Drop { .. } => "drop",
            LogicalPlan::Aggregate { .. } => "aggregate",
            LogicalPlan::Join { .. } => "join",
        }
    }
}

/// Schema with `field` appended, or replacing the same-named field in place
pub(crate) fn schema_with_field(schema: &Schema, field: arrow::datatypes::Field) -> SchemaRef {
    let mut fields: Vec<_> = schema.fields().iter().cloned().collect();
    match fields.iter().position(|f| f.name() == field.name()) {
        Some(idx) => fields[idx] = Arc::new(field),
        None => fields.push(Arc::new(field)),
    }
    Arc::new(Schema::new(fields))
}
