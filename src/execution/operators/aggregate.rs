// GROUP BY aggregations

use crate::error::{EtlError, EtlResult};
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::key::{is_key_type, keys_to_array, row_key, ScalarKey};
use crate::execution::operators::Operator;
use crate::planner::logical_plan::{AggregateFunction, Aggregation};
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Per-aggregation state
#[derive(Clone, Debug)]
enum AggState {
    Count(u64),
    Sum { sum: f64, count: u64 },
    Avg { sum: f64, count: u64 },
}

impl AggState {
    fn initial(function: AggregateFunction) -> Self {
        match function {
            AggregateFunction::Count => AggState::Count(0),
            AggregateFunction::Sum => AggState::Sum { sum: 0.0, count: 0 },
            AggregateFunction::Avg => AggState::Avg { sum: 0.0, count: 0 },
        }
    }

    fn merge(&mut self, other: &AggState) {
        match (self, other) {
            (AggState::Count(a), AggState::Count(b)) => *a += b,
            (AggState::Sum { sum, count }, AggState::Sum { sum: s, count: c })
            | (AggState::Avg { sum, count }, AggState::Avg { sum: s, count: c }) => {
                *sum += s;
                *count += c;
            }
            _ => {}
        }
    }
}

type GroupTable = HashMap<Vec<ScalarKey>, Vec<AggState>>;

/// Hash aggregation with GROUP BY supporting COUNT, SUM and AVG.
///
/// Null group values form their own group. SUM and AVG skip values that are
/// null or not numeric (text columns are parsed as `f64`); a group with no
/// usable values yields null.
pub struct AggregateOperator {
    group_indices: Vec<usize>,
    /// Input column per aggregation, None for COUNT(*)
    agg_columns: Vec<Option<usize>>,
    aggs: Vec<Aggregation>,
    schema: SchemaRef,
}

impl AggregateOperator {
    pub fn new(
        group_by: Vec<String>,
        aggs: Vec<Aggregation>,
        input_schema: SchemaRef,
    ) -> EtlResult<Self> {
        let position = |name: &str| {
            input_schema
                .fields()
                .iter()
                .position(|f| f.name().as_str() == name)
                .ok_or_else(|| EtlError::missing_column(name, &input_schema))
        };

        let mut group_indices = Vec::with_capacity(group_by.len());
        let mut fields: Vec<Field> = Vec::new();
        for name in &group_by {
            let idx = position(name)?;
            let field = input_schema.field(idx);
            if !is_key_type(field.data_type()) {
                return Err(EtlError::UnsupportedType {
                    context: "group",
                    data_type: field.data_type().clone(),
                });
            }
            group_indices.push(idx);
            fields.push(field.clone().with_nullable(true));
        }

        let agg_columns = aggs
            .iter()
            .map(|a| a.column.as_deref().map(position).transpose())
            .collect::<EtlResult<Vec<_>>>()?;

        for agg in &aggs {
            let field = match agg.function {
                AggregateFunction::Count => Field::new(agg.alias.as_str(), DataType::Int64, false),
                AggregateFunction::Sum | AggregateFunction::Avg => {
                    Field::new(agg.alias.as_str(), DataType::Float64, true)
                }
            };
            fields.push(field);
        }

        Ok(Self {
            group_indices,
            agg_columns,
            aggs,
            schema: Arc::new(Schema::new(fields)),
        })
    }

    fn initial_states(&self) -> Vec<AggState> {
        self.aggs.iter().map(|a| AggState::initial(a.function)).collect()
    }

    /// Aggregate a single partition
    fn partial(&self, batch: &RecordBatch) -> EtlResult<GroupTable> {
        let group_cols = self
            .group_indices
            .iter()
            .map(|&i| batch.column(i).cloned())
            .collect::<EtlResult<Vec<_>>>()?;
        let agg_cols = self
            .agg_columns
            .iter()
            .map(|c| c.map(|i| batch.column(i).cloned()).transpose())
            .collect::<EtlResult<Vec<_>>>()?;

        let mut table = GroupTable::new();
        for row in 0..batch.num_rows() {
            let key = row_key(&group_cols, row, "group")?;
            let states = table.entry(key).or_insert_with(|| self.initial_states());

            for (state, col) in states.iter_mut().zip(&agg_cols) {
                match state {
                    AggState::Count(c) => {
                        let counted = col.as_ref().map_or(true, |col| !col.is_null(row));
                        if counted {
                            *c += 1;
                        }
                    }
                    AggState::Sum { sum, count } | AggState::Avg { sum, count } => {
                        if let Some(v) = col.as_ref().and_then(|col| extract_numeric(col, row)) {
                            *sum += v;
                            *count += 1;
                        }
                    }
                }
            }
        }
        Ok(table)
    }

    /// Partial aggregation per partition in parallel, then a single merge
    fn hash_aggregate(&self, inputs: &[RecordBatch]) -> EtlResult<RecordBatch> {
        let partials = inputs
            .par_iter()
            .map(|batch| self.partial(batch))
            .collect::<EtlResult<Vec<_>>>()?;

        let mut merged = GroupTable::new();
        for table in partials {
            for (key, states) in table {
                match merged.get_mut(&key) {
                    Some(existing) => {
                        for (a, b) in existing.iter_mut().zip(&states) {
                            a.merge(b);
                        }
                    }
                    None => {
                        merged.insert(key, states);
                    }
                }
            }
        }
        debug!(
            partitions = inputs.len(),
            groups = merged.len(),
            "aggregate merge complete"
        );

        self.build_output_batch(merged)
    }

    fn build_output_batch(&self, table: GroupTable) -> EtlResult<RecordBatch> {
        if table.is_empty() {
            return Ok(RecordBatch::empty(self.schema.clone()));
        }
        let (keys, states): (Vec<_>, Vec<_>) = table.into_iter().unzip();

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.schema.fields().len());
        for g in 0..self.group_indices.len() {
            let dt = self.schema.field(g).data_type();
            columns.push(keys_to_array(keys.iter().map(|k| &k[g]), dt)?);
        }
        for a in 0..self.aggs.len() {
            columns.push(collect_agg_column(states.iter().map(|s| &s[a])));
        }

        RecordBatch::try_new(self.schema.clone(), columns)
    }
}

/// Numeric value of a cell; None for nulls and text that does not parse to a
/// finite number ("NaN" and "inf" included)
fn extract_numeric(col: &ArrayRef, row: usize) -> Option<f64> {
    use arrow::array::*;
    if col.is_null(row) {
        return None;
    }
    match col.data_type() {
        DataType::Int32 => {
            let arr = col.as_any().downcast_ref::<Int32Array>()?;
            Some(arr.value(row) as f64)
        }
        DataType::Int64 => {
            let arr = col.as_any().downcast_ref::<Int64Array>()?;
            Some(arr.value(row) as f64)
        }
        DataType::Float64 => {
            let arr = col.as_any().downcast_ref::<Float64Array>()?;
            Some(arr.value(row))
        }
        DataType::Utf8 => {
            let arr = col.as_any().downcast_ref::<StringArray>()?;
            arr.value(row)
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
        }
        _ => None,
    }
}

fn collect_agg_column<'a, I>(states: I) -> ArrayRef
where
    I: Iterator<Item = &'a AggState>,
{
    let states: Vec<&AggState> = states.collect();
    match states.first() {
        Some(AggState::Count(_)) => Arc::new(
            states
                .iter()
                .map(|s| match s {
                    AggState::Count(c) => *c as i64,
                    _ => 0,
                })
                .collect::<Int64Array>(),
        ),
        _ => Arc::new(
            states
                .iter()
                .map(|s| match s {
                    AggState::Sum { sum, count } if *count > 0 => Some(*sum),
                    AggState::Avg { sum, count } if *count > 0 => Some(sum / (*count as f64)),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
    }
}

impl Operator for AggregateOperator {
    fn execute(&self, input: &RecordBatch) -> EtlResult<RecordBatch> {
        self.hash_aggregate(std::slice::from_ref(input))
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Always yields exactly one batch, empty when there are no groups
    fn execute_many(&self, inputs: &[RecordBatch]) -> EtlResult<Vec<RecordBatch>> {
        Ok(vec![self.hash_aggregate(inputs)?])
    }
}
