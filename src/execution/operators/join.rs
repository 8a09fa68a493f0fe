// Hash inner equi-join

use crate::error::{EtlError, EtlResult};
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::expr::cast_array;
use crate::execution::key::{row_key, ScalarKey};
use arrow::array::{ArrayRef, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type BuildTable = HashMap<Vec<ScalarKey>, Vec<u32>>;

/// Hash join: build a hash table from the right (build) side, probe with the left.
///
/// Output columns are the key columns once (taken from the left), then the
/// remaining left columns, then the remaining right columns. A right column
/// whose name is already taken is renamed `<right_alias>_<name>`.
/// Rows with a null in any key column never match.
pub struct HashJoinOperator {
    left_key_indices: Vec<usize>,
    right_key_indices: Vec<usize>,
    left_rest: Vec<usize>,
    right_rest: Vec<usize>,
    /// Per key: common type to compare in when the two sides disagree
    key_coercion: Vec<Option<DataType>>,
    schema: SchemaRef,
}

impl HashJoinOperator {
    /// Validates the keys against both schemas and derives the output schema
    pub fn new(
        on: Vec<String>,
        right_alias: String,
        left_schema: SchemaRef,
        right_schema: SchemaRef,
    ) -> EtlResult<Self> {
        if on.is_empty() {
            return Err(EtlError::InvalidPlan(
                "join requires at least one key column".to_string(),
            ));
        }

        let position = |schema: &Schema, name: &str| {
            schema
                .fields()
                .iter()
                .position(|f| f.name().as_str() == name)
                .ok_or_else(|| EtlError::missing_column(name, schema))
        };

        let left_key_indices = on
            .iter()
            .map(|k| position(left_schema.as_ref(), k.as_str()))
            .collect::<EtlResult<Vec<_>>>()?;
        let right_key_indices = on
            .iter()
            .map(|k| position(right_schema.as_ref(), k.as_str()))
            .collect::<EtlResult<Vec<_>>>()?;

        let key_coercion = left_key_indices
            .iter()
            .zip(&right_key_indices)
            .map(|(&l, &r)| {
                let (lt, rt) = (left_schema.field(l).data_type(), right_schema.field(r).data_type());
                (lt != rt).then_some(DataType::Utf8)
            })
            .collect::<Vec<_>>();

        let left_rest: Vec<usize> = (0..left_schema.fields().len())
            .filter(|i| !left_key_indices.contains(i))
            .collect();
        let right_rest: Vec<usize> = (0..right_schema.fields().len())
            .filter(|i| !right_key_indices.contains(i))
            .collect();

        let mut fields: Vec<Field> = left_key_indices
            .iter()
            .chain(&left_rest)
            .map(|&i| left_schema.field(i).clone())
            .collect();
        for &i in &right_rest {
            let field = right_schema.field(i);
            let taken = fields.iter().any(|f| f.name() == field.name());
            if taken {
                let renamed = format!("{}_{}", right_alias, field.name());
                fields.push(field.clone().with_name(renamed));
            } else {
                fields.push(field.clone());
            }
        }

        Ok(Self {
            left_key_indices,
            right_key_indices,
            left_rest,
            right_rest,
            key_coercion,
            schema: Arc::new(Schema::new(fields)),
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Execute the join. The right side is concatenated and hashed once,
    /// then every left partition is probed in parallel.
    pub fn execute_join(
        &self,
        left_batches: &[RecordBatch],
        right_batches: &[RecordBatch],
    ) -> EtlResult<Vec<RecordBatch>> {
        if left_batches.is_empty() || right_batches.is_empty() {
            return Ok(Vec::new());
        }
        let right = if right_batches.len() == 1 {
            right_batches[0].clone()
        } else {
            RecordBatch::concat(right_batches)?
        };

        let table = self.build(&right)?;
        debug!(
            build_rows = right.num_rows(),
            distinct_keys = table.len(),
            probe_partitions = left_batches.len(),
            "join build complete"
        );

        let probed = left_batches
            .par_iter()
            .map(|left| self.probe(left, &right, &table))
            .collect::<EtlResult<Vec<_>>>()?;
        Ok(probed.into_iter().flatten().collect())
    }

    fn key_columns(&self, batch: &RecordBatch, indices: &[usize]) -> EtlResult<Vec<ArrayRef>> {
        indices
            .iter()
            .zip(&self.key_coercion)
            .map(|(&i, coercion)| {
                let col = batch.column(i)?;
                match coercion {
                    Some(dt) => cast_array(col, dt),
                    None => Ok(col.clone()),
                }
            })
            .collect()
    }

    fn build(&self, right: &RecordBatch) -> EtlResult<BuildTable> {
        let keys = self.key_columns(right, &self.right_key_indices)?;
        let mut table: BuildTable = HashMap::new();
        for row in 0..right.num_rows() {
            let key = row_key(&keys, row, "join key")?;
            if key.iter().any(ScalarKey::is_null) {
                continue;
            }
            table.entry(key).or_default().push(row as u32);
        }
        Ok(table)
    }

    fn probe(
        &self,
        left: &RecordBatch,
        right: &RecordBatch,
        table: &BuildTable,
    ) -> EtlResult<Option<RecordBatch>> {
        let keys = self.key_columns(left, &self.left_key_indices)?;
        let mut left_indices = Vec::new();
        let mut right_indices = Vec::new();

        for row in 0..left.num_rows() {
            let key = row_key(&keys, row, "join key")?;
            if key.iter().any(ScalarKey::is_null) {
                continue;
            }
            if let Some(matches) = table.get(&key) {
                for &rr in matches {
                    left_indices.push(row as u32);
                    right_indices.push(rr);
                }
            }
        }

        if left_indices.is_empty() {
            return Ok(None);
        }

        let left_take = UInt32Array::from(left_indices);
        let right_take = UInt32Array::from(right_indices);
        let mut columns = Vec::with_capacity(self.schema.fields().len());
        for &i in self.left_key_indices.iter().chain(&self.left_rest) {
            columns.push(arrow_select::take::take(left.column(i)?.as_ref(), &left_take, None)?);
        }
        for &i in &self.right_rest {
            columns.push(arrow_select::take::take(right.column(i)?.as_ref(), &right_take, None)?);
        }
        RecordBatch::try_new(self.schema.clone(), columns).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int32Array, StringArray};

    fn utf8_batch(columns: &[(&str, Vec<Option<&str>>)]) -> RecordBatch {
        let schema = Arc::new(Schema::new(
            columns
                .iter()
                .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));
        let arrays: Vec<ArrayRef> = columns
            .iter()
            .map(|(_, values)| Arc::new(StringArray::from(values.clone())) as ArrayRef)
            .collect();
        RecordBatch::try_new(schema, arrays).unwrap()
    }

    fn join(
        left: &RecordBatch,
        right: &RecordBatch,
        on: &[&str],
    ) -> (HashJoinOperator, Vec<RecordBatch>) {
        let op = HashJoinOperator::new(
            on.iter().map(|s| s.to_string()).collect(),
            "right".to_string(),
            left.schema().clone(),
            right.schema().clone(),
        )
        .unwrap();
        let out = op
            .execute_join(std::slice::from_ref(left), std::slice::from_ref(right))
            .unwrap();
        (op, out)
    }

    fn column_values(batches: &[RecordBatch], name: &str) -> Vec<Option<String>> {
        batches
            .iter()
            .flat_map(|b| {
                let col = b.column_by_name(name).unwrap();
                let col = col.as_any().downcast_ref::<StringArray>().unwrap();
                col.iter()
                    .map(|v| v.map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn drivers() -> RecordBatch {
        utf8_batch(&[
            ("driverId", vec![Some("1"), Some("2"), Some("3"), None]),
            ("surname", vec![Some("Hamilton"), Some("Heidfeld"), Some("Rosberg"), Some("Ghost")]),
        ])
    }

    fn lap_times() -> RecordBatch {
        utf8_batch(&[
            ("raceId", vec![Some("841"), Some("841"), Some("842"), Some("841"), Some("841")]),
            ("driverId", vec![Some("1"), Some("1"), Some("1"), Some("2"), None]),
            ("milliseconds", vec![Some("98109"), Some("93006"), Some("92713"), Some("99000"), Some("1")]),
        ])
    }

    #[test]
    fn test_output_schema_layout() {
        let (op, _) = join(&drivers(), &lap_times(), &["driverId"]);
        let names: Vec<_> = op.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["driverId", "surname", "raceId", "milliseconds"]);
    }

    #[test]
    fn test_fan_out_and_drop_unmatched() {
        let (_, out) = join(&drivers(), &lap_times(), &["driverId"]);
        let mut ids = column_values(&out, "driverId");
        ids.sort();
        // Driver 1 fans out to three laps, driver 2 to one; driver 3 has no laps
        assert_eq!(
            ids,
            vec![
                Some("1".to_string()),
                Some("1".to_string()),
                Some("1".to_string()),
                Some("2".to_string())
            ]
        );
    }

    #[test]
    fn test_null_keys_never_match() {
        let (_, out) = join(&drivers(), &lap_times(), &["driverId"]);
        let surnames = column_values(&out, "surname");
        assert!(!surnames.contains(&Some("Ghost".to_string())));
        let millis = column_values(&out, "milliseconds");
        assert!(!millis.contains(&Some("1".to_string())));
    }

    #[test]
    fn test_multi_key_join() {
        let results = utf8_batch(&[
            ("raceId", vec![Some("841"), Some("842")]),
            ("driverId", vec![Some("1"), Some("2")]),
            ("points", vec![Some("10"), Some("8")]),
        ]);
        let (op, out) = join(&lap_times(), &results, &["raceId", "driverId"]);
        assert_eq!(op.schema().field(0).name(), "raceId");
        assert_eq!(op.schema().field(1).name(), "driverId");
        // (841, 1) matches twice; (842, 2) has no lap
        let points = column_values(&out, "points");
        assert_eq!(points, vec![Some("10".to_string()), Some("10".to_string())]);
    }

    #[test]
    fn test_column_collision_is_prefixed() {
        let left = utf8_batch(&[("raceId", vec![Some("1")]), ("name", vec![Some("left")])]);
        let right = utf8_batch(&[("raceId", vec![Some("1")]), ("name", vec![Some("right")])]);
        let (op, out) = join(&left, &right, &["raceId"]);
        let names: Vec<_> = op.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["raceId", "name", "right_name"]);
        assert_eq!(column_values(&out, "right_name"), vec![Some("right".to_string())]);
    }

    #[test]
    fn test_mismatched_key_types_compare_as_text() {
        let left = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new("driverId", DataType::Int32, true)])),
            vec![Arc::new(Int32Array::from(vec![1, 2])) as ArrayRef],
        )
        .unwrap();
        let (_, out) = join(&left, &lap_times(), &["driverId"]);
        let rows: usize = out.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 4);
        // Key column keeps the left side's type
        assert_eq!(out[0].schema().field(0).data_type(), &DataType::Int32);
    }

    #[test]
    fn test_join_is_commutative_in_content() {
        let (_, ab) = join(&drivers(), &lap_times(), &["driverId"]);
        let (_, ba) = join(&lap_times(), &drivers(), &["driverId"]);
        let rows = |batches: &[RecordBatch]| {
            let mut rows: Vec<_> = column_values(batches, "driverId")
                .into_iter()
                .zip(column_values(batches, "surname"))
                .zip(column_values(batches, "milliseconds"))
                .collect();
            rows.sort();
            rows
        };
        assert_eq!(rows(&ab), rows(&ba));
    }

    #[test]
    fn test_missing_key_column() {
        let result = HashJoinOperator::new(
            vec!["raceId".to_string()],
            "right".to_string(),
            drivers().schema().clone(),
            lap_times().schema().clone(),
        );
        assert!(matches!(result, Err(EtlError::MissingColumn { .. })));
    }

    #[test]
    fn test_probe_partitions_in_parallel() {
        let d = drivers();
        let (op, _) = join(&d, &lap_times(), &["driverId"]);
        let out = op
            .execute_join(&[d.clone(), d.clone(), d], std::slice::from_ref(&lap_times()))
            .unwrap();
        let rows: usize = out.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(rows, 12);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|b| b.num_columns() == 4));
    }
}
