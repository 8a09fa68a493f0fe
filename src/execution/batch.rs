// Columnar partition of a record set

use crate::error::{EtlError, EtlResult};
use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch as ArrowRecordBatch;
use std::sync::Arc;
pub use arrow::datatypes::{Schema, SchemaRef};

/// One partition of a record set.
/// Wraps Arrow's columnar format; all partitions of a record set share a schema.
#[derive(Clone, Debug)]
pub struct RecordBatch {
    schema: SchemaRef,
    columns: Vec<ArrayRef>,
    num_rows: usize,
}

impl RecordBatch {
    /// Create a new RecordBatch from a schema and columns
    ///
    /// # Errors
    /// Returns an error if the number of columns doesn't match the schema,
    /// or if column lengths are inconsistent
    pub fn try_new(schema: SchemaRef, columns: Vec<ArrayRef>) -> EtlResult<Self> {
        if schema.fields().len() != columns.len() {
            return Err(EtlError::InvalidBatch(format!(
                "schema has {} fields but {} columns provided",
                schema.fields().len(),
                columns.len()
            )));
        }

        let num_rows = columns.first().map(|col| col.len()).unwrap_or(0);
        for (idx, col) in columns.iter().enumerate() {
            if col.len() != num_rows {
                return Err(EtlError::InvalidBatch(format!(
                    "column {} has length {} but expected {}",
                    idx,
                    col.len(),
                    num_rows
                )));
            }
        }

        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    /// Zero-row batch with the given schema
    pub fn empty(schema: SchemaRef) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| arrow::array::new_empty_array(f.data_type()))
            .collect();
        Self {
            schema,
            columns,
            num_rows: 0,
        }
    }

    /// Convert to an Arrow RecordBatch (validates nullability against the schema)
    pub fn to_arrow(&self) -> EtlResult<ArrowRecordBatch> {
        Ok(ArrowRecordBatch::try_new(
            self.schema.clone(),
            self.columns.clone(),
        )?)
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ArrayRef] {
        &self.columns
    }

    /// Get a specific column by index
    pub fn column(&self, index: usize) -> EtlResult<&ArrayRef> {
        self.columns.get(index).ok_or_else(|| {
            EtlError::InvalidBatch(format!(
                "column index {} out of bounds (batch has {} columns)",
                index,
                self.columns.len()
            ))
        })
    }

    /// Get a column by name
    pub fn column_by_name(&self, name: &str) -> Option<&ArrayRef> {
        let index = self
            .schema
            .fields()
            .iter()
            .position(|f| f.name().as_str() == name)?;
        self.columns.get(index)
    }

    /// Like [`RecordBatch::column_by_name`] but fails with `MissingColumn`
    pub fn required_column(&self, name: &str) -> EtlResult<&ArrayRef> {
        self.column_by_name(name)
            .ok_or_else(|| EtlError::missing_column(name, &self.schema))
    }

    /// Select a subset of columns by indices into a new batch
    pub fn select_columns(&self, indices: &[usize]) -> EtlResult<Self> {
        let fields: Vec<_> = indices
            .iter()
            .map(|&idx| {
                self.schema.fields().get(idx).cloned().ok_or_else(|| {
                    EtlError::InvalidBatch(format!("column index {} out of bounds", idx))
                })
            })
            .collect::<EtlResult<_>>()?;

        let columns: Vec<_> = indices
            .iter()
            .map(|&idx| self.column(idx).cloned())
            .collect::<EtlResult<_>>()?;

        Self::try_new(Arc::new(Schema::new(fields)), columns)
    }

    /// Concatenate partitions into one batch. All batches must share a schema.
    pub fn concat(batches: &[Self]) -> EtlResult<Self> {
        let first_schema = match batches.first() {
            Some(b) => b.schema(),
            None => {
                return Err(EtlError::InvalidBatch(
                    "cannot concatenate empty batch list".to_string(),
                ))
            }
        };
        for (idx, batch) in batches.iter().enumerate().skip(1) {
            if batch.schema() != first_schema {
                return Err(EtlError::InvalidBatch(format!(
                    "batch {} has different schema than first batch",
                    idx
                )));
            }
        }

        let num_columns = first_schema.fields().len();
        let mut concatenated_columns = Vec::with_capacity(num_columns);
        for col_idx in 0..num_columns {
            let refs: Vec<&dyn arrow::array::Array> = batches
                .iter()
                .map(|batch| batch.columns[col_idx].as_ref())
                .collect();
            concatenated_columns.push(arrow_select::concat::concat(&refs)?);
        }

        let total_rows: usize = batches.iter().map(|b| b.num_rows).sum();
        Self::try_new(first_schema.clone(), concatenated_columns).map(|batch| {
            debug_assert_eq!(batch.num_rows, total_rows);
            batch
        })
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }
}

/// Total row count across partitions
pub fn total_rows(batches: &[RecordBatch]) -> usize {
    batches.iter().map(RecordBatch::num_rows).sum()
}
