// Delimited text file reading

use crate::error::{EtlError, EtlResult};
use crate::execution::batch::RecordBatch;
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Configuration for reading delimited text files
#[derive(Debug, Clone)]
pub struct CsvReadOptions {
    /// First row holds column names (default: true).
    /// Without a header, columns are named `_c0`, `_c1`, ...
    pub has_header: bool,
    /// Field delimiter (default: `,`)
    pub delimiter: u8,
    /// Token read as null in addition to the empty field
    pub null_value: Option<String>,
    /// Rows per partition (default: 8192)
    pub batch_size: usize,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            null_value: None,
            batch_size: 8192,
        }
    }
}

/// Reads a delimited file into partitions of nullable `Utf8` columns.
/// No type inference is done; casts are explicit downstream.
///
/// A row whose field count differs from the header's fails the whole read
/// with [`EtlError::MalformedRow`].
pub struct CsvReader {
    path: PathBuf,
    options: CsvReadOptions,
}

impl CsvReader {
    pub fn from_path<P: AsRef<Path>>(path: P, options: CsvReadOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options,
        }
    }

    fn open(&self) -> EtlResult<csv::Reader<BufReader<File>>> {
        let file = File::open(&self.path).map_err(|source| EtlError::SourceUnavailable {
            path: self.path.clone(),
            source,
        })?;
        Ok(csv::ReaderBuilder::new()
            .has_headers(self.options.has_header)
            .delimiter(self.options.delimiter)
            .flexible(true)
            .from_reader(BufReader::new(file)))
    }

    /// Schema from the header row (or the width of the first row when headerless).
    /// Only the first row is read.
    pub fn schema(&self) -> EtlResult<SchemaRef> {
        let mut reader = self.open()?;
        let names: Vec<String> = if self.options.has_header {
            reader.headers()?.iter().map(str::to_string).collect()
        } else {
            let mut first = csv::StringRecord::new();
            let width = if reader.read_record(&mut first)? {
                first.len()
            } else {
                0
            };
            (0..width).map(|i| format!("_c{}", i)).collect()
        };

        let fields: Vec<Field> = names
            .into_iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect();
        Ok(Arc::new(Schema::new(fields)))
    }

    /// Read every data row, chunked into partitions of `batch_size` rows
    pub fn read_all(&self) -> EtlResult<Vec<RecordBatch>> {
        let schema = self.schema()?;
        let width = schema.fields().len();
        let batch_size = self.options.batch_size.max(1);

        let mut reader = self.open()?;
        let mut batches = Vec::new();
        let mut buffers = new_buffers(width, batch_size);
        let mut buffered = 0;
        let mut record = csv::StringRecord::new();

        while reader.read_record(&mut record)? {
            if record.len() != width {
                return Err(EtlError::MalformedRow {
                    path: self.path.clone(),
                    line: record.position().map_or(0, |p| p.line()),
                    expected: width,
                    found: record.len(),
                });
            }
            for (buffer, value) in buffers.iter_mut().zip(record.iter()) {
                buffer.push(self.cell(value));
            }
            buffered += 1;

            if buffered == batch_size {
                let full = std::mem::replace(&mut buffers, new_buffers(width, batch_size));
                batches.push(to_batch(&schema, full)?);
                buffered = 0;
            }
        }
        if buffered > 0 {
            batches.push(to_batch(&schema, buffers)?);
        }

        debug!(
            path = %self.path.display(),
            partitions = batches.len(),
            rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
            "read delimited source"
        );
        Ok(batches)
    }

    fn cell(&self, value: &str) -> Option<String> {
        if value.is_empty() || self.options.null_value.as_deref() == Some(value) {
            None
        } else {
            Some(value.to_string())
        }
    }
}

fn new_buffers(width: usize, batch_size: usize) -> Vec<Vec<Option<String>>> {
    (0..width).map(|_| Vec::with_capacity(batch_size)).collect()
}

fn to_batch(schema: &SchemaRef, buffers: Vec<Vec<Option<String>>>) -> EtlResult<RecordBatch> {
    let columns: Vec<ArrayRef> = buffers
        .into_iter()
        .map(|values| Arc::new(StringArray::from(values)) as ArrayRef)
        .collect();
    RecordBatch::try_new(schema.clone(), columns)
}

/// Convenience function to read a delimited file into partitions
pub fn read_csv<P: AsRef<Path>>(path: P, options: CsvReadOptions) -> EtlResult<Vec<RecordBatch>> {
    CsvReader::from_path(path, options).read_all()
}
