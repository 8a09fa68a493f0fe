// Scan delimited text files

use crate::error::EtlResult;
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::storage::csv_reader::{CsvReadOptions, CsvReader};
use std::path::Path;

/// Source operator reading a delimited file.
/// The header is read when the operator is created so the schema is known
/// before any data row is parsed.
pub struct ScanOperator {
    reader: CsvReader,
    schema: SchemaRef,
}

impl ScanOperator {
    pub fn new<P: AsRef<Path>>(path: P, options: CsvReadOptions) -> EtlResult<Self> {
        let reader = CsvReader::from_path(path, options);
        let schema = reader.schema()?;
        Ok(Self { reader, schema })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn read_all(&self) -> EtlResult<Vec<RecordBatch>> {
        self.reader.read_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scan_schema_before_read() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "raceId,year,name").unwrap();
        writeln!(file, "1,2009,Australian Grand Prix").unwrap();
        file.flush().unwrap();

        let scan = ScanOperator::new(file.path(), CsvReadOptions::default()).unwrap();
        assert_eq!(scan.schema().fields().len(), 3);
        let batches = scan.read_all().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 1);
    }
}
