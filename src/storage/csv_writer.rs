// Delimited text file writing

use crate::error::{EtlError, EtlResult};
use crate::execution::batch::{RecordBatch, SchemaRef};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration for writing delimited text files
#[derive(Debug, Clone, Default)]
pub struct CsvWriteOptions {
    /// Replace an existing file at the destination (default: false)
    pub overwrite: bool,
}

/// Write `batches` to `path` with a header row.
///
/// Rows go to a staging file next to the destination which is moved into
/// place once complete, so a failed write leaves no output behind. The parent
/// directory must already exist. Returns the number of data rows written.
pub fn write_csv<P: AsRef<Path>>(
    path: P,
    schema: SchemaRef,
    batches: &[RecordBatch],
    options: &CsvWriteOptions,
) -> EtlResult<usize> {
    let path = path.as_ref();
    let unavailable = |reason: String| EtlError::SinkUnavailable {
        path: path.to_path_buf(),
        reason,
    };

    if path.exists() && !options.overwrite {
        return Err(unavailable("destination already exists".to_string()));
    }
    if path.is_dir() {
        return Err(unavailable("destination is a directory".to_string()));
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !parent.is_dir() {
        return Err(unavailable(format!(
            "parent directory {} does not exist",
            parent.display()
        )));
    }

    let staging = staging_path(path);
    let rows = match write_staged(&staging, schema, batches) {
        Ok(rows) => rows,
        Err(reason) => {
            if let Err(e) = fs::remove_file(&staging) {
                warn!(path = %staging.display(), error = %e, "failed to remove staging file");
            }
            return Err(unavailable(reason));
        }
    };
    if let Err(reason) = publish(&staging, path, options.overwrite) {
        if let Err(e) = fs::remove_file(&staging) {
            warn!(path = %staging.display(), error = %e, "failed to remove staging file");
        }
        return Err(unavailable(reason));
    }

    debug!(path = %path.display(), rows, "wrote delimited output");
    Ok(rows)
}

/// Move the staged file to `path`. Without `overwrite` the file is linked
/// into place, which fails if anything appeared at `path` since the
/// existence check.
fn publish(staging: &Path, path: &Path, overwrite: bool) -> Result<(), String> {
    if overwrite {
        return fs::rename(staging, path).map_err(|e| e.to_string());
    }
    fs::hard_link(staging, path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => "destination already exists".to_string(),
        _ => e.to_string(),
    })?;
    fs::remove_file(staging).map_err(|e| e.to_string())
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.inprogress", name))
}

fn write_staged(staging: &Path, schema: SchemaRef, batches: &[RecordBatch]) -> Result<usize, String> {
    let file = File::create(staging).map_err(|e| e.to_string())?;
    let mut out = BufWriter::new(file);
    let mut rows = 0;
    {
        let mut writer = arrow::csv::Writer::new(&mut out);
        // The header is emitted on the first write, so always write at least one batch
        if batches.is_empty() {
            let empty = RecordBatch::empty(schema).to_arrow().map_err(|e| e.to_string())?;
            writer.write(&empty).map_err(|e| e.to_string())?;
        }
        for batch in batches {
            let batch = batch.to_arrow().map_err(|e| e.to_string())?;
            writer.write(&batch).map_err(|e| e.to_string())?;
            rows += batch.num_rows();
        }
    }
    out.flush().map_err(|e| e.to_string())?;
    out.get_ref().sync_all().map_err(|e| e.to_string())?;
    Ok(rows)
}
