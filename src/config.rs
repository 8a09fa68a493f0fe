//! Pipeline configuration loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EtlError, EtlResult};
use crate::storage::csv_reader::CsvReadOptions;
use crate::storage::csv_writer::CsvWriteOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub inputs: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub csv: CsvConfig,
    /// Size of the global worker pool; rayon's default when unset
    #[serde(default)]
    pub num_threads: Option<usize>,
}

/// Locations of the three source tables
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    pub lap_times: PathBuf,
    pub drivers: PathBuf,
    pub races: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub overwrite: bool,
}

/// Parsing options shared by all inputs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub has_header: bool,
    pub delimiter: char,
    pub null_value: Option<String>,
    pub batch_size: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: ',',
            null_value: None,
            batch_size: 8192,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> EtlResult<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Toml))
            .build()?;
        let parsed: PipelineConfig = cfg.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> EtlResult<()> {
        self.csv.read_options()?;
        if self.num_threads == Some(0) {
            return Err(EtlError::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_options(&self) -> EtlResult<CsvReadOptions> {
        self.csv.read_options()
    }

    pub fn write_options(&self) -> CsvWriteOptions {
        CsvWriteOptions {
            overwrite: self.output.overwrite,
        }
    }
}

impl CsvConfig {
    pub fn read_options(&self) -> EtlResult<CsvReadOptions> {
        if !self.delimiter.is_ascii() {
            return Err(EtlError::InvalidConfig(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )));
        }
        if self.batch_size == 0 {
            return Err(EtlError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(CsvReadOptions {
            has_header: self.has_header,
            delimiter: self.delimiter as u8,
            null_value: self.null_value.clone(),
            batch_size: self.batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn load(contents: &str) -> EtlResult<PipelineConfig> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etl_config.toml");
        fs::write(&path, contents).unwrap();
        PipelineConfig::load(&path)
    }

    const MINIMAL: &str = r#"
[inputs]
lap_times = "raw/lap_times.csv"
drivers = "raw/drivers.csv"
races = "raw/races.csv"

[output]
path = "processed/laptimes_by_age.csv"
"#;

    #[test]
    fn test_defaults() {
        let cfg = load(MINIMAL).unwrap();
        assert_eq!(cfg.inputs.drivers, PathBuf::from("raw/drivers.csv"));
        assert!(!cfg.output.overwrite);
        assert_eq!(cfg.num_threads, None);
        let read = cfg.read_options().unwrap();
        assert!(read.has_header);
        assert_eq!(read.delimiter, b',');
        assert_eq!(read.batch_size, 8192);
    }

    #[test]
    fn test_csv_section() {
        let cfg = load(&format!(
            "num_threads = 2\n{MINIMAL}\n[csv]\ndelimiter = \";\"\nnull_value = \"\\\\N\"\n"
        ))
        .unwrap();
        assert_eq!(cfg.num_threads, Some(2));
        let read = cfg.read_options().unwrap();
        assert_eq!(read.delimiter, b';');
        assert_eq!(read.null_value.as_deref(), Some("\\N"));
    }

    #[test]
    fn test_invalid_values() {
        let cfg = load(&format!("{MINIMAL}\n[csv]\nbatch_size = 0\n"));
        assert!(matches!(cfg, Err(EtlError::InvalidConfig(_))));

        let cfg = load(&format!("{MINIMAL}\n[csv]\ndelimiter = \"§\"\n"));
        assert!(matches!(cfg, Err(EtlError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_section() {
        let cfg = load("[output]\npath = \"out.csv\"\n");
        assert!(matches!(cfg, Err(EtlError::Config(_))));
    }
}
