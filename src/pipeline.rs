//! The lap-times-by-age job.
//!
//! Reads the three source tables, derives each driver's age, joins drivers
//! to their laps and the laps to their races, and writes the mean lap time
//! per age.

use std::path::{Path, PathBuf};

use arrow::datatypes::DataType;
use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::dataframe::{col, date_diff, lit_date, lit_float64, DataFrame, ExprBuilder};
use crate::error::EtlResult;
use crate::storage::csv_reader::CsvReadOptions;
use crate::types::{
    TableDef, AGE, DOB, DRIVERS, DRIVER_ID, DRIVER_PROJECTION, LAP_TIMES, MILLISECONDS, RACES,
    RACE_ID, RACE_PROJECTION,
};

const DAYS_PER_YEAR: f64 = 365.0;

/// Source of the run date used for age derivation
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Current UTC date
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Always returns the same date
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub today: NaiveDate,
    pub rows: usize,
    pub output: PathBuf,
}

fn load_table<P: AsRef<Path>>(
    path: P,
    table: &TableDef,
    options: &CsvReadOptions,
) -> EtlResult<DataFrame> {
    let df = DataFrame::from_csv(path, options.clone())?;
    table.validate(df.schema())?;
    Ok(df)
}

/// Add `age`, the whole years between `dob` and `today`, as Int32
pub fn with_age(drivers: &DataFrame, today: NaiveDate) -> EtlResult<DataFrame> {
    let years = date_diff(lit_date(today), col(DOB)).div(lit_float64(DAYS_PER_YEAR));
    drivers
        .with_column(AGE, years)?
        .with_cast(AGE, DataType::Int32)
}

/// Laps enriched with driver and race columns.
///
/// Lap times stay on the probe side of both joins so the output keeps their
/// partitioning; drivers and races are the hashed build sides.
pub fn join_sources(
    lap_times: &DataFrame,
    drivers: &DataFrame,
    races: &DataFrame,
    today: NaiveDate,
) -> EtlResult<DataFrame> {
    let drivers = with_age(drivers, today)?.select(DRIVER_PROJECTION)?;
    let races = races.select(RACE_PROJECTION)?;

    lap_times
        .join(&drivers, &[DRIVER_ID])?
        .join(&races, &[RACE_ID])
}

/// Build the plan from already-loaded frames. Nothing is read or written.
pub fn build(
    lap_times: &DataFrame,
    drivers: &DataFrame,
    races: &DataFrame,
    today: NaiveDate,
) -> EtlResult<DataFrame> {
    join_sources(lap_times, drivers, races, today)?
        .drop(&[RACE_ID, DRIVER_ID])?
        .group_by_mean(AGE, MILLISECONDS)
}

/// Run the job end to end and write the result to the configured output
#[instrument(skip_all, fields(output = %config.output.path.display()))]
pub fn run(config: &PipelineConfig, clock: &dyn Clock) -> EtlResult<RunSummary> {
    let today = clock.today();
    let options = config.read_options()?;

    let lap_times = load_table(&config.inputs.lap_times, &LAP_TIMES, &options)?;
    let drivers = load_table(&config.inputs.drivers, &DRIVERS, &options)?;
    let races = load_table(&config.inputs.races, &RACES, &options)?;
    info!(%today, "sources opened");

    let result = build(&lap_times, &drivers, &races, today)?;
    let rows = result.write_csv(&config.output.path, &config.write_options())?;
    info!(rows, "wrote lap times by age");

    Ok(RunSummary {
        today,
        rows,
        output: config.output.path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::execution::batch::total_rows;
    use arrow::array::{Array, Int32Array};
    use std::fs;
    use tempfile::TempDir;

    fn frame(dir: &TempDir, name: &str, contents: &str) -> DataFrame {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        DataFrame::from_csv(&path, CsvReadOptions::default()).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock(date("2024-03-01"));
        assert_eq!(clock.today(), date("2024-03-01"));
    }

    #[test]
    fn test_age_truncates() {
        let dir = TempDir::new().unwrap();
        let drivers = frame(
            &dir,
            "drivers.csv",
            "driverId,dob\n1,2000-01-01\n2,2000-01-10\n3,\n",
        );
        // 7305 days from 2000-01-01, 7296 from 2000-01-10
        let aged = with_age(&drivers, date("2020-01-01")).unwrap();
        assert_eq!(aged.schema().field_with_name(AGE).unwrap().data_type(), &DataType::Int32);

        let batches = aged.collect().unwrap();
        let ages = batches[0]
            .column_by_name(AGE)
            .unwrap()
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert_eq!(ages.value(0), 20);
        assert_eq!(ages.value(1), 19);
        assert!(ages.is_null(2));
    }

    #[test]
    fn test_build_output_schema() {
        let dir = TempDir::new().unwrap();
        let lap_times = frame(
            &dir,
            "lap_times.csv",
            "raceId,driverId,lap,position,time,milliseconds\n10,1,1,1,1:30.000,90000\n",
        );
        let drivers = frame(
            &dir,
            "drivers.csv",
            "driverId,driverRef,code,forename,surname,dob,nationality\n1,ham,HAM,Lewis,Hamilton,1985-01-07,British\n",
        );
        let races = frame(&dir, "races.csv", "raceId,year,name,date\n10,2020,GP,2020-07-05\n");

        let result = build(&lap_times, &drivers, &races, date("2020-07-05")).unwrap();
        assert_eq!(result.columns(), vec!["age", "avg_milliseconds"]);
        assert_eq!(total_rows(&result.collect().unwrap()), 1);
    }

    #[test]
    fn test_joined_laps_keep_partitioning() {
        let dir = TempDir::new().unwrap();
        let laps: String = (1..=10)
            .map(|lap| format!("10,{},{lap},1,1:30.000,9000{lap}\n", lap % 2 + 1))
            .collect();
        let path = dir.path().join("lap_times.csv");
        fs::write(&path, format!("raceId,driverId,lap,position,time,milliseconds\n{laps}")).unwrap();
        let options = CsvReadOptions {
            batch_size: 2,
            ..CsvReadOptions::default()
        };
        let lap_times = DataFrame::from_csv(&path, options).unwrap();
        let drivers = frame(
            &dir,
            "drivers.csv",
            "driverId,driverRef,code,forename,surname,dob,nationality\n\
             1,ham,HAM,Lewis,Hamilton,1985-01-07,British\n\
             2,ros,ROS,Nico,Rosberg,1985-06-27,German\n",
        );
        let races = frame(&dir, "races.csv", "raceId,year,name,date\n10,2020,GP,2020-07-05\n");

        assert_eq!(lap_times.collect().unwrap().len(), 5);
        let joined = join_sources(&lap_times, &drivers, &races, date("2020-07-05"))
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(joined.len(), 5);
        assert_eq!(total_rows(&joined), 10);
    }

    #[test]
    fn test_missing_dob_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("drivers.csv");
        fs::write(&path, "driverId,driverRef,code,forename,surname,nationality\n").unwrap();
        let err = load_table(&path, &DRIVERS, &CsvReadOptions::default()).unwrap_err();
        assert!(matches!(err, EtlError::MissingColumn { column, .. } if column == "dob"));
    }
}
