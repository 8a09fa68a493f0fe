//! Typed definitions of the source tables and the columns the pipeline uses.
//!
//! Source files may carry more columns than listed here; only the listed ones
//! are required.

use arrow::datatypes::Schema;

use crate::error::{EtlError, EtlResult};

pub const RACE_ID: &str = "raceId";
pub const DRIVER_ID: &str = "driverId";
pub const LAP: &str = "lap";
pub const POSITION: &str = "position";
pub const TIME: &str = "time";
pub const MILLISECONDS: &str = "milliseconds";

pub const DRIVER_REF: &str = "driverRef";
pub const CODE: &str = "code";
pub const FORENAME: &str = "forename";
pub const SURNAME: &str = "surname";
pub const DOB: &str = "dob";
pub const NATIONALITY: &str = "nationality";

pub const YEAR: &str = "year";
pub const NAME: &str = "name";
pub const DATE: &str = "date";

/// Derived from `dob`
pub const AGE: &str = "age";

/// A source table and the columns it must provide
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

impl TableDef {
    /// Check that every required column is present in `schema`
    pub fn validate(&self, schema: &Schema) -> EtlResult<()> {
        for column in self.columns {
            if schema.fields().iter().all(|f| f.name().as_str() != *column) {
                return Err(EtlError::missing_column(*column, schema));
            }
        }
        Ok(())
    }
}

pub const LAP_TIMES: TableDef = TableDef {
    name: "lap_times",
    columns: &[RACE_ID, DRIVER_ID, LAP, POSITION, TIME, MILLISECONDS],
};

pub const DRIVERS: TableDef = TableDef {
    name: "drivers",
    columns: &[
        DRIVER_ID,
        DRIVER_REF,
        CODE,
        FORENAME,
        SURNAME,
        DOB,
        NATIONALITY,
    ],
};

pub const RACES: TableDef = TableDef {
    name: "races",
    columns: &[RACE_ID, YEAR, NAME, DATE],
};

/// Driver columns carried into the lap-time join
pub const DRIVER_PROJECTION: &[&str] = &[
    DRIVER_ID,
    DRIVER_REF,
    CODE,
    FORENAME,
    SURNAME,
    NATIONALITY,
    AGE,
];

/// Race columns carried into the second join
pub const RACE_PROJECTION: &[&str] = &[YEAR, NAME, RACE_ID];
