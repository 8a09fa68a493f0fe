// DataFrame API implementation

use std::path::Path;

use arrow::datatypes::{DataType, SchemaRef};
use chrono::NaiveDate;

use crate::error::EtlResult;
use crate::execution::batch::RecordBatch;
use crate::execution::Executor;
use crate::planner::logical_plan::{
    AggregateFunction, Aggregation, ArithmeticOp, LogicalExpr, LogicalPlan, LogicalValue,
};
use crate::storage::csv_reader::{CsvReadOptions, CsvReader};
use crate::storage::csv_writer::{write_csv, CsvWriteOptions};

/// DataFrame represents a lazy, immutable record set.
///
/// Each transform returns a new DataFrame wrapping a larger plan. The output
/// schema is computed as the plan is built, so a bad column reference fails
/// here rather than halfway through execution.
#[derive(Debug, Clone)]
pub struct DataFrame {
    plan: LogicalPlan,
    schema: SchemaRef,
    /// Name used to prefix this frame's columns when they collide in a join
    alias: String,
}

/// Intermediate type for group_by + agg. Call .agg(aggregations) to complete.
#[derive(Debug, Clone)]
pub struct GroupedDataFrame {
    input: DataFrame,
    group_by: Vec<String>,
}

impl GroupedDataFrame {
    /// Apply aggregations and return a DataFrame
    pub fn agg(self, aggs: Vec<Aggregation>) -> EtlResult<DataFrame> {
        let alias = self.input.alias.clone();
        DataFrame::from_plan(
            LogicalPlan::Aggregate {
                input: Box::new(self.input.plan),
                group_by: self.group_by,
                aggs,
            },
            alias,
        )
    }
}

impl DataFrame {
    fn from_plan(plan: LogicalPlan, alias: String) -> EtlResult<Self> {
        let schema = plan.schema()?;
        Ok(Self {
            plan,
            schema,
            alias,
        })
    }

    fn derive(&self, plan: LogicalPlan) -> EtlResult<Self> {
        Self::from_plan(plan, self.alias.clone())
    }

    /// Create a DataFrame over a delimited text file.
    /// Only the header is read now; rows are read when the plan is collected.
    /// The alias defaults to the file stem.
    pub fn from_csv<P: AsRef<Path>>(path: P, options: CsvReadOptions) -> EtlResult<Self> {
        let path = path.as_ref().to_path_buf();
        let schema = CsvReader::from_path(&path, options.clone()).schema()?;
        let alias = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "right".to_string());
        Self::from_plan(
            LogicalPlan::Scan {
                path,
                options,
                schema,
            },
            alias,
        )
    }

    /// Rename the frame (used to disambiguate join column collisions)
    pub fn alias(&self, alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            ..self.clone()
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Column names in order
    pub fn columns(&self) -> Vec<String> {
        self.schema.fields().iter().map(|f| f.name().clone()).collect()
    }

    /// Select specific columns (projection), in the given order
    pub fn select(&self, columns: &[&str]) -> EtlResult<Self> {
        self.derive(LogicalPlan::Project {
            input: Box::new(self.plan.clone()),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Add a column computed from `expr`, or replace the same-named column in place
    pub fn with_column(&self, name: &str, expr: LogicalExpr) -> EtlResult<Self> {
        self.derive(LogicalPlan::WithColumn {
            input: Box::new(self.plan.clone()),
            name: name.to_string(),
            expr,
        })
    }

    /// Cast a column to `data_type` in place.
    /// Float to integer truncates toward zero; unconvertible values become null.
    pub fn with_cast(&self, name: &str, data_type: DataType) -> EtlResult<Self> {
        self.with_column(name, col(name).cast(data_type))
    }

    /// Inner equi-join with `right` on key columns present in both frames
    pub fn join(&self, right: &DataFrame, on: &[&str]) -> EtlResult<Self> {
        self.derive(LogicalPlan::Join {
            left: Box::new(self.plan.clone()),
            right: Box::new(right.plan.clone()),
            on: on.iter().map(|c| c.to_string()).collect(),
            right_alias: right.alias.clone(),
        })
    }

    /// Remove columns. Names that are not present are ignored.
    pub fn drop(&self, columns: &[&str]) -> EtlResult<Self> {
        self.derive(LogicalPlan::Drop {
            input: Box::new(self.plan.clone()),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Group by the given columns. Call .agg(aggregations) to complete.
    pub fn group_by(&self, columns: &[&str]) -> GroupedDataFrame {
        GroupedDataFrame {
            input: self.clone(),
            group_by: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Mean of `value_col` per distinct `group_col`, as columns
    /// `{group_col, avg_<value_col>}`
    pub fn group_by_mean(&self, group_col: &str, value_col: &str) -> EtlResult<Self> {
        let alias = format!("avg_{}", value_col);
        self.group_by(&[group_col]).agg(vec![avg(value_col, &alias)])
    }

    /// Execute the plan and return the resulting partitions
    pub fn collect(&self) -> EtlResult<Vec<RecordBatch>> {
        Executor::new().execute(&self.plan)
    }

    /// Execute the plan and write the result with a header row.
    /// Returns the number of data rows written.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P, options: &CsvWriteOptions) -> EtlResult<usize> {
        let batches = self.collect()?;
        write_csv(path, self.schema.clone(), &batches, options)
    }
}

// Aggregation helper constructors for use with group_by().agg([...])
/// COUNT(*) - count all rows in each group
pub fn count(alias: &str) -> Aggregation {
    Aggregation {
        function: AggregateFunction::Count,
        column: None,
        alias: alias.to_string(),
    }
}

/// COUNT(column) - count non-null values in the column
pub fn count_column(column: &str, alias: &str) -> Aggregation {
    Aggregation {
        function: AggregateFunction::Count,
        column: Some(column.to_string()),
        alias: alias.to_string(),
    }
}

/// SUM(column) over numeric values
pub fn sum(column: &str, alias: &str) -> Aggregation {
    Aggregation {
        function: AggregateFunction::Sum,
        column: Some(column.to_string()),
        alias: alias.to_string(),
    }
}

/// AVG(column) over numeric values; nulls and non-numeric text are skipped
pub fn avg(column: &str, alias: &str) -> Aggregation {
    Aggregation {
        function: AggregateFunction::Avg,
        column: Some(column.to_string()),
        alias: alias.to_string(),
    }
}

// Helper functions for building expressions for with_column

/// Column reference expression
pub fn col(name: &str) -> LogicalExpr {
    LogicalExpr::Column(name.to_string())
}

/// Whole days from `start` to `end`
pub fn date_diff(end: LogicalExpr, start: LogicalExpr) -> LogicalExpr {
    LogicalExpr::DateDiff {
        end: Box::new(end),
        start: Box::new(start),
    }
}

/// Extension trait for building expressions
pub trait ExprBuilder {
    fn add(&self, other: LogicalExpr) -> LogicalExpr;
    fn sub(&self, other: LogicalExpr) -> LogicalExpr;
    fn mul(&self, other: LogicalExpr) -> LogicalExpr;
    fn div(&self, other: LogicalExpr) -> LogicalExpr;
    fn cast(&self, data_type: DataType) -> LogicalExpr;
}

impl LogicalExpr {
    fn arithmetic(&self, op: ArithmeticOp, other: LogicalExpr) -> LogicalExpr {
        LogicalExpr::Arithmetic {
            left: Box::new(self.clone()),
            op,
            right: Box::new(other),
        }
    }
}

impl ExprBuilder for LogicalExpr {
    fn add(&self, other: LogicalExpr) -> LogicalExpr {
        self.arithmetic(ArithmeticOp::Add, other)
    }

    fn sub(&self, other: LogicalExpr) -> LogicalExpr {
        self.arithmetic(ArithmeticOp::Sub, other)
    }

    fn mul(&self, other: LogicalExpr) -> LogicalExpr {
        self.arithmetic(ArithmeticOp::Mul, other)
    }

    fn div(&self, other: LogicalExpr) -> LogicalExpr {
        self.arithmetic(ArithmeticOp::Div, other)
    }

    fn cast(&self, data_type: DataType) -> LogicalExpr {
        LogicalExpr::Cast {
            expr: Box::new(self.clone()),
            data_type,
        }
    }
}

// Helper functions for literals
pub fn lit_int32(v: i32) -> LogicalExpr {
    LogicalExpr::Literal(LogicalValue::Int32(v))
}

pub fn lit_int64(v: i64) -> LogicalExpr {
    LogicalExpr::Literal(LogicalValue::Int64(v))
}

pub fn lit_float64(v: f64) -> LogicalExpr {
    LogicalExpr::Literal(LogicalValue::Float64(v))
}

pub fn lit_string(v: &str) -> LogicalExpr {
    LogicalExpr::Literal(LogicalValue::String(v.to_string()))
}

pub fn lit_date(v: NaiveDate) -> LogicalExpr {
    LogicalExpr::Literal(LogicalValue::Date(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::execution::batch::total_rows;
    use arrow::array::Array;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn lap_times(dir: &TempDir) -> DataFrame {
        let path = write(
            dir,
            "lap_times.csv",
            "raceId,driverId,lap,position,time,milliseconds\n\
             841,1,1,1,1:38.109,98109\n\
             841,1,2,1,1:33.006,93006\n\
             841,2,1,2,1:40.573,100573\n",
        );
        DataFrame::from_csv(path, CsvReadOptions::default()).unwrap()
    }

    #[test]
    fn test_schema_is_known_before_collect() {
        let dir = TempDir::new().unwrap();
        let df = lap_times(&dir);
        assert_eq!(df.columns().len(), 6);
        let projected = df.select(&["milliseconds", "lap"]).unwrap();
        assert_eq!(projected.columns(), vec!["milliseconds", "lap"]);
    }

    #[test]
    fn test_bad_reference_fails_at_construction() {
        let dir = TempDir::new().unwrap();
        let df = lap_times(&dir);
        assert!(matches!(
            df.select(&["dob"]),
            Err(EtlError::MissingColumn { .. })
        ));
        assert!(matches!(
            df.with_column("x", col("dob")),
            Err(EtlError::MissingColumn { .. })
        ));
        assert!(matches!(
            df.group_by_mean("age", "milliseconds"),
            Err(EtlError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_transforms_do_not_mutate_input() {
        let dir = TempDir::new().unwrap();
        let df = lap_times(&dir);
        let dropped = df.drop(&["time", "position"]).unwrap();
        assert_eq!(dropped.columns().len(), 4);
        assert_eq!(df.columns().len(), 6);
        assert_eq!(total_rows(&df.collect().unwrap()), 3);
    }

    #[test]
    fn test_self_join_fan_out_counts() {
        let dir = TempDir::new().unwrap();
        let df = lap_times(&dir);
        let keys = df.select(&["driverId"]).unwrap();
        let joined = keys.join(&keys.alias("again"), &["driverId"]).unwrap();
        let counts = joined
            .group_by(&["driverId"])
            .agg(vec![count("n")])
            .unwrap()
            .collect()
            .unwrap();

        let batch = &counts[0];
        let ids = batch.column(0).unwrap();
        let ids = ids
            .as_any()
            .downcast_ref::<arrow::array::StringArray>()
            .unwrap();
        let n = batch.column(1).unwrap();
        let n = n.as_any().downcast_ref::<arrow::array::Int64Array>().unwrap();
        let mut pairs: Vec<_> = ids.iter().zip(n.iter()).collect();
        pairs.sort();
        // Driver 1 has two rows -> 2 x 2 pairs; driver 2 has one
        assert_eq!(pairs, vec![(Some("1"), Some(4)), (Some("2"), Some(1))]);
    }

    #[test]
    fn test_literal_columns() {
        let dir = TempDir::new().unwrap();
        let df = lap_times(&dir)
            .with_column("seconds", col("milliseconds").div(lit_int32(1000)))
            .unwrap()
            .with_column("series", lit_string("F1"))
            .unwrap()
            .with_column("season", lit_int64(2009))
            .unwrap();
        assert_eq!(df.columns()[6..], ["seconds", "series", "season"]);

        let batches = df.collect().unwrap();
        let batch = &batches[0];
        let seconds = batch.column(6).unwrap();
        let seconds = seconds
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .unwrap();
        assert_eq!(seconds.value(0), 98.109);
        let series = batch.column(7).unwrap();
        let series = series
            .as_any()
            .downcast_ref::<arrow::array::StringArray>()
            .unwrap();
        assert_eq!(series.value(2), "F1");
        let season = batch.column(8).unwrap();
        let season = season
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .unwrap();
        assert!(season.iter().all(|v| v == Some(2009)));
    }

    #[test]
    fn test_with_cast_to_integer() {
        let dir = TempDir::new().unwrap();
        let df = lap_times(&dir)
            .with_cast("milliseconds", DataType::Int64)
            .unwrap();
        assert_eq!(df.schema().field(5).data_type(), &DataType::Int64);
        let total = df
            .group_by(&[])
            .agg(vec![sum("milliseconds", "total")])
            .unwrap()
            .collect()
            .unwrap();
        let total = total[0].column(0).unwrap();
        let total = total
            .as_any()
            .downcast_ref::<arrow::array::Float64Array>()
            .unwrap();
        assert_eq!(total.value(0), 291688.0);
    }
}
