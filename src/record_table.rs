use crate::measurement::Header;
use crate::output::{CycleRecord, RecordSink};
use polars::prelude::*;
use std::fs::File;
use std::io;
use std::path::Path;

const TIMESTAMP_COLUMN_NAME: &str = Header::TIMESTAMP_LABEL;
const TIMING_COLUMN_NAME: &str = Header::TIMING_LABEL;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Collects every record of a run into columns, one per header label.
///
/// Responses with too few values get nulls in the missing columns; surplus values are dropped.
#[derive(Debug, Default)]
pub struct RecordTable {
    labels: Vec<String>,
    timestamps: Vec<String>,
    columns: Vec<Vec<Option<String>>>,
    query_times: Vec<i64>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: &CycleRecord) {
        self.timestamps.push(record.timestamp_string());
        for (i, column) in self.columns.iter_mut().enumerate() {
            column.push(record.values.get(i).cloned());
        }
        self.query_times
            .push(i64::try_from(record.elapsed_millis()).unwrap_or(i64::MAX));
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// `timestamp`, one string column per label, then `querytime` in milliseconds.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.labels.len() + 2);
        columns.push(Series::new(TIMESTAMP_COLUMN_NAME.into(), self.timestamps.as_slice()).into());
        for (label, values) in self.labels.iter().zip(&self.columns) {
            columns.push(Series::new(label.as_str().into(), values.as_slice()).into());
        }
        columns.push(Series::new(TIMING_COLUMN_NAME.into(), self.query_times.as_slice()).into());

        DataFrame::new(columns)
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)?;
        log::info!("Wrote {} records to {}", df.height(), path.display());
        Ok(())
    }
}

impl RecordSink for RecordTable {
    fn begin(&mut self, header: &Header) -> io::Result<()> {
        self.labels = header.labels().to_vec();
        self.columns = vec![Vec::new(); self.labels.len()];
        self.timestamps.clear();
        self.query_times.clear();
        Ok(())
    }

    fn record(&mut self, record: &CycleRecord) -> io::Result<()> {
        self.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{MeasurementSelection, QueryPlan};
    use chrono::{Local, TimeZone};
    use std::time::Duration;

    fn record(plan: &QueryPlan, response: &str, ms: u64) -> CycleRecord {
        CycleRecord::new(
            0,
            Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            response,
            &plan.header,
            Duration::from_millis(ms),
        )
    }

    #[test]
    fn test_dataframe_shape() {
        let plan = QueryPlan::build(2, &MeasurementSelection::none());
        let mut table = RecordTable::new();
        table.begin(&plan.header).unwrap();
        table.record(&record(&plan, "VOLT;AMP", 120)).unwrap();
        table.record(&record(&plan, "VOLT;AMP", 95)).unwrap();

        let df = table.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names()
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>(),
            vec!["timestamp", "CH1 Unit", "CH2 Unit", "querytime"]
        );
        let times: Vec<i64> = df
            .column("querytime")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(times, vec![120, 95]);
    }

    #[test]
    fn test_short_response_padded_with_nulls() {
        let plan = QueryPlan::build(2, &MeasurementSelection::none());
        let mut table = RecordTable::new();
        table.begin(&plan.header).unwrap();
        table.record(&record(&plan, "VOLT", 10)).unwrap();

        let df = table.to_dataframe().unwrap();
        assert_eq!(df.column("CH2 Unit").unwrap().null_count(), 1);
        assert_eq!(df.column("CH1 Unit").unwrap().null_count(), 0);
    }
}
