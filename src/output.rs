use crate::measurement::{Header, Query};
use chrono::{DateTime, Local, SecondsFormat};
use std::io::{self, Write};
use std::time::Duration;

/// One polling cycle's result.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    pub cycle: u64,
    pub timestamp: DateTime<Local>,
    /// Response values in query order.
    pub values: Vec<String>,
    pub elapsed: Duration,
    /// False when the instrument returned a different number of values than were queried.
    pub aligned: bool,
}

impl CycleRecord {
    pub fn new(
        cycle: u64,
        timestamp: DateTime<Local>,
        response: &str,
        header: &Header,
        elapsed: Duration,
    ) -> Self {
        let values: Vec<String> = response
            .split(Query::SEPARATOR)
            .map(str::to_string)
            .collect();
        let aligned = values.len() == header.len();
        Self {
            cycle,
            timestamp,
            values,
            elapsed,
            aligned,
        }
    }

    /// RFC 3339 timestamp with second precision.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    /// Values joined for display, in the same order as the header labels.
    pub fn display_values(&self) -> String {
        self.values.join(Header::SEPARATOR)
    }

    pub fn elapsed_millis(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Destination for the header and the per-cycle records of a run.
pub trait RecordSink {
    fn begin(&mut self, header: &Header) -> io::Result<()>;

    fn record(&mut self, record: &CycleRecord) -> io::Result<()>;
}

impl<T: RecordSink + ?Sized> RecordSink for &mut T {
    fn begin(&mut self, header: &Header) -> io::Result<()> {
        (**self).begin(header)
    }

    fn record(&mut self, record: &CycleRecord) -> io::Result<()> {
        (**self).record(record)
    }
}

impl<A: RecordSink, B: RecordSink> RecordSink for (A, B) {
    fn begin(&mut self, header: &Header) -> io::Result<()> {
        self.0.begin(header)?;
        self.1.begin(header)
    }

    fn record(&mut self, record: &CycleRecord) -> io::Result<()> {
        self.0.record(record)?;
        self.1.record(record)
    }
}

/// Writes `, `-separated lines, flushing after each one so records show up as they happen.
#[derive(Debug)]
pub struct TextSink<W: Write> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for TextSink<W> {
    fn begin(&mut self, header: &Header) -> io::Result<()> {
        writeln!(
            self.out,
            "{}, {}, {}",
            Header::TIMESTAMP_LABEL,
            header.joined(),
            Header::TIMING_LABEL
        )?;
        self.out.flush()
    }

    fn record(&mut self, record: &CycleRecord) -> io::Result<()> {
        writeln!(
            self.out,
            "{}, {}, {}",
            record.timestamp_string(),
            record.display_values(),
            record.elapsed_millis()
        )?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{MeasurementSelection, QueryPlan};
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_record_splits_response() {
        let plan = QueryPlan::build(1, &MeasurementSelection::none());
        let record = CycleRecord::new(0, timestamp(), "VOLT", &plan.header, Duration::ZERO);
        assert_eq!(record.values, vec!["VOLT"]);
        assert!(record.aligned);
    }

    #[test]
    fn test_record_flags_cardinality_mismatch() {
        let plan = QueryPlan::build(2, &MeasurementSelection::default());
        let record = CycleRecord::new(
            0,
            timestamp(),
            "VOLT;1.0;0.5;1.5",
            &plan.header,
            Duration::from_millis(12),
        );
        assert!(!record.aligned);
        assert_eq!(record.values.len(), 4);
    }

    #[test]
    fn test_text_sink_lines() {
        let plan = QueryPlan::build(1, &MeasurementSelection::none().with(crate::Measurement::Vpp));
        let mut sink = TextSink::new(Vec::new());
        sink.begin(&plan.header).unwrap();
        let record = CycleRecord::new(
            0,
            timestamp(),
            "VOLT;3.2e+00",
            &plan.header,
            Duration::from_micros(345_900),
        );
        sink.record(&record).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp, CH1 Unit, CH1 Vpp, querytime");
        assert!(lines[1].starts_with("2024-03-01T12:30:05"));
        assert!(lines[1].ends_with(", VOLT, 3.2e+00, 345"));
    }
}
