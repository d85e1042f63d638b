//! # Rigol Meter
//!
//! A Rust library for periodically logging measurements from Rigol oscilloscopes over
//! the SCPI socket interface (TCP port 5555).
//!
//! Each cycle sends one batched query covering every channel and enabled measurement,
//! optionally grabs a PNG screenshot and resets the instrument's measurement statistics,
//! then sleeps for whatever is left of the polling interval.
//!
//! ## Features
//!
//! - **Batched queries**: all measurements of all channels in a single round trip
//! - **Aligned output**: the column header is built in the same pass as the query
//! - **Binary block decoding**: IEEE 488.2 `#<n><len><payload>` framing for screenshots
//! - **Drift compensation**: cycle time is subtracted from the interval, overruns don't queue up
//! - **Tabular output**: records collected into a `polars` DataFrame and written as CSV
//!
//! ## Examples
//!
//! ### Building the query
//!
//! ```rust
//! use rigol_meter::{Measurement, MeasurementSelection, QueryPlan};
//!
//! let selection = MeasurementSelection::none().with(Measurement::Vavg);
//! let plan = QueryPlan::build(2, &selection);
//!
//! assert_eq!(
//!     plan.query.as_str(),
//!     ":CHAN1:UNIT?;:MEAS:ITEM? VAVG,CHAN1;:CHAN2:UNIT?;:MEAS:ITEM? VAVG,CHAN2"
//! );
//! assert_eq!(plan.header.joined(), "CH1 Unit, CH1 Vavg, CH2 Unit, CH2 Vavg");
//! ```
//!
//! ### Polling an instrument
//!
//! ```rust,no_run
//! use rigol_meter::{CycleLimit, InstrumentLink, PollConfig, PollScheduler, SystemClock, TextSink};
//! use std::time::Duration;
//!
//! let config = PollConfig::new(2)?
//!     .interval(Duration::from_secs(5))
//!     .cycles(CycleLimit::Cycles(10));
//! let mut link = InstrumentLink::connect("rigol", 5555, None)?;
//! let mut out = TextSink::new(std::io::stdout());
//!
//! let mut scheduler = PollScheduler::new(&config, SystemClock);
//! scheduler.run(&mut link, &mut out, None)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Decoding a block
//!
//! ```rust
//! use rigol_meter::decode_block;
//!
//! let mut input: &[u8] = b"#15hello";
//! let block = decode_block(&mut input).unwrap();
//! assert_eq!(block.as_bytes(), b"hello");
//! ```

pub mod block_decoder;
pub mod instrument_link;
pub mod measurement;
pub mod output;
pub mod poll_config;
pub mod poll_scheduler;
pub mod record_table;
pub mod screenshot;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the main types for convenience
pub use block_decoder::{decode_block, BinaryBlock, BlockError};

pub use instrument_link::{InstrumentLink, LinkError, CLEAR_STATS_COMMAND, SCREENSHOT_COMMAND};

pub use measurement::{Header, Measurement, MeasurementSelection, Query, QueryPlan};

pub use output::{CycleRecord, RecordSink, TextSink};

pub use poll_config::{timeout_from_secs, ConfigError, CycleLimit, PollConfig};

pub use poll_scheduler::{
    overrun, remaining_sleep, Clock, PollError, PollScheduler, PollState, RunSummary,
    SystemClock,
};

pub use record_table::{RecordTable, TableError};

pub use screenshot::{ScreenshotDir, ScreenshotSink};
