// Command-line measurement logger
//
// Connects to the instrument, prints a CSV-style header and one line per polling cycle.

use clap::{ArgAction, Parser};
use rigol_meter::{
    timeout_from_secs, ConfigError, CycleLimit, InstrumentLink, Measurement,
    MeasurementSelection, PollConfig, PollError, PollScheduler, RecordSink, RecordTable,
    RunSummary, ScreenshotDir, ScreenshotSink, SystemClock, TableError, TextSink,
};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rigol-meter")]
#[command(about = "Periodically log oscilloscope measurements over SCPI")]
struct Args {
    /// Hostname or IP address
    #[arg(long, default_value = "rigol")]
    host: String,

    /// TCP port to use
    #[arg(long, default_value_t = 5555)]
    port: u16,

    /// Number of channels to collect
    #[arg(long, default_value_t = 4)]
    channels: u8,

    /// Seconds between readings
    #[arg(long, default_value_t = 1.0)]
    interval: f64,

    /// Number of measurements to take, -1 = no limit
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    count: i64,

    /// Include Vavg
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    vavg: bool,

    /// Include Vmin
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    vmin: bool,

    /// Include Vmax
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    vmax: bool,

    /// Include Vpp
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    vpp: bool,

    /// Include Vrms
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    vrms: bool,

    /// Include frequency
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    freq: bool,

    /// Collect screenshots in PNG format
    #[arg(long)]
    screen: bool,

    /// Directory screenshots are written to
    #[arg(long, default_value = ".")]
    screenshot_dir: PathBuf,

    /// Reset measurement statistics after every reading
    #[arg(long)]
    clear_stats: bool,

    /// Also write all records to this CSV file when the run ends (needs a bounded --count)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Socket read/write timeout in seconds (default: wait forever)
    #[arg(long)]
    timeout: Option<f64>,
}

impl Args {
    fn measurements(&self) -> MeasurementSelection {
        MeasurementSelection::none()
            .set(Measurement::Vavg, self.vavg)
            .set(Measurement::Vmin, self.vmin)
            .set(Measurement::Vmax, self.vmax)
            .set(Measurement::Vpp, self.vpp)
            .set(Measurement::Vrms, self.vrms)
            .set(Measurement::Freq, self.freq)
    }

    fn poll_config(&self) -> Result<PollConfig, ConfigError> {
        Ok(PollConfig::new(self.channels)?
            .interval_secs(self.interval)?
            .cycles(self.count)
            .measurements(self.measurements())
            .screenshots(self.screen)
            .clear_stats(self.clear_stats))
    }

    fn socket_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        self.timeout.map(timeout_from_secs).transpose()
    }

    /// Checks that span several flags.
    fn validate(&self) -> Result<(), RunError> {
        if self.csv.is_some() && CycleLimit::from(self.count).is_unlimited() {
            return Err(RunError::UnboundedCsv);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("--csv needs a bounded --count, an unlimited run would never be written")]
    UnboundedCsv,

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("Failed to write CSV: {0}")]
    Table(#[from] TableError),
}

/// Run the scheduler and, when a CSV path is given, write every record collected so far, also
/// when polling stopped on an error.
fn poll_and_export<S: Read + Write>(
    config: &PollConfig,
    link: &mut InstrumentLink<S>,
    out: &mut dyn RecordSink,
    csv: Option<&Path>,
    screenshots: Option<&mut dyn ScreenshotSink>,
) -> Result<RunSummary, RunError> {
    let mut scheduler = PollScheduler::new(config, SystemClock);
    let Some(path) = csv else {
        return Ok(scheduler.run(link, out, screenshots)?);
    };

    let mut table = RecordTable::new();
    let result = scheduler.run(link, &mut (out, &mut table), screenshots);
    let exported = table.write_csv(path);
    if let (Err(_), Err(e)) = (&result, &exported) {
        log::error!("Failed to write {}: {}", path.display(), e);
    }

    let summary = result?;
    exported?;
    Ok(summary)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    #[cfg(feature = "cpu-profiling")]
    let _tracy = tracy_client::Client::start();

    let args = Args::parse();

    let setup = args.validate().and_then(|()| {
        let config = args.poll_config()?;
        let timeout = args.socket_timeout()?;
        Ok((config, timeout))
    });
    let (config, timeout) = match setup {
        Ok(setup) => setup,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let mut link = match InstrumentLink::connect(&args.host, args.port, timeout) {
        Ok(link) => link,
        Err(e) => {
            log::debug!("Connect failed: {}", e);
            eprintln!("Unable to connect to {}:{}", args.host, args.port);
            return ExitCode::from(2);
        }
    };

    let mut out = TextSink::new(std::io::stdout().lock());
    let mut screenshots = ScreenshotDir::new(&args.screenshot_dir);
    let screenshot_sink: Option<&mut dyn ScreenshotSink> = if args.screen {
        Some(&mut screenshots)
    } else {
        None
    };

    match poll_and_export(
        &config,
        &mut link,
        &mut out,
        args.csv.as_deref(),
        screenshot_sink,
    ) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Polling stopped: {}", e);
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
