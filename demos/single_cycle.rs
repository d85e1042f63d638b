// Single polling cycle example
//
// Connects to an oscilloscope, reads every measurement once and saves a screenshot.

use rigol_meter::{
    CycleLimit, InstrumentLink, MeasurementSelection, PollConfig, PollScheduler, RecordTable,
    ScreenshotDir, SystemClock,
};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "rigol".to_string());

    println!("Rigol Single Cycle Example");
    println!("==========================\n");

    let config = PollConfig::new(2)?
        .measurements(MeasurementSelection::all())
        .cycles(CycleLimit::Cycles(1))
        .interval(Duration::ZERO)
        .screenshots(true);

    println!("1. Connecting to {}:5555...", host);
    let mut link = InstrumentLink::connect(&host, 5555, Some(Duration::from_secs(10)))?;

    println!("2. Reading measurements...");
    let mut table = RecordTable::new();
    let mut screenshots = ScreenshotDir::new(std::env::temp_dir());
    let mut scheduler = PollScheduler::new(&config, SystemClock);
    let summary = scheduler.run(&mut link, &mut table, Some(&mut screenshots))?;

    println!("{}", table.to_dataframe()?);
    println!(
        "\n3. Done: {} cycle(s), {} screenshot(s) in {}",
        summary.cycles,
        summary.screenshots,
        screenshots.dir().display()
    );

    Ok(())
}
