use crate::instrument_link::{InstrumentLink, LinkError, CLEAR_STATS_COMMAND};
use crate::measurement::{Header, QueryPlan};
use crate::output::{CycleRecord, RecordSink};
use crate::poll_config::{CycleLimit, PollConfig};
use crate::screenshot::ScreenshotSink;
use chrono::{DateTime, Local};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Instrument link error: {0}")]
    Link(#[from] LinkError),

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Time source for the scheduler.
pub trait Clock {
    fn now(&mut self) -> Instant;

    fn wall_time(&mut self) -> DateTime<Local>;

    fn sleep(&mut self, duration: Duration);
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> Instant {
        Instant::now()
    }

    fn wall_time(&mut self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Running,
    Done,
}

/// What happened over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub screenshots: u64,
    pub misaligned: u64,
}

/// Time left in the interval after a cycle that took `elapsed`. Overruns get no sleep and no
/// catch-up.
pub fn remaining_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// How far a cycle ran past its interval. A zero interval means back-to-back polling, which
/// never counts as an overrun.
pub fn overrun(interval: Duration, elapsed: Duration) -> Option<Duration> {
    if interval.is_zero() || elapsed <= interval {
        None
    } else {
        Some(elapsed - interval)
    }
}

/// Drives the query cycles of one run.
pub struct PollScheduler<'a, C: Clock> {
    config: &'a PollConfig,
    plan: QueryPlan,
    clock: C,
    remaining: CycleLimit,
    completed: u64,
    summary: RunSummary,
}

impl<'a, C: Clock> PollScheduler<'a, C> {
    pub fn new(config: &'a PollConfig, clock: C) -> Self {
        let plan = QueryPlan::build(config.channel_count(), config.measurement_selection());
        Self {
            config,
            plan,
            clock,
            remaining: config.cycle_limit(),
            completed: 0,
            summary: RunSummary::default(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.plan.header
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> PollState {
        match self.remaining {
            CycleLimit::Cycles(0) => PollState::Done,
            _ => PollState::Running,
        }
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Emit the header, then cycle until the limit is reached. Link and output errors end the
    /// run; screenshot problems only skip that cycle's image.
    pub fn run<S: Read + Write>(
        &mut self,
        link: &mut InstrumentLink<S>,
        records: &mut dyn RecordSink,
        mut screenshots: Option<&mut dyn ScreenshotSink>,
    ) -> Result<RunSummary, PollError> {
        log::info!(
            "Polling {} channel(s) every {:?} ({:?})",
            self.config.channel_count(),
            self.config.poll_interval(),
            self.config.cycle_limit()
        );
        records.begin(&self.plan.header)?;

        while self.state() == PollState::Running {
            let screenshots = match &mut screenshots {
                Some(sink) => Some(&mut **sink as &mut dyn ScreenshotSink),
                None => None,
            };
            self.step(link, records, screenshots)?;
        }

        log::info!("Polling finished after {} cycle(s)", self.summary.cycles);
        Ok(self.summary)
    }

    /// Run one cycle, including the sleep that follows it. Does nothing once done.
    pub fn step<S: Read + Write>(
        &mut self,
        link: &mut InstrumentLink<S>,
        records: &mut dyn RecordSink,
        screenshots: Option<&mut dyn ScreenshotSink>,
    ) -> Result<PollState, PollError> {
        if self.state() == PollState::Done {
            return Ok(PollState::Done);
        }

        let _span = tracing::debug_span!("poll_cycle", cycle = self.completed).entered();
        #[cfg(feature = "cpu-profiling")]
        if let Some(client) = tracy_client::Client::running() {
            client.frame_mark();
        }

        let start = self.clock.now();

        // Read before clear: the values reported are the statistics accumulated so far.
        let response = link.exchange(self.plan.query.as_str())?;

        if self.config.screenshots_enabled() {
            self.fetch_screenshot(link, screenshots)?;
        }

        if self.config.clear_stats_enabled() {
            link.send_command(CLEAR_STATS_COMMAND)?;
        }

        let elapsed = self.clock.now().saturating_duration_since(start);
        let record = CycleRecord::new(
            self.completed,
            self.clock.wall_time(),
            &response,
            &self.plan.header,
            elapsed,
        );
        if !record.aligned {
            log::warn!(
                "Cycle {}: instrument returned {} values for {} columns",
                self.completed,
                record.values.len(),
                self.plan.header.len()
            );
            self.summary.misaligned += 1;
        }
        records.record(&record)?;

        if let Some(overrun) = overrun(self.config.poll_interval(), elapsed) {
            log::debug!(
                "Cycle {} overran the interval by {:?}",
                self.completed,
                overrun
            );
        }
        let pause = remaining_sleep(self.config.poll_interval(), elapsed);
        if !pause.is_zero() {
            self.clock.sleep(pause);
        }

        self.completed += 1;
        self.summary.cycles += 1;
        if let CycleLimit::Cycles(n) = &mut self.remaining {
            *n -= 1;
        }
        Ok(self.state())
    }

    fn fetch_screenshot<S: Read + Write>(
        &mut self,
        link: &mut InstrumentLink<S>,
        screenshots: Option<&mut dyn ScreenshotSink>,
    ) -> Result<(), PollError> {
        let image = match link.fetch_block() {
            Ok(image) => image,
            Err(e) if !e.is_fatal() => {
                log::warn!("Cycle {}: no screenshot ({})", self.completed, e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(sink) = screenshots else {
            log::debug!("Discarding {} byte screenshot, no sink configured", image.len());
            return Ok(());
        };
        match sink.store(&image, self.clock.wall_time()) {
            Ok(_) => self.summary.screenshots += 1,
            Err(e) => log::error!("Failed to write screenshot: {}", e),
        }
        Ok(())
    }
}
