use crate::measurement::MeasurementSelection;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("At least one channel must be polled")]
    NoChannels,

    #[error("Interval must be a finite, non-negative number of seconds (got {0})")]
    InvalidInterval(f64),

    #[error("Timeout must be a finite, positive number of seconds (got {0})")]
    InvalidTimeout(f64),
}

/// Socket timeout from seconds. Zero is rejected because sockets treat it as invalid.
pub fn timeout_from_secs(seconds: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        _ => Err(ConfigError::InvalidTimeout(seconds)),
    }
}

/// How many cycles a run lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleLimit {
    Unlimited,
    Cycles(u64),
}

impl CycleLimit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

/// Negative counts mean "run until killed".
impl From<i64> for CycleLimit {
    fn from(count: i64) -> Self {
        u64::try_from(count).map_or(Self::Unlimited, Self::Cycles)
    }
}

/// Everything a polling run needs to know, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    channels: u8,
    interval: Duration,
    cycles: CycleLimit,
    measurements: MeasurementSelection,
    screenshots: bool,
    clear_stats: bool,
}

impl PollConfig {
    /// One-second interval, unlimited cycles, default measurements, no screenshots and no
    /// statistics reset.
    pub fn new(channels: u8) -> Result<Self, ConfigError> {
        if channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        Ok(Self {
            channels,
            interval: Duration::from_secs(1),
            cycles: CycleLimit::Unlimited,
            measurements: MeasurementSelection::default(),
            screenshots: false,
            clear_stats: false,
        })
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval_secs(self, seconds: f64) -> Result<Self, ConfigError> {
        let interval = Duration::try_from_secs_f64(seconds)
            .map_err(|_| ConfigError::InvalidInterval(seconds))?;
        Ok(self.interval(interval))
    }

    #[must_use]
    pub fn cycles(mut self, cycles: impl Into<CycleLimit>) -> Self {
        self.cycles = cycles.into();
        self
    }

    #[must_use]
    pub fn measurements(mut self, measurements: MeasurementSelection) -> Self {
        self.measurements = measurements;
        self
    }

    #[must_use]
    pub fn screenshots(mut self, enabled: bool) -> Self {
        self.screenshots = enabled;
        self
    }

    #[must_use]
    pub fn clear_stats(mut self, enabled: bool) -> Self {
        self.clear_stats = enabled;
        self
    }

    pub fn channel_count(&self) -> u8 {
        self.channels
    }

    pub fn poll_interval(&self) -> Duration {
        self.interval
    }

    pub fn cycle_limit(&self) -> CycleLimit {
        self.cycles
    }

    pub fn measurement_selection(&self) -> &MeasurementSelection {
        &self.measurements
    }

    pub fn screenshots_enabled(&self) -> bool {
        self.screenshots
    }

    pub fn clear_stats_enabled(&self) -> bool {
        self.clear_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_limit_from_count() {
        assert_eq!(CycleLimit::from(-1), CycleLimit::Unlimited);
        assert_eq!(CycleLimit::from(-7), CycleLimit::Unlimited);
        assert_eq!(CycleLimit::from(0), CycleLimit::Cycles(0));
        assert_eq!(CycleLimit::from(3), CycleLimit::Cycles(3));
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert_eq!(PollConfig::new(0), Err(ConfigError::NoChannels));
    }

    #[test]
    fn test_interval_validation() {
        let config = PollConfig::new(1).unwrap();
        assert_eq!(
            config.clone().interval_secs(0.25).unwrap().poll_interval(),
            Duration::from_millis(250)
        );
        assert!(config.clone().interval_secs(-1.0).is_err());
        assert!(config.clone().interval_secs(f64::NAN).is_err());
        assert_eq!(
            config.interval_secs(1e20),
            Err(ConfigError::InvalidInterval(1e20))
        );
    }

    #[test]
    fn test_timeout_validation() {
        assert_eq!(timeout_from_secs(2.5), Ok(Duration::from_millis(2500)));
        assert_eq!(timeout_from_secs(0.0), Err(ConfigError::InvalidTimeout(0.0)));
        assert_eq!(timeout_from_secs(-3.0), Err(ConfigError::InvalidTimeout(-3.0)));
        assert_eq!(timeout_from_secs(1e20), Err(ConfigError::InvalidTimeout(1e20)));
        assert!(timeout_from_secs(f64::INFINITY).is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let config = PollConfig::new(4)
            .unwrap()
            .cycles(CycleLimit::Cycles(10))
            .clear_stats(true);
        assert_eq!(config.channel_count(), 4);
        assert_eq!(config.cycle_limit(), CycleLimit::Cycles(10));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.clear_stats_enabled());
        assert!(!config.screenshots_enabled());
    }
}
