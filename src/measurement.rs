use std::fmt;

/// Quantities the instrument can report per channel.
///
/// `Unit` is always queried for every channel; the others are opt-in through
/// [`MeasurementSelection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    Unit,
    Vavg,
    Vmin,
    Vmax,
    Vpp,
    Vrms,
    Freq,
}

impl Measurement {
    /// Optional measurements in the order they are queried for each channel.
    pub const OPTIONAL: [Self; 6] = [
        Self::Vavg,
        Self::Vmin,
        Self::Vmax,
        Self::Vpp,
        Self::Vrms,
        Self::Freq,
    ];

    /// Item name used by `:MEAS:ITEM?`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "UNIT",
            Self::Vavg => "VAVG",
            Self::Vmin => "VMIN",
            Self::Vmax => "VMAX",
            Self::Vpp => "VPP",
            Self::Vrms => "VRMS",
            Self::Freq => "FREQ",
        }
    }

    /// Column label suffix, e.g. `Vavg` in `CH1 Vavg`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unit => "Unit",
            Self::Vavg => "Vavg",
            Self::Vmin => "Vmin",
            Self::Vmax => "Vmax",
            Self::Vpp => "Vpp",
            Self::Vrms => "Vrms",
            Self::Freq => "freq",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Unit => 0,
            Self::Vavg => 1,
            Self::Vmin => 1 << 1,
            Self::Vmax => 1 << 2,
            Self::Vpp => 1 << 3,
            Self::Vrms => 1 << 4,
            Self::Freq => 1 << 5,
        }
    }

    fn command(self, channel: u8) -> String {
        match self {
            Self::Unit => format!(":CHAN{channel}:UNIT?"),
            item => format!(":MEAS:ITEM? {},CHAN{channel}", item.as_str()),
        }
    }

    fn column_label(self, channel: u8) -> String {
        format!("CH{} {}", channel, self.label())
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of enabled measurements.
///
/// ```rust
/// use rigol_meter::{Measurement, MeasurementSelection};
///
/// let selection = MeasurementSelection::none()
///     .with(Measurement::Vpp)
///     .with(Measurement::Freq);
/// assert!(selection.contains(Measurement::Vpp));
/// assert!(!selection.contains(Measurement::Vmin));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementSelection {
    mask: u8,
}

impl MeasurementSelection {
    /// Only the per-channel unit query.
    pub fn none() -> Self {
        Self { mask: 0 }
    }

    pub fn all() -> Self {
        Measurement::OPTIONAL
            .iter()
            .fold(Self::none(), |selection, &m| selection.with(m))
    }

    #[must_use]
    pub fn with(mut self, measurement: Measurement) -> Self {
        self.mask |= measurement.bit();
        self
    }

    #[must_use]
    pub fn without(mut self, measurement: Measurement) -> Self {
        self.mask &= !measurement.bit();
        self
    }

    #[must_use]
    pub fn set(self, measurement: Measurement, enabled: bool) -> Self {
        if enabled {
            self.with(measurement)
        } else {
            self.without(measurement)
        }
    }

    pub fn contains(&self, measurement: Measurement) -> bool {
        measurement == Measurement::Unit || self.mask & measurement.bit() != 0
    }

    /// Measurements queried for one channel, unit first.
    pub fn per_channel(&self) -> impl Iterator<Item = Measurement> + '_ {
        std::iter::once(Measurement::Unit).chain(
            Measurement::OPTIONAL
                .into_iter()
                .filter(move |m| self.contains(*m)),
        )
    }

    /// Number of optional measurements enabled.
    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }
}

/// Vavg, Vmin and Vmax.
impl Default for MeasurementSelection {
    fn default() -> Self {
        Self::none()
            .with(Measurement::Vavg)
            .with(Measurement::Vmin)
            .with(Measurement::Vmax)
    }
}

/// Batched command line sent once per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    fragments: Vec<String>,
    text: String,
}

impl Query {
    pub const SEPARATOR: char = ';';

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Column labels, one per query fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    labels: Vec<String>,
}

impl Header {
    pub const SEPARATOR: &'static str = ", ";
    pub const TIMESTAMP_LABEL: &'static str = "timestamp";
    pub const TIMING_LABEL: &'static str = "querytime";

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Measurement labels joined with `, `.
    pub fn joined(&self) -> String {
        self.labels.join(Self::SEPARATOR)
    }
}

/// The query and its header, built in one pass so they can't drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub query: Query,
    pub header: Header,
}

impl QueryPlan {
    /// Build the batched query for channels `1..=channels`.
    ///
    /// Every fragment names its channel explicitly, so the whole plan goes out as a single line.
    pub fn build(channels: u8, selection: &MeasurementSelection) -> Self {
        let per_channel = 1 + selection.len();
        let mut fragments = Vec::with_capacity(usize::from(channels) * per_channel);
        let mut labels = Vec::with_capacity(fragments.capacity());

        for channel in 1..=channels {
            for measurement in selection.per_channel() {
                fragments.push(measurement.command(channel));
                labels.push(measurement.column_label(channel));
            }
        }

        let text = fragments.join(&Query::SEPARATOR.to_string());
        log::debug!("Built query with {} fragments: {}", fragments.len(), text);

        Self {
            query: Query { fragments, text },
            header: Header { labels },
        }
    }
}
