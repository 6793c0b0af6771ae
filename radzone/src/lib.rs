//! Shield rate and radiation-zone passage handling for the radzone plotter.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod load;
pub mod scene;
pub mod summary;
pub mod time;

pub use load::{
    interval_file_path, load_intervals, load_rate_series, rate_file_path, read_rate_table,
    require_inputs, validate_intervals, IntervalColumns, RateColumns, RawRateTable,
};
pub use scene::{plan_scene, LegendCategory, LegendRegistry, Mark, PlotStyle, Rgb, Scene, TimeWindow};
pub use summary::{summarize, RunSummary};
pub use time::{cxc_to_plot_date, cxc_to_plot_dates, parse_calendar, NormalizedTime};

/// Operational threshold for the SCS 107 safing action, in counts per second.
pub const SCS107_THRESHOLD_CPS: f64 = 65_000.0;

#[derive(Error, Debug)]
pub enum RzError {
    #[error("required input file not found: {}", .0.display())]
    MissingInput(PathBuf),
    #[error("{}: missing column '{column}'", .path.display())]
    MissingColumn { path: PathBuf, column: String },
    #[error("{}: {message}", .path.display())]
    Table { path: PathBuf, message: String },
    #[error("malformed timestamp '{value}': {reason}")]
    MalformedTimestamp { value: String, reason: String },
    #[error("{}: row {row}, column '{column}': {source}", .path.display())]
    InvalidCell {
        path: PathBuf,
        row: usize,
        column: String,
        #[source]
        source: Box<RzError>,
    },
    #[error("{}: row {row} is earlier than the row before it", .path.display())]
    UnsortedSamples { path: PathBuf, row: usize },
    #[error("radzone {index}: entry {entry} is after exit {exit}")]
    InvalidInterval {
        index: usize,
        entry: NormalizedTime,
        exit: NormalizedTime,
    },
    #[error("radzone {index} enters at {entry} before radzone {previous} exits at {previous_exit}")]
    OverlappingIntervals {
        index: usize,
        previous: usize,
        entry: NormalizedTime,
        previous_exit: NormalizedTime,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RateTier {
    /// Five-minute statistics, plotted from the representative (mid) value.
    Coarse,
    /// Full-resolution telemetry.
    Full,
}

impl RateTier {
    pub fn name(self) -> &'static str {
        match self {
            RateTier::Coarse => "5-minute",
            RateTier::Full => "full resolution",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateSample {
    pub time: NormalizedTime,
    pub rate: f64,
}

#[derive(Clone, Debug)]
pub struct RateSeries {
    pub msid: String,
    pub tier: RateTier,
    pub samples: Vec<RateSample>,
}

impl RateSeries {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_time(&self) -> Option<NormalizedTime> {
        self.samples.first().map(|s| s.time)
    }

    pub fn last_time(&self) -> Option<NormalizedTime> {
        self.samples.last().map(|s| s.time)
    }
}

/// One contiguous passage through the radiation belts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadzoneInterval {
    pub entry: NormalizedTime,
    pub exit: NormalizedTime,
}

impl RadzoneInterval {
    pub fn duration_days(&self) -> f64 {
        self.exit.days_since(&self.entry)
    }

    pub fn contains(&self, t: &NormalizedTime) -> bool {
        self.entry <= *t && *t <= self.exit
    }
}
