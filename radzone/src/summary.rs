//! Run statistics printed by the `summary` command.

use std::fmt;

use crate::{NormalizedTime, RadzoneInterval, RateSeries, RateTier};

#[derive(Clone, Debug, PartialEq)]
pub struct SeriesSummary {
    pub msid: String,
    pub tier: RateTier,
    pub samples: usize,
    pub first: Option<NormalizedTime>,
    pub last: Option<NormalizedTime>,
    pub peak_rate: Option<f64>,
    pub above_threshold: usize,
    /// Samples above the threshold that fall inside a radzone passage.
    pub above_threshold_in_radzone: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntervalSummary {
    pub passages: usize,
    pub total_days: f64,
    pub longest_days: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub threshold: f64,
    pub series: Vec<SeriesSummary>,
    pub intervals: Option<IntervalSummary>,
}

/// Index of the passage containing `t`. `intervals` must be sorted and disjoint.
pub fn passage_containing(intervals: &[RadzoneInterval], t: &NormalizedTime) -> Option<usize> {
    let idx = intervals.partition_point(|iv| iv.exit < *t);
    intervals
        .get(idx)
        .filter(|iv| iv.contains(t))
        .map(|_| idx)
}

pub fn summarize(
    series: &[RateSeries],
    intervals: Option<&[RadzoneInterval]>,
    threshold: f64,
) -> RunSummary {
    let series = series
        .iter()
        .map(|s| {
            let mut above = 0usize;
            let mut above_in_radzone = 0usize;
            let mut peak: Option<f64> = None;
            for sample in &s.samples {
                peak = Some(peak.map_or(sample.rate, |p| p.max(sample.rate)));
                if sample.rate > threshold {
                    above += 1;
                    if intervals
                        .and_then(|ivs| passage_containing(ivs, &sample.time))
                        .is_some()
                    {
                        above_in_radzone += 1;
                    }
                }
            }
            SeriesSummary {
                msid: s.msid.clone(),
                tier: s.tier,
                samples: s.len(),
                first: s.first_time(),
                last: s.last_time(),
                peak_rate: peak,
                above_threshold: above,
                above_threshold_in_radzone: above_in_radzone,
            }
        })
        .collect();

    let intervals = intervals.map(|ivs| IntervalSummary {
        passages: ivs.len(),
        total_days: ivs.iter().map(RadzoneInterval::duration_days).sum(),
        longest_days: ivs
            .iter()
            .map(RadzoneInterval::duration_days)
            .fold(0.0, f64::max),
    });

    RunSummary {
        threshold,
        series,
        intervals,
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.series {
            writeln!(f, "{} ({}):", s.msid, s.tier.name())?;
            writeln!(f, "  samples: {}", s.samples)?;
            if let (Some(first), Some(last)) = (s.first, s.last) {
                writeln!(f, "  span: {} .. {}", first, last)?;
            }
            if let Some(peak) = s.peak_rate {
                writeln!(f, "  peak_rate_cps: {:.1}", peak)?;
            }
            writeln!(
                f,
                "  above_{:.0}_cps: {} ({} inside radzones)",
                self.threshold, s.above_threshold, s.above_threshold_in_radzone
            )?;
        }
        if let Some(iv) = &self.intervals {
            writeln!(f, "radzones:")?;
            writeln!(f, "  passages: {}", iv.passages)?;
            writeln!(f, "  total_hours: {:.2}", iv.total_days * 24.0)?;
            writeln!(f, "  longest_hours: {:.2}", iv.longest_days * 24.0)?;
        }
        Ok(())
    }
}
