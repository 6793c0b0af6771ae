//! Plot planning: turns loaded series and radzone passages into a list of
//! marks with their legend labels already resolved. Drawing happens in the CLI.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{NormalizedTime, RadzoneInterval, RateSeries, RateTier, SCS107_THRESHOLD_CPS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Chart appearance. Passed explicitly to planning and drawing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub font_family: String,
    pub font_size: f64,
    pub title_size: f64,
    pub label_size: f64,
    pub tick_size: f64,
    pub title: Option<String>,
    pub panel_background: Rgb,
    pub grid_color: Rgb,
    pub y_min: f64,
    pub y_max: f64,
    pub marker_size: u32,
    pub coarse_color: Rgb,
    pub full_color: Rgb,
    pub threshold: f64,
    pub threshold_color: Rgb,
    pub threshold_alpha: f64,
    pub band_color: Rgb,
    pub band_alpha: f64,
    pub entry_color: Rgb,
    pub exit_color: Rgb,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            font_family: "sans-serif".to_string(),
            font_size: 13.0,
            title_size: 12.0,
            label_size: 13.0,
            tick_size: 13.0,
            title: None,
            panel_background: Rgb(229, 229, 229),
            grid_color: Rgb(255, 255, 255),
            y_min: 1_000.0,
            y_max: 200_000.0,
            marker_size: 1,
            coarse_color: Rgb(226, 74, 51),
            full_color: Rgb(52, 138, 189),
            threshold: SCS107_THRESHOLD_CPS,
            threshold_color: Rgb(128, 128, 128),
            threshold_alpha: 0.8,
            band_color: Rgb(152, 142, 213),
            band_alpha: 0.3,
            entry_color: Rgb(251, 193, 94),
            exit_color: Rgb(142, 186, 66),
        }
    }
}

/// Marks repeated once per radzone passage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LegendCategory {
    Passage,
    Entry,
    Exit,
}

impl LegendCategory {
    pub fn label(self) -> &'static str {
        match self {
            LegendCategory::Passage => "Radzone passage",
            LegendCategory::Entry => "Radzone entry",
            LegendCategory::Exit => "Radzone exit",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelState {
    Unlabeled,
    Labeled,
}

/// Tracks which repeated categories already carry a legend label.
#[derive(Debug, Default)]
pub struct LegendRegistry {
    labeled: HashSet<LegendCategory>,
}

impl LegendRegistry {
    pub fn state(&self, category: LegendCategory) -> LabelState {
        if self.labeled.contains(&category) {
            LabelState::Labeled
        } else {
            LabelState::Unlabeled
        }
    }

    /// Returns the label the first time a category is seen, `None` afterwards.
    pub fn claim(&mut self, category: LegendCategory) -> Option<String> {
        match self.state(category) {
            LabelState::Labeled => None,
            LabelState::Unlabeled => {
                self.labeled.insert(category);
                Some(category.label().to_string())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Mark {
    Points {
        label: String,
        color: Rgb,
        points: Vec<(f64, f64)>,
    },
    Threshold {
        label: String,
        y: f64,
        color: Rgb,
        alpha: f64,
    },
    Band {
        label: Option<String>,
        start: f64,
        end: f64,
        color: Rgb,
        alpha: f64,
    },
    Edge {
        category: LegendCategory,
        label: Option<String>,
        x: f64,
        color: Rgb,
    },
}

impl Mark {
    pub fn label(&self) -> Option<&str> {
        match self {
            Mark::Points { label, .. } | Mark::Threshold { label, .. } => Some(label.as_str()),
            Mark::Band { label, .. } | Mark::Edge { label, .. } => label.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub marks: Vec<Mark>,
    /// Samples left out because a log axis cannot show them.
    pub skipped_non_positive: usize,
}

impl Scene {
    pub fn legend_labels(&self) -> Vec<&str> {
        self.marks.iter().filter_map(Mark::label).collect()
    }
}

/// Optional bounds on the plotted time range.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeWindow {
    pub start: Option<NormalizedTime>,
    pub stop: Option<NormalizedTime>,
}

impl TimeWindow {
    pub fn contains(&self, t: &NormalizedTime) -> bool {
        self.start.map_or(true, |s| s <= *t) && self.stop.map_or(true, |e| *t <= e)
    }

    fn overlaps(&self, interval: &RadzoneInterval) -> bool {
        self.start.map_or(true, |s| s <= interval.exit)
            && self.stop.map_or(true, |e| interval.entry <= e)
    }
}

pub fn series_label(series: &RateSeries) -> String {
    match series.tier {
        RateTier::Coarse => format!("HRC Shield Rate ({})", series.msid),
        RateTier::Full => format!("HRC Shield Rate ({}, {})", series.msid, series.tier.name()),
    }
}

/// Lay out the chart. Passage bands go first so they sit behind the data.
pub fn plan_scene(
    series: &[RateSeries],
    intervals: Option<&[RadzoneInterval]>,
    style: &PlotStyle,
    window: &TimeWindow,
) -> Scene {
    let intervals: Vec<&RadzoneInterval> = intervals
        .unwrap_or(&[])
        .iter()
        .filter(|iv| window.overlaps(iv))
        .collect();

    let mut marks = Vec::new();
    let mut legend = LegendRegistry::default();
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;

    for interval in &intervals {
        let start = match window.start {
            Some(s) if s > interval.entry => s,
            _ => interval.entry,
        };
        let end = match window.stop {
            Some(e) if e < interval.exit => e,
            _ => interval.exit,
        };
        lo = lo.min(start.days());
        hi = hi.max(end.days());
        marks.push(Mark::Band {
            label: legend.claim(LegendCategory::Passage),
            start: start.days(),
            end: end.days(),
            color: style.band_color,
            alpha: style.band_alpha,
        });
    }

    let mut skipped = 0usize;
    for s in series {
        let mut points = Vec::with_capacity(s.len());
        for sample in s.samples.iter().filter(|smp| window.contains(&smp.time)) {
            let x = sample.time.days();
            lo = lo.min(x);
            hi = hi.max(x);
            if sample.rate > 0.0 {
                points.push((x, sample.rate));
            } else {
                skipped += 1;
            }
        }
        let color = match s.tier {
            RateTier::Coarse => style.coarse_color,
            RateTier::Full => style.full_color,
        };
        marks.push(Mark::Points {
            label: series_label(s),
            color,
            points,
        });
    }

    marks.push(Mark::Threshold {
        label: format!("SCS 107 Threshold ({} cps)", group_thousands(style.threshold)),
        y: style.threshold,
        color: style.threshold_color,
        alpha: style.threshold_alpha,
    });

    for interval in &intervals {
        for (category, t, color) in [
            (LegendCategory::Entry, interval.entry, style.entry_color),
            (LegendCategory::Exit, interval.exit, style.exit_color),
        ] {
            if !window.contains(&t) {
                continue;
            }
            marks.push(Mark::Edge {
                category,
                label: legend.claim(category),
                x: t.days(),
                color,
            });
        }
    }

    if let Some(s) = window.start {
        lo = s.days();
    }
    if let Some(e) = window.stop {
        hi = e.days();
    }
    if !lo.is_finite() || !hi.is_finite() {
        lo = 0.0;
        hi = 1.0;
    } else if hi - lo <= 0.0 {
        lo -= 1.0;
        hi += 1.0;
    }

    Scene {
        x_range: (lo, hi),
        y_range: (style.y_min, style.y_max),
        marks,
        skipped_non_positive: skipped,
    }
}

fn group_thousands(value: f64) -> String {
    let digits = format!("{:.0}", value.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0.0 {
        out.insert(0, '-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{cxc_to_plot_date, parse_calendar};
    use crate::RateSample;

    fn series(tier: RateTier, rates: &[f64]) -> RateSeries {
        RateSeries {
            msid: "2SHEV1RT".to_string(),
            tier,
            samples: rates
                .iter()
                .enumerate()
                .map(|(i, &rate)| RateSample {
                    time: cxc_to_plot_date(63_000_000.0 + i as f64 * 300.0),
                    rate,
                })
                .collect(),
        }
    }

    fn passages(n: usize) -> Vec<RadzoneInterval> {
        let base = cxc_to_plot_date(63_000_000.0);
        (0..n)
            .map(|i| RadzoneInterval {
                entry: base.offset_days(i as f64 * 2.6),
                exit: base.offset_days(i as f64 * 2.6 + 0.5),
            })
            .collect()
    }

    fn count(scene: &Scene, label: &str) -> usize {
        scene.legend_labels().iter().filter(|l| **l == label).count()
    }

    #[test]
    fn legend_entries_appear_once_per_category() {
        let style = PlotStyle::default();
        let rates = [series(RateTier::Coarse, &[2000.0, 3000.0])];
        for n in [0usize, 1, 5] {
            let intervals = passages(n);
            let scene = plan_scene(&rates, Some(&intervals), &style, &TimeWindow::default());
            let expected = usize::from(n > 0);
            for category in [LegendCategory::Passage, LegendCategory::Entry, LegendCategory::Exit] {
                assert_eq!(count(&scene, category.label()), expected, "n = {}", n);
            }
            let bands = scene
                .marks
                .iter()
                .filter(|m| matches!(m, Mark::Band { .. }))
                .count();
            let edges = scene
                .marks
                .iter()
                .filter(|m| matches!(m, Mark::Edge { .. }))
                .count();
            assert_eq!(bands, n);
            assert_eq!(edges, 2 * n);
        }
    }

    #[test]
    fn registry_moves_from_unlabeled_to_labeled() {
        let mut registry = LegendRegistry::default();
        assert_eq!(registry.state(LegendCategory::Entry), LabelState::Unlabeled);
        assert_eq!(registry.claim(LegendCategory::Entry).as_deref(), Some("Radzone entry"));
        assert_eq!(registry.state(LegendCategory::Entry), LabelState::Labeled);
        assert_eq!(registry.claim(LegendCategory::Entry), None);
        assert_eq!(registry.state(LegendCategory::Exit), LabelState::Unlabeled);
    }

    #[test]
    fn threshold_and_series_are_always_labelled() {
        let style = PlotStyle::default();
        let rates = [
            series(RateTier::Coarse, &[2000.0]),
            series(RateTier::Full, &[2100.0]),
        ];
        let scene = plan_scene(&rates, None, &style, &TimeWindow::default());
        assert_eq!(
            scene.legend_labels(),
            vec![
                "HRC Shield Rate (2SHEV1RT)",
                "HRC Shield Rate (2SHEV1RT, full resolution)",
                "SCS 107 Threshold (65,000 cps)",
            ]
        );
        assert_eq!(scene.y_range, (1_000.0, 200_000.0));
    }

    #[test]
    fn single_sample_gets_a_padded_axis() {
        let style = PlotStyle::default();
        let rates = [series(RateTier::Coarse, &[2000.0])];
        let scene = plan_scene(&rates, None, &style, &TimeWindow::default());
        let x = rates[0].samples[0].time.days();
        assert_eq!(scene.x_range, (x - 1.0, x + 1.0));
    }

    #[test]
    fn non_positive_rates_are_skipped() {
        let style = PlotStyle::default();
        let rates = [series(RateTier::Coarse, &[2000.0, 0.0, -1.0, 4000.0])];
        let scene = plan_scene(&rates, None, &style, &TimeWindow::default());
        assert_eq!(scene.skipped_non_positive, 2);
        match &scene.marks[0] {
            Mark::Points { points, .. } => assert_eq!(points.len(), 2),
            other => panic!("unexpected mark {other:?}"),
        }
    }

    #[test]
    fn window_clips_samples_and_bands() {
        let style = PlotStyle::default();
        let rates = [series(RateTier::Coarse, &[2000.0; 10])];
        let intervals = passages(3);
        let window = TimeWindow {
            start: Some(intervals[1].entry.offset_days(0.25)),
            stop: Some(parse_calendar("2030:001:00:00:00.000000").unwrap()),
        };
        let scene = plan_scene(&rates, Some(&intervals), &style, &window);

        let bands: Vec<(f64, f64)> = scene
            .marks
            .iter()
            .filter_map(|m| match m {
                Mark::Band { start, end, .. } => Some((*start, *end)),
                _ => None,
            })
            .collect();
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0].0, window.start.unwrap().days());

        // the clipped passage has lost its entry edge
        assert_eq!(count(&scene, "Radzone entry"), 1);
        assert_eq!(count(&scene, "Radzone exit"), 1);
        assert_eq!(scene.x_range.0, window.start.unwrap().days());
        match &scene.marks[2] {
            Mark::Points { points, .. } => assert!(points.is_empty()),
            other => panic!("unexpected mark {other:?}"),
        }
    }

    #[test]
    fn style_reads_partial_json() {
        let style: PlotStyle =
            serde_json::from_str(r#"{"width": 640, "band_color": [1, 2, 3], "title": "Radzones"}"#)
                .unwrap();
        assert_eq!(style.width, 640);
        assert_eq!(style.band_color, Rgb(1, 2, 3));
        assert_eq!(style.title.as_deref(), Some("Radzones"));
        assert_eq!(style.height, 800);
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(65_000.0), "65,000");
        assert_eq!(group_thousands(1_234_567.0), "1,234,567");
        assert_eq!(group_thousands(999.0), "999");
    }
}
