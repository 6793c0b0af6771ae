use std::fs;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use plotters::coord::Shift;
use plotters::prelude::IntoLogRange;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use radzone::scene::series_label;
use radzone::{
    interval_file_path, load_intervals, load_rate_series, parse_calendar, plan_scene,
    rate_file_path, require_inputs, summarize, IntervalColumns, Mark, NormalizedTime, PlotStyle,
    RadzoneInterval, RateColumns, RateSeries, RateTier, Rgb, Scene, TimeWindow,
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "HRC shield rate and radzone passage plotter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plot the shield rate with radzone passages overlaid
    Plot(PlotArgs),
    /// Print sample, threshold and passage statistics for the inputs
    Summary(SummaryArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Directory holding the MSID CSV files
    #[arg(long, default_value = "msids", value_hint = ValueHint::DirPath)]
    msid_dir: PathBuf,

    /// Shield-rate MSID
    #[arg(long, default_value = "2SHEV1RT")]
    msid: String,

    /// Rate resolution tiers to load
    #[arg(long, value_enum, default_value_t = TierOpt::Coarse)]
    tier: TierOpt,

    /// Directory holding the spacecraft event tables
    #[arg(long, default_value = "spacecraft_events", value_hint = ValueHint::DirPath)]
    event_dir: PathBuf,

    /// Radzone event table name (without .csv)
    #[arg(long, default_value = "radzone_intervals")]
    event: String,

    /// Skip the radzone overlay
    #[arg(long, action = ArgAction::SetTrue)]
    no_radzones: bool,

    /// Optional JSON config (column names and plot style)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct PlotArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output PNG figure path
    #[arg(short, long, default_value = "radzone.png", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// First instant to plot (YYYY:DOY:HH:MM:SS.ffffff)
    #[arg(long)]
    start: Option<String>,

    /// Last instant to plot (YYYY:DOY:HH:MM:SS.ffffff)
    #[arg(long)]
    stop: Option<String>,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    #[command(flatten)]
    input: InputArgs,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TierOpt {
    Coarse,
    Full,
    Both,
}

impl TierOpt {
    fn tiers(self) -> Vec<RateTier> {
        match self {
            TierOpt::Coarse => vec![RateTier::Coarse],
            TierOpt::Full => vec![RateTier::Full],
            TierOpt::Both => vec![RateTier::Coarse, RateTier::Full],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunConfig {
    rate_columns: RateColumns,
    interval_columns: IntervalColumns,
    style: PlotStyle,
}

fn main() -> Result<()> {
    let started = Instant::now();
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Plot(args) => args.input.verbose,
        Command::Summary(args) => args.input.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Plot(args) => handle_plot(args)?,
        Command::Summary(args) => handle_summary(args)?,
    }

    info!(
        "Finished in {:.3} seconds",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<()> {
    let config = load_config(args.input.config.as_deref())?;
    let window = TimeWindow {
        start: parse_bound(args.start.as_deref(), "--start")?,
        stop: parse_bound(args.stop.as_deref(), "--stop")?,
    };
    if let (Some(start), Some(stop)) = (window.start, window.stop) {
        if stop < start {
            return Err(anyhow!("--stop {} is before --start {}", stop, start));
        }
    }

    let (series, intervals) = load_inputs(&args.input, &config)?;

    let scene = plan_scene(&series, intervals.as_deref(), &config.style, &window);
    if scene.skipped_non_positive > 0 {
        warn!(
            "{} non-positive rate samples left off the log axis",
            scene.skipped_non_positive
        );
    }
    info!("Plot constructed: {} marks", scene.marks.len());

    let t_plot = Instant::now();
    render_chart_guard(&scene, &config.style, &args.output, ChartKind::Png)
        .with_context(|| format!("failed to render {}", args.output.display()))?;
    info!("Wrote plot: {}", args.output.display());

    if let Some(path) = args.svg.as_ref() {
        render_chart_guard(&scene, &config.style, path, ChartKind::Svg)
            .with_context(|| format!("failed to render {}", path.display()))?;
        info!("Wrote plot: {}", path.display());
    }
    if args.input.verbose {
        info!(
            "Plot stage: {:.1} ms",
            t_plot.elapsed().as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<()> {
    let config = load_config(args.input.config.as_deref())?;
    let (series, intervals) = load_inputs(&args.input, &config)?;
    let summary = summarize(&series, intervals.as_deref(), config.style.threshold);
    print!("{}", summary);
    Ok(())
}

/// Check every input exists, then load rate tiers and (unless disabled) radzones.
fn load_inputs(
    input: &InputArgs,
    config: &RunConfig,
) -> Result<(Vec<RateSeries>, Option<Vec<RadzoneInterval>>)> {
    let tiers = input.tier.tiers();
    let mut required: Vec<PathBuf> = tiers
        .iter()
        .map(|&tier| rate_file_path(&input.msid_dir, &input.msid, tier, &config.rate_columns))
        .collect();
    let interval_path = if input.no_radzones {
        None
    } else {
        Some(interval_file_path(&input.event_dir, &input.event))
    };
    required.extend(interval_path.iter().cloned());
    require_inputs(&required).context("missing input file")?;

    let t_load = Instant::now();
    let series = load_rate_series(&input.msid_dir, &input.msid, &tiers, &config.rate_columns)
        .context("failed to load shield rate")?;
    for s in &series {
        info!("Shield rate parsed: {} ({} samples)", series_label(s), s.len());
    }

    let intervals = match interval_path {
        Some(path) => {
            let intervals = load_intervals(&path, &config.interval_columns)
                .context("failed to load radzone intervals")?;
            info!("Radzone intervals parsed: {} passages", intervals.len());
            Some(intervals)
        }
        None => None,
    };
    if input.verbose {
        info!(
            "Load stage: {:.1} ms",
            t_load.elapsed().as_secs_f64() * 1000.0
        );
    }
    Ok((series, intervals))
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: RunConfig = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid config", path.display()))?;
    validate_style(&config.style)
        .with_context(|| format!("{} has an invalid style", path.display()))?;
    debug!("Loaded config {}", path.display());
    Ok(config)
}

/// Values drawn on the log axis must be positive.
fn validate_style(style: &PlotStyle) -> Result<()> {
    if !(style.y_min > 0.0 && style.y_max > style.y_min && style.y_max.is_finite()) {
        return Err(anyhow!(
            "invalid y range {}..{} for a log axis",
            style.y_min,
            style.y_max
        ));
    }
    if !(style.threshold > 0.0 && style.threshold.is_finite()) {
        return Err(anyhow!(
            "threshold {} cannot be drawn on a log axis",
            style.threshold
        ));
    }
    Ok(())
}

fn parse_bound(value: Option<&str>, flag: &str) -> Result<Option<NormalizedTime>> {
    value
        .map(|text| parse_calendar(text).with_context(|| format!("invalid {} value", flag)))
        .transpose()
}

enum ChartKind {
    Png,
    Svg,
}

fn render_chart_guard(scene: &Scene, style: &PlotStyle, path: &Path, kind: ChartKind) -> Result<()> {
    let size = (style.width, style.height);
    let render = || -> Result<()> {
        match kind {
            ChartKind::Png => draw_scene(
                BitMapBackend::new(path, size).into_drawing_area(),
                scene,
                style,
            ),
            ChartKind::Svg => draw_scene(
                SVGBackend::new(path, size).into_drawing_area(),
                scene,
                style,
            ),
        }
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| anyhow!("plotting backend panicked"))?
}

fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}

fn font(style: &PlotStyle, size: f64) -> FontDesc<'_> {
    FontDesc::new(
        FontFamily::from(style.font_family.as_str()),
        size,
        FontStyle::Normal,
    )
}

/// Tick label pattern fine enough that neighbouring ticks differ.
fn axis_date_format(span_days: f64) -> &'static str {
    if span_days > 3.0 * 365.0 {
        "%Y"
    } else if span_days > 60.0 {
        "%Y-%m"
    } else if span_days > 2.0 {
        "%Y:%j"
    } else if span_days > 1.0 / 24.0 {
        "%j %H:%M"
    } else {
        "%H:%M:%S"
    }
}

fn format_axis_date(days: f64, pattern: &str) -> String {
    NormalizedTime::from_days(days)
        .to_datetime()
        .map(|dt| dt.format(pattern).to_string())
        .unwrap_or_default()
}

fn draw_scene<DB>(root: DrawingArea<DB, Shift>, scene: &Scene, style: &PlotStyle) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (x0, x1) = scene.x_range;
    let (y0, y1) = scene.y_range;
    let date_format = axis_date_format(x1 - x0);

    let mut builder = ChartBuilder::on(&root);
    builder
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 80)
        .set_label_area_size(LabelAreaPosition::Bottom, 50);
    if let Some(title) = style.title.as_ref() {
        builder.caption(title, font(style, style.title_size));
    }
    let mut chart = builder.build_cartesian_2d(x0..x1, (y0..y1).log_scale())?;

    chart
        .plotting_area()
        .fill(&rgb(style.panel_background))?;
    chart
        .configure_mesh()
        .bold_line_style(rgb(style.grid_color))
        .light_line_style(rgb(style.grid_color).mix(0.5))
        .x_desc("Date")
        .y_desc("Counts/s")
        .x_label_formatter(&|v| format_axis_date(*v, date_format))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(font(style, style.tick_size))
        .axis_desc_style(font(style, style.label_size))
        .draw()?;

    for mark in &scene.marks {
        match mark {
            Mark::Band {
                label,
                start,
                end,
                color,
                alpha,
            } => {
                let fill = rgb(*color).mix(*alpha);
                let anno = chart.draw_series(std::iter::once(Rectangle::new(
                    [(*start, y0), (*end, y1)],
                    fill.filled(),
                )))?;
                if let Some(label) = label {
                    anno.label(label.as_str()).legend(move |(x, y)| {
                        Rectangle::new([(x, y - 5), (x + 20, y + 5)], fill.filled())
                    });
                }
            }
            Mark::Points {
                label,
                color,
                points,
            } => {
                let color = rgb(*color);
                let size = style.marker_size;
                chart
                    .draw_series(
                        points
                            .iter()
                            .map(|&(x, y)| Circle::new((x, y), size, color.filled())),
                    )?
                    .label(label.as_str())
                    .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));
            }
            Mark::Threshold {
                label,
                y,
                color,
                alpha,
            } => {
                let line = ShapeStyle {
                    color: rgb(*color).mix(*alpha),
                    filled: false,
                    stroke_width: 2,
                };
                chart
                    .draw_series(LineSeries::new(vec![(x0, *y), (x1, *y)], line))?
                    .label(label.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line));
            }
            Mark::Edge {
                label, x, color, ..
            } => {
                let line = ShapeStyle {
                    color: rgb(*color).to_rgba(),
                    filled: false,
                    stroke_width: 1,
                };
                let anno =
                    chart.draw_series(LineSeries::new(vec![(*x, y0), (*x, y1)], line))?;
                if let Some(label) = label {
                    anno.label(label.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], line));
                }
            }
        }
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK.mix(0.3))
        .label_font(font(style, style.font_size))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}
