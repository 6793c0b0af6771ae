//! CSV loaders for the shield-rate MSID tiers and the radzone event table.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::time::{check_cxc_seconds, cxc_to_plot_dates, parse_calendar};
use crate::{RadzoneInterval, RateSample, RateSeries, RateTier, RzError};

/// Column and file naming for the MSID rate tables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateColumns {
    pub time: String,
    pub coarse_value: String,
    pub full_value: String,
    pub coarse_suffix: String,
    pub full_suffix: String,
}

impl Default for RateColumns {
    fn default() -> Self {
        Self {
            time: "times".to_string(),
            coarse_value: "midvals".to_string(),
            full_value: "vals".to_string(),
            coarse_suffix: String::new(),
            full_suffix: "_full".to_string(),
        }
    }
}

impl RateColumns {
    pub fn value_column(&self, tier: RateTier) -> &str {
        match tier {
            RateTier::Coarse => &self.coarse_value,
            RateTier::Full => &self.full_value,
        }
    }

    fn suffix(&self, tier: RateTier) -> &str {
        match tier {
            RateTier::Coarse => &self.coarse_suffix,
            RateTier::Full => &self.full_suffix,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntervalColumns {
    pub entry: String,
    pub exit: String,
}

impl Default for IntervalColumns {
    fn default() -> Self {
        Self {
            entry: "start".to_string(),
            exit: "stop".to_string(),
        }
    }
}

/// Raw time and value columns of one MSID table, times in CXC seconds.
#[derive(Clone, Debug)]
pub struct RawRateTable {
    pub times: Array1<f64>,
    pub values: Array1<f64>,
}

pub fn rate_file_path(dir: &Path, msid: &str, tier: RateTier, columns: &RateColumns) -> PathBuf {
    dir.join(format!("{}{}.csv", msid, columns.suffix(tier)))
}

pub fn interval_file_path(dir: &Path, event: &str) -> PathBuf {
    dir.join(format!("{}.csv", event))
}

/// Fail on the first path that does not name an existing file.
pub fn require_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<(), RzError> {
    for path in paths {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RzError::MissingInput(path.to_path_buf()));
        }
    }
    Ok(())
}

pub fn read_rate_table(
    path: &Path,
    time_column: &str,
    value_column: &str,
) -> Result<RawRateTable, RzError> {
    let mut reader = open_table(path, Trim::All)?;
    let headers = read_headers(&mut reader, path)?;
    let time_idx = column_index(&headers, time_column, path)?;
    let value_idx = column_index(&headers, value_column, path)?;

    let mut times = Vec::new();
    let mut values = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = record.map_err(|e| table_error(path, e))?;
        let time = numeric_cell(&record, time_idx, time_column, row, path)?;
        let time = check_cxc_seconds(time).map_err(|reason| RzError::Table {
            path: path.to_path_buf(),
            message: format!("row {}: column '{}': {}", row, time_column, reason),
        })?;
        times.push(time);
        values.push(numeric_cell(&record, value_idx, value_column, row, path)?);
    }

    let times = Array1::from_vec(times);
    ensure_monotonic(&times, path)?;
    debug!("{}: {} rows", path.display(), times.len());
    Ok(RawRateTable {
        times,
        values: Array1::from_vec(values),
    })
}

/// Load one series per requested tier. Every tier's file is checked before any is parsed.
pub fn load_rate_series(
    dir: &Path,
    msid: &str,
    tiers: &[RateTier],
    columns: &RateColumns,
) -> Result<Vec<RateSeries>, RzError> {
    let paths: Vec<PathBuf> = tiers
        .iter()
        .map(|&tier| rate_file_path(dir, msid, tier, columns))
        .collect();
    require_inputs(&paths)?;

    let mut out = Vec::with_capacity(tiers.len());
    for (&tier, path) in tiers.iter().zip(paths.iter()) {
        let table = read_rate_table(path, &columns.time, columns.value_column(tier))?;
        let times = cxc_to_plot_dates(&table.times);
        let samples = times
            .into_iter()
            .zip(table.values.iter())
            .map(|(time, &rate)| RateSample { time, rate })
            .collect();
        out.push(RateSeries {
            msid: msid.to_string(),
            tier,
            samples,
        });
    }
    Ok(out)
}

pub fn load_intervals(
    path: &Path,
    columns: &IntervalColumns,
) -> Result<Vec<RadzoneInterval>, RzError> {
    require_inputs(&[path])?;
    // timestamps must match the pattern exactly, padding included
    let mut reader = open_table(path, Trim::Headers)?;
    let headers = read_headers(&mut reader, path)?;
    let entry_idx = column_index(&headers, &columns.entry, path)?;
    let exit_idx = column_index(&headers, &columns.exit, path)?;

    let mut intervals = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = record.map_err(|e| table_error(path, e))?;
        let entry = calendar_cell(&record, entry_idx, &columns.entry, row, path)?;
        let exit = calendar_cell(&record, exit_idx, &columns.exit, row, path)?;
        intervals.push(RadzoneInterval { entry, exit });
    }

    validate_intervals(&intervals)?;
    debug!("{}: {} radzone passages", path.display(), intervals.len());
    Ok(intervals)
}

/// Intervals must be well formed, chronological and non-overlapping.
pub fn validate_intervals(intervals: &[RadzoneInterval]) -> Result<(), RzError> {
    for (index, interval) in intervals.iter().enumerate() {
        if interval.entry > interval.exit {
            return Err(RzError::InvalidInterval {
                index,
                entry: interval.entry,
                exit: interval.exit,
            });
        }
        if index > 0 {
            let previous = &intervals[index - 1];
            if interval.entry < previous.exit {
                return Err(RzError::OverlappingIntervals {
                    index,
                    previous: index - 1,
                    entry: interval.entry,
                    previous_exit: previous.exit,
                });
            }
        }
    }
    Ok(())
}

fn open_table(path: &Path, trim: Trim) -> Result<Reader<File>, RzError> {
    ReaderBuilder::new()
        .has_headers(true)
        .trim(trim)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| table_error(path, e))
}

fn read_headers(reader: &mut Reader<File>, path: &Path) -> Result<StringRecord, RzError> {
    let headers = reader.headers().map_err(|e| table_error(path, e))?.clone();
    if headers.is_empty() {
        return Err(RzError::Table {
            path: path.to_path_buf(),
            message: "missing header row".to_string(),
        });
    }
    Ok(headers)
}

fn column_index(headers: &StringRecord, name: &str, path: &Path) -> Result<usize, RzError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| RzError::MissingColumn {
            path: path.to_path_buf(),
            column: name.to_string(),
        })
}

fn numeric_cell(
    record: &StringRecord,
    idx: usize,
    column: &str,
    row: usize,
    path: &Path,
) -> Result<f64, RzError> {
    let text = record.get(idx).unwrap_or("");
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(RzError::Table {
            path: path.to_path_buf(),
            message: format!(
                "row {}: '{}' in column '{}' is not a finite number",
                row, text, column
            ),
        }),
    }
}

fn calendar_cell(
    record: &StringRecord,
    idx: usize,
    column: &str,
    row: usize,
    path: &Path,
) -> Result<crate::NormalizedTime, RzError> {
    let text = record.get(idx).unwrap_or("");
    parse_calendar(text).map_err(|e| RzError::InvalidCell {
        path: path.to_path_buf(),
        row,
        column: column.to_string(),
        source: Box::new(e),
    })
}

fn ensure_monotonic(times: &Array1<f64>, path: &Path) -> Result<(), RzError> {
    for (idx, pair) in times.windows(2).into_iter().enumerate() {
        if pair[1] < pair[0] {
            return Err(RzError::UnsortedSamples {
                path: path.to_path_buf(),
                row: idx + 2,
            });
        }
    }
    Ok(())
}

fn table_error(path: &Path, err: csv::Error) -> RzError {
    RzError::Table {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_named_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "2SHEV1RT.csv",
            "times,mins,midvals,maxes\n63300000.0,10,2500.5,3000\n63300300.0,12,2600,3100\n",
        );
        let table = read_rate_table(&path, "times", "midvals").unwrap();
        assert_eq!(table.times.to_vec(), vec![63_300_000.0, 63_300_300.0]);
        assert_eq!(table.values.to_vec(), vec![2500.5, 2600.0]);
    }

    #[test]
    fn skips_comment_lines() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "rate.csv",
            "# %ECSV 0.9\n# ---\ntimes,vals\n1.0,5\n2.0,6\n",
        );
        let table = read_rate_table(&path, "times", "vals").unwrap();
        assert_eq!(table.values.len(), 2);
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "rate.csv", "times,vals\n1.0,5\n");
        let err = read_rate_table(&path, "times", "midvals").unwrap_err();
        assert!(matches!(err, RzError::MissingColumn { ref column, .. } if column == "midvals"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "rate.csv", "times,vals\n1.0,5\n2.0\n");
        let err = read_rate_table(&path, "times", "vals").unwrap_err();
        assert!(matches!(err, RzError::Table { .. }));
    }

    #[test]
    fn non_numeric_rate_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "rate.csv", "times,vals\n1.0,five\n");
        let err = read_rate_table(&path, "times", "vals").unwrap_err();
        assert!(err.to_string().contains("'five'"));
    }

    #[test]
    fn non_finite_times_are_rejected() {
        let dir = TempDir::new().unwrap();
        for bad in ["inf", "nan", "-inf", "NaN"] {
            let path = write(&dir, "rate.csv", &format!("times,vals\n0.0,2500\n{},2600\n", bad));
            match read_rate_table(&path, "times", "vals").unwrap_err() {
                RzError::Table { message, .. } => {
                    assert!(message.contains("row 2"), "{}", message);
                    assert!(message.contains("not a finite number"), "{}", message);
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn out_of_range_times_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "rate.csv", "times,vals\n0.0,2500\n1e300,2600\n");
        match read_rate_table(&path, "times", "vals").unwrap_err() {
            RzError::Table { message, .. } => {
                assert!(message.contains("row 2"), "{}", message);
                assert!(message.contains("outside the supported range"), "{}", message);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_finite_rate_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "rate.csv", "times,vals\n0.0,inf\n");
        let err = read_rate_table(&path, "times", "vals").unwrap_err();
        assert!(err.to_string().contains("'inf'"));
    }

    #[test]
    fn out_of_order_samples_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "rate.csv", "times,vals\n10.0,5\n20.0,6\n15.0,7\n");
        let err = read_rate_table(&path, "times", "vals").unwrap_err();
        assert!(matches!(err, RzError::UnsortedSamples { row: 3, .. }));
    }

    #[test]
    fn missing_tier_is_detected_before_parsing() {
        let dir = TempDir::new().unwrap();
        // the coarse file is garbage; the missing full tier must be reported first
        write(&dir, "2SHEV1RT.csv", "not,a\nvalid");
        let err = load_rate_series(
            dir.path(),
            "2SHEV1RT",
            &[RateTier::Coarse, RateTier::Full],
            &RateColumns::default(),
        )
        .unwrap_err();
        match err {
            RzError::MissingInput(path) => assert!(path.ends_with("2SHEV1RT_full.csv")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn loads_both_tiers() {
        let dir = TempDir::new().unwrap();
        write(&dir, "2SHEV1RT.csv", "times,midvals\n0.0,2000\n300.0,2100\n");
        write(&dir, "2SHEV1RT_full.csv", "times,vals\n0.0,1990\n");
        let series = load_rate_series(
            dir.path(),
            "2SHEV1RT",
            &[RateTier::Coarse, RateTier::Full],
            &RateColumns::default(),
        )
        .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].tier, RateTier::Coarse);
        assert_eq!(series[0].len(), 2);
        assert_eq!(series[1].samples[0].rate, 1990.0);
        assert_eq!(series[1].samples[0].time.whole_days(), 729_390);
    }

    #[test]
    fn loads_intervals() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "radzone_intervals.csv",
            "start,stop,dur\n\
             2000:003:15:27:47.271000,2000:004:02:11:03.000000,38596\n\
             2000:005:12:00:00.000000,2000:005:23:00:00.000000,39600\n",
        );
        let intervals = load_intervals(&path, &IntervalColumns::default()).unwrap();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].entry.whole_days(), 730_122);
        assert!((intervals[1].duration_days() - 11.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_interval_names_row_and_value() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "radzone_intervals.csv",
            "start,stop\n2000:003:15:27:47.271000,2000/004/02:11:03.000000\n",
        );
        let err = load_intervals(&path, &IntervalColumns::default()).unwrap_err();
        match err {
            RzError::InvalidCell {
                row, column, source, ..
            } => {
                assert_eq!(row, 1);
                assert_eq!(column, "stop");
                assert!(matches!(*source, RzError::MalformedTimestamp { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn padded_interval_timestamp_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "radzone_intervals.csv",
            "start, stop\n2000:003:15:27:47.271000, 2000:004:02:11:03.000000\n",
        );
        let err = load_intervals(&path, &IntervalColumns::default()).unwrap_err();
        match err {
            RzError::InvalidCell { row, column, .. } => {
                assert_eq!(row, 1);
                assert_eq!(column, "stop");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_interval_file() {
        let dir = TempDir::new().unwrap();
        let err = load_intervals(&dir.path().join("nope.csv"), &IntervalColumns::default())
            .unwrap_err();
        assert!(matches!(err, RzError::MissingInput(_)));
    }

    #[test]
    fn rejects_reversed_and_overlapping_intervals() {
        let t = |s: &str| parse_calendar(s).unwrap();
        let reversed = [RadzoneInterval {
            entry: t("2000:004:00:00:00.000000"),
            exit: t("2000:003:00:00:00.000000"),
        }];
        assert!(matches!(
            validate_intervals(&reversed),
            Err(RzError::InvalidInterval { index: 0, .. })
        ));

        let overlapping = [
            RadzoneInterval {
                entry: t("2000:003:00:00:00.000000"),
                exit: t("2000:003:12:00:00.000000"),
            },
            RadzoneInterval {
                entry: t("2000:003:06:00:00.000000"),
                exit: t("2000:003:18:00:00.000000"),
            },
        ];
        assert!(matches!(
            validate_intervals(&overlapping),
            Err(RzError::OverlappingIntervals {
                index: 1,
                previous: 0,
                ..
            })
        ));
    }

    #[test]
    fn touching_intervals_are_allowed() {
        let t = |s: &str| parse_calendar(s).unwrap();
        let intervals = [
            RadzoneInterval {
                entry: t("2000:003:00:00:00.000000"),
                exit: t("2000:003:12:00:00.000000"),
            },
            RadzoneInterval {
                entry: t("2000:003:12:00:00.000000"),
                exit: t("2000:003:18:00:00.000000"),
            },
        ];
        assert!(validate_intervals(&intervals).is_ok());
    }
}
