//! Daily feature frame
//!
//! Buckets locally-aligned survey scores into a fixed-resolution date grid,
//! one row per grid date, one column per survey category. The grid spans the
//! observed data range (or caller overrides), optionally snapped to Monday
//! and to a 09:00 morning edge, and capped at `days_cap` days.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;
use crate::types::{Localized, ScoredSurveyPoint};

/// Default cap on the number of days a frame spans
pub const DEFAULT_DAYS_CAP: i64 = 120;

/// Hour the frame edges snap to under `start_morning`
pub const MORNING_HOUR: u32 = 9;

/// Options controlling the date grid and survey collation
#[derive(Debug, Clone)]
pub struct FrameOptions {
    /// Maximum number of days the grid spans
    pub days_cap: i64,
    /// Override for the first grid day
    pub day_first: Option<NaiveDate>,
    /// Override for the last grid day
    pub day_last: Option<NaiveDate>,
    /// Grid resolution (one row per this much time)
    pub resolution: Duration,
    /// Walk the first day back to the preceding Monday
    pub start_monday: bool,
    /// Snap both edges to 09:00
    pub start_morning: bool,
    /// Match survey points to the closest grid date instead of the preceding one
    pub time_centered: bool,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            days_cap: DEFAULT_DAYS_CAP,
            day_first: None,
            day_last: None,
            resolution: Duration::days(1),
            start_monday: false,
            start_morning: true,
            time_centered: false,
        }
    }
}

/// One named feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// One cell per grid date; `None` where no data landed
    pub values: Vec<Option<f64>>,
}

/// Per-participant daily feature frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyFrame {
    /// Participant the frame belongs to
    pub participant: String,
    /// Grid dates, ascending
    pub dates: Vec<NaiveDateTime>,
    pub columns: Vec<Column>,
}

impl DailyFrame {
    /// Number of grid rows
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<Option<f64>>> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| &mut c.values)
    }

    /// Restrict the frame to a predetermined domain list. Unknown names are
    /// ignored; column order follows the requested list.
    pub fn retain_columns(&mut self, domains: &[String]) {
        let mut kept = Vec::new();
        for name in domains {
            if let Some(index) = self.columns.iter().position(|c| &c.name == name) {
                kept.push(self.columns.remove(index));
            }
        }
        self.columns = kept;
    }
}

/// Build a daily frame from localized survey series.
///
/// `sensor_datetimes` contributes passive-stream datetimes to the observed
/// range so frames cover days with sensing but no self-report. Returns
/// [`FeatureError::NoData`] when nothing bounds the grid.
pub fn build_frame(
    participant: &str,
    surveys: &HashMap<String, Vec<Localized<ScoredSurveyPoint>>>,
    sensor_datetimes: &[NaiveDateTime],
    options: &FrameOptions,
) -> Result<DailyFrame, FeatureError> {
    let (day_first, day_last) = grid_bounds(surveys, sensor_datetimes, options)?;
    let dates = date_grid(day_first, day_last, options);

    // Deterministic column order regardless of map iteration
    let ordered: BTreeMap<&String, &Vec<Localized<ScoredSurveyPoint>>> = surveys.iter().collect();

    let mut columns = Vec::with_capacity(ordered.len());
    for (name, points) in ordered {
        columns.push(Column {
            name: name.clone(),
            values: collate(points, &dates, day_first, day_last, options.time_centered),
        });
    }

    Ok(DailyFrame {
        participant: participant.to_string(),
        dates,
        columns,
    })
}

/// Resolve the grid edges from data and options
fn grid_bounds(
    surveys: &HashMap<String, Vec<Localized<ScoredSurveyPoint>>>,
    sensor_datetimes: &[NaiveDateTime],
    options: &FrameOptions,
) -> Result<(NaiveDateTime, NaiveDateTime), FeatureError> {
    let observed = surveys
        .values()
        .flatten()
        .map(|p| p.time.local_datetime)
        .chain(sensor_datetimes.iter().copied());

    let (observed_min, observed_max) = observed.fold((None, None), |(min, max), dt| {
        (
            Some(min.map_or(dt, |m: NaiveDateTime| m.min(dt))),
            Some(max.map_or(dt, |m: NaiveDateTime| m.max(dt))),
        )
    });

    let mut day_first = match options.day_first {
        Some(date) => start_of_day(date),
        None => observed_min.ok_or_else(|| FeatureError::NoData("no observed events".into()))?,
    };
    let mut day_last = match options.day_last {
        Some(date) => start_of_day(date),
        None => observed_max.ok_or_else(|| FeatureError::NoData("no observed events".into()))?,
    };

    if options.start_monday {
        let weekday = day_first.weekday().num_days_from_monday() as i64;
        if weekday > 0 {
            day_first -= Duration::days(weekday);
        }
    }

    if options.start_morning {
        day_first = at_morning(day_first);
        day_last = at_morning(day_last);
    }

    if day_last < day_first {
        return Err(FeatureError::DateRangeError(format!(
            "last day {day_last} precedes first day {day_first}"
        )));
    }

    Ok((day_first, day_last))
}

/// Build the date grid between the edges at the configured resolution
fn date_grid(day_first: NaiveDateTime, day_last: NaiveDateTime, options: &FrameOptions) -> Vec<NaiveDateTime> {
    let days_elapsed = (day_last - day_first).num_days().max(0);
    let span_ms = days_elapsed.min(options.days_cap) as f64 * Duration::days(1).num_milliseconds() as f64;
    let resolution_ms = options.resolution.num_milliseconds() as f64;
    if resolution_ms <= 0.0 {
        return Vec::new();
    }
    let rows = (span_ms / resolution_ms).ceil() as i64;

    (0..rows)
        .map(|i| day_first + options.resolution * i as i32)
        .collect()
}

/// Bucket one survey series onto the grid: points outside the window drop,
/// each remaining point maps to a grid date, co-dated points average.
fn collate(
    points: &[Localized<ScoredSurveyPoint>],
    dates: &[NaiveDateTime],
    day_first: NaiveDateTime,
    day_last: NaiveDateTime,
    time_centered: bool,
) -> Vec<Option<f64>> {
    let mut sums = vec![0.0; dates.len()];
    let mut counts = vec![0usize; dates.len()];

    for point in points {
        let dt = point.time.local_datetime;
        if dt < day_first || dt > day_last {
            continue;
        }
        let index = if time_centered {
            closest_index(dates, dt)
        } else {
            preceding_index(dates, dt)
        };
        if let Some(index) = index {
            sums[index] += point.inner.score;
            counts[index] += 1;
        }
    }

    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            if count == 0 {
                None
            } else {
                Some(sum / count as f64)
            }
        })
        .collect()
}

/// Last grid date at or before `dt`
fn preceding_index(dates: &[NaiveDateTime], dt: NaiveDateTime) -> Option<usize> {
    let after = dates.partition_point(|d| *d <= dt);
    after.checked_sub(1)
}

/// Grid date minimizing |dt - date|
fn closest_index(dates: &[NaiveDateTime], dt: NaiveDateTime) -> Option<usize> {
    dates
        .iter()
        .enumerate()
        .min_by_key(|(_, d)| (dt - **d).num_milliseconds().abs())
        .map(|(i, _)| i)
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

fn at_morning(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_hms_opt(MORNING_HOUR, 0, 0).unwrap_or(dt)
}
