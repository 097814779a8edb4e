//! Multi-day binning
//!
//! Collapses the daily frame into consecutive multi-day windows (bins),
//! averaging each column over the rows the bin covers. Bins can be aligned
//! to open on a fixed weekday; rows before the first aligned day drop.

use chrono::{Datelike, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::frame::{Column, DailyFrame};

/// Default bin width in frame rows
pub const DEFAULT_BIN_WINDOW: usize = 3;

/// Options controlling bin width and weekday alignment
#[derive(Debug, Clone)]
pub struct BinOptions {
    /// Bin width in frame rows
    pub window_size: usize,
    /// Weekday bins open on; `None` bins from the first row
    pub start_weekday: Option<Weekday>,
}

impl Default for BinOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_BIN_WINDOW,
            start_weekday: Some(Weekday::Mon),
        }
    }
}

/// Date span one bin covers (first and last contributing grid dates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// The daily frame collapsed into bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedFrame {
    pub participant: String,
    /// One range per bin, ascending
    pub ranges: Vec<BinRange>,
    pub columns: Vec<Column>,
}

impl BinnedFrame {
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Collapse a daily frame into bins
pub fn bin_frame(frame: &DailyFrame, options: &BinOptions) -> BinnedFrame {
    let offset = match options.start_weekday {
        Some(weekday) => alignment_offset(&frame.dates, weekday),
        None => 0,
    };
    let window = options.window_size.max(1);

    let dates = &frame.dates[offset.min(frame.dates.len())..];
    let ranges: Vec<BinRange> = dates
        .chunks(window)
        .map(|chunk| BinRange {
            start: chunk[0],
            end: chunk[chunk.len() - 1],
        })
        .collect();

    let columns = frame
        .columns
        .iter()
        .map(|column| Column {
            name: column.name.clone(),
            values: column.values[offset.min(column.values.len())..]
                .chunks(window)
                .map(mean_of_present)
                .collect(),
        })
        .collect();

    BinnedFrame {
        participant: frame.participant.clone(),
        ranges,
        columns,
    }
}

/// Fill interior missing bins whose two neighbors are both present with the
/// neighbor mean.
pub fn impute_bins(bins: &mut BinnedFrame, domains: &[String]) {
    for name in domains {
        let Some(column) = bins.columns.iter_mut().find(|c| &c.name == name) else {
            continue;
        };
        let values = &mut column.values;
        for index in 1..values.len().saturating_sub(1) {
            if values[index].is_none() {
                if let (Some(before), Some(after)) = (values[index - 1], values[index + 1]) {
                    values[index] = Some((before + after) / 2.0);
                }
            }
        }
    }
}

/// Rows to skip so the first kept row falls on `weekday`. When no row does
/// (short frames), binning starts at row zero.
fn alignment_offset(dates: &[NaiveDateTime], weekday: Weekday) -> usize {
    dates
        .iter()
        .position(|d| d.weekday() == weekday)
        .unwrap_or(0)
}

fn mean_of_present(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}
