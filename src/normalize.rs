//! Column z-scoring
//!
//! Normalizes frame columns to zero mean and unit variance, either in-sample
//! or against caller-supplied cohort statistics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::frame::DailyFrame;

/// Mean and standard deviation for one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// In-sample statistics over the non-missing cells of the named columns.
/// Columns with fewer than two observations are omitted.
pub fn column_stats(frame: &DailyFrame, domains: &[String]) -> HashMap<String, ColumnStats> {
    let mut stats = HashMap::new();
    for name in domains {
        let Some(values) = frame.column(name) else {
            continue;
        };
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.len() < 2 {
            continue;
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        // sample standard deviation
        let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        stats.insert(
            name.clone(),
            ColumnStats {
                mean,
                std_dev: variance.sqrt(),
            },
        );
    }
    stats
}

/// Z-score the named columns in place. When `stats` is `None`, in-sample
/// statistics are used (participant-level normalization); supplying stats
/// normalizes against a cohort. Columns without usable statistics or with
/// zero deviation are left untouched.
pub fn normalize_frame(
    frame: &mut DailyFrame,
    domains: &[String],
    stats: Option<&HashMap<String, ColumnStats>>,
) {
    let in_sample;
    let stats = match stats {
        Some(stats) => stats,
        None => {
            in_sample = column_stats(frame, domains);
            &in_sample
        }
    };

    for name in domains {
        let Some(column_stats) = stats.get(name) else {
            continue;
        };
        if column_stats.std_dev == 0.0 || !column_stats.std_dev.is_finite() {
            continue;
        }
        if let Some(values) = frame.column_mut(name) {
            for value in values.iter_mut().flatten() {
                *value = (*value - column_stats.mean) / column_stats.std_dev;
            }
        }
    }
}
