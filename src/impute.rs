//! Weighted-window imputation
//!
//! Fills each frame cell with a weighted average of its neighborhood: a
//! seven-tap kernel centered on the cell, re-normalized over whichever
//! neighbors are actually observed. Cells whose whole window is missing
//! stay missing.

use crate::frame::DailyFrame;

/// Seven-tap weight kernel centered on the target row
pub const IMPUTE_KERNEL: [f64; 7] = [0.05, 0.20, 0.40, 1.5, 0.4, 0.20, 0.05];

/// Kernel index aligned with the target row
const KERNEL_CENTER: usize = 3;

/// Impute the named columns in place. Unknown column names are skipped.
pub fn impute_frame(frame: &mut DailyFrame, domains: &[String]) {
    for name in domains {
        if let Some(values) = frame.column_mut(name) {
            *values = impute_series(values);
        }
    }
}

/// Impute one series with the weighted window
pub fn impute_series(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let len = values.len();
    (0..len)
        .map(|row| {
            let start = row.saturating_sub(KERNEL_CENTER);
            let end = (row + KERNEL_CENTER + 1).min(len);

            let mut weighted = 0.0;
            let mut weight_total = 0.0;
            for (index, value) in values[start..end].iter().enumerate() {
                if let Some(value) = value {
                    let weight = IMPUTE_KERNEL[KERNEL_CENTER + (start + index) - row];
                    weighted += value * weight;
                    weight_total += weight;
                }
            }

            if weight_total == 0.0 {
                None
            } else {
                Some(weighted / weight_total)
            }
        })
        .collect()
}
