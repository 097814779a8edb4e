//! Bout duration analysis
//!
//! A bout is a run of consecutive observations holding the same state
//! (low: value < 1.0, high: value >= 1.0) over a column's daily values.
//! Gaps up to [`BOUT_CONTINUE_GAP`] days keep a bout alive; gaps beyond
//! [`BOUT_CENSOR_GAP`] days censor it, capping its end a few days past the
//! last observation.

use std::collections::HashMap;

use serde::Serialize;

use crate::frame::DailyFrame;

/// Largest day gap between observations that continues a bout
pub const BOUT_CONTINUE_GAP: usize = 6;

/// Day gap beyond which a bout is censored rather than switched
pub const BOUT_CENSOR_GAP: usize = 8;

/// Days a censored or single-observation bout extends past its last observation
pub const BOUT_TAIL_DAYS: usize = 3;

/// Bout durations and censored-end counts for one column
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainBouts {
    /// Durations (days) of low bouts (value < 1.0)
    pub low: Vec<f64>,
    /// Durations (days) of high bouts (value >= 1.0)
    pub high: Vec<f64>,
    /// Low bouts terminated by a censoring gap
    pub low_ends: u32,
    /// High bouts terminated by a censoring gap
    pub high_ends: u32,
}

/// Bout analysis over the named frame columns. Columns with no observations
/// are absent from the result.
pub fn domain_bouts(frame: &DailyFrame, domains: &[String]) -> HashMap<String, DomainBouts> {
    let mut results = HashMap::new();
    for name in domains {
        let Some(values) = frame.column(name) else {
            continue;
        };
        if let Some(bouts) = series_bouts(values) {
            results.insert(name.clone(), bouts);
        }
    }
    results
}

/// Bout analysis over one daily series; `None` when nothing is observed.
/// Row index is the day coordinate.
pub fn series_bouts(values: &[Option<f64>]) -> Option<DomainBouts> {
    let mut observed = values
        .iter()
        .enumerate()
        .filter_map(|(day, value)| value.map(|v| (day, v)));

    let (first_day, first_value) = observed.next()?;
    let mut last_day = first_day;
    let mut last_low = first_value < 1.0;

    let mut bout_start = first_day;
    let mut bout_end = first_day;
    let mut bout_extended = false;

    let mut bouts = DomainBouts::default();

    let close = |bouts: &mut DomainBouts, start: usize, end: usize, extended: bool, low: bool| {
        // A bout holding a single observation gets a nominal tail
        let duration = if extended {
            (end - start) as f64
        } else {
            BOUT_TAIL_DAYS as f64
        };
        if low {
            bouts.low.push(duration);
        } else {
            bouts.high.push(duration);
        }
    };

    for (day, value) in observed {
        let low = value < 1.0;

        if low == last_low && day - last_day <= BOUT_CONTINUE_GAP {
            bout_end = day;
            bout_extended = true;
        } else {
            if day - last_day > BOUT_CENSOR_GAP {
                // Observation gap too wide: cap the bout shortly past its
                // last observation and count it as censored
                bout_end = last_day + BOUT_TAIL_DAYS;
                bout_extended = true;
                if last_low {
                    bouts.low_ends += 1;
                } else {
                    bouts.high_ends += 1;
                }
            } else {
                // A state switch (or a 7-8 day same-state gap) closes the
                // bout at the current observation
                bout_end = day;
                bout_extended = true;
            }
            close(&mut bouts, bout_start, bout_end, bout_extended, last_low);

            bout_start = day;
            bout_end = day;
            bout_extended = false;
        }

        last_day = day;
        last_low = low;
    }

    close(&mut bouts, bout_start, bout_end, bout_extended, last_low);
    Some(bouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn series(values: &[(usize, f64)], len: usize) -> Vec<Option<f64>> {
        let mut out = vec![None; len];
        for (day, value) in values {
            out[*day] = Some(*value);
        }
        out
    }

    #[test]
    fn test_single_state_run() {
        // Low run over days 0..=4
        let values = series(&[(0, 0.2), (1, 0.3), (2, 0.1), (3, 0.4), (4, 0.2)], 5);
        let bouts = series_bouts(&values).unwrap();
        assert_eq!(bouts.low, vec![4.0]);
        assert!(bouts.high.is_empty());
        assert_eq!(bouts.low_ends, 0);
    }

    #[test]
    fn test_state_switch_closes_at_switch_day() {
        let values = series(&[(0, 0.2), (2, 0.3), (4, 1.5), (6, 1.8)], 7);
        let bouts = series_bouts(&values).unwrap();
        // Low bout spans day 0 to the switch at day 4
        assert_eq!(bouts.low, vec![4.0]);
        // High bout spans day 4 to 6
        assert_eq!(bouts.high, vec![2.0]);
    }

    #[test]
    fn test_small_gap_continues_bout() {
        // 6-day gap still continues
        let values = series(&[(0, 0.2), (6, 0.3)], 7);
        let bouts = series_bouts(&values).unwrap();
        assert_eq!(bouts.low, vec![6.0]);
    }

    #[test]
    fn test_censoring_gap_caps_bout() {
        // 9-day gap censors; bout capped 3 days past its last observation
        let values = series(&[(0, 0.2), (1, 0.3), (10, 0.4), (11, 0.2)], 12);
        let bouts = series_bouts(&values).unwrap();
        // First bout: days 0..1 capped to 1 + 3 = day 4 → duration 4
        // Second bout: days 10..11 → duration 1
        assert_eq!(bouts.low, vec![4.0, 1.0]);
        assert_eq!(bouts.low_ends, 1);
        assert_eq!(bouts.high_ends, 0);
    }

    #[test]
    fn test_single_observation_gets_nominal_tail() {
        let values = series(&[(0, 1.5)], 1);
        let bouts = series_bouts(&values).unwrap();
        assert_eq!(bouts.high, vec![BOUT_TAIL_DAYS as f64]);
    }

    #[test]
    fn test_trailing_single_observation_bout() {
        // Switch at day 2 opens a high bout that never extends
        let values = series(&[(0, 0.2), (2, 1.5)], 3);
        let bouts = series_bouts(&values).unwrap();
        assert_eq!(bouts.low, vec![2.0]);
        assert_eq!(bouts.high, vec![BOUT_TAIL_DAYS as f64]);
    }

    #[test]
    fn test_empty_series() {
        assert_eq!(series_bouts(&[None, None]), None);
    }

    #[test]
    fn test_domain_bouts_skips_unknown_and_empty() {
        use crate::frame::Column;
        let frame = DailyFrame {
            participant: "p1".to_string(),
            dates: vec![Default::default(); 3],
            columns: vec![
                Column {
                    name: "Mood".to_string(),
                    values: vec![Some(0.5), Some(0.6), Some(0.7)],
                },
                Column {
                    name: "Sleep".to_string(),
                    values: vec![None, None, None],
                },
            ],
        };

        let results = domain_bouts(
            &frame,
            &["Mood".to_string(), "Sleep".to_string(), "Absent".to_string()],
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results["Mood"].low, vec![2.0]);
    }
}
