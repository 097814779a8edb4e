//! State-transition counts
//!
//! Labels every bin cell as in-range (`< 1.0`) or out-of-range and counts
//! transitions between consecutive labeled bins. Under the normalized
//! convention, "in" means within one standard deviation of the participant's
//! mean. Domains can be counted jointly: a group of `joint_size` columns
//! yields labels over the joint state space.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::bins::BinnedFrame;
use crate::error::FeatureError;

/// Bin-index gap beyond which consecutive observations do not count as a
/// transition
pub const MAX_BIN_GAP: usize = 3;

/// Cell state relative to the in-range threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    In,
    Out,
}

impl State {
    /// Threshold convention: values under 1.0 are in range
    pub fn of(value: f64) -> State {
        if value < 1.0 {
            State::In
        } else {
            State::Out
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            State::In => "in",
            State::Out => "out",
        }
    }
}

/// Joint state over a domain group
pub type StateLabel = Vec<State>;

/// Render a joint label for reports ("in+out")
pub fn label_string(label: &[State]) -> String {
    label
        .iter()
        .map(State::as_str)
        .collect::<Vec<_>>()
        .join("+")
}

/// Square table of transition counts over the joint state space
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTable {
    level: usize,
    counts: HashMap<(StateLabel, StateLabel), u32>,
}

impl TransitionTable {
    /// Empty table with every label pair present at zero
    pub fn new(level: usize) -> Self {
        let labels = enumerate_labels(level);
        let mut counts = HashMap::new();
        for from in &labels {
            for to in &labels {
                counts.insert((from.clone(), to.clone()), 0);
            }
        }
        Self { level, counts }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    fn record(&mut self, from: StateLabel, to: StateLabel) {
        *self.counts.entry((from, to)).or_insert(0) += 1;
    }

    pub fn count(&self, from: &[State], to: &[State]) -> u32 {
        self.counts
            .get(&(from.to_vec(), to.to_vec()))
            .copied()
            .unwrap_or(0)
    }

    /// Total transitions recorded
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// String-keyed form for JSON reports
    pub fn to_report(&self) -> BTreeMap<String, BTreeMap<String, u32>> {
        let mut report: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
        for ((from, to), count) in &self.counts {
            report
                .entry(label_string(from))
                .or_default()
                .insert(label_string(to), *count);
        }
        report
    }
}

/// All joint labels at `level`
fn enumerate_labels(level: usize) -> Vec<StateLabel> {
    let mut labels: Vec<StateLabel> = vec![Vec::new()];
    for _ in 0..level {
        labels = labels
            .into_iter()
            .flat_map(|label| {
                [State::In, State::Out].into_iter().map(move |state| {
                    let mut next = label.clone();
                    next.push(state);
                    next
                })
            })
            .collect();
    }
    labels
}

/// Count transitions for every `joint_size` combination of `domains`.
///
/// A transition is counted between consecutive bins where every column in the
/// group is present and the bin-index gap is at most [`MAX_BIN_GAP`].
pub fn transition_tables(
    bins: &BinnedFrame,
    domains: &[String],
    joint_size: usize,
) -> Result<HashMap<Vec<String>, TransitionTable>, FeatureError> {
    if joint_size == 0 || joint_size > domains.len() {
        return Ok(HashMap::new());
    }
    for name in domains {
        if bins.column(name).is_none() {
            return Err(FeatureError::UnknownColumn(name.clone()));
        }
    }

    let mut tables = HashMap::new();
    for group in combinations(domains, joint_size) {
        let mut table = TransitionTable::new(joint_size);

        // Bin indices where the whole group is present, with joint labels
        let columns: Vec<&[Option<f64>]> =
            group.iter().filter_map(|name| bins.column(name)).collect();
        let labeled: Vec<(usize, StateLabel)> = (0..bins.len())
            .filter_map(|row| {
                let label: Option<StateLabel> = columns
                    .iter()
                    .map(|col| col[row].map(State::of))
                    .collect();
                label.map(|label| (row, label))
            })
            .collect();

        for pair in labeled.windows(2) {
            let (last_index, ref last_label) = pair[0];
            let (index, ref label) = pair[1];
            if index - last_index <= MAX_BIN_GAP {
                table.record(last_label.clone(), label.clone());
            }
        }

        tables.insert(group, table);
    }
    Ok(tables)
}

/// Lexicographic k-combinations preserving input order
fn combinations(items: &[String], k: usize) -> Vec<Vec<String>> {
    fn recurse(items: &[String], k: usize, start: usize, current: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for index in start..items.len() {
            current.push(items[index].clone());
            recurse(items, k, index + 1, current, out);
            current.pop();
        }
    }
    let mut out = Vec::new();
    recurse(items, k, 0, &mut Vec::new(), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::BinRange;
    use crate::frame::Column;
    use pretty_assertions::assert_eq;

    fn make_bins(columns: Vec<(&str, Vec<Option<f64>>)>) -> BinnedFrame {
        let len = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        BinnedFrame {
            participant: "p1".to_string(),
            ranges: vec![
                BinRange {
                    start: Default::default(),
                    end: Default::default(),
                };
                len
            ],
            columns: columns
                .into_iter()
                .map(|(name, values)| Column {
                    name: name.to_string(),
                    values,
                })
                .collect(),
        }
    }

    #[test]
    fn test_state_threshold() {
        assert_eq!(State::of(0.99), State::In);
        assert_eq!(State::of(1.0), State::Out);
        assert_eq!(State::of(-2.0), State::In);
    }

    #[test]
    fn test_single_domain_counts() {
        let bins = make_bins(vec![(
            "Mood",
            vec![Some(0.5), Some(1.5), Some(1.5), Some(0.2)],
        )]);
        let tables = transition_tables(&bins, &["Mood".to_string()], 1).unwrap();
        let table = &tables[&vec!["Mood".to_string()]];

        assert_eq!(table.count(&[State::In], &[State::Out]), 1);
        assert_eq!(table.count(&[State::Out], &[State::Out]), 1);
        assert_eq!(table.count(&[State::Out], &[State::In]), 1);
        assert_eq!(table.count(&[State::In], &[State::In]), 0);
        assert_eq!(table.total(), 3);
    }

    #[test]
    fn test_missing_bins_are_skipped_but_bridged() {
        // Gap of 2 bin indices bridges; labels at 0 and 2
        let bins = make_bins(vec![("Mood", vec![Some(0.5), None, Some(1.5)])]);
        let tables = transition_tables(&bins, &["Mood".to_string()], 1).unwrap();
        let table = &tables[&vec!["Mood".to_string()]];
        assert_eq!(table.count(&[State::In], &[State::Out]), 1);
    }

    #[test]
    fn test_wide_gaps_do_not_count() {
        let bins = make_bins(vec![(
            "Mood",
            vec![Some(0.5), None, None, None, Some(1.5)],
        )]);
        let tables = transition_tables(&bins, &["Mood".to_string()], 1).unwrap();
        assert_eq!(tables[&vec!["Mood".to_string()]].total(), 0);
    }

    #[test]
    fn test_joint_labels() {
        let bins = make_bins(vec![
            ("Mood", vec![Some(0.5), Some(1.5)]),
            ("Sleep", vec![Some(1.5), Some(1.5)]),
        ]);
        let domains = vec!["Mood".to_string(), "Sleep".to_string()];
        let tables = transition_tables(&bins, &domains, 2).unwrap();
        let table = &tables[&domains];

        assert_eq!(
            table.count(&[State::In, State::Out], &[State::Out, State::Out]),
            1
        );
        assert_eq!(table.total(), 1);
    }

    #[test]
    fn test_joint_requires_all_columns_present() {
        let bins = make_bins(vec![
            ("Mood", vec![Some(0.5), Some(0.5), Some(0.5)]),
            ("Sleep", vec![Some(0.5), None, Some(0.5)]),
        ]);
        let domains = vec!["Mood".to_string(), "Sleep".to_string()];
        let tables = transition_tables(&bins, &domains, 2).unwrap();
        // Row 1 drops for the joint group; rows 0 and 2 bridge
        assert_eq!(tables[&domains].total(), 1);
    }

    #[test]
    fn test_pairwise_combinations() {
        let bins = make_bins(vec![
            ("A", vec![Some(0.5), Some(0.5)]),
            ("B", vec![Some(0.5), Some(0.5)]),
            ("C", vec![Some(0.5), Some(0.5)]),
        ]);
        let domains = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let tables = transition_tables(&bins, &domains, 2).unwrap();
        assert_eq!(tables.len(), 3);
    }

    #[test]
    fn test_unknown_domain_errors() {
        let bins = make_bins(vec![("Mood", vec![Some(0.5)])]);
        let result = transition_tables(&bins, &["Nope".to_string()], 1);
        assert!(matches!(result, Err(FeatureError::UnknownColumn(_))));
    }

    #[test]
    fn test_report_keys() {
        let table = TransitionTable::new(2);
        let report = table.to_report();
        assert_eq!(report.len(), 4);
        assert!(report.contains_key("in+out"));
        assert_eq!(report["in+out"]["out+in"], 0);
    }
}
