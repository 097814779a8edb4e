//! Feature export
//!
//! Writes frames to CSV for downstream analysis and bundles the derived
//! feature reports into a JSON document stamped with a run id and the
//! crate version.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use serde::Serialize;
use uuid::Uuid;

use crate::bins::BinnedFrame;
use crate::bouts::DomainBouts;
use crate::error::FeatureError;
use crate::frame::DailyFrame;
use crate::trajectory::{DayClusters, TrajectoryMetric};
use crate::transitions::TransitionTable;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Write a daily frame as CSV: a `date` column followed by one column per
/// domain, empty cells where no value was observed.
pub fn frame_to_csv<W: Write>(frame: &DailyFrame, writer: W) -> Result<(), FeatureError> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec!["date".to_string()];
    header.extend(frame.column_names().iter().map(|n| n.to_string()));
    csv.write_record(&header)?;

    for (row, date) in frame.dates.iter().enumerate() {
        let mut record = vec![date.format(DATE_FORMAT).to_string()];
        for column in &frame.columns {
            record.push(cell(column.values.get(row).copied().flatten()));
        }
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

/// Write a binned frame as CSV with the bin span in `start`/`end` columns
pub fn bins_to_csv<W: Write>(bins: &BinnedFrame, writer: W) -> Result<(), FeatureError> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec!["start".to_string(), "end".to_string()];
    header.extend(bins.column_names().iter().map(|n| n.to_string()));
    csv.write_record(&header)?;

    for (row, range) in bins.ranges.iter().enumerate() {
        let mut record = vec![
            range.start.format(DATE_FORMAT).to_string(),
            range.end.format(DATE_FORMAT).to_string(),
        ];
        for column in &bins.columns {
            record.push(cell(column.values.get(row).copied().flatten()));
        }
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

/// Derived features for one participant, bundled for serialization
#[derive(Debug, Serialize)]
pub struct FeatureReport {
    pub participant: String,
    /// Unique id for this pipeline run
    pub run_id: String,
    pub producer: &'static str,
    /// Crate version that produced the report
    pub version: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub bouts: BTreeMap<String, DomainBouts>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub transitions: BTreeMap<String, BTreeMap<String, BTreeMap<String, u32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<TrajectoryReport>,
}

/// Day-trajectory clustering results
#[derive(Debug, Serialize)]
pub struct TrajectoryReport {
    pub metric: TrajectoryMetric,
    pub day_count: usize,
    pub cluster_count: usize,
    pub routine_index: f64,
    /// Cluster id per trajectory day, in date order
    pub assignments: Vec<usize>,
}

impl TrajectoryReport {
    pub fn new(metric: TrajectoryMetric, clusters: DayClusters) -> Self {
        Self {
            metric,
            day_count: clusters.assignments.len(),
            cluster_count: clusters.cluster_count,
            routine_index: clusters.routine_index,
            assignments: clusters.assignments,
        }
    }
}

impl FeatureReport {
    pub fn new(participant: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            run_id: Uuid::new_v4().to_string(),
            producer: crate::PRODUCER_NAME,
            version: crate::PHENOFLOW_VERSION,
            bouts: BTreeMap::new(),
            transitions: BTreeMap::new(),
            trajectory: None,
        }
    }

    pub fn with_bouts(mut self, bouts: HashMap<String, DomainBouts>) -> Self {
        self.bouts = bouts.into_iter().collect();
        self
    }

    /// Attach transition tables, keyed by the joined domain-group name
    pub fn with_transitions(mut self, tables: HashMap<Vec<String>, TransitionTable>) -> Self {
        self.transitions = tables
            .into_iter()
            .map(|(group, table)| (group.join("+"), table.to_report()))
            .collect();
        self
    }

    pub fn with_trajectory(mut self, trajectory: TrajectoryReport) -> Self {
        self.trajectory = Some(trajectory);
        self
    }

    pub fn to_json(&self) -> Result<String, FeatureError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
