//! Pipeline orchestration
//!
//! This module provides the public API for phenoflow. A [`ParticipantPipeline`]
//! pulls a participant's raw streams from an [`EventSource`], aligns them to
//! local time, scores surveys, and assembles the daily feature frame. The
//! resulting [`Participant`] carries the frame through the derived stages
//! (imputation, binning, normalization) and exposes the feature reports.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use log::{debug, info};

use crate::bins::{bin_frame, impute_bins, BinOptions, BinnedFrame};
use crate::bouts::{domain_bouts, DomainBouts};
use crate::client::{fetch_all_activity_events, fetch_all_sensor_events, EventSource};
use crate::error::FeatureError;
use crate::frame::{build_frame, DailyFrame, FrameOptions};
use crate::impute::impute_frame;
use crate::localize::{Localizer, TimezoneLookup};
use crate::normalize::{normalize_frame, ColumnStats};
use crate::surveys::{score_surveys, QuestionCategories};
use crate::trajectory::{day_trajectories, distance_matrix, DayTrajectory, TrajectoryMetric};
use crate::transitions::{transition_tables, TransitionTable};
use crate::types::{
    Activity, ActivityEvent, GpsPoint, Localized, ScoredSurveyPoint, SensorEvent, SensorKind,
};

/// A participant's assembled data: raw streams, the daily frame, and the
/// derived stages computed so far.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    /// Feature domains to derive over; `None` derives over every frame column
    pub domains: Option<Vec<String>>,
    /// Raw sensor streams by kind; empty streams are dropped at fetch time
    pub sensor_events: HashMap<SensorKind, Vec<SensorEvent>>,
    pub activities: Vec<Activity>,
    pub activity_events: Vec<ActivityEvent>,
    /// GPS fixes aligned to the zone they were recorded in
    pub gps: Vec<Localized<GpsPoint>>,
    /// Locally-aligned survey score series by category
    pub surveys: HashMap<String, Vec<Localized<ScoredSurveyPoint>>>,
    pub frame: Option<DailyFrame>,
    pub bins: Option<BinnedFrame>,
    /// Local sensor timestamps that bound the grid, kept so the frame can be
    /// rebuilt
    sensor_datetimes: Vec<NaiveDateTime>,
    /// Grid options the frame was built with
    options: FrameOptions,
    imputed: bool,
    normalized: bool,
}

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domains: None,
            sensor_events: HashMap::new(),
            activities: Vec::new(),
            activity_events: Vec::new(),
            gps: Vec::new(),
            surveys: HashMap::new(),
            frame: None,
            bins: None,
            sensor_datetimes: Vec::new(),
            options: FrameOptions::default(),
            imputed: false,
            normalized: false,
        }
    }

    /// Build the daily frame from the localized surveys and sensor timestamps
    fn rebuild_frame(&mut self) -> Result<(), FeatureError> {
        let mut frame = build_frame(&self.id, &self.surveys, &self.sensor_datetimes, &self.options)?;
        if let Some(domains) = &self.domains {
            frame.retain_columns(domains);
        }
        self.frame = Some(frame);
        Ok(())
    }

    /// Domains derived stages run over: the configured list, or every frame
    /// column when none was set.
    pub fn domain_list(&self) -> Result<Vec<String>, FeatureError> {
        if let Some(domains) = &self.domains {
            return Ok(domains.clone());
        }
        match &self.frame {
            Some(frame) => Ok(frame
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect()),
            None => Err(FeatureError::MissingDomains),
        }
    }

    fn frame_mut(&mut self) -> Result<&mut DailyFrame, FeatureError> {
        self.frame
            .as_mut()
            .ok_or_else(|| FeatureError::NoData(self.id.clone()))
    }

    fn frame_ref(&self) -> Result<&DailyFrame, FeatureError> {
        self.frame
            .as_ref()
            .ok_or_else(|| FeatureError::NoData(self.id.clone()))
    }

    /// Fill frame gaps with the weighted-kernel imputation. Calling this more
    /// than once is a no-op.
    pub fn impute(&mut self) -> Result<(), FeatureError> {
        if self.imputed {
            return Ok(());
        }
        let domains = self.domain_list()?;
        impute_frame(self.frame_mut()?, &domains);
        self.imputed = true;
        Ok(())
    }

    /// Collapse the frame into bins, then fill interior bin gaps from their
    /// neighbors.
    pub fn bin(&mut self, options: &BinOptions) -> Result<(), FeatureError> {
        let domains = self.domain_list()?;
        let mut bins = bin_frame(self.frame_ref()?, options);
        impute_bins(&mut bins, &domains);
        self.bins = Some(bins);
        Ok(())
    }

    /// Z-score the frame columns, against cohort statistics when supplied.
    /// Calling this more than once is a no-op.
    pub fn normalize(
        &mut self,
        stats: Option<&HashMap<String, ColumnStats>>,
    ) -> Result<(), FeatureError> {
        if self.normalized {
            return Ok(());
        }
        let domains = self.domain_list()?;
        normalize_frame(self.frame_mut()?, &domains, stats);
        self.normalized = true;
        Ok(())
    }

    /// Discard derived state and rebuild the frame from the localized streams
    pub fn reset(&mut self) -> Result<(), FeatureError> {
        self.bins = None;
        self.imputed = false;
        self.normalized = false;
        self.rebuild_frame()
    }

    /// Bout durations per domain over the daily frame
    pub fn bouts(&self) -> Result<HashMap<String, DomainBouts>, FeatureError> {
        let domains = self.domain_list()?;
        Ok(domain_bouts(self.frame_ref()?, &domains))
    }

    /// In/out transition counts over the binned frame for every domain group
    /// of `joint_size`
    pub fn transitions(
        &self,
        joint_size: usize,
    ) -> Result<HashMap<Vec<String>, TransitionTable>, FeatureError> {
        let bins = self.bins.as_ref().ok_or(FeatureError::NotBinned)?;
        let domains = self.domain_list()?;
        transition_tables(bins, &domains, joint_size)
    }

    /// GPS fixes grouped into day trajectories
    pub fn trajectories(&self) -> Vec<DayTrajectory> {
        day_trajectories(&self.gps)
    }

    /// Pairwise day-trajectory distances under `metric`
    pub fn trajectory_matrix(&self, metric: TrajectoryMetric) -> Vec<Vec<f64>> {
        distance_matrix(&self.trajectories(), metric)
    }
}

/// Assembles [`Participant`]s from an event source.
pub struct ParticipantPipeline<'a> {
    source: &'a dyn EventSource,
    lookup: &'a dyn TimezoneLookup,
    fallback: Tz,
    options: FrameOptions,
    categories: Option<QuestionCategories>,
    domains: Option<Vec<String>>,
}

impl<'a> ParticipantPipeline<'a> {
    pub fn new(source: &'a dyn EventSource, lookup: &'a dyn TimezoneLookup, fallback: Tz) -> Self {
        Self {
            source,
            lookup,
            fallback,
            options: FrameOptions::default(),
            categories: None,
            domains: None,
        }
    }

    /// Override the frame grid options
    pub fn with_options(mut self, options: FrameOptions) -> Self {
        self.options = options;
        self
    }

    /// Score surveys against a question-to-category mapping instead of
    /// grouping by survey name
    pub fn with_categories(mut self, categories: QuestionCategories) -> Self {
        self.categories = Some(categories);
        self
    }

    /// Restrict the frame and derived stages to these domains
    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = Some(domains);
        self
    }

    /// Fetch, localize, score, and frame one participant's data over the
    /// window `[from, to)` in UTC milliseconds.
    pub fn run(
        &self,
        participant_id: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Participant, FeatureError> {
        let mut participant = Participant::new(participant_id);
        participant.domains = self.domains.clone();

        for kind in SensorKind::ALL {
            let events =
                fetch_all_sensor_events(self.source, participant_id, kind.origin(), from, to)?;
            if events.is_empty() {
                debug!("{participant_id}: no {} events, dropping stream", kind.origin());
                continue;
            }
            participant.sensor_events.insert(kind, events);
        }

        participant.activities = self.source.activities(participant_id)?;
        participant.activity_events =
            fetch_all_activity_events(self.source, participant_id, from, to)?;

        let localizer = Localizer::new(self.lookup, self.fallback);

        let gps_points: Vec<GpsPoint> = participant
            .sensor_events
            .get(&SensorKind::Gps)
            .map(|events| events.iter().filter_map(|e| e.gps_point()).collect())
            .unwrap_or_default();
        participant.gps = localizer.localize_gps(&gps_points);

        let scored = score_surveys(
            &participant.activities,
            &participant.activity_events,
            self.categories.as_ref(),
        );
        participant.surveys = scored
            .into_iter()
            .map(|(category, points)| {
                let localized = localizer.localize_survey(&points, &participant.gps);
                (category, localized)
            })
            .collect();

        // Passive streams bound the grid so sensing-only days are covered
        participant.sensor_datetimes = participant
            .sensor_events
            .values()
            .flatten()
            .map(|e| localizer.localize_timestamp(e.timestamp, &participant.gps).local_datetime)
            .collect();
        participant.options = self.options.clone();

        participant.rebuild_frame()?;
        if let Some(frame) = &participant.frame {
            info!(
                "{participant_id}: frame with {} rows, {} columns",
                frame.len(),
                frame.columns.len()
            );
        }
        Ok(participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StaticSource;
    use crate::localize::FixedTimezone;
    use crate::types::TemporalSlice;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const DAY_MS: i64 = 86_400_000;
    // 2021-03-01 12:00:00 UTC (a Monday)
    const T0: i64 = 1614600000000;

    fn mood_survey() -> Activity {
        Activity {
            id: "survey-1".to_string(),
            spec: "lamp.survey".to_string(),
            name: "Mood".to_string(),
            settings: json!([
                {"text": "Felt down", "type": "likert", "options": ["0", "1", "2", "3"]},
                {"text": "Slept well", "type": "boolean"}
            ]),
        }
    }

    fn submission(timestamp: i64, down: &str, slept: &str) -> ActivityEvent {
        ActivityEvent {
            timestamp,
            activity: Some("survey-1".to_string()),
            temporal_slices: vec![
                TemporalSlice {
                    item: Some("Felt down".to_string()),
                    value: Some(json!(down)),
                },
                TemporalSlice {
                    item: Some("Slept well".to_string()),
                    value: Some(json!(slept)),
                },
            ],
        }
    }

    fn gps_event(timestamp: i64, latitude: f64, longitude: f64) -> SensorEvent {
        let mut data = serde_json::Map::new();
        data.insert("latitude".to_string(), json!(latitude));
        data.insert("longitude".to_string(), json!(longitude));
        SensorEvent {
            timestamp,
            sensor: Some("lamp.gps".to_string()),
            data,
        }
    }

    fn sample_source() -> StaticSource {
        StaticSource::new(
            vec![
                gps_event(T0, 42.36, -71.06),
                gps_event(T0 + DAY_MS, 42.37, -71.05),
                gps_event(T0 + 4 * DAY_MS, 42.36, -71.06),
            ],
            vec![mood_survey()],
            vec![
                submission(T0, "2", "No"),
                submission(T0 + DAY_MS, "1", "Yes"),
                submission(T0 + 4 * DAY_MS, "3", "No"),
            ],
        )
    }

    #[test]
    fn test_run_assembles_frame() {
        let source = sample_source();
        let zone = FixedTimezone(chrono_tz::America::New_York);
        let pipeline = ParticipantPipeline::new(&source, &zone, chrono_tz::America::New_York);

        let participant = pipeline.run("p1", None, None).unwrap();
        assert_eq!(participant.gps.len(), 3);
        assert_eq!(participant.surveys.len(), 1);

        let frame = participant.frame.as_ref().unwrap();
        assert_eq!(frame.column_names(), vec!["Mood"]);
        // 4 days elapsed, morning-snapped edges
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn test_empty_streams_are_dropped() {
        let source = sample_source();
        let zone = FixedTimezone(chrono_tz::UTC);
        let pipeline = ParticipantPipeline::new(&source, &zone, chrono_tz::UTC);

        let participant = pipeline.run("p1", None, None).unwrap();
        assert_eq!(participant.sensor_events.len(), 1);
        assert!(participant.sensor_events.contains_key(&SensorKind::Gps));
    }

    #[test]
    fn test_impute_is_idempotent() {
        let source = sample_source();
        let zone = FixedTimezone(chrono_tz::UTC);
        let pipeline = ParticipantPipeline::new(&source, &zone, chrono_tz::UTC);

        let mut participant = pipeline.run("p1", None, None).unwrap();
        participant.impute().unwrap();
        let once = participant.frame.clone();
        participant.impute().unwrap();
        assert_eq!(participant.frame, once);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let source = sample_source();
        let zone = FixedTimezone(chrono_tz::UTC);
        let pipeline = ParticipantPipeline::new(&source, &zone, chrono_tz::UTC);

        let mut participant = pipeline.run("p1", None, None).unwrap();
        participant.impute().unwrap();
        participant.normalize(None).unwrap();
        let once = participant.frame.clone();
        participant.normalize(None).unwrap();
        assert_eq!(participant.frame, once);
    }

    #[test]
    fn test_transitions_require_binning() {
        let source = sample_source();
        let zone = FixedTimezone(chrono_tz::UTC);
        let pipeline = ParticipantPipeline::new(&source, &zone, chrono_tz::UTC);

        let mut participant = pipeline.run("p1", None, None).unwrap();
        assert!(matches!(
            participant.transitions(1),
            Err(FeatureError::NotBinned)
        ));

        participant.impute().unwrap();
        participant.bin(&BinOptions::default()).unwrap();
        let tables = participant.transitions(1).unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn test_reset_rebuilds_frame() {
        let source = sample_source();
        let zone = FixedTimezone(chrono_tz::UTC);
        let pipeline = ParticipantPipeline::new(&source, &zone, chrono_tz::UTC);

        let mut participant = pipeline.run("p1", None, None).unwrap();
        let pristine = participant.frame.clone();
        participant.impute().unwrap();
        participant.bin(&BinOptions::default()).unwrap();

        participant.reset().unwrap();
        assert_eq!(participant.frame, pristine);
        assert!(participant.bins.is_none());

        // Derived stages run again on the rebuilt frame
        participant.impute().unwrap();
        assert_ne!(participant.frame, pristine);
    }

    #[test]
    fn test_domain_restriction() {
        let source = sample_source();
        let zone = FixedTimezone(chrono_tz::UTC);
        let pipeline = ParticipantPipeline::new(&source, &zone, chrono_tz::UTC)
            .with_domains(vec!["Missing".to_string()]);

        let participant = pipeline.run("p1", None, None).unwrap();
        let frame = participant.frame.as_ref().unwrap();
        assert!(frame.columns.is_empty());
    }

    #[test]
    fn test_trajectories_group_by_day() {
        let source = sample_source();
        let zone = FixedTimezone(chrono_tz::UTC);
        let pipeline = ParticipantPipeline::new(&source, &zone, chrono_tz::UTC);

        let participant = pipeline.run("p1", None, None).unwrap();
        let days = participant.trajectories();
        assert_eq!(days.len(), 3);

        let matrix = participant.trajectory_matrix(TrajectoryMetric::Frechet);
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix[0][0], 0.0);
        assert!((matrix[0][1] - matrix[1][0]).abs() < 1e-12);
    }

    #[test]
    fn test_no_events_is_no_data() {
        let source = StaticSource::default();
        let zone = FixedTimezone(chrono_tz::UTC);
        let pipeline = ParticipantPipeline::new(&source, &zone, chrono_tz::UTC);

        assert!(matches!(
            pipeline.run("p1", None, None),
            Err(FeatureError::NoData(_))
        ));
    }
}
