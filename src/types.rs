//! Core types for the phenoflow pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: wire events from the sensing server, scored survey points, and
//! locally-aligned series.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Passive-sensing data streams served by the sensing platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    AccelerometerMotion,
    BloodPressure,
    Bluetooth,
    Calls,
    Distance,
    Flights,
    Gps,
    GpsContextual,
    Gyroscope,
    HeartRate,
    Height,
    Magnetometer,
    RespiratoryRate,
    ScreenState,
    Segment,
    Sleep,
    Sms,
    Steps,
    Weight,
    Wifi,
}

impl SensorKind {
    /// Every stream the fetch stage queries for a participant
    pub const ALL: [SensorKind; 21] = [
        SensorKind::Accelerometer,
        SensorKind::AccelerometerMotion,
        SensorKind::BloodPressure,
        SensorKind::Bluetooth,
        SensorKind::Calls,
        SensorKind::Distance,
        SensorKind::Flights,
        SensorKind::Gps,
        SensorKind::GpsContextual,
        SensorKind::Gyroscope,
        SensorKind::HeartRate,
        SensorKind::Height,
        SensorKind::Magnetometer,
        SensorKind::RespiratoryRate,
        SensorKind::ScreenState,
        SensorKind::Segment,
        SensorKind::Sleep,
        SensorKind::Sms,
        SensorKind::Steps,
        SensorKind::Weight,
        SensorKind::Wifi,
    ];

    /// Wire origin string used by the server's sensor-event queries
    pub fn origin(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "lamp.accelerometer",
            SensorKind::AccelerometerMotion => "lamp.accelerometer.motion",
            SensorKind::BloodPressure => "lamp.blood_pressure",
            SensorKind::Bluetooth => "lamp.bluetooth",
            SensorKind::Calls => "lamp.calls",
            SensorKind::Distance => "lamp.distance",
            SensorKind::Flights => "lamp.flights",
            SensorKind::Gps => "lamp.gps",
            SensorKind::GpsContextual => "lamp.gps.contextual",
            SensorKind::Gyroscope => "lamp.gyroscope",
            SensorKind::HeartRate => "lamp.heart_rate",
            SensorKind::Height => "lamp.height",
            SensorKind::Magnetometer => "lamp.magnetometer",
            SensorKind::RespiratoryRate => "lamp.respiratory_rate",
            SensorKind::ScreenState => "lamp.screen_state",
            SensorKind::Segment => "lamp.segment",
            SensorKind::Sleep => "lamp.sleep",
            SensorKind::Sms => "lamp.sms",
            SensorKind::Steps => "lamp.steps",
            SensorKind::Weight => "lamp.weight",
            SensorKind::Wifi => "lamp.wifi",
        }
    }

    /// Reverse mapping from a wire origin string
    pub fn from_origin(origin: &str) -> Option<SensorKind> {
        SensorKind::ALL.iter().copied().find(|k| k.origin() == origin)
    }
}

/// A raw sensor event as the server returns it: a UTC millisecond timestamp
/// plus a free-form payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEvent {
    /// UTC timestamp in milliseconds
    pub timestamp: i64,
    /// Origin stream (e.g. "lamp.gps")
    #[serde(default, alias = "origin")]
    pub sensor: Option<String>,
    /// Sensor payload; keys vary per stream
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl SensorEvent {
    /// Read a numeric payload field
    pub fn number(&self, field: &str) -> Option<f64> {
        self.data.get(field).and_then(|v| v.as_f64())
    }

    /// Interpret this event as a GPS fix, if it carries coordinates
    pub fn gps_point(&self) -> Option<GpsPoint> {
        Some(GpsPoint {
            timestamp: self.timestamp,
            latitude: self.number("latitude")?,
            longitude: self.number("longitude")?,
            altitude: self.number("altitude"),
            accuracy: self.number("accuracy"),
        })
    }

    /// Event timestamp as a UTC datetime
    pub fn datetime_utc(&self) -> DateTime<Utc> {
        timestamp_to_utc(self.timestamp)
    }
}

/// A single GPS fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    /// UTC timestamp in milliseconds
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// An activity registered for a participant (surveys, games, tips, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    /// Activity spec string; surveys are "lamp.survey"
    pub spec: String,
    #[serde(default)]
    pub name: String,
    /// Activity settings; for surveys this is the question list
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Spec string identifying survey activities
pub const SURVEY_SPEC: &str = "lamp.survey";

impl Activity {
    pub fn is_survey(&self) -> bool {
        self.spec == SURVEY_SPEC
    }

    /// Parse the settings list as survey questions. Entries that do not look
    /// like questions are skipped.
    pub fn question_settings(&self) -> Vec<QuestionSetting> {
        match self.settings.as_array() {
            Some(items) => items
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Question kinds a survey can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyQuestionKind {
    Likert,
    Boolean,
    List,
    Text,
    /// Unscored kinds (sliders, ratings, media, ...)
    #[serde(other)]
    Other,
}

/// One question definition inside a survey activity's settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSetting {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: SurveyQuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
}

/// One answered question inside an activity event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalSlice {
    /// Question text
    #[serde(default)]
    pub item: Option<String>,
    /// Raw response value
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// A self-report activity event (one survey submission)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// UTC timestamp in milliseconds
    pub timestamp: i64,
    /// Activity this event belongs to
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub temporal_slices: Vec<TemporalSlice>,
}

/// A survey submission collapsed to one score for one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredSurveyPoint {
    /// UTC timestamp in milliseconds
    pub timestamp: i64,
    pub score: f64,
}

/// Local-time alignment of a single timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTime {
    /// The original UTC timestamp in milliseconds
    pub utc_timestamp: i64,
    /// Wall-clock timestamp in milliseconds (UTC shifted by the zone offset)
    pub local_timestamp: i64,
    /// Wall-clock datetime without zone
    pub local_datetime: NaiveDateTime,
    /// IANA zone name the conversion used
    pub timezone: String,
}

/// A value paired with its local-time alignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Localized<T> {
    pub time: LocalTime,
    pub inner: T,
}

/// Convert a UTC millisecond timestamp to a chrono datetime.
/// Out-of-range timestamps clamp to the epoch.
pub fn timestamp_to_utc(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap_or_default())
}
