//! Sensing-server event retrieval
//!
//! The analytics layer fetches raw events through the [`EventSource`] trait.
//! The server pages queries newest-first with a hard per-request cap, so the
//! fetch helpers here walk the `to` cursor backwards until a short page
//! signals the end of the stream. The HTTP implementation lives in
//! [`http::SensingClient`] behind the `api` feature; [`StaticSource`] backs
//! tests and file-driven runs.

#[cfg(feature = "api")]
pub mod http;

#[cfg(feature = "api")]
pub use http::SensingClient;

use crate::error::FeatureError;
use crate::types::{Activity, ActivityEvent, SensorEvent};

/// Server-side cap on events per request
pub const PAGE_LIMIT: usize = 1000;

/// By-participant event queries against the sensing server.
///
/// Queries cover timestamps in `[from, to)` (UTC milliseconds, both bounds
/// optional) and return at most `limit` events, newest first.
pub trait EventSource {
    fn sensor_events(
        &self,
        participant: &str,
        origin: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SensorEvent>, FeatureError>;

    fn activities(&self, participant: &str) -> Result<Vec<Activity>, FeatureError>;

    fn activity_events(
        &self,
        participant: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, FeatureError>;
}

/// Fetch every sensor event for one origin, paging past the server cap.
/// Results come back sorted ascending with duplicate timestamps dropped.
pub fn fetch_all_sensor_events(
    source: &dyn EventSource,
    participant: &str,
    origin: &str,
    from: Option<i64>,
    to: Option<i64>,
) -> Result<Vec<SensorEvent>, FeatureError> {
    let mut events = Vec::new();
    let mut cursor = to;

    loop {
        let page = source.sensor_events(participant, origin, from, cursor, PAGE_LIMIT)?;
        let oldest = page.last().map(|e| e.timestamp);
        let short = page.len() < PAGE_LIMIT;
        events.extend(page);
        if short {
            break;
        }
        cursor = oldest;
    }

    sort_and_dedup(&mut events, |e| e.timestamp);
    Ok(events)
}

/// Fetch every activity event, paging past the server cap. Survey histories
/// routinely exceed one page, so the cursor walks to the end of the stream.
pub fn fetch_all_activity_events(
    source: &dyn EventSource,
    participant: &str,
    from: Option<i64>,
    to: Option<i64>,
) -> Result<Vec<ActivityEvent>, FeatureError> {
    let mut events = Vec::new();
    let mut cursor = to;

    loop {
        let page = source.activity_events(participant, from, cursor, PAGE_LIMIT)?;
        let oldest = page.last().map(|e| e.timestamp);
        let short = page.len() < PAGE_LIMIT;
        events.extend(page);
        if short {
            break;
        }
        cursor = oldest;
    }

    sort_and_dedup(&mut events, |e| e.timestamp);
    Ok(events)
}

fn sort_and_dedup<T, F: Fn(&T) -> i64>(events: &mut Vec<T>, key: F) {
    events.sort_by_key(|e| key(e));
    events.dedup_by_key(|e| key(e));
}

/// In-memory event source. Serves the same newest-first paged responses the
/// server does, so the paging helpers behave identically against it.
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
    pub sensor_events: Vec<SensorEvent>,
    pub activities: Vec<Activity>,
    pub activity_events: Vec<ActivityEvent>,
}

impl StaticSource {
    pub fn new(
        sensor_events: Vec<SensorEvent>,
        activities: Vec<Activity>,
        activity_events: Vec<ActivityEvent>,
    ) -> Self {
        Self {
            sensor_events,
            activities,
            activity_events,
        }
    }
}

fn in_window(timestamp: i64, from: Option<i64>, to: Option<i64>) -> bool {
    from.map_or(true, |f| timestamp >= f) && to.map_or(true, |t| timestamp < t)
}

impl EventSource for StaticSource {
    fn sensor_events(
        &self,
        _participant: &str,
        origin: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SensorEvent>, FeatureError> {
        let mut matched: Vec<SensorEvent> = self
            .sensor_events
            .iter()
            .filter(|e| e.sensor.as_deref() == Some(origin) && in_window(e.timestamp, from, to))
            .cloned()
            .collect();
        matched.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        matched.truncate(limit);
        Ok(matched)
    }

    fn activities(&self, _participant: &str) -> Result<Vec<Activity>, FeatureError> {
        Ok(self.activities.clone())
    }

    fn activity_events(
        &self,
        _participant: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, FeatureError> {
        let mut matched: Vec<ActivityEvent> = self
            .activity_events
            .iter()
            .filter(|e| in_window(e.timestamp, from, to))
            .cloned()
            .collect();
        matched.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        matched.truncate(limit);
        Ok(matched)
    }
}
