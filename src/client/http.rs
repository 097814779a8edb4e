//! HTTP implementation of [`EventSource`] against a sensing server.
//!
//! Endpoints follow the standard REST layout:
//!   GET {base}/participant/{id}/sensor_event?origin=&from=&to=&limit=
//!   GET {base}/participant/{id}/activity
//!   GET {base}/participant/{id}/activity_event?from=&to=&limit=
//!
//! Responses wrap the payload in a `{"data": [...]}` envelope.

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::EventSource;
use crate::error::FeatureError;
use crate::types::{Activity, ActivityEvent, SensorEvent};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Vec<T>,
}

/// Blocking client for the sensing server's participant endpoints.
#[derive(Debug, Clone)]
pub struct SensingClient {
    client: Client,
    base_url: String,
    credential: Option<String>,
}

impl SensingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            credential: None,
        }
    }

    /// Attach a credential sent as a `Basic` Authorization header.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, FeatureError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(credential) = &self.credential {
            request = request.header("Authorization", format!("Basic {credential}"));
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeatureError::RequestError(format!(
                "GET {url} returned {status}"
            )));
        }

        let envelope: Envelope<T> = response.json()?;
        Ok(envelope.data)
    }
}

fn window_query(from: Option<i64>, to: Option<i64>, limit: usize) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(from) = from {
        query.push(("from", from.to_string()));
    }
    if let Some(to) = to {
        query.push(("to", to.to_string()));
    }
    query.push(("limit", limit.to_string()));
    query
}

impl EventSource for SensingClient {
    fn sensor_events(
        &self,
        participant: &str,
        origin: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SensorEvent>, FeatureError> {
        let mut query = window_query(from, to, limit);
        query.insert(0, ("origin", origin.to_string()));
        self.get(&format!("/participant/{participant}/sensor_event"), &query)
    }

    fn activities(&self, participant: &str) -> Result<Vec<Activity>, FeatureError> {
        self.get(&format!("/participant/{participant}/activity"), &[])
    }

    fn activity_events(
        &self,
        participant: &str,
        from: Option<i64>,
        to: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, FeatureError> {
        let query = window_query(from, to, limit);
        self.get(&format!("/participant/{participant}/activity_event"), &query)
    }
}

impl From<reqwest::Error> for FeatureError {
    fn from(e: reqwest::Error) -> Self {
        FeatureError::RequestError(e.to_string())
    }
}
