//! Survey scoring
//!
//! Collapses raw survey submissions into per-category score series.
//! Each answered question is scored on a 0-3 scale by question kind, optionally
//! remapped to a caller-defined category with reverse scoring, then every
//! category's scores within one submission average into a single point.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::types::{Activity, ActivityEvent, QuestionSetting, ScoredSurveyPoint, SurveyQuestionKind};

/// Top of the scoring scale; "yes" on a standard-scored boolean question
pub const MAX_QUESTION_SCORE: f64 = 3.0;

/// Caller-defined mapping from question text to a scoring category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionCategory {
    /// Category (domain) the question contributes to
    pub category: String,
    /// Flip the score within the 0-3 scale
    #[serde(default)]
    pub reverse_scoring: bool,
}

/// Maps question text to its category and scoring direction
pub type QuestionCategories = HashMap<String, QuestionCategory>;

/// Score all survey submissions against their activity definitions.
///
/// Returns one time series per category (or per survey name when no category
/// mapping is supplied), each sorted ascending by timestamp.
pub fn score_surveys(
    activities: &[Activity],
    events: &[ActivityEvent],
    categories: Option<&QuestionCategories>,
) -> HashMap<String, Vec<ScoredSurveyPoint>> {
    let surveys: HashMap<&str, &Activity> = activities
        .iter()
        .filter(|a| a.is_survey())
        .map(|a| (a.id.as_str(), a))
        .collect();

    let mut series: HashMap<String, Vec<ScoredSurveyPoint>> = HashMap::new();

    for event in events {
        let activity = match event.activity.as_deref().and_then(|id| surveys.get(id)) {
            Some(activity) => *activity,
            None => continue,
        };
        if event.temporal_slices.is_empty() {
            continue;
        }

        let questions = activity.question_settings();

        // Category -> question scores within this submission
        let mut submission: HashMap<String, Vec<f64>> = HashMap::new();

        for slice in &event.temporal_slices {
            let item = match slice.item.as_deref() {
                Some(item) => item,
                None => continue,
            };
            let question = match questions.iter().find(|q| q.text == item) {
                Some(question) => question,
                None => {
                    debug!("survey question not in activity settings, skipping: {item:?}");
                    continue;
                }
            };

            let score = match slice.value.as_ref().and_then(|v| score_answer(question, v)) {
                Some(score) => score,
                None => continue,
            };

            let (category, score) = match categories {
                Some(map) => match lookup_category(map, item) {
                    Some(entry) if entry.reverse_scoring => {
                        (entry.category.clone(), MAX_QUESTION_SCORE - score)
                    }
                    Some(entry) => (entry.category.clone(), score),
                    // Mapping supplied but question not mapped: not a study domain
                    None => continue,
                },
                None => (activity.name.clone(), score),
            };

            submission.entry(category).or_default().push(score);
        }

        for (category, scores) in submission {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            series.entry(category).or_default().push(ScoredSurveyPoint {
                timestamp: event.timestamp,
                score: mean,
            });
        }
    }

    for points in series.values_mut() {
        points.sort_by_key(|p| p.timestamp);
    }
    series
}

/// Score one answer on the 0-3 scale. `None` means the answer does not score
/// (text questions, NULL markers, malformed values).
pub fn score_answer(question: &QuestionSetting, value: &serde_json::Value) -> Option<f64> {
    if value.as_str() == Some("NULL") {
        return None;
    }

    match question.kind {
        SurveyQuestionKind::Likert => value_as_number(value),
        SurveyQuestionKind::Boolean => match boolean_answer(value)? {
            // "no" is healthy under standard scoring
            false => Some(0.0),
            true => Some(MAX_QUESTION_SCORE),
        },
        SurveyQuestionKind::List => {
            let answer = value.as_str()?;
            let index = question.options.iter().position(|opt| opt == answer)?;
            if question.options.len() < 2 {
                return Some(0.0);
            }
            Some(index as f64 * MAX_QUESTION_SCORE / (question.options.len() - 1) as f64)
        }
        SurveyQuestionKind::Text | SurveyQuestionKind::Other => None,
    }
}

/// Match a question to its category, tolerating a trailing-space variant of
/// the question text.
fn lookup_category<'a>(map: &'a QuestionCategories, item: &str) -> Option<&'a QuestionCategory> {
    map.get(item).or_else(|| map.get(item.trim_end()))
}

fn value_as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn boolean_answer(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "yes" => Some(true),
            "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
