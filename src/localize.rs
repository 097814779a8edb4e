//! Local-time alignment
//!
//! Sensor and survey timestamps arrive as UTC milliseconds. Deriving daily
//! features requires the participant's wall-clock time, so every event is
//! aligned to a local timezone: the zone of the nearest GPS reading when GPS
//! data exists, otherwise a configured fallback zone.

use chrono::Offset;
use chrono_tz::Tz;
use log::warn;

use crate::error::FeatureError;
use crate::types::{GpsPoint, LocalTime, Localized, ScoredSurveyPoint, timestamp_to_utc};

/// Resolves a timezone for a coordinate. The production implementation is an
/// external lookup service; tests and single-site studies use [`FixedTimezone`].
pub trait TimezoneLookup {
    /// IANA zone containing the coordinate, if the lookup can resolve one
    fn timezone_at(&self, latitude: f64, longitude: f64) -> Option<Tz>;
}

/// Lookup that returns one configured zone for every coordinate
#[derive(Debug, Clone, Copy)]
pub struct FixedTimezone(pub Tz);

impl TimezoneLookup for FixedTimezone {
    fn timezone_at(&self, _latitude: f64, _longitude: f64) -> Option<Tz> {
        Some(self.0)
    }
}

/// Parse an IANA zone name
pub fn parse_timezone(name: &str) -> Result<Tz, FeatureError> {
    name.parse()
        .map_err(|_| FeatureError::InvalidTimezone(name.to_string()))
}

/// Aligns event streams to participant-local time
pub struct Localizer<'a> {
    lookup: &'a dyn TimezoneLookup,
    fallback: Tz,
}

impl<'a> Localizer<'a> {
    pub fn new(lookup: &'a dyn TimezoneLookup, fallback: Tz) -> Self {
        Self { lookup, fallback }
    }

    /// Localizer with no lookup service; every event converts through `zone`
    pub fn fixed(zone: &'a FixedTimezone) -> Self {
        Self {
            lookup: zone,
            fallback: zone.0,
        }
    }

    /// Assign each GPS fix the zone it was recorded in and convert it to
    /// local time. Input must be sorted ascending by timestamp.
    pub fn localize_gps(&self, points: &[GpsPoint]) -> Vec<Localized<GpsPoint>> {
        points
            .iter()
            .map(|point| {
                let zone = self
                    .lookup
                    .timezone_at(point.latitude, point.longitude)
                    .unwrap_or_else(|| {
                        warn!(
                            "no timezone for ({}, {}), falling back to {}",
                            point.latitude, point.longitude, self.fallback
                        );
                        self.fallback
                    });
                Localized {
                    time: convert(point.timestamp, zone),
                    inner: *point,
                }
            })
            .collect()
    }

    /// Align one timestamp using the zone of the nearest GPS reading, or the
    /// fallback zone when no GPS data exists.
    pub fn localize_timestamp(&self, timestamp: i64, gps: &[Localized<GpsPoint>]) -> LocalTime {
        let zone = nearest_zone(timestamp, gps).unwrap_or(self.fallback);
        convert(timestamp, zone)
    }

    /// Align a scored survey series
    pub fn localize_survey(
        &self,
        points: &[ScoredSurveyPoint],
        gps: &[Localized<GpsPoint>],
    ) -> Vec<Localized<ScoredSurveyPoint>> {
        points
            .iter()
            .map(|point| Localized {
                time: self.localize_timestamp(point.timestamp, gps),
                inner: *point,
            })
            .collect()
    }
}

/// Zone of the GPS reading closest in time to `timestamp`
fn nearest_zone(timestamp: i64, gps: &[Localized<GpsPoint>]) -> Option<Tz> {
    if gps.is_empty() {
        return None;
    }
    let index = match gps.binary_search_by_key(&timestamp, |g| g.inner.timestamp) {
        Ok(i) => i,
        Err(i) => {
            if i == 0 {
                0
            } else if i == gps.len() {
                gps.len() - 1
            } else {
                // pick whichever neighbor is closer
                let before = timestamp - gps[i - 1].inner.timestamp;
                let after = gps[i].inner.timestamp - timestamp;
                if after < before {
                    i
                } else {
                    i - 1
                }
            }
        }
    };
    gps[index].time.timezone.parse().ok()
}

/// Convert a UTC millisecond timestamp to its local alignment in `zone`.
/// The UTC value is preserved; the local timestamp is the wall-clock epoch
/// (UTC shifted by the zone offset in effect at that instant).
fn convert(timestamp: i64, zone: Tz) -> LocalTime {
    let utc = timestamp_to_utc(timestamp);
    let local = utc.with_timezone(&zone);
    let offset_ms = i64::from(local.offset().fix().local_minus_utc()) * 1000;
    LocalTime {
        utc_timestamp: timestamp,
        local_timestamp: timestamp + offset_ms,
        local_datetime: local.naive_local(),
        timezone: zone.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use pretty_assertions::assert_eq;

    fn fix(timestamp: i64, latitude: f64, longitude: f64) -> GpsPoint {
        GpsPoint {
            timestamp,
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
        }
    }

    // 2020-03-13 22:05:24 UTC
    const T0: i64 = 1584137124000;

    #[test]
    fn test_fixed_fallback_conversion() {
        let zone = FixedTimezone(chrono_tz::America::New_York);
        let localizer = Localizer::fixed(&zone);

        let time = localizer.localize_timestamp(T0, &[]);
        assert_eq!(time.utc_timestamp, T0);
        assert_eq!(time.timezone, "America/New_York");
        // EDT is UTC-4 in March 2020
        assert_eq!(time.local_timestamp, T0 - 4 * 3600 * 1000);
        assert_eq!(time.local_datetime.hour(), 18);
    }

    #[test]
    fn test_gps_points_carry_their_zone() {
        let zone = FixedTimezone(chrono_tz::America::Chicago);
        let localizer = Localizer::fixed(&zone);

        let localized = localizer.localize_gps(&[fix(T0, 41.88, -87.63)]);
        assert_eq!(localized.len(), 1);
        assert_eq!(localized[0].time.timezone, "America/Chicago");
        assert_eq!(localized[0].inner.latitude, 41.88);
    }

    #[test]
    fn test_nearest_gps_reading_wins() {
        struct TwoZones;
        impl TimezoneLookup for TwoZones {
            fn timezone_at(&self, _lat: f64, longitude: f64) -> Option<Tz> {
                if longitude < -100.0 {
                    Some(chrono_tz::America::Los_Angeles)
                } else {
                    Some(chrono_tz::America::New_York)
                }
            }
        }

        let lookup = TwoZones;
        let localizer = Localizer::new(&lookup, chrono_tz::UTC);
        let gps = localizer.localize_gps(&[
            fix(T0, 40.7, -74.0),             // New York
            fix(T0 + 100_000, 34.0, -118.2),  // Los Angeles
        ]);

        let near_first = localizer.localize_timestamp(T0 + 10_000, &gps);
        assert_eq!(near_first.timezone, "America/New_York");

        let near_second = localizer.localize_timestamp(T0 + 95_000, &gps);
        assert_eq!(near_second.timezone, "America/Los_Angeles");

        let after_all = localizer.localize_timestamp(T0 + 10_000_000, &gps);
        assert_eq!(after_all.timezone, "America/Los_Angeles");
    }

    #[test]
    fn test_survey_series_alignment() {
        let zone = FixedTimezone(chrono_tz::Europe::London);
        let localizer = Localizer::fixed(&zone);

        let points = vec![
            ScoredSurveyPoint {
                timestamp: T0,
                score: 1.5,
            },
            ScoredSurveyPoint {
                timestamp: T0 + 86_400_000,
                score: 2.0,
            },
        ];
        let localized = localizer.localize_survey(&points, &[]);
        assert_eq!(localized.len(), 2);
        assert_eq!(localized[0].inner.score, 1.5);
        assert_eq!(localized[0].time.timezone, "Europe/London");
        // GMT in March before the switch: local equals UTC
        assert_eq!(localized[0].time.local_timestamp, T0);
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("America/New_York").is_ok());
        assert!(matches!(
            parse_timezone("Not/AZone"),
            Err(FeatureError::InvalidTimezone(_))
        ));
    }
}
