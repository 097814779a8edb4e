//! GPS trajectory similarity
//!
//! Groups a participant's localized GPS fixes into day trajectories and
//! compares days pairwise with dynamic time warping and the discrete Fréchet
//! distance over haversine ground distance. Day clusters (single linkage
//! under a kilometer threshold) expose how routine a participant's movement
//! is.

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{GpsPoint, Localized};

/// Earth's radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0087714150598;

/// One local calendar day of GPS fixes, in time order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTrajectory {
    pub date: NaiveDate,
    pub points: Vec<GpsPoint>,
}

/// Pairwise metric over day trajectories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryMetric {
    /// Dynamic time warping: summed ground distance along the optimal
    /// warping path
    Dtw,
    /// Discrete Fréchet: the narrowest leash that lets both ends traverse
    /// their trajectories in order
    Frechet,
}

/// Group localized GPS fixes by local calendar day. Days with no fixes are
/// absent; within a day, fixes keep their time order.
pub fn day_trajectories(points: &[Localized<GpsPoint>]) -> Vec<DayTrajectory> {
    let mut days: Vec<DayTrajectory> = Vec::new();
    let mut sorted: Vec<&Localized<GpsPoint>> = points.iter().collect();
    sorted.sort_by_key(|p| p.time.local_timestamp);

    for point in sorted {
        let date = point.time.local_datetime.date();
        match days.last_mut() {
            Some(day) if day.date == date => day.points.push(point.inner),
            _ => days.push(DayTrajectory {
                date,
                points: vec![point.inner],
            }),
        }
    }
    days
}

/// Great-circle distance between two coordinates in kilometers
pub fn haversine_km(latitude_1: f64, longitude_1: f64, latitude_2: f64, longitude_2: f64) -> f64 {
    let d_lat = (latitude_2 - latitude_1).to_radians();
    let d_lon = (longitude_2 - longitude_1).to_radians();
    let latitude_1 = latitude_1.to_radians();
    let latitude_2 = latitude_2.to_radians();

    EARTH_RADIUS_KM
        * (2.0
            * ((d_lat / 2.0).sin().powi(2)
                + (d_lon / 2.0).sin().powi(2) * latitude_1.cos() * latitude_2.cos())
            .sqrt()
            .asin())
}

fn ground_distance(a: &GpsPoint, b: &GpsPoint) -> f64 {
    haversine_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Dynamic time warping distance between two trajectories: the summed ground
/// distance along the cheapest monotone alignment. O(n*m) time with two
/// rolling rows.
pub fn dtw_distance(a: &[GpsPoint], b: &[GpsPoint]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }

    let mut previous = vec![f64::INFINITY; b.len() + 1];
    let mut current = vec![f64::INFINITY; b.len() + 1];
    previous[0] = 0.0;

    for point_a in a {
        current[0] = f64::INFINITY;
        for (j, point_b) in b.iter().enumerate() {
            let cost = ground_distance(point_a, point_b);
            let best = previous[j].min(previous[j + 1]).min(current[j]);
            current[j + 1] = cost + best;
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Discrete Fréchet distance between two trajectories: the smallest leash
/// length admitting an order-preserving traversal of both.
pub fn frechet_distance(a: &[GpsPoint], b: &[GpsPoint]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }

    let mut coupling = vec![vec![0.0f64; b.len()]; a.len()];
    for i in 0..a.len() {
        for j in 0..b.len() {
            let cost = ground_distance(&a[i], &b[j]);
            coupling[i][j] = match (i, j) {
                (0, 0) => cost,
                (0, _) => coupling[0][j - 1].max(cost),
                (_, 0) => coupling[i - 1][0].max(cost),
                _ => coupling[i - 1][j]
                    .min(coupling[i - 1][j - 1])
                    .min(coupling[i][j - 1])
                    .max(cost),
            };
        }
    }
    coupling[a.len() - 1][b.len() - 1]
}

/// Symmetric pairwise distance matrix over day trajectories (zero diagonal)
pub fn distance_matrix(days: &[DayTrajectory], metric: TrajectoryMetric) -> Vec<Vec<f64>> {
    let n = days.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let distance = match metric {
                TrajectoryMetric::Dtw => dtw_distance(&days[i].points, &days[j].points),
                TrajectoryMetric::Frechet => frechet_distance(&days[i].points, &days[j].points),
            };
            matrix[i][j] = distance;
            matrix[j][i] = distance;
        }
    }
    matrix
}

/// Day-cluster assignments from single-linkage clustering of a distance
/// matrix under a threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayClusters {
    /// Cluster id per day, ids dense from zero in first-seen order
    pub assignments: Vec<usize>,
    /// Number of clusters
    pub cluster_count: usize,
    /// Share of days in the largest cluster (0-1); 0 with no days
    pub routine_index: f64,
}

/// Single-linkage clustering: days whose distance is at or under the
/// threshold join the same cluster (transitively).
pub fn cluster_days(matrix: &[Vec<f64>], threshold: f64) -> DayClusters {
    let n = matrix.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut Vec<usize>, x: usize) -> usize {
        let mut root = x;
        while parent[root] != root {
            root = parent[root];
        }
        let mut x = x;
        while parent[x] != root {
            let next = parent[x];
            parent[x] = root;
            x = next;
        }
        root
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if matrix[i][j] <= threshold {
                let root_i = find(&mut parent, i);
                let root_j = find(&mut parent, j);
                if root_i != root_j {
                    parent[root_j] = root_i;
                }
            }
        }
    }

    // Dense ids in first-seen order
    let mut ids: Vec<Option<usize>> = vec![None; n];
    let mut assignments = Vec::with_capacity(n);
    let mut cluster_count = 0;
    for day in 0..n {
        let root = find(&mut parent, day);
        let id = match ids[root] {
            Some(id) => id,
            None => {
                let id = cluster_count;
                ids[root] = Some(id);
                cluster_count += 1;
                id
            }
        };
        assignments.push(id);
    }

    let routine_index = if n == 0 {
        0.0
    } else {
        let mut sizes = vec![0usize; cluster_count];
        for &id in &assignments {
            sizes[id] += 1;
        }
        sizes.iter().copied().max().unwrap_or(0) as f64 / n as f64
    };

    DayClusters {
        assignments,
        cluster_count,
        routine_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocalTime;
    use pretty_assertions::assert_eq;

    fn point(latitude: f64, longitude: f64) -> GpsPoint {
        GpsPoint {
            timestamp: 0,
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
        }
    }

    fn localized(day: u32, hour: u32, latitude: f64, longitude: f64) -> Localized<GpsPoint> {
        let local_datetime = NaiveDate::from_ymd_opt(2021, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        let millis = local_datetime.and_utc().timestamp_millis();
        Localized {
            time: LocalTime {
                utc_timestamp: millis,
                local_timestamp: millis,
                local_datetime,
                timezone: "UTC".to_string(),
            },
            inner: GpsPoint {
                timestamp: millis,
                latitude,
                longitude,
                altitude: None,
                accuracy: None,
            },
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // London to New York, roughly 5570 km
        let distance = haversine_km(51.5007, 0.1246, 40.6892, 74.0445);
        assert!((distance - 5574.8).abs() < 1.0);
        assert_eq!(haversine_km(42.0, -71.0, 42.0, -71.0), 0.0);
    }

    #[test]
    fn test_day_grouping() {
        let points = vec![
            localized(1, 9, 42.0, -71.0),
            localized(1, 18, 42.1, -71.1),
            localized(2, 9, 42.0, -71.0),
        ];
        let days = day_trajectories(&points);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].points.len(), 2);
        assert_eq!(days[1].date, NaiveDate::from_ymd_opt(2021, 3, 2).unwrap());
    }

    #[test]
    fn test_dtw_identity_and_symmetry() {
        let a = vec![point(42.0, -71.0), point(42.1, -71.1), point(42.2, -71.2)];
        let b = vec![point(42.0, -71.05), point(42.2, -71.25)];

        assert_eq!(dtw_distance(&a, &a), 0.0);
        let ab = dtw_distance(&a, &b);
        let ba = dtw_distance(&b, &a);
        assert!((ab - ba).abs() < 1e-9);
        assert!(ab > 0.0);
    }

    #[test]
    fn test_dtw_handles_unequal_lengths() {
        let a = vec![point(42.0, -71.0)];
        let b = vec![point(42.0, -71.0), point(42.0, -71.0), point(42.0, -71.0)];
        assert_eq!(dtw_distance(&a, &b), 0.0);
    }

    #[test]
    fn test_frechet_is_max_of_coupling() {
        let a = vec![point(42.0, -71.0), point(42.0, -72.0)];
        let b = vec![point(42.0, -71.0), point(42.0, -72.0)];
        assert_eq!(frechet_distance(&a, &b), 0.0);

        // Shifted copy: leash length is the constant offset
        let offset: Vec<GpsPoint> = a.iter().map(|p| point(p.latitude + 0.1, p.longitude)).collect();
        let leash = frechet_distance(&a, &offset);
        let expected = haversine_km(42.0, -71.0, 42.1, -71.0);
        assert!((leash - expected).abs() < 1e-6);
    }

    #[test]
    fn test_frechet_leq_than_worst_pair() {
        let a = vec![point(42.0, -71.0), point(42.5, -71.5)];
        let b = vec![point(42.1, -71.0), point(42.4, -71.6)];
        let leash = frechet_distance(&a, &b);
        let worst = ground_distance(&a[0], &b[1]);
        assert!(leash <= worst);
    }

    #[test]
    fn test_distance_matrix_shape() {
        let days = vec![
            DayTrajectory {
                date: NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(),
                points: vec![point(42.0, -71.0)],
            },
            DayTrajectory {
                date: NaiveDate::from_ymd_opt(2021, 3, 2).unwrap(),
                points: vec![point(42.5, -71.5)],
            },
        ];
        let matrix = distance_matrix(&days, TrajectoryMetric::Frechet);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0][0], 0.0);
        assert_eq!(matrix[0][1], matrix[1][0]);
        assert!(matrix[0][1] > 0.0);
    }

    #[test]
    fn test_clustering_links_transitively() {
        // 0-1 close, 1-2 close, 0-2 far: single linkage joins all three
        let matrix = vec![
            vec![0.0, 1.0, 5.0, 50.0],
            vec![1.0, 0.0, 1.0, 50.0],
            vec![5.0, 1.0, 0.0, 50.0],
            vec![50.0, 50.0, 50.0, 0.0],
        ];
        let clusters = cluster_days(&matrix, 2.0);
        assert_eq!(clusters.assignments[0], clusters.assignments[1]);
        assert_eq!(clusters.assignments[1], clusters.assignments[2]);
        assert_ne!(clusters.assignments[0], clusters.assignments[3]);
        assert_eq!(clusters.cluster_count, 2);
        assert!((clusters.routine_index - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_clustering() {
        let clusters = cluster_days(&[], 1.0);
        assert_eq!(clusters.cluster_count, 0);
        assert_eq!(clusters.routine_index, 0.0);
    }

    #[test]
    fn test_routine_days_cluster_together() {
        // Two near-identical commute days and one trip elsewhere
        let home_day = |day| {
            vec![
                localized(day, 8, 42.36, -71.06),
                localized(day, 12, 42.34, -71.09),
                localized(day, 18, 42.36, -71.06),
            ]
        };
        let mut points = home_day(1);
        points.extend(home_day(2));
        points.push(localized(3, 12, 40.71, -74.0)); // New York

        let days = day_trajectories(&points);
        let matrix = distance_matrix(&days, TrajectoryMetric::Dtw);
        let clusters = cluster_days(&matrix, 25.0);

        assert_eq!(clusters.assignments[0], clusters.assignments[1]);
        assert_ne!(clusters.assignments[0], clusters.assignments[2]);
        assert!((clusters.routine_index - 2.0 / 3.0).abs() < 1e-9);
    }
}
