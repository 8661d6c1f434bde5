//! Behavioral grouping of a class roster.
//!
//! Each student becomes a point of four features (average grade, submission
//! rate, xp, streak), min-max normalized across the roster. Points are split
//! into `k` groups by centroid refinement that always runs [`MAX_ROUNDS`]
//! rounds without a convergence check. A group that loses every member in a
//! round takes over the previous round's first centroid instead of being
//! reseeded. This is a known limitation: two centroids can end up on the
//! same spot, and the lower index then wins every tie.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::advisory::Priority;
use crate::error::{AnalyticsError, Result};
use crate::features::extract_features;
use crate::models::{Cluster, ClusterReport, FeaturePoint, StudentSummary};
use crate::store::RecordStore;

pub const MAX_ROUNDS: usize = 10;
pub const DEFAULT_K: usize = 4;
pub const DEFAULT_FAN_OUT: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct ClusterOptions {
    pub k: usize,
    /// Upper bound on concurrent feature reads against the store.
    pub fan_out: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            fan_out: DEFAULT_FAN_OUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub assignments: Vec<usize>,
    pub centroids: Vec<FeaturePoint>,
}

pub fn normalize(points: &[FeaturePoint]) -> Vec<FeaturePoint> {
    let mut mins = [f64::INFINITY; FeaturePoint::DIMENSIONS];
    let mut maxs = [f64::NEG_INFINITY; FeaturePoint::DIMENSIONS];
    for point in points {
        for (d, value) in point.to_array().into_iter().enumerate() {
            mins[d] = mins[d].min(value);
            maxs[d] = maxs[d].max(value);
        }
    }

    points
        .iter()
        .map(|point| {
            let mut values = point.to_array();
            for (d, value) in values.iter_mut().enumerate() {
                let range = maxs[d] - mins[d];
                *value = if range > 0.0 { (*value - mins[d]) / range } else { 0.0 };
            }
            FeaturePoint::from_array(values)
        })
        .collect()
}

/// Index of the closest centroid; ties resolve to the lowest index.
fn nearest(point: &FeaturePoint, centroids: &[FeaturePoint]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = point.distance(centroid);
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

fn assign(points: &[FeaturePoint], centroids: &[FeaturePoint]) -> Vec<usize> {
    points.iter().map(|point| nearest(point, centroids)).collect()
}

pub(crate) fn recompute_centroids(
    points: &[FeaturePoint],
    assignments: &[usize],
    centroids: &[FeaturePoint],
) -> Vec<FeaturePoint> {
    let fallback = centroids[0];
    (0..centroids.len())
        .map(|cluster| {
            let mut sum = [0.0; FeaturePoint::DIMENSIONS];
            let mut count = 0usize;
            for (point, &assigned) in points.iter().zip(assignments) {
                if assigned != cluster {
                    continue;
                }
                for (total, value) in sum.iter_mut().zip(point.to_array()) {
                    *total += value;
                }
                count += 1;
            }

            if count == 0 {
                // empty cluster: stale first centroid, no reseeding
                return fallback;
            }
            FeaturePoint::from_array(sum.map(|total| total / count as f64))
        })
        .collect()
}

/// Fixed-round centroid refinement over already normalized points.
pub fn kmeans<R>(points: &[FeaturePoint], k: usize, rng: &mut R) -> KMeansFit
where
    R: Rng + ?Sized,
{
    if points.is_empty() || k == 0 {
        return KMeansFit {
            assignments: Vec::new(),
            centroids: Vec::new(),
        };
    }

    let mut centroids: Vec<FeaturePoint> = (0..k)
        .map(|_| points[rng.gen_range(0..points.len())])
        .collect();

    for _ in 0..MAX_ROUNDS {
        let assignments = assign(points, &centroids);
        centroids = recompute_centroids(points, &assignments, &centroids);
    }

    KMeansFit {
        assignments: assign(points, &centroids),
        centroids,
    }
}

pub fn name_cluster(avg: &FeaturePoint) -> (&'static str, &'static str, Priority) {
    if avg.avg_grade >= 8.0 && avg.submission_rate >= 0.8 {
        ("Excelentes", "Alto desempenho e engajamento", Priority::Low)
    } else if avg.avg_grade >= 6.0 && avg.submission_rate >= 0.6 {
        ("Regulares", "Desempenho adequado, pode melhorar", Priority::Medium)
    } else if avg.submission_rate < 0.4 {
        (
            "Desengajados",
            "Baixa participação, precisa de atenção urgente",
            Priority::Critical,
        )
    } else {
        (
            "Em Risco",
            "Desempenho abaixo da média, precisa de suporte",
            Priority::High,
        )
    }
}

fn average(points: &[FeaturePoint]) -> FeaturePoint {
    let mut sum = [0.0; FeaturePoint::DIMENSIONS];
    for point in points {
        for (total, value) in sum.iter_mut().zip(point.to_array()) {
            *total += value;
        }
    }
    let count = points.len().max(1) as f64;
    FeaturePoint::from_array(sum.map(|total| total / count))
}

pub fn build_clusters<R>(students: Vec<StudentSummary>, k: usize, rng: &mut R) -> Vec<Cluster>
where
    R: Rng + ?Sized,
{
    let raw: Vec<FeaturePoint> = students
        .iter()
        .map(|s| FeaturePoint::from(s.features))
        .collect();
    let fit = kmeans(&normalize(&raw), k.max(1), rng);

    let mut groups: Vec<Vec<StudentSummary>> = vec![Vec::new(); fit.centroids.len()];
    for (student, cluster) in students.into_iter().zip(&fit.assignments) {
        groups[*cluster].push(student);
    }

    groups
        .into_iter()
        .zip(fit.centroids)
        .filter(|(members, _)| !members.is_empty())
        .enumerate()
        .map(|(id, (members, centroid))| {
            let points: Vec<FeaturePoint> = members
                .iter()
                .map(|s| FeaturePoint::from(s.features))
                .collect();
            let avg_features = average(&points);
            let (name, description, priority) = name_cluster(&avg_features);
            Cluster {
                id,
                name: name.to_string(),
                description: description.to_string(),
                priority,
                count: members.len(),
                members,
                centroid,
                avg_features,
            }
        })
        .collect()
}

pub async fn cluster_students<S, R>(
    store: &S,
    class_id: Uuid,
    options: &ClusterOptions,
    rng: &mut R,
) -> Result<ClusterReport>
where
    S: RecordStore + ?Sized,
    R: Rng + ?Sized,
{
    let roster = store.roster(class_id).await?;
    if roster.is_empty() {
        return Err(AnalyticsError::NoStudents);
    }

    let students: Vec<StudentSummary> = stream::iter(roster.iter())
        .map(|member| async move {
            let features = extract_features(store, member.student_id, class_id).await?;
            Ok::<_, AnalyticsError>(StudentSummary {
                student_id: member.student_id,
                name: member.full_name.clone(),
                features,
            })
        })
        .buffered(options.fan_out.max(1))
        .try_collect()
        .await?;

    let total_students = students.len();
    let clusters = build_clusters(students, options.k, rng);
    debug!(%class_id, total_students, clusters = clusters.len(), "clustered class roster");

    Ok(ClusterReport {
        class_id,
        total_students,
        clusters,
        generated_at: Utc::now(),
    })
}
