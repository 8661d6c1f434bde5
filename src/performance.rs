//! Class-wide views: the roster's at-risk list and the grade profile of a
//! class as a whole.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;
use uuid::Uuid;

use crate::advisory::Priority;
use crate::error::{AnalyticsError, Result};
use crate::features::{mean, valid_grades};
use crate::models::{
    AtRiskStudent, ClassPerformance, EngagementLevel, GradeBuckets, GradeRecord, RosterMember,
    Trend,
};
use crate::store::RecordStore;
use crate::trend::{consistency, std_dev};

/// Most recent graded submissions considered per student.
pub const RISK_WINDOW: usize = 10;
pub const RECENT_GRADES: usize = 3;
pub const LOW_AVERAGE: f64 = 6.0;
pub const RECENT_DROP: f64 = 1.0;
pub const WIDE_SPREAD: f64 = 4.0;
pub const RECENT_DAYS: i64 = 28;
pub const CLASS_TREND_MARGIN: f64 = 0.3;

pub fn grade_buckets(grades: &[f64]) -> GradeBuckets {
    let mut buckets = GradeBuckets::default();
    for grade in grades {
        let tenths = (grade * 10.0).round();
        if tenths <= 49.0 {
            buckets.failing += 1;
        } else if tenths <= 69.0 {
            buckets.below_approval += 1;
        } else if tenths <= 84.0 {
            buckets.approved += 1;
        } else {
            buckets.outstanding += 1;
        }
    }
    buckets
}

/// Scores one student over their latest graded work. Returns `None` when
/// nothing is graded or no criterion fires.
pub fn assess_student(member: &RosterMember, records: &[GradeRecord]) -> Option<AtRiskStudent> {
    let latest_first: Vec<f64> = valid_grades(records)
        .into_iter()
        .rev()
        .take(RISK_WINDOW)
        .collect();
    if latest_first.is_empty() {
        return None;
    }

    let avg_grade = mean(&latest_first);
    let avg_recent = mean(&latest_first[..latest_first.len().min(RECENT_GRADES)]);
    let highest = latest_first
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let lowest = latest_first.iter().copied().fold(f64::INFINITY, f64::min);

    let mut score = 0;
    let mut reasons = Vec::new();
    if avg_grade < LOW_AVERAGE {
        score += 3;
        reasons.push("Média baixa".to_string());
    }
    if avg_recent < avg_grade - RECENT_DROP {
        score += 2;
        reasons.push("Queda recente".to_string());
    }
    if highest - lowest > WIDE_SPREAD {
        score += 1;
        reasons.push("Inconsistente".to_string());
    }
    if score == 0 {
        return None;
    }

    let risk = match score {
        s if s >= 4 => Priority::High,
        s if s >= 2 => Priority::Medium,
        _ => Priority::Low,
    };

    Some(AtRiskStudent {
        student_id: member.student_id,
        name: member.full_name.clone(),
        avg_grade,
        avg_recent,
        risk,
        reasons,
        graded_submissions: latest_first.len(),
    })
}

pub async fn identify_at_risk<S>(
    store: &S,
    class_id: Uuid,
    fan_out: usize,
) -> Result<Vec<AtRiskStudent>>
where
    S: RecordStore + ?Sized,
{
    let roster = store.roster(class_id).await?;
    if roster.is_empty() {
        return Err(AnalyticsError::NoStudents);
    }

    let submissions: Vec<Vec<GradeRecord>> = stream::iter(roster.iter())
        .map(|member| store.graded_submissions(member.student_id, class_id))
        .buffered(fan_out.max(1))
        .try_collect()
        .await?;

    let mut at_risk: Vec<AtRiskStudent> = roster
        .iter()
        .zip(submissions.iter())
        .filter_map(|(member, records)| assess_student(member, records))
        .collect();
    at_risk.sort_by(|a, b| b.risk.cmp(&a.risk));

    debug!(%class_id, roster = roster.len(), at_risk = at_risk.len(), "scored class risk");
    Ok(at_risk)
}

fn class_trend(recent_avg: f64, avg_grade: f64) -> Trend {
    if recent_avg > avg_grade + CLASS_TREND_MARGIN {
        Trend::Improving
    } else if recent_avg < avg_grade - CLASS_TREND_MARGIN {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

pub fn engagement_level(total_xp: u64) -> EngagementLevel {
    if total_xp > 5000 {
        EngagementLevel::High
    } else if total_xp > 2000 {
        EngagementLevel::Medium
    } else {
        EngagementLevel::Low
    }
}

/// Mean gap in days between consecutive submissions, in time order.
pub fn average_gap_days(timestamps: &[DateTime<Utc>]) -> Option<f64> {
    let mut sorted = timestamps.to_vec();
    sorted.sort();
    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_seconds() as f64 / 86_400.0)
        .collect();
    if gaps.is_empty() {
        None
    } else {
        Some(mean(&gaps))
    }
}

pub async fn class_performance<S>(
    store: &S,
    class_id: Uuid,
    now: DateTime<Utc>,
    fan_out: usize,
) -> Result<ClassPerformance>
where
    S: RecordStore + ?Sized,
{
    let records: Vec<GradeRecord> = store
        .class_graded_submissions(class_id)
        .await?
        .into_iter()
        .filter(|record| record.valid_grade().is_some())
        .collect();
    if records.is_empty() {
        return Err(AnalyticsError::NoData);
    }

    let grades = valid_grades(&records);
    let avg_grade = mean(&grades);
    let deviation = std_dev(&grades);

    let cutoff = now - Duration::days(RECENT_DAYS);
    let recent: Vec<f64> = records
        .iter()
        .filter(|record| record.submitted_at > cutoff)
        .filter_map(GradeRecord::valid_grade)
        .collect();
    let recent_avg = if recent.is_empty() {
        avg_grade
    } else {
        mean(&recent)
    };

    let mut seen = HashSet::new();
    let students: Vec<Uuid> = records
        .iter()
        .map(|record| record.student_id)
        .filter(|student_id| seen.insert(*student_id))
        .collect();

    let profiles: Vec<_> = stream::iter(students.iter())
        .map(|student_id| store.gamification_profile(*student_id))
        .buffered(fan_out.max(1))
        .try_collect()
        .await?;
    let total_xp: u64 = profiles
        .into_iter()
        .flatten()
        .map(|profile| profile.xp_total)
        .sum();

    let timestamps: Vec<DateTime<Utc>> = records.iter().map(|record| record.submitted_at).collect();

    let performance = ClassPerformance {
        class_id,
        avg_grade,
        recent_avg,
        std_dev: deviation,
        consistency: consistency(deviation),
        trend: class_trend(recent_avg, avg_grade),
        total_submissions: records.len(),
        total_students: students.len(),
        total_xp,
        engagement: engagement_level(total_xp),
        grade_buckets: grade_buckets(&grades),
        avg_days_between_submissions: average_gap_days(&timestamps),
        submissions_per_student: records.len() as f64 / students.len() as f64,
    };

    debug!(
        %class_id,
        submissions = performance.total_submissions,
        avg_grade = performance.avg_grade,
        "analyzed class performance"
    );
    Ok(performance)
}

pub async fn student_grade_buckets<S>(
    store: &S,
    student_id: Uuid,
    class_id: Uuid,
) -> Result<GradeBuckets>
where
    S: RecordStore + ?Sized,
{
    let records = store.graded_submissions(student_id, class_id).await?;
    Ok(grade_buckets(&valid_grades(&records)))
}
