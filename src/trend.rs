use tracing::{debug, warn};
use uuid::Uuid;

use crate::advisory::{trend_advisories, TrendSignals, STEEP_DECLINE};
use crate::error::{AnalyticsError, Result};
use crate::features::{mean, valid_grades};
use crate::models::{
    Consistency, GamificationProfile, Trend, TrendResult, APPROVAL_GRADE, MAX_GRADE,
};
use crate::store::RecordStore;

pub const MIN_SAMPLES: usize = 3;
pub const TREND_THRESHOLD: f64 = 0.1;
pub const TREND_ADJUSTMENT: f64 = 15.0;
pub const RISK_AVERAGE: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Ordinary least squares over `(index, grade)` pairs.
///
/// Returns `None` for fewer than two points, where the denominator of the
/// normal equations vanishes.
pub fn fit_trend(grades: &[f64]) -> Option<LinearFit> {
    let n = grades.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in grades.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        warn!(points = grades.len(), "degenerate regression input");
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Some(LinearFit { slope, intercept })
}

/// Standard deviation of the grades around their mean.
///
/// Divides by `n` (population form) rather than `n - 1`, so a series of
/// identical grades and a single grade both give zero.
pub fn std_dev(grades: &[f64]) -> f64 {
    if grades.is_empty() {
        return 0.0;
    }
    let average = mean(grades);
    let variance = grades.iter().map(|g| (g - average).powi(2)).sum::<f64>() / grades.len() as f64;
    variance.sqrt()
}

pub fn trend_label(slope: f64) -> Trend {
    if slope > TREND_THRESHOLD {
        Trend::Improving
    } else if slope < -TREND_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

pub fn consistency(std_dev: f64) -> Consistency {
    if std_dev < 1.5 {
        Consistency::High
    } else if std_dev < 2.5 {
        Consistency::Medium
    } else {
        Consistency::Low
    }
}

/// Percentage of passing grades, shifted by the trend and kept in `[0, 100]`.
pub fn approval_probability(grades: &[f64], slope: f64) -> f64 {
    if grades.is_empty() {
        return 0.0;
    }
    let passed = grades.iter().filter(|&&g| g >= APPROVAL_GRADE).count();
    let mut probability = passed as f64 / grades.len() as f64 * 100.0;
    if slope > TREND_THRESHOLD {
        probability += TREND_ADJUSTMENT;
    }
    if slope < STEEP_DECLINE {
        probability -= TREND_ADJUSTMENT;
    }
    probability.clamp(0.0, 100.0)
}

pub fn engagement_score(profile: Option<GamificationProfile>) -> f64 {
    profile
        .map(|p| (p.xp_total as f64 / 1000.0 * 100.0 + p.current_streak as f64 * 5.0).min(100.0))
        .unwrap_or(0.0)
}

pub fn build_trend(
    student_id: Uuid,
    class_id: Uuid,
    grades: &[f64],
    profile: Option<GamificationProfile>,
) -> Result<TrendResult> {
    if grades.len() < MIN_SAMPLES {
        return Err(AnalyticsError::InsufficientData {
            found: grades.len(),
        });
    }
    let fit = fit_trend(grades).ok_or(AnalyticsError::InsufficientData {
        found: grades.len(),
    })?;

    let average = mean(grades);
    let deviation = std_dev(grades);
    let is_at_risk =
        average < RISK_AVERAGE || (fit.slope < STEEP_DECLINE && average < APPROVAL_GRADE);
    let needs_attention = (RISK_AVERAGE..APPROVAL_GRADE).contains(&average);
    let engagement = engagement_score(profile);

    let recommendations = trend_advisories(&TrendSignals {
        is_at_risk,
        needs_attention,
        slope: fit.slope,
        engagement_score: engagement,
    });

    Ok(TrendResult {
        student_id,
        class_id,
        next_grade: fit.at(grades.len() as f64).clamp(0.0, MAX_GRADE),
        trend: trend_label(fit.slope),
        slope: fit.slope,
        intercept: fit.intercept,
        approval_probability: approval_probability(grades, fit.slope),
        average,
        std_dev: deviation,
        consistency: consistency(deviation),
        total_grades: grades.len(),
        is_at_risk,
        needs_attention,
        engagement_score: engagement,
        recommendations,
    })
}

pub async fn predict_performance<S>(
    store: &S,
    student_id: Uuid,
    class_id: Uuid,
) -> Result<TrendResult>
where
    S: RecordStore + ?Sized,
{
    let records = store.graded_submissions(student_id, class_id).await?;
    let grades = valid_grades(&records);
    if grades.len() < MIN_SAMPLES {
        return Err(AnalyticsError::InsufficientData {
            found: grades.len(),
        });
    }

    let profile = store.gamification_profile(student_id).await?;
    let result = build_trend(student_id, class_id, &grades, profile)?;
    debug!(
        %student_id,
        %class_id,
        slope = result.slope,
        next_grade = result.next_grade,
        at_risk = result.is_at_risk,
        "predicted student performance"
    );
    Ok(result)
}
