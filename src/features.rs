use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{FeatureVector, GradeRecord};
use crate::store::RecordStore;

pub fn valid_grades(records: &[GradeRecord]) -> Vec<f64> {
    records.iter().filter_map(GradeRecord::valid_grade).collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Share of the class's activities the student has graded work for.
pub fn submission_rate(graded: usize, total_activities: usize) -> f64 {
    (graded as f64 / total_activities.max(1) as f64).clamp(0.0, 1.0)
}

pub async fn extract_features<S>(
    store: &S,
    student_id: Uuid,
    class_id: Uuid,
) -> Result<FeatureVector>
where
    S: RecordStore + ?Sized,
{
    let records = store.graded_submissions(student_id, class_id).await?;
    let total_activities = store.activity_count(class_id).await?;
    let profile = store.gamification_profile(student_id).await?.unwrap_or_default();

    let grades = valid_grades(&records);
    let features = FeatureVector {
        avg_grade: mean(&grades),
        submission_rate: submission_rate(grades.len(), total_activities),
        xp_total: profile.xp_total,
        streak: profile.current_streak,
    };

    debug!(
        %student_id,
        %class_id,
        graded = grades.len(),
        total_activities,
        "extracted student features"
    );
    Ok(features)
}
