use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::advisory::{Advisory, Priority};

pub const MAX_GRADE: f64 = 10.0;
pub const APPROVAL_GRADE: f64 = 7.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRecord {
    pub student_id: Uuid,
    pub activity_id: Uuid,
    pub activity_title: String,
    pub tags: Vec<String>,
    pub grade: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

impl GradeRecord {
    /// The grade when it is present, finite and inside `[0, 10]`.
    pub fn valid_grade(&self) -> Option<f64> {
        self.grade
            .filter(|grade| grade.is_finite() && (0.0..=MAX_GRADE).contains(grade))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GamificationProfile {
    pub xp_total: u64,
    pub current_streak: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterMember {
    pub student_id: Uuid,
    pub full_name: String,
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub submission_id: Uuid,
    pub student_id: Uuid,
    pub activity_title: String,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: Uuid,
    pub title: String,
    pub url: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSource {
    pub id: Uuid,
    pub title: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub avg_grade: f64,
    pub submission_rate: f64,
    pub xp_total: u64,
    pub streak: u32,
}

/// The four clustering dimensions as floats, in a fixed order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FeaturePoint {
    pub avg_grade: f64,
    pub submission_rate: f64,
    pub xp: f64,
    pub streak: f64,
}

impl FeaturePoint {
    pub const DIMENSIONS: usize = 4;

    pub fn to_array(self) -> [f64; Self::DIMENSIONS] {
        [self.avg_grade, self.submission_rate, self.xp, self.streak]
    }

    pub fn from_array(values: [f64; Self::DIMENSIONS]) -> Self {
        Self {
            avg_grade: values[0],
            submission_rate: values[1],
            xp: values[2],
            streak: values[3],
        }
    }

    pub fn distance(&self, other: &FeaturePoint) -> f64 {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

impl From<FeatureVector> for FeaturePoint {
    fn from(features: FeatureVector) -> Self {
        Self {
            avg_grade: features.avg_grade,
            submission_rate: features.submission_rate,
            xp: features.xp_total as f64,
            streak: features.streak as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendResult {
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub next_grade: f64,
    pub trend: Trend,
    pub slope: f64,
    pub intercept: f64,
    pub approval_probability: f64,
    pub average: f64,
    pub std_dev: f64,
    pub consistency: Consistency,
    pub total_grades: usize,
    pub is_at_risk: bool,
    pub needs_attention: bool,
    pub engagement_score: f64,
    pub recommendations: Vec<Advisory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    pub student_id: Uuid,
    pub name: String,
    pub features: FeatureVector,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub id: usize,
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub count: usize,
    pub members: Vec<StudentSummary>,
    pub centroid: FeaturePoint,
    pub avg_features: FeaturePoint,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub class_id: Uuid,
    pub total_students: usize,
    pub clusters: Vec<Cluster>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentRecord {
    pub submission_id: Uuid,
    pub student_id: Uuid,
    pub activity_title: String,
    pub sentiment: Sentiment,
    pub score: f64,
    pub raw_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentAlert {
    pub student_id: Uuid,
    pub activity_title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentSummary {
    pub class_id: Uuid,
    pub total_feedbacks: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub avg_score: f64,
    pub overall_sentiment: Sentiment,
    pub feedbacks: Vec<SentimentRecord>,
    pub alerts: Vec<SentimentAlert>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeakArea {
    pub activity_id: Uuid,
    pub title: String,
    pub grade: f64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationBundle {
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub weak_areas: Vec<WeakArea>,
    pub topics_needing_help: Vec<String>,
    pub materials: Vec<Material>,
    pub training_sources: Vec<TrainingSource>,
    pub suggested_actions: Vec<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InactivityFlag {
    pub student_id: Uuid,
    pub name: String,
    pub risk: Priority,
    pub reason: String,
    pub days_since_activity: i64,
}

/// Graded work per band of the 0-10 scale. Grades are rounded to one
/// decimal before banding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GradeBuckets {
    #[serde(rename = "0-4.9")]
    pub failing: usize,
    #[serde(rename = "5-6.9")]
    pub below_approval: usize,
    #[serde(rename = "7-8.4")]
    pub approved: usize,
    #[serde(rename = "8.5-10")]
    pub outstanding: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AtRiskStudent {
    pub student_id: Uuid,
    pub name: String,
    pub avg_grade: f64,
    pub avg_recent: f64,
    pub risk: Priority,
    pub reasons: Vec<String>,
    pub graded_submissions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassPerformance {
    pub class_id: Uuid,
    pub avg_grade: f64,
    pub recent_avg: f64,
    pub std_dev: f64,
    pub consistency: Consistency,
    pub trend: Trend,
    pub total_submissions: usize,
    pub total_students: usize,
    pub total_xp: u64,
    pub engagement: EngagementLevel,
    pub grade_buckets: GradeBuckets,
    pub avg_days_between_submissions: Option<f64>,
    pub submissions_per_student: f64,
}

/// One line of a submissions CSV export.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRow {
    pub student_id: Uuid,
    pub full_name: String,
    pub class_id: Uuid,
    pub activity_id: Uuid,
    pub activity_title: String,
    pub tags: String,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub source_key: Option<String>,
}

impl SubmissionRow {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .split(';')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn to_grade_record(&self) -> GradeRecord {
        GradeRecord {
            student_id: self.student_id,
            activity_id: self.activity_id,
            activity_title: self.activity_title.clone(),
            tags: self.tag_list(),
            grade: self.grade,
            submitted_at: self.submitted_at,
        }
    }
}
