//! Read-only access to the records the engine analyzes.
//!
//! Submissions, rosters, gamification profiles and class materials live in an
//! external store. Every operation in this crate reaches them through
//! [`RecordStore`], so the same routines run against Postgres ([`crate::db::PgStore`])
//! or an in-process fixture ([`crate::memory::MemoryStore`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    FeedbackRecord, GamificationProfile, GradeRecord, Material, RosterMember, TrainingSource,
};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Graded submissions of a student in a class, oldest first.
    async fn graded_submissions(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> Result<Vec<GradeRecord>>;

    /// Graded submissions of everyone in the class, oldest first.
    async fn class_graded_submissions(&self, class_id: Uuid) -> Result<Vec<GradeRecord>>;

    /// Submissions of the class that carry feedback text.
    async fn class_feedback(&self, class_id: Uuid) -> Result<Vec<FeedbackRecord>>;

    /// Members of the class enrolled with the student role.
    async fn roster(&self, class_id: Uuid) -> Result<Vec<RosterMember>>;

    async fn activity_count(&self, class_id: Uuid) -> Result<usize>;

    async fn gamification_profile(&self, student_id: Uuid) -> Result<Option<GamificationProfile>>;

    /// Most recent submission of the student in the class, graded or not.
    async fn latest_submission_at(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn materials_with_tags(&self, class_id: Uuid, tags: &[String]) -> Result<Vec<Material>>;

    /// Active training sources of the class sharing at least one tag.
    async fn training_sources_with_tags(
        &self,
        class_id: Uuid,
        tags: &[String],
    ) -> Result<Vec<TrainingSource>>;
}

pub fn tags_overlap(tags: &[String], wanted: &[String]) -> bool {
    tags.iter().any(|tag| wanted.contains(tag))
}
