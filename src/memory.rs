use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AnalyticsError, Result};
use crate::models::{
    FeedbackRecord, GamificationProfile, GradeRecord, Material, RosterMember, SubmissionRow,
    TrainingSource,
};
use crate::store::{tags_overlap, RecordStore};

#[derive(Debug, Clone)]
struct StoredSubmission {
    submission_id: Uuid,
    class_id: Uuid,
    record: GradeRecord,
    feedback: Option<String>,
}

#[derive(Debug, Default, Clone)]
struct ClassRecords {
    roster: Vec<RosterMember>,
    activities: HashSet<Uuid>,
    extra_activities: usize,
    materials: Vec<Material>,
    training_sources: Vec<(TrainingSource, bool)>,
}

/// In-process record store, filled from fixtures or a CSV export.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    classes: HashMap<Uuid, ClassRecords>,
    submissions: Vec<StoredSubmission>,
    profiles: HashMap<Uuid, GamificationProfile>,
    failing_students: HashSet<Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the rows of a submissions CSV. Students are enrolled in the
    /// class of each row and every distinct activity counts toward the
    /// class total. A row repeating an earlier `source_key` is skipped, as
    /// the Postgres import does.
    pub fn from_csv(path: &Path) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut store = Self::new();
        let mut seen_keys = HashSet::new();

        for result in reader.deserialize::<SubmissionRow>() {
            let row = result?;
            if let Some(key) = &row.source_key {
                if !seen_keys.insert(key.clone()) {
                    continue;
                }
            }
            store.enroll(
                row.class_id,
                RosterMember {
                    student_id: row.student_id,
                    full_name: row.full_name.clone(),
                    joined_at: None,
                },
            );
            store.add_submission(row.class_id, row.to_grade_record(), row.feedback.clone());
        }

        Ok(store)
    }

    /// Adds a student to the class roster; a repeated student is ignored.
    pub fn enroll(&mut self, class_id: Uuid, member: RosterMember) {
        let class = self.classes.entry(class_id).or_default();
        if !class
            .roster
            .iter()
            .any(|existing| existing.student_id == member.student_id)
        {
            class.roster.push(member);
        }
    }

    /// Activities that exist in the class but have no submission yet.
    pub fn add_unsubmitted_activities(&mut self, class_id: Uuid, count: usize) {
        self.classes.entry(class_id).or_default().extra_activities += count;
    }

    pub fn add_submission(
        &mut self,
        class_id: Uuid,
        record: GradeRecord,
        feedback: Option<String>,
    ) -> Uuid {
        let submission_id = Uuid::new_v4();
        self.classes
            .entry(class_id)
            .or_default()
            .activities
            .insert(record.activity_id);
        self.submissions.push(StoredSubmission {
            submission_id,
            class_id,
            record,
            feedback,
        });
        submission_id
    }

    pub fn set_profile(&mut self, student_id: Uuid, profile: GamificationProfile) {
        self.profiles.insert(student_id, profile);
    }

    pub fn add_material(&mut self, class_id: Uuid, material: Material) {
        self.classes.entry(class_id).or_default().materials.push(material);
    }

    pub fn add_training_source(&mut self, class_id: Uuid, source: TrainingSource, active: bool) {
        self.classes
            .entry(class_id)
            .or_default()
            .training_sources
            .push((source, active));
    }

    /// Makes every read scoped to this student fail like a dropped connection.
    pub fn fail_reads_for(&mut self, student_id: Uuid) {
        self.failing_students.insert(student_id);
    }

    fn check_student(&self, student_id: Uuid) -> Result<()> {
        if self.failing_students.contains(&student_id) {
            return Err(AnalyticsError::Store(sqlx::Error::Protocol(format!(
                "simulated read failure for student {student_id}"
            ))));
        }
        Ok(())
    }

    fn submissions_of(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> impl Iterator<Item = &StoredSubmission> {
        self.submissions
            .iter()
            .filter(move |s| s.class_id == class_id && s.record.student_id == student_id)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn graded_submissions(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> Result<Vec<GradeRecord>> {
        self.check_student(student_id)?;
        let mut records: Vec<GradeRecord> = self
            .submissions_of(student_id, class_id)
            .filter(|s| s.record.grade.is_some())
            .map(|s| s.record.clone())
            .collect();
        records.sort_by_key(|record| record.submitted_at);
        Ok(records)
    }

    async fn class_graded_submissions(&self, class_id: Uuid) -> Result<Vec<GradeRecord>> {
        let mut records = Vec::new();
        for stored in self.submissions.iter() {
            if stored.class_id != class_id || stored.record.grade.is_none() {
                continue;
            }
            self.check_student(stored.record.student_id)?;
            records.push(stored.record.clone());
        }
        records.sort_by_key(|record| record.submitted_at);
        Ok(records)
    }

    async fn class_feedback(&self, class_id: Uuid) -> Result<Vec<FeedbackRecord>> {
        Ok(self
            .submissions
            .iter()
            .filter(|s| s.class_id == class_id)
            .filter_map(|s| {
                s.feedback.as_ref().map(|feedback| FeedbackRecord {
                    submission_id: s.submission_id,
                    student_id: s.record.student_id,
                    activity_title: s.record.activity_title.clone(),
                    feedback: feedback.clone(),
                })
            })
            .collect())
    }

    async fn roster(&self, class_id: Uuid) -> Result<Vec<RosterMember>> {
        Ok(self
            .classes
            .get(&class_id)
            .map(|class| class.roster.clone())
            .unwrap_or_default())
    }

    async fn activity_count(&self, class_id: Uuid) -> Result<usize> {
        Ok(self
            .classes
            .get(&class_id)
            .map(|class| class.activities.len() + class.extra_activities)
            .unwrap_or(0))
    }

    async fn gamification_profile(&self, student_id: Uuid) -> Result<Option<GamificationProfile>> {
        self.check_student(student_id)?;
        Ok(self.profiles.get(&student_id).copied())
    }

    async fn latest_submission_at(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        self.check_student(student_id)?;
        Ok(self
            .submissions_of(student_id, class_id)
            .map(|s| s.record.submitted_at)
            .max())
    }

    async fn materials_with_tags(&self, class_id: Uuid, tags: &[String]) -> Result<Vec<Material>> {
        Ok(self
            .classes
            .get(&class_id)
            .map(|class| {
                class
                    .materials
                    .iter()
                    .filter(|material| tags_overlap(&material.tags, tags))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn training_sources_with_tags(
        &self,
        class_id: Uuid,
        tags: &[String],
    ) -> Result<Vec<TrainingSource>> {
        Ok(self
            .classes
            .get(&class_id)
            .map(|class| {
                class
                    .training_sources
                    .iter()
                    .filter(|(source, active)| *active && tags_overlap(&source.tags, tags))
                    .map(|(source, _)| source.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Test store that counts reads pending at the same time.
#[cfg(test)]
pub(crate) struct InFlightStore {
    inner: MemoryStore,
    in_flight: std::sync::atomic::AtomicUsize,
    peak: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl InFlightStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            in_flight: Default::default(),
            peak: Default::default(),
        }
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn track<T>(&self, read: impl std::future::Future<Output = T> + Send) -> T {
        use std::sync::atomic::Ordering;

        let pending = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(pending, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let value = read.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        value
    }
}

#[cfg(test)]
#[async_trait]
impl RecordStore for InFlightStore {
    async fn graded_submissions(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> Result<Vec<GradeRecord>> {
        self.track(self.inner.graded_submissions(student_id, class_id)).await
    }

    async fn class_graded_submissions(&self, class_id: Uuid) -> Result<Vec<GradeRecord>> {
        self.track(self.inner.class_graded_submissions(class_id)).await
    }

    async fn class_feedback(&self, class_id: Uuid) -> Result<Vec<FeedbackRecord>> {
        self.track(self.inner.class_feedback(class_id)).await
    }

    async fn roster(&self, class_id: Uuid) -> Result<Vec<RosterMember>> {
        self.inner.roster(class_id).await
    }

    async fn activity_count(&self, class_id: Uuid) -> Result<usize> {
        self.track(self.inner.activity_count(class_id)).await
    }

    async fn gamification_profile(&self, student_id: Uuid) -> Result<Option<GamificationProfile>> {
        self.track(self.inner.gamification_profile(student_id)).await
    }

    async fn latest_submission_at(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        self.track(self.inner.latest_submission_at(student_id, class_id)).await
    }

    async fn materials_with_tags(&self, class_id: Uuid, tags: &[String]) -> Result<Vec<Material>> {
        self.inner.materials_with_tags(class_id, tags).await
    }

    async fn training_sources_with_tags(
        &self,
        class_id: Uuid,
        tags: &[String],
    ) -> Result<Vec<TrainingSource>> {
        self.inner.training_sources_with_tags(class_id, tags).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(student_id: Uuid, grade: Option<f64>, day: i64) -> GradeRecord {
        GradeRecord {
            student_id,
            activity_id: Uuid::new_v4(),
            activity_title: format!("Atividade {day}"),
            tags: vec!["frações".to_string()],
            grade,
            submitted_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::days(day),
        }
    }

    #[tokio::test]
    async fn graded_submissions_are_ordered_and_skip_ungraded() {
        let class_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let mut store = MemoryStore::new();
        store.add_submission(class_id, record(student_id, Some(8.0), 5), None);
        store.add_submission(class_id, record(student_id, None, 3), None);
        store.add_submission(class_id, record(student_id, Some(6.0), 1), None);

        let records = store.graded_submissions(student_id, class_id).await.unwrap();
        let grades: Vec<Option<f64>> = records.iter().map(|r| r.grade).collect();
        assert_eq!(grades, vec![Some(6.0), Some(8.0)]);

        let latest = store.latest_submission_at(student_id, class_id).await.unwrap();
        assert_eq!(latest, Some(record(student_id, None, 5).submitted_at));
    }

    #[tokio::test]
    async fn activity_count_includes_unsubmitted_work() {
        let class_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let mut store = MemoryStore::new();
        store.add_submission(class_id, record(student_id, Some(8.0), 1), None);
        store.add_unsubmitted_activities(class_id, 3);
        assert_eq!(store.activity_count(class_id).await.unwrap(), 4);
        assert_eq!(store.activity_count(Uuid::new_v4()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn inactive_training_sources_are_hidden() {
        let class_id = Uuid::new_v4();
        let mut store = MemoryStore::new();
        let tags = vec!["álgebra".to_string()];
        store.add_training_source(
            class_id,
            TrainingSource {
                id: Uuid::new_v4(),
                title: "Apostila".to_string(),
                tags: tags.clone(),
            },
            false,
        );
        let sources = store.training_sources_with_tags(class_id, &tags).await.unwrap();
        assert!(sources.is_empty());
    }

    #[tokio::test]
    async fn failing_student_reads_return_store_errors() {
        let class_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let mut store = MemoryStore::new();
        store.fail_reads_for(student_id);
        let err = store.graded_submissions(student_id, class_id).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::Store(_)));
    }

    #[tokio::test]
    async fn class_grades_span_every_student() {
        let class_id = Uuid::new_v4();
        let (ana, bia) = (Uuid::new_v4(), Uuid::new_v4());
        let mut store = MemoryStore::new();
        store.add_submission(class_id, record(ana, Some(7.0), 4), None);
        store.add_submission(class_id, record(bia, Some(5.0), 2), None);
        store.add_submission(class_id, record(bia, None, 3), None);
        store.add_submission(Uuid::new_v4(), record(ana, Some(9.0), 1), None);

        let records = store.class_graded_submissions(class_id).await.unwrap();
        let grades: Vec<Option<f64>> = records.iter().map(|r| r.grade).collect();
        assert_eq!(grades, vec![Some(5.0), Some(7.0)]);
    }

    #[tokio::test]
    async fn csv_rows_sharing_a_source_key_load_once() {
        let class_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let path = std::env::temp_dir().join(format!("source-keys-{}.csv", Uuid::new_v4()));
        let mut csv = String::from(
            "student_id,full_name,class_id,activity_id,activity_title,tags,grade,feedback,\
             submitted_at,source_key\n",
        );
        for (day, key) in ["lote-1", "lote-1", "lote-1", ""].iter().enumerate() {
            csv.push_str(&format!(
                "{student_id},Rita Gomes,{class_id},{},Lista {day},frações,8,,\
                 2026-03-0{}T12:00:00Z,{key}\n",
                Uuid::new_v4(),
                day + 1
            ));
        }
        std::fs::write(&path, csv).unwrap();

        let store = MemoryStore::from_csv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let records = store.graded_submissions(student_id, class_id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(store.activity_count(class_id).await.unwrap(), 2);
    }
}
