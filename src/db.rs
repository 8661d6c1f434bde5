use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    FeedbackRecord, GamificationProfile, GradeRecord, Material, RosterMember, SubmissionRow,
    TrainingSource,
};
use crate::store::RecordStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn grade_record(row: &PgRow) -> GradeRecord {
    GradeRecord {
        student_id: row.get("student_id"),
        activity_id: row.get("activity_id"),
        activity_title: row.get("title"),
        tags: row.get("tags"),
        grade: row.get("grade"),
        submitted_at: row.get("submitted_at"),
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn graded_submissions(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> Result<Vec<GradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT s.student_id, s.activity_id, a.title, a.tags, s.grade, s.submitted_at
            FROM student_analytics.submissions s
            JOIN student_analytics.activities a ON a.id = s.activity_id
            WHERE s.student_id = $1 AND a.class_id = $2 AND s.grade IS NOT NULL
            ORDER BY s.submitted_at ASC
            "#,
        )
        .bind(student_id)
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(grade_record).collect())
    }

    async fn class_graded_submissions(&self, class_id: Uuid) -> Result<Vec<GradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT s.student_id, s.activity_id, a.title, a.tags, s.grade, s.submitted_at
            FROM student_analytics.submissions s
            JOIN student_analytics.activities a ON a.id = s.activity_id
            WHERE a.class_id = $1 AND s.grade IS NOT NULL
            ORDER BY s.submitted_at ASC
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(grade_record).collect())
    }

    async fn class_feedback(&self, class_id: Uuid) -> Result<Vec<FeedbackRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.student_id, a.title, s.feedback
            FROM student_analytics.submissions s
            JOIN student_analytics.activities a ON a.id = s.activity_id
            WHERE a.class_id = $1 AND s.feedback IS NOT NULL
            ORDER BY s.submitted_at ASC
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FeedbackRecord {
                submission_id: row.get("id"),
                student_id: row.get("student_id"),
                activity_title: row.get("title"),
                feedback: row.get("feedback"),
            })
            .collect())
    }

    async fn roster(&self, class_id: Uuid) -> Result<Vec<RosterMember>> {
        let rows = sqlx::query(
            r#"
            SELECT m.student_id, st.full_name, m.joined_at
            FROM student_analytics.class_members m
            JOIN student_analytics.students st ON st.id = m.student_id
            WHERE m.class_id = $1 AND m.role = 'student'
            ORDER BY st.full_name
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RosterMember {
                student_id: row.get("student_id"),
                full_name: row.get("full_name"),
                joined_at: row.get("joined_at"),
            })
            .collect())
    }

    async fn activity_count(&self, class_id: Uuid) -> Result<usize> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM student_analytics.activities WHERE class_id = $1",
        )
        .bind(class_id)
        .fetch_one(&self.pool)
        .await?
        .get("total");

        Ok(usize::try_from(total).unwrap_or(0))
    }

    async fn gamification_profile(&self, student_id: Uuid) -> Result<Option<GamificationProfile>> {
        let row = sqlx::query(
            r#"
            SELECT xp_total, current_streak
            FROM student_analytics.gamification_profiles
            WHERE student_id = $1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let xp_total: i64 = row.get("xp_total");
            let current_streak: i32 = row.get("current_streak");
            GamificationProfile {
                xp_total: u64::try_from(xp_total).unwrap_or(0),
                current_streak: u32::try_from(current_streak).unwrap_or(0),
            }
        }))
    }

    async fn latest_submission_at(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>> {
        let latest = sqlx::query(
            r#"
            SELECT MAX(s.submitted_at) AS latest
            FROM student_analytics.submissions s
            JOIN student_analytics.activities a ON a.id = s.activity_id
            WHERE s.student_id = $1 AND a.class_id = $2
            "#,
        )
        .bind(student_id)
        .bind(class_id)
        .fetch_one(&self.pool)
        .await?
        .get("latest");

        Ok(latest)
    }

    async fn materials_with_tags(&self, class_id: Uuid, tags: &[String]) -> Result<Vec<Material>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, url, tags
            FROM student_analytics.class_materials
            WHERE class_id = $1 AND tags && $2
            ORDER BY title
            "#,
        )
        .bind(class_id)
        .bind(tags)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Material {
                id: row.get("id"),
                title: row.get("title"),
                url: row.get("url"),
                tags: row.get("tags"),
            })
            .collect())
    }

    async fn training_sources_with_tags(
        &self,
        class_id: Uuid,
        tags: &[String],
    ) -> Result<Vec<TrainingSource>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, tags
            FROM student_analytics.training_sources
            WHERE class_id = $1 AND is_active AND tags && $2
            ORDER BY title
            "#,
        )
        .bind(class_id)
        .bind(tags)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TrainingSource {
                id: row.get("id"),
                title: row.get("title"),
                tags: row.get("tags"),
            })
            .collect())
    }
}

async fn upsert_student(pool: &PgPool, id: Uuid, full_name: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_analytics.students (id, full_name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name
        "#,
    )
    .bind(id)
    .bind(full_name)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_class(pool: &PgPool, id: Uuid, name: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_analytics.classes (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

async fn enroll(
    pool: &PgPool,
    class_id: Uuid,
    student_id: Uuid,
    joined_at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_analytics.class_members (class_id, student_id, role, joined_at)
        VALUES ($1, $2, 'student', $3)
        ON CONFLICT (class_id, student_id) DO NOTHING
        "#,
    )
    .bind(class_id)
    .bind(student_id)
    .bind(joined_at)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_activity(
    pool: &PgPool,
    id: Uuid,
    class_id: Uuid,
    title: &str,
    tags: &[String],
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_analytics.activities (id, class_id, title, tags)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, tags = EXCLUDED.tags
        "#,
    )
    .bind(id)
    .bind(class_id)
    .bind(title)
    .bind(tags)
    .execute(pool)
    .await?;
    Ok(())
}

/// Inserts a submission unless its source key was already loaded. Returns
/// whether a row was written.
async fn insert_submission(
    pool: &PgPool,
    record: &GradeRecord,
    feedback: Option<&str>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO student_analytics.submissions
        (id, activity_id, student_id, grade, feedback, submitted_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(record.activity_id)
    .bind(record.student_id)
    .bind(record.grade)
    .bind(feedback)
    .bind(record.submitted_at)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let class_id = Uuid::parse_str("7b0e4c1a-5d2f-4c9e-9a61-2f3b8d4e6a10")?;
    upsert_class(pool, class_id, "Matemática 7A").await?;

    let activities = vec![
        (
            Uuid::parse_str("a1c3e5f7-0b2d-4f68-8a9c-1e3f5a7b9c01")?,
            "Frações",
            vec!["frações"],
        ),
        (
            Uuid::parse_str("a1c3e5f7-0b2d-4f68-8a9c-1e3f5a7b9c02")?,
            "Decimais",
            vec!["decimais", "frações"],
        ),
        (
            Uuid::parse_str("a1c3e5f7-0b2d-4f68-8a9c-1e3f5a7b9c03")?,
            "Porcentagem",
            vec!["porcentagem"],
        ),
        (
            Uuid::parse_str("a1c3e5f7-0b2d-4f68-8a9c-1e3f5a7b9c04")?,
            "Geometria plana",
            vec!["geometria"],
        ),
        (
            Uuid::parse_str("a1c3e5f7-0b2d-4f68-8a9c-1e3f5a7b9c05")?,
            "Equações",
            vec!["álgebra"],
        ),
    ];

    for (id, title, tags) in activities.iter() {
        let tags: Vec<String> = tags.iter().map(|tag| tag.to_string()).collect();
        upsert_activity(pool, *id, class_id, title, &tags).await?;
    }

    let start = Utc
        .with_ymd_and_hms(2026, 3, 2, 13, 0, 0)
        .single()
        .context("invalid date")?;

    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Avery Lee",
            [Some(9.0), Some(9.5), Some(8.5), Some(9.0), Some(9.5)],
            (900, 12),
            Some("Adorei a aula, muito bom"),
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Jules Moreno",
            [Some(7.0), Some(6.5), Some(7.5), Some(6.0), None],
            (300, 3),
            Some("ok, razoável"),
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kiara Patel",
            [Some(8.0), Some(6.5), Some(5.0), Some(4.5), Some(4.0)],
            (150, 1),
            Some("Achei difícil e confuso, não entendi"),
        ),
        (
            Uuid::parse_str("5e8a2c47-91d3-4b6f-a0e2-7c5d3b1f9e84")?,
            "Davi Rocha",
            [Some(4.0), None, None, None, None],
            (0, 0),
            None,
        ),
        (
            Uuid::parse_str("f2b9d6e1-3a4c-4e7b-8d5f-0a1c2e3b4d5f")?,
            "Lia Santos",
            [Some(5.0), Some(5.5), Some(6.0), Some(6.5), Some(7.0)],
            (400, 5),
            Some("Gostei, obrigado professor"),
        ),
    ];

    for (student_index, (student_id, name, grades, (xp_total, streak), feedback)) in
        students.iter().enumerate()
    {
        upsert_student(pool, *student_id, name).await?;
        enroll(pool, class_id, *student_id, Some(start - Duration::days(7))).await?;

        sqlx::query(
            r#"
            INSERT INTO student_analytics.gamification_profiles
            (student_id, xp_total, current_streak)
            VALUES ($1, $2, $3)
            ON CONFLICT (student_id) DO UPDATE
            SET xp_total = EXCLUDED.xp_total, current_streak = EXCLUDED.current_streak
            "#,
        )
        .bind(student_id)
        .bind(*xp_total as i64)
        .bind(*streak as i32)
        .execute(pool)
        .await?;

        for (activity_index, grade) in grades.iter().enumerate() {
            let Some(grade) = grade else { continue };
            let (activity_id, title, tags) = &activities[activity_index];
            let record = GradeRecord {
                student_id: *student_id,
                activity_id: *activity_id,
                activity_title: title.to_string(),
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
                grade: Some(*grade),
                submitted_at: start + Duration::days(7 * activity_index as i64),
            };
            let feedback = if activity_index == 0 { *feedback } else { None };
            let source_key = format!("seed-{student_index}-{activity_index}");
            insert_submission(pool, &record, feedback, &source_key).await?;
        }
    }

    let materials = vec![
        ("Frações na prática", Some("https://example.com/fracoes"), vec!["frações"]),
        ("Exercícios de decimais", None, vec!["decimais"]),
        ("Introdução à geometria", None, vec!["geometria"]),
    ];

    for (title, url, tags) in materials {
        let tags: Vec<String> = tags.into_iter().map(str::to_string).collect();
        sqlx::query(
            r#"
            INSERT INTO student_analytics.class_materials (id, class_id, title, url, tags)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM student_analytics.class_materials WHERE class_id = $2 AND title = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(class_id)
        .bind(title)
        .bind(url)
        .bind(&tags)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO student_analytics.training_sources (id, class_id, title, tags, is_active)
        SELECT $1, $2, $3, $4, TRUE
        WHERE NOT EXISTS (
            SELECT 1 FROM student_analytics.training_sources WHERE class_id = $2 AND title = $3
        )
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(class_id)
    .bind("Apostila de frações e decimais")
    .bind(vec!["frações".to_string(), "decimais".to_string()])
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<SubmissionRow>() {
        let row = result?;
        let record = row.to_grade_record();

        upsert_student(pool, row.student_id, &row.full_name).await?;
        upsert_class(pool, row.class_id, &row.class_id.to_string()).await?;
        enroll(pool, row.class_id, row.student_id, None).await?;
        upsert_activity(
            pool,
            row.activity_id,
            row.class_id,
            &row.activity_title,
            &record.tags,
        )
        .await?;

        let source_key = row
            .source_key
            .clone()
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_submission(pool, &record, row.feedback.as_deref(), &source_key).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}
