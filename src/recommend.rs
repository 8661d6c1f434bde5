use tracing::debug;
use uuid::Uuid;

use crate::error::{AnalyticsError, Result};
use crate::models::{GradeRecord, RecommendationBundle, WeakArea, APPROVAL_GRADE};
use crate::store::RecordStore;

pub const TOP_TOPICS: usize = 3;

pub const SUGGESTED_ACTIONS: &[&str] = &[
    "Revisar materiais recomendados",
    "Usar o chatbot para tirar dúvidas",
    "Refazer atividades com nota baixa",
    "Pedir ajuda ao professor",
];

const NO_WEAK_AREAS: &str = "Nenhuma área de dificuldade identificada";

pub fn weak_areas(records: &[GradeRecord]) -> Vec<WeakArea> {
    records
        .iter()
        .filter_map(|record| {
            record
                .valid_grade()
                .filter(|&grade| grade < APPROVAL_GRADE)
                .map(|grade| WeakArea {
                    activity_id: record.activity_id,
                    title: record.activity_title.clone(),
                    grade,
                    tags: record.tags.clone(),
                })
        })
        .collect()
}

/// Most frequent tags across the weak areas. Equal counts keep the order in
/// which the tags were first seen.
pub fn top_tags(areas: &[WeakArea], limit: usize) -> Vec<String> {
    let mut frequency: Vec<(&str, usize)> = Vec::new();
    for tag in areas.iter().flat_map(|area| area.tags.iter()) {
        match frequency.iter_mut().find(|(seen, _)| *seen == tag.as_str()) {
            Some((_, count)) => *count += 1,
            None => frequency.push((tag.as_str(), 1)),
        }
    }

    frequency.sort_by(|a, b| b.1.cmp(&a.1));
    frequency
        .into_iter()
        .take(limit)
        .map(|(tag, _)| tag.to_string())
        .collect()
}

pub async fn recommend_content<S>(
    store: &S,
    student_id: Uuid,
    class_id: Uuid,
) -> Result<RecommendationBundle>
where
    S: RecordStore + ?Sized,
{
    let records = store.graded_submissions(student_id, class_id).await?;
    if !records.iter().any(|record| record.valid_grade().is_some()) {
        return Err(AnalyticsError::NoData);
    }

    let weak = weak_areas(&records);
    if weak.is_empty() {
        return Ok(RecommendationBundle {
            student_id,
            class_id,
            weak_areas: Vec::new(),
            topics_needing_help: Vec::new(),
            materials: Vec::new(),
            training_sources: Vec::new(),
            suggested_actions: Vec::new(),
            message: Some(NO_WEAK_AREAS.to_string()),
        });
    }

    let topics = top_tags(&weak, TOP_TOPICS);
    let (materials, training_sources) = if topics.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        (
            store.materials_with_tags(class_id, &topics).await?,
            store.training_sources_with_tags(class_id, &topics).await?,
        )
    };

    debug!(
        %student_id,
        %class_id,
        weak_areas = weak.len(),
        materials = materials.len(),
        "built content recommendations"
    );

    Ok(RecommendationBundle {
        student_id,
        class_id,
        weak_areas: weak,
        topics_needing_help: topics,
        materials,
        training_sources,
        suggested_actions: SUGGESTED_ACTIONS.iter().map(|action| action.to_string()).collect(),
        message: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{Material, TrainingSource};
    use chrono::{Duration, TimeZone, Utc};

    fn area(tags: &[&str]) -> WeakArea {
        WeakArea {
            activity_id: Uuid::new_v4(),
            title: "Lista".to_string(),
            grade: 5.0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn graded(student_id: Uuid, title: &str, grade: f64, tags: &[&str], day: i64) -> GradeRecord {
        GradeRecord {
            student_id,
            activity_id: Uuid::new_v4(),
            activity_title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            grade: Some(grade),
            submitted_at: Utc.with_ymd_and_hms(2026, 5, 4, 14, 0, 0).unwrap() + Duration::days(day),
        }
    }

    #[test]
    fn top_tags_break_ties_by_first_encounter() {
        let areas = vec![
            area(&["geometria", "frações"]),
            area(&["álgebra", "frações"]),
            area(&["álgebra", "porcentagem"]),
        ];
        assert_eq!(top_tags(&areas, 3), vec!["frações", "álgebra", "geometria"]);
    }

    #[test]
    fn weak_areas_keep_grades_below_seven() {
        let student_id = Uuid::new_v4();
        let records = vec![
            graded(student_id, "Prova 1", 6.9, &[], 0),
            graded(student_id, "Prova 2", 7.0, &[], 1),
            graded(student_id, "Prova 3", 3.0, &[], 2),
        ];
        let titles: Vec<String> = weak_areas(&records).into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["Prova 1", "Prova 3"]);
    }

    #[tokio::test]
    async fn strong_student_gets_empty_bundle() {
        let class_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let mut store = MemoryStore::new();
        store.add_submission(class_id, graded(student_id, "Prova 1", 9.0, &["frações"], 0), None);

        let bundle = recommend_content(&store, student_id, class_id).await.unwrap();
        assert!(bundle.weak_areas.is_empty());
        assert!(bundle.topics_needing_help.is_empty());
        assert!(bundle.materials.is_empty());
        assert_eq!(bundle.message.as_deref(), Some(NO_WEAK_AREAS));
    }

    #[tokio::test]
    async fn no_graded_work_is_no_data() {
        let store = MemoryStore::new();
        let err = recommend_content(&store, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::NoData));
    }

    #[tokio::test]
    async fn materials_match_top_topics() {
        let class_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let mut store = MemoryStore::new();
        store.add_submission(class_id, graded(student_id, "Lista 1", 4.0, &["frações"], 0), None);
        let second = graded(student_id, "Lista 2", 5.5, &["frações", "decimais"], 1);
        store.add_submission(class_id, second, None);
        store.add_submission(class_id, graded(student_id, "Lista 3", 9.0, &["geometria"], 2), None);
        store.add_material(
            class_id,
            Material {
                id: Uuid::new_v4(),
                title: "Frações na prática".to_string(),
                url: Some("https://example.com/fracoes".to_string()),
                tags: vec!["frações".to_string()],
            },
        );
        store.add_material(
            class_id,
            Material {
                id: Uuid::new_v4(),
                title: "Geometria plana".to_string(),
                url: None,
                tags: vec!["geometria".to_string()],
            },
        );
        store.add_training_source(
            class_id,
            TrainingSource {
                id: Uuid::new_v4(),
                title: "Apostila de decimais".to_string(),
                tags: vec!["decimais".to_string()],
            },
            true,
        );

        let bundle = recommend_content(&store, student_id, class_id).await.unwrap();
        assert_eq!(bundle.weak_areas.len(), 2);
        assert_eq!(bundle.topics_needing_help, vec!["frações", "decimais"]);
        assert_eq!(bundle.materials.len(), 1);
        assert_eq!(bundle.materials[0].title, "Frações na prática");
        assert_eq!(bundle.training_sources.len(), 1);
        assert_eq!(bundle.suggested_actions.len(), SUGGESTED_ACTIONS.len());
        assert!(bundle.message.is_none());
    }
}
