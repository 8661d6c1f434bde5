use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use student_analytics::advisory::Priority;
use student_analytics::models::{GamificationProfile, GradeRecord, Material, RosterMember, Trend};
use student_analytics::report::{build_class_report, ClassReportInput};
use student_analytics::{
    analyze_sentiment, cluster_students, detect_inactivity, predict_performance,
    recommend_content, AnalyticsError, ClusterOptions, InactivityOptions, MemoryStore,
};

struct Class {
    id: Uuid,
    ana: Uuid,
    bruno: Uuid,
    caio: Uuid,
    store: MemoryStore,
}

fn term_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap()
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn class_fixture() -> Class {
    let class_id = Uuid::new_v4();
    let activities = [
        (Uuid::new_v4(), "Frações", tags(&["frações"])),
        (Uuid::new_v4(), "Decimais", tags(&["decimais"])),
        (Uuid::new_v4(), "Porcentagem", tags(&["decimais", "porcentagem"])),
        (Uuid::new_v4(), "Geometria", tags(&["geometria"])),
    ];

    let mut store = MemoryStore::new();
    let enroll = |store: &mut MemoryStore, name: &str| {
        let student_id = Uuid::new_v4();
        store.enroll(
            class_id,
            RosterMember {
                student_id,
                full_name: name.to_string(),
                joined_at: None,
            },
        );
        student_id
    };
    let ana = enroll(&mut store, "Ana Lima");
    let bruno = enroll(&mut store, "Bruno Alves");
    let caio = enroll(&mut store, "Caio Nunes");

    let grades = [(ana, vec![5.0, 6.0, 7.0, 8.0]), (bruno, vec![8.0, 6.0, 4.0])];
    for (student_id, series) in grades.iter() {
        for (index, grade) in series.iter().enumerate() {
            let (activity_id, title, activity_tags) = &activities[index];
            let feedback = match (index, *student_id == ana) {
                (0, true) => Some("Adorei, muito bom".to_string()),
                (0, false) => Some("Achei difícil".to_string()),
                _ => None,
            };
            store.add_submission(
                class_id,
                GradeRecord {
                    student_id: *student_id,
                    activity_id: *activity_id,
                    activity_title: title.to_string(),
                    tags: activity_tags.clone(),
                    grade: Some(*grade),
                    submitted_at: term_start() + Duration::days(index as i64),
                },
                feedback,
            );
        }
    }

    store.set_profile(
        ana,
        GamificationProfile {
            xp_total: 500,
            current_streak: 7,
        },
    );
    store.add_material(
        class_id,
        Material {
            id: Uuid::new_v4(),
            title: "Exercícios de decimais".to_string(),
            url: None,
            tags: tags(&["decimais"]),
        },
    );

    Class {
        id: class_id,
        ana,
        bruno,
        caio,
        store,
    }
}

#[tokio::test]
async fn forecasts_follow_each_grade_series() {
    let class = class_fixture();

    let ana = predict_performance(&class.store, class.ana, class.id).await.unwrap();
    assert_eq!(ana.trend, Trend::Improving);
    assert!((ana.slope - 1.0).abs() < 1e-9);
    assert!((ana.next_grade - 9.0).abs() < 1e-9);
    assert!(ana.engagement_score > 0.0);

    let bruno = predict_performance(&class.store, class.bruno, class.id).await.unwrap();
    assert_eq!(bruno.trend, Trend::Declining);
    assert!((bruno.next_grade - 2.0).abs() < 1e-9);

    let err = predict_performance(&class.store, class.caio, class.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::InsufficientData { found: 0 }));
}

#[tokio::test]
async fn clustering_places_every_student_once() {
    let class = class_fixture();
    let options = ClusterOptions {
        k: 2,
        ..ClusterOptions::default()
    };
    let mut rng = StdRng::seed_from_u64(11);

    let report = cluster_students(&class.store, class.id, &options, &mut rng)
        .await
        .unwrap();
    assert_eq!(report.total_students, 3);
    assert_eq!(report.clusters.iter().map(|c| c.count).sum::<usize>(), 3);

    let members: HashSet<Uuid> = report
        .clusters
        .iter()
        .flat_map(|c| c.members.iter().map(|m| m.student_id))
        .collect();
    assert_eq!(members, HashSet::from([class.ana, class.bruno, class.caio]));
}

#[tokio::test]
async fn feedback_and_recommendations_for_the_class() {
    let class = class_fixture();

    let sentiment = analyze_sentiment(&class.store, class.id).await.unwrap();
    assert_eq!(sentiment.total_feedbacks, 2);
    assert_eq!(sentiment.positive, 1);
    assert_eq!(sentiment.negative, 1);
    assert_eq!(sentiment.alerts.len(), 1);

    let bundle = recommend_content(&class.store, class.bruno, class.id).await.unwrap();
    assert_eq!(bundle.weak_areas.len(), 2);
    assert_eq!(bundle.topics_needing_help, vec!["decimais", "porcentagem"]);
    assert_eq!(bundle.materials.len(), 1);
    assert!(bundle.training_sources.is_empty());
}

#[tokio::test]
async fn inactivity_and_report_cover_the_roster() {
    let class = class_fixture();
    let now = term_start() + Duration::days(22);

    let flags = detect_inactivity(&class.store, class.id, now, &InactivityOptions::default())
        .await
        .unwrap();
    let order: Vec<Uuid> = flags.iter().map(|flag| flag.student_id).collect();
    assert_eq!(order, vec![class.bruno, class.ana, class.caio]);
    assert_eq!(flags[0].risk, Priority::Medium);
    assert_eq!(flags[2].risk, Priority::High);

    let mut rng = StdRng::seed_from_u64(3);
    let clusters = cluster_students(&class.store, class.id, &ClusterOptions::default(), &mut rng)
        .await
        .unwrap();
    let sentiment = analyze_sentiment(&class.store, class.id).await.unwrap();

    let markdown = build_class_report(&ClassReportInput {
        class_id: class.id,
        generated_at: now,
        clusters: Some(&clusters),
        sentiment: Some(&sentiment),
        inactivity: Some(&flags),
    });
    assert!(markdown.contains("## Student Groups"));
    assert!(markdown.contains("Caio Nunes (high risk): Nenhuma atividade realizada"));
    assert!(markdown.contains("Bruno Alves (medium risk): 20 dias sem atividade"));
}

#[tokio::test]
async fn csv_fixture_loads_into_memory_store() {
    let class_id = Uuid::new_v4();
    let student_id = Uuid::new_v4();
    let path = std::env::temp_dir().join(format!("submissions-{}.csv", Uuid::new_v4()));
    let mut csv = String::from(
        "student_id,full_name,class_id,activity_id,activity_title,tags,grade,feedback,\
         submitted_at,source_key\n",
    );
    for (day, grade) in [7.0, 7.5, 8.0].iter().enumerate() {
        csv.push_str(&format!(
            "{student_id},Dora Reis,{class_id},{},Lista {day},frações;decimais,{grade},,\
             2026-08-0{}T12:00:00Z,row-{day}\n",
            Uuid::new_v4(),
            day + 3
        ));
    }
    std::fs::write(&path, csv).unwrap();

    let store = MemoryStore::from_csv(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let forecast = predict_performance(&store, student_id, class_id).await.unwrap();
    assert_eq!(forecast.total_grades, 3);
    assert_eq!(forecast.trend, Trend::Improving);

    let err = analyze_sentiment(&store, class_id).await.unwrap_err();
    assert!(matches!(err, AnalyticsError::NoFeedback));
}
