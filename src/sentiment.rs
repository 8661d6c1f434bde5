use tracing::debug;
use uuid::Uuid;

use crate::error::{AnalyticsError, Result};
use crate::models::{FeedbackRecord, Sentiment, SentimentAlert, SentimentRecord, SentimentSummary};
use crate::store::RecordStore;

pub const POSITIVE_WORDS: &[&str] = &[
    "bom", "ótimo", "excelente", "adorei", "parabéns", "obrigado", "legal", "gostei", "perfeito",
];
pub const NEGATIVE_WORDS: &[&str] = &[
    "ruim", "difícil", "não entendi", "confuso", "complicado", "péssimo", "horrível", "errado",
];
pub const NEUTRAL_WORDS: &[&str] = &["ok", "normal", "médio", "razoável"];

const NEGATIVE_ALERT: &str = "Feedback negativo detectado - verificar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LexiconHits {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

fn hits(text: &str, lexicon: &[&str]) -> usize {
    lexicon.iter().filter(|word| text.contains(*word)).count()
}

/// Number of entries of each lexicon found in the text, case-insensitively.
pub fn lexicon_hits(text: &str) -> LexiconHits {
    let text = text.to_lowercase();
    LexiconHits {
        positive: hits(&text, POSITIVE_WORDS),
        negative: hits(&text, NEGATIVE_WORDS),
        neutral: hits(&text, NEUTRAL_WORDS),
    }
}

pub fn classify_text(text: &str) -> (Sentiment, f64) {
    let hits = lexicon_hits(text);
    if hits.positive > hits.negative {
        (Sentiment::Positive, (0.5 + 0.2 * hits.positive as f64).min(1.0))
    } else if hits.negative > hits.positive {
        (Sentiment::Negative, (0.5 - 0.2 * hits.negative as f64).max(0.0))
    } else {
        (Sentiment::Neutral, 0.5)
    }
}

pub fn overall_sentiment(avg_score: f64) -> Sentiment {
    if avg_score > 0.6 {
        Sentiment::Positive
    } else if avg_score < 0.4 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

pub fn summarize_feedback(
    class_id: Uuid,
    feedback: Vec<FeedbackRecord>,
) -> Result<SentimentSummary> {
    let records: Vec<SentimentRecord> = feedback
        .into_iter()
        .filter(|record| !record.feedback.trim().is_empty())
        .map(|record| {
            let (sentiment, score) = classify_text(&record.feedback);
            SentimentRecord {
                submission_id: record.submission_id,
                student_id: record.student_id,
                activity_title: record.activity_title,
                sentiment,
                score,
                raw_text: record.feedback,
            }
        })
        .collect();

    if records.is_empty() {
        return Err(AnalyticsError::NoFeedback);
    }

    let count = |label: Sentiment| records.iter().filter(|r| r.sentiment == label).count();
    let avg_score = records.iter().map(|r| r.score).sum::<f64>() / records.len() as f64;
    let alerts = records
        .iter()
        .filter(|r| r.sentiment == Sentiment::Negative)
        .map(|r| SentimentAlert {
            student_id: r.student_id,
            activity_title: r.activity_title.clone(),
            message: NEGATIVE_ALERT.to_string(),
        })
        .collect();

    Ok(SentimentSummary {
        class_id,
        total_feedbacks: records.len(),
        positive: count(Sentiment::Positive),
        negative: count(Sentiment::Negative),
        neutral: count(Sentiment::Neutral),
        avg_score,
        overall_sentiment: overall_sentiment(avg_score),
        feedbacks: records,
        alerts,
    })
}

pub async fn analyze_sentiment<S>(store: &S, class_id: Uuid) -> Result<SentimentSummary>
where
    S: RecordStore + ?Sized,
{
    let feedback = store.class_feedback(class_id).await?;
    let summary = summarize_feedback(class_id, feedback)?;
    debug!(
        %class_id,
        total = summary.total_feedbacks,
        negative = summary.negative,
        avg_score = summary.avg_score,
        "analyzed class feedback"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn feedback(text: &str) -> FeedbackRecord {
        FeedbackRecord {
            submission_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            activity_title: "Lista de frações".to_string(),
            feedback: text.to_string(),
        }
    }

    #[test]
    fn counts_distinct_lexicon_entries() {
        let hits = lexicon_hits("Muito BOM, adorei! bom bom");
        assert_eq!(hits.positive, 2);
        assert_eq!(hits.negative, 0);
        assert_eq!(lexicon_hits("ok, normal").neutral, 2);
    }

    #[test]
    fn scores_follow_the_majority_lexicon() {
        let (label, score) = classify_text("Excelente explicação, gostei");
        assert_eq!(label, Sentiment::Positive);
        assert!((score - 0.9).abs() < 1e-9);

        let (label, score) = classify_text("Ficou confuso e difícil, não entendi");
        assert_eq!(label, Sentiment::Negative);
        assert!(score.abs() < 1e-9);

        let (label, score) = classify_text("bom mas complicado");
        assert_eq!(label, Sentiment::Neutral);
        assert_eq!(score, 0.5);
    }

    #[test]
    fn positive_score_saturates_at_one() {
        let (_, score) = classify_text("bom ótimo excelente adorei parabéns");
        assert_eq!(score, 1.0);
    }

    #[test]
    fn overall_sentiment_thresholds() {
        assert_eq!(overall_sentiment(0.61), Sentiment::Positive);
        assert_eq!(overall_sentiment(0.6), Sentiment::Neutral);
        assert_eq!(overall_sentiment(0.4), Sentiment::Neutral);
        assert_eq!(overall_sentiment(0.39), Sentiment::Negative);
    }

    #[test]
    fn classification_is_idempotent() {
        let texts = ["Adorei a aula", "achei ruim", "ok", "Parabéns, perfeito!", ""];
        let first: Vec<(Sentiment, f64)> = texts.iter().map(|t| classify_text(t)).collect();
        let second: Vec<(Sentiment, f64)> = texts.iter().map(|t| classify_text(t)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn negative_records_raise_one_alert_each() {
        let summary = summarize_feedback(
            Uuid::new_v4(),
            vec![feedback("achei ruim"), feedback("muito confuso"), feedback("gostei")],
        )
        .unwrap();
        assert_eq!(summary.total_feedbacks, 3);
        assert_eq!(summary.negative, 2);
        assert_eq!(summary.positive, 1);
        assert_eq!(summary.alerts.len(), 2);
        // (0.3 + 0.3 + 0.7) / 3
        assert!((summary.avg_score - 1.3 / 3.0).abs() < 1e-9);
        assert_eq!(summary.overall_sentiment, Sentiment::Neutral);
    }

    #[test]
    fn blank_feedback_is_ignored() {
        let err = summarize_feedback(Uuid::new_v4(), vec![feedback("   ")]).unwrap_err();
        assert!(matches!(err, AnalyticsError::NoFeedback));
    }

    #[tokio::test]
    async fn class_without_feedback_fails() {
        let store = MemoryStore::new();
        let err = analyze_sentiment(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::NoFeedback));
    }
}
