use serde::Serialize;

use crate::models::{Cluster, Sentiment, SentimentSummary};

pub const LOW_ENGAGEMENT: f64 = 30.0;
pub const STEEP_DECLINE: f64 = -0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    pub priority: Priority,
    pub title: String,
    pub message: String,
}

impl Advisory {
    pub fn new(priority: Priority, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            priority,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Inputs of the trend rule set, taken from a fitted grade history.
#[derive(Debug, Clone, Copy)]
pub struct TrendSignals {
    pub is_at_risk: bool,
    pub needs_attention: bool,
    pub slope: f64,
    pub engagement_score: f64,
}

/// Rules fire in a fixed order and each appends one advisory. The result is
/// never re-sorted by priority.
pub fn trend_advisories(signals: &TrendSignals) -> Vec<Advisory> {
    let mut advisories = Vec::new();

    if signals.is_at_risk {
        advisories.push(Advisory::new(
            Priority::High,
            "Aluno em risco",
            "Agendar reunião individual urgente",
        ));
        advisories.push(Advisory::new(
            Priority::High,
            "Revisar conceitos básicos",
            "Oferecer material de reforço",
        ));
    }

    if signals.needs_attention {
        advisories.push(Advisory::new(
            Priority::Medium,
            "Monitorar progresso",
            "Oferecer suporte adicional se necessário",
        ));
    }

    if signals.slope < STEEP_DECLINE {
        advisories.push(Advisory::new(
            Priority::High,
            "Desempenho em queda",
            "Identificar causas e intervir rapidamente",
        ));
    }

    if signals.engagement_score < LOW_ENGAGEMENT {
        advisories.push(Advisory::new(
            Priority::Medium,
            "Baixo engajamento",
            "Incentivar participação e uso do chatbot",
        ));
    }

    if advisories.is_empty() {
        advisories.push(Advisory::new(
            Priority::Low,
            "Desempenho satisfatório",
            "Continue acompanhando o progresso",
        ));
    }

    advisories
}

pub fn cluster_advisories(clusters: &[Cluster]) -> Vec<Advisory> {
    clusters
        .iter()
        .filter(|cluster| cluster.count > 0 && cluster.priority >= Priority::High)
        .map(|cluster| {
            Advisory::new(
                cluster.priority,
                cluster.name.clone(),
                format!("{} ({} alunos)", cluster.description, cluster.count),
            )
        })
        .collect()
}

pub fn sentiment_advisories(summary: &SentimentSummary) -> Vec<Advisory> {
    let mut advisories = Vec::new();

    if !summary.alerts.is_empty() {
        advisories.push(Advisory::new(
            Priority::High,
            "Feedback negativo",
            format!(
                "{} feedback(s) negativo(s) detectado(s) - verificar",
                summary.alerts.len()
            ),
        ));
    }

    if summary.overall_sentiment == Sentiment::Negative {
        advisories.push(Advisory::new(
            Priority::Medium,
            "Clima da turma negativo",
            format!("Pontuação média de sentimento {:.2}", summary.avg_score),
        ));
    }

    advisories
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeaturePoint, SentimentAlert};
    use uuid::Uuid;

    fn signals(
        is_at_risk: bool,
        needs_attention: bool,
        slope: f64,
        engagement: f64,
    ) -> TrendSignals {
        TrendSignals {
            is_at_risk,
            needs_attention,
            slope,
            engagement_score: engagement,
        }
    }

    fn titles(advisories: &[Advisory]) -> Vec<&str> {
        advisories.iter().map(|a| a.title.as_str()).collect()
    }

    #[test]
    fn satisfactory_when_no_rule_matches() {
        let advisories = trend_advisories(&signals(false, false, 0.0, 80.0));
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].priority, Priority::Low);
        assert_eq!(advisories[0].title, "Desempenho satisfatório");
    }

    #[test]
    fn rules_append_in_fixed_order() {
        let advisories = trend_advisories(&signals(true, false, -0.5, 10.0));
        assert_eq!(
            titles(&advisories),
            vec![
                "Aluno em risco",
                "Revisar conceitos básicos",
                "Desempenho em queda",
                "Baixo engajamento",
            ]
        );
    }

    #[test]
    fn attention_and_low_engagement_are_medium() {
        let advisories = trend_advisories(&signals(false, true, 0.0, 0.0));
        assert_eq!(titles(&advisories), vec!["Monitorar progresso", "Baixo engajamento"]);
        assert!(advisories.iter().all(|a| a.priority == Priority::Medium));
    }

    #[test]
    fn mild_decline_does_not_trigger_falling_rule() {
        let advisories = trend_advisories(&signals(false, false, -0.15, 50.0));
        assert_eq!(titles(&advisories), vec!["Desempenho satisfatório"]);
    }

    fn cluster(name: &str, priority: Priority, count: usize) -> Cluster {
        Cluster {
            id: 0,
            name: name.to_string(),
            description: "desc".to_string(),
            priority,
            count,
            members: Vec::new(),
            centroid: FeaturePoint::default(),
            avg_features: FeaturePoint::default(),
        }
    }

    #[test]
    fn only_high_and_critical_clusters_raise_advisories() {
        let clusters = vec![
            cluster("Excelentes", Priority::Low, 3),
            cluster("Em Risco", Priority::High, 2),
            cluster("Desengajados", Priority::Critical, 1),
        ];
        let advisories = cluster_advisories(&clusters);
        assert_eq!(titles(&advisories), vec!["Em Risco", "Desengajados"]);
        assert!(advisories[0].message.contains("2 alunos"));
    }

    #[test]
    fn negative_feedback_raises_sentiment_advisories() {
        let summary = SentimentSummary {
            class_id: Uuid::new_v4(),
            total_feedbacks: 1,
            positive: 0,
            negative: 1,
            neutral: 0,
            avg_score: 0.3,
            overall_sentiment: Sentiment::Negative,
            feedbacks: Vec::new(),
            alerts: vec![SentimentAlert {
                student_id: Uuid::new_v4(),
                activity_title: "Lista 1".to_string(),
                message: "Feedback negativo detectado - verificar".to_string(),
            }],
        };
        let advisories = sentiment_advisories(&summary);
        assert_eq!(advisories.len(), 2);
        assert_eq!(advisories[0].priority, Priority::High);
        assert_eq!(advisories[1].priority, Priority::Medium);
    }
}
