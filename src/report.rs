use std::fmt::Write;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::advisory::{cluster_advisories, sentiment_advisories, Advisory};
use crate::models::{ClusterReport, InactivityFlag, SentimentSummary};

/// Sections gathered for one class. `None` means the operation had nothing
/// to analyze; the report says so instead of failing.
pub struct ClassReportInput<'a> {
    pub class_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub clusters: Option<&'a ClusterReport>,
    pub sentiment: Option<&'a SentimentSummary>,
    pub inactivity: Option<&'a [InactivityFlag]>,
}

pub fn class_advisories(input: &ClassReportInput<'_>) -> Vec<Advisory> {
    let mut advisories = Vec::new();
    if let Some(report) = input.clusters {
        advisories.extend(cluster_advisories(&report.clusters));
    }
    if let Some(summary) = input.sentiment {
        advisories.extend(sentiment_advisories(summary));
    }
    advisories
}

pub fn build_class_report(input: &ClassReportInput<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Class Analytics Report");
    let _ = writeln!(
        output,
        "Generated for class {} at {}",
        input.class_id,
        input.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Groups");

    match input.clusters {
        Some(report) if !report.clusters.is_empty() => {
            for cluster in report.clusters.iter() {
                let _ = writeln!(
                    output,
                    "- {} ({} priority): {} students, avg grade {:.1}, submission rate {:.0}%",
                    cluster.name,
                    cluster.priority.label(),
                    cluster.count,
                    cluster.avg_features.avg_grade,
                    cluster.avg_features.submission_rate * 100.0
                );
                for member in cluster.members.iter() {
                    let _ = writeln!(output, "  - {}", member.name);
                }
            }
        }
        _ => {
            let _ = writeln!(output, "No students enrolled in this class.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Feedback Sentiment");

    match input.sentiment {
        Some(summary) => {
            let _ = writeln!(
                output,
                "- {} feedbacks: {} positive, {} neutral, {} negative \
                 (avg score {:.2}, overall {:?})",
                summary.total_feedbacks,
                summary.positive,
                summary.neutral,
                summary.negative,
                summary.avg_score,
                summary.overall_sentiment
            );
            for alert in summary.alerts.iter().take(5) {
                let _ = writeln!(output, "- {}: {}", alert.activity_title, alert.message);
            }
        }
        None => {
            let _ = writeln!(output, "No feedback recorded for this class.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Inactive Students");

    match input.inactivity {
        Some(flags) if !flags.is_empty() => {
            for flag in flags.iter().take(10) {
                let _ = writeln!(
                    output,
                    "- {} ({} risk): {}",
                    flag.name,
                    flag.risk.label(),
                    flag.reason
                );
            }
        }
        _ => {
            let _ = writeln!(output, "No inactive students in this window.");
        }
    }

    let advisories = class_advisories(input);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Advisories");

    if advisories.is_empty() {
        let _ = writeln!(output, "No action needed.");
    } else {
        for advisory in advisories.iter() {
            let _ = writeln!(
                output,
                "- [{}] {}: {}",
                advisory.priority.label(),
                advisory.title,
                advisory.message
            );
        }
    }

    output
}
