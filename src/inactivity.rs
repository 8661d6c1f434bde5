use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;
use uuid::Uuid;

use crate::advisory::Priority;
use crate::cluster::DEFAULT_FAN_OUT;
use crate::error::{AnalyticsError, Result};
use crate::models::{InactivityFlag, RosterMember};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy)]
pub struct InactivityOptions {
    /// Days without a submission before a student is flagged.
    pub stale_days: i64,
    /// Days without a submission before the flag becomes high risk.
    pub critical_days: i64,
    pub fan_out: usize,
}

impl Default for InactivityOptions {
    fn default() -> Self {
        Self {
            stale_days: 14,
            critical_days: 30,
            fan_out: DEFAULT_FAN_OUT,
        }
    }
}

pub fn classify_member(
    member: &RosterMember,
    last_submission: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    options: &InactivityOptions,
) -> Option<InactivityFlag> {
    match last_submission {
        None => Some(InactivityFlag {
            student_id: member.student_id,
            name: member.full_name.clone(),
            risk: Priority::High,
            reason: "Nenhuma atividade realizada".to_string(),
            days_since_activity: member
                .joined_at
                .map(|joined| (now - joined).num_days().max(0))
                .unwrap_or(0),
        }),
        Some(last) => {
            let days = (now - last).num_days();
            if days <= options.stale_days {
                return None;
            }
            let risk = if days > options.critical_days {
                Priority::High
            } else {
                Priority::Medium
            };
            Some(InactivityFlag {
                student_id: member.student_id,
                name: member.full_name.clone(),
                risk,
                reason: format!("{days} dias sem atividade"),
                days_since_activity: days,
            })
        }
    }
}

pub async fn detect_inactivity<S>(
    store: &S,
    class_id: Uuid,
    now: DateTime<Utc>,
    options: &InactivityOptions,
) -> Result<Vec<InactivityFlag>>
where
    S: RecordStore + ?Sized,
{
    let roster = store.roster(class_id).await?;
    if roster.is_empty() {
        return Err(AnalyticsError::NoStudents);
    }

    let latest: Vec<Option<DateTime<Utc>>> = stream::iter(roster.iter())
        .map(|member| store.latest_submission_at(member.student_id, class_id))
        .buffered(options.fan_out.max(1))
        .try_collect()
        .await?;

    let mut flags: Vec<InactivityFlag> = roster
        .iter()
        .zip(latest)
        .filter_map(|(member, last)| classify_member(member, last, now, options))
        .collect();
    flags.sort_by(|a, b| b.days_since_activity.cmp(&a.days_since_activity));

    debug!(%class_id, roster = roster.len(), flagged = flags.len(), "checked class inactivity");
    Ok(flags)
}
