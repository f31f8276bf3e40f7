// Read-only views over a set of reviews: grouping by subject, what is due,
// and what is coming up. Nothing here changes a schedule.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dates;
use crate::review::{Priority, Review};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectGroup {
    pub subject_id: String,
    pub reviews: Vec<Review>,
    pub pending_cycles: usize,
    pub completed_cycles: usize,
}

/// One pending cycle together with the review it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaEntry {
    pub review_id: String,
    pub subject_id: String,
    pub topic: String,
    pub priority: Priority,
    pub cycle: u8,
    pub planned_date: DateTime<Utc>,
    pub remaining_days: i64,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAgenda {
    pub subject_id: String,
    pub entries: Vec<AgendaEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Urgency {
    Relaxed,
    Soon,
    Urgent,
}

impl Urgency {
    pub fn from_remaining(days: i64) -> Urgency {
        if days > 15 {
            Urgency::Relaxed
        } else if days > 7 {
            Urgency::Soon
        } else {
            Urgency::Urgent
        }
    }
}

pub fn group_by_subject(reviews: &[Review]) -> Vec<SubjectGroup> {
    let mut groups: BTreeMap<&str, Vec<Review>> = BTreeMap::new();
    for review in reviews {
        groups
            .entry(review.subject_id.as_str())
            .or_default()
            .push(review.clone());
    }
    groups
        .into_iter()
        .map(|(subject_id, reviews)| {
            let completed_cycles: usize = reviews.iter().map(Review::completed_count).sum();
            SubjectGroup {
                subject_id: subject_id.to_string(),
                pending_cycles: reviews.len() * crate::cycle::CYCLE_COUNT - completed_cycles,
                completed_cycles,
                reviews,
            }
        })
        .collect()
}

/// Whole days until `planned`, rounded up. Negative once overdue.
pub fn remaining_days(planned: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (planned - now).num_milliseconds();
    let day = 86_400_000;
    (millis + day - 1).div_euclid(day)
}

pub fn remaining_label(days: i64) -> String {
    match days {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        d if d > 1 => format!("in {d}d"),
        d => format!("{}d overdue", -d),
    }
}

fn entries(reviews: &[Review], now: DateTime<Utc>) -> impl Iterator<Item = AgendaEntry> + '_ {
    reviews.iter().flat_map(move |review| {
        review
            .cycles
            .iter()
            .filter(|c| !c.is_completed)
            .map(move |c| {
                let remaining_days = remaining_days(c.planned_date, now);
                AgendaEntry {
                    review_id: review.id.clone(),
                    subject_id: review.subject_id.clone(),
                    topic: review.topic.clone(),
                    priority: review.priority,
                    cycle: c.cycle,
                    planned_date: c.planned_date,
                    remaining_days,
                    urgency: Urgency::from_remaining(remaining_days),
                }
            })
    })
}

/// Pending cycles planned for today or earlier, oldest first.
pub fn due_cycles(reviews: &[Review], now: DateTime<Utc>) -> Vec<AgendaEntry> {
    let today = now.date_naive();
    let mut due: Vec<AgendaEntry> = entries(reviews, now)
        .filter(|e| e.planned_date.date_naive() <= today)
        .collect();
    due.sort_by(|a, b| {
        a.planned_date
            .cmp(&b.planned_date)
            .then(b.priority.cmp(&a.priority))
    });
    due
}

/// Pending cycles after `now` and before the start of the day `days_ahead`
/// days from today, grouped by subject.
pub fn upcoming(reviews: &[Review], now: DateTime<Utc>, days_ahead: i64) -> Vec<SubjectAgenda> {
    let horizon = dates::add_days(dates::start_of_day(now), days_ahead);
    let mut by_subject: BTreeMap<String, Vec<AgendaEntry>> = BTreeMap::new();
    for entry in entries(reviews, now).filter(|e| e.planned_date > now && e.planned_date < horizon) {
        by_subject
            .entry(entry.subject_id.clone())
            .or_default()
            .push(entry);
    }
    by_subject
        .into_iter()
        .map(|(subject_id, mut entries)| {
            entries.sort_by_key(|e| e.planned_date);
            SubjectAgenda {
                subject_id,
                entries,
            }
        })
        .collect()
}
