use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::{self, Cycles};
use crate::error::{Result, ReviewError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Priority> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Study-method hint. "No suggestion" is an absent `Option<Suggestion>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suggestion {
    Theory,
    FlashcardDeck,
    Exercises,
}

impl Suggestion {
    /// Parses a user-typed hint. `Ok(None)` for blank or "none".
    pub fn parse(s: &str) -> std::result::Result<Option<Suggestion>, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(None),
            "theory" => Ok(Some(Suggestion::Theory)),
            "flashcarddeck" | "flashcards" | "anki" => Ok(Some(Suggestion::FlashcardDeck)),
            "exercises" => Ok(Some(Suggestion::Exercises)),
            other => Err(format!("unknown suggestion: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub subject_id: String,
    pub topic: String,
    pub priority: Priority,
    #[serde(default)]
    pub suggestion: Option<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub cycles: Cycles,
    /// Bumped by the store on every update.
    #[serde(default)]
    pub version: u64,
}

/// Caller-supplied fields for a new review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub subject_id: String,
    pub topic: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub suggestion: Option<Suggestion>,
    #[serde(default)]
    pub general_notes: Option<String>,
}

/// Editable descriptive fields. `None` leaves a field as it is; for the two
/// optional fields `Some(None)` clears them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDetails {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, with = "double_option")]
    pub suggestion: Option<Option<Suggestion>>,
    #[serde(default, with = "double_option")]
    pub general_notes: Option<Option<String>>,
}

impl Review {
    /// Builds a review with a fresh id and the initial R1..R4 schedule.
    pub fn create(new: NewReview, now: DateTime<Utc>) -> Result<Review> {
        let subject_id = new.subject_id.trim().to_string();
        let topic = new.topic.trim().to_string();
        if subject_id.is_empty() {
            return Err(ReviewError::InvalidReview("subject is empty".into()));
        }
        if topic.is_empty() {
            return Err(ReviewError::InvalidReview("topic is empty".into()));
        }
        Ok(Review {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id,
            topic,
            priority: new.priority,
            suggestion: new.suggestion,
            general_notes: new.general_notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
            cycles: cycle::generate_initial_cycles(now),
            version: 0,
        })
    }

    pub fn apply_details(&mut self, details: ReviewDetails) -> Result<()> {
        if let Some(topic) = details.topic {
            let topic = topic.trim();
            if topic.is_empty() {
                return Err(ReviewError::InvalidReview("topic is empty".into()));
            }
            self.topic = topic.to_string();
        }
        if let Some(priority) = details.priority {
            self.priority = priority;
        }
        if let Some(suggestion) = details.suggestion {
            self.suggestion = suggestion;
        }
        if let Some(notes) = details.general_notes {
            self.general_notes = notes.filter(|n| !n.trim().is_empty());
        }
        Ok(())
    }

    pub fn completed_count(&self) -> usize {
        self.cycles.iter().filter(|c| c.is_completed).count()
    }
}

// Distinguishes a missing key (leave alone) from an explicit null (clear).
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<Option<T>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<T>>, D::Error> {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_review() -> NewReview {
        NewReview {
            subject_id: "math".into(),
            topic: "  Quadratic functions ".into(),
            priority: Priority::High,
            suggestion: Some(Suggestion::Exercises),
            general_notes: Some("   ".into()),
        }
    }

    #[test]
    fn create_assigns_id_and_schedule() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let review = Review::create(new_review(), now).unwrap();
        assert!(!review.id.is_empty());
        assert_eq!(review.topic, "Quadratic functions");
        assert_eq!(review.created_at, now);
        assert_eq!(review.general_notes, None);
        assert_eq!(review.completed_count(), 0);
        assert_eq!(
            review.cycles.get(4).unwrap().planned_date,
            Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn create_rejects_blank_topic() {
        let mut data = new_review();
        data.topic = "   ".into();
        assert!(matches!(
            Review::create(data, Utc::now()),
            Err(ReviewError::InvalidReview(_))
        ));
    }

    #[test]
    fn suggestion_parsing() {
        assert_eq!(Suggestion::parse(""), Ok(None));
        assert_eq!(Suggestion::parse("None"), Ok(None));
        assert_eq!(Suggestion::parse("anki"), Ok(Some(Suggestion::FlashcardDeck)));
        assert_eq!(Suggestion::parse(" Theory "), Ok(Some(Suggestion::Theory)));
        assert!(Suggestion::parse("vibes").is_err());
        assert_eq!(Priority::parse("HIGH"), Some(Priority::High));
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn json_shape() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let review = Review::create(new_review(), now).unwrap();
        let json = serde_json::to_value(&review).unwrap();
        assert_eq!(json["subjectId"], "math");
        assert_eq!(json["priority"], "High");
        assert_eq!(json["suggestion"], "Exercises");
        assert_eq!(json["createdAt"], "2026-01-01T00:00:00Z");
        assert_eq!(json["cycles"].as_array().unwrap().len(), 4);

        let back: Review = serde_json::from_value(json).unwrap();
        assert_eq!(back, review);
    }

    #[test]
    fn missing_version_defaults_to_zero() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let review = Review::create(new_review(), now).unwrap();
        let mut json = serde_json::to_value(&review).unwrap();
        json.as_object_mut().unwrap().remove("version");
        let back: Review = serde_json::from_value(json).unwrap();
        assert_eq!(back.version, 0);
    }

    #[test]
    fn details_patch_semantics() {
        let mut review = Review::create(new_review(), Utc::now()).unwrap();

        let patch: ReviewDetails =
            serde_json::from_str(r#"{"priority":"Low","suggestion":null}"#).unwrap();
        review.apply_details(patch).unwrap();
        assert_eq!(review.priority, Priority::Low);
        assert_eq!(review.suggestion, None);
        assert_eq!(review.topic, "Quadratic functions");

        let patch: ReviewDetails =
            serde_json::from_str(r#"{"generalNotes":"focus on vertex form"}"#).unwrap();
        review.apply_details(patch).unwrap();
        assert_eq!(review.general_notes.as_deref(), Some("focus on vertex form"));

        let blank = ReviewDetails {
            topic: Some(" ".into()),
            ..Default::default()
        };
        assert!(review.apply_details(blank).is_err());
    }
}
