use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{ActivityId, InterviewId, InterviewStatus, JobId, JobStatus, NoteId, Priority};

/// Keeps an explicit JSON `null` as `Some(None)` so "clear this field" survives
/// deserialization; a missing field stays `None` via `#[serde(default)]`.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: JobId,
    pub status: JobStatus,
    pub company_name: String,
    pub job_title: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub last_action_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_action_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_action_title: Option<String>,
    #[serde(default)]
    pub needs_follow_up: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial card update. `None` leaves a field untouched; for nullable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub location: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub next_action_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub next_action_title: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_follow_up: Option<bool>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Option<DateTime<Utc>>>,
}

impl CardPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags),
            ..Self::default()
        }
    }

    pub fn priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Self::default()
        }
    }

    /// Every field of `card`, as a patch.
    pub fn from_card(card: &Card) -> Self {
        Self {
            status: Some(card.status),
            company_name: Some(card.company_name.clone()),
            job_title: Some(card.job_title.clone()),
            location: Some(card.location.clone()),
            priority: Some(card.priority),
            tags: Some(card.tags.clone()),
            last_action_at: Some(card.last_action_at),
            next_action_at: Some(card.next_action_at),
            next_action_title: Some(card.next_action_title.clone()),
            needs_follow_up: Some(card.needs_follow_up),
            updated_at: Some(card.updated_at),
        }
    }

    /// The values `previous` held for every field this patch touches.
    pub fn revert_from(&self, previous: &Card) -> Self {
        let full = Self::from_card(previous);
        Self {
            status: self.status.and(full.status),
            company_name: self.company_name.as_ref().and(full.company_name),
            job_title: self.job_title.as_ref().and(full.job_title),
            location: self.location.as_ref().and(full.location),
            priority: self.priority.and(full.priority),
            tags: self.tags.as_ref().and(full.tags),
            last_action_at: self.last_action_at.and(full.last_action_at),
            next_action_at: self.next_action_at.and(full.next_action_at),
            next_action_title: self.next_action_title.as_ref().and(full.next_action_title),
            needs_follow_up: self.needs_follow_up.and(full.needs_follow_up),
            updated_at: self.updated_at.and(full.updated_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, card: &mut Card) {
        if let Some(status) = self.status {
            card.status = status;
        }
        if let Some(company_name) = &self.company_name {
            card.company_name = company_name.clone();
        }
        if let Some(job_title) = &self.job_title {
            card.job_title = job_title.clone();
        }
        if let Some(location) = &self.location {
            card.location = location.clone();
        }
        if let Some(priority) = self.priority {
            card.priority = priority;
        }
        if let Some(tags) = &self.tags {
            card.tags = tags.clone();
        }
        if let Some(last_action_at) = self.last_action_at {
            card.last_action_at = last_action_at;
        }
        if let Some(next_action_at) = self.next_action_at {
            card.next_action_at = next_action_at;
        }
        if let Some(next_action_title) = &self.next_action_title {
            card.next_action_title = next_action_title.clone();
        }
        if let Some(needs_follow_up) = self.needs_follow_up {
            card.needs_follow_up = needs_follow_up;
        }
        if let Some(updated_at) = self.updated_at {
            card.updated_at = updated_at;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNote {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interview {
    pub id: InterviewId,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub interviewer: Option<String>,
    #[serde(default)]
    pub status: InterviewStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterviewFields {
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interviewer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InterviewStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterviewPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interviewer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InterviewStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: ActivityId,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityQuery {
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityPage {
    #[serde(default)]
    pub items: Vec<ActivityEvent>,
    #[serde(default)]
    pub next_cursor: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetailBundle {
    pub job: Card,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub interviews: Vec<Interview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<ActivityPage>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
