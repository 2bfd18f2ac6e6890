use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{Record, Table};

/// Quiz answers keyed by question id ("question1" ... ).
pub type QuizAnswers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersonalityType {
    Connector,
    Supporter,
    Explorer,
    Thinker,
    Creator,
}

impl PersonalityType {
    /// Fixed iteration order. Scoring ties resolve to the earliest entry.
    pub const ALL: [PersonalityType; 5] = [
        PersonalityType::Connector,
        PersonalityType::Supporter,
        PersonalityType::Explorer,
        PersonalityType::Thinker,
        PersonalityType::Creator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connector => "Connector",
            Self::Supporter => "Supporter",
            Self::Explorer => "Explorer",
            Self::Thinker => "Thinker",
            Self::Creator => "Creator",
        }
    }

    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|t| t == self).unwrap_or(0)
    }
}

impl fmt::Display for PersonalityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    #[default]
    Text,
    Audio,
    Photo,
}

// -- Records --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default, deserialize_with = "null_default")]
    pub email: String,
    #[serde(default)]
    pub preferred_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub preferred_language: Option<String>,
    #[serde(default)]
    pub quiz_answers: Option<QuizAnswers>,
    #[serde(default, deserialize_with = "lenient_personality")]
    pub personality_type: Option<PersonalityType>,
    #[serde(default)]
    pub personality_description: Option<String>,
    #[serde(default)]
    pub current_group_id: Option<Uuid>,
    #[serde(default, deserialize_with = "null_default")]
    pub submitted: bool,
    #[serde(default, deserialize_with = "lenient_date")]
    pub last_submission_date: Option<NaiveDate>,
    #[serde(default)]
    pub push_token: Option<String>,
}

impl User {
    /// Name to show in member lists.
    pub fn display_name(&self) -> &str {
        match self.preferred_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.split('@').next().unwrap_or("someone"),
        }
    }
}

impl Record for User {
    const TABLE: Table = Table::Users;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    #[serde(default, deserialize_with = "null_default")]
    pub members: Vec<Uuid>,
    #[serde(default)]
    pub current_prompt_id: Option<Uuid>,
    #[serde(default)]
    pub next_prompt_due: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_default")]
    pub streak_count: i64,
}

impl Group {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }
}

impl Record for Group {
    const TABLE: Table = Table::Groups;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: Uuid,
    pub content: String,
    #[serde(default, deserialize_with = "null_default")]
    pub prompt_type: PromptType,
    pub created_at: DateTime<Utc>,
}

impl Record for Prompt {
    const TABLE: Table = Table::Prompts;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub prompt_id: Uuid,
    #[serde(default, deserialize_with = "null_default")]
    pub response_text: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Submission {
    const TABLE: Table = Table::Submissions;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    #[serde(default, deserialize_with = "null_default")]
    pub message_text: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Message {
    const TABLE: Table = Table::Messages;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Reaction {
    const TABLE: Table = Table::Reactions;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub reported_user_id: Uuid,
    #[serde(default)]
    pub message_id: Option<Uuid>,
    #[serde(default, deserialize_with = "null_default")]
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Report {
    const TABLE: Table = Table::Reports;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    #[serde(default, deserialize_with = "null_default")]
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, deserialize_with = "null_default")]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Record for Notification {
    const TABLE: Table = Table::Notifications;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default, deserialize_with = "lenient_personality")]
    pub personality_type: Option<PersonalityType>,
    pub created_at: DateTime<Utc>,
}

impl Record for QueueEntry {
    const TABLE: Table = Table::Queue;
}

// -- Boundary helpers --

/// Treat an explicit `null` the same as a missing column.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Unknown personality labels become `None` instead of rejecting the whole row.
fn lenient_personality<'de, D>(deserializer: D) -> Result<Option<PersonalityType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        PersonalityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }))
}

/// Accept either a bare date or a full RFC 3339 timestamp.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| Some(ts.with_timezone(&Utc).date_naive()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Row, parse_row};
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn user_row_defaults_missing_and_null_fields() {
        let id = Uuid::new_v4();
        let user: User = parse_row(row(json!({
            "id": id,
            "email": "ada@example.com",
            "submitted": null,
            "personality_type": "thinker",
            "last_submission_date": "2026-03-01T08:30:00+00:00",
        })))
        .unwrap();

        assert_eq!(user.id, id);
        assert!(!user.submitted);
        assert_eq!(user.personality_type, Some(PersonalityType::Thinker));
        assert_eq!(
            user.last_submission_date,
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(user.display_name(), "ada");
    }

    #[test]
    fn unknown_personality_label_is_dropped() {
        let user: User = parse_row(row(json!({
            "id": Uuid::new_v4(),
            "personality_type": "Wizard",
        })))
        .unwrap();
        assert_eq!(user.personality_type, None);
    }

    #[test]
    fn message_without_group_is_rejected() {
        let err = parse_row::<Message>(row(json!({
            "id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "message_text": "hi",
            "created_at": "2026-03-01T08:30:00Z",
        })))
        .unwrap_err();
        assert_eq!(err.table, Table::Messages);
        assert!(err.reason.contains("group_id"));
    }

    #[test]
    fn group_members_parse_from_array() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let group: Group = parse_row(row(json!({
            "id": Uuid::new_v4(),
            "members": [a, b],
            "streak_count": 4,
        })))
        .unwrap();
        assert_eq!(group.member_count(), 2);
        assert!(group.has_member(b));
        assert_eq!(group.streak_count, 4);
        assert!(group.next_prompt_due.is_none());
    }
}
