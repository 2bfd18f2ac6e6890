use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PersonalityType, PromptType, QuizAnswers};

// -- JWT Claims --

/// Claims carried by session access tokens. Issued by the embedded backend
/// and read (unverified) by the client to learn the expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// An authenticated session. Persisted between runs by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: Uuid,
    pub email: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Token response of the hosted auth endpoints.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

#[derive(Debug, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

// -- Push relay --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// -- Translation --

#[derive(Debug, Serialize)]
pub struct TranslateRequest<'a> {
    pub q: &'a str,
    pub source: &'a str,
    pub target: &'a str,
    pub format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct TranslateResponse {
    #[serde(rename = "translatedText")]
    pub translated_text: String,
}

// -- Reactions --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

// -- Insert shapes --
// The backend assigns `id` and `created_at`.

#[derive(Debug, Clone, Serialize)]
pub struct NewUser<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub submitted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewGroup {
    pub members: Vec<Uuid>,
    pub streak_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPrompt<'a> {
    pub content: &'a str,
    pub prompt_type: PromptType,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSubmission<'a> {
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub prompt_id: Uuid,
    pub response_text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMessage<'a> {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub message_text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewReaction<'a> {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewReport<'a> {
    pub reporter_id: Uuid,
    pub reported_user_id: Uuid,
    pub message_id: Option<Uuid>,
    pub reason: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewNotification<'a> {
    pub user_id: Uuid,
    pub title: &'a str,
    pub body: &'a str,
    pub data: &'a serde_json::Value,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewQueueEntry {
    pub user_id: Uuid,
    pub personality_type: Option<PersonalityType>,
}

// -- Patch shapes --

/// Profile fields a user may edit. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.preferred_name.is_none()
            && self.bio.is_none()
            && self.location.is_none()
            && self.preferred_language.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizPatch<'a> {
    pub quiz_answers: &'a QuizAnswers,
    pub personality_type: Option<PersonalityType>,
    pub personality_description: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionStatusPatch {
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_submission_date: Option<NaiveDate>,
}

/// A group's next round. A renewal carries the new streak in the same write.
#[derive(Debug, Clone, Serialize)]
pub struct GroupPromptPatch {
    pub current_prompt_id: Uuid,
    pub next_prompt_due: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak_count: Option<i64>,
}

/// Group assignment for a user. `None` clears the assignment.
#[derive(Debug, Clone, Serialize)]
pub struct MembershipPatch {
    pub current_group_id: Option<Uuid>,
    pub submitted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushTokenPatch<'a> {
    pub push_token: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvatarPatch<'a> {
    pub avatar_url: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadPatch {
    pub read: bool,
}
