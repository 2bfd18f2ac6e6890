//! Daily prompts: issuing a new one to a group, and answering it.

use chrono::{DateTime, SubsecRound, Utc};
use rand::seq::IndexedRandom;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use circle_backend::records;
use circle_types::Query;
use circle_types::api::{GroupPromptPatch, MembershipPatch, NewPrompt, NewSubmission, SubmissionStatusPatch};
use circle_types::models::{Group, Prompt, PromptType, Submission, User};

use crate::context::AppContext;
use crate::error::{CoreError, Result};
use crate::notify;
use crate::optimistic::{OptimisticList, mutate};

pub const PROMPT_POOL: &[(&str, PromptType)] = &[
    ("What made you smile today?", PromptType::Text),
    ("Describe your perfect weekend in three sentences.", PromptType::Text),
    ("What is a small thing you are grateful for right now?", PromptType::Text),
    ("Share a song that matches your mood today.", PromptType::Text),
    ("What is something new you learned this week?", PromptType::Text),
    ("If you could have dinner with anyone, who would it be and why?", PromptType::Text),
    ("What is one goal you have for this month?", PromptType::Text),
    ("Tell us about a place that feels like home.", PromptType::Text),
    ("What is the best advice you have ever been given?", PromptType::Text),
    ("Show us the view from where you are right now.", PromptType::Photo),
    ("Record the sound of your day in ten seconds.", PromptType::Audio),
    ("What is a hobby you would love to pick up?", PromptType::Text),
];

/// Pick a pool entry, avoiding `current` when there is any alternative.
pub fn pick_prompt(current: Option<&str>) -> (&'static str, PromptType) {
    let candidates: Vec<&(&str, PromptType)> = PROMPT_POOL
        .iter()
        .filter(|(text, _)| Some(*text) != current)
        .collect();
    let mut rng = rand::rng();
    candidates
        .choose(&mut rng)
        .map(|entry| **entry)
        .unwrap_or(PROMPT_POOL[0])
}

/// Issue a fresh prompt to `group`, restart its deadline, and clear every
/// member's submitted flag. Returns the updated group and the new prompt.
pub async fn refresh_prompt(ctx: &AppContext, group: &Group) -> Result<(Group, Prompt)> {
    let prompt = draw_prompt(ctx, group).await?;
    let patch = GroupPromptPatch {
        current_prompt_id: prompt.id,
        next_prompt_due: next_due(ctx),
        streak_count: None,
    };
    let updated = records::patch::<Group, _>(ctx.backend(), &by_id(group.id), &patch)
        .await?
        .pop()
        .ok_or(CoreError::NoGroup)?;

    announce(ctx, &updated, &prompt).await?;
    Ok((updated, prompt))
}

/// Insert a new prompt row for `group`, avoiding its current text.
pub(crate) async fn draw_prompt(ctx: &AppContext, group: &Group) -> Result<Prompt> {
    let backend = ctx.backend();
    let current = match group.current_prompt_id {
        Some(id) => records::fetch_by_id::<Prompt>(backend, id)
            .await
            .unwrap_or_else(|e| {
                warn!("Could not load current prompt {}: {}", id, e);
                None
            }),
        None => None,
    };
    let (content, prompt_type) = pick_prompt(current.as_ref().map(|p| p.content.as_str()));
    Ok(records::create(backend, &NewPrompt { content, prompt_type }).await?)
}

/// Deadline for a prompt issued now.
pub(crate) fn next_due(ctx: &AppContext) -> DateTime<Utc> {
    // Microseconds survive the round trip through the backend's timestamps.
    (Utc::now() + ctx.settings().prompt_interval).trunc_subsecs(6)
}

/// Clear the members' submitted flags and tell them about `prompt`.
pub(crate) async fn announce(ctx: &AppContext, group: &Group, prompt: &Prompt) -> Result<()> {
    let members = Query::new().is_in("id", group.members.iter().map(Uuid::to_string));
    let reset = MembershipPatch {
        current_group_id: Some(group.id),
        submitted: false,
    };
    records::patch::<User, _>(ctx.backend(), &members, &reset).await?;

    info!(
        "Group {} got a new prompt due {}",
        group.id,
        group.next_prompt_due.map_or_else(|| "never".to_string(), |d| d.to_string())
    );
    notify::notify_members(
        ctx,
        group,
        None,
        "New prompt",
        &prompt.content,
        json!({ "type": "prompt", "group_id": group.id, "prompt_id": prompt.id }),
    )
    .await;
    Ok(())
}

fn by_id(id: Uuid) -> Query {
    Query::new().eq("id", id.to_string())
}

/// The signed-in user's view of their group's current prompt.
pub struct PromptScreen {
    ctx: AppContext,
    me: Uuid,
    group: Group,
    prompt: Prompt,
    submissions: OptimisticList<Submission>,
    pub draft: String,
    error: Option<String>,
}

impl PromptScreen {
    pub async fn open(ctx: &AppContext) -> Result<Self> {
        let me = ctx.user_id()?;
        let user = ctx.refresh_user().await?;
        let group_id = user.current_group_id.ok_or(CoreError::NoGroup)?;
        let group = records::fetch_by_id::<Group>(ctx.backend(), group_id)
            .await?
            .ok_or(CoreError::NoGroup)?;
        let prompt_id = group.current_prompt_id.ok_or(CoreError::NoActivePrompt)?;
        let prompt = records::fetch_by_id::<Prompt>(ctx.backend(), prompt_id)
            .await?
            .ok_or(CoreError::NoActivePrompt)?;

        let mut screen = Self {
            ctx: ctx.clone(),
            me,
            group,
            prompt,
            submissions: OptimisticList::new(),
            draft: String::new(),
            error: None,
        };
        screen.reload().await;
        Ok(screen)
    }

    /// Re-read the responses to the current prompt. Failures keep the old list.
    pub async fn reload(&mut self) {
        let query = Query::new()
            .eq("prompt_id", self.prompt.id.to_string())
            .eq("group_id", self.group.id.to_string())
            .order("created_at", true);
        match records::fetch::<Submission>(self.ctx.backend(), &query).await {
            Ok(rows) => self.submissions = OptimisticList::from_confirmed(rows),
            Err(e) => {
                warn!("Could not load responses for prompt {}: {}", self.prompt.id, e);
                self.error = Some(e.to_string());
            }
        }
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_submitted(&self) -> bool {
        self.submissions.find(|s| s.user_id == self.me).is_some()
    }

    /// Responses the user may see: everyone's once they have answered,
    /// nothing before that.
    pub fn visible_responses(&self) -> Vec<&Submission> {
        if !self.has_submitted() {
            return Vec::new();
        }
        self.submissions.iter().collect()
    }

    pub fn response_count(&self) -> usize {
        self.submissions.len()
    }

    pub async fn submit(&mut self) -> Result<Submission> {
        let text = self.draft.trim().to_string();
        if text.is_empty() {
            return Err(CoreError::EmptyResponse);
        }
        if self.has_submitted() {
            return Err(CoreError::AlreadySubmitted);
        }

        let existing = Query::new()
            .eq("user_id", self.me.to_string())
            .eq("prompt_id", self.prompt.id.to_string());
        if let Some(found) = records::fetch_one::<Submission>(self.ctx.backend(), &existing).await? {
            self.submissions.apply_insert(found);
            return Err(CoreError::AlreadySubmitted);
        }

        let draft = std::mem::take(&mut self.draft);
        let local = Submission {
            id: Uuid::new_v4(),
            user_id: self.me,
            group_id: self.group.id,
            prompt_id: self.prompt.id,
            response_text: text.clone(),
            created_at: Utc::now(),
        };
        let shape = NewSubmission {
            user_id: self.me,
            group_id: self.group.id,
            prompt_id: self.prompt.id,
            response_text: &text,
        };
        let ctx = self.ctx.clone();
        let result = mutate(&mut self.submissions, local, async {
            records::create::<Submission, _>(ctx.backend(), &shape).await
        })
        .await;

        let stored = match result {
            Ok(stored) => stored,
            Err(e) => {
                self.draft = draft;
                self.error = Some(e.to_string());
                return Err(e.into());
            }
        };
        self.error = None;

        let status = SubmissionStatusPatch {
            submitted: true,
            last_submission_date: Some(Utc::now().date_naive()),
        };
        match records::patch::<User, _>(self.ctx.backend(), &by_id(self.me), &status).await {
            Ok(mut users) => {
                if let Some(user) = users.pop() {
                    self.ctx.set_user(Some(user));
                }
            }
            Err(e) => warn!("Could not mark {} as submitted: {}", self.me, e),
        }

        info!("{} answered prompt {}", self.me, self.prompt.id);
        Ok(stored)
    }
}
