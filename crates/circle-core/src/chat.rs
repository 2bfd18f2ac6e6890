//! Group chat: paged history, optimistic sends, emoji reactions,
//! translation, reporting, and live updates.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use circle_backend::{BackendError, Subscription, records};
use circle_types::api::{NewMessage, NewReaction, NewReport, ReactionGroup};
use circle_types::events::{ChangeEvent, ChangeKind};
use circle_types::models::{Group, Message, Reaction, Report, User};
use circle_types::{Filter, Query, Table};

use crate::context::AppContext;
use crate::error::{CoreError, Result};
use crate::notify;
use crate::optimistic::{OptimisticList, mutate};

#[derive(Debug, Clone, PartialEq)]
pub enum ReactionToggle {
    Added(Reaction),
    Removed,
}

/// Realtime changes for one chat: new messages in the group and reaction
/// changes. Dropping the feed closes both subscriptions.
pub struct ChatFeed {
    messages: Subscription,
    reactions: Subscription,
}

impl ChatFeed {
    /// Wait for the next change on either subscription.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        tokio::select! {
            Some(event) = self.messages.recv() => Some(event),
            Some(event) = self.reactions.recv() => Some(event),
            else => None,
        }
    }

    /// Everything that has already arrived.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.messages.try_recv() {
            out.push(event);
        }
        while let Some(event) = self.reactions.try_recv() {
            out.push(event);
        }
        out
    }
}

pub struct ChatScreen {
    ctx: AppContext,
    me: Uuid,
    group: Group,
    messages: OptimisticList<Message>,
    reactions: OptimisticList<Reaction>,
    members: HashMap<Uuid, User>,
    translations: HashMap<(Uuid, String), String>,
    pub draft: String,
    error: Option<String>,
}

impl ChatScreen {
    pub async fn open(ctx: &AppContext) -> Result<Self> {
        let me = ctx.user_id()?;
        let user = ctx.refresh_user().await?;
        let group_id = user.current_group_id.ok_or(CoreError::NoGroup)?;
        let group = records::fetch_by_id::<Group>(ctx.backend(), group_id)
            .await?
            .ok_or(CoreError::NoGroup)?;

        let mut screen = Self {
            ctx: ctx.clone(),
            me,
            group,
            messages: OptimisticList::new(),
            reactions: OptimisticList::new(),
            members: HashMap::new(),
            translations: HashMap::new(),
            draft: String::new(),
            error: None,
        };
        screen.reload().await;
        Ok(screen)
    }

    /// Load the latest page of history, its reactions, and member profiles.
    /// A failed read is logged and leaves that part of the screen empty.
    pub async fn reload(&mut self) {
        let backend = self.ctx.backend();
        let page = Query::new()
            .eq("group_id", self.group.id.to_string())
            .order("created_at", false)
            .limit(self.ctx.settings().message_page_size);
        match records::fetch::<Message>(backend, &page).await {
            Ok(mut latest) => {
                latest.reverse();
                self.messages = OptimisticList::from_confirmed(latest);
            }
            Err(e) => {
                warn!("Could not load messages for group {}: {}", self.group.id, e);
                self.error = Some(e.to_string());
            }
        }

        let ids: Vec<String> = self.messages.iter().map(|m| m.id.to_string()).collect();
        let reactions = Query::new().is_in("message_id", ids).order("created_at", true);
        match records::fetch::<Reaction>(backend, &reactions).await {
            Ok(rows) => self.reactions = OptimisticList::from_confirmed(rows),
            Err(e) => warn!("Could not load reactions for group {}: {}", self.group.id, e),
        }

        let members = Query::new().is_in("id", self.group.members.iter().map(Uuid::to_string));
        match records::fetch::<User>(backend, &members).await {
            Ok(users) => self.members = users.into_iter().map(|u| (u.id, u)).collect(),
            Err(e) => warn!("Could not load members of group {}: {}", self.group.id, e),
        }
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.pending_count()
    }

    pub fn member(&self, id: Uuid) -> Option<&User> {
        self.members.get(&id)
    }

    pub fn author_name(&self, message: &Message) -> &str {
        self.member(message.user_id)
            .map(User::display_name)
            .unwrap_or("former member")
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn cached_translation(&self, message_id: Uuid, lang: &str) -> Option<&str> {
        self.translations
            .get(&(message_id, lang.to_string()))
            .map(String::as_str)
    }

    pub async fn send(&mut self) -> Result<Message> {
        let text = self.draft.trim().to_string();
        if text.is_empty() {
            return Err(CoreError::EmptyMessage);
        }

        let draft = std::mem::take(&mut self.draft);
        let local = Message {
            id: Uuid::new_v4(),
            group_id: self.group.id,
            user_id: self.me,
            message_text: text.clone(),
            created_at: Utc::now(),
        };
        let shape = NewMessage {
            group_id: self.group.id,
            user_id: self.me,
            message_text: &text,
        };
        let ctx = self.ctx.clone();
        let result = mutate(&mut self.messages, local, async {
            records::create::<Message, _>(ctx.backend(), &shape).await
        })
        .await;

        let stored = match result {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Message to group {} failed: {}", self.group.id, e);
                self.draft = draft;
                self.error = Some(if e.is_transient() {
                    "Message not sent. Check your connection and try again.".to_string()
                } else {
                    format!("Message not sent: {}", e)
                });
                return Err(e.into());
            }
        };
        self.error = None;

        let sender = self
            .member(self.me)
            .map(|u| u.display_name().to_string())
            .unwrap_or_else(|| "Someone".to_string());
        notify::notify_members(
            &self.ctx,
            &self.group,
            Some(self.me),
            &sender,
            &stored.message_text,
            json!({ "type": "message", "group_id": self.group.id, "message_id": stored.id }),
        )
        .await;

        Ok(stored)
    }

    pub async fn toggle_reaction(&mut self, message_id: Uuid, emoji: &str) -> Result<ReactionToggle> {
        if self.messages.get(message_id).is_none() {
            return Err(CoreError::UnknownMessage(message_id));
        }
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(CoreError::EmptyReaction);
        }
        let me = self.me;

        let mine = self
            .reactions
            .find(|r| r.message_id == message_id && r.user_id == me && r.emoji == emoji)
            .map(|r| r.id);
        if let Some(removed) = mine.and_then(|id| self.reactions.remove(id)) {
            let query = Query::new().eq("id", removed.record().id.to_string());
            return match records::remove(self.ctx.backend(), Table::Reactions, &query).await {
                Ok(_) => Ok(ReactionToggle::Removed),
                Err(e) => {
                    self.reactions.restore(removed);
                    self.error = Some(format!("Reaction not removed: {}", e));
                    Err(e.into())
                }
            };
        }

        let local = Reaction {
            id: Uuid::new_v4(),
            message_id,
            user_id: me,
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        };
        let temp = self.reactions.push_pending(local.clone());
        match add_reaction(&self.ctx, &local).await {
            Ok(Some(stored)) => {
                self.reactions.confirm(temp, stored.clone());
                Ok(ReactionToggle::Added(stored))
            }
            Ok(None) => {
                self.reactions.rollback(temp);
                let key = (message_id, me, local.emoji.clone());
                self.reactions
                    .retain(|r| (r.message_id, r.user_id, r.emoji.clone()) != key);
                Ok(ReactionToggle::Removed)
            }
            Err(e) => {
                self.reactions.rollback(temp);
                self.error = Some(format!("Reaction not saved: {}", e));
                Err(e.into())
            }
        }
    }

    /// Reactions on one message grouped by emoji, in order of first use.
    pub fn reaction_summary(&self, message_id: Uuid) -> Vec<ReactionGroup> {
        let mut groups: Vec<ReactionGroup> = Vec::new();
        for reaction in self.reactions.iter().filter(|r| r.message_id == message_id) {
            match groups.iter_mut().find(|g| g.emoji == reaction.emoji) {
                Some(group) => {
                    group.count += 1;
                    group.user_ids.push(reaction.user_id);
                }
                None => groups.push(ReactionGroup {
                    emoji: reaction.emoji.clone(),
                    count: 1,
                    user_ids: vec![reaction.user_id],
                }),
            }
        }
        groups
    }

    /// Translate a message into the user's preferred language.
    pub async fn translate(&mut self, message_id: Uuid) -> Result<String> {
        let text = self
            .messages
            .get(message_id)
            .map(|m| m.message_text.clone())
            .ok_or(CoreError::UnknownMessage(message_id))?;
        let lang = self.ctx.preferred_language();
        let key = (message_id, lang.clone());
        if let Some(cached) = self.translations.get(&key) {
            return Ok(cached.clone());
        }

        let translator = self
            .ctx
            .translator()
            .ok_or_else(|| CoreError::Translation("no translation service configured".into()))?;
        let translated = translator
            .translate(&text, &lang)
            .await
            .map_err(|e| CoreError::Translation(e.to_string()))?;

        debug!("Translated message {} into {}", message_id, lang);
        self.translations.insert(key, translated.clone());
        Ok(translated)
    }

    /// Report a message's author to the moderators.
    pub async fn report(&mut self, message_id: Uuid, reason: &str) -> Result<Report> {
        let author = self
            .messages
            .get(message_id)
            .map(|m| m.user_id)
            .ok_or(CoreError::UnknownMessage(message_id))?;
        let shape = NewReport {
            reporter_id: self.me,
            reported_user_id: author,
            message_id: Some(message_id),
            reason: reason.trim(),
        };
        match records::create::<Report, _>(self.ctx.backend(), &shape).await {
            Ok(report) => {
                info!("{} reported message {}", self.me, message_id);
                Ok(report)
            }
            Err(e) => {
                self.error = Some(format!("Report not sent: {}", e));
                Err(e.into())
            }
        }
    }

    pub async fn subscribe(&self) -> Result<ChatFeed> {
        let backend = self.ctx.backend();
        let messages = backend
            .subscribe(
                Table::Messages,
                Some(Filter::eq("group_id", self.group.id.to_string())),
            )
            .await?;
        let reactions = backend.subscribe(Table::Reactions, None).await?;
        Ok(ChatFeed {
            messages,
            reactions,
        })
    }

    /// Fold one realtime change into the screen. Returns whether anything
    /// visible changed.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match (event.table, event.kind) {
            (Table::Messages, ChangeKind::Delete) => match event.row_id() {
                Some(id) => {
                    let gone = self.messages.apply_delete(id).is_some();
                    if gone {
                        self.reactions.retain(|r| r.message_id != id);
                    }
                    gone
                }
                None => false,
            },
            (Table::Messages, _) => match event.parse::<Message>() {
                Ok(message) if message.group_id == self.group.id => {
                    self.messages.apply_insert(message);
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    warn!("Ignoring realtime message: {}", e);
                    false
                }
            },
            (Table::Reactions, ChangeKind::Delete) => match event.row_id() {
                Some(id) => self.reactions.apply_delete(id).is_some(),
                None => false,
            },
            (Table::Reactions, _) => match event.parse::<Reaction>() {
                Ok(reaction) if self.messages.get(reaction.message_id).is_some() => {
                    self.reactions.apply_insert(reaction);
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    warn!("Ignoring realtime reaction: {}", e);
                    false
                }
            },
            _ => false,
        }
    }
}

/// Insert a reaction unless the backend already has the same one, in which
/// case the existing row is deleted and `None` returned.
async fn add_reaction(
    ctx: &AppContext,
    local: &Reaction,
) -> std::result::Result<Option<Reaction>, BackendError> {
    let backend = ctx.backend();
    let existing = Query::new()
        .eq("message_id", local.message_id.to_string())
        .eq("user_id", local.user_id.to_string())
        .eq("emoji", local.emoji.as_str());
    if let Some(found) = records::fetch_one::<Reaction>(backend, &existing).await? {
        records::remove(backend, Table::Reactions, &Query::new().eq("id", found.id.to_string())).await?;
        return Ok(None);
    }

    let shape = NewReaction {
        message_id: local.message_id,
        user_id: local.user_id,
        emoji: &local.emoji,
    };
    Ok(Some(records::create(backend, &shape).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use circle_types::to_row;

    fn reaction(message_id: Uuid, user_id: Uuid, emoji: &str) -> Reaction {
        Reaction {
            id: Uuid::new_v4(),
            message_id,
            user_id,
            emoji: emoji.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn realtime_rows_serialize_the_way_the_screen_reads_them() {
        let r = reaction(Uuid::new_v4(), Uuid::new_v4(), "🔥");
        let event = ChangeEvent::insert(Table::Reactions, to_row(&r));
        assert_eq!(event.parse::<Reaction>().unwrap(), r);
        assert_eq!(event.row_id(), Some(r.id));
    }
}
