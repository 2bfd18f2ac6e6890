//! Matching queue: users wait until enough of them are queued, then the
//! oldest entries become a new group.

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use circle_backend::{BackendError, records};
use circle_types::api::{MembershipPatch, NewGroup, NewQueueEntry};
use circle_types::models::{Group, QueueEntry, User};
use circle_types::{Query, Table, parse_row};

use crate::context::AppContext;
use crate::error::{CoreError, Result};
use crate::{notify, prompt};

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Joined(Group),
    /// 1-based place in the queue.
    Queued { position: usize },
}

pub async fn join_group(ctx: &AppContext) -> Result<JoinOutcome> {
    let user = ctx.refresh_user().await?;
    let backend = ctx.backend();

    if let Some(group_id) = user.current_group_id {
        match records::fetch_by_id::<Group>(backend, group_id).await? {
            Some(group) => return Ok(JoinOutcome::Joined(group)),
            None => warn!("{} points at missing group {}, rejoining", user.id, group_id),
        }
    }
    if user.personality_type.is_none() {
        return Err(CoreError::QuizIncomplete);
    }

    let mine = Query::new().eq("user_id", user.id.to_string());
    if records::fetch_one::<QueueEntry>(backend, &mine).await?.is_none() {
        let entry = NewQueueEntry {
            user_id: user.id,
            personality_type: user.personality_type,
        };
        records::create::<QueueEntry, _>(backend, &entry).await?;
        info!("{} joined the matching queue", user.id);
    }

    let size = ctx.settings().group_size.max(1);
    let queue = records::fetch::<QueueEntry>(backend, &Query::new().order("created_at", true)).await?;
    if queue.len() >= size {
        if let Some(group) = form_group(ctx, &queue[..size]).await? {
            if group.has_member(user.id) {
                return Ok(JoinOutcome::Joined(group));
            }
        }
    }

    let queue = records::fetch::<QueueEntry>(backend, &Query::new().order("created_at", true)).await?;
    match queue.iter().position(|e| e.user_id == user.id) {
        Some(index) => Ok(JoinOutcome::Queued { position: index + 1 }),
        None => {
            // Someone else matched us in the meantime.
            let user = ctx.refresh_user().await?;
            let group_id = user.current_group_id.ok_or(CoreError::NoGroup)?;
            let group = records::fetch_by_id::<Group>(backend, group_id)
                .await?
                .ok_or(CoreError::NoGroup)?;
            Ok(JoinOutcome::Joined(group))
        }
    }
}

/// Claim `entries` off the queue and turn them into a group. Returns `None`
/// when another client claimed some of them first; whatever this call did
/// claim is put back.
async fn form_group(ctx: &AppContext, entries: &[QueueEntry]) -> Result<Option<Group>> {
    let backend = ctx.backend();
    let ids = entries.iter().map(|e| e.id.to_string());
    let claimed = backend.delete(Table::Queue, &Query::new().is_in("id", ids)).await?;

    if claimed.len() < entries.len() {
        warn!(
            "Queue race: claimed {} of {} entries, releasing them",
            claimed.len(),
            entries.len()
        );
        for row in claimed {
            if let Err(e) = backend.insert(Table::Queue, row).await {
                warn!("Could not return queue entry: {}", e);
            }
        }
        return Ok(None);
    }

    let mut members: Vec<Uuid> = Vec::with_capacity(claimed.len());
    for row in claimed {
        members.push(parse_row::<QueueEntry>(row).map_err(BackendError::from)?.user_id);
    }

    let group: Group = records::create(
        backend,
        &NewGroup {
            members: members.clone(),
            streak_count: 0,
        },
    )
    .await?;

    let assign = MembershipPatch {
        current_group_id: Some(group.id),
        submitted: false,
    };
    let query = Query::new().is_in("id", members.iter().map(Uuid::to_string));
    records::patch::<User, _>(backend, &query, &assign).await?;
    info!("Formed group {} with {} members", group.id, members.len());

    let group = match prompt::refresh_prompt(ctx, &group).await {
        Ok((group, _)) => group,
        Err(e) => {
            warn!("First prompt for group {} failed: {}", group.id, e);
            group
        }
    };

    notify::notify_members(
        ctx,
        &group,
        None,
        "You've been matched",
        "Say hello to your new group.",
        json!({ "type": "matched", "group_id": group.id }),
    )
    .await;

    Ok(Some(group))
}
