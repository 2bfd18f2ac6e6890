use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use circle_backend::records;
use circle_types::api::{NewNotification, PushMessage, PushTokenPatch, ReadPatch};
use circle_types::models::{Group, Notification, User};
use circle_types::Query;

use crate::context::AppContext;
use crate::error::{CoreError, Result};

/// Store the device token push notifications should go to.
pub async fn register_push_token(ctx: &AppContext, token: &str) -> Result<User> {
    let id = ctx.user_id()?;
    let patch = PushTokenPatch {
        push_token: token.trim(),
    };
    let user = records::patch::<User, _>(ctx.backend(), &Query::new().eq("id", id.to_string()), &patch)
        .await?
        .pop()
        .ok_or(CoreError::UnknownUser(id))?;
    ctx.set_user(Some(user.clone()));
    Ok(user)
}

/// Tell every member of `group` (but `except`) about an event: one
/// notification row each, plus a push for members with a device token.
/// Never fails; returns how many notification rows were written.
pub async fn notify_members(
    ctx: &AppContext,
    group: &Group,
    except: Option<Uuid>,
    title: &str,
    body: &str,
    data: Value,
) -> usize {
    let recipients: Vec<Uuid> = group
        .members
        .iter()
        .copied()
        .filter(|id| Some(*id) != except)
        .collect();
    if recipients.is_empty() {
        return 0;
    }

    let tokens: HashMap<Uuid, String> = match records::fetch::<User>(
        ctx.backend(),
        &Query::new().is_in("id", recipients.iter().map(Uuid::to_string)),
    )
    .await
    {
        Ok(users) => users
            .into_iter()
            .filter_map(|u| u.push_token.filter(|t| !t.is_empty()).map(|t| (u.id, t)))
            .collect(),
        Err(e) => {
            warn!("Could not load push tokens for group {}: {}", group.id, e);
            HashMap::new()
        }
    };

    let mut written = 0;
    for user_id in recipients {
        let row = NewNotification {
            user_id,
            title,
            body,
            data: &data,
            read: false,
        };
        match records::create::<Notification, _>(ctx.backend(), &row).await {
            Ok(_) => written += 1,
            Err(e) => warn!("Notification for {} not stored: {}", user_id, e),
        }

        let (Some(relay), Some(token)) = (ctx.push_relay(), tokens.get(&user_id)) else {
            continue;
        };
        let message = PushMessage {
            token: token.clone(),
            title: title.to_string(),
            body: body.to_string(),
            data: data.clone(),
        };
        if let Err(e) = relay.send(&message).await {
            warn!("Push to {} failed: {}", user_id, e);
        }
    }

    debug!("Notified {} members of group {}: {}", written, group.id, title);
    written
}

pub async fn unread(ctx: &AppContext) -> Result<Vec<Notification>> {
    let id = ctx.user_id()?;
    let query = Query::new()
        .eq("user_id", id.to_string())
        .eq("read", false)
        .order("created_at", false);
    Ok(records::fetch(ctx.backend(), &query).await?)
}

pub async fn mark_all_read(ctx: &AppContext) -> Result<usize> {
    let id = ctx.user_id()?;
    let query = Query::new().eq("user_id", id.to_string()).eq("read", false);
    let changed =
        records::patch::<Notification, _>(ctx.backend(), &query, &ReadPatch { read: true }).await?;
    Ok(changed.len())
}
