//! Group lifecycle: disbanding groups that stopped answering, renewing the
//! ones that kept up, and the daily reset of a user's submitted flag.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use circle_backend::records;
use circle_types::api::{GroupPromptPatch, MembershipPatch, SubmissionStatusPatch};
use circle_types::models::{Group, Submission, User};
use circle_types::{Query, Table};

use crate::context::AppContext;
use crate::error::Result;
use crate::{notify, prompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    NotDue,
    Disband,
    /// `full` when every member answered.
    Renew { full: bool },
}

/// A group past its deadline is disbanded when more than one member failed
/// to answer.
pub fn should_disband(
    now: DateTime<Utc>,
    due: Option<DateTime<Utc>>,
    member_count: usize,
    submitted_count: usize,
) -> bool {
    match due {
        Some(due) => now > due && submitted_count < member_count.saturating_sub(1),
        None => false,
    }
}

pub fn evaluate(group: &Group, submitted_count: usize, now: DateTime<Utc>) -> Verdict {
    match group.next_prompt_due {
        Some(due) if now > due => {}
        _ => return Verdict::NotDue,
    }
    if should_disband(now, group.next_prompt_due, group.member_count(), submitted_count) {
        Verdict::Disband
    } else {
        Verdict::Renew {
            full: submitted_count >= group.member_count(),
        }
    }
}

pub fn next_streak(current: i64, full: bool) -> i64 {
    if full { current + 1 } else { 0 }
}

pub fn needs_daily_reset(user: &User, today: NaiveDate) -> bool {
    user.submitted && user.last_submission_date != Some(today)
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupStatus {
    Active(Group),
    Renewed(Group),
    Disbanded,
}

/// Members of `group` who answered its current prompt.
pub async fn submitted_members(ctx: &AppContext, group: &Group) -> Result<usize> {
    let Some(prompt_id) = group.current_prompt_id else {
        return Ok(0);
    };
    let query = Query::new()
        .eq("group_id", group.id.to_string())
        .eq("prompt_id", prompt_id.to_string());
    let submissions = records::fetch::<Submission>(ctx.backend(), &query).await?;
    let answered: HashSet<Uuid> = submissions
        .into_iter()
        .map(|s| s.user_id)
        .filter(|id| group.has_member(*id))
        .collect();
    Ok(answered.len())
}

/// Evaluate `group` now and apply the verdict.
pub async fn check_group(ctx: &AppContext, group: Group) -> Result<GroupStatus> {
    let now = Utc::now();
    if evaluate(&group, 0, now) == Verdict::NotDue {
        return Ok(GroupStatus::Active(group));
    }

    let submitted = submitted_members(ctx, &group).await?;
    match evaluate(&group, submitted, now) {
        Verdict::NotDue => Ok(GroupStatus::Active(group)),
        Verdict::Disband => {
            disband(ctx, &group).await?;
            Ok(GroupStatus::Disbanded)
        }
        Verdict::Renew { full } => renew(ctx, group, full).await,
    }
}

/// Start the next round. The prompt, deadline and streak move in one write
/// filtered on the deadline this client saw expire, so a round is renewed
/// at most once however many clients notice it.
async fn renew(ctx: &AppContext, group: Group, full: bool) -> Result<GroupStatus> {
    let backend = ctx.backend();
    let streak = next_streak(group.streak_count, full);
    let prompt = prompt::draw_prompt(ctx, &group).await?;

    let mut claim = Query::new().eq("id", group.id.to_string());
    if let Some(due) = group.next_prompt_due {
        claim = claim.eq("next_prompt_due", json!(due));
    }
    let patch = GroupPromptPatch {
        current_prompt_id: prompt.id,
        next_prompt_due: prompt::next_due(ctx),
        streak_count: Some(streak),
    };
    let claimed = match records::patch::<Group, _>(backend, &claim, &patch).await {
        Ok(mut rows) => rows.pop(),
        Err(e) => {
            discard_prompt(ctx, prompt.id).await;
            return Err(e.into());
        }
    };
    let Some(renewed) = claimed else {
        info!("Group {} was already renewed elsewhere", group.id);
        discard_prompt(ctx, prompt.id).await;
        let current = records::fetch_by_id::<Group>(backend, group.id).await?;
        return Ok(current.map_or(GroupStatus::Disbanded, GroupStatus::Active));
    };

    info!(
        "Group {} renewed ({} participation), streak {}",
        renewed.id,
        if full { "full" } else { "partial" },
        streak
    );
    prompt::announce(ctx, &renewed, &prompt).await?;
    Ok(GroupStatus::Renewed(renewed))
}

async fn discard_prompt(ctx: &AppContext, id: Uuid) {
    let query = Query::new().eq("id", id.to_string());
    if let Err(e) = records::remove(ctx.backend(), Table::Prompts, &query).await {
        warn!("Could not discard unused prompt {}: {}", id, e);
    }
}

/// Delete the group and release its members.
pub async fn disband(ctx: &AppContext, group: &Group) -> Result<()> {
    let removed = records::remove(ctx.backend(), Table::Groups, &Query::new().eq("id", group.id.to_string())).await?;
    if removed == 0 {
        return Ok(());
    }

    let members = Query::new().is_in("id", group.members.iter().map(Uuid::to_string));
    let release = MembershipPatch {
        current_group_id: None,
        submitted: false,
    };
    records::patch::<User, _>(ctx.backend(), &members, &release).await?;

    info!("Group {} disbanded", group.id);
    notify::notify_members(
        ctx,
        group,
        None,
        "Your group has disbanded",
        "Not enough members answered the last prompt. Join again to meet a new group.",
        json!({ "type": "disband", "group_id": group.id }),
    )
    .await;
    Ok(())
}

/// Clear a stale submitted flag left over from an earlier day.
pub async fn apply_daily_reset(ctx: &AppContext, user: User, today: NaiveDate) -> Result<User> {
    if !needs_daily_reset(&user, today) {
        return Ok(user);
    }
    let patch = SubmissionStatusPatch {
        submitted: false,
        last_submission_date: None,
    };
    let query = Query::new().eq("id", user.id.to_string());
    match records::patch::<User, _>(ctx.backend(), &query, &patch).await?.pop() {
        Some(updated) => {
            info!("Reset submitted flag for {}", updated.id);
            Ok(updated)
        }
        None => {
            warn!("User {} vanished during daily reset", user.id);
            Ok(user)
        }
    }
}
