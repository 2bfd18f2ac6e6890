use chrono::Utc;
use tracing::{info, warn};

use circle_backend::records;
use circle_types::Query;
use circle_types::api::MembershipPatch;
use circle_types::models::{Group, Prompt, User};

use crate::context::AppContext;
use crate::error::Result;
use crate::lifecycle::{self, GroupStatus};
use crate::prompt;

/// Everything the home screen shows.
#[derive(Debug, Clone)]
pub struct HomeState {
    pub user: User,
    pub group: Option<Group>,
    pub prompt: Option<Prompt>,
    pub members: Vec<User>,
    /// Members who answered the current prompt.
    pub submitted_count: usize,
    /// The group was disbanded during this load.
    pub disbanded: bool,
}

impl HomeState {
    pub fn has_submitted(&self) -> bool {
        self.user.submitted
    }

    pub fn streak(&self) -> i64 {
        self.group.as_ref().map_or(0, |g| g.streak_count)
    }
}

pub struct HomeScreen;

impl HomeScreen {
    /// Load the home screen. Runs the daily reset and the group lifecycle
    /// check on the way, since nothing else triggers them.
    pub async fn load(ctx: &AppContext) -> Result<HomeState> {
        let user = ctx.refresh_user().await?;
        let mut user = lifecycle::apply_daily_reset(ctx, user, Utc::now().date_naive()).await?;

        let mut disbanded = false;
        let mut group = None;
        if let Some(group_id) = user.current_group_id {
            match records::fetch_by_id::<Group>(ctx.backend(), group_id).await? {
                Some(found) => match lifecycle::check_group(ctx, found).await? {
                    GroupStatus::Active(g) | GroupStatus::Renewed(g) => group = Some(g),
                    GroupStatus::Disbanded => disbanded = true,
                },
                None => {
                    warn!("{} points at missing group {}, clearing", user.id, group_id);
                    let release = MembershipPatch {
                        current_group_id: None,
                        submitted: false,
                    };
                    let query = Query::new().eq("id", user.id.to_string());
                    records::patch::<User, _>(ctx.backend(), &query, &release).await?;
                    disbanded = true;
                }
            }
        }

        let mut current_prompt = None;
        if let Some(g) = group.take() {
            let g = match g.current_prompt_id {
                Some(_) => g,
                None => {
                    info!("Group {} has no prompt yet, issuing one", g.id);
                    let (g, p) = prompt::refresh_prompt(ctx, &g).await?;
                    current_prompt = Some(p);
                    g
                }
            };
            group = Some(g);
        }

        // Renewal, disband and prompt refresh all rewrite the user row.
        user = ctx.refresh_user().await.unwrap_or(user);

        let Some(g) = group else {
            return Ok(HomeState {
                user,
                group: None,
                prompt: None,
                members: Vec::new(),
                submitted_count: 0,
                disbanded,
            });
        };

        if current_prompt.is_none() {
            if let Some(id) = g.current_prompt_id {
                current_prompt = records::fetch_by_id::<Prompt>(ctx.backend(), id)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Could not load prompt {}: {}", id, e);
                        None
                    });
            }
        }

        let query = Query::new().is_in("id", g.members.iter().map(|id| id.to_string()));
        let members = records::fetch::<User>(ctx.backend(), &query)
            .await
            .unwrap_or_else(|e| {
                warn!("Could not load members of group {}: {}", g.id, e);
                Vec::new()
            });
        let submitted_count = lifecycle::submitted_members(ctx, &g).await.unwrap_or_else(|e| {
            warn!("Could not count responses in group {}: {}", g.id, e);
            0
        });

        Ok(HomeState {
            user,
            group: Some(g),
            prompt: current_prompt,
            members,
            submitted_count,
            disbanded,
        })
    }
}
