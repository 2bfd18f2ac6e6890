mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use circle_backend::{Backend, records};
use circle_core::lifecycle::{self, GroupStatus};
use circle_core::{CoreError, HomeScreen, PromptScreen};
use circle_types::models::{Group, Prompt, User};
use circle_types::{Query, Table};

use common::{Flaky, database, expire, group_of, row};

async fn answer(ctx: &circle_core::AppContext, text: &str) {
    let mut screen = PromptScreen::open(ctx).await.unwrap();
    screen.draft = text.into();
    screen.submit().await.unwrap();
}

#[tokio::test]
async fn new_groups_start_with_a_prompt_due_tomorrow() {
    let db = database();
    let (members, group) = group_of(&db, db.clone(), 3).await;

    let home = HomeScreen::load(&members[0]).await.unwrap();
    let shown = home.group.as_ref().unwrap();
    assert_eq!(shown.id, group.id);
    assert!(home.prompt.is_some());
    assert_eq!(home.members.len(), 3);
    assert_eq!(home.streak(), 0);
    assert!(!home.has_submitted());

    let due = shown.next_prompt_due.unwrap();
    assert!(due > Utc::now() + Duration::hours(23));
}

#[tokio::test]
async fn home_issues_a_prompt_when_the_group_has_none() {
    let db = database();
    let (members, group) = group_of(&db, db.clone(), 2).await;
    db.update(
        Table::Groups,
        &Query::new().eq("id", group.id.to_string()),
        row(json!({ "current_prompt_id": null, "next_prompt_due": null })),
    )
    .await
    .unwrap();

    let home = HomeScreen::load(&members[1]).await.unwrap();
    assert!(home.prompt.is_some());
    assert!(home.group.unwrap().current_prompt_id.is_some());
}

#[tokio::test]
async fn responses_stay_hidden_until_you_answer() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 3).await;
    answer(&members[1], "a sunny walk").await;

    let mut screen = PromptScreen::open(&members[0]).await.unwrap();
    assert_eq!(screen.response_count(), 1);
    assert!(screen.visible_responses().is_empty());

    screen.draft = "coffee with friends".into();
    screen.submit().await.unwrap();
    assert!(screen.has_submitted());
    assert_eq!(screen.visible_responses().len(), 2);

    let me = members[0].refresh_user().await.unwrap();
    assert!(me.submitted);
    assert_eq!(me.last_submission_date, Some(Utc::now().date_naive()));
}

#[tokio::test]
async fn a_prompt_cannot_be_answered_twice() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let mut first = PromptScreen::open(&members[0]).await.unwrap();
    let mut second = PromptScreen::open(&members[0]).await.unwrap();

    first.draft = "first".into();
    first.submit().await.unwrap();

    first.draft = "again".into();
    assert!(matches!(first.submit().await, Err(CoreError::AlreadySubmitted)));

    // A screen that never saw the first answer is stopped by the backend check.
    second.draft = "from elsewhere".into();
    assert!(matches!(second.submit().await, Err(CoreError::AlreadySubmitted)));
    assert!(second.has_submitted());

    let stored = db.select(Table::Submissions, &Query::new()).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn empty_responses_are_rejected() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let mut screen = PromptScreen::open(&members[0]).await.unwrap();
    screen.draft = " \n ".into();
    assert!(matches!(screen.submit().await, Err(CoreError::EmptyResponse)));
}

#[tokio::test]
async fn late_group_with_too_few_answers_disbands() {
    let db = database();
    let (members, group) = group_of(&db, db.clone(), 4).await;
    answer(&members[0], "only me").await;
    expire(&db, &group).await;

    let home = HomeScreen::load(&members[1]).await.unwrap();
    assert!(home.disbanded);
    assert!(home.group.is_none());
    assert!(home.prompt.is_none());

    let gone: Option<Group> = records::fetch_by_id(db.as_ref(), group.id).await.unwrap();
    assert!(gone.is_none());
    for member in &members {
        let user = member.refresh_user().await.unwrap();
        assert_eq!(user.current_group_id, None);
        assert!(!user.submitted);
    }
}

#[tokio::test]
async fn late_group_missing_one_answer_renews_and_resets_streak() {
    let db = database();
    let (members, group) = group_of(&db, db.clone(), 3).await;
    db.update(
        Table::Groups,
        &Query::new().eq("id", group.id.to_string()),
        row(json!({ "streak_count": 5 })),
    )
    .await
    .unwrap();
    answer(&members[0], "one").await;
    answer(&members[1], "two").await;
    expire(&db, &group).await;

    let home = HomeScreen::load(&members[2]).await.unwrap();
    let renewed = home.group.unwrap();
    assert!(!home.disbanded);
    assert_eq!(renewed.streak_count, 0);
    assert_ne!(renewed.current_prompt_id, group.current_prompt_id);
    assert!(renewed.next_prompt_due.unwrap() > Utc::now());
    assert_eq!(home.submitted_count, 0);
}

#[tokio::test]
async fn full_participation_extends_the_streak_once() {
    let db = database();
    let (members, group) = group_of(&db, db.clone(), 3).await;
    for (i, member) in members.iter().enumerate() {
        answer(member, &format!("answer {}", i)).await;
    }
    expire(&db, &group).await;

    let home = HomeScreen::load(&members[0]).await.unwrap();
    assert_eq!(home.streak(), 1);
    assert!(!home.has_submitted());

    // A second load sees the fresh deadline and leaves the group alone.
    let again = HomeScreen::load(&members[1]).await.unwrap();
    assert_eq!(again.streak(), 1);

    let users: Vec<User> = records::fetch(db.as_ref(), &Query::new()).await.unwrap();
    assert!(users.iter().all(|u| !u.submitted));
}

#[tokio::test]
async fn interrupted_renewal_is_not_counted_twice() {
    let db = database();
    let flaky = Arc::new(Flaky::new(db.clone()));
    let (members, group) = group_of(&db, flaky.clone(), 3).await;
    for (i, member) in members.iter().enumerate() {
        answer(member, &format!("answer {}", i)).await;
    }
    expire(&db, &group).await;

    flaky.fail_writes(Table::Prompts);
    assert!(matches!(
        HomeScreen::load(&members[0]).await,
        Err(CoreError::Backend(_))
    ));
    let untouched: Group = records::fetch_by_id(db.as_ref(), group.id).await.unwrap().unwrap();
    assert_eq!(untouched.streak_count, 0);

    flaky.heal();
    let home = HomeScreen::load(&members[1]).await.unwrap();
    assert_eq!(home.streak(), 1);
    let stored: Group = records::fetch_by_id(db.as_ref(), group.id).await.unwrap().unwrap();
    assert_eq!(stored.streak_count, 1);
    assert!(stored.next_prompt_due.unwrap() > Utc::now());
}

#[tokio::test]
async fn an_expired_round_is_renewed_by_one_client_only() {
    let db = database();
    let (members, group) = group_of(&db, db.clone(), 3).await;
    for (i, member) in members.iter().enumerate() {
        answer(member, &format!("answer {}", i)).await;
    }
    expire(&db, &group).await;

    // Both clients read the group before either renews it.
    let seen: Group = records::fetch_by_id(db.as_ref(), group.id).await.unwrap().unwrap();
    let first = lifecycle::check_group(&members[0], seen.clone()).await.unwrap();
    let second = lifecycle::check_group(&members[1], seen).await.unwrap();

    let GroupStatus::Renewed(renewed) = first else {
        panic!("first client should renew, got {:?}", first);
    };
    let GroupStatus::Active(current) = second else {
        panic!("second client should see the renewed group, got {:?}", second);
    };
    assert_eq!(renewed.streak_count, 1);
    assert_eq!(current.streak_count, 1);
    assert_eq!(current.current_prompt_id, renewed.current_prompt_id);
    assert_eq!(current.next_prompt_due, renewed.next_prompt_due);

    // The opening prompt plus exactly one renewal.
    let prompts: Vec<Prompt> = records::fetch(db.as_ref(), &Query::new()).await.unwrap();
    assert_eq!(prompts.len(), 2);
}

#[tokio::test]
async fn failed_response_rolls_back_and_keeps_the_draft() {
    let db = database();
    let flaky = Arc::new(Flaky::new(db.clone()));
    let (members, _) = group_of(&db, flaky.clone(), 2).await;
    let mut screen = PromptScreen::open(&members[0]).await.unwrap();
    screen.draft = " hi ".into();

    flaky.fail_writes(Table::Submissions);
    assert!(matches!(screen.submit().await, Err(CoreError::Backend(_))));
    assert_eq!(screen.draft, " hi ");
    assert_eq!(screen.response_count(), 0);
    assert!(!screen.has_submitted());
    assert!(screen.error().is_some());
    assert!(!members[0].refresh_user().await.unwrap().submitted);

    flaky.heal();
    screen.submit().await.unwrap();
    assert!(screen.has_submitted());
    assert!(screen.draft.is_empty());
    assert!(members[0].refresh_user().await.unwrap().submitted);
}

#[tokio::test]
async fn stale_submitted_flag_is_cleared_on_load() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let id = members[0].user_id().unwrap();
    let yesterday = Utc::now().date_naive().pred_opt().unwrap();
    db.update(
        Table::Users,
        &Query::new().eq("id", id.to_string()),
        row(json!({ "submitted": true, "last_submission_date": yesterday })),
    )
    .await
    .unwrap();

    let home = HomeScreen::load(&members[0]).await.unwrap();
    assert!(!home.user.submitted);
}

#[tokio::test]
async fn screens_need_a_group() {
    let db = database();
    let ctx = common::signed_up(db.clone(), "solo@example.com", common::settings(3)).await;
    assert!(matches!(PromptScreen::open(&ctx).await, Err(CoreError::NoGroup)));
    assert!(matches!(
        circle_core::ChatScreen::open(&ctx).await,
        Err(CoreError::NoGroup)
    ));

    let home = HomeScreen::load(&ctx).await.unwrap();
    assert!(home.group.is_none());
    assert!(!home.disbanded);
}
