mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use circle_backend::{Backend, records};
use circle_core::{AppContext, ChatScreen, CoreError, ReactionToggle};
use circle_types::models::{Notification, Report};
use circle_types::{Query, Table};
use uuid::Uuid;

use common::{Flaky, Outbox, Shouting, database, group_of, settings};

#[tokio::test]
async fn failed_send_rolls_back_and_restores_the_draft() {
    let db = database();
    let flaky = Arc::new(Flaky::new(db.clone()));
    let (members, _) = group_of(&db, flaky.clone(), 3).await;

    let mut chat = ChatScreen::open(&members[0]).await.unwrap();
    chat.draft = "  hello there  ".into();
    flaky.fail_writes(Table::Messages);

    let err = chat.send().await.unwrap_err();
    assert!(matches!(err, CoreError::Backend(_)));
    assert_eq!(chat.draft, "  hello there  ");
    assert_eq!(chat.messages().count(), 0);
    assert_eq!(chat.pending_count(), 0);
    assert!(chat.error().is_some());

    flaky.heal();
    let sent = chat.send().await.unwrap();
    assert_eq!(sent.message_text, "hello there");
    assert!(chat.draft.is_empty());
    assert!(chat.error().is_none());
    let ids: Vec<Uuid> = chat.messages().map(|m| m.id).collect();
    assert_eq!(ids, vec![sent.id]);
}

#[tokio::test]
async fn blank_messages_are_rejected_without_touching_the_draft() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let mut chat = ChatScreen::open(&members[0]).await.unwrap();

    chat.draft = "   ".into();
    assert!(matches!(chat.send().await, Err(CoreError::EmptyMessage)));
    assert_eq!(chat.draft, "   ");
}

#[tokio::test]
async fn history_loads_in_ascending_order_with_page_limit() {
    let db = database();
    let (members, group) = group_of(&db, db.clone(), 2).await;
    let mut writer = ChatScreen::open(&members[1]).await.unwrap();
    for i in 0..5 {
        writer.draft = format!("message {}", i);
        writer.send().await.unwrap();
    }

    let mut page = settings(2);
    page.message_page_size = 3;
    let ctx = AppContext::builder(db.clone()).settings(page).build();
    circle_core::auth::sign_in(
        &ctx,
        &circle_types::api::Credentials {
            email: "member0@example.com".into(),
            password: "correct horse".into(),
        },
    )
    .await
    .unwrap();

    let reader = ChatScreen::open(&ctx).await.unwrap();
    assert_eq!(reader.group().id, group.id);
    let texts: Vec<&str> = reader.messages().map(|m| m.message_text.as_str()).collect();
    assert_eq!(texts, ["message 2", "message 3", "message 4"]);
}

#[tokio::test]
async fn reaction_toggle_adds_then_removes() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let mut chat = ChatScreen::open(&members[0]).await.unwrap();
    chat.draft = "react to me".into();
    let message = chat.send().await.unwrap();

    let added = chat.toggle_reaction(message.id, "👍").await.unwrap();
    assert!(matches!(added, ReactionToggle::Added(_)));
    let summary = chat.reaction_summary(message.id);
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].count, 1);

    let removed = chat.toggle_reaction(message.id, "👍").await.unwrap();
    assert_eq!(removed, ReactionToggle::Removed);
    assert!(chat.reaction_summary(message.id).is_empty());

    let stored = db.select(Table::Reactions, &Query::new()).await.unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn reaction_already_on_the_backend_counts_as_removal() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let mut first = ChatScreen::open(&members[0]).await.unwrap();
    first.draft = "hi".into();
    let message = first.send().await.unwrap();

    // Same user, second device: it has not seen the reaction yet.
    let mut second = ChatScreen::open(&members[0]).await.unwrap();
    first.toggle_reaction(message.id, "🎉").await.unwrap();

    let outcome = second.toggle_reaction(message.id, "🎉").await.unwrap();
    assert_eq!(outcome, ReactionToggle::Removed);
    assert!(second.reaction_summary(message.id).is_empty());
    assert!(db.select(Table::Reactions, &Query::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_reaction_removal_is_restored() {
    let db = database();
    let flaky = Arc::new(Flaky::new(db.clone()));
    let (members, _) = group_of(&db, flaky.clone(), 2).await;
    let mut chat = ChatScreen::open(&members[0]).await.unwrap();
    chat.draft = "hi".into();
    let message = chat.send().await.unwrap();
    chat.toggle_reaction(message.id, "❤️").await.unwrap();

    flaky.fail_writes(Table::Reactions);
    assert!(chat.toggle_reaction(message.id, "❤️").await.is_err());
    assert_eq!(chat.reaction_summary(message.id)[0].count, 1);
}

#[tokio::test]
async fn blank_emoji_is_not_a_reaction() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let mut chat = ChatScreen::open(&members[0]).await.unwrap();
    chat.draft = "hi".into();
    let message = chat.send().await.unwrap();

    for blank in ["", "   ", "\t\n"] {
        assert!(matches!(
            chat.toggle_reaction(message.id, blank).await,
            Err(CoreError::EmptyReaction)
        ));
    }
    assert!(chat.reaction_summary(message.id).is_empty());
    assert!(db.select(Table::Reactions, &Query::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn summary_groups_by_emoji_in_first_use_order() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 3).await;
    let mut a = ChatScreen::open(&members[0]).await.unwrap();
    a.draft = "vote".into();
    let message = a.send().await.unwrap();

    a.toggle_reaction(message.id, "🔥").await.unwrap();
    let mut b = ChatScreen::open(&members[1]).await.unwrap();
    b.toggle_reaction(message.id, "😂").await.unwrap();
    let mut c = ChatScreen::open(&members[2]).await.unwrap();
    c.toggle_reaction(message.id, "🔥").await.unwrap();

    c.reload().await;
    let summary = c.reaction_summary(message.id);
    let emoji: Vec<&str> = summary.iter().map(|g| g.emoji.as_str()).collect();
    assert_eq!(emoji, ["🔥", "😂"]);
    assert_eq!(summary[0].count, 2);
    assert_eq!(summary[0].user_ids.len(), 2);
}

#[tokio::test]
async fn unknown_messages_cannot_be_reacted_to() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let mut chat = ChatScreen::open(&members[0]).await.unwrap();
    let missing = Uuid::new_v4();
    assert!(matches!(
        chat.toggle_reaction(missing, "👍").await,
        Err(CoreError::UnknownMessage(id)) if id == missing
    ));
}

#[tokio::test]
async fn realtime_echo_of_own_send_is_not_duplicated() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let mut mine = ChatScreen::open(&members[0]).await.unwrap();
    let mut feed = mine.subscribe().await.unwrap();

    mine.draft = "echo".into();
    mine.send().await.unwrap();
    let echo = tokio::time::timeout(Duration::from_secs(2), feed.next())
        .await
        .unwrap()
        .unwrap();
    mine.apply(&echo);
    assert_eq!(mine.messages().count(), 1);

    let mut theirs = ChatScreen::open(&members[1]).await.unwrap();
    theirs.draft = "from the other side".into();
    let sent = theirs.send().await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(2), feed.next())
        .await
        .unwrap()
        .unwrap();
    assert!(mine.apply(&event));
    let texts: Vec<&str> = mine.messages().map(|m| m.message_text.as_str()).collect();
    assert_eq!(texts, ["echo", "from the other side"]);

    theirs.toggle_reaction(sent.id, "👋").await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(2), feed.next())
        .await
        .unwrap()
        .unwrap();
    assert!(mine.apply(&event));
    assert_eq!(mine.reaction_summary(sent.id)[0].emoji, "👋");
}

#[tokio::test]
async fn translations_are_cached_per_language() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let shouting = Arc::new(Shouting::default());
    let ctx = AppContext::builder(db.clone())
        .settings(settings(2))
        .translator(shouting.clone())
        .build();
    circle_core::auth::sign_in(
        &ctx,
        &circle_types::api::Credentials {
            email: "member1@example.com".into(),
            password: "correct horse".into(),
        },
    )
    .await
    .unwrap();

    let mut sender = ChatScreen::open(&members[0]).await.unwrap();
    sender.draft = "good morning".into();
    let message = sender.send().await.unwrap();

    let mut chat = ChatScreen::open(&ctx).await.unwrap();
    assert_eq!(chat.translate(message.id).await.unwrap(), "[en] GOOD MORNING");
    assert_eq!(chat.translate(message.id).await.unwrap(), "[en] GOOD MORNING");
    assert_eq!(shouting.calls.load(Ordering::SeqCst), 1);
    assert_eq!(chat.cached_translation(message.id, "en"), Some("[en] GOOD MORNING"));

    // Without a translator configured the call is a translation error.
    let mut plain = ChatScreen::open(&members[1]).await.unwrap();
    assert!(matches!(
        plain.translate(message.id).await,
        Err(CoreError::Translation(_))
    ));
}

#[tokio::test]
async fn reports_name_the_author() {
    let db = database();
    let (members, _) = group_of(&db, db.clone(), 2).await;
    let mut author = ChatScreen::open(&members[0]).await.unwrap();
    author.draft = "something rude".into();
    let message = author.send().await.unwrap();

    let mut reporter = ChatScreen::open(&members[1]).await.unwrap();
    let report = reporter.report(message.id, " spam ").await.unwrap();
    assert_eq!(report.reported_user_id, members[0].user_id().unwrap());
    assert_eq!(report.reporter_id, members[1].user_id().unwrap());
    assert_eq!(report.reason, "spam");

    let stored: Vec<Report> = records::fetch(db.as_ref(), &Query::new()).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn sending_notifies_the_other_members() {
    let db = database();
    let (members, group) = group_of(&db, db.clone(), 3).await;
    circle_core::notify::register_push_token(&members[1], "device-b").await.unwrap();

    let outbox = Arc::new(Outbox::default());
    let ctx = AppContext::builder(db.clone())
        .settings(settings(3))
        .push(outbox.clone())
        .build();
    circle_core::auth::sign_in(
        &ctx,
        &circle_types::api::Credentials {
            email: "member0@example.com".into(),
            password: "correct horse".into(),
        },
    )
    .await
    .unwrap();
    let before: Vec<Notification> = records::fetch(db.as_ref(), &Query::new()).await.unwrap();

    let mut chat = ChatScreen::open(&ctx).await.unwrap();
    chat.draft = "ping".into();
    chat.send().await.unwrap();

    let after: Vec<Notification> = records::fetch(db.as_ref(), &Query::new()).await.unwrap();
    let fresh: Vec<&Notification> = after.iter().filter(|n| !before.contains(n)).collect();
    assert_eq!(fresh.len(), 2);
    let me = ctx.user_id().unwrap();
    assert!(fresh.iter().all(|n| n.user_id != me && group.has_member(n.user_id)));

    let sent = outbox.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token, "device-b");
    assert_eq!(sent[0].body, "ping");
}
