//! Circle CLI
//!
//! Drives the client core from a terminal: sign in, take the quiz, join a
//! group, answer the daily prompt, and chat.

mod config;

use std::path::PathBuf;

use anyhow::{Result, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use circle_core::matching::{self, JoinOutcome};
use circle_core::personality::QUESTIONS;
use circle_core::{
    AppContext, ChatScreen, HomeScreen, PromptScreen, ReactionToggle, auth, notify, profile, quiz,
};
use circle_types::api::{Credentials, ProfileUpdate};
use circle_types::events::ChangeKind;
use circle_types::models::{Message, QuizAnswers};
use circle_types::Table;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "circle")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Small groups, one daily prompt, and a chat")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account
    Signup {
        email: String,
        #[arg(long, env = "CIRCLE_PASSWORD")]
        password: String,
    },

    /// Sign in to an existing account
    Signin {
        email: String,
        #[arg(long, env = "CIRCLE_PASSWORD")]
        password: String,
    },

    /// Sign out and forget the saved session
    Signout,

    /// Take the personality quiz. Without answers, print the questions.
    Quiz {
        /// Answer in question=answer form, e.g. question1="Very like me"
        #[arg(short, long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },

    /// Join a group, or see your place in the queue
    Join,

    /// Show your group, today's prompt and the streak
    Home,

    /// Answer today's prompt
    Respond { text: String },

    /// Show the group's answers to today's prompt
    Responses,

    /// Show recent chat messages
    Chat {
        /// Keep printing new messages until interrupted
        #[arg(short, long)]
        follow: bool,
    },

    /// Send a chat message
    Send { text: String },

    /// Toggle an emoji reaction on a message
    React { message_id: Uuid, emoji: String },

    /// Translate a message into your preferred language
    Translate { message_id: Uuid },

    /// Report a message
    Report { message_id: Uuid, reason: String },

    /// Edit your profile
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Language code for translations, e.g. "es"
        #[arg(long)]
        language: Option<String>,
    },

    /// Upload a profile picture
    Avatar {
        path: PathBuf,
        /// MIME type (default: guessed from the file extension)
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Register this device's push token
    PushToken { token: String },

    /// List unread notifications
    Notifications {
        /// Mark them as read afterwards
        #[arg(long)]
        mark_read: bool,
    },
}

fn parse_answer(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((q, a)) if !q.trim().is_empty() => Ok((q.trim().to_string(), a.trim().to_string())),
        _ => Err(format!("expected question=answer, got '{}'", raw)),
    }
}

fn guess_content_type(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

fn print_message(screen: &ChatScreen, message: &Message) {
    let reactions: Vec<String> = screen
        .reaction_summary(message.id)
        .into_iter()
        .map(|g| format!("{}{}", g.emoji, g.count))
        .collect();
    println!(
        "[{}] {}: {}  {}  ({})",
        message.created_at.format("%H:%M"),
        screen.author_name(message),
        message.message_text,
        reactions.join(" "),
        message.id
    );
}

async fn signed_in(ctx: &AppContext) -> Result<()> {
    match auth::restore(ctx).await? {
        Some(_) => Ok(()),
        None => bail!("not signed in; run `circle signin <email>` first"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circle=info,circle_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let ctx = config.build_context()?;

    match cli.command {
        Commands::Signup { email, password } => {
            let user = auth::sign_up(&ctx, &Credentials { email, password }).await?;
            println!("Welcome, {}. Take the quiz next: circle quiz", user.display_name());
        }

        Commands::Signin { email, password } => {
            let user = auth::sign_in(&ctx, &Credentials { email, password }).await?;
            println!("Signed in as {}", user.email);
        }

        Commands::Signout => {
            if auth::restore(&ctx).await.is_ok() {
                auth::sign_out(&ctx).await?;
            }
            println!("Signed out");
        }

        Commands::Quiz { answers } => {
            if answers.is_empty() {
                for q in QUESTIONS.iter() {
                    println!("{}: {}", q.id, q.statement);
                }
                println!();
                println!("Answer each with: Very unlike me, Unlike me, Neutral, Like me, Very like me");
                return Ok(());
            }
            signed_in(&ctx).await?;
            let answers: QuizAnswers = answers.into_iter().collect();
            let result = quiz::complete_quiz(&ctx, &answers).await?;
            println!("You are a {}.", result.personality_type);
            println!("{}", result.description);
        }

        Commands::Join => {
            signed_in(&ctx).await?;
            match matching::join_group(&ctx).await? {
                JoinOutcome::Joined(group) => {
                    println!("You're in a group of {} ({})", group.member_count(), group.id)
                }
                JoinOutcome::Queued { position } => {
                    println!("Waiting for a group: number {} in the queue", position)
                }
            }
        }

        Commands::Home => {
            signed_in(&ctx).await?;
            let home = HomeScreen::load(&ctx).await?;
            if home.disbanded {
                println!("Your group disbanded. Run `circle join` to meet a new one.");
            }
            let Some(group) = &home.group else {
                println!("No group yet. Run `circle join`.");
                return Ok(());
            };
            println!("Group {}  streak {}", group.id, home.streak());
            if let Some(prompt) = &home.prompt {
                println!("Today: {}", prompt.content);
            }
            if let Some(due) = group.next_prompt_due {
                println!("Due: {}", due.format("%Y-%m-%d %H:%M UTC"));
            }
            println!(
                "Answered: {}/{}{}",
                home.submitted_count,
                group.member_count(),
                if home.has_submitted() { " (you're done)" } else { "" }
            );
            for member in &home.members {
                let kind = member
                    .personality_type
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "?".into());
                println!("  {} ({})", member.display_name(), kind);
            }
        }

        Commands::Respond { text } => {
            signed_in(&ctx).await?;
            let mut screen = PromptScreen::open(&ctx).await?;
            screen.draft = text;
            screen.submit().await?;
            println!("Answer saved. {} of your group have answered.", screen.response_count());
        }

        Commands::Responses => {
            signed_in(&ctx).await?;
            let screen = PromptScreen::open(&ctx).await?;
            println!("{}", screen.prompt().content);
            if !screen.has_submitted() {
                println!("Answer first to see everyone else's ({} so far).", screen.response_count());
                return Ok(());
            }
            for response in screen.visible_responses() {
                println!("- {}", response.response_text);
            }
        }

        Commands::Chat { follow } => {
            signed_in(&ctx).await?;
            let mut screen = ChatScreen::open(&ctx).await?;
            let history: Vec<Message> = screen.messages().cloned().collect();
            for message in &history {
                print_message(&screen, message);
            }
            if !follow {
                return Ok(());
            }

            let mut feed = screen.subscribe().await?;
            loop {
                tokio::select! {
                    event = feed.next() => {
                        let Some(event) = event else { break };
                        let fresh = event.table == Table::Messages && event.kind == ChangeKind::Insert;
                        if screen.apply(&event) && fresh {
                            if let Some(id) = event.row_id() {
                                if let Some(message) = screen.messages().find(|m| m.id == id).cloned() {
                                    print_message(&screen, &message);
                                }
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }

        Commands::Send { text } => {
            signed_in(&ctx).await?;
            let mut screen = ChatScreen::open(&ctx).await?;
            screen.draft = text;
            let message = screen.send().await?;
            println!("Sent ({})", message.id);
        }

        Commands::React { message_id, emoji } => {
            signed_in(&ctx).await?;
            let mut screen = ChatScreen::open(&ctx).await?;
            match screen.toggle_reaction(message_id, &emoji).await? {
                ReactionToggle::Added(_) => println!("Reacted {}", emoji),
                ReactionToggle::Removed => println!("Removed {}", emoji),
            }
        }

        Commands::Translate { message_id } => {
            signed_in(&ctx).await?;
            let mut screen = ChatScreen::open(&ctx).await?;
            println!("{}", screen.translate(message_id).await?);
        }

        Commands::Report { message_id, reason } => {
            signed_in(&ctx).await?;
            let mut screen = ChatScreen::open(&ctx).await?;
            screen.report(message_id, &reason).await?;
            println!("Thanks, the report was sent.");
        }

        Commands::Profile {
            name,
            bio,
            location,
            language,
        } => {
            signed_in(&ctx).await?;
            let update = ProfileUpdate {
                preferred_name: name,
                bio,
                location,
                preferred_language: language,
            };
            let user = profile::update_profile(&ctx, &update).await?;
            println!("{}", user.display_name());
            if let Some(bio) = &user.bio {
                println!("  {}", bio);
            }
            if let Some(location) = &user.location {
                println!("  {}", location);
            }
            if let Some(kind) = user.personality_type {
                println!("  {}", kind);
            }
        }

        Commands::Avatar { path, content_type } => {
            signed_in(&ctx).await?;
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&path).to_string());
            let data = tokio::fs::read(&path).await?;
            let user = profile::upload_avatar(&ctx, Bytes::from(data), &content_type).await?;
            println!("Avatar: {}", user.avatar_url.unwrap_or_default());
        }

        Commands::PushToken { token } => {
            signed_in(&ctx).await?;
            notify::register_push_token(&ctx, &token).await?;
            println!("Push token saved");
        }

        Commands::Notifications { mark_read } => {
            signed_in(&ctx).await?;
            let unread = notify::unread(&ctx).await?;
            for n in &unread {
                println!("[{}] {}: {}", n.created_at.format("%m-%d %H:%M"), n.title, n.body);
            }
            if unread.is_empty() {
                println!("Nothing new");
            } else if mark_read {
                notify::mark_all_read(&ctx).await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn answers_parse_from_key_value_pairs() {
        assert_eq!(
            parse_answer("question1=Very like me").unwrap(),
            ("question1".to_string(), "Very like me".to_string())
        );
        assert!(parse_answer("Very like me").is_err());
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(guess_content_type(std::path::Path::new("me.JPG")), "image/jpeg");
        assert_eq!(guess_content_type(std::path::Path::new("me")), "application/octet-stream");
    }
}
