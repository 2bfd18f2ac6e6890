//! Circle client core
//!
//! Headless screen controllers and the rules behind them: sign-in, the
//! personality quiz, matching, daily prompts, the group lifecycle, and chat.
//! A UI (or the `circle` CLI) owns an `AppContext` and drives these.

pub mod auth;
pub mod chat;
pub mod context;
pub mod error;
pub mod home;
pub mod lifecycle;
pub mod matching;
pub mod notify;
pub mod optimistic;
pub mod personality;
pub mod profile;
pub mod prompt;
pub mod quiz;

pub use auth::SessionStore;
pub use chat::{ChatFeed, ChatScreen, ReactionToggle};
pub use context::{AppContext, ContextBuilder, Settings};
pub use error::{CoreError, Result};
pub use home::{HomeScreen, HomeState};
pub use matching::JoinOutcome;
pub use prompt::PromptScreen;
pub use quiz::PersonalityResult;
