use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use uuid::Uuid;

use circle_backend::records;
use circle_backend::{Backend, PushRelay, Translator};
use circle_types::api::Session;
use circle_types::models::User;

use crate::auth::SessionStore;
use crate::error::{CoreError, Result};

/// Tunables shared by every controller.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Members per matched group.
    pub group_size: usize,
    /// Time a group has to respond before the next lifecycle check.
    pub prompt_interval: chrono::Duration,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    pub message_page_size: u32,
    pub storage_bucket: String,
    pub default_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            group_size: 4,
            prompt_interval: chrono::Duration::hours(24),
            poll_interval: Duration::from_secs(1),
            poll_attempts: 10,
            message_page_size: 50,
            storage_bucket: "avatars".to_string(),
            default_language: "en".to_string(),
        }
    }
}

/// Process-wide client state: the backend handles, settings, and who is
/// signed in. Clones share the same state.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    push: Option<Arc<dyn PushRelay>>,
    translator: Option<Arc<dyn Translator>>,
    session_store: Option<SessionStore>,
    settings: Settings,
    session: RwLock<Option<Session>>,
    user: RwLock<Option<User>>,
}

pub struct ContextBuilder {
    backend: Arc<dyn Backend>,
    push: Option<Arc<dyn PushRelay>>,
    translator: Option<Arc<dyn Translator>>,
    session_store: Option<SessionStore>,
    settings: Settings,
}

impl ContextBuilder {
    pub fn push(mut self, relay: Arc<dyn PushRelay>) -> Self {
        self.push = Some(relay);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn session_store(mut self, store: SessionStore) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> AppContext {
        AppContext {
            inner: Arc::new(Inner {
                backend: self.backend,
                push: self.push,
                translator: self.translator,
                session_store: self.session_store,
                settings: self.settings,
                session: RwLock::new(None),
                user: RwLock::new(None),
            }),
        }
    }
}

impl AppContext {
    pub fn builder(backend: Arc<dyn Backend>) -> ContextBuilder {
        ContextBuilder {
            backend,
            push: None,
            translator: None,
            session_store: None,
            settings: Settings::default(),
        }
    }

    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::builder(backend).build()
    }

    pub fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    pub fn push_relay(&self) -> Option<&dyn PushRelay> {
        self.inner.push.as_deref()
    }

    pub fn translator(&self) -> Option<&dyn Translator> {
        self.inner.translator.as_deref()
    }

    pub fn session_store(&self) -> Option<&SessionStore> {
        self.inner.session_store.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn session(&self) -> Option<Session> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_session(&self, session: Option<Session>) {
        *self.inner.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Id of the signed-in user.
    pub fn user_id(&self) -> Result<Uuid> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.user_id)
            .ok_or(CoreError::NotSignedIn)
    }

    /// Last known copy of the signed-in user's row.
    pub fn current_user(&self) -> Option<User> {
        self.inner
            .user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_user(&self, user: Option<User>) {
        *self.inner.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    /// Re-read the signed-in user's row and cache it.
    pub async fn refresh_user(&self) -> Result<User> {
        let id = self.user_id()?;
        let user = records::fetch_by_id::<User>(self.backend(), id)
            .await?
            .ok_or(CoreError::UnknownUser(id))?;
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    /// Language to translate into for the signed-in user.
    pub fn preferred_language(&self) -> String {
        self.current_user()
            .and_then(|u| u.preferred_language)
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or_else(|| self.inner.settings.default_language.clone())
    }
}
