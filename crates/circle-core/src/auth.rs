use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{info, warn};

use circle_backend::records;
use circle_types::api::{Claims, Credentials, NewUser, Session};
use circle_types::models::User;

use crate::context::AppContext;
use crate::error::{CoreError, Result};

/// Persists the session between runs as a JSON file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<Session>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read the `exp` claim of an access token. The signature is not checked;
/// the client only needs to know whether to bother presenting the token.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::from_timestamp(data.claims.exp as i64, 0)
}

pub fn is_expired(session: &Session, now: DateTime<Utc>) -> bool {
    match token_expiry(&session.access_token).or(session.expires_at) {
        Some(exp) => exp <= now,
        None => false,
    }
}

pub async fn sign_up(ctx: &AppContext, credentials: &Credentials) -> Result<User> {
    let session = ctx.backend().sign_up(credentials).await?;
    info!("Signed up {}", session.email);
    establish(ctx, session).await
}

pub async fn sign_in(ctx: &AppContext, credentials: &Credentials) -> Result<User> {
    let session = ctx.backend().sign_in(credentials).await?;
    info!("Signed in {}", session.email);
    establish(ctx, session).await
}

/// Drop the session locally even when the backend call fails.
pub async fn sign_out(ctx: &AppContext) -> Result<()> {
    if let Err(e) = ctx.backend().sign_out().await {
        warn!("Backend sign-out failed: {}", e);
    }
    ctx.backend().set_session(None).await;
    ctx.set_session(None);
    ctx.set_user(None);
    if let Some(store) = ctx.session_store() {
        store.clear().await?;
    }
    Ok(())
}

/// Resume the persisted session, if there is one.
pub async fn restore(ctx: &AppContext) -> Result<Option<User>> {
    let Some(store) = ctx.session_store() else {
        return Ok(None);
    };
    let Some(session) = store.load().await? else {
        return Ok(None);
    };

    if is_expired(&session, Utc::now()) {
        store.clear().await?;
        return Err(CoreError::SessionExpired);
    }

    ctx.backend().set_session(Some(&session)).await;
    ctx.set_session(Some(session.clone()));
    let user = ensure_user_row(ctx, &session).await?;
    ctx.set_user(Some(user.clone()));
    Ok(Some(user))
}

async fn establish(ctx: &AppContext, session: Session) -> Result<User> {
    ctx.backend().set_session(Some(&session)).await;
    ctx.set_session(Some(session.clone()));

    let user = ensure_user_row(ctx, &session).await?;
    ctx.set_user(Some(user.clone()));

    if let Some(store) = ctx.session_store() {
        if let Err(e) = store.save(&session).await {
            warn!("Could not persist session to {}: {}", store.path().display(), e);
        }
    }
    Ok(user)
}

async fn ensure_user_row(ctx: &AppContext, session: &Session) -> Result<User> {
    if let Some(user) = records::fetch_by_id::<User>(ctx.backend(), session.user_id).await? {
        return Ok(user);
    }
    let shape = NewUser {
        id: session.user_id,
        email: &session.email,
        submitted: false,
    };
    let user = records::create::<User, _>(ctx.backend(), &shape).await?;
    info!("Created profile row for {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    fn token(exp: i64) -> String {
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: None,
            exp: exp as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"server-only")).unwrap()
    }

    fn session(access_token: String) -> Session {
        Session {
            access_token,
            refresh_token: None,
            user_id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            expires_at: None,
        }
    }

    #[test]
    fn reads_expiry_without_the_signing_key() {
        let exp = Utc::now().timestamp() + 3600;
        assert_eq!(token_expiry(&token(exp)).unwrap().timestamp(), exp);
        assert!(token_expiry("not-a-jwt").is_none());
    }

    #[test]
    fn expiry_decides_session_validity() {
        let now = Utc::now();
        assert!(is_expired(&session(token(now.timestamp() - 10)), now));
        assert!(!is_expired(&session(token(now.timestamp() + 600)), now));

        let mut opaque = session("opaque".into());
        assert!(!is_expired(&opaque, now));
        opaque.expires_at = Some(now - chrono::Duration::minutes(1));
        assert!(is_expired(&opaque, now));
    }

    #[tokio::test]
    async fn session_file_roundtrip_and_clear() {
        let dir = std::env::temp_dir().join(format!("circle-session-{}", Uuid::new_v4()));
        let store = SessionStore::new(dir.join("nested").join("session.json"));

        assert!(store.load().await.unwrap().is_none());
        let saved = session(token(Utc::now().timestamp() + 60));
        store.save(&saved).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(saved));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        let _ = std::fs::remove_dir_all(dir);
    }
}
