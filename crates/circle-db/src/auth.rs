use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use circle_backend::{BackendError, Result};
use circle_types::api::{Claims, Credentials, Session};

use crate::Database;

const SESSION_DAYS: i64 = 30;

impl Database {
    pub fn register(&self, credentials: &Credentials) -> Result<Session> {
        let email = normalize_email(&credentials.email)?;
        if credentials.password.len() < 8 {
            return Err(BackendError::Auth("password must be at least 8 characters".into()));
        }

        if self.lookup_identity(&email)?.is_some() {
            return Err(BackendError::Auth("email already registered".into()));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(credentials.password.as_bytes(), &salt)
            .map_err(|e| BackendError::Auth(format!("could not hash password: {}", e)))?
            .to_string();

        let user_id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO auth_users (id, email, password) VALUES (?1, ?2, ?3)",
                (user_id.to_string(), &email, &password_hash),
            )?;
            Ok(())
        })?;

        self.issue_session(user_id, &email)
    }

    pub fn login(&self, credentials: &Credentials) -> Result<Session> {
        let email = normalize_email(&credentials.email)?;
        let (id, hash) = self
            .lookup_identity(&email)?
            .ok_or_else(|| BackendError::Auth("invalid email or password".into()))?;

        // Verify password
        let parsed_hash = PasswordHash::new(&hash)
            .map_err(|e| BackendError::Auth(format!("stored hash unreadable: {}", e)))?;
        Argon2::default()
            .verify_password(credentials.password.as_bytes(), &parsed_hash)
            .map_err(|_| BackendError::Auth("invalid email or password".into()))?;

        let user_id: Uuid = id
            .parse()
            .map_err(|_| BackendError::Auth(format!("corrupt identity id '{}'", id)))?;
        self.issue_session(user_id, &email)
    }

    fn lookup_identity(&self, email: &str) -> Result<Option<(String, String)>> {
        Ok(self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, password FROM auth_users WHERE email = ?1")?;
            let mut rows = stmt.query([email])?;
            match rows.next()? {
                Some(row) => Ok(Some((row.get(0)?, row.get(1)?))),
                None => Ok(None),
            }
        })?)
    }

    fn issue_session(&self, user_id: Uuid, email: &str) -> Result<Session> {
        let expires_at = chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS);
        let claims = Claims {
            sub: user_id,
            email: Some(email.to_string()),
            exp: expires_at.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| BackendError::Auth(format!("could not sign token: {}", e)))?;

        let session = Session {
            access_token: token,
            refresh_token: None,
            user_id,
            email: email.to_string(),
            expires_at: Some(expires_at),
        };
        self.store_session(Some(session.clone()));
        Ok(session)
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(BackendError::Auth(format!("'{}' is not an email address", email))),
    }
}
