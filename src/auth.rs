/**
 * Credential issuer
 * Email/password sign-in producing JWT sessions, plus explicit sign-out
 */
use async_trait::async_trait;
use bcrypt::verify;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::AuthConfig;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("credential backend error: {0}")]
    Backend(String),
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,   // User ID
    pub email: String, // User email
    pub role: String,  // User role
    pub exp: i64,      // Expiry timestamp
    pub iat: i64,      // Issued at timestamp
    pub jti: String,   // Session id
}

/// User info returned to frontend
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    async fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

// ============================================================================
// JWT issuer
// ============================================================================

struct StoredAccount {
    user_id: String,
    email: String,
    password_hash: String,
    role: String,
}

pub struct JwtIssuer {
    config: AuthConfig,
    pool: Option<PgPool>,
    /// sha256(token) -> expiry of signed-out sessions
    revoked: RwLock<HashMap<String, i64>>,
}

/// Hash a token before keeping it in memory.
fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl JwtIssuer {
    pub fn new(config: AuthConfig, pool: Option<PgPool>) -> Self {
        Self {
            config,
            pool,
            revoked: RwLock::new(HashMap::new()),
        }
    }

    /// Look the account up in `admin_users`, falling back to the configured
    /// admin when the table has no match or there is no database.
    async fn find_account(&self, email: &str) -> Result<Option<StoredAccount>, AuthError> {
        if let Some(pool) = &self.pool {
            let row = sqlx::query_as::<_, (String, String, String, String, bool)>(
                r#"SELECT id, email, password_hash, role, is_active
                   FROM admin_users
                   WHERE LOWER(email) = LOWER($1)"#,
            )
            .bind(email)
            .fetch_optional(pool)
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))?;

            if let Some((user_id, email, password_hash, role, is_active)) = row {
                if !is_active {
                    tracing::warn!("Login attempt on disabled account: {}", email);
                    return Ok(None);
                }
                return Ok(Some(StoredAccount {
                    user_id,
                    email,
                    password_hash,
                    role,
                }));
            }
        }

        if email.to_lowercase() == self.config.admin_email.to_lowercase() {
            return Ok(Some(StoredAccount {
                user_id: "admin-user-id".to_string(),
                email: self.config.admin_email.clone(),
                password_hash: self.config.admin_password_hash.clone(),
                role: "ADMIN".to_string(),
            }));
        }
        Ok(None)
    }

    fn create_access_token(&self, user: &UserInfo) -> Result<(String, DateTime<Utc>), AuthError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.config.session_minutes);

        let claims = Claims {
            sub: user.user_id.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Alphanumeric.sample_string(&mut rand::rng(), 32),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Backend(e.to_string()))?;

        Ok((token, exp))
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            AuthError::InvalidToken
        })
    }
}

#[async_trait]
impl CredentialIssuer for JwtIssuer {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let Some(account) = self.find_account(email).await? else {
            tracing::warn!("Login attempt for unknown user: {}", email);
            return Err(AuthError::InvalidCredentials);
        };

        // bcrypt is CPU-bound; keep the async executor free.
        let pwd = password.to_string();
        let hash = account.password_hash.clone();
        let password_ok = tokio::task::spawn_blocking(move || verify(&pwd, &hash).unwrap_or(false))
            .await
            .unwrap_or(false);
        if !password_ok {
            tracing::warn!("Failed login attempt for: {}", account.email);
            return Err(AuthError::InvalidCredentials);
        }

        if let Some(pool) = &self.pool {
            let _ = sqlx::query(
                "UPDATE admin_users SET last_login_at = now(), updated_at = now() WHERE id = $1",
            )
            .bind(&account.user_id)
            .execute(pool)
            .await;
        }

        let user = UserInfo {
            user_id: account.user_id,
            email: account.email,
            role: account.role,
        };
        let (access_token, expires_at) = self.create_access_token(&user)?;

        tracing::info!("Successful login for user: {}", user.email);
        Ok(Session {
            access_token,
            expires_at,
            user,
        })
    }

    /// Revokes the session. Signing out an already invalid token succeeds.
    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let Ok(claims) = self.decode_token(token) else {
            return Ok(());
        };

        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write().await;
        // Forget revocations whose token would have expired anyway.
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(fingerprint(token), claims.exp);
        Ok(())
    }

    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.decode_token(token)?;
        if self.revoked.read().await.contains_key(&fingerprint(token)) {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}
