//! Credential provider: client secrets on disk, refresh token in the OS
//! keyring, access tokens minted on demand.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use classnotify_shared::api::rest::RestError;
use classnotify_shared::oauth::{self, ClientSecrets};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::AppError;

const KEYRING_SERVICE: &str = "classnotify";
const EXPIRY_MARGIN_SECS: i64 = 60;
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token refresh failed: {0}")]
    Refresh(#[from] RestError),
}

impl AuthError {
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Refresh(e) => e.is_transient(),
        }
    }
}

/// Supplies bearer tokens to the API client. The poll loop never looks inside.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer(&self) -> Result<String, AuthError>;
    /// Forget any cached token, e.g. after the server rejected it.
    async fn invalidate(&self);
}

/// Fixed bearer token, for tests and pre-minted tokens.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }

    async fn invalidate(&self) {}
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

struct TokenState {
    refresh_token: String,
    cached: Option<CachedToken>,
}

pub struct OAuthTokens {
    secrets: ClientSecrets,
    state: Mutex<TokenState>,
}

impl OAuthTokens {
    pub fn new(secrets: ClientSecrets, refresh_token: String) -> Self {
        Self {
            secrets,
            state: Mutex::new(TokenState {
                refresh_token,
                cached: None,
            }),
        }
    }

    /// Loads the refresh token saved by `classnotify login`.
    pub fn from_keyring(secrets: ClientSecrets) -> Result<Self, AppError> {
        let refresh_token = read_refresh_token(&secrets.client_id)?;
        Ok(Self::new(secrets, refresh_token))
    }
}

#[async_trait]
impl TokenSource for OAuthTokens {
    async fn bearer(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(c) = &state.cached {
            if c.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
                return Ok(c.access_token.clone());
            }
        }

        debug!("refreshing access token");
        let resp = oauth::refresh_access_token(&self.secrets, &state.refresh_token).await?;
        if let Some(rotated) = resp.refresh_token.filter(|t| !t.is_empty()) {
            if rotated != state.refresh_token {
                info!("refresh token rotated; updating keyring");
                if let Err(e) = store_refresh_token(&self.secrets.client_id, &rotated) {
                    warn!(error=%e, "failed to persist rotated refresh token");
                }
                state.refresh_token = rotated;
            }
        }
        let lifetime = resp.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let access_token = resp.access_token;
        state.cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: now + Duration::seconds(lifetime as i64),
        });
        Ok(access_token)
    }

    async fn invalidate(&self) {
        self.state.lock().await.cached = None;
    }
}

pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets, AppError> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("unable to read client secret file {}: {e}", path.display()))
    })?;
    ClientSecrets::from_json(&data).map_err(|e| {
        AppError::Config(format!("unable to parse client secret file {}: {e}", path.display()))
    })
}

pub fn keyring_entry(client_id: &str) -> Result<keyring::Entry, AppError> {
    keyring::Entry::new(KEYRING_SERVICE, client_id).map_err(|e| AppError::Keyring(e.to_string()))
}

pub fn read_refresh_token(client_id: &str) -> Result<String, AppError> {
    let entry = keyring_entry(client_id)?;
    match entry.get_password() {
        Ok(t) => Ok(t),
        Err(keyring::Error::NoEntry) => Err(AppError::Auth(
            "no saved credentials; run `classnotify login` first".into(),
        )),
        Err(e) => Err(AppError::Keyring(e.to_string())),
    }
}

pub fn store_refresh_token(client_id: &str, refresh_token: &str) -> Result<(), AppError> {
    keyring_entry(client_id)?
        .set_password(refresh_token)
        .map_err(|e| AppError::Keyring(e.to_string()))
}

/// Returns whether a token was present.
pub fn delete_refresh_token(client_id: &str) -> Result<bool, AppError> {
    match keyring_entry(client_id)?.delete_credential() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => Err(AppError::Keyring(e.to_string())),
    }
}
