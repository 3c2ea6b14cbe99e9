//! OAuth 2.0 helpers for Google's installed-application flow.
//!
//! Only what the notifier needs: reading the client secrets file, building the
//! consent URL with PKCE, pulling the code out of what the user pastes back,
//! and (with `rest-client`) exchanging and refreshing tokens.

use base64::Engine;
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Read-only scopes: course list, announcements, the user's own coursework.
pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/classroom.courses.readonly",
    "https://www.googleapis.com/auth/classroom.announcements.readonly",
    "https://www.googleapis.com/auth/classroom.coursework.me.readonly",
];

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("client secrets: {0}")]
    Secrets(String),
    #[error("authorization response: {0}")]
    Callback(String),
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Contents of the `installed` (or `web`) section of a Google client secrets file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(data: &str) -> Result<Self, OAuthError> {
        let file: ClientSecretsFile =
            serde_json::from_str(data).map_err(|e| OAuthError::Secrets(e.to_string()))?;
        let secrets = file
            .installed
            .or(file.web)
            .ok_or_else(|| OAuthError::Secrets("missing `installed` or `web` section".into()))?;
        if secrets.client_id.trim().is_empty() {
            return Err(OAuthError::Secrets("client_id is empty".into()));
        }
        Ok(secrets)
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT_URI)
    }
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        // Two v4 UUIDs give 64 unreserved characters, within the 43..=128 range.
        let verifier = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        Self::from_verifier(verifier)
    }

    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

/// Consent URL requesting offline access so a refresh token is issued.
pub fn authorization_url(secrets: &ClientSecrets, state: &str, pkce: &Pkce) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}&code_challenge={}&code_challenge_method=S256",
        secrets.auth_uri,
        enc(&secrets.client_id),
        enc(secrets.redirect_uri()),
        enc(&SCOPES.join(" ")),
        enc(state),
        enc(&pkce.challenge),
    )
}

/// Accepts either the bare authorization code or the full redirect URL the
/// browser landed on. A URL must carry the expected `state`.
pub fn extract_code(input: &str, expected_state: &str) -> Result<String, OAuthError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(OAuthError::Callback("empty input".into()));
    }
    let Some((_, query)) = input.split_once('?') else {
        return Ok(input.to_string());
    };
    let query = query.split('#').next().unwrap_or_default();

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for pair in query.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let v = percent_decode_str(&v.replace('+', " "))
            .decode_utf8_lossy()
            .to_string();
        match k {
            "code" => code = Some(v),
            "state" => state = Some(v),
            "error" => error = Some(v),
            _ => {}
        }
    }
    if let Some(e) = error {
        return Err(OAuthError::Callback(format!("authorization denied: {e}")));
    }
    if state.as_deref() != Some(expected_state) {
        return Err(OAuthError::Callback("state mismatch".into()));
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| OAuthError::Callback("no code in redirect URL".into()))
}

#[cfg(feature = "rest-client")]
pub async fn exchange_code(
    secrets: &ClientSecrets,
    code: &str,
    pkce_verifier: &str,
) -> Result<crate::api::TokenResp, crate::api::rest::RestError> {
    use crate::api::rest::{RestError, handle_json, mk_client};

    let client = mk_client()?;
    let res = client
        .post(&secrets.token_uri)
        .form(&[
            ("code", code),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", secrets.redirect_uri()),
            ("grant_type", "authorization_code"),
            ("code_verifier", pkce_verifier),
        ])
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

#[cfg(feature = "rest-client")]
pub async fn refresh_access_token(
    secrets: &ClientSecrets,
    refresh_token: &str,
) -> Result<crate::api::TokenResp, crate::api::rest::RestError> {
    use crate::api::rest::{RestError, handle_json, mk_client};

    let client = mk_client()?;
    let res = client
        .post(&secrets.token_uri)
        .form(&[
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}
