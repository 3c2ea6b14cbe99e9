//! Interactive OAuth authorization for a desktop install.
//!
//! The user opens the consent URL, approves read-only Classroom access and
//! pastes back either the code or the whole redirect URL.

use std::io;
use std::path::PathBuf;

use classnotify_shared::oauth::{self, Pkce};
use tracing::info;

use crate::AppError;
use crate::config::{ClientConfig, save_config};
use crate::credentials::{delete_refresh_token, load_client_secrets, store_refresh_token};

pub async fn login(
    credentials_arg: Option<PathBuf>,
    cfg_path_opt: Option<PathBuf>,
) -> Result<(), AppError> {
    let (cfg_path, mut cfg) = ClientConfig::find_and_load(cfg_path_opt)?;
    let explicit = credentials_arg.is_some();
    let secrets_path = match credentials_arg {
        Some(p) => {
            // Remember an explicit path so the agent finds it later.
            cfg.credentials_file = std::path::absolute(&p).map_err(AppError::Io)?;
            p
        }
        None => cfg.credentials_path(&cfg_path),
    };
    let secrets = load_client_secrets(&secrets_path)?;

    let state = uuid::Uuid::new_v4().simple().to_string();
    let pkce = Pkce::generate();
    let url = oauth::authorization_url(&secrets, &state, &pkce);

    println!("Open this URL in a browser and grant access:\n\n{url}\n");
    println!(
        "After approving, the browser is sent to {}. Copy the code or the full address bar URL.",
        secrets.redirect_uri()
    );
    let pasted = rpassword::prompt_password("Authorization code or redirect URL: ")
        .map_err(|e| AppError::Io(io::Error::other(e.to_string())))?;
    let code = oauth::extract_code(&pasted, &state)
        .map_err(|e| AppError::Auth(format!("authorization failed: {e}")))?;

    let token = oauth::exchange_code(&secrets, &code, &pkce.verifier)
        .await
        .map_err(|e| AppError::Http(format!("token exchange failed: {e}")))?;
    let Some(refresh_token) = token.refresh_token.filter(|t| !t.is_empty()) else {
        return Err(AppError::Auth(
            "token response has no refresh token; revoke the app's access in your Google account and retry"
                .into(),
        ));
    };
    store_refresh_token(&secrets.client_id, &refresh_token)?;
    info!(client_id=%secrets.client_id, "saved refresh token in keyring");

    if !cfg_path.exists() || explicit {
        save_config(&cfg_path, &cfg)?;
        println!("Wrote config to {}", cfg_path.display());
    }
    println!("Login complete. Run `classnotify courses` to verify access.");
    Ok(())
}

pub fn logout(cfg_path_opt: Option<PathBuf>) -> Result<(), AppError> {
    let (cfg_path, cfg) = ClientConfig::find_and_load(cfg_path_opt)?;
    let secrets = load_client_secrets(&cfg.credentials_path(&cfg_path))?;
    if delete_refresh_token(&secrets.client_id)? {
        println!("Removed saved credentials for {}", secrets.client_id);
    } else {
        println!("No saved credentials for {}", secrets.client_id);
    }
    Ok(())
}
