//! systemd user service management for `classnotify install` / `uninstall`.

use std::path::PathBuf;

use tinytemplate::TinyTemplate;
use tokio::process::Command;
use tracing::{info, warn};

use crate::AppError;

const USER_UNIT_NAME: &str = "classnotify.service";
const USER_UNIT_TEMPLATE: &str = include_str!("../../../systemd/classnotify.service");

pub async fn install_all(user_opt: Option<String>) -> Result<(), AppError> {
    let target_user = resolve_target_user(user_opt)?;

    info!(user=%target_user, "install: installing user systemd unit and enabling service");
    // Start right away only when we are the target user; root just enables it.
    let start_now = !is_root() && Some(target_user.as_str()) == current_username().as_deref();
    install_user_unit(&target_user, start_now).await?;

    println!("Install complete for user '{}'.", target_user);
    if !start_now {
        println!("The service is enabled and will start on next login.");
    }
    Ok(())
}

pub async fn uninstall_all(user_opt: Option<String>) -> Result<(), AppError> {
    let target_user = resolve_target_user(user_opt)?;

    info!(user=%target_user, "uninstall: disabling and removing user systemd unit");
    let stop_now = !is_root() && Some(target_user.as_str()) == current_username().as_deref();
    uninstall_user_unit(&target_user, stop_now).await?;

    println!(
        "Uninstall complete for user '{}'. Saved credentials were kept; run `classnotify logout` to remove them.",
        target_user
    );
    Ok(())
}

fn current_username() -> Option<String> {
    use nix::unistd::{Uid, User};
    User::from_uid(Uid::current()).ok().flatten().map(|u| u.name)
}

async fn install_user_unit(username: &str, start_now: bool) -> Result<(), AppError> {
    let unit_dir = user_systemd_unit_dir(username)?;
    std::fs::create_dir_all(&unit_dir)?;
    let unit_path = unit_dir.join(USER_UNIT_NAME);
    let bin_path = std::env::current_exe()?.display().to_string();
    let unit_text = render_user_unit(&bin_path)?;
    std::fs::write(&unit_path, unit_text)?;
    info!(path=?unit_path, "wrote user unit");

    run_user_cmd(username, "systemctl", &["--user", "daemon-reload"]).await?;
    run_user_cmd(username, "systemctl", &["--user", "enable", USER_UNIT_NAME]).await?;
    if start_now {
        run_user_cmd(username, "systemctl", &["--user", "start", USER_UNIT_NAME]).await?;
    }
    Ok(())
}

async fn uninstall_user_unit(username: &str, stop_now: bool) -> Result<(), AppError> {
    let args: &[&str] = if stop_now {
        &["--user", "disable", "--now", USER_UNIT_NAME]
    } else {
        &["--user", "disable", USER_UNIT_NAME]
    };
    run_user_cmd(username, "systemctl", args).await?;

    let unit_path = user_systemd_unit_dir(username)?.join(USER_UNIT_NAME);
    if unit_path.exists() {
        std::fs::remove_file(&unit_path)?;
        run_user_cmd(username, "systemctl", &["--user", "daemon-reload"]).await?;
    }
    Ok(())
}

fn user_systemd_unit_dir(username: &str) -> Result<PathBuf, AppError> {
    let home = user_home_dir(username)
        .ok_or_else(|| AppError::Config(format!("cannot find home for user {}", username)))?;
    Ok(home.join(".config").join("systemd").join("user"))
}

#[derive(serde::Serialize)]
struct UnitCtx<'a> {
    binary_path: &'a str,
}

fn render_user_unit(binary_path: &str) -> Result<String, AppError> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("unit", USER_UNIT_TEMPLATE)
        .map_err(|e| AppError::Config(format!("template error: {e}")))?;
    tt.render("unit", &UnitCtx { binary_path })
        .map_err(|e| AppError::Config(format!("render error: {e}")))
}

/// Runs a command in the target user's context. Failures are logged, not
/// returned, so a missing user manager does not abort the install.
async fn run_user_cmd(user: &str, prog: &str, args: &[&str]) -> Result<(), AppError> {
    let mut cmd = if !is_root() && current_username().as_deref() == Some(user) {
        Command::new(prog)
    } else {
        let mut c = Command::new("sudo");
        c.arg("-u").arg(user).arg("-H").arg(prog);
        c
    };
    let status = cmd.args(args).status().await?;
    if !status.success() {
        warn!(program=%prog, user=%user, ?args, %status, "command failed");
    }
    Ok(())
}

fn user_home_dir(user: &str) -> Option<PathBuf> {
    use nix::unistd::User;
    User::from_name(user).ok().flatten().map(|u| u.dir)
}

fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

fn resolve_target_user(user_opt: Option<String>) -> Result<String, AppError> {
    let cur = current_username()
        .ok_or_else(|| AppError::Config("cannot determine current user".into()))?;
    if is_root() {
        let u = match user_opt {
            Some(u) => u,
            None => prompt("Target username for user-level install: ")?,
        };
        if u.is_empty() {
            return Err(AppError::Config(
                "username is required when running as root".into(),
            ));
        }
        return Ok(u);
    }
    match user_opt {
        Some(u) if u != cur => Err(AppError::Config(format!(
            "cannot install for user '{}' when running as '{}' (run as root)",
            u, cur
        ))),
        _ => Ok(cur),
    }
}

fn prompt(msg: &str) -> Result<String, AppError> {
    use std::io::Write;
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut s = String::new();
    std::io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}
