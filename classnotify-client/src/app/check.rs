//! One-shot commands for verifying a setup.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::{SHUTDOWN_GRACE, build_dispatcher, connect, load_courses, presenter};
use crate::AppError;
use crate::config::ClientConfig;
use crate::poller::{Poller, SystemClock};
use crate::watermark::WatermarkState;

const DEFAULT_LOOKBACK_SECS: u64 = 24 * 60 * 60;

pub async fn courses(cfg_opt: Option<PathBuf>) -> Result<(), AppError> {
    let (cfg_path, cfg) = ClientConfig::find_and_load(cfg_opt)?;
    let api = connect(&cfg_path, &cfg)?;
    let courses = load_courses(api.as_ref(), &cfg).await?;
    if courses.is_empty() {
        println!("No active courses found.");
    }
    for c in &courses {
        println!("{} ({})", c.name, c.id);
    }
    Ok(())
}

pub fn resolve_since(since: Option<&str>, since_secs: Option<u64>) -> Result<DateTime<Utc>, AppError> {
    resolve_since_at(Utc::now(), since, since_secs)
}

fn resolve_since_at(
    now: DateTime<Utc>,
    since: Option<&str>,
    since_secs: Option<u64>,
) -> Result<DateTime<Utc>, AppError> {
    if let Some(raw) = since {
        return DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| AppError::Config(format!("invalid --since {raw:?}: {e}")));
    }
    let secs = since_secs.unwrap_or(DEFAULT_LOOKBACK_SECS);
    let secs = i64::try_from(secs)
        .map_err(|_| AppError::Config(format!("--since-secs out of range: {secs}")))?;
    Duration::try_seconds(secs)
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or_else(|| AppError::Config(format!("--since-secs out of range: {secs}")))
}

/// Runs a single cycle with the watermark at `since` and prints what arrived.
pub async fn run_once(cfg_opt: Option<PathBuf>, since: DateTime<Utc>) -> Result<(), AppError> {
    let (cfg_path, cfg) = ClientConfig::find_and_load(cfg_opt)?;
    let api = connect(&cfg_path, &cfg)?;
    let courses = load_courses(api.as_ref(), &cfg).await?;
    let (dispatcher, view) = build_dispatcher(&cfg);
    let poller = Poller::new(
        api,
        courses,
        dispatcher,
        Arc::new(SystemClock),
        cfg.poll_options(),
    );

    let (state, report) = poller.run_cycle(WatermarkState::new(since)).await;
    poller.shutdown(SHUTDOWN_GRACE).await;
    debug!(watermark=%state.global().at(), "next watermark");

    presenter::write_new(&view.snapshot(), 0, &mut std::io::stdout().lock());
    println!(
        "{} new item(s) since {}; {} unparseable item(s) skipped",
        report.dispatched,
        since.to_rfc3339(),
        report.parse_failures
    );
    if !report.skipped.is_empty() {
        let ids: Vec<String> = report.skipped.iter().map(|c| c.to_string()).collect();
        println!("Could not fetch course(s): {}", ids.join(", "));
    }
    Ok(())
}
