use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{SHUTDOWN_GRACE, build_dispatcher, connect, load_courses, presenter};
use crate::AppError;
use crate::config::ClientConfig;
use crate::poller::{Poller, SystemClock};
use crate::watermark::WatermarkState;

/// Polls until SIGINT/SIGTERM. Only items changed after startup are reported.
pub async fn run(cfg_opt: Option<PathBuf>) -> Result<(), AppError> {
    let (cfg_path, cfg) = ClientConfig::find_and_load(cfg_opt)?;
    info!(path=?cfg_path, "loaded config");

    let api = connect(&cfg_path, &cfg)?;
    let courses = load_courses(api.as_ref(), &cfg).await?;
    let (dispatcher, view) = build_dispatcher(&cfg);
    info!(sinks = dispatcher.sink_count(), "notification sinks ready");

    let presenter_cancel = CancellationToken::new();
    let presenter = cfg
        .print_feed
        .then(|| tokio::spawn(presenter::print_feed(view, presenter_cancel.clone())));

    let poller = Poller::new(
        api,
        courses,
        dispatcher,
        Arc::new(SystemClock),
        cfg.poll_options(),
    );
    let state = WatermarkState::new(Utc::now());
    info!(
        courses = poller.courses().len(),
        interval_secs = cfg.interval_secs,
        "poller started"
    );

    let cancel = CancellationToken::new();
    let cancel_child = cancel.child_token();
    let mut handle = tokio::spawn(async move {
        let state = poller.run(cancel_child, state).await;
        poller.shutdown(SHUTDOWN_GRACE).await;
        state
    });

    tokio::select! {
        _ = crate::shutdown_signal() => {
            info!("shutdown signal received; requesting poller to stop");
            cancel.cancel();
        }
        _ = &mut handle => {
            info!("poller finished");
        }
    }

    if !handle.is_finished() {
        match tokio::time::timeout(SHUTDOWN_GRACE + Duration::from_secs(1), handle).await {
            Ok(Ok(state)) => info!(watermark=%state.global().at(), "poller stopped"),
            Ok(Err(e)) => warn!(error=%e, "poller task failed"),
            Err(_) => warn!("poller did not stop in time"),
        }
    }

    presenter_cancel.cancel();
    if let Some(p) = presenter {
        let _ = p.await;
    }
    Ok(())
}
