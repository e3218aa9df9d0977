//! The polling loop: verify -> catalog -> fetch -> diff -> deliver -> commit.
use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{self, Config};
use crate::deliver;
use crate::ledger;
use crate::model::Announcement;
use crate::platform::{ApiFailure, PwApi, TokenStatus};
use crate::sinks::Sink;

/// Conditions that require operator action before the watcher can run again.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("access token rejected ({0}); put a fresh token in the config file")]
    CredentialRejected(ApiFailure),
    #[error("none of the tracked batches are visible to this account; re-select batch ids and restart")]
    TrackedBatchesGone,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fatal(#[from] FatalError),
    #[error("cycle skipped: {0}")]
    Transient(ApiFailure),
}

/// What one cycle saw and did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub new_announcements: usize,
    pub delivered: usize,
    pub failed: usize,
    pub skipped_batches: usize,
}

/// Run one poll cycle against the given API and sink set.
///
/// After a delivery pass, every id fetched this cycle is committed to the
/// ledger, including announcements whose delivery failed: a retry that
/// duplicates a message beats silently losing one.
pub async fn run_cycle(
    api: &dyn PwApi,
    pool: &SqlitePool,
    sinks: &[Box<dyn Sink>],
    tracked_ids: &HashSet<String>,
    send_delay: Duration,
) -> Result<CycleReport, CycleError> {
    // One verification per cycle; the fetchers rely on the remote 401/403 if
    // the token dies mid-cycle.
    match api.verify_token().await {
        TokenStatus::Valid => {}
        TokenStatus::Invalid(failure) => {
            return Err(FatalError::CredentialRejected(failure).into())
        }
        TokenStatus::Unknown(failure) => return Err(CycleError::Transient(failure)),
    }

    let batches = api.list_batches().await.map_err(|failure| {
        if failure.is_auth() {
            CycleError::Fatal(FatalError::CredentialRejected(failure))
        } else {
            CycleError::Transient(failure)
        }
    })?;

    let tracked: Vec<_> = batches
        .iter()
        .filter(|batch| tracked_ids.contains(&batch.id))
        .collect();
    if tracked.is_empty() {
        return Err(FatalError::TrackedBatchesGone.into());
    }

    let mut report = CycleReport::default();
    let mut pending: Vec<Announcement> = Vec::new();
    let mut observed: Vec<(String, Vec<String>)> = Vec::new();

    for batch in tracked {
        let announcements = match api.list_announcements(&batch.id).await {
            Ok(list) => list,
            Err(failure) => {
                warn!(
                    batch = batch.label(),
                    %failure,
                    "failed to fetch announcements; skipping batch this cycle"
                );
                report.skipped_batches += 1;
                continue;
            }
        };
        if announcements.is_empty() {
            continue;
        }
        let known = ledger::load(pool, &batch.id).await;
        let fresh = ledger::diff(&announcements, &known);
        if fresh.is_empty() {
            continue;
        }
        observed.push((
            batch.id.clone(),
            announcements.iter().map(|a| a.id.clone()).collect(),
        ));
        pending.extend(fresh);
    }

    if pending.is_empty() {
        return Ok(report);
    }

    report.new_announcements = pending.len();
    info!(count = pending.len(), "new announcements found; sending oldest first");
    let results = deliver::deliver_all(sinks, &pending, send_delay).await;
    report.delivered = results.iter().filter(|ok| **ok).count();
    report.failed = report.new_announcements - report.delivered;

    for (scope, ids) in &observed {
        if let Err(err) = ledger::commit(pool, scope, ids.iter()).await {
            warn!(?err, %scope, "failed to persist seen ids; duplicates possible next cycle");
        }
    }

    Ok(report)
}

/// Drive cycles until a fatal condition stops the process. The config file is
/// re-read each pass so pause toggles and tracking edits apply without a
/// restart; a failed reload keeps the previous config.
pub async fn run_loop(
    config_path: &Path,
    mut cfg: Config,
    api: &dyn PwApi,
    pool: &SqlitePool,
    sinks: &[Box<dyn Sink>],
) -> Result<()> {
    info!(
        minutes = cfg.app.poll_interval_minutes,
        "watcher started; Ctrl+C to stop"
    );
    loop {
        match config::load(Some(config_path)) {
            Ok(fresh) => cfg = fresh,
            Err(err) => warn!(?err, "could not reload config; keeping the previous one"),
        }
        let interval = cfg.poll_interval();

        if cfg.app.paused {
            info!("paused; sleeping one interval");
            tokio::time::sleep(interval).await;
            continue;
        }

        info!("checking tracked batches for new announcements");
        let tracked: HashSet<String> = cfg.platform.tracked_batch_ids.iter().cloned().collect();
        match run_cycle(api, pool, sinks, &tracked, deliver::SEND_DELAY).await {
            Ok(report) if report.new_announcements == 0 => {
                if report.skipped_batches > 0 {
                    warn!(skipped = report.skipped_batches, "no new announcements; some batches skipped");
                } else {
                    info!("no new announcements");
                }
            }
            Ok(report) => {
                if report.failed > 0 {
                    warn!(
                        delivered = report.delivered,
                        failed = report.failed,
                        "some deliveries failed; their ids are recorded and will not be retried"
                    );
                } else {
                    info!(delivered = report.delivered, "all new announcements sent");
                }
            }
            Err(CycleError::Transient(failure)) => {
                warn!(%failure, status = ?failure.status, "cycle failed; retrying next interval");
            }
            Err(CycleError::Fatal(fatal)) => {
                if matches!(fatal, FatalError::TrackedBatchesGone) {
                    // Wipe the selection so the operator is forced to re-select
                    // against the live catalog on the next start.
                    if let Err(err) = config::store_tracked_batch_ids(config_path, &cfg, &[]) {
                        warn!(?err, "failed to clear tracked batch ids");
                    }
                }
                error!(%fatal, "stopping; operator action required");
                return Err(fatal.into());
            }
        }

        info!(minutes = cfg.app.poll_interval_minutes, "sleeping until next cycle");
        tokio::time::sleep(interval).await;
    }
}
