//! `run`: long-running worker
//!
//! Lifecycle and router sweeps run on their own intervals. An in-process run
//! lock skips a tick while the previous sweep is still going; the same file
//! locks the one-shot commands use keep cron runs and the worker apart. Each
//! sweep works on state freshly read from disk and saves it before releasing
//! the file lock. Ctrl-C waits for in-flight sweeps and stops the bus and
//! the sync queues.

use anyhow::anyhow;
use hub_common::{InMemoryRunLock, RunLock, LIFECYCLE_JOB, ROUTER_SYNC_JOB};
use hub_netsync::SweepOptions;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};

use super::{Outcome, Runtime};
use crate::config::HubConfig;

pub async fn run(config: HubConfig, config_path: PathBuf) -> anyhow::Result<Outcome> {
    let worker = config.worker.clone();
    let lock_ttls = config.locks.clone();
    let runtime = Arc::new(Runtime::start(config)?);
    let locks = InMemoryRunLock::new();
    // Sweeps reload shared state, so only one runs at a time in this process
    let state_gate = Arc::new(Mutex::new(()));

    let mut lifecycle_tick = interval(worker.lifecycle_interval());
    lifecycle_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sync_tick = interval(worker.sync_interval());
    sync_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        lifecycle_every = ?worker.lifecycle_interval(),
        sync_every = ?worker.sync_interval(),
        "worker started"
    );

    let mut jobs = JoinSet::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
            _ = lifecycle_tick.tick() => {
                let ttl = lock_ttls.lifecycle_ttl();
                let Some(guard) = locks.try_acquire(LIFECYCLE_JOB, ttl)? else {
                    tracing::warn!(job = LIFECYCLE_JOB, "previous run still in flight, skipping tick");
                    continue;
                };
                let runtime = runtime.clone();
                let gate = state_gate.clone();
                jobs.spawn(async move {
                    let _guard = guard;
                    let _state = gate.lock().await;
                    let swept = locked_sweep(&runtime, LIFECYCLE_JOB, ttl, || async {
                        let report = runtime.engine.process_lifecycle_now();
                        if !report.is_success() {
                            tracing::error!(
                                errors = report.subscriptions.errors.len() + report.invoices.errors.len(),
                                "lifecycle run finished with errors"
                            );
                        }
                    })
                    .await;
                    log_sweep(LIFECYCLE_JOB, swept);
                });
            }
            _ = sync_tick.tick() => {
                reload_settings(&runtime, &config_path);
                let ttl = lock_ttls.router_sync_ttl();
                let Some(guard) = locks.try_acquire(ROUTER_SYNC_JOB, ttl)? else {
                    tracing::warn!(job = ROUTER_SYNC_JOB, "previous run still in flight, skipping tick");
                    continue;
                };
                let runtime = runtime.clone();
                let gate = state_gate.clone();
                let concurrency = worker.sync_shards;
                jobs.spawn(async move {
                    let _guard = guard;
                    let _state = gate.lock().await;
                    let swept = locked_sweep(&runtime, ROUTER_SYNC_JOB, ttl, || async {
                        let reconciler = runtime.reconciler().with_concurrency(concurrency);
                        match reconciler.full_sweep(SweepOptions::default()).await {
                            Ok(report) if report.is_success() => {}
                            Ok(report) => tracing::error!(failed = report.failed, "router sync finished with failures"),
                            Err(e) => tracing::error!("router sync aborted: {}", e),
                        }
                    })
                    .await;
                    log_sweep(ROUTER_SYNC_JOB, swept);
                });
            }
            Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("worker job panicked: {}", e);
                }
            }
        }
    }

    while let Some(joined) = jobs.join_next().await {
        if let Err(e) = joined {
            tracing::error!("worker job panicked: {}", e);
        }
    }
    let runtime = Arc::try_unwrap(runtime).map_err(|_| anyhow!("runtime still shared after jobs finished"))?;
    // Every sweep saved under its lock; saving here could overwrite a cron run
    runtime.close().await;
    tracing::info!("worker stopped");
    Ok(Outcome::Success)
}

/// Run `sweep` under the job's file lock on state reloaded from disk
///
/// Returns false when another process holds the lock.
async fn locked_sweep<F, Fut>(runtime: &Runtime, job: &str, ttl: Duration, sweep: F) -> anyhow::Result<bool>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let Some(_file_guard) = super::lock(&runtime.config, job, ttl)? else {
        return Ok(false);
    };
    runtime.hub.reload()?;
    sweep().await;
    runtime.drain().await;
    runtime.hub.save()?;
    Ok(true)
}

fn log_sweep(job: &str, swept: anyhow::Result<bool>) {
    match swept {
        Ok(true) => tracing::debug!(job, "scheduled sweep done"),
        Ok(false) => tracing::info!(job, "held by another process, skipping tick"),
        Err(e) => tracing::error!(job, "scheduled sweep failed: {:#}", e),
    }
}

/// Pick up credential rotations from the config file
fn reload_settings(runtime: &Runtime, config_path: &Path) {
    let reloaded = HubConfig::load(config_path)
        .and_then(|config| config.router_settings())
        .and_then(|settings| Ok(runtime.settings.replace(settings)?));
    if let Err(e) = reloaded {
        tracing::warn!("keeping current router settings: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemberRecord;
    use crate::store::Hub;
    use hub_common::MemberId;
    use hub_netsync::RouterDriver;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn config(dir: &Path) -> HubConfig {
        let mut config = HubConfig {
            data_dir: dir.to_path_buf(),
            ..HubConfig::default()
        };
        config.router.driver = RouterDriver::Simulated;
        config
    }

    #[tokio::test]
    async fn test_sweep_skipped_while_another_process_holds_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let runtime = Runtime::start(config.clone()).unwrap();
        let ttl = Duration::from_secs(60);

        // a cron `process-lifecycle` in flight
        let held = super::super::lock(&config, LIFECYCLE_JOB, ttl).unwrap();
        assert!(held.is_some());

        let ran = AtomicBool::new(false);
        let swept = locked_sweep(&runtime, LIFECYCLE_JOB, ttl, || async {
            ran.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();
        assert!(!swept);
        assert!(!ran.load(Ordering::SeqCst));

        drop(held);
        let swept = locked_sweep(&runtime, LIFECYCLE_JOB, ttl, || async {
            ran.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();
        assert!(swept);
        assert!(ran.load(Ordering::SeqCst));
        runtime.close().await;
    }

    #[tokio::test]
    async fn test_sweep_keeps_writes_from_other_processes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let runtime = Runtime::start(config.clone()).unwrap();

        // written by a one-shot command after the worker started
        let other = Hub::load(config.state_path()).unwrap();
        let member = MemberRecord::new(MemberId::new(), "Ngozi Eze");
        let member_id = member.id;
        other.roster.upsert(member);
        other.save().unwrap();

        let swept = locked_sweep(&runtime, LIFECYCLE_JOB, Duration::from_secs(60), || async {
            runtime.engine.process_lifecycle_now();
        })
        .await
        .unwrap();
        assert!(swept);
        runtime.close().await;

        let saved = Hub::load(config.state_path()).unwrap();
        assert!(saved.roster.get(member_id).is_some());
    }
}
