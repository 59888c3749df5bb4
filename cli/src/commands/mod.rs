//! CLI Commands

pub mod invoices;
pub mod lifecycle;
pub mod members;
pub mod payments;
pub mod plans;
pub mod settings;
pub mod subscriptions;
pub mod sync;
pub mod sync_log;
pub mod worker;

use anyhow::Context;
use hub_billing::BillingEngine;
use hub_common::{Clock, FileRunLock, RunGuard, RunLock, SystemClock};
use hub_events::{EventBus, EventRecorder, JsonlSyncLogStore, LoggingHandler, SyncLogStore};
use hub_netsync::{
    router_for, MemberSyncer, NetworkSyncHandler, Reconciler, SettingsHandle, SyncDispatcher,
};
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use crate::config::HubConfig;
use crate::directory::BillingMemberDirectory;
use crate::store::Hub;

/// How a command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Ran to completion but some operation failed
    Failed,
    /// Another run of the same job holds the lock
    Locked,
}

impl Outcome {
    pub fn from_success(ok: bool) -> Self {
        if ok {
            Self::Success
        } else {
            Self::Failed
        }
    }

    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Failed => ExitCode::from(1),
            Self::Locked => ExitCode::from(2),
        }
    }
}

/// Everything a command needs, wired once per invocation
///
/// Requires a tokio runtime: the event bus and the sync dispatcher spawn
/// their workers on construction.
pub struct Runtime {
    pub config: HubConfig,
    pub hub: Hub,
    pub settings: SettingsHandle,
    pub syncer: Arc<MemberSyncer>,
    pub dispatcher: Arc<SyncDispatcher>,
    pub bus: Arc<EventBus>,
    pub recorder: Arc<EventRecorder>,
    pub engine: BillingEngine,
}

impl Runtime {
    /// Wire against the wall clock
    pub fn start(config: HubConfig) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: HubConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let hub = Hub::load(config.state_path())?;
        let settings = config.settings_handle()?;
        let router = router_for(&settings)?;

        let log: Arc<dyn SyncLogStore> = Arc::new(JsonlSyncLogStore::new(config.sync_log_path()));
        let directory = Arc::new(BillingMemberDirectory::new(
            hub.roster.clone(),
            hub.subscriptions.clone(),
        ));
        let syncer = Arc::new(MemberSyncer::new(router, settings.clone(), directory, log));
        let dispatcher = Arc::new(SyncDispatcher::spawn(syncer.clone(), config.worker.sync_shards));

        let recorder = Arc::new(EventRecorder::new());
        let bus = Arc::new(
            EventBus::builder()
                .subscribe(Arc::new(LoggingHandler))
                .subscribe(recorder.clone())
                .subscribe(Arc::new(NetworkSyncHandler::new(dispatcher.clone())))
                .shards(config.worker.event_shards)
                .build(),
        );
        let engine = BillingEngine::new(hub.stores(), bus.clone(), clock, config.lifecycle.clone())?;

        Ok(Self {
            config,
            hub,
            settings,
            syncer,
            dispatcher,
            bus,
            recorder,
            engine,
        })
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.syncer.clone())
    }

    /// Wait for event delivery and queued syncs
    pub async fn drain(&self) {
        self.bus.flush().await;
        self.dispatcher.flush().await;
    }

    /// Events delivered so far, counted by name
    pub fn emitted(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for event in self.recorder.take() {
            *counts.entry(event.name().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Drain, stop the workers and persist state
    pub async fn finish(self) -> anyhow::Result<()> {
        self.stop().await;
        self.hub.save()
    }

    /// Drain and stop the workers without writing state
    pub async fn close(self) {
        self.stop().await;
    }

    async fn stop(&self) {
        self.drain().await;
        self.bus.shutdown().await;
        self.dispatcher.shutdown().await;
    }
}

/// Take the cross-process run lock for `job`, before any state is loaded
pub fn lock(config: &HubConfig, job: &str, ttl: Duration) -> anyhow::Result<Option<RunGuard>> {
    let guard = FileRunLock::new(config.lock_dir())
        .try_acquire(job, ttl)
        .with_context(|| format!("cannot take run lock for {job}"))?;
    if guard.is_none() {
        tracing::warn!(job, "previous run still in flight, skipping");
    }
    Ok(guard)
}
