//! Event-driven sync dispatch
//!
//! Subscription events become sync jobs. Jobs are queued per member on
//! [`ShardedWorkers`], so one member's jobs run in publish order while
//! different members proceed in parallel. Publishing never waits on router
//! I/O.

use async_trait::async_trait;
use hub_common::{DesiredAccess, DomainEvent, MemberId, ShardedWorkers, WorkerError};
use hub_events::{EventHandler, HandlerError};
use std::sync::Arc;

use crate::syncer::MemberSyncer;

/// Default number of sync worker shards
pub const DEFAULT_SYNC_SHARDS: usize = 4;

/// Router job for one member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncJob {
    Enable(MemberId),
    DisableAndKick(MemberId),
}

impl SyncJob {
    pub fn member_id(&self) -> MemberId {
        match self {
            Self::Enable(id) | Self::DisableAndKick(id) => *id,
        }
    }
}

/// Router job triggered by an event, if any
pub fn job_for(event: &DomainEvent) -> Option<SyncJob> {
    match event {
        DomainEvent::SubscriptionActivated(t) | DomainEvent::SubscriptionRenewed(t) => {
            Some(SyncJob::Enable(t.member_id))
        }
        DomainEvent::SubscriptionExpired(t)
        | DomainEvent::SubscriptionCancelled(t)
        | DomainEvent::SubscriptionSuspended(t) => Some(SyncJob::DisableAndKick(t.member_id)),
        DomainEvent::InvoicePaid(_) | DomainEvent::InvoiceVoided(_) => None,
    }
}

/// Per-member ordered job queues
pub struct SyncDispatcher {
    workers: ShardedWorkers<SyncJob>,
}

impl SyncDispatcher {
    /// Spawn `shards` sync workers; requires a tokio runtime
    pub fn spawn(syncer: Arc<MemberSyncer>, shards: usize) -> Self {
        let workers = ShardedWorkers::spawn("network-sync", shards, move |job: SyncJob| {
            let syncer = syncer.clone();
            async move { run_job(&syncer, job).await }
        });
        Self { workers }
    }

    /// Queue a job behind the member's earlier jobs
    pub fn enqueue(&self, job: SyncJob) -> Result<(), WorkerError> {
        tracing::debug!(member_id = %job.member_id(), job = ?job, "sync job queued");
        self.workers.dispatch(&job.member_id(), job)
    }

    /// Wait for every queued job
    pub async fn flush(&self) {
        self.workers.flush().await;
    }

    /// Stop accepting jobs and drain the queues
    pub async fn shutdown(&self) {
        self.workers.shutdown().await;
    }
}

impl std::fmt::Debug for SyncDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDispatcher").field("shards", &self.workers.shards()).finish()
    }
}

async fn run_job(syncer: &MemberSyncer, job: SyncJob) {
    let member_id = job.member_id();

    // Act on the member as it is now, not as it was when the event fired
    let member = match syncer.directory().member(member_id) {
        Ok(Some(member)) => member,
        Ok(None) => {
            tracing::warn!(member_id = %member_id, job = ?job, "member gone, sync job dropped");
            return;
        }
        Err(e) => {
            tracing::error!(member_id = %member_id, job = ?job, "member lookup failed: {}", e);
            return;
        }
    };

    let result = match job {
        SyncJob::Enable(_) => syncer.enable(&member).await,
        SyncJob::DisableAndKick(_) if member.desired_access() == DesiredAccess::Enabled => {
            tracing::info!(
                member_id = %member_id,
                "member still has an access-granting subscription, disable skipped"
            );
            return;
        }
        SyncJob::DisableAndKick(_) => syncer.disable_and_kick(&member).await,
    };

    // Failures are already in the audit log
    if let Err(e) = result {
        tracing::warn!(member_id = %member_id, job = ?job, "sync job failed: {}", e);
    }
}

/// Bus subscriber turning subscription events into sync jobs
#[derive(Debug, Clone)]
pub struct NetworkSyncHandler {
    dispatcher: Arc<SyncDispatcher>,
}

impl NetworkSyncHandler {
    pub fn new(dispatcher: Arc<SyncDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventHandler for NetworkSyncHandler {
    fn name(&self) -> &str {
        "network-sync"
    }

    fn interested_in(&self, event: &DomainEvent) -> bool {
        job_for(event).is_some()
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let Some(job) = job_for(event) else {
            return Ok(());
        };
        self.dispatcher
            .enqueue(job)
            .map_err(|e| HandlerError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{InMemoryMemberDirectory, MemberDirectory, MemberProfile};
    use crate::settings::{RetrySettings, RouterSettings, SettingsHandle};
    use crate::simulated::{RouterOp, SimulatedRouter};
    use chrono::{NaiveDate, Utc};
    use hub_common::{
        EntityRef, EventMetadata, InvoiceId, InvoiceSettlement, SubscriptionId, SubscriptionStatus,
        SubscriptionTransition,
    };
    use hub_events::{EventBus, EventPublisher, InMemorySyncLogStore};
    use rust_decimal::Decimal;

    fn transition(member_id: MemberId, to: SubscriptionStatus) -> SubscriptionTransition {
        SubscriptionTransition {
            metadata: EventMetadata::new(Utc::now()),
            subscription_id: SubscriptionId::new(),
            member_id,
            old_status: SubscriptionStatus::Active,
            new_status: to,
            start_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            reason: None,
        }
    }

    fn syncer(router: Arc<SimulatedRouter>, dir: Arc<InMemoryMemberDirectory>) -> Arc<MemberSyncer> {
        let settings = RouterSettings {
            enabled: true,
            retry: RetrySettings {
                tries: 1,
                backoff_secs: 0,
            },
            ..RouterSettings::default()
        };
        Arc::new(MemberSyncer::new(
            router,
            SettingsHandle::new(settings),
            dir,
            Arc::new(InMemorySyncLogStore::new()),
        ))
    }

    #[test]
    fn test_job_mapping() {
        let m = MemberId::new();
        assert_eq!(
            job_for(&DomainEvent::SubscriptionRenewed(transition(m, SubscriptionStatus::Active))),
            Some(SyncJob::Enable(m))
        );
        assert_eq!(
            job_for(&DomainEvent::SubscriptionSuspended(transition(m, SubscriptionStatus::Suspended))),
            Some(SyncJob::DisableAndKick(m))
        );

        let paid = DomainEvent::InvoicePaid(InvoiceSettlement {
            metadata: EventMetadata::new(Utc::now()),
            invoice_id: InvoiceId::new(),
            number: Some("INV-202609-0001".to_string()),
            billable: EntityRef::member(m),
            origin: None,
            total: Decimal::new(10350, 2),
            currency: "NGN".to_string(),
            transaction_reference: Some("ref".to_string()),
            gateway: None,
            reason: None,
        });
        assert_eq!(job_for(&paid), None);
    }

    #[tokio::test]
    async fn test_member_jobs_run_in_publish_order() {
        let router = Arc::new(SimulatedRouter::default());
        let dir = Arc::new(InMemoryMemberDirectory::new());
        let id = MemberId::new();
        dir.upsert(MemberProfile {
            phone: Some("0803".to_string()),
            statuses: vec![SubscriptionStatus::Cancelled],
            ..MemberProfile::new(id, "Ada")
        });

        let dispatcher = SyncDispatcher::spawn(syncer(router.clone(), dir), 4);
        dispatcher.enqueue(SyncJob::Enable(id)).unwrap();
        dispatcher.enqueue(SyncJob::DisableAndKick(id)).unwrap();
        dispatcher.flush().await;

        let ops: Vec<RouterOp> = router.calls().iter().map(|c| c.op).collect();
        assert_eq!(ops, vec![RouterOp::Upsert, RouterOp::Disable, RouterOp::Kick]);
        assert!(router.user("0803").unwrap().disabled);
    }

    #[tokio::test]
    async fn test_disable_skipped_while_other_subscription_grants_access() {
        let router = Arc::new(SimulatedRouter::default());
        let dir = Arc::new(InMemoryMemberDirectory::new());
        let id = MemberId::new();
        dir.upsert(MemberProfile {
            phone: Some("0803".to_string()),
            statuses: vec![SubscriptionStatus::Expired, SubscriptionStatus::Active],
            ..MemberProfile::new(id, "Ada")
        });

        let dispatcher = SyncDispatcher::spawn(syncer(router.clone(), dir), 2);
        dispatcher.enqueue(SyncJob::DisableAndKick(id)).unwrap();
        dispatcher.flush().await;

        assert_eq!(router.call_count(RouterOp::Disable), 0);
    }

    #[tokio::test]
    async fn test_handler_wired_through_bus() {
        let router = Arc::new(SimulatedRouter::default());
        let dir = Arc::new(InMemoryMemberDirectory::new());
        let id = MemberId::new();
        dir.upsert(MemberProfile {
            phone: Some("0803".to_string()),
            statuses: vec![SubscriptionStatus::Active],
            ..MemberProfile::new(id, "Ada")
        });

        let dispatcher = Arc::new(SyncDispatcher::spawn(syncer(router.clone(), dir.clone()), 2));
        let bus = EventBus::builder()
            .subscribe(Arc::new(NetworkSyncHandler::new(dispatcher.clone())))
            .build();

        bus.publish(DomainEvent::SubscriptionActivated(transition(id, SubscriptionStatus::Active)));
        bus.flush().await;
        dispatcher.flush().await;

        assert!(router.user("0803").is_some());
        assert!(dir.member(id).unwrap().unwrap().network_password.is_some());
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let dispatcher = SyncDispatcher::spawn(
            syncer(Arc::new(SimulatedRouter::default()), Arc::new(InMemoryMemberDirectory::new())),
            1,
        );
        dispatcher.shutdown().await;
        assert!(dispatcher.enqueue(SyncJob::Enable(MemberId::new())).is_err());
    }
}
