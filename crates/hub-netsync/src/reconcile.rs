//! Reconciliation of the router roster against desired member access
//!
//! ```text
//! full_sweep
//!   ├─ router disabled?        → skipped report
//!   ├─ test_connection (once)  → RouterUnreachable for the whole batch
//!   └─ for each member (bounded concurrency)
//!        desired_access() ─┬─ Enabled  → enable
//!                          └─ Disabled → disable_and_kick
//! ```
//!
//! One member's failure is counted and the sweep carries on. A dry run
//! only plans and never touches the router.

use futures::stream::{self, StreamExt};
use hub_common::{DesiredAccess, MemberId};
use serde::Serialize;
use std::sync::Arc;

use crate::client::RouterStatus;
use crate::error::{SyncError, SyncResult};
use crate::member::MemberProfile;
use crate::retry::RetryPolicy;
use crate::syncer::{MemberSyncer, SyncOutcome};
use crate::username::render_username;

/// Default number of members synced concurrently during a sweep
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 4;

/// Full sweep options
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    /// Report intended actions without calling the router
    pub dry_run: bool,
}

/// Intended action for one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    pub member_id: MemberId,
    pub member_name: String,
    /// `None` when the username template cannot be rendered for this member
    pub username: Option<String>,
    pub access: DesiredAccess,
}

/// Member that could not be synced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub member_id: MemberId,
    pub error: String,
}

/// Tally of a full sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub enabled: usize,
    pub disabled: usize,
    pub failed: usize,
    pub dry_run: bool,
    /// Router integration disabled, nothing attempted
    pub skipped: bool,
    pub planned: Vec<PlannedAction>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    /// No member failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Drives member syncs from desired state
#[derive(Debug)]
pub struct Reconciler {
    syncer: Arc<MemberSyncer>,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(syncer: Arc<MemberSyncer>) -> Self {
        Self {
            syncer,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }

    /// Members synced in parallel during a sweep
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn syncer(&self) -> &Arc<MemberSyncer> {
        &self.syncer
    }

    /// Bring every member's router account in line with desired access
    pub async fn full_sweep(&self, options: SweepOptions) -> SyncResult<SweepReport> {
        let settings = self.syncer.settings().load();
        if !settings.enabled {
            tracing::info!("router integration disabled, sweep skipped");
            return Ok(SweepReport {
                dry_run: options.dry_run,
                skipped: true,
                ..SweepReport::default()
            });
        }

        let members = self.syncer.directory().members()?;
        let planned: Vec<PlannedAction> = members
            .iter()
            .map(|m| PlannedAction {
                member_id: m.id,
                member_name: m.name.clone(),
                username: render_username(&settings.username_template, m).ok(),
                access: m.desired_access(),
            })
            .collect();

        let mut report = SweepReport {
            dry_run: options.dry_run,
            ..SweepReport::default()
        };

        if options.dry_run {
            report.enabled = planned.iter().filter(|p| p.access == DesiredAccess::Enabled).count();
            report.disabled = planned.len() - report.enabled;
            report.planned = planned;
            tracing::info!(
                members = report.planned.len(),
                enable = report.enabled,
                disable = report.disabled,
                "dry-run sweep planned"
            );
            return Ok(report);
        }

        self.check_connectivity().await?;

        let results: Vec<(MemberId, DesiredAccess, SyncResult<SyncOutcome>)> =
            stream::iter(
                members
                    .iter()
                    .map(|member| async move {
                        let access = member.desired_access();
                        (member.id, access, self.apply(member, access).await)
                    })
                    .collect::<Vec<_>>(),
            )
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        for (member_id, access, result) in results {
            match result {
                Ok(_) => match access {
                    DesiredAccess::Enabled => report.enabled += 1,
                    DesiredAccess::Disabled => report.disabled += 1,
                },
                Err(e) => {
                    report.failed += 1;
                    report.failures.push(SweepFailure {
                        member_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report.failures.sort_by_key(|f| f.member_id);
        report.planned = planned;

        tracing::info!(
            enabled = report.enabled,
            disabled = report.disabled,
            failed = report.failed,
            "router sweep finished"
        );
        Ok(report)
    }

    /// Sync one member outside a batch; retries apply, no connectivity pre-check
    pub async fn sync_member(&self, id: MemberId) -> SyncResult<SyncOutcome> {
        let member = self
            .syncer
            .directory()
            .member(id)?
            .ok_or(SyncError::MemberNotFound(id))?;
        self.apply(&member, member.desired_access()).await
    }

    /// Router identity and online session count
    pub async fn router_status(&self) -> SyncResult<RouterStatus> {
        let settings = self.syncer.settings().load();
        let policy = RetryPolicy::once(settings.timeout());
        let router = self.syncer.router();

        let identity = policy
            .run("test_connection", || router.test_connection())
            .await
            .result
            .map_err(SyncError::RouterUnreachable)?;
        let online_users = policy
            .run("online_count", || router.online_count())
            .await
            .result
            .map_err(SyncError::RouterUnreachable)?;

        Ok(RouterStatus {
            host: settings.host.clone(),
            identity: identity.name,
            online_users,
        })
    }

    async fn check_connectivity(&self) -> SyncResult<()> {
        let settings = self.syncer.settings().load();
        let router = self.syncer.router();
        let checked = RetryPolicy::once(settings.timeout())
            .run("test_connection", || router.test_connection())
            .await;

        match checked.result {
            Ok(identity) => {
                tracing::debug!(router = %identity.name, "router reachable");
                Ok(())
            }
            Err(e) => {
                tracing::error!(host = %settings.host, error = %e, "router unreachable, sweep aborted");
                Err(SyncError::RouterUnreachable(e))
            }
        }
    }

    async fn apply(&self, member: &MemberProfile, access: DesiredAccess) -> SyncResult<SyncOutcome> {
        match access {
            DesiredAccess::Enabled => self.syncer.enable(member).await,
            DesiredAccess::Disabled => self.syncer.disable_and_kick(member).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;
    use crate::member::InMemoryMemberDirectory;
    use crate::settings::{RetrySettings, RouterSettings, SettingsHandle};
    use crate::simulated::{RouterOp, SimulatedRouter};
    use hub_common::SubscriptionStatus;
    use hub_events::InMemorySyncLogStore;

    fn setup(enabled: bool) -> (Arc<SimulatedRouter>, Arc<InMemoryMemberDirectory>, Reconciler) {
        let router = Arc::new(SimulatedRouter::default());
        let directory = Arc::new(InMemoryMemberDirectory::new());
        let settings = RouterSettings {
            enabled,
            retry: RetrySettings {
                tries: 2,
                backoff_secs: 0,
            },
            ..RouterSettings::default()
        };
        let syncer = MemberSyncer::new(
            router.clone(),
            SettingsHandle::new(settings),
            directory.clone(),
            Arc::new(InMemorySyncLogStore::new()),
        );
        (router, directory, Reconciler::new(Arc::new(syncer)))
    }

    fn add(dir: &InMemoryMemberDirectory, phone: &str, statuses: Vec<SubscriptionStatus>) -> MemberId {
        let profile = MemberProfile {
            phone: Some(phone.to_string()),
            statuses,
            ..MemberProfile::new(MemberId::new(), phone)
        };
        let id = profile.id;
        dir.upsert(profile);
        id
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_router() {
        let (router, dir, reconciler) = setup(true);
        add(&dir, "100", vec![SubscriptionStatus::Active]);
        add(&dir, "200", vec![SubscriptionStatus::Expired]);
        add(&dir, "300", vec![]);

        let report = reconciler.full_sweep(SweepOptions { dry_run: true }).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.enabled, 1);
        assert_eq!(report.disabled, 2);
        assert_eq!(report.planned.len(), 3);
        assert!(router.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_router_fails_batch_fast() {
        let (router, dir, reconciler) = setup(true);
        add(&dir, "100", vec![SubscriptionStatus::Active]);
        add(&dir, "200", vec![SubscriptionStatus::Active]);
        router.set_unreachable(true);

        let err = reconciler.full_sweep(SweepOptions::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::RouterUnreachable(_)));
        assert_eq!(router.calls().len(), 1);
        assert_eq!(router.calls()[0].op, RouterOp::TestConnection);
    }

    #[tokio::test]
    async fn test_disabled_router_reports_skipped() {
        let (router, dir, reconciler) = setup(false);
        add(&dir, "100", vec![SubscriptionStatus::Active]);

        let report = reconciler.full_sweep(SweepOptions::default()).await.unwrap();
        assert!(report.skipped);
        assert!(report.is_success());
        assert!(router.calls().is_empty());
    }

    #[tokio::test]
    async fn test_member_failure_does_not_abort_sweep() {
        let (router, dir, reconciler) = setup(true);
        add(&dir, "100", vec![SubscriptionStatus::Active]);
        let bad = add(&dir, "200", vec![SubscriptionStatus::Active]);
        add(&dir, "300", vec![SubscriptionStatus::Cancelled]);
        router.fail_for(RouterOp::Upsert, "200", RouterError::Router { status: 500, message: "busy".into() });

        let report = reconciler.full_sweep(SweepOptions::default()).await.unwrap();
        assert_eq!(report.enabled, 1);
        assert_eq!(report.disabled, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.is_success());
        assert_eq!(report.failures[0].member_id, bad);
        assert!(router.user("100").is_some());
    }

    #[tokio::test]
    async fn test_sync_member_retries_without_precheck() {
        let (router, dir, reconciler) = setup(true);
        let id = add(&dir, "100", vec![SubscriptionStatus::GracePeriod]);
        router.fail_times(RouterOp::Upsert, RouterError::Connection("reset".into()), 1);

        let outcome = reconciler.sync_member(id).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Enabled { .. }));
        assert_eq!(router.call_count(RouterOp::TestConnection), 0);
        assert_eq!(router.call_count(RouterOp::Upsert), 2);

        assert!(matches!(
            reconciler.sync_member(MemberId::new()).await,
            Err(SyncError::MemberNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_router_status() {
        let (router, _dir, reconciler) = setup(true);
        router.start_session("100");

        let status = reconciler.router_status().await.unwrap();
        assert_eq!(status.identity, "simulated-router");
        assert_eq!(status.online_users, 1);
    }
}
