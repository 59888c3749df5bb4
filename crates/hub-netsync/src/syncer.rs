//! Per-member sync operations
//!
//! Every operation takes one settings snapshot, talks to the router under the
//! retry policy and appends exactly one audit entry per outcome (plus a
//! `kicked` entry when a session was terminated). A disabled router makes
//! every operation a no-op without audit entries.

use hub_common::MemberId;
use hub_events::{NetworkSyncLog, SyncAction, SyncLogStore};
use serde::Serialize;
use std::sync::Arc;

use crate::client::{HotspotUser, RouterClient, UpsertOutcome};
use crate::error::{RouterError, SyncError, SyncResult};
use crate::member::{MemberDirectory, MemberProfile};
use crate::retry::{Attempted, RetryPolicy};
use crate::settings::{RouterSettings, SettingsHandle};
use crate::username::{generate_password, render_username};

/// What a sync operation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Router integration disabled
    Skipped,
    /// User created or updated and enabled
    Enabled {
        username: String,
        created: bool,
    },
    /// User disabled, session terminated if one was active
    Disabled {
        username: String,
        existed: bool,
        kicked: bool,
    },
    /// Password rotated
    PasswordReset { username: String },
    /// User deleted from the router
    Removed { username: String, existed: bool },
}

/// Executes hotspot operations for single members
pub struct MemberSyncer {
    router: Arc<dyn RouterClient>,
    settings: SettingsHandle,
    directory: Arc<dyn MemberDirectory>,
    log: Arc<dyn SyncLogStore>,
}

impl MemberSyncer {
    pub fn new(
        router: Arc<dyn RouterClient>,
        settings: SettingsHandle,
        directory: Arc<dyn MemberDirectory>,
        log: Arc<dyn SyncLogStore>,
    ) -> Self {
        Self {
            router,
            settings,
            directory,
            log,
        }
    }

    pub fn router(&self) -> &Arc<dyn RouterClient> {
        &self.router
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn directory(&self) -> &Arc<dyn MemberDirectory> {
        &self.directory
    }

    /// Create or update the member's hotspot user and leave it enabled
    pub async fn enable(&self, member: &MemberProfile) -> SyncResult<SyncOutcome> {
        let settings = self.settings.load();
        if !settings.enabled {
            return Ok(SyncOutcome::Skipped);
        }
        let audit = Audit::new(self, &settings, member.id);

        let username = match render_username(&settings.username_template, member) {
            Ok(u) => u,
            Err(e) => return Err(audit.reject(SyncAction::Updated, None, e)),
        };
        let password = match self.password_for(&settings, member) {
            Ok(p) => p,
            Err(e) => return Err(audit.reject(SyncAction::Updated, Some(&username), e)),
        };

        let user = HotspotUser {
            username: username.clone(),
            password,
            profile: settings.hotspot_profile.clone(),
            server: settings.hotspot_server.clone(),
            comment: Some(member_comment(member)),
        };
        let policy = RetryPolicy::from_settings(&settings);
        let Attempted { result, attempts } = policy
            .run("upsert_hotspot_user", || self.router.upsert_hotspot_user(&user))
            .await;

        match result {
            Ok(outcome) => {
                let action = match outcome {
                    UpsertOutcome::Created => SyncAction::Created,
                    UpsertOutcome::Updated => SyncAction::Updated,
                };
                audit.success(action, &username, attempts);
                tracing::info!(member_id = %member.id, username = %username, action = %action, "hotspot user enabled");
                Ok(SyncOutcome::Enabled {
                    username,
                    created: outcome == UpsertOutcome::Created,
                })
            }
            // Outcome of a failed upsert is unknown, so it is audited as an update
            Err(e) => Err(audit.failure(SyncAction::Updated, &username, attempts, e)),
        }
    }

    /// Disable the member's hotspot user, then terminate any active session
    pub async fn disable_and_kick(&self, member: &MemberProfile) -> SyncResult<SyncOutcome> {
        let settings = self.settings.load();
        if !settings.enabled {
            return Ok(SyncOutcome::Skipped);
        }
        let audit = Audit::new(self, &settings, member.id);

        let username = match render_username(&settings.username_template, member) {
            Ok(u) => u,
            Err(e) => return Err(audit.reject(SyncAction::Disabled, None, e)),
        };
        let policy = RetryPolicy::from_settings(&settings);

        let Attempted { result, attempts } = policy
            .run("disable_user", || self.router.disable_user(&username))
            .await;
        let existed = match result {
            Ok(existed) => existed,
            Err(e) => return Err(audit.failure(SyncAction::Disabled, &username, attempts, e)),
        };
        audit.record(
            NetworkSyncLog::success(Some(member.id), SyncAction::Disabled, audit.router_ip())
                .with_meta("username", username.as_str())
                .with_meta("attempts", attempts)
                .with_meta("existed", existed),
        );

        // No user means no session to terminate
        let mut kicked = false;
        if existed {
            let Attempted { result, attempts } = policy
                .run("kick_session", || self.router.kick_session(&username))
                .await;
            match result {
                Ok(true) => {
                    kicked = true;
                    audit.success(SyncAction::Kicked, &username, attempts);
                }
                Ok(false) => {}
                Err(e) => {
                    // Best-effort: the account is already disabled
                    audit.record(
                        NetworkSyncLog::failure(
                            Some(member.id),
                            SyncAction::Kicked,
                            audit.router_ip(),
                            e.to_string(),
                        )
                        .with_meta("username", username.as_str())
                        .with_meta("attempts", attempts),
                    );
                    tracing::warn!(member_id = %member.id, username = %username, error = %e, "session kick failed");
                }
            }
        }

        tracing::info!(member_id = %member.id, username = %username, existed, kicked, "hotspot user disabled");
        Ok(SyncOutcome::Disabled {
            username,
            existed,
            kicked,
        })
    }

    /// Rotate the member's hotspot password
    pub async fn reset_password(&self, member: &MemberProfile) -> SyncResult<SyncOutcome> {
        let settings = self.settings.load();
        if !settings.enabled {
            return Ok(SyncOutcome::Skipped);
        }
        let audit = Audit::new(self, &settings, member.id);

        let username = match render_username(&settings.username_template, member) {
            Ok(u) => u,
            Err(e) => return Err(audit.reject(SyncAction::PasswordReset, None, e)),
        };
        let password = generate_password(settings.password_length);
        let policy = RetryPolicy::from_settings(&settings);

        let Attempted { result, attempts } = policy
            .run("set_password", || self.router.set_password(&username, &password))
            .await;
        if let Err(e) = result {
            return Err(audit.failure(SyncAction::PasswordReset, &username, attempts, e));
        }
        if let Err(e) = self.directory.store_network_password(member.id, &password) {
            return Err(audit.reject(SyncAction::PasswordReset, Some(&username), e));
        }

        audit.success(SyncAction::PasswordReset, &username, attempts);
        tracing::info!(member_id = %member.id, username = %username, "hotspot password reset");
        Ok(SyncOutcome::PasswordReset { username })
    }

    /// Delete the member's hotspot user
    pub async fn remove(&self, member: &MemberProfile) -> SyncResult<SyncOutcome> {
        let settings = self.settings.load();
        if !settings.enabled {
            return Ok(SyncOutcome::Skipped);
        }
        let audit = Audit::new(self, &settings, member.id);

        let username = match render_username(&settings.username_template, member) {
            Ok(u) => u,
            Err(e) => return Err(audit.reject(SyncAction::Deleted, None, e)),
        };
        let policy = RetryPolicy::from_settings(&settings);

        let Attempted { result, attempts } = policy
            .run("remove_user", || self.router.remove_user(&username))
            .await;
        let existed = match result {
            Ok(existed) => existed,
            Err(e) => return Err(audit.failure(SyncAction::Deleted, &username, attempts, e)),
        };

        audit.record(
            NetworkSyncLog::success(Some(member.id), SyncAction::Deleted, audit.router_ip())
                .with_meta("username", username.as_str())
                .with_meta("attempts", attempts)
                .with_meta("existed", existed),
        );
        tracing::info!(member_id = %member.id, username = %username, existed, "hotspot user removed");
        Ok(SyncOutcome::Removed { username, existed })
    }

    fn password_for(&self, settings: &RouterSettings, member: &MemberProfile) -> SyncResult<String> {
        if let Some(existing) = member.network_password.as_deref().filter(|p| !p.is_empty()) {
            return Ok(existing.to_string());
        }
        if !settings.auto_generate_password {
            return Err(SyncError::Settings(format!(
                "member {} has no network password and auto-generation is off",
                member.id
            )));
        }
        let password = generate_password(settings.password_length);
        self.directory.store_network_password(member.id, &password)?;
        tracing::debug!(member_id = %member.id, "generated hotspot password");
        Ok(password)
    }
}

impl std::fmt::Debug for MemberSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberSyncer").field("settings", &self.settings).finish_non_exhaustive()
    }
}

fn member_comment(member: &MemberProfile) -> String {
    match &member.member_code {
        Some(code) => format!("{} ({})", member.name, code),
        None => member.name.clone(),
    }
}

/// Audit entry builder bound to one settings snapshot
struct Audit<'a> {
    log: &'a dyn SyncLogStore,
    member_id: MemberId,
    router_ip: String,
    profile: Option<String>,
}

impl<'a> Audit<'a> {
    fn new(syncer: &'a MemberSyncer, settings: &RouterSettings, member_id: MemberId) -> Self {
        Self {
            log: syncer.log.as_ref(),
            member_id,
            router_ip: settings.host.clone(),
            profile: settings.hotspot_profile.clone(),
        }
    }

    fn router_ip(&self) -> Option<String> {
        Some(self.router_ip.clone())
    }

    fn record(&self, entry: NetworkSyncLog) {
        let entry = match &self.profile {
            Some(p) => entry.with_meta("profile", p.as_str()),
            None => entry,
        };
        // Audit is diagnostic; a write failure never fails the sync itself
        if let Err(e) = self.log.append(entry) {
            tracing::error!(member_id = %self.member_id, "failed to append sync log: {}", e);
        }
    }

    fn success(&self, action: SyncAction, username: &str, attempts: u32) {
        self.record(
            NetworkSyncLog::success(Some(self.member_id), action, self.router_ip())
                .with_meta("username", username)
                .with_meta("attempts", attempts),
        );
    }

    /// Router failure after retries
    fn failure(&self, action: SyncAction, username: &str, attempts: u32, error: RouterError) -> SyncError {
        self.record(
            NetworkSyncLog::failure(Some(self.member_id), action, self.router_ip(), error.to_string())
                .with_meta("username", username)
                .with_meta("attempts", attempts),
        );
        SyncError::RouterOperationFailed {
            member_id: self.member_id,
            action,
            attempts,
            source: error,
        }
    }

    /// Failure before any router call
    fn reject(&self, action: SyncAction, username: Option<&str>, error: SyncError) -> SyncError {
        let mut entry =
            NetworkSyncLog::failure(Some(self.member_id), action, self.router_ip(), error.to_string())
                .with_meta("attempts", 0);
        if let Some(username) = username {
            entry = entry.with_meta("username", username);
        }
        self.record(entry);
        tracing::warn!(member_id = %self.member_id, action = %action, error = %error, "sync rejected");
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::InMemoryMemberDirectory;
    use crate::settings::RetrySettings;
    use crate::simulated::{RouterOp, SimulatedRouter};
    use hub_common::SubscriptionStatus;
    use hub_events::{InMemorySyncLogStore, SyncLogQuery, SyncStatus};

    struct Fixture {
        router: Arc<SimulatedRouter>,
        directory: Arc<InMemoryMemberDirectory>,
        log: Arc<InMemorySyncLogStore>,
        syncer: MemberSyncer,
    }

    fn settings() -> RouterSettings {
        RouterSettings {
            enabled: true,
            host: "10.0.0.1".to_string(),
            hotspot_profile: Some("members".to_string()),
            retry: RetrySettings {
                tries: 3,
                backoff_secs: 0,
            },
            ..RouterSettings::default()
        }
    }

    fn fixture(settings: RouterSettings) -> Fixture {
        let router = Arc::new(SimulatedRouter::default());
        let directory = Arc::new(InMemoryMemberDirectory::new());
        let log = Arc::new(InMemorySyncLogStore::new());
        let syncer = MemberSyncer::new(
            router.clone(),
            SettingsHandle::new(settings),
            directory.clone(),
            log.clone(),
        );
        Fixture {
            router,
            directory,
            log,
            syncer,
        }
    }

    fn member(dir: &InMemoryMemberDirectory, phone: &str) -> MemberProfile {
        let profile = MemberProfile {
            phone: Some(phone.to_string()),
            statuses: vec![SubscriptionStatus::Active],
            ..MemberProfile::new(MemberId::new(), "Ada")
        };
        dir.upsert(profile.clone());
        profile
    }

    #[tokio::test]
    async fn test_enable_twice_logs_twice_one_router_user() {
        let fx = fixture(settings());
        let m = member(&fx.directory, "0803");

        let first = fx.syncer.enable(&m).await.unwrap();
        let m = fx.directory.member(m.id).unwrap().unwrap();
        let second = fx.syncer.enable(&m).await.unwrap();

        assert!(matches!(first, SyncOutcome::Enabled { created: true, .. }));
        assert!(matches!(second, SyncOutcome::Enabled { created: false, .. }));
        assert_eq!(fx.router.user_count(), 1);

        let entries = fx.log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, SyncAction::Created);
        assert_eq!(entries[1].action, SyncAction::Updated);
        assert!(entries.iter().all(|e| e.is_success()));
        assert_eq!(entries[0].router_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(entries[0].metadata["profile"], "members");
    }

    #[tokio::test]
    async fn test_enable_generates_and_persists_password() {
        let fx = fixture(settings());
        let m = member(&fx.directory, "0803");

        fx.syncer.enable(&m).await.unwrap();

        let stored = fx.directory.member(m.id).unwrap().unwrap().network_password.unwrap();
        assert_eq!(stored.len(), 8);
        assert_eq!(fx.router.user("0803").unwrap().password, stored);
    }

    #[tokio::test]
    async fn test_enable_keeps_existing_password() {
        let fx = fixture(settings());
        let mut m = member(&fx.directory, "0803");
        m.network_password = Some("keepme12".to_string());

        fx.syncer.enable(&m).await.unwrap();
        assert_eq!(fx.router.user("0803").unwrap().password, "keepme12");
    }

    #[tokio::test]
    async fn test_enable_without_password_and_autogen_off() {
        let fx = fixture(RouterSettings {
            auto_generate_password: false,
            ..settings()
        });
        let m = member(&fx.directory, "0803");

        assert!(matches!(fx.syncer.enable(&m).await, Err(SyncError::Settings(_))));
        assert_eq!(fx.router.call_count(RouterOp::Upsert), 0);
        assert_eq!(fx.log.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enable_failure_logs_single_failed_entry() {
        let fx = fixture(settings());
        let m = member(&fx.directory, "0803");
        fx.router.fail(RouterOp::Upsert, RouterError::Connection("reset".into()));

        let err = fx.syncer.enable(&m).await.unwrap_err();
        assert!(matches!(err, SyncError::RouterOperationFailed { attempts: 3, .. }));

        let failed = fx.log.query(&SyncLogQuery::failed()).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].action, SyncAction::Updated);
        assert_eq!(failed[0].metadata["attempts"], 3);
        assert_eq!(fx.log.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_disable_and_kick() {
        let fx = fixture(settings());
        let m = member(&fx.directory, "0803");
        fx.syncer.enable(&m).await.unwrap();
        fx.router.start_session("0803");

        let outcome = fx.syncer.disable_and_kick(&m).await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Disabled {
                username: "0803".to_string(),
                existed: true,
                kicked: true
            }
        );
        assert!(fx.router.user("0803").unwrap().disabled);
        assert!(!fx.router.has_session("0803"));

        let actions: Vec<SyncAction> = fx.log.entries().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![SyncAction::Created, SyncAction::Disabled, SyncAction::Kicked]);
    }

    #[tokio::test]
    async fn test_disable_without_session_logs_only_disabled() {
        let fx = fixture(settings());
        let m = member(&fx.directory, "0803");
        fx.syncer.enable(&m).await.unwrap();

        fx.syncer.disable_and_kick(&m).await.unwrap();
        assert_eq!(
            fx.log.query(&SyncLogQuery { action: Some(SyncAction::Kicked), ..Default::default() }).unwrap().len(),
            0
        );
    }

    #[tokio::test]
    async fn test_kick_failure_is_best_effort() {
        let fx = fixture(settings());
        let m = member(&fx.directory, "0803");
        fx.syncer.enable(&m).await.unwrap();
        fx.router.fail(RouterOp::Kick, RouterError::Connection("reset".into()));

        let outcome = fx.syncer.disable_and_kick(&m).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Disabled { kicked: false, .. }));

        let failed = fx.log.query(&SyncLogQuery::failed()).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].action, SyncAction::Kicked);
    }

    #[tokio::test]
    async fn test_disabled_router_skips_without_audit() {
        let fx = fixture(RouterSettings::default());
        let m = member(&fx.directory, "0803");

        assert_eq!(fx.syncer.enable(&m).await.unwrap(), SyncOutcome::Skipped);
        assert_eq!(fx.syncer.disable_and_kick(&m).await.unwrap(), SyncOutcome::Skipped);
        assert!(fx.router.calls().is_empty());
        assert_eq!(fx.log.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_password_and_remove() {
        let fx = fixture(settings());
        let m = member(&fx.directory, "0803");
        fx.syncer.enable(&m).await.unwrap();
        let before = fx.router.user("0803").unwrap().password;

        fx.syncer.reset_password(&m).await.unwrap();
        let after = fx.router.user("0803").unwrap().password;
        assert_ne!(before, after);
        assert_eq!(fx.directory.member(m.id).unwrap().unwrap().network_password, Some(after));

        let removed = fx.syncer.remove(&m).await.unwrap();
        assert!(matches!(removed, SyncOutcome::Removed { existed: true, .. }));
        assert_eq!(fx.router.user_count(), 0);
        assert_eq!(
            fx.log.query(&SyncLogQuery { status: Some(SyncStatus::Success), ..Default::default() }).unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_settings_swap_visible_to_next_operation() {
        let fx = fixture(settings());
        let m = member(&fx.directory, "0803");

        fx.syncer.enable(&m).await.unwrap();
        fx.syncer.settings().update(|s| s.host = "10.0.0.2".to_string()).unwrap();
        fx.syncer.enable(&m).await.unwrap();

        let entries = fx.log.entries();
        assert_eq!(entries[0].router_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(entries[1].router_ip.as_deref(), Some("10.0.0.2"));
    }
}
