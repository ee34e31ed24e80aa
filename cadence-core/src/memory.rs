//! In-memory collaborators for tests and local runs.
//!
//! Each type implements one trait from [`crate::services`] over plain
//! collections behind `RwLock`/`Mutex`, and exposes inspection helpers so
//! tests can assert on what the pipeline did.

use crate::error::{CommandError, OutputError, ServiceError};
use crate::services::{
    AnalyticsIdentity, AnalyticsIdentityService, DisabledStatus, ErrorReport, GateStore,
    IdentityStore, LocalIdentity, Observability, OutgoingMessage, OutputSurface,
    PermissionRecord, PlatformDirectory, PlatformUser, SentMessage,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

/// Identity records keyed by platform id.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    users: RwLock<HashMap<String, LocalIdentity>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: LocalIdentity) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.platform_id.clone(), identity);
    }

    pub fn remove(&self, platform_id: &str) -> Option<LocalIdentity> {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(platform_id)
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get_user(&self, platform_id: &str) -> Result<Option<LocalIdentity>, ServiceError> {
        Ok(self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(platform_id)
            .cloned())
    }

    async fn get_user_by_remote_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalIdentity>, ServiceError> {
        Ok(self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|identity| {
                identity
                    .remote_username
                    .as_deref()
                    .is_some_and(|u| u.eq_ignore_ascii_case(username))
            })
            .cloned())
    }
}

/// Platform users plus per-server membership.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<String, PlatformUser>>,
    members: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: PlatformUser) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.id.clone(), user);
    }

    /// Add `user` to the directory and to `guild_id`'s member list.
    pub fn add_member(&self, guild_id: &str, user: PlatformUser) {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(guild_id.to_string())
            .or_default()
            .push(user.id.clone());
        self.add_user(user);
    }
}

#[async_trait]
impl PlatformDirectory for InMemoryDirectory {
    async fn fetch_user(&self, platform_id: &str) -> Result<Option<PlatformUser>, ServiceError> {
        Ok(self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(platform_id)
            .cloned())
    }

    async fn find_member(
        &self,
        guild_id: &str,
        name: &str,
    ) -> Result<Option<PlatformUser>, ServiceError> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        let found = members
            .get(guild_id)
            .into_iter()
            .flatten()
            .filter_map(|id| users.get(id))
            .find(|user| {
                user.username.eq_ignore_ascii_case(name)
                    || user
                        .display_name
                        .as_deref()
                        .is_some_and(|d| d.eq_ignore_ascii_case(name))
            })
            .cloned();
        Ok(found)
    }
}

/// Analytics identities keyed by remote username, with a sync log.
#[derive(Debug, Default)]
pub struct InMemoryAnalytics {
    identities: RwLock<HashMap<String, AnalyticsIdentity>>,
    synced: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl InMemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: AnalyticsIdentity) {
        self.identities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.remote_username.to_lowercase(), identity);
    }

    /// Make every call fail with `Unavailable`.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Platform ids synced so far, in order.
    pub fn synced(&self) -> Vec<String> {
        self.synced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_available(&self) -> Result<(), ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable {
                service: "analytics".to_string(),
                message: "configured to fail".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsIdentityService for InMemoryAnalytics {
    async fn get_identity(
        &self,
        remote_username: &str,
    ) -> Result<Option<AnalyticsIdentity>, ServiceError> {
        self.check_available()?;
        Ok(self
            .identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&remote_username.to_lowercase())
            .cloned())
    }

    async fn sync(&self, identity: &LocalIdentity) -> Result<(), ServiceError> {
        self.check_available()?;
        self.synced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(identity.platform_id.clone());
        Ok(())
    }
}

type GuildCommand = (String, String);

/// Disabled commands, permissions and channel blacklists.
#[derive(Debug, Default)]
pub struct InMemoryGateStore {
    disabled: RwLock<HashMap<GuildCommand, DisabledStatus>>,
    permissions: RwLock<Vec<PermissionRecord>>,
    channel_blacklists: RwLock<HashMap<GuildCommand, Vec<String>>>,
}

impl InMemoryGateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(guild_id: &str, command_id: &str) -> GuildCommand {
        (guild_id.to_string(), command_id.to_string())
    }

    pub fn disable(&self, guild_id: &str, command_id: &str, dev_only: bool) {
        self.disabled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                Self::key(guild_id, command_id),
                DisabledStatus {
                    disabled: true,
                    dev_only,
                },
            );
    }

    /// Re-enable a command; returns whether it was disabled.
    pub fn enable(&self, guild_id: &str, command_id: &str) -> bool {
        self.disabled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Self::key(guild_id, command_id))
            .is_some()
    }

    pub fn add_permission(&self, record: PermissionRecord) {
        self.permissions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn blacklist_channel(&self, guild_id: &str, command_id: &str, channel_id: &str) {
        self.channel_blacklists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(Self::key(guild_id, command_id))
            .or_default()
            .push(channel_id.to_string());
    }
}

#[async_trait]
impl GateStore for InMemoryGateStore {
    async fn is_command_disabled(
        &self,
        guild_id: &str,
        command_id: &str,
    ) -> Result<DisabledStatus, ServiceError> {
        Ok(self
            .disabled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::key(guild_id, command_id))
            .copied()
            .unwrap_or_default())
    }

    async fn list_permissions(
        &self,
        guild_id: &str,
        command_id: &str,
    ) -> Result<Vec<PermissionRecord>, ServiceError> {
        Ok(self
            .permissions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.guild_id == guild_id && r.command_id == command_id)
            .cloned()
            .collect())
    }

    async fn list_channel_blacklists(
        &self,
        guild_id: &str,
        command_id: &str,
    ) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .channel_blacklists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::key(guild_id, command_id))
            .cloned()
            .unwrap_or_default())
    }
}

/// Keeps every reported error and counter in memory.
#[derive(Debug, Default)]
pub struct RecordingObservability {
    errors: Mutex<Vec<(String, ErrorReport)>>,
    counters: Mutex<BTreeMap<String, u64>>,
}

impl RecordingObservability {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(error message, report)` pairs in report order.
    pub fn errors(&self) -> Vec<(String, ErrorReport)> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

impl Observability for RecordingObservability {
    fn report_error(&self, error: &CommandError, report: &ErrorReport) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((error.to_string(), report.clone()));
    }

    fn increment(&self, counter: &str, _command: &str) {
        *self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(counter.to_string())
            .or_default() += 1;
    }
}

/// Something the output surface was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Sent {
        channel_id: String,
        message: OutgoingMessage,
    },
    Typing {
        channel_id: String,
    },
    Reacted {
        message_id: String,
        emoji: String,
    },
    Unreacted {
        message_id: String,
        emoji: String,
    },
}

/// Output surface that records instead of delivering.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    events: Mutex<Vec<OutputEvent>>,
    next_id: AtomicU64,
    fail_sends: AtomicBool,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every sent message, in order.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                OutputEvent::Sent { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    fn record(&self, event: OutputEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[async_trait]
impl OutputSurface for RecordingOutput {
    async fn send(
        &self,
        channel_id: &str,
        message: OutgoingMessage,
    ) -> Result<SentMessage, OutputError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(OutputError::SendFailed {
                channel_id: channel_id.to_string(),
                message: "configured to fail".to_string(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(OutputEvent::Sent {
            channel_id: channel_id.to_string(),
            message,
        });
        Ok(SentMessage {
            id: format!("sent-{}", id),
            channel_id: channel_id.to_string(),
        })
    }

    async fn start_typing(&self, channel_id: &str) -> Result<(), OutputError> {
        self.record(OutputEvent::Typing {
            channel_id: channel_id.to_string(),
        });
        Ok(())
    }

    async fn react(
        &self,
        _channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), OutputError> {
        self.record(OutputEvent::Reacted {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn unreact(
        &self,
        _channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), OutputError> {
        self.record(OutputEvent::Unreacted {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }
}
