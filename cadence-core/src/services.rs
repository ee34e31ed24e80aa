//! Collaborator contracts — the narrow surfaces the pipeline consumes.
//!
//! Transport, storage and the remote scrobble service live elsewhere. The
//! pipeline and resolver receive implementations of these traits at
//! construction time; [`crate::memory`] provides in-process versions.

use crate::error::{CommandError, OutputError, ServiceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user as the chat platform knows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub id: String,
    pub username: String,
    /// Server nickname when one is set.
    pub display_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl PlatformUser {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            display_name: None,
            bot: false,
        }
    }

    pub fn bot(mut self) -> Self {
        self.bot = true;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// A local identity record linking a platform user to the scrobble service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub platform_id: String,
    pub remote_username: Option<String>,
    /// Session credential for authenticated calls.
    pub session_key: Option<String>,
    pub last_indexed: Option<DateTime<Utc>>,
}

impl LocalIdentity {
    pub fn new(platform_id: impl Into<String>) -> Self {
        Self {
            platform_id: platform_id.into(),
            remote_username: None,
            session_key: None,
            last_indexed: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.remote_username = Some(username.into());
        self
    }

    pub fn with_session(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    pub fn indexed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_indexed = Some(at);
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.last_indexed.is_some()
    }
}

/// A secondary identity record held by the analytics service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsIdentity {
    pub id: String,
    pub remote_username: String,
    pub platform_id: Option<String>,
}

/// One inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub content: String,
    pub author: PlatformUser,
    /// `None` for direct messages.
    pub guild_id: Option<String>,
    pub channel_id: String,
    /// Platform users mentioned in the message, in order.
    #[serde(default)]
    pub mentions: Vec<PlatformUser>,
    /// Author of the message this one replies to.
    #[serde(default)]
    pub reply_to: Option<PlatformUser>,
    #[serde(default)]
    pub author_roles: Vec<String>,
}

impl InboundMessage {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        author: PlatformUser,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            author,
            guild_id: None,
            channel_id: channel_id.into(),
            mentions: Vec::new(),
            reply_to: None,
            author_roles: Vec::new(),
        }
    }

    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn mentioning(mut self, user: PlatformUser) -> Self {
        self.mentions.push(user);
        self
    }

    pub fn replying_to(mut self, user: PlatformUser) -> Self {
        self.reply_to = Some(user);
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.author_roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

/// Disabled state of a command in a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisabledStatus {
    pub disabled: bool,
    /// Disabled by a bot developer rather than a server admin.
    pub dev_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionEntity {
    User,
    Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Whitelist,
    Blacklist,
}

/// A per-entity permission on a command in a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub guild_id: String,
    pub command_id: String,
    pub entity_id: String,
    pub entity: PermissionEntity,
    pub kind: PermissionKind,
}

/// A rendered reply. Formatting is already done by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    pub footer: Option<String>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            footer: None,
        }
    }

    pub fn with_footer(mut self, footer: Option<String>) -> Self {
        self.footer = footer;
        self
    }
}

/// Handle to a message the output surface delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
    pub channel_id: String,
}

/// Local identity lookups.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_user(&self, platform_id: &str) -> Result<Option<LocalIdentity>, ServiceError>;

    async fn get_user_by_remote_username(
        &self,
        username: &str,
    ) -> Result<Option<LocalIdentity>, ServiceError>;
}

/// Platform-side user lookups.
#[async_trait]
pub trait PlatformDirectory: Send + Sync {
    async fn fetch_user(&self, platform_id: &str) -> Result<Option<PlatformUser>, ServiceError>;

    /// Find a server member by username or nickname (case-insensitive).
    async fn find_member(
        &self,
        guild_id: &str,
        name: &str,
    ) -> Result<Option<PlatformUser>, ServiceError>;
}

/// The secondary analytics service.
#[async_trait]
pub trait AnalyticsIdentityService: Send + Sync {
    async fn get_identity(
        &self,
        remote_username: &str,
    ) -> Result<Option<AnalyticsIdentity>, ServiceError>;

    /// Push the latest local identity to the analytics service.
    async fn sync(&self, identity: &LocalIdentity) -> Result<(), ServiceError>;
}

/// Persisted gating records.
#[async_trait]
pub trait GateStore: Send + Sync {
    async fn is_command_disabled(
        &self,
        guild_id: &str,
        command_id: &str,
    ) -> Result<DisabledStatus, ServiceError>;

    async fn list_permissions(
        &self,
        guild_id: &str,
        command_id: &str,
    ) -> Result<Vec<PermissionRecord>, ServiceError>;

    /// Channel ids in which the command is blacklisted.
    async fn list_channel_blacklists(
        &self,
        guild_id: &str,
        command_id: &str,
    ) -> Result<Vec<String>, ServiceError>;
}

/// Context attached to every reported internal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub run_id: String,
    pub command: String,
    pub command_id: String,
    pub author_id: String,
    pub guild_id: Option<String>,
    pub message: String,
}

/// Structured error and counter sink.
pub trait Observability: Send + Sync {
    fn report_error(&self, error: &CommandError, report: &ErrorReport);

    /// Increment a named counter (`command_runs`, `errors`).
    fn increment(&self, counter: &str, command: &str);
}

/// Delivers replies and lifecycle affordances to the chat platform.
#[async_trait]
pub trait OutputSurface: Send + Sync {
    async fn send(
        &self,
        channel_id: &str,
        message: OutgoingMessage,
    ) -> Result<SentMessage, OutputError>;

    async fn start_typing(&self, channel_id: &str) -> Result<(), OutputError>;

    async fn react(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), OutputError>;

    async fn unreact(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), OutputError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_user_name_prefers_display_name() {
        let user = PlatformUser::new("1", "joe");
        assert_eq!(user.name(), "joe");
        assert_eq!(user.with_display_name("Joseph").name(), "Joseph");
    }

    #[test]
    fn test_inbound_message_builder() {
        let msg = InboundMessage::new("m1", "!s", PlatformUser::new("1", "joe"), "c1")
            .in_guild("g1")
            .mentioning(PlatformUser::new("2", "anna"))
            .with_roles(["mods"]);
        assert_eq!(msg.guild_id.as_deref(), Some("g1"));
        assert_eq!(msg.mentions.len(), 1);
        assert_eq!(msg.author_roles, vec!["mods".to_string()]);
    }

    #[test]
    fn test_inbound_message_deserializes_with_defaults() {
        let json = r#"{
            "id": "m1",
            "content": "!recent",
            "author": {"id": "1", "username": "joe", "display_name": null},
            "guild_id": "g1",
            "channel_id": "c1"
        }"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert!(!msg.author.bot);
        assert!(msg.mentions.is_empty());
        assert!(msg.reply_to.is_none());
    }

    #[test]
    fn test_local_identity_builder() {
        let identity = LocalIdentity::new("1").with_username("joe").with_session("sk");
        assert_eq!(identity.remote_username.as_deref(), Some("joe"));
        assert!(!identity.is_indexed());
    }
}
