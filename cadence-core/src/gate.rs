//! Execution Gate — rollout, dev-only, disabled and permission checks.
//!
//! The gate consults persisted records through [`GateStore`]; it owns none of
//! them. Direct messages have no server and skip every persisted check.

use crate::command::{CommandDefinition, CommandId};
use crate::error::CommandError;
use crate::services::{GateStore, InboundMessage, PermissionEntity, PermissionKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Which contexts a command is active in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutPolicy {
    /// Servers that always have the command.
    #[serde(default)]
    pub guilds: Vec<String>,
    /// Share of other contexts (0-100) admitted by stable bucket.
    #[serde(default)]
    pub percentage: Option<u8>,
}

impl RolloutPolicy {
    pub fn guilds(ids: &[&str]) -> Self {
        Self {
            guilds: ids.iter().map(|id| id.to_string()).collect(),
            percentage: None,
        }
    }

    pub fn percentage(percentage: u8) -> Self {
        Self {
            guilds: Vec::new(),
            percentage: Some(percentage.min(100)),
        }
    }

    pub fn with_percentage(mut self, percentage: u8) -> Self {
        self.percentage = Some(percentage.min(100));
        self
    }

    /// Whether the context keyed by `context_key` falls inside the rollout.
    pub fn admits(&self, guild_id: Option<&str>, context_key: &str, command: &CommandId) -> bool {
        if let Some(guild) = guild_id {
            if self.guilds.iter().any(|g| g == guild) {
                return true;
            }
        }
        match self.percentage {
            Some(pct) => rollout_bucket(context_key, command) < u64::from(pct),
            None => self.guilds.is_empty(),
        }
    }
}

/// Stable bucket in `0..100` for a context and command.
pub fn rollout_bucket(context_key: &str, command: &CommandId) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(context_key.as_bytes());
    hasher.update(b":");
    hasher.update(command.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes) % 100
}

/// Checks whether a resolved command may run for a message.
#[derive(Clone)]
pub struct ExecutionGate {
    store: Arc<dyn GateStore>,
    developers: Vec<String>,
}

impl ExecutionGate {
    pub fn new(store: Arc<dyn GateStore>, developers: Vec<String>) -> Self {
        Self { store, developers }
    }

    pub fn is_developer(&self, user_id: &str) -> bool {
        self.developers.iter().any(|d| d == user_id)
    }

    /// Developers always pass; otherwise the command's policy decides.
    pub fn passes_rollout(&self, command: &CommandDefinition, message: &InboundMessage) -> bool {
        if self.is_developer(&message.author.id) {
            return true;
        }
        let Some(policy) = &command.rollout else {
            return true;
        };
        let key = message
            .guild_id
            .as_deref()
            .unwrap_or(&message.author.id);
        let admitted = policy.admits(message.guild_id.as_deref(), key, &command.id);
        debug!(command = %command.name, admitted, "Rollout check");
        admitted
    }

    /// Dev-only, disabled, channel and entity checks, in that order.
    ///
    /// Dev-only misses are silent. The rest are client-facing denials.
    pub async fn check(
        &self,
        command: &CommandDefinition,
        parent: Option<&CommandDefinition>,
        message: &InboundMessage,
    ) -> Result<(), CommandError> {
        let developer = self.is_developer(&message.author.id);

        if (command.dev || parent.is_some_and(|p| p.dev)) && !developer {
            debug!(command = %command.name, "Dev-only command invoked by non-developer");
            return Err(CommandError::PermissionDenied {
                reason: "This command is only available to developers".to_string(),
            }
            .silenced());
        }

        let Some(guild_id) = message.guild_id.as_deref() else {
            return Ok(());
        };

        for def in std::iter::once(command).chain(parent) {
            let status = self.store.is_command_disabled(guild_id, def.id.as_str()).await?;
            if status.disabled {
                let reason = if status.dev_only {
                    "This command has been temporarily disabled by the developers"
                } else {
                    "This command has been disabled in this server"
                };
                return Err(CommandError::PermissionDenied {
                    reason: reason.to_string(),
                });
            }
        }

        if developer {
            return Ok(());
        }

        for def in std::iter::once(command).chain(parent) {
            let blacklisted = self
                .store
                .list_channel_blacklists(guild_id, def.id.as_str())
                .await?;
            if blacklisted.iter().any(|c| c == &message.channel_id) {
                return Err(CommandError::PermissionDenied {
                    reason: "You can't run this command in this channel!".to_string(),
                });
            }
            self.check_entity_permissions(guild_id, def, message).await?;
        }

        Ok(())
    }

    async fn check_entity_permissions(
        &self,
        guild_id: &str,
        command: &CommandDefinition,
        message: &InboundMessage,
    ) -> Result<(), CommandError> {
        let records = self
            .store
            .list_permissions(guild_id, command.id.as_str())
            .await?;
        if records.is_empty() {
            return Ok(());
        }

        let applies = |entity: PermissionEntity, entity_id: &str| match entity {
            PermissionEntity::User => entity_id == message.author.id,
            PermissionEntity::Role => message.author_roles.iter().any(|r| r == entity_id),
        };

        let blacklisted = records
            .iter()
            .filter(|r| r.kind == PermissionKind::Blacklist)
            .any(|r| applies(r.entity, &r.entity_id));
        if blacklisted {
            return Err(CommandError::PermissionDenied {
                reason: "You don't have permission to run this command!".to_string(),
            });
        }

        let mut whitelist = records
            .iter()
            .filter(|r| r.kind == PermissionKind::Whitelist)
            .peekable();
        if whitelist.peek().is_some() && !whitelist.any(|r| applies(r.entity, &r.entity_id)) {
            return Err(CommandError::PermissionDenied {
                reason: "This command is restricted to specific users and roles!".to_string(),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for ExecutionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGate")
            .field("developers", &self.developers)
            .finish_non_exhaustive()
    }
}
