//! Per-invocation context handed to command handlers.

use super::CommandDefinition;
use crate::arguments::ParsedArguments;
use crate::config::FrameworkConfig;
use crate::error::CommandError;
use crate::resolver::{MentionResolver, ResolvedMentions, ResolverOptions};
use crate::services::{InboundMessage, OutgoingMessage, OutputSurface, SentMessage};
use crate::tokenizer::RunAs;
use std::sync::Arc;

/// Everything a handler sees during one run.
pub struct CommandContext {
    /// Ties the log lines of one run together.
    pub run_id: String,
    pub message: InboundMessage,
    pub run_as: RunAs,
    pub args: ParsedArguments,
    pub command: Arc<CommandDefinition>,
    pub parent: Option<Arc<CommandDefinition>>,
    /// Name of the variation that selected the command, if any.
    pub variation: Option<String>,
    /// `--debug` was given by a developer.
    pub debug: bool,
    output: Arc<dyn OutputSurface>,
    resolver: MentionResolver,
    config: Arc<FrameworkConfig>,
}

impl CommandContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        run_id: String,
        message: InboundMessage,
        run_as: RunAs,
        command: Arc<CommandDefinition>,
        parent: Option<Arc<CommandDefinition>>,
        variation: Option<String>,
        output: Arc<dyn OutputSurface>,
        resolver: MentionResolver,
        config: Arc<FrameworkConfig>,
    ) -> Self {
        Self {
            run_id,
            message,
            run_as,
            args: ParsedArguments::new(),
            command,
            parent,
            variation,
            debug: false,
            output,
            resolver,
            config,
        }
    }

    /// Send a plain-text reply to the invoking channel.
    pub async fn reply(&self, text: impl Into<String>) -> Result<SentMessage, CommandError> {
        self.send(OutgoingMessage::text(text)).await
    }

    pub async fn send(&self, message: OutgoingMessage) -> Result<SentMessage, CommandError> {
        Ok(self.output.send(&self.message.channel_id, message).await?)
    }

    /// Resolve the invocation's mentions with command-specific requirements.
    pub async fn resolve_mentions(
        &self,
        options: &ResolverOptions,
    ) -> Result<ResolvedMentions, CommandError> {
        self.resolver.resolve(&self.args, &self.message, options).await
    }

    pub fn variation_was_used(&self, variation: &str) -> bool {
        self.variation
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case(variation))
            || self.run_as.variation_was_used(variation)
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn is_developer(&self) -> bool {
        self.config.is_developer(&self.message.author.id)
    }

    pub fn output(&self) -> &Arc<dyn OutputSurface> {
        &self.output
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.message.guild_id.as_deref()
    }

    /// Copy for running a delegate target with the same raw input.
    pub(crate) fn for_delegate(&self, target: Arc<CommandDefinition>) -> Self {
        Self {
            run_id: self.run_id.clone(),
            message: self.message.clone(),
            run_as: self.run_as.clone(),
            args: ParsedArguments::new(),
            command: target,
            parent: self.parent.clone(),
            variation: self.variation.clone(),
            debug: false,
            output: Arc::clone(&self.output),
            resolver: self.resolver.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("run_id", &self.run_id)
            .field("command", &self.command.name)
            .field("run_as", &self.run_as)
            .field("args", &self.args)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
