//! Command pipeline — the per-message run lifecycle.
//!
//! `received -> rollout -> setup -> gate -> parse -> debug flag -> delegate
//! -> validate -> prerun -> run -> teardown`. Any stage after `received` may
//! fail; the error is translated once at the top and teardown still runs,
//! unless reporting the error itself fails.

use crate::arguments::ArgumentParser;
use crate::command::{CommandContext, CommandDefinition, CommandRegistry};
use crate::config::FrameworkConfig;
use crate::error::{CadenceError, CommandError};
use crate::gate::ExecutionGate;
use crate::hooks::{HookRunner, IdentitySyncHook, PostSetupHook};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::resolver::MentionResolver;
use crate::services::{
    AnalyticsIdentityService, ErrorReport, GateStore, IdentityStore, InboundMessage,
    Observability, OutgoingMessage, OutputSurface, PlatformDirectory,
};
use crate::tokenizer::Tokenizer;
use crate::validation::ValidationChecker;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a message was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Not an invocation: no prefix, or sent by a bot.
    Ignored,
    /// No command matched.
    NotFound,
    /// The command is not rolled out to this context.
    RolledOut,
    Completed,
    /// A delegate target ran in place of the command.
    Delegated {
        target: String,
        outcome: Box<RunOutcome>,
    },
    /// The run stopped on an error, which has already been reported.
    Failed(CommandError),
}

/// External collaborators the pipeline is built with.
#[derive(Clone)]
pub struct Collaborators {
    pub identities: Arc<dyn IdentityStore>,
    pub gate_store: Arc<dyn GateStore>,
    pub output: Arc<dyn OutputSurface>,
    pub observability: Arc<dyn Observability>,
    pub directory: Option<Arc<dyn PlatformDirectory>>,
    pub analytics: Option<Arc<dyn AnalyticsIdentityService>>,
}

enum Next {
    Done,
    Delegate(Arc<CommandDefinition>),
}

/// Lifecycle affordances acquired at setup and released at teardown.
struct Affordances {
    loading: Option<(CancellationToken, JoinHandle<bool>)>,
}

/// Turns inbound messages into command runs.
pub struct CommandPipeline {
    registry: Arc<CommandRegistry>,
    config: Arc<FrameworkConfig>,
    gate: ExecutionGate,
    resolver: MentionResolver,
    output: Arc<dyn OutputSurface>,
    observability: Arc<dyn Observability>,
    hooks: HookRunner,
    metrics: Arc<PipelineMetrics>,
    tokenizer: Tokenizer,
}

impl CommandPipeline {
    pub fn new(
        registry: Arc<CommandRegistry>,
        config: FrameworkConfig,
        collaborators: Collaborators,
    ) -> Self {
        let config = Arc::new(config);
        let metrics = Arc::new(PipelineMetrics::new());

        let mut resolver = MentionResolver::new(Arc::clone(&collaborators.identities), &config.prefix)
            .with_login_command(&config.messages.login_command)
            .with_reply_bot_names(config.mentions.reply_bot_names.clone());
        if let Some(directory) = &collaborators.directory {
            resolver = resolver.with_directory(Arc::clone(directory));
        }
        if let Some(analytics) = &collaborators.analytics {
            resolver = resolver.with_analytics(Arc::clone(analytics));
        }

        let mut hooks = HookRunner::new(Arc::clone(&metrics));
        if let Some(analytics) = &collaborators.analytics {
            hooks.register(Arc::new(IdentitySyncHook::new(
                Arc::clone(&collaborators.identities),
                Arc::clone(analytics),
                config.lifecycle.identity_sync.clone(),
            )));
        }

        Self {
            registry,
            gate: ExecutionGate::new(collaborators.gate_store, config.developers.clone()),
            resolver,
            output: collaborators.output,
            observability: collaborators.observability,
            hooks,
            metrics,
            tokenizer: Tokenizer::new(),
            config,
        }
    }

    /// Add a post-setup hook.
    pub fn with_hook(mut self, hook: Arc<dyn PostSetupHook>) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Wait for spawned post-setup hooks to finish.
    pub async fn wait_for_hooks(&self) {
        self.hooks.wait().await;
    }

    /// Handle one inbound message.
    ///
    /// `Err` means the framework could not even report a failure to the
    /// user; teardown has been skipped in that case.
    pub async fn handle(&self, message: InboundMessage) -> Result<RunOutcome, CadenceError> {
        if message.author.bot {
            return Ok(RunOutcome::Ignored);
        }
        let Some(text) = self
            .tokenizer
            .strip_prefix(&message.content, &self.config.prefix)
        else {
            return Ok(RunOutcome::Ignored);
        };

        let resolution = match self.registry.resolve(text) {
            Ok(resolution) => resolution,
            Err(err) => {
                debug!(content = %message.content, "No command matched");
                if self.config.announce_unknown_commands {
                    let mut reply = err.to_string();
                    if let Some(first) = self.tokenizer.tokenize(text).first() {
                        if let Some(suggestion) = self.registry.suggest(&first.text) {
                            reply.push_str(&format!(" Did you mean `{}{}`?", self.config.prefix, suggestion));
                        }
                    }
                    self.output
                        .send(&message.channel_id, OutgoingMessage::text(reply))
                        .await?;
                }
                return Ok(RunOutcome::NotFound);
            }
        };

        self.metrics.record_received();
        let run_id = uuid::Uuid::new_v4().to_string();
        let ctx = CommandContext::new(
            run_id,
            message,
            resolution.run_as.clone(),
            Arc::clone(resolution.command()),
            resolution.parent().cloned(),
            resolution.variation.as_ref().map(|v| v.name.clone()),
            Arc::clone(&self.output),
            self.resolver.clone(),
            Arc::clone(&self.config),
        );

        self.execute(ctx).await
    }

    /// Run one command instance through the full lifecycle.
    async fn execute(&self, mut ctx: CommandContext) -> Result<RunOutcome, CadenceError> {
        let command = Arc::clone(&ctx.command);

        if !self.gate.passes_rollout(&command, &ctx.message) {
            self.metrics.record_rollout_miss();
            debug!(
                run_id = %ctx.run_id,
                command = %command.name,
                guild = ?ctx.message.guild_id,
                "Command not rolled out here"
            );
            return Ok(RunOutcome::RolledOut);
        }

        let affordances = self.setup(&ctx).await;

        let outcome = match self.run_stages(&mut ctx).await {
            Ok(Next::Done) => RunOutcome::Completed,
            Ok(Next::Delegate(target)) => {
                self.metrics.record_delegation();
                info!(
                    run_id = %ctx.run_id,
                    command = %command.name,
                    target = %target.name,
                    "Delegating command"
                );
                let delegated = ctx.for_delegate(Arc::clone(&target));
                let inner = Box::pin(self.execute(delegated)).await?;
                RunOutcome::Delegated {
                    target: target.name.clone(),
                    outcome: Box::new(inner),
                }
            }
            Err(err) => self.handle_error(&ctx, err).await?,
        };

        self.teardown(&ctx, affordances).await;
        Ok(outcome)
    }

    async fn run_stages(&self, ctx: &mut CommandContext) -> Result<Next, CommandError> {
        let command = Arc::clone(&ctx.command);

        if let Err(err) = self
            .gate
            .check(&command, ctx.parent.as_deref(), &ctx.message)
            .await
        {
            self.metrics.record_gate_denial();
            debug!(run_id = %ctx.run_id, command = %command.name, reason = %err, "Gate denied command");
            return Err(err);
        }

        ctx.args = ArgumentParser::new(&command.arguments).parse(&ctx.run_as);
        ctx.debug = ctx.args.flag("debug") && self.config.is_developer(&ctx.message.author.id);
        if ctx.debug {
            info!(run_id = %ctx.run_id, command = %command.name, args = ?ctx.args, "Debug run");
        }

        if let Some(delegate) = command.delegates.iter().find(|d| (d.when)(&ctx.args)) {
            return Ok(Next::Delegate(Arc::clone(&delegate.target)));
        }

        info!(
            run_id = %ctx.run_id,
            command = %command.name,
            command_id = %command.id,
            guild = ?ctx.message.guild_id,
            author = %ctx.message.author.id,
            "Running command"
        );
        self.metrics.record_command_run(&command.name);
        self.observability.increment("command_runs", &command.name);

        ValidationChecker::new(&command.validation).validate(&ctx.args)?;

        let mut handler = command.instantiate();
        handler.prerun(ctx).await?;
        handler.run(ctx).await?;
        Ok(Next::Done)
    }

    async fn setup(&self, ctx: &CommandContext) -> Affordances {
        if let Err(e) = self.output.start_typing(&ctx.message.channel_id).await {
            warn!(run_id = %ctx.run_id, error = %e, "Failed to start typing");
        }

        let loading = ctx.command.show_loading_after.map(|after| {
            let token = CancellationToken::new();
            let cancelled = token.clone();
            let output = Arc::clone(&self.output);
            let channel_id = ctx.message.channel_id.clone();
            let message_id = ctx.message.id.clone();
            let emoji = self.config.lifecycle.loading_reaction.clone();
            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = cancelled.cancelled() => false,
                    _ = tokio::time::sleep(after) => {
                        output.react(&channel_id, &message_id, &emoji).await.is_ok()
                    }
                }
            });
            (token, handle)
        });

        let spawned = self.hooks.dispatch(&ctx.message, &ctx.command);
        if spawned > 0 {
            debug!(run_id = %ctx.run_id, hooks = spawned, "Dispatched post-setup hooks");
        }

        Affordances { loading }
    }

    async fn teardown(&self, ctx: &CommandContext, affordances: Affordances) {
        let Some((token, handle)) = affordances.loading else {
            return;
        };
        token.cancel();
        if handle.await.unwrap_or(false) {
            let emoji = &self.config.lifecycle.loading_reaction;
            if let Err(e) = self
                .output
                .unreact(&ctx.message.channel_id, &ctx.message.id, emoji)
                .await
            {
                warn!(run_id = %ctx.run_id, error = %e, "Failed to remove loading reaction");
            }
        }
    }

    /// Report an error to the user and observability.
    ///
    /// Fails only when the report itself cannot be delivered.
    async fn handle_error(
        &self,
        ctx: &CommandContext,
        err: CommandError,
    ) -> Result<RunOutcome, CadenceError> {
        let command = &ctx.command;
        self.metrics.record_error(err.is_client_facing());
        self.observability.increment("errors", &command.name);

        let reply = if !err.is_client_facing() {
            error!(
                run_id = %ctx.run_id,
                command = %command.name,
                error = %err,
                "Command failed with an internal error"
            );
            self.observability.report_error(
                &err,
                &ErrorReport {
                    run_id: ctx.run_id.clone(),
                    command: command.name.clone(),
                    command_id: command.id.to_string(),
                    author_id: ctx.message.author.id.clone(),
                    guild_id: ctx.message.guild_id.clone(),
                    message: ctx.message.content.clone(),
                },
            );
            Some(OutgoingMessage::text(&self.config.messages.unknown_error))
        } else if err.is_silent() {
            debug!(run_id = %ctx.run_id, command = %command.name, kind = err.kind(), "Silent error");
            None
        } else {
            info!(
                run_id = %ctx.run_id,
                command = %command.name,
                kind = err.kind(),
                error = %err,
                "Command stopped with a client-facing error"
            );
            Some(OutgoingMessage::text(err.to_string()).with_footer(err.footer()))
        };

        if let Some(reply) = reply {
            self.output.send(&ctx.message.channel_id, reply).await?;
        }
        Ok(RunOutcome::Failed(err))
    }
}

impl std::fmt::Debug for CommandPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandPipeline")
            .field("commands", &self.registry.len())
            .field("prefix", &self.config.prefix)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::{ArgValue, Arguments, InputSpec};
    use crate::command::CommandHandler;
    use crate::memory::{
        InMemoryGateStore, InMemoryIdentityStore, OutputEvent, RecordingObservability,
        RecordingOutput,
    };
    use crate::services::PlatformUser;
    use crate::validation::{Range, Validation};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl CommandHandler for Echo {
        async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
            let amount = ctx.args.number("amount").unwrap_or(0.0);
            ctx.reply(format!("echo {}", amount)).await?;
            Ok(())
        }
    }

    struct Fails(CommandError);

    #[async_trait]
    impl CommandHandler for Fails {
        async fn run(&mut self, _ctx: &mut CommandContext) -> Result<(), CommandError> {
            Err(self.0.clone())
        }
    }

    struct Slow;

    #[async_trait]
    impl CommandHandler for Slow {
        async fn run(&mut self, _ctx: &mut CommandContext) -> Result<(), CommandError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
    }

    struct Harness {
        pipeline: CommandPipeline,
        output: Arc<RecordingOutput>,
        observability: Arc<RecordingObservability>,
    }

    fn harness(registry: CommandRegistry, config: FrameworkConfig) -> Harness {
        let output = Arc::new(RecordingOutput::new());
        let observability = Arc::new(RecordingObservability::new());
        let pipeline = CommandPipeline::new(
            Arc::new(registry),
            config,
            Collaborators {
                identities: Arc::new(InMemoryIdentityStore::new()),
                gate_store: Arc::new(InMemoryGateStore::new()),
                output: output.clone(),
                observability: observability.clone(),
                directory: None,
                analytics: None,
            },
        );
        Harness {
            pipeline,
            output,
            observability,
        }
    }

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                CommandDefinition::new("echo", "echo", || Echo)
                    .arguments(Arguments::new().input(
                        "amount",
                        InputSpec::at(0).default_value(ArgValue::Number(1.0)).number(),
                    ))
                    .validation(Validation::new().rule("amount", Range::between(1.0, 10.0))),
            )
            .unwrap();
        registry
            .register(CommandDefinition::new("logic", "logic", || {
                Fails(CommandError::logic_with_footer("no scrobbles", "try another period"))
            }))
            .unwrap();
        registry
            .register(CommandDefinition::new("boom", "boom", || {
                Fails(CommandError::unknown("db exploded"))
            }))
            .unwrap();
        registry
            .register(CommandDefinition::new("quiet", "quiet", || {
                Fails(CommandError::logic("hidden").silenced())
            }))
            .unwrap();
        registry
            .register(
                CommandDefinition::new("slow", "slow", || Slow)
                    .show_loading_after(Duration::from_millis(5)),
            )
            .unwrap();
        registry
    }

    fn message(content: &str) -> InboundMessage {
        InboundMessage::new("m1", content, PlatformUser::new("1", "joe"), "c1").in_guild("g1")
    }

    #[tokio::test]
    async fn test_runs_command() {
        let h = harness(registry(), FrameworkConfig::default());
        let outcome = h.pipeline.handle(message("!echo 3")).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(h.output.sent_texts(), vec!["echo 3".to_string()]);
        assert_eq!(h.observability.counter("command_runs"), 1);
        assert_eq!(h.pipeline.metrics().runs_by_command.get("echo"), Some(&1));
    }

    #[tokio::test]
    async fn test_ignores_non_invocations() {
        let h = harness(registry(), FrameworkConfig::default());
        assert_eq!(h.pipeline.handle(message("echo 3")).await.unwrap(), RunOutcome::Ignored);
        let from_bot = InboundMessage::new("m", "!echo", PlatformUser::new("2", "b").bot(), "c1");
        assert_eq!(h.pipeline.handle(from_bot).await.unwrap(), RunOutcome::Ignored);
        assert!(h.output.events().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_is_quiet_by_default() {
        let h = harness(registry(), FrameworkConfig::default());
        assert_eq!(h.pipeline.handle(message("!ech")).await.unwrap(), RunOutcome::NotFound);
        assert!(h.output.sent().is_empty());

        let config = FrameworkConfig {
            announce_unknown_commands: true,
            ..Default::default()
        };
        let h = harness(registry(), config);
        h.pipeline.handle(message("!ech")).await.unwrap();
        assert_eq!(
            h.output.sent_texts(),
            vec!["Command `ech` not found! Did you mean `!echo`?".to_string()]
        );
    }

    #[tokio::test]
    async fn test_validation_failure_is_client_facing() {
        let h = harness(registry(), FrameworkConfig::default());
        let outcome = h.pipeline.handle(message("!echo 50")).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Failed(CommandError::ValidationFailed { .. })
        ));
        assert_eq!(
            h.output.sent_texts(),
            vec!["invalid amount: must be between 1 and 10".to_string()]
        );
        assert_eq!(h.pipeline.metrics().client_errors, 1);
    }

    #[tokio::test]
    async fn test_logic_error_shows_message_and_footer() {
        let h = harness(registry(), FrameworkConfig::default());
        h.pipeline.handle(message("!logic")).await.unwrap();
        let sent = h.output.sent();
        assert_eq!(sent[0].text, "no scrobbles");
        assert_eq!(sent[0].footer.as_deref(), Some("try another period"));
        assert!(h.observability.errors().is_empty());
    }

    #[tokio::test]
    async fn test_internal_error_is_reported_not_leaked() {
        let h = harness(registry(), FrameworkConfig::default());
        let outcome = h.pipeline.handle(message("!boom")).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed(CommandError::Unknown { .. })));
        let texts = h.output.sent_texts();
        assert_eq!(texts, vec![FrameworkConfig::default().messages.unknown_error]);
        assert!(!texts[0].contains("db exploded"));

        let errors = h.observability.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1.command, "boom");
        assert_eq!(h.pipeline.metrics().internal_errors, 1);
        assert_eq!(h.observability.counter("errors"), 1);
    }

    #[tokio::test]
    async fn test_silent_error_sends_nothing() {
        let h = harness(registry(), FrameworkConfig::default());
        let outcome = h.pipeline.handle(message("!quiet")).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed(ref e) if e.is_silent()));
        assert!(h.output.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_error_report_is_fatal() {
        let h = harness(registry(), FrameworkConfig::default());
        h.output.fail_sends(true);
        let err = h.pipeline.handle(message("!logic")).await.unwrap_err();
        assert!(matches!(err, CadenceError::Output(_)));
    }

    #[tokio::test]
    async fn test_loading_reaction_added_and_removed() {
        let h = harness(registry(), FrameworkConfig::default());
        h.pipeline.handle(message("!slow")).await.unwrap();
        let events = h.output.events();
        assert!(events.contains(&OutputEvent::Typing {
            channel_id: "c1".into()
        }));
        let reacted = events
            .iter()
            .position(|e| matches!(e, OutputEvent::Reacted { .. }))
            .unwrap();
        let unreacted = events
            .iter()
            .position(|e| matches!(e, OutputEvent::Unreacted { .. }))
            .unwrap();
        assert!(reacted < unreacted);
    }

    #[tokio::test]
    async fn test_fast_command_never_shows_loading() {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                CommandDefinition::new("fast", "fast", || Echo)
                    .show_loading_after(Duration::from_secs(60)),
            )
            .unwrap();
        let h = harness(registry, FrameworkConfig::default());
        h.pipeline.handle(message("!fast")).await.unwrap();
        assert!(
            !h.output
                .events()
                .iter()
                .any(|e| matches!(e, OutputEvent::Reacted { .. } | OutputEvent::Unreacted { .. }))
        );
    }
}
