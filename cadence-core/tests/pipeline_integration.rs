//! Integration tests for the command pipeline.
//!
//! These tests drive whole messages through `CommandPipeline` with the
//! in-memory collaborators and check what reaches the output surface.

use async_trait::async_trait;
use cadence_core::arguments::{Arguments, InputSpec};
use cadence_core::command::{CommandContext, CommandHandler, Delegate, ParentCommand};
use cadence_core::error::{CommandError, UnregisteredReason};
use cadence_core::gate::RolloutPolicy;
use cadence_core::hooks::SamplingPolicy;
use cadence_core::memory::{
    InMemoryAnalytics, InMemoryDirectory, InMemoryGateStore, InMemoryIdentityStore, OutputEvent,
    RecordingObservability, RecordingOutput,
};
use cadence_core::resolver::ResolverOptions;
use cadence_core::services::{InboundMessage, LocalIdentity, PlatformUser};
use cadence_core::{
    Collaborators, CommandDefinition, CommandPipeline, CommandRegistry, FrameworkConfig,
    RunOutcome,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

/// Records that it ran and replies with its label.
struct Recorder {
    label: &'static str,
    log: Log,
}

#[async_trait]
impl CommandHandler for Recorder {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let entry = if ctx.debug {
            format!("{} (debug)", self.label)
        } else {
            self.label.to_string()
        };
        self.log.lock().unwrap().push(entry);
        ctx.reply(self.label).await?;
        Ok(())
    }
}

/// Resolves mentions and replies with the perspective.
struct WhoHas;

#[async_trait]
impl CommandHandler for WhoHas {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let resolved = ctx.resolve_mentions(&ResolverOptions::default()).await?;
        ctx.reply(format!(
            "{} {} scrobbles",
            resolved.perspective.has,
            resolved.username.unwrap_or_default()
        ))
        .await?;
        Ok(())
    }
}

fn recorder(seed: &str, name: &str, label: &'static str, log: &Log) -> CommandDefinition {
    let log = Arc::clone(log);
    CommandDefinition::new(seed, name, move || Recorder {
        label,
        log: Arc::clone(&log),
    })
}

struct World {
    pipeline: CommandPipeline,
    output: Arc<RecordingOutput>,
    observability: Arc<RecordingObservability>,
    gates: Arc<InMemoryGateStore>,
    analytics: Arc<InMemoryAnalytics>,
    log: Log,
}

fn world(config: FrameworkConfig) -> World {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = CommandRegistry::new();

    registry
        .register(recorder("scrobbles", "scrobbles", "scrobbles", &log).alias("s"))
        .unwrap();
    registry
        .register(
            recorder("beta", "beta", "beta", &log).rollout(RolloutPolicy::guilds(&["testing"])),
        )
        .unwrap();
    registry
        .register(recorder("eval", "eval", "eval", &log).dev_only())
        .unwrap();
    registry
        .register(recorder("old", "old", "old", &log).archived())
        .unwrap();

    let clear = Arc::new(recorder("reacts-clear", "clear", "clear", &log));
    registry
        .register(
            recorder("reacts", "reacts", "reacts", &log)
                .arguments(Arguments::new().input("action", InputSpec::at(0)))
                .delegate(Delegate::new(
                    |args| args.text("action") == Some("clear"),
                    clear,
                )),
        )
        .unwrap();

    registry
        .register(
            ParentCommand::new(recorder("rym", "rateyourmusic", "rym", &log).alias("rym"))
                .child(recorder("rym-import", "import", "import", &log))
                .child(recorder("rym-link", "link", "link", &log))
                .default_child("link"),
        )
        .unwrap();

    registry
        .register(
            CommandDefinition::new("whohas", "whohas", || WhoHas)
                .arguments(Arguments::new().with_standard_mentions()),
        )
        .unwrap();

    let identities = Arc::new(InMemoryIdentityStore::new());
    identities.insert(LocalIdentity::new("1").with_username("joe_lfm"));
    identities.insert(LocalIdentity::new("2").with_username("ana_lfm"));

    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_user(PlatformUser::new("2", "ana"));

    let gates = Arc::new(InMemoryGateStore::new());
    let analytics = Arc::new(InMemoryAnalytics::new());
    let output = Arc::new(RecordingOutput::new());
    let observability = Arc::new(RecordingObservability::new());

    let pipeline = CommandPipeline::new(
        Arc::new(registry),
        config,
        Collaborators {
            identities,
            gate_store: gates.clone(),
            output: output.clone(),
            observability: observability.clone(),
            directory: Some(directory),
            analytics: Some(analytics.clone()),
        },
    );

    World {
        pipeline,
        output,
        observability,
        gates,
        analytics,
        log,
    }
}

fn config() -> FrameworkConfig {
    let mut config = FrameworkConfig {
        developers: vec!["dev".to_string()],
        ..Default::default()
    };
    config.lifecycle.identity_sync = SamplingPolicy {
        likelihood: 0.0,
        excluded_commands: Vec::new(),
    };
    config
}

fn message(author: &str, guild: &str, content: &str) -> InboundMessage {
    InboundMessage::new("m1", content, PlatformUser::new(author, "someone"), "c1").in_guild(guild)
}

fn ran(world: &World) -> Vec<String> {
    world.log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_alias_and_name_run_the_same_command() {
    let w = world(config());
    let by_name = w.pipeline.registry().resolve("scrobbles").unwrap();
    let by_alias = w.pipeline.registry().resolve("S").unwrap();
    assert_eq!(by_name.command().id, by_alias.command().id);

    assert_eq!(
        w.pipeline.handle(message("1", "g1", "!s")).await.unwrap(),
        RunOutcome::Completed
    );
    assert_eq!(ran(&w), vec!["scrobbles".to_string()]);
}

#[tokio::test]
async fn test_unknown_command_produces_nothing() {
    let w = world(config());
    assert_eq!(
        w.pipeline.handle(message("1", "g1", "!nope")).await.unwrap(),
        RunOutcome::NotFound
    );
    assert_eq!(
        w.pipeline.handle(message("1", "g1", "!old")).await.unwrap(),
        RunOutcome::NotFound
    );
    assert!(w.output.events().is_empty());
    assert_eq!(w.pipeline.metrics().messages_received, 0);
}

#[tokio::test]
async fn test_rollout_miss_is_silent_and_developers_bypass() {
    let w = world(config());
    assert_eq!(
        w.pipeline.handle(message("1", "g1", "!beta")).await.unwrap(),
        RunOutcome::RolledOut
    );
    assert!(w.output.events().is_empty());
    assert_eq!(w.pipeline.metrics().rollout_misses, 1);

    assert_eq!(
        w.pipeline
            .handle(message("1", "testing", "!beta"))
            .await
            .unwrap(),
        RunOutcome::Completed
    );
    assert_eq!(
        w.pipeline.handle(message("dev", "g1", "!beta")).await.unwrap(),
        RunOutcome::Completed
    );
    assert_eq!(ran(&w), vec!["beta".to_string(), "beta".to_string()]);
}

#[tokio::test]
async fn test_delegate_runs_target_instead_of_command() {
    let w = world(config());
    let outcome = w
        .pipeline
        .handle(message("1", "g1", "!reacts clear"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Delegated {
            target: "clear".to_string(),
            outcome: Box::new(RunOutcome::Completed),
        }
    );
    assert_eq!(ran(&w), vec!["clear".to_string()]);
    assert_eq!(w.output.sent_texts(), vec!["clear".to_string()]);

    w.pipeline
        .handle(message("1", "g1", "!reacts 🔥"))
        .await
        .unwrap();
    assert_eq!(ran(&w), vec!["clear".to_string(), "reacts".to_string()]);
}

#[tokio::test]
async fn test_disabled_in_one_server_only() {
    let w = world(config());
    let id = w
        .pipeline
        .registry()
        .lookup("scrobbles")
        .unwrap()
        .definition()
        .id
        .clone();
    w.gates.disable("g1", id.as_str(), false);

    let outcome = w.pipeline.handle(message("1", "g1", "!s")).await.unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Failed(CommandError::PermissionDenied { .. })
    ));
    assert_eq!(
        w.output.sent_texts(),
        vec!["This command has been disabled in this server".to_string()]
    );

    assert_eq!(
        w.pipeline.handle(message("1", "g2", "!s")).await.unwrap(),
        RunOutcome::Completed
    );
    assert_eq!(ran(&w), vec!["scrobbles".to_string()]);
    assert_eq!(w.pipeline.metrics().gate_denials, 1);
}

#[tokio::test]
async fn test_dev_only_command_is_silent_for_others() {
    let w = world(config());
    let outcome = w.pipeline.handle(message("1", "g1", "!eval")).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(ref e) if e.is_silent()));
    assert!(w.output.sent().is_empty());

    w.pipeline
        .handle(message("dev", "g1", "!eval"))
        .await
        .unwrap();
    assert_eq!(ran(&w), vec!["eval".to_string()]);
}

#[tokio::test]
async fn test_unregistered_sender_is_told_how_to_login() {
    let w = world(config());
    let outcome = w
        .pipeline
        .handle(message("9", "g1", "!whohas"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Failed(CommandError::Unregistered(
            UnregisteredReason::SenderNotLoggedIn {
                prefix: "!".to_string()
            }
        ))
    );
    assert_eq!(
        w.output.sent_texts(),
        vec!["please sign in with a last.fm account! (`!login`)".to_string()]
    );
    assert!(w.observability.errors().is_empty());
}

#[tokio::test]
async fn test_mentions_switch_perspective() {
    let w = world(config());
    w.pipeline
        .handle(message("1", "g1", "!whohas"))
        .await
        .unwrap();
    w.pipeline
        .handle(message("1", "g1", "!whohas <@2>"))
        .await
        .unwrap();
    w.pipeline
        .handle(message("1", "g1", "!whohas lfm:someone_else"))
        .await
        .unwrap();
    assert_eq!(
        w.output.sent_texts(),
        vec![
            "you have joe_lfm scrobbles".to_string(),
            "`ana_lfm` has ana_lfm scrobbles".to_string(),
            "`someone_else` has someone_else scrobbles".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_parent_dispatches_to_children() {
    let w = world(config());
    w.pipeline
        .handle(message("1", "g1", "!rym import"))
        .await
        .unwrap();
    w.pipeline
        .handle(message("1", "g1", "!rateyourmusic"))
        .await
        .unwrap();
    assert_eq!(ran(&w), vec!["import".to_string(), "link".to_string()]);
}

#[tokio::test]
async fn test_debug_flag_only_for_developers() {
    let w = world(config());
    w.pipeline
        .handle(message("1", "g1", "!s --debug"))
        .await
        .unwrap();
    w.pipeline
        .handle(message("dev", "g1", "!s --debug"))
        .await
        .unwrap();
    assert_eq!(
        ran(&w),
        vec!["scrobbles".to_string(), "scrobbles (debug)".to_string()]
    );
}

#[tokio::test]
async fn test_identity_sync_hook_runs_when_sampled() {
    let mut config = config();
    config.lifecycle.identity_sync = SamplingPolicy::always();
    let w = world(config);
    w.pipeline.handle(message("1", "g1", "!s")).await.unwrap();
    w.pipeline.wait_for_hooks().await;
    assert_eq!(w.analytics.synced(), vec!["1".to_string()]);

    let w = world(self::config());
    w.pipeline.handle(message("1", "g1", "!s")).await.unwrap();
    w.pipeline.wait_for_hooks().await;
    assert!(w.analytics.synced().is_empty());
}

#[tokio::test]
async fn test_failed_error_reply_skips_teardown() {
    let w = world(config());
    w.output.fail_sends(true);
    assert!(w.pipeline.handle(message("9", "g1", "!whohas")).await.is_err());
    assert!(
        w.output
            .events()
            .iter()
            .all(|e| !matches!(e, OutputEvent::Unreacted { .. }))
    );
}

#[tokio::test]
async fn test_direct_messages_skip_server_state() {
    let w = world(config());
    let id = w
        .pipeline
        .registry()
        .lookup("scrobbles")
        .unwrap()
        .definition()
        .id
        .clone();
    w.gates.disable("g1", id.as_str(), false);

    let dm = InboundMessage::new("m1", "!s", PlatformUser::new("1", "joe"), "dm-1");
    assert_eq!(w.pipeline.handle(dm).await.unwrap(), RunOutcome::Completed);
}
