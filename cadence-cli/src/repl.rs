//! Local driver loop — feeds typed lines through the pipeline as chat messages.

use crate::demo::{self, DemoStores, LOCAL_GUILD};
use crate::terminal::{LogObservability, TerminalOutput};
use cadence_core::services::{InboundMessage, PlatformUser};
use cadence_core::{Collaborators, CommandPipeline, FrameworkConfig, RunOutcome};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Who is typing and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub author: PlatformUser,
    pub guild_id: Option<String>,
    pub channel_id: String,
    next_message: u64,
}

impl Session {
    pub fn new(author_id: &str, guild_id: Option<String>) -> Self {
        let author = demo::demo_users()
            .into_iter()
            .find(|u| u.id == author_id)
            .unwrap_or_else(|| PlatformUser::new(author_id, format!("user{}", author_id)));
        Self {
            author,
            guild_id,
            channel_id: "terminal".to_string(),
            next_message: 0,
        }
    }

    /// Wrap a typed line as an inbound message.
    pub fn message(&mut self, content: &str) -> InboundMessage {
        self.next_message += 1;
        let mut message = InboundMessage::new(
            format!("local-{}", self.next_message),
            content,
            self.author.clone(),
            &self.channel_id,
        );
        if let Some(guild) = &self.guild_id {
            message = message.in_guild(guild);
        }
        for token in content.split_whitespace() {
            if let Some(id) = cadence_core::arguments::mentions::parse_platform_mention(token) {
                if let Some(user) = demo::demo_users().into_iter().find(|u| u.id == id) {
                    message = message.mentioning(user);
                }
            }
        }
        message
    }
}

/// Build a pipeline over the seeded demo stores.
pub fn build_pipeline(config: FrameworkConfig, quiet: bool) -> anyhow::Result<CommandPipeline> {
    let stores = DemoStores::seeded();
    let (registry, cell) = demo::build_registry(&stores)?;
    cell.set(Arc::clone(&registry))
        .map_err(|_| anyhow::anyhow!("demo registry was already initialised"))?;

    Ok(CommandPipeline::new(
        registry,
        config,
        Collaborators {
            identities: stores.identities,
            gate_store: stores.gates,
            output: Arc::new(TerminalOutput::new(quiet)),
            observability: Arc::new(LogObservability::new()),
            directory: Some(stores.directory),
            analytics: None,
        },
    ))
}

async fn dispatch(pipeline: &CommandPipeline, session: &mut Session, line: &str) -> anyhow::Result<()> {
    let outcome = pipeline.handle(session.message(line)).await?;
    match &outcome {
        RunOutcome::Ignored => {
            debug!(line, "Not an invocation");
        }
        RunOutcome::NotFound if !pipeline.config().announce_unknown_commands => {
            eprintln!("(no command matched)");
        }
        RunOutcome::RolledOut => {
            eprintln!("(command not available here)");
        }
        _ => {}
    }
    Ok(())
}

/// Run one line and exit.
pub async fn run_single(
    line: &str,
    config: FrameworkConfig,
    mut session: Session,
    quiet: bool,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, quiet)?;
    dispatch(&pipeline, &mut session, line).await?;
    pipeline.wait_for_hooks().await;
    Ok(())
}

/// Read lines from stdin until EOF or `:quit`.
///
/// Lines starting with `:` control the session instead of being sent:
/// `:as <id>`, `:dm`, `:guild [id]`, `:metrics`, `:quit`.
pub async fn run_interactive(
    config: FrameworkConfig,
    mut session: Session,
    quiet: bool,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, quiet)?;
    if !quiet {
        eprintln!(
            "cadence: type messages as {} ({}), prefix `{}`. `:quit` to exit.",
            session.author.name(),
            session.author.id,
            pipeline.config().prefix
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(control) = line.strip_prefix(':') {
            if !control_session(control, &mut session, &pipeline) {
                break;
            }
            continue;
        }
        if let Err(e) = dispatch(&pipeline, &mut session, line).await {
            warn!(error = %e, "Failed to deliver a reply");
            eprintln!("error: {}", e);
        }
    }

    pipeline.wait_for_hooks().await;
    Ok(())
}

/// Apply a `:` control line. Returns false when the session should end.
fn control_session(control: &str, session: &mut Session, pipeline: &CommandPipeline) -> bool {
    let mut parts = control.split_whitespace();
    match parts.next().unwrap_or_default() {
        "quit" | "q" | "exit" => return false,
        "as" => match parts.next() {
            Some(id) => {
                let guild = session.guild_id.clone();
                *session = Session::new(id, guild);
                eprintln!("now typing as {} ({})", session.author.name(), session.author.id);
            }
            None => eprintln!("usage: :as <user id>"),
        },
        "dm" => {
            session.guild_id = None;
            eprintln!("now in direct messages");
        }
        "guild" => {
            let guild = parts.next().unwrap_or(LOCAL_GUILD).to_string();
            eprintln!("now in server {}", guild);
            session.guild_id = Some(guild);
        }
        "metrics" => match serde_json::to_string_pretty(&pipeline.metrics()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("error: {}", e),
        },
        other => eprintln!("unknown control `:{}`", other),
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_tags_mentions_and_guild() {
        let mut session = Session::new("1", Some(LOCAL_GUILD.to_string()));
        assert_eq!(session.author.username, "joe");
        let message = session.message("!s <@2>");
        assert_eq!(message.guild_id.as_deref(), Some(LOCAL_GUILD));
        assert_eq!(message.mentions.len(), 1);
        assert_eq!(message.mentions[0].id, "2");
        assert_eq!(session.message("!s").id, "local-2");
    }

    #[test]
    fn test_control_session() {
        let pipeline = build_pipeline(FrameworkConfig::default(), true).unwrap();
        let mut session = Session::new("1", Some(LOCAL_GUILD.to_string()));
        assert!(control_session("dm", &mut session, &pipeline));
        assert_eq!(session.guild_id, None);
        assert!(control_session("as 3", &mut session, &pipeline));
        assert_eq!(session.author.username, "sam");
        assert!(!control_session("quit", &mut session, &pipeline));
    }

    #[tokio::test]
    async fn test_demo_commands_run() {
        let pipeline = build_pipeline(FrameworkConfig::default(), true).unwrap();
        let mut session = Session::new("1", Some(LOCAL_GUILD.to_string()));
        for line in ["!s week", "!rank 3", "!cover a | b", "!rym", "!ratings", "!reacts clear"] {
            assert!(dispatch(&pipeline, &mut session, line).await.is_ok(), "{}", line);
        }
        let metrics = pipeline.metrics();
        assert_eq!(metrics.delegations, 1);
        assert_eq!(metrics.errors(), 0);
    }
}
