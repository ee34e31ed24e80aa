//! Terminal collaborators — an output surface that prints replies and an
//! observability sink that forwards to `tracing`.

use async_trait::async_trait;
use cadence_core::error::{CommandError, OutputError};
use cadence_core::services::{ErrorReport, Observability, OutgoingMessage, OutputSurface, SentMessage};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error};

/// Prints replies to stdout and lifecycle affordances to stderr.
#[derive(Debug, Default)]
pub struct TerminalOutput {
    next_id: AtomicU64,
    quiet: bool,
}

impl TerminalOutput {
    pub fn new(quiet: bool) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            quiet,
        }
    }
}

#[async_trait]
impl OutputSurface for TerminalOutput {
    async fn send(
        &self,
        channel_id: &str,
        message: OutgoingMessage,
    ) -> Result<SentMessage, OutputError> {
        println!("{}", message.text);
        if let Some(footer) = &message.footer {
            println!("  ({})", footer);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SentMessage {
            id: format!("reply-{}", id),
            channel_id: channel_id.to_string(),
        })
    }

    async fn start_typing(&self, _channel_id: &str) -> Result<(), OutputError> {
        Ok(())
    }

    async fn react(
        &self,
        _channel_id: &str,
        _message_id: &str,
        emoji: &str,
    ) -> Result<(), OutputError> {
        if !self.quiet {
            eprintln!("[{} working...]", emoji);
        }
        Ok(())
    }

    async fn unreact(
        &self,
        _channel_id: &str,
        _message_id: &str,
        _emoji: &str,
    ) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Logs internal errors and keeps counters in memory.
#[derive(Debug, Default)]
pub struct LogObservability {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl LogObservability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> BTreeMap<String, u64> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Observability for LogObservability {
    fn report_error(&self, err: &CommandError, report: &ErrorReport) {
        error!(
            run_id = %report.run_id,
            command = %report.command,
            command_id = %report.command_id,
            author = %report.author_id,
            guild = ?report.guild_id,
            message = %report.message,
            error = %err,
            "Internal command error"
        );
    }

    fn increment(&self, counter: &str, command: &str) {
        debug!(counter, command, "Counter incremented");
        *self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(counter.to_string())
            .or_default() += 1;
    }
}
