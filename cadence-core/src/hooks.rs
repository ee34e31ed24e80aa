//! Post-setup hooks — best-effort side actions sampled per run.
//!
//! A hook declares a [`SamplingPolicy`]; the runner rolls for each hook after
//! setup and spawns the selected ones on a [`TaskTracker`]. A failing hook is
//! logged and counted and never affects the run that triggered it.

use crate::command::CommandDefinition;
use crate::error::ServiceError;
use crate::metrics::PipelineMetrics;
use crate::services::{AnalyticsIdentityService, IdentityStore, InboundMessage};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// How often a hook runs and for which commands it never runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingPolicy {
    /// Probability in `0.0..=1.0`.
    pub likelihood: f64,
    #[serde(default)]
    pub excluded_commands: Vec<String>,
}

impl SamplingPolicy {
    pub fn always() -> Self {
        Self {
            likelihood: 1.0,
            excluded_commands: Vec::new(),
        }
    }

    pub fn excludes(&self, command: &str) -> bool {
        self.excluded_commands
            .iter()
            .any(|c| c.eq_ignore_ascii_case(command))
    }

    pub fn should_run<R: Rng + ?Sized>(&self, command: &str, rng: &mut R) -> bool {
        if self.excludes(command) {
            return false;
        }
        rng.gen_bool(self.likelihood.clamp(0.0, 1.0))
    }
}

/// A side action run after setup.
#[async_trait]
pub trait PostSetupHook: Send + Sync {
    fn name(&self) -> &str;

    fn policy(&self) -> &SamplingPolicy;

    async fn run(
        &self,
        message: &InboundMessage,
        command: &CommandDefinition,
    ) -> Result<(), ServiceError>;
}

/// Pushes the sender's identity to the analytics service.
pub struct IdentitySyncHook {
    identities: Arc<dyn IdentityStore>,
    analytics: Arc<dyn AnalyticsIdentityService>,
    policy: SamplingPolicy,
}

impl IdentitySyncHook {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        analytics: Arc<dyn AnalyticsIdentityService>,
        policy: SamplingPolicy,
    ) -> Self {
        Self {
            identities,
            analytics,
            policy,
        }
    }
}

#[async_trait]
impl PostSetupHook for IdentitySyncHook {
    fn name(&self) -> &str {
        "identity_sync"
    }

    fn policy(&self) -> &SamplingPolicy {
        &self.policy
    }

    async fn run(
        &self,
        message: &InboundMessage,
        _command: &CommandDefinition,
    ) -> Result<(), ServiceError> {
        let Some(identity) = self.identities.get_user(&message.author.id).await? else {
            return Ok(());
        };
        if identity.remote_username.is_none() {
            return Ok(());
        }
        self.analytics.sync(&identity).await
    }
}

/// Samples and spawns hooks, tracking them until shutdown.
#[derive(Clone)]
pub struct HookRunner {
    hooks: Vec<Arc<dyn PostSetupHook>>,
    tracker: TaskTracker,
    metrics: Arc<PipelineMetrics>,
}

impl HookRunner {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            hooks: Vec::new(),
            tracker: TaskTracker::new(),
            metrics,
        }
    }

    pub fn register(&mut self, hook: Arc<dyn PostSetupHook>) {
        debug!(hook = %hook.name(), "Registering post-setup hook");
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Roll for each hook and spawn the selected ones. Returns how many were spawned.
    pub fn dispatch(&self, message: &InboundMessage, command: &Arc<CommandDefinition>) -> usize {
        let selected: Vec<Arc<dyn PostSetupHook>> = {
            let mut rng = rand::thread_rng();
            self.hooks
                .iter()
                .filter(|hook| hook.policy().should_run(&command.name, &mut rng))
                .cloned()
                .collect()
        };

        for hook in &selected {
            let hook = Arc::clone(hook);
            let message = message.clone();
            let command = Arc::clone(command);
            let metrics = Arc::clone(&self.metrics);
            self.tracker.spawn(async move {
                if let Err(e) = hook.run(&message, &command).await {
                    metrics.record_hook_failure();
                    warn!(hook = %hook.name(), command = %command.name, error = %e, "Post-setup hook failed");
                }
            });
        }

        selected.len()
    }

    /// Wait for every spawned hook to finish.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl std::fmt::Debug for HookRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRunner")
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}
