//! # Cadence Core
//!
//! Command resolution pipeline for chat bots.
//! Turns inbound messages into command runs: prefix stripping, tokenizing,
//! registry lookup, rollout and permission gating, argument parsing and
//! validation, mention resolution, delegation, and error translation.
//! Storage, chat transport and analytics lookups are injected through the
//! traits in [`services`].

pub mod arguments;
pub mod command;
pub mod config;
pub mod error;
pub mod gate;
pub mod hooks;
pub mod memory;
pub mod metrics;
pub mod perspective;
pub mod pipeline;
pub mod resolver;
pub mod services;
pub mod tokenizer;
pub mod validation;

// Re-export commonly used types at the crate root.
pub use arguments::{ArgValue, ArgumentParser, Arguments, FlagSpec, InputSpec, ParsedArguments};
pub use command::{
    CommandContext, CommandDefinition, CommandHandler, CommandId, CommandNode, CommandRegistry,
    ParentCommand, Resolution, Variation,
};
pub use config::{FrameworkConfig, load_config};
pub use error::{CadenceError, CommandError, Result, UnregisteredReason};
pub use gate::{ExecutionGate, RolloutPolicy};
pub use hooks::{HookRunner, PostSetupHook, SamplingPolicy};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use perspective::Perspective;
pub use pipeline::{Collaborators, CommandPipeline, RunOutcome};
pub use resolver::{MentionResolver, Requestable, ResolvedMentions, ResolverOptions};
pub use services::{InboundMessage, OutgoingMessage, PlatformUser};
pub use tokenizer::{RunAs, Tokenizer};
pub use validation::{Validation, ValidationChecker, ValidationRule, Validator};
