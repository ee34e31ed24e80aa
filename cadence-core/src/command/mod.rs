//! # Commands
//!
//! The command node model: a [`CommandDefinition`] carries metadata, gating,
//! argument schema, validation and delegation rules plus a factory for a
//! fresh [`CommandHandler`] per invocation. Nodes are a tagged variant over
//! leaf, parent and child commands; only parents own children.

pub mod context;
pub mod registry;

pub use context::CommandContext;
pub use registry::{CommandRegistry, Resolution};

use crate::arguments::{Arguments, ParsedArguments};
use crate::error::CommandError;
use crate::gate::RolloutPolicy;
use crate::validation::Validation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Stable command id derived from a unique seed string.
///
/// Persisted per-command state (disabled records, permissions) is keyed by
/// this id, so seeds must never change once a command ships.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(String);

impl CommandId {
    pub fn from_seed(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let hex: String = digest[..16].iter().map(|b| format!("{:02x}", b)).collect();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Alternate tokens that select a command and signal a behavioural switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub name: String,
    pub tokens: Vec<String>,
    pub description: Option<String>,
}

impl Variation {
    pub fn new(name: impl Into<String>, tokens: &[&str]) -> Self {
        Self {
            name: name.into(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn matches(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t.eq_ignore_ascii_case(token))
    }
}

pub type DelegateCondition = Arc<dyn Fn(&ParsedArguments) -> bool + Send + Sync>;

/// Hands execution to `target` when `when` holds for the parsed arguments.
#[derive(Clone)]
pub struct Delegate {
    pub when: DelegateCondition,
    pub target: Arc<CommandDefinition>,
}

impl Delegate {
    pub fn new<F>(when: F, target: Arc<CommandDefinition>) -> Self
    where
        F: Fn(&ParsedArguments) -> bool + Send + Sync + 'static,
    {
        Self {
            when: Arc::new(when),
            target,
        }
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field("target", &self.target.name)
            .finish()
    }
}

/// Per-invocation behaviour of a command.
///
/// A new handler is built for every run and dropped at teardown.
#[async_trait]
pub trait CommandHandler: Send {
    /// Checks that run after validation and before `run`.
    async fn prerun(&mut self, _ctx: &mut CommandContext) -> Result<(), CommandError> {
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError>;
}

pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn CommandHandler> + Send + Sync>;

/// Static declaration of a command.
#[derive(Clone)]
pub struct CommandDefinition {
    pub id_seed: String,
    pub id: CommandId,
    pub name: String,
    pub friendly_name: Option<String>,
    pub aliases: Vec<String>,
    pub variations: Vec<Variation>,
    pub description: String,
    pub category: Option<String>,
    pub usage: Vec<String>,
    /// Resolvable but hidden from listings.
    pub secret: bool,
    /// Only developers may run it.
    pub dev: bool,
    /// Never resolvable by name; still addressable by id.
    pub archived: bool,
    pub rollout: Option<RolloutPolicy>,
    pub arguments: Arguments,
    pub validation: Validation,
    pub delegates: Vec<Delegate>,
    /// Show a loading reaction if the run takes longer than this.
    pub show_loading_after: Option<Duration>,
    handler: HandlerFactory,
}

impl CommandDefinition {
    pub fn new<F, H>(id_seed: impl Into<String>, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: CommandHandler + 'static,
    {
        let id_seed = id_seed.into();
        Self {
            id: CommandId::from_seed(&id_seed),
            id_seed,
            name: name.into(),
            friendly_name: None,
            aliases: Vec::new(),
            variations: Vec::new(),
            description: String::new(),
            category: None,
            usage: Vec::new(),
            secret: false,
            dev: false,
            archived: false,
            rollout: None,
            arguments: Arguments::default(),
            validation: Validation::default(),
            delegates: Vec::new(),
            show_loading_after: None,
            handler: Arc::new(move || Box::new(handler()) as Box<dyn CommandHandler>),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases.extend(aliases.iter().map(|a| a.to_string()));
        self
    }

    pub fn variation(mut self, variation: Variation) -> Self {
        self.variations.push(variation);
        self
    }

    pub fn friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage.push(usage.into());
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn dev_only(mut self) -> Self {
        self.dev = true;
        self
    }

    pub fn archived(mut self) -> Self {
        self.archived = true;
        self
    }

    pub fn rollout(mut self, policy: RolloutPolicy) -> Self {
        self.rollout = Some(policy);
        self
    }

    pub fn arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn delegate(mut self, delegate: Delegate) -> Self {
        self.delegates.push(delegate);
        self
    }

    pub fn show_loading_after(mut self, after: Duration) -> Self {
        self.show_loading_after = Some(after);
        self
    }

    /// Build a fresh handler for one invocation.
    pub fn instantiate(&self) -> Box<dyn CommandHandler> {
        (self.handler)()
    }

    pub fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.name)
    }

    /// Name and aliases, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn is_visible(&self) -> bool {
        !(self.secret || self.dev || self.archived)
    }

    fn answers_to_name(&self, token: &str) -> bool {
        self.name.eq_ignore_ascii_case(token)
    }

    fn answers_to_alias(&self, token: &str) -> bool {
        self.aliases.iter().any(|a| a.eq_ignore_ascii_case(token))
    }

    fn variation_for(&self, token: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.matches(token))
    }
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("variations", &self.variations)
            .field("secret", &self.secret)
            .field("dev", &self.dev)
            .field("archived", &self.archived)
            .field("delegates", &self.delegates)
            .finish_non_exhaustive()
    }
}

/// A child command and the parent it is dispatched under.
#[derive(Debug, Clone)]
pub struct ChildCommand {
    pub definition: Arc<CommandDefinition>,
    pub parent: Arc<CommandDefinition>,
}

impl ChildCommand {
    /// e.g. `RateYourMusic import ratings`.
    pub fn friendly_name_with_parent(&self) -> String {
        format!(
            "{} {}",
            self.parent.display_name(),
            self.definition.display_name()
        )
    }
}

/// A command owning a registry of children keyed by dispatch prefix.
#[derive(Debug, Clone)]
pub struct ParentCommand {
    pub definition: Arc<CommandDefinition>,
    children: Vec<Arc<CommandDefinition>>,
    /// Child run when no child token matches.
    pub default_child: Option<String>,
    /// Children also resolvable without the parent prefix.
    pub skip_prefix_for: Vec<String>,
    /// Minimum length for an unambiguous child-name prefix to match.
    pub abbreviation_min: Option<usize>,
}

impl ParentCommand {
    pub fn new(definition: CommandDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
            children: Vec::new(),
            default_child: None,
            skip_prefix_for: Vec::new(),
            abbreviation_min: None,
        }
    }

    pub fn child(mut self, child: CommandDefinition) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    pub fn default_child(mut self, name: impl Into<String>) -> Self {
        self.default_child = Some(name.into());
        self
    }

    pub fn skip_prefix_for(mut self, name: impl Into<String>) -> Self {
        self.skip_prefix_for.push(name.into());
        self
    }

    pub fn abbreviations(mut self, min_len: usize) -> Self {
        self.abbreviation_min = Some(min_len.max(1));
        self
    }

    pub fn children(&self) -> &[Arc<CommandDefinition>] {
        &self.children
    }

    fn wrap(&self, child: &Arc<CommandDefinition>) -> ChildCommand {
        ChildCommand {
            definition: Arc::clone(child),
            parent: Arc::clone(&self.definition),
        }
    }

    fn skips_prefix(&self, child: &CommandDefinition) -> bool {
        self.skip_prefix_for
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&child.name))
    }

    fn find_child(&self, name: &str) -> Option<&Arc<CommandDefinition>> {
        self.children
            .iter()
            .find(|c| c.names().any(|n| n.eq_ignore_ascii_case(name)))
    }

    /// Match a child by name, then alias, then variation, then abbreviation.
    fn match_child(&self, token: &str) -> Option<(ChildCommand, Option<&Variation>)> {
        let live = || self.children.iter().filter(|c| !c.archived);

        if let Some(child) = live().find(|c| c.answers_to_name(token)) {
            return Some((self.wrap(child), None));
        }
        if let Some(child) = live().find(|c| c.answers_to_alias(token)) {
            return Some((self.wrap(child), None));
        }
        for child in live() {
            if let Some(variation) = child.variation_for(token) {
                return Some((self.wrap(child), Some(variation)));
            }
        }

        let min = self.abbreviation_min?;
        if token.len() < min {
            return None;
        }
        let lowered = token.to_lowercase();
        let mut candidates = live().filter(|c| c.name.to_lowercase().starts_with(&lowered));
        let first = candidates.next()?;
        if candidates.next().is_some() {
            return None;
        }
        Some((self.wrap(first), None))
    }
}

/// A node in the command tree.
#[derive(Debug, Clone)]
pub enum CommandNode {
    Leaf(Arc<CommandDefinition>),
    Parent(ParentCommand),
    Child(ChildCommand),
}

impl CommandNode {
    /// The definition that runs for this node.
    pub fn definition(&self) -> &Arc<CommandDefinition> {
        match self {
            CommandNode::Leaf(def) => def,
            CommandNode::Parent(parent) => &parent.definition,
            CommandNode::Child(child) => &child.definition,
        }
    }

    pub fn parent(&self) -> Option<&Arc<CommandDefinition>> {
        match self {
            CommandNode::Child(child) => Some(&child.parent),
            _ => None,
        }
    }

    /// Display name including the parent for children.
    pub fn friendly_name_with_parent(&self) -> String {
        match self {
            CommandNode::Child(child) => child.friendly_name_with_parent(),
            other => other.definition().display_name().to_string(),
        }
    }
}

impl From<CommandDefinition> for CommandNode {
    fn from(definition: CommandDefinition) -> Self {
        CommandNode::Leaf(Arc::new(definition))
    }
}

impl From<ParentCommand> for CommandNode {
    fn from(parent: ParentCommand) -> Self {
        CommandNode::Parent(parent)
    }
}
