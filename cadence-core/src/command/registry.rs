//! Command Registry — process-wide command table and invocation resolution.
//!
//! Built once at startup and read-only afterwards. Resolution matches the
//! first token in stages (exact name, then alias, then variation) across
//! every resolvable command, then walks into a parent's children with the
//! next token.

use super::{CommandDefinition, CommandId, CommandNode, ParentCommand, Variation};
use crate::error::{CommandError, RegistryError};
use crate::tokenizer::{RunAs, Tokenizer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// The outcome of resolving an invocation.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub node: CommandNode,
    /// Literal tokens that selected the command.
    pub consumed: Vec<String>,
    pub variation: Option<Variation>,
    pub run_as: RunAs,
}

impl Resolution {
    pub fn command(&self) -> &Arc<CommandDefinition> {
        self.node.definition()
    }

    pub fn parent(&self) -> Option<&Arc<CommandDefinition>> {
        self.node.parent()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Name,
    Alias,
    Variation,
}

/// Registry holding every command node.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    nodes: Vec<CommandNode>,
    by_id: HashMap<CommandId, CommandNode>,
    names: HashSet<String>,
    tokenizer: Tokenizer,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a leaf or parent command.
    ///
    /// Fails on an empty seed, an id collision or a name/alias already taken.
    pub fn register(&mut self, node: impl Into<CommandNode>) -> Result<(), RegistryError> {
        let node = node.into();
        let mut entries: Vec<CommandNode> = vec![node.clone()];
        if let CommandNode::Parent(parent) = &node {
            entries.extend(
                parent
                    .children()
                    .iter()
                    .map(|child| CommandNode::Child(parent.wrap(child))),
            );
        }

        let mut ids = HashSet::new();
        for entry in &entries {
            let def = entry.definition();
            if def.id_seed.trim().is_empty() {
                return Err(RegistryError::EmptySeed {
                    name: def.name.clone(),
                });
            }
            let collision = self
                .by_id
                .get(&def.id)
                .map(|existing| existing.definition().name.clone())
                .or_else(|| (!ids.insert(def.id.clone())).then(|| def.name.clone()));
            if let Some(first) = collision {
                return Err(RegistryError::DuplicateId {
                    id: def.id.to_string(),
                    first,
                    second: def.name.clone(),
                });
            }
        }

        let mut new_names = HashSet::new();
        for name in Self::top_level_names(&node) {
            let lowered = name.to_lowercase();
            if self.names.contains(&lowered) || !new_names.insert(lowered) {
                return Err(RegistryError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }

        for entry in entries {
            debug!(
                command = %entry.friendly_name_with_parent(),
                command_id = %entry.definition().id,
                "Registering command"
            );
            self.by_id.insert(entry.definition().id.clone(), entry);
        }
        self.names.extend(new_names);
        self.nodes.push(node);
        Ok(())
    }

    fn top_level_names(node: &CommandNode) -> Vec<&str> {
        let mut names = Vec::new();
        if !node.definition().archived {
            names.extend(node.definition().names());
        }
        if let CommandNode::Parent(parent) = node {
            for child in parent.children() {
                if parent.skips_prefix(child) && !child.archived {
                    names.extend(child.names());
                }
            }
        }
        names
    }

    /// Resolve the text following the bot prefix to a command.
    pub fn resolve(&self, text: &str) -> Result<Resolution, CommandError> {
        let tokens = self.tokenizer.tokenize(text);
        let Some(first) = tokens.first() else {
            return Err(CommandError::not_found("Command"));
        };
        let first = first.text.as_str();

        let (node, variation) = self
            .match_top_level(first)
            .ok_or_else(|| CommandError::not_found(format!("Command `{}`", first)))?;

        let (node, consumed, variation) = match node {
            CommandNode::Parent(parent) => {
                let matched = tokens
                    .get(1)
                    .and_then(|token| parent.match_child(&token.text))
                    .map(|(child, v)| (child, v.cloned()));
                let default = parent
                    .default_child
                    .as_deref()
                    .and_then(|name| parent.find_child(name))
                    .map(|child| parent.wrap(child));
                match (matched, default) {
                    (Some((child, child_variation)), _) => (
                        CommandNode::Child(child),
                        2,
                        child_variation.or(variation),
                    ),
                    (None, Some(child)) => (CommandNode::Child(child), 1, variation),
                    (None, None) => (CommandNode::Parent(parent), 1, variation),
                }
            }
            other => (other, 1, variation),
        };

        let consumed_tokens: Vec<String> =
            tokens.iter().take(consumed).map(|t| t.text.clone()).collect();
        let variation_markers = match &variation {
            Some(v) => {
                let mut markers = vec![v.name.clone()];
                markers.extend(
                    consumed_tokens
                        .iter()
                        .filter(|t| v.matches(t))
                        .cloned(),
                );
                markers
            }
            None => Vec::new(),
        };
        let run_as = self.tokenizer.run_as(text, consumed, variation_markers);

        debug!(
            command = %node.friendly_name_with_parent(),
            consumed = consumed,
            variation = ?variation.as_ref().map(|v| v.name.as_str()),
            "Resolved command"
        );

        Ok(Resolution {
            node,
            consumed: consumed_tokens,
            variation,
            run_as,
        })
    }

    fn match_top_level(&self, token: &str) -> Option<(CommandNode, Option<Variation>)> {
        for stage in [Stage::Name, Stage::Alias, Stage::Variation] {
            for node in &self.nodes {
                if let Some(found) = Self::match_node(node, token, stage) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn match_node(
        node: &CommandNode,
        token: &str,
        stage: Stage,
    ) -> Option<(CommandNode, Option<Variation>)> {
        let def = node.definition();
        if !def.archived {
            if let Some(variation) = Self::match_definition(def, token, stage) {
                return Some((node.clone(), variation));
            }
        }
        if let CommandNode::Parent(parent) = node {
            for child in parent.children() {
                if child.archived || !parent.skips_prefix(child) {
                    continue;
                }
                if let Some(variation) = Self::match_definition(child, token, stage) {
                    return Some((CommandNode::Child(parent.wrap(child)), variation));
                }
            }
        }
        None
    }

    /// `Some(variation)` when `def` answers to `token` at `stage`.
    fn match_definition(
        def: &CommandDefinition,
        token: &str,
        stage: Stage,
    ) -> Option<Option<Variation>> {
        match stage {
            Stage::Name => def.answers_to_name(token).then_some(None),
            Stage::Alias => def.answers_to_alias(token).then_some(None),
            Stage::Variation => def.variation_for(token).map(|v| Some(v.clone())),
        }
    }

    /// Look up any command, archived ones included, by its stable id.
    pub fn find_by_id(&self, id: &CommandId) -> Option<&CommandNode> {
        self.by_id.get(id)
    }

    /// Look up a top-level command by name or alias.
    pub fn lookup(&self, name: &str) -> Option<&CommandNode> {
        self.nodes.iter().find(|node| {
            let def = node.definition();
            def.answers_to_name(name) || def.answers_to_alias(name)
        })
    }

    /// Every visible command, children included, in registration order.
    pub fn list(&self) -> Vec<CommandNode> {
        let mut listed = Vec::new();
        for node in &self.nodes {
            if node.definition().is_visible() {
                listed.push(node.clone());
            }
            if let CommandNode::Parent(parent) = node {
                listed.extend(
                    parent
                        .children()
                        .iter()
                        .filter(|child| child.is_visible())
                        .map(|child| CommandNode::Child(parent.wrap(child))),
                );
            }
        }
        listed
    }

    /// Return visible command names and aliases starting with `prefix`.
    pub fn completions(&self, prefix: &str) -> Vec<&str> {
        let prefix = prefix.to_lowercase();
        let mut results: Vec<&str> = self
            .nodes
            .iter()
            .map(CommandNode::definition)
            .filter(|def| def.is_visible())
            .flat_map(|def| def.names())
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .collect();
        results.sort();
        results
    }

    /// Suggest the closest visible command name for an unknown input using edit distance.
    pub fn suggest(&self, input: &str) -> Option<&str> {
        let input = input.to_lowercase();
        let mut best: Option<(&str, usize)> = None;

        for def in self.nodes.iter().map(CommandNode::definition) {
            if !def.is_visible() {
                continue;
            }
            for name in def.names() {
                let dist = edit_distance(&input, &name.to_lowercase());
                if dist <= 2 && best.is_none_or(|(_, d)| dist < d) {
                    best = Some((name, dist));
                }
            }
        }

        best.map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Simple Levenshtein edit distance for command suggestions.
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();

    let mut prev = (0..=b_len).collect::<Vec<_>>();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::leaf;
    use pretty_assertions::assert_eq;

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry
            .register(leaf("scrobbles", "scrobbles").alias("s"))
            .unwrap();
        registry
            .register(
                leaf("nowplaying", "nowplaying")
                    .alias("np")
                    .variation(Variation::new("fm", &["fm", "fmx"])),
            )
            .unwrap();
        registry
            .register(leaf("old-stats", "stats").archived())
            .unwrap();
        registry
            .register(
                ParentCommand::new(leaf("rym-parent", "rateyourmusic").alias("rym"))
                    .child(leaf("rym-import", "importratings").alias("import"))
                    .child(leaf("rym-help", "help"))
                    .child(leaf("rym-link", "link"))
                    .skip_prefix_for("importratings")
                    .default_child("help")
                    .abbreviations(3),
            )
            .unwrap();
        registry
            .register(
                ParentCommand::new(leaf("perm-parent", "permissions"))
                    .child(leaf("perm-view", "view")),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_name_and_alias_resolve_to_same_id() {
        let registry = registry();
        let by_name = registry.resolve("scrobbles week").unwrap();
        let by_alias = registry.resolve("S week").unwrap();
        assert_eq!(by_name.command().id, by_alias.command().id);
        assert_eq!(by_alias.run_as.args_text(), "week");
        assert_eq!(by_alias.consumed, vec!["S".to_string()]);
    }

    #[test]
    fn test_unknown_is_not_found() {
        let err = registry().resolve("scrobblez").unwrap_err();
        assert_eq!(err, CommandError::not_found("Command `scrobblez`"));
        assert!(err.is_client_facing());
        assert!(registry().resolve("   ").is_err());
    }

    #[test]
    fn test_variation_marks_run_as() {
        let resolution = registry().resolve("FMX lfm:joe").unwrap();
        assert_eq!(resolution.command().name, "nowplaying");
        assert_eq!(resolution.variation.map(|v| v.name), Some("fm".to_string()));
        assert!(resolution.run_as.variation_was_used("fm"));
        assert!(resolution.run_as.variation_was_used("fmx"));
        assert_eq!(resolution.run_as.args_text(), "lfm:joe");
    }

    #[test]
    fn test_archived_commands_unresolvable_but_addressable() {
        let registry = registry();
        assert!(registry.resolve("stats").is_err());
        let id = CommandId::from_seed("old-stats");
        assert_eq!(
            registry.find_by_id(&id).map(|n| n.definition().name.as_str()),
            Some("stats")
        );
    }

    #[test]
    fn test_parent_child_resolution() {
        let registry = registry();
        let resolution = registry.resolve("rym import file.csv").unwrap();
        assert_eq!(resolution.command().name, "importratings");
        assert_eq!(
            resolution.parent().map(|p| p.name.as_str()),
            Some("rateyourmusic")
        );
        assert_eq!(resolution.run_as.command_path(), "rym import");
        assert_eq!(resolution.run_as.args_text(), "file.csv");
    }

    #[test]
    fn test_skip_prefix_child_at_top_level() {
        let resolution = registry().resolve("importratings file.csv").unwrap();
        assert_eq!(resolution.command().name, "importratings");
        assert!(matches!(resolution.node, CommandNode::Child(_)));
        assert_eq!(resolution.run_as.args_text(), "file.csv");
        assert!(registry().resolve("link").is_err());
    }

    #[test]
    fn test_default_child_and_abbreviation() {
        let registry = registry();
        let resolution = registry.resolve("rym whatever").unwrap();
        assert_eq!(resolution.command().name, "help");
        assert_eq!(resolution.run_as.args_text(), "whatever");

        let resolution = registry.resolve("rym lin").unwrap();
        assert_eq!(resolution.command().name, "link");
    }

    #[test]
    fn test_parent_without_default_runs_itself() {
        let resolution = registry().resolve("permissions").unwrap();
        assert!(matches!(resolution.node, CommandNode::Parent(_)));
        let resolution = registry().resolve("permissions view").unwrap();
        assert_eq!(resolution.command().name, "view");
    }

    #[test]
    fn test_name_stage_beats_alias_stage() {
        let mut registry = CommandRegistry::new();
        registry.register(leaf("a", "artist").alias("a")).unwrap();
        registry.register(leaf("b", "albums").alias("al")).unwrap();
        registry.register(leaf("c", "al")).unwrap_err();
        let mut registry = CommandRegistry::new();
        registry.register(leaf("x", "xp").variation(Variation::new("v", &["top"]))).unwrap();
        registry.register(leaf("y", "tops").alias("top2")).unwrap();
        registry.register(leaf("z", "top")).unwrap();
        assert_eq!(registry.resolve("top").unwrap().command().name, "top");
    }

    #[test]
    fn test_duplicate_seed_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register(leaf("same", "one")).unwrap();
        let err = registry.register(leaf("same", "two")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId { .. }));
        let err = registry.register(leaf("  ", "three")).unwrap_err();
        assert!(matches!(err, RegistryError::EmptySeed { .. }));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register(leaf("one", "scrobbles").alias("s")).unwrap();
        let err = registry.register(leaf("two", "search").alias("S")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { name } if name == "S"));
    }

    #[test]
    fn test_listing_and_suggestions() {
        let mut registry = registry();
        registry
            .register(leaf("secret", "hidden").secret())
            .unwrap();
        let listed: Vec<String> = registry
            .list()
            .iter()
            .map(CommandNode::friendly_name_with_parent)
            .collect();
        assert!(listed.contains(&"rateyourmusic importratings".to_string()));
        assert!(!listed.contains(&"hidden".to_string()));
        assert!(!listed.contains(&"stats".to_string()));

        assert_eq!(registry.suggest("scrobles"), Some("scrobbles"));
        assert_eq!(registry.suggest("hiden"), None);
        assert_eq!(registry.completions("n"), vec!["nowplaying", "np"]);
        assert!(registry.lookup("RYM").is_some());
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }
}
