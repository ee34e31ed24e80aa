//! Flag extraction — boolean switches recognised anywhere in the text.
//!
//! Flags are matched as whole whitespace-bounded tokens (`--long` or `-short`,
//! case-insensitive) and removed before positional parsing, so input indices
//! never see them.

use std::collections::BTreeMap;

/// A named boolean switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSpec {
    pub description: String,
    pub long_names: Vec<String>,
    pub short_names: Vec<String>,
}

impl FlagSpec {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn long(mut self, name: impl Into<String>) -> Self {
        self.long_names.push(name.into());
        self
    }

    pub fn short(mut self, name: impl Into<String>) -> Self {
        self.short_names.push(name.into());
        self
    }

    /// Whether a single token spells this flag.
    pub fn matches(&self, token: &str) -> bool {
        if let Some(long) = token.strip_prefix("--") {
            return self
                .long_names
                .iter()
                .any(|n| !n.is_empty() && n.eq_ignore_ascii_case(long));
        }
        if let Some(short) = token.strip_prefix('-') {
            return self
                .short_names
                .iter()
                .any(|n| !n.is_empty() && n.eq_ignore_ascii_case(short));
        }
        false
    }
}

/// The implicit flag every command accepts.
pub fn debug_flag() -> FlagSpec {
    FlagSpec::new("Developer only").long("debug")
}

/// Result of stripping flags from text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFlags {
    /// Input text with every flag token removed, remaining tokens joined by one space.
    pub text: String,
    /// Every declared flag plus `debug`, present or not.
    pub flags: BTreeMap<String, bool>,
}

/// Finds and removes flag tokens.
#[derive(Debug, Clone, Default)]
pub struct FlagParser;

impl FlagParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_and_remove(&self, text: &str, flags: &[(String, FlagSpec)]) -> ExtractedFlags {
        let debug = debug_flag();
        let mut specs: Vec<(&str, &FlagSpec)> =
            flags.iter().map(|(name, spec)| (name.as_str(), spec)).collect();
        if !specs.iter().any(|(name, _)| *name == "debug") {
            specs.push(("debug", &debug));
        }

        let mut remaining: Vec<&str> = text.split_whitespace().collect();
        let mut found = BTreeMap::new();

        for (name, spec) in specs {
            let before = remaining.len();
            remaining.retain(|token| !spec.matches(token));
            found.insert(name.to_string(), remaining.len() != before);
        }

        ExtractedFlags {
            text: remaining.join(" "),
            flags: found,
        }
    }

    /// Whether any token of `text` spells one of `flags`.
    pub fn has_any(&self, text: &str, flags: &[(String, FlagSpec)]) -> bool {
        text.split_whitespace()
            .any(|token| flags.iter().any(|(_, spec)| spec.matches(token)))
    }
}
