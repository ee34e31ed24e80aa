//! # Arguments
//!
//! Declarative per-command argument schemas and the parser that consumes a
//! `RunAs` against them. A schema has three independent slot kinds:
//! positional `inputs`, actor `mentions`, and boolean `flags`.

pub mod custom;
pub mod flags;
pub mod mentions;
pub mod parser;

pub use flags::{FlagParser, FlagSpec, debug_flag};
pub use mentions::{
    MentionParser, MentionSpec, MentionTarget, PlatformIdMention, PlatformUsernameMention,
    RemoteUsernameMention, BareUsernameMention, parse_platform_mention, standard_mentions,
};
pub use parser::ArgumentParser;

use regex::Regex;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Where a slot reads from in the cleaned token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// Exactly one item.
    At(usize),
    /// From this item to the end (`{start}`).
    From(usize),
    /// Inclusive range of items.
    Range { start: usize, stop: usize },
    /// The whole cleaned text; intended for custom transforms.
    FreeText,
}

impl Default for Index {
    fn default() -> Self {
        Index::At(0)
    }
}

impl Index {
    /// Select from `items`, joining multi-item selections with `joiner`.
    pub fn select(&self, items: &[String], joiner: &str) -> Option<String> {
        let selected: &[String] = match *self {
            Index::At(n) => return items.get(n).cloned(),
            Index::From(n) if n < items.len() => &items[n..],
            Index::Range { start, stop } if start < items.len() && start <= stop => {
                &items[start..=stop.min(items.len() - 1)]
            }
            Index::FreeText => items,
            _ => return None,
        };
        if selected.is_empty() {
            None
        } else {
            Some(selected.join(joiner))
        }
    }

    /// Positions this index covers within `len` items.
    pub fn positions(&self, len: usize) -> std::ops::Range<usize> {
        match *self {
            Index::At(n) if n < len => n..n + 1,
            Index::From(n) if n < len => n..len,
            Index::Range { start, stop } if start < len && start <= stop => {
                start..(stop + 1).min(len)
            }
            Index::FreeText => 0..len,
            _ => 0..0,
        }
    }
}

/// A transform turning captured text into a value. Returning `None` means absent.
pub type CustomParser = Arc<dyn Fn(&str) -> Option<ArgValue> + Send + Sync>;

/// A named positional value.
#[derive(Clone, Default)]
pub struct InputSpec {
    pub index: Index,
    pub split_on: Option<String>,
    pub regex: Option<Regex>,
    pub custom: Option<CustomParser>,
    pub default: Option<ArgValue>,
    pub number: bool,
}

impl InputSpec {
    pub fn at(index: usize) -> Self {
        Self {
            index: Index::At(index),
            ..Default::default()
        }
    }

    pub fn starting_at(start: usize) -> Self {
        Self {
            index: Index::From(start),
            ..Default::default()
        }
    }

    pub fn range(start: usize, stop: usize) -> Self {
        Self {
            index: Index::Range { start, stop },
            ..Default::default()
        }
    }

    pub fn free_text() -> Self {
        Self {
            index: Index::FreeText,
            ..Default::default()
        }
    }

    pub fn split_on(mut self, delimiter: impl Into<String>) -> Self {
        self.split_on = Some(delimiter.into());
        self
    }

    pub fn regex(mut self, regex: Regex) -> Self {
        self.regex = Some(regex);
        self
    }

    pub fn custom<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> Option<ArgValue> + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(parser));
        self
    }

    pub fn default_value(mut self, value: impl Into<ArgValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn number(mut self) -> Self {
        self.number = true;
        self
    }
}

impl fmt::Debug for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSpec")
            .field("index", &self.index)
            .field("split_on", &self.split_on)
            .field("regex", &self.regex.as_ref().map(|r| r.as_str()))
            .field("custom", &self.custom.is_some())
            .field("default", &self.default)
            .field("number", &self.number)
            .finish()
    }
}

/// A command's declared argument schema.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub inputs: Vec<(String, InputSpec)>,
    pub mentions: Vec<(String, MentionSpec)>,
    pub flags: Vec<(String, FlagSpec)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, name: impl Into<String>, spec: InputSpec) -> Self {
        self.inputs.push((name.into(), spec));
        self
    }

    pub fn mention(mut self, name: impl Into<String>, spec: MentionSpec) -> Self {
        self.mentions.push((name.into(), spec));
        self
    }

    pub fn flag(mut self, name: impl Into<String>, spec: FlagSpec) -> Self {
        self.flags.push((name.into(), spec));
        self
    }

    /// Add the standard `user`, `lfmUser`, `userID` and `discordUsername` mentions.
    pub fn with_standard_mentions(mut self) -> Self {
        self.mentions.extend(standard_mentions());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.mentions.is_empty() && self.flags.is_empty()
    }
}

/// A resolved argument value.
#[derive(Clone)]
pub enum ArgValue {
    Text(String),
    List(Vec<String>),
    Number(f64),
    Bool(bool),
    Mention(MentionTarget),
    Custom(Arc<dyn Any + Send + Sync>),
}

impl ArgValue {
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        ArgValue::Custom(Arc::new(value))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ArgValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_mention(&self) -> Option<&MentionTarget> {
        match self {
            ArgValue::Mention(m) => Some(m),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            ArgValue::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ArgValue::List(items) => f.debug_tuple("List").field(items).finish(),
            ArgValue::Number(n) => f.debug_tuple("Number").field(n).finish(),
            ArgValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            ArgValue::Mention(m) => f.debug_tuple("Mention").field(m).finish(),
            ArgValue::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for ArgValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ArgValue::Text(a), ArgValue::Text(b)) => a == b,
            (ArgValue::List(a), ArgValue::List(b)) => a == b,
            (ArgValue::Number(a), ArgValue::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (ArgValue::Bool(a), ArgValue::Bool(b)) => a == b,
            (ArgValue::Mention(a), ArgValue::Mention(b)) => a == b,
            (ArgValue::Custom(a), ArgValue::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Text(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Number(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Number(value as f64)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(value: Vec<String>) -> Self {
        ArgValue::List(value)
    }
}

/// Values keyed by input, mention and flag name.
///
/// Flags are always present (absent on the command line means `false`);
/// inputs and mentions are present only when something was captured or defaulted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArguments {
    values: BTreeMap<String, ArgValue>,
}

impl ParsedArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgValue::as_text)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ArgValue::as_number)
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        self.get(name).and_then(ArgValue::as_list)
    }

    pub fn mention(&self, name: &str) -> Option<&MentionTarget> {
        self.get(name).and_then(ArgValue::as_mention)
    }

    /// `false` for unknown and unset flags.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).and_then(ArgValue::as_bool).unwrap_or(false)
    }

    pub fn custom<T: Any>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
