//! Mention extraction — references to actors inside the argument text.
//!
//! A mention slot first looks for a platform-native reference (`<@123>` or
//! `<@!123>`), then falls back to an optional non-platform parser such as
//! `lfm:username` or `id:123`.

use super::Index;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What a mention token refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MentionTarget {
    /// A platform-native user reference.
    Platform { id: String },
    /// A raw platform id typed out by hand.
    PlatformId(String),
    /// A platform username or nickname to look up in the server.
    PlatformUsername(String),
    /// A username on the scrobble service.
    RemoteUsername(String),
}

impl MentionTarget {
    /// The platform id when the target names one directly.
    pub fn platform_id(&self) -> Option<&str> {
        match self {
            MentionTarget::Platform { id } | MentionTarget::PlatformId(id) => Some(id),
            _ => None,
        }
    }
}

/// Parses tokens that are not platform-native mentions.
pub trait MentionParser: Send + Sync + fmt::Debug {
    fn parse(&self, token: &str) -> Option<MentionTarget>;

    /// Whether a matched token is removed before inputs are extracted.
    ///
    /// Parsers that accept bare words return `false` so the same token can
    /// still be read as an input (e.g. an artist name).
    fn consumes_token(&self) -> bool {
        true
    }
}

/// Parse `<@123>` / `<@!123>` into the platform id.
pub fn parse_platform_mention(token: &str) -> Option<String> {
    let inner = token.strip_prefix("<@")?.strip_suffix('>')?;
    let id = inner.strip_prefix('!').unwrap_or(inner);
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

fn strip_tag<'a>(token: &'a str, tag: &str) -> Option<&'a str> {
    let (head, rest) = token.split_at_checked(tag.len())?;
    if head.eq_ignore_ascii_case(tag) && !rest.is_empty() {
        Some(rest)
    } else {
        None
    }
}

/// `lfm:username`
#[derive(Debug, Clone, Default)]
pub struct RemoteUsernameMention;

impl MentionParser for RemoteUsernameMention {
    fn parse(&self, token: &str) -> Option<MentionTarget> {
        strip_tag(token, "lfm:").map(|name| MentionTarget::RemoteUsername(name.to_string()))
    }
}

/// `id:123456`
#[derive(Debug, Clone, Default)]
pub struct PlatformIdMention;

impl MentionParser for PlatformIdMention {
    fn parse(&self, token: &str) -> Option<MentionTarget> {
        let id = strip_tag(token, "id:")?;
        if id.chars().all(|c| c.is_ascii_digit()) {
            Some(MentionTarget::PlatformId(id.to_string()))
        } else {
            None
        }
    }
}

/// `u:nickname`
#[derive(Debug, Clone, Default)]
pub struct PlatformUsernameMention;

impl MentionParser for PlatformUsernameMention {
    fn parse(&self, token: &str) -> Option<MentionTarget> {
        strip_tag(token, "u:")
            .map(|name| MentionTarget::PlatformUsername(name.to_lowercase()))
    }
}

/// Any plain word is a scrobble-service username. Does not consume the token.
#[derive(Debug, Clone, Default)]
pub struct BareUsernameMention;

impl MentionParser for BareUsernameMention {
    fn parse(&self, token: &str) -> Option<MentionTarget> {
        let valid = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| MentionTarget::RemoteUsername(token.to_string()))
    }

    fn consumes_token(&self) -> bool {
        false
    }
}

/// A named reference to an actor.
#[derive(Debug, Clone)]
pub struct MentionSpec {
    pub index: Index,
    pub description: String,
    /// Accept platform-native `<@id>` references.
    pub platform: bool,
    pub parser: Option<Arc<dyn MentionParser>>,
}

impl MentionSpec {
    pub fn new(index: Index, description: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
            platform: true,
            parser: None,
        }
    }

    pub fn with_parser(mut self, parser: impl MentionParser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Only accept what the non-platform parser recognises.
    pub fn parser_only(mut self) -> Self {
        self.platform = false;
        self
    }

    /// Try to read `token` as this mention. Returns the target and whether the token is consumed.
    pub fn parse_token(&self, token: &str) -> Option<(MentionTarget, bool)> {
        if self.platform {
            if let Some(id) = parse_platform_mention(token) {
                return Some((MentionTarget::Platform { id }, true));
            }
        }
        let parser = self.parser.as_ref()?;
        parser
            .parse(token)
            .map(|target| (target, parser.consumes_token()))
    }
}

/// The mention set most stats commands accept, each matching anywhere in the text.
pub fn standard_mentions() -> Vec<(String, MentionSpec)> {
    vec![
        (
            "user".to_string(),
            MentionSpec::new(Index::From(0), "The user to lookup"),
        ),
        (
            "lfmUser".to_string(),
            MentionSpec::new(Index::From(0), "The last.fm username to lookup")
                .with_parser(RemoteUsernameMention)
                .parser_only(),
        ),
        (
            "userID".to_string(),
            MentionSpec::new(Index::From(0), "The user id to lookup")
                .with_parser(PlatformIdMention)
                .parser_only(),
        ),
        (
            "discordUsername".to_string(),
            MentionSpec::new(Index::From(0), "The server nickname to lookup")
                .with_parser(PlatformUsernameMention)
                .parser_only(),
        ),
    ]
}
