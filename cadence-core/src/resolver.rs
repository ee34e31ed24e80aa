//! Mention resolver — turns parsed user references into identities.
//!
//! Invoked explicitly by commands that need a target user; the pipeline
//! never calls it on its own because commands disagree about which identity
//! requirements apply.

use crate::arguments::{MentionTarget, ParsedArguments};
use crate::error::{CommandError, UnregisteredReason};
use crate::perspective::Perspective;
use crate::services::{
    AnalyticsIdentity, AnalyticsIdentityService, IdentityStore, InboundMessage, LocalIdentity,
    PlatformDirectory, PlatformUser,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which identity requirements a command places on resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// The sender must have a linked username even when someone else is targeted.
    pub sender_required: bool,
    /// Resolution fails unless some username is found.
    pub username_required: bool,
    pub user_argument: String,
    pub input_argument: String,
    pub remote_mention_argument: String,
    pub id_mention_argument: String,
    pub platform_username_argument: String,
    /// Wrap third-person names in backticks.
    pub as_code: bool,
    pub fetch_platform_user: bool,
    pub fetch_analytics_identity: bool,
    /// A bare remote username must belong to a local identity.
    pub reverse_lookup_required: bool,
    /// The sender must hold a session credential.
    pub authentication_required: bool,
    /// Both sender and target must have been indexed.
    pub require_indexed: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            sender_required: false,
            username_required: true,
            user_argument: "user".to_string(),
            input_argument: "username".to_string(),
            remote_mention_argument: "lfmUser".to_string(),
            id_mention_argument: "userID".to_string(),
            platform_username_argument: "discordUsername".to_string(),
            as_code: true,
            fetch_platform_user: false,
            fetch_analytics_identity: false,
            reverse_lookup_required: false,
            authentication_required: false,
            require_indexed: false,
        }
    }
}

/// What a remote-service call should authenticate as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requestable {
    Username(String),
    Session {
        username: String,
        session_key: String,
    },
}

impl Requestable {
    fn for_identity(username: &str, identity: Option<&LocalIdentity>) -> Self {
        match identity.and_then(|i| i.session_key.clone()) {
            Some(session_key) => Requestable::Session {
                username: username.to_string(),
                session_key,
            },
            None => Requestable::Username(username.to_string()),
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Requestable::Username(username) | Requestable::Session { username, .. } => username,
        }
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMentions {
    pub sender_username: Option<String>,
    /// The mentioned user's username if present, else the sender's.
    pub username: Option<String>,
    pub sender_requestable: Option<Requestable>,
    pub requestable: Option<Requestable>,
    pub perspective: Perspective,
    pub sender_identity: Option<LocalIdentity>,
    pub mentioned_identity: Option<LocalIdentity>,
    pub platform_user: Option<PlatformUser>,
    pub analytics_identity: Option<AnalyticsIdentity>,
    /// Whether someone other than the sender was referenced.
    pub mentioned: bool,
}

#[derive(Debug, Default)]
struct Mentioned {
    username: Option<String>,
    identity: Option<LocalIdentity>,
    platform_id: Option<String>,
    referenced: bool,
}

/// Resolves mentions against the identity collaborators.
#[derive(Clone)]
pub struct MentionResolver {
    identities: Arc<dyn IdentityStore>,
    directory: Option<Arc<dyn PlatformDirectory>>,
    analytics: Option<Arc<dyn AnalyticsIdentityService>>,
    prefix: String,
    login_command: String,
    reply_bot_names: Vec<String>,
}

impl MentionResolver {
    pub fn new(identities: Arc<dyn IdentityStore>, prefix: impl Into<String>) -> Self {
        Self {
            identities,
            directory: None,
            analytics: None,
            prefix: prefix.into(),
            login_command: "login".to_string(),
            reply_bot_names: Vec::new(),
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn PlatformDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsIdentityService>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn with_login_command(mut self, command: impl Into<String>) -> Self {
        self.login_command = command.into();
        self
    }

    /// Bots whose reply mentions redirect to the next mention. Empty means any bot.
    pub fn with_reply_bot_names(mut self, names: Vec<String>) -> Self {
        self.reply_bot_names = names;
        self
    }

    pub async fn resolve(
        &self,
        args: &ParsedArguments,
        message: &InboundMessage,
        options: &ResolverOptions,
    ) -> Result<ResolvedMentions, CommandError> {
        let sender_identity = self.identities.get_user(&message.author.id).await?;
        let sender_username = sender_identity
            .as_ref()
            .and_then(|i| i.remote_username.clone());

        let mentioned = self.resolve_mentioned(args, message, options).await?;

        if options.sender_required && sender_username.is_none() {
            return Err(self.not_logged_in());
        }

        let username = mentioned.username.clone().or_else(|| sender_username.clone());
        if options.username_required && username.is_none() {
            return Err(self.not_logged_in());
        }

        if options.authentication_required
            && sender_identity
                .as_ref()
                .and_then(|i| i.session_key.as_ref())
                .is_none()
        {
            return Err(CommandError::Unregistered(
                UnregisteredReason::SenderNotAuthenticated {
                    prefix: self.prefix.clone(),
                },
            ));
        }

        if options.require_indexed {
            if !sender_identity.as_ref().is_some_and(LocalIdentity::is_indexed) {
                return Err(CommandError::Unregistered(
                    UnregisteredReason::SenderNotIndexed {
                        prefix: self.prefix.clone(),
                    },
                ));
            }
            if mentioned.referenced
                && !mentioned
                    .identity
                    .as_ref()
                    .is_some_and(LocalIdentity::is_indexed)
            {
                return Err(CommandError::Unregistered(
                    UnregisteredReason::MentionedNotIndexed {
                        prefix: self.prefix.clone(),
                    },
                ));
            }
        }

        let sender_requestable = sender_username
            .as_deref()
            .map(|u| Requestable::for_identity(u, sender_identity.as_ref()));
        let target_identity = if mentioned.referenced {
            mentioned.identity.as_ref()
        } else {
            sender_identity.as_ref()
        };
        let requestable = username
            .as_deref()
            .map(|u| Requestable::for_identity(u, target_identity));

        let platform_user = match (&mentioned.platform_id, options.fetch_platform_user) {
            (Some(id), true) => self.fetch_platform_user(id).await,
            (None, true) => Some(message.author.clone()),
            _ => None,
        };

        let analytics_identity = match (&username, options.fetch_analytics_identity) {
            (Some(username), true) => self.fetch_analytics_identity(username).await,
            _ => None,
        };

        let sender_name = sender_username
            .as_deref()
            .unwrap_or(&message.author.username);
        let target_name = username.as_deref().unwrap_or(sender_name);
        let mut perspective = Perspective::build(sender_name, target_name, options.as_code);
        if let (Some(user), true) = (&platform_user, mentioned.referenced) {
            perspective = perspective.with_platform_user(user.name());
        }

        debug!(
            sender = ?sender_username,
            target = ?username,
            mentioned = mentioned.referenced,
            "Resolved mentions"
        );

        Ok(ResolvedMentions {
            sender_username,
            username,
            sender_requestable,
            requestable,
            perspective,
            sender_identity,
            mentioned_identity: mentioned.identity,
            platform_user,
            analytics_identity,
            mentioned: mentioned.referenced,
        })
    }

    async fn resolve_mentioned(
        &self,
        args: &ParsedArguments,
        message: &InboundMessage,
        options: &ResolverOptions,
    ) -> Result<Mentioned, CommandError> {
        if let Some(MentionTarget::RemoteUsername(name)) =
            args.mention(&options.remote_mention_argument)
        {
            return self.resolve_remote_username(name, options).await;
        }

        if let Some(platform_id) = self.platform_id_from_args(args, message, options).await? {
            let identity = self.identities.get_user(&platform_id).await?;
            let username = identity.as_ref().and_then(|i| i.remote_username.clone());
            if username.is_none() && options.username_required {
                return Err(CommandError::Unregistered(
                    UnregisteredReason::MentionedNotRegistered,
                ));
            }
            return Ok(Mentioned {
                username,
                identity,
                platform_id: Some(platform_id),
                referenced: true,
            });
        }

        if let Some(name) = args.text(&options.input_argument) {
            return self.resolve_remote_username(name, options).await;
        }

        Ok(Mentioned::default())
    }

    async fn resolve_remote_username(
        &self,
        name: &str,
        options: &ResolverOptions,
    ) -> Result<Mentioned, CommandError> {
        let identity = if options.reverse_lookup_required || options.require_indexed {
            self.identities.get_user_by_remote_username(name).await?
        } else {
            None
        };
        if options.reverse_lookup_required && identity.is_none() {
            return Err(CommandError::ReverseLookupFailed {
                username: name.to_string(),
                register_command: format!("{}{}", self.prefix, self.login_command),
            });
        }
        Ok(Mentioned {
            username: Some(name.to_string()),
            platform_id: identity.as_ref().map(|i| i.platform_id.clone()),
            identity,
            referenced: true,
        })
    }

    async fn platform_id_from_args(
        &self,
        args: &ParsedArguments,
        message: &InboundMessage,
        options: &ResolverOptions,
    ) -> Result<Option<String>, CommandError> {
        if let Some(id) = args
            .mention(&options.user_argument)
            .and_then(MentionTarget::platform_id)
        {
            return Ok(self.redirect_reply_mention(id, message));
        }

        if let Some(id) = args
            .mention(&options.id_mention_argument)
            .and_then(MentionTarget::platform_id)
        {
            return Ok(Some(id.to_string()));
        }

        if let Some(MentionTarget::PlatformUsername(name)) =
            args.mention(&options.platform_username_argument)
        {
            let (Some(directory), Some(guild_id)) = (&self.directory, &message.guild_id) else {
                return Ok(None);
            };
            return match directory.find_member(guild_id, name).await? {
                Some(member) => Ok(Some(member.id)),
                None => Err(CommandError::not_found(format!("A member named `{}`", name))),
            };
        }

        Ok(None)
    }

    /// A reply to a recognised bot mentions that bot; use the next mention instead.
    fn redirect_reply_mention(&self, id: &str, message: &InboundMessage) -> Option<String> {
        let Some(reply_author) = &message.reply_to else {
            return Some(id.to_string());
        };
        if reply_author.id != id || !self.is_recognised_bot(reply_author) {
            return Some(id.to_string());
        }
        let next = message
            .mentions
            .iter()
            .find(|user| user.id != reply_author.id)
            .map(|user| user.id.clone());
        debug!(bot = %reply_author.username, next = ?next, "Redirected reply mention");
        next
    }

    fn is_recognised_bot(&self, user: &PlatformUser) -> bool {
        user.bot
            && (self.reply_bot_names.is_empty()
                || self
                    .reply_bot_names
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(&user.username)))
    }

    async fn fetch_platform_user(&self, platform_id: &str) -> Option<PlatformUser> {
        let directory = self.directory.as_ref()?;
        match directory.fetch_user(platform_id).await {
            Ok(user) => user,
            Err(e) => {
                warn!(platform_id, error = %e, "Failed to fetch platform user");
                None
            }
        }
    }

    async fn fetch_analytics_identity(&self, username: &str) -> Option<AnalyticsIdentity> {
        let analytics = self.analytics.as_ref()?;
        match analytics.get_identity(username).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(username, error = %e, "Failed to fetch analytics identity");
                None
            }
        }
    }

    fn not_logged_in(&self) -> CommandError {
        CommandError::Unregistered(UnregisteredReason::SenderNotLoggedIn {
            prefix: self.prefix.clone(),
        })
    }
}

impl std::fmt::Debug for MentionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentionResolver")
            .field("prefix", &self.prefix)
            .field("directory", &self.directory.is_some())
            .field("analytics", &self.analytics.is_some())
            .finish()
    }
}
