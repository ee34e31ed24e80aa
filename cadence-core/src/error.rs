//! Error types for the Cadence command pipeline.
//!
//! Uses `thiserror` for a closed taxonomy. `CommandError` is what commands,
//! the argument validator and the mention resolver raise while a command runs;
//! the lifecycle switches on its variant to decide between showing the message,
//! staying silent, or reporting an internal failure. `CadenceError` covers
//! framework-level failures outside a single run.

use std::path::PathBuf;

/// Errors raised during a single command run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("{what} not found!")]
    NotFound { what: String },

    #[error("{0}")]
    Unregistered(UnregisteredReason),

    #[error("invalid {argument}: {constraint}")]
    ValidationFailed { argument: String, constraint: String },

    #[error("{reason}")]
    PermissionDenied { reason: String },

    #[error("couldn't find anyone logged in with the username {username}")]
    ReverseLookupFailed {
        username: String,
        register_command: String,
    },

    #[error("{message}")]
    Logic {
        message: String,
        footer: Option<String>,
    },

    #[error("{0}")]
    Silent(Box<CommandError>),

    #[error("internal error: {message}")]
    Unknown { message: String },
}

/// Why an identity could not be used for a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnregisteredReason {
    #[error("please sign in with a last.fm account! (`{prefix}login`)")]
    SenderNotLoggedIn { prefix: String },

    #[error("that user isn't signed in to the bot!")]
    MentionedNotRegistered,

    #[error("this command requires you to be authenticated! (`{prefix}login`)")]
    SenderNotAuthenticated { prefix: String },

    #[error("you need to be indexed to run this command! (`{prefix}index`)")]
    SenderNotIndexed { prefix: String },

    #[error("that user needs to be indexed to run this command! (`{prefix}index`)")]
    MentionedNotIndexed { prefix: String },
}

impl CommandError {
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic {
            message: message.into(),
            footer: None,
        }
    }

    pub fn logic_with_footer(message: impl Into<String>, footer: impl Into<String>) -> Self {
        Self::Logic {
            message: message.into(),
            footer: Some(footer.into()),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Suppress the visible message while still halting the run.
    pub fn silenced(self) -> Self {
        match self {
            Self::Silent(_) => self,
            other => Self::Silent(Box::new(other)),
        }
    }

    /// Whether the message is meant for display to the invoking user.
    pub fn is_client_facing(&self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Silent(_))
    }

    /// Optional hint shown beneath the message.
    pub fn footer(&self) -> Option<String> {
        match self {
            Self::Logic { footer, .. } => footer.clone(),
            Self::Unregistered(UnregisteredReason::SenderNotLoggedIn { .. }) => {
                Some("Don't have one? You can create one at https://last.fm/join".to_string())
            }
            Self::ReverseLookupFailed {
                register_command, ..
            } => Some(format!(
                "If that's you, you can log in with {}",
                register_command
            )),
            Self::Silent(inner) => inner.footer(),
            _ => None,
        }
    }

    /// Short stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unregistered(_) => "unregistered",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::ReverseLookupFailed { .. } => "reverse_lookup_failed",
            Self::Logic { .. } => "logic",
            Self::Silent(inner) => inner.kind(),
            Self::Unknown { .. } => "unknown",
        }
    }
}

impl From<OutputError> for CommandError {
    fn from(err: OutputError) -> Self {
        Self::Unknown {
            message: err.to_string(),
        }
    }
}

impl From<ServiceError> for CommandError {
    fn from(err: ServiceError) -> Self {
        Self::Unknown {
            message: err.to_string(),
        }
    }
}

/// Top-level error type for framework operations outside a single run.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while building the command registry at startup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Command '{name}' has an empty id seed")]
    EmptySeed { name: String },

    #[error("Commands '{first}' and '{second}' share the id {id}")]
    DuplicateId {
        id: String,
        first: String,
        second: String,
    },

    #[error("Command name or alias '{name}' is registered twice")]
    DuplicateName { name: String },
}

/// Errors from the output surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to send to channel {channel_id}: {message}")]
    SendFailed { channel_id: String, message: String },

    #[error("Failed to update reaction on {message_id}: {message}")]
    ReactionFailed { message_id: String, message: String },
}

/// Errors from external collaborators (identity store, persistence, directory).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} is unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse { service: String, message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `CadenceError`.
pub type Result<T> = std::result::Result<T, CadenceError>;
