//! Configuration system for Cadence.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment. The user-level file lives at
//! `~/.config/cadence/config.toml` (platform equivalent via `directories`).

use crate::error::ConfigError;
use crate::hooks::SamplingPolicy;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the command pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Text that marks a message as an invocation.
    pub prefix: String,
    /// Platform ids that bypass rollout and dev-only gating.
    pub developers: Vec<String>,
    /// Reply "command not found" for unknown invocations instead of ignoring them.
    pub announce_unknown_commands: bool,
    pub mentions: MentionsConfig,
    pub lifecycle: LifecycleConfig,
    pub messages: MessagesConfig,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            developers: Vec::new(),
            announce_unknown_commands: false,
            mentions: MentionsConfig::default(),
            lifecycle: LifecycleConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

/// Mention resolution settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionsConfig {
    /// Bots whose reply mentions are redirected to the next mention. Empty means any bot.
    pub reply_bot_names: Vec<String>,
}

/// Run lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Reaction shown while a slow command runs.
    pub loading_reaction: String,
    /// Sampling for the post-setup identity sync.
    pub identity_sync: SamplingPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            loading_reaction: "⏳".to_string(),
            identity_sync: SamplingPolicy {
                likelihood: 0.33,
                excluded_commands: ["update", "index", "login", "logout"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
            },
        }
    }
}

/// User-facing text owned by the framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Shown for internal errors in place of any detail.
    pub unknown_error: String,
    /// Command name suggested to unregistered users, without prefix.
    pub login_command: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            unknown_error: "Something went wrong running that command, please try again later."
                .to_string(),
            login_command: "login".to_string(),
        }
    }
}

impl FrameworkConfig {
    pub fn is_developer(&self, user_id: &str) -> bool {
        self.developers.iter().any(|d| d == user_id)
    }

    /// Full login invocation, e.g. `!login`.
    pub fn login_invocation(&self) -> String {
        format!("{}{}", self.prefix, self.messages.login_command)
    }

    /// Validate the configuration and return any warnings.
    ///
    /// Returns an empty Vec if the config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.prefix.trim().is_empty() {
            warnings.push("prefix is empty, no message will be treated as a command".to_string());
        }

        if self.prefix.chars().any(char::is_whitespace) {
            warnings.push(format!(
                "prefix '{}' contains whitespace and may never match",
                self.prefix
            ));
        }

        let likelihood = self.lifecycle.identity_sync.likelihood;
        if !(0.0..=1.0).contains(&likelihood) {
            warnings.push(format!(
                "lifecycle.identity_sync.likelihood is {}, it will be clamped to 0.0..=1.0",
                likelihood
            ));
        }

        if self.developers.is_empty() {
            warnings.push("no developers configured, dev-only commands cannot run".to_string());
        }

        if self.messages.login_command.trim().is_empty() {
            warnings.push("messages.login_command is empty".to_string());
        }

        warnings
    }
}

/// Load configuration from all sources.
///
/// `explicit` must exist when given. Environment variables use the `CADENCE_`
/// prefix with `__` between nested keys (`CADENCE_MESSAGES__LOGIN_COMMAND`).
pub fn load_config(explicit: Option<&Path>) -> Result<FrameworkConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(FrameworkConfig::default()));

    // User-level config
    if let Some(dirs) = directories::ProjectDirs::from("dev", "cadence", "cadence") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("CADENCE_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = FrameworkConfig::default();
        assert_eq!(config.prefix, "!");
        assert!(!config.announce_unknown_commands);
        assert_eq!(config.lifecycle.identity_sync.likelihood, 0.33);
        assert!(config.lifecycle.identity_sync.excludes("LOGIN"));
        assert_eq!(config.login_invocation(), "!login");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = FrameworkConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: FrameworkConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = FrameworkConfig::default();
        config.developers.push("1".into());
        assert!(config.validate().is_empty());

        config.prefix = String::new();
        config.lifecycle.identity_sync.likelihood = 1.5;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("likelihood"));
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence.toml");
        std::fs::write(
            &path,
            r#"
prefix = ".fm"
developers = ["123"]

[messages]
login_command = "signin"

[lifecycle.identity_sync]
likelihood = 0.5
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.prefix, ".fm");
        assert!(config.is_developer("123"));
        assert_eq!(config.messages.login_command, "signin");
        assert_eq!(config.lifecycle.identity_sync.likelihood, 0.5);
        assert_eq!(config.lifecycle.loading_reaction, "⏳");
        assert_eq!(config.login_invocation(), ".fmsignin");
    }

    #[test]
    fn test_load_config_rejects_bad_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "announce_unknown_commands = \"maybe\"\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
