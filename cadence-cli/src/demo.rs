//! Demonstration commands and seeded in-memory collaborators.
//!
//! The numbers these commands print are derived from the username so that
//! repeated runs are stable; nothing talks to a real scrobbling service.

use async_trait::async_trait;
use cadence_core::arguments::custom::{
    TimeRange, emoji_parser, humanized_time_range_parser, time_range_parser,
};
use cadence_core::arguments::{Arguments, FlagSpec, Index, InputSpec, MentionSpec};
use cadence_core::command::{CommandContext, CommandHandler, Delegate, Variation};
use cadence_core::error::CommandError;
use cadence_core::memory::{InMemoryDirectory, InMemoryGateStore, InMemoryIdentityStore};
use cadence_core::resolver::ResolverOptions;
use cadence_core::services::{LocalIdentity, PlatformUser};
use cadence_core::validation::{self, Range, Required, Validation, ValidationRule};
use cadence_core::{CommandDefinition, CommandRegistry, ParentCommand, RolloutPolicy};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Guild id used for messages that are not direct messages.
pub const LOCAL_GUILD: &str = "local";

/// In-memory stores shared between the pipeline and the admin commands.
#[derive(Clone)]
pub struct DemoStores {
    pub identities: Arc<InMemoryIdentityStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub gates: Arc<InMemoryGateStore>,
}

impl DemoStores {
    /// Two linked users (`1` joe, `2` ana) and one unlinked user (`3` sam).
    pub fn seeded() -> Self {
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.insert(
            LocalIdentity::new("1")
                .with_username("joe_lfm")
                .with_session("demo-session")
                .indexed_at(chrono::Utc::now()),
        );
        identities.insert(LocalIdentity::new("2").with_username("ana_lfm"));

        let directory = Arc::new(InMemoryDirectory::new());
        for user in demo_users() {
            directory.add_member(LOCAL_GUILD, user.clone());
            directory.add_user(user);
        }

        Self {
            identities,
            directory,
            gates: Arc::new(InMemoryGateStore::new()),
        }
    }
}

/// Platform users known to the demo directory.
pub fn demo_users() -> Vec<PlatformUser> {
    vec![
        PlatformUser::new("1", "joe").with_display_name("Joe"),
        PlatformUser::new("2", "ana").with_display_name("Ana"),
        PlatformUser::new("3", "sam"),
    ]
}

fn stable_count(seed: &str, modulus: u64) -> u64 {
    seed.bytes()
        .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
        % modulus
}

struct Scrobbles;

#[async_trait]
impl CommandHandler for Scrobbles {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let mentions = ctx.resolve_mentions(&ResolverOptions::default()).await?;
        let username = mentions.username.unwrap_or_default();
        let period = ctx
            .args
            .custom::<TimeRange>("timeRange")
            .copied()
            .unwrap_or_default();
        let humanized = if ctx.variation_was_used("weekly") {
            "over the past week"
        } else {
            ctx.args.text("humanizedPeriod").unwrap_or("overall")
        };
        let count = if period.is_overall() && !ctx.variation_was_used("weekly") {
            stable_count(&username, 90_000) + 10_000
        } else {
            stable_count(&username, 900) + 1
        };
        ctx.reply(format!(
            "{} {} scrobbles {}",
            upper_first(&mentions.perspective.has),
            count,
            humanized
        ))
        .await?;
        Ok(())
    }
}

fn upper_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

struct Rank;

#[async_trait]
impl CommandHandler for Rank {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let rank = ctx.args.number("rank").unwrap_or(1.0) as u64;
        let mentions = ctx.resolve_mentions(&ResolverOptions::default()).await?;
        let username = mentions.username.unwrap_or_default();
        let artist = ["Red Velvet", "Loona", "Dreamcatcher", "Everglow", "Weeekly"]
            [(stable_count(&username, 5) + rank) as usize % 5];
        ctx.reply(format!(
            "{} #{} artist is {}",
            upper_first(&mentions.perspective.possessive),
            rank,
            artist
        ))
        .await?;
        Ok(())
    }
}

struct Cover;

#[async_trait]
impl CommandHandler for Cover {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let (Some(artist), Some(album)) = (ctx.args.text("artist"), ctx.args.text("album")) else {
            return Err(CommandError::logic_with_footer(
                "please give an artist and an album",
                "e.g. !cover Red Velvet | The ReVe Festival",
            ));
        };
        ctx.reply(format!("Cover for {} by {}: [image]", album, artist))
            .await?;
        Ok(())
    }
}

struct Recent;

#[async_trait]
impl CommandHandler for Recent {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let amount = ctx.args.number("amount").unwrap_or(5.0) as usize;
        let lines: Vec<String> = (1..=amount)
            .map(|n| format!("{}. track {}", n, n))
            .collect();
        ctx.reply(lines.join("\n")).await?;
        Ok(())
    }
}

struct Reacts;

#[async_trait]
impl CommandHandler for Reacts {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let emojis = ctx.args.list("emojis").unwrap_or_default();
        if emojis.is_empty() {
            return Err(CommandError::logic("please list some emojis to react with"));
        }
        ctx.reply(format!("Your reactions are now {}", emojis.join(" ")))
            .await?;
        Ok(())
    }
}

struct ReactsClear;

#[async_trait]
impl CommandHandler for ReactsClear {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        ctx.reply("Your reactions have been cleared").await?;
        Ok(())
    }
}

struct RateYourMusic {
    action: &'static str,
}

#[async_trait]
impl CommandHandler for RateYourMusic {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let parent = ctx
            .parent
            .as_ref()
            .map(|p| p.display_name().to_string())
            .unwrap_or_default();
        ctx.reply(format!("{} {}: {}", parent, ctx.command.display_name(), self.action))
            .await?;
        Ok(())
    }
}

struct GoBack;

#[async_trait]
impl CommandHandler for GoBack {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let range = ctx
            .args
            .custom::<TimeRange>("timeRange")
            .copied()
            .unwrap_or_default();
        let Some(from) = range.from else {
            return Err(CommandError::unknown("time range validated without a start"));
        };
        ctx.reply(format!(
            "Going back to {}",
            from.format("%Y-%m-%d %H:%M UTC")
        ))
        .await?;
        Ok(())
    }
}

struct Login {
    identities: Arc<InMemoryIdentityStore>,
}

#[async_trait]
impl CommandHandler for Login {
    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let Some(username) = ctx.args.text("username") else {
            return Err(CommandError::logic("please give your last.fm username"));
        };
        self.identities
            .insert(LocalIdentity::new(&ctx.message.author.id).with_username(username));
        ctx.reply(format!("Logged in as {}", username)).await?;
        Ok(())
    }
}

/// Toggles the disabled flag of another command in the current server.
struct Toggle {
    gates: Arc<InMemoryGateStore>,
    registry: Arc<OnceLock<Arc<CommandRegistry>>>,
    disable: bool,
}

#[async_trait]
impl CommandHandler for Toggle {
    async fn prerun(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        if ctx.guild_id().is_none() {
            return Err(CommandError::logic("this command can only be used in a server"));
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CommandContext) -> Result<(), CommandError> {
        let name = ctx.args.text("command").unwrap_or_default().to_string();
        let Some(registry) = self.registry.get() else {
            return Err(CommandError::unknown("command registry is not ready"));
        };
        let Some(node) = registry.lookup(&name) else {
            return Err(CommandError::not_found(format!("Command `{}`", name)));
        };
        let target = node.definition();
        if target.id == ctx.command.id || ctx.parent.is_some() {
            return Err(CommandError::logic("you can't toggle this command"));
        }

        let guild = ctx.guild_id().unwrap_or(LOCAL_GUILD).to_string();
        let reply = if self.disable {
            self.gates.disable(&guild, target.id.as_str(), false);
            format!("Disabled `{}` in this server", target.name)
        } else if self.gates.enable(&guild, target.id.as_str()) {
            format!("Enabled `{}` in this server", target.name)
        } else {
            format!("`{}` wasn't disabled", target.name)
        };
        ctx.reply(reply).await?;
        Ok(())
    }
}

fn period_arguments() -> Arguments {
    Arguments::new()
        .input("timeRange", InputSpec::free_text().custom(time_range_parser()))
        .input(
            "humanizedPeriod",
            InputSpec::free_text().custom(humanized_time_range_parser()),
        )
        .with_standard_mentions()
}

/// Build the demo registry. The returned cell must be filled with the same
/// registry before `disable`/`enable` run.
pub fn build_registry(
    stores: &DemoStores,
) -> anyhow::Result<(Arc<CommandRegistry>, Arc<OnceLock<Arc<CommandRegistry>>>)> {
    let cell: Arc<OnceLock<Arc<CommandRegistry>>> = Arc::new(OnceLock::new());
    let mut registry = CommandRegistry::new();

    registry.register(
        CommandDefinition::new("scrobbles", "scrobbles", || Scrobbles)
            .alias("s")
            .variation(Variation::new("weekly", &["sw", "scrobblesweek"]).description("Scrobbles this week"))
            .description("Shows how many scrobbles a user has over a period")
            .category("lastfm")
            .usage("[time period] [username]")
            .arguments(period_arguments()),
    )?;

    registry.register(
        CommandDefinition::new("rank", "rank", || Rank)
            .aliases(&["r"])
            .description("Shows the artist at a rank in a user's library")
            .category("library")
            .usage("[rank] [username]")
            .arguments(
                Arguments::new()
                    .input("rank", InputSpec::at(0).default_value(1.0).number())
                    .with_standard_mentions(),
            )
            .validation(
                Validation::new()
                    .rule("rank", validation::Number { whole: true })
                    .with(ValidationRule::new("rank", Range::between(1.0, 1000.0)).friendly_name("rank")),
            ),
    )?;

    registry.register(
        CommandDefinition::new("cover", "cover", || Cover)
            .friendly_name("Album cover")
            .description("Shows the cover for an album")
            .category("library")
            .usage("artist | album")
            .arguments(
                Arguments::new()
                    .input("artist", InputSpec::at(0).split_on("|"))
                    .input("album", InputSpec::at(1).split_on("|")),
            ),
    )?;

    let amount_pattern = Regex::new(r"\d+")?;
    registry.register(
        CommandDefinition::new("recent", "recent", || Recent)
            .alias("recents")
            .description("Shows recent tracks")
            .category("lastfm")
            .arguments(
                Arguments::new()
                    .input("amount", InputSpec::at(0).regex(amount_pattern).default_value(5.0).number())
                    .with_standard_mentions(),
            )
            .validation(Validation::new().with(
                ValidationRule::new("amount", Range::between(1.0, 15.0)).friendly_name("amount of recent tracks"),
            ))
            .show_loading_after(Duration::from_millis(500)),
    )?;

    let clear = Arc::new(
        CommandDefinition::new("reactsclear", "reacts clear", || ReactsClear)
            .description("Clears your reactions"),
    );
    registry.register(
        CommandDefinition::new("reacts", "reacts", || Reacts)
            .aliases(&["reactions"])
            .description("Sets the reactions the bot adds to your now playing")
            .arguments(
                Arguments::new()
                    .input("clear", InputSpec::at(0))
                    .input("emojis", InputSpec::free_text().custom(emoji_parser())),
            )
            .delegate(Delegate::new(
                |args| args.text("clear").is_some_and(|t| t.eq_ignore_ascii_case("clear")),
                clear,
            )),
    )?;

    registry.register(
        ParentCommand::new(
            CommandDefinition::new("rateyourmusic", "rateyourmusic", || RateYourMusic {
                action: "links your RateYourMusic account",
            })
            .aliases(&["rym"])
            .friendly_name("RateYourMusic")
            .description("RateYourMusic integration"),
        )
        .child(
            CommandDefinition::new("rym-link", "link", || RateYourMusic {
                action: "links your RateYourMusic account",
            })
            .friendly_name("link"),
        )
        .child(
            CommandDefinition::new("rym-import", "import", || RateYourMusic {
                action: "import started",
            })
            .friendly_name("import ratings"),
        )
        .child(
            CommandDefinition::new("rym-ratings", "ratings", || RateYourMusic {
                action: "here are your ratings",
            })
            .alias("rymratings"),
        )
        .default_child("link")
        .skip_prefix_for("ratings")
        .abbreviations(3),
    )?;

    registry.register(
        CommandDefinition::new("goback", "goback", || GoBack)
            .alias("gb")
            .description("Shows what you were listening to some time ago")
            .rollout(RolloutPolicy::guilds(&[LOCAL_GUILD]).with_percentage(50))
            .arguments(
                Arguments::new()
                    .input("timeRange", InputSpec::free_text().custom(time_range_parser()))
                    .with_standard_mentions(),
            )
            .validation(Validation::new().with(
                ValidationRule::new(
                    "timeRange",
                    validation::TimeRange {
                        require_from: true,
                        treat_only_to_as_empty: true,
                    },
                )
                .friendly_name("time period"),
            )),
    )?;

    let identities = Arc::clone(&stores.identities);
    registry.register(
        CommandDefinition::new("login", "login", move || Login {
            identities: Arc::clone(&identities),
        })
        .description("Links your last.fm account")
        .arguments(Arguments::new().input("username", InputSpec::at(0)))
        .validation(Validation::new().rule("username", Required)),
    )?;

    for (seed, name, disable) in [("disable", "disable", true), ("enable", "enable", false)] {
        let gates = Arc::clone(&stores.gates);
        let cell = Arc::clone(&cell);
        registry.register(
            CommandDefinition::new(seed, name, move || Toggle {
                gates: Arc::clone(&gates),
                registry: Arc::clone(&cell),
                disable,
            })
            .category("admin")
            .arguments(
                Arguments::new()
                    .input("command", InputSpec::at(0))
                    .flag("force", FlagSpec::new("Skip confirmation").short("f").long("force")),
            )
            .validation(Validation::new().rule("command", Required)),
        )?;
    }

    registry.register(
        CommandDefinition::new("eval", "eval", || Recent)
            .dev_only()
            .arguments(Arguments::new().mention(
                "target",
                MentionSpec::new(Index::At(0), "Who to run as"),
            )),
    )?;

    Ok((Arc::new(registry), cell))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds() {
        let stores = DemoStores::seeded();
        let (registry, _cell) = build_registry(&stores).unwrap();
        assert!(registry.lookup("s").is_some());
        assert!(registry.lookup("rym").is_some());
        assert!(registry.resolve("ratings").is_ok());
        let visible: Vec<String> = registry
            .list()
            .iter()
            .map(|n| n.definition().name.clone())
            .collect();
        assert!(!visible.contains(&"eval".to_string()));
    }

    #[test]
    fn test_stable_count_is_deterministic() {
        assert_eq!(stable_count("joe_lfm", 900), stable_count("joe_lfm", 900));
        assert!(stable_count("ana_lfm", 5) < 5);
    }

    #[test]
    fn test_upper_first() {
        assert_eq!(upper_first("you have"), "You have");
        assert_eq!(upper_first("`joe` has"), "`joe` has");
        assert_eq!(upper_first(""), "");
    }
}
