//! Argument parser — consumes a `RunAs` against an `Arguments` schema.
//!
//! Order matters: flags are stripped from the text first, then mentions are
//! read from the flag-free token stream, then inputs are read from whatever
//! tokens the mentions did not consume. Missing values are represented as
//! absence; deciding whether absence is an error belongs to validation.

use super::{ArgValue, Arguments, FlagParser, Index, InputSpec, MentionSpec, ParsedArguments};
use crate::tokenizer::RunAs;
use tracing::trace;

/// Stateless parser bound to one schema.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentParser<'a> {
    arguments: &'a Arguments,
}

impl<'a> ArgumentParser<'a> {
    pub fn new(arguments: &'a Arguments) -> Self {
        Self { arguments }
    }

    pub fn parse(&self, run_as: &RunAs) -> ParsedArguments {
        self.parse_text(run_as.args_text())
    }

    /// Parse raw argument text (everything after the invocation).
    pub fn parse_text(&self, text: &str) -> ParsedArguments {
        let mut parsed = ParsedArguments::new();

        let extracted = FlagParser::new().parse_and_remove(text, &self.arguments.flags);
        for (name, present) in &extracted.flags {
            parsed.insert(name.clone(), ArgValue::Bool(*present));
        }

        let tokens: Vec<String> = extracted
            .text
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let mut consumed = vec![false; tokens.len()];

        for (name, spec) in &self.arguments.mentions {
            if let Some(target) = Self::extract_mention(spec, &tokens, &mut consumed) {
                parsed.insert(name.clone(), ArgValue::Mention(target));
            }
        }

        let input_tokens: Vec<String> = tokens
            .iter()
            .zip(&consumed)
            .filter(|(_, used)| !**used)
            .map(|(token, _)| token.clone())
            .collect();
        let input_text = input_tokens.join(" ");

        for (name, spec) in &self.arguments.inputs {
            if let Some(value) = Self::extract_input(spec, &input_tokens, &input_text) {
                parsed.insert(name.clone(), value);
            }
        }

        trace!(arguments = ?parsed, "Parsed arguments");
        parsed
    }

    fn extract_mention(
        spec: &MentionSpec,
        tokens: &[String],
        consumed: &mut [bool],
    ) -> Option<super::MentionTarget> {
        for position in spec.index.positions(tokens.len()) {
            if consumed[position] {
                continue;
            }
            if let Some((target, consumes)) = spec.parse_token(&tokens[position]) {
                if consumes {
                    consumed[position] = true;
                }
                return Some(target);
            }
        }
        None
    }

    fn extract_input(spec: &InputSpec, tokens: &[String], text: &str) -> Option<ArgValue> {
        let captured = Self::capture(spec, tokens, text);

        let value = match &spec.custom {
            Some(custom) => custom(captured.as_deref().unwrap_or("")),
            None => captured.map(ArgValue::Text),
        };

        let value = value.or_else(|| spec.default.clone())?;

        if spec.number {
            Some(Self::coerce_number(value))
        } else {
            Some(value)
        }
    }

    /// The raw text a slot reads; empty captures count as absent.
    fn capture(spec: &InputSpec, tokens: &[String], text: &str) -> Option<String> {
        let captured = if let Some(regex) = &spec.regex {
            let matches: Vec<String> = regex
                .find_iter(text)
                .map(|m| m.as_str().to_string())
                .collect();
            match spec.index {
                Index::FreeText => matches.first().cloned(),
                index => index.select(&matches, " "),
            }
        } else if let Some(delimiter) = spec.split_on.as_deref().filter(|d| !d.is_empty()) {
            let parts: Vec<String> = text
                .split(delimiter)
                .map(|part| part.trim().to_string())
                .collect();
            match spec.index {
                Index::FreeText => Some(text.to_string()),
                index => index.select(&parts, " "),
            }
        } else {
            match spec.index {
                Index::FreeText => Some(text.to_string()),
                index => index.select(tokens, " "),
            }
        };

        captured.filter(|s| !s.trim().is_empty())
    }

    fn coerce_number(value: ArgValue) -> ArgValue {
        match value {
            ArgValue::Text(s) => ArgValue::Number(s.trim().parse::<f64>().unwrap_or(f64::NAN)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::custom::{TimeRange, emoji_parser, time_range_parser};
    use crate::arguments::{FlagSpec, MentionTarget, RemoteUsernameMention, BareUsernameMention};
    use pretty_assertions::assert_eq;
    use regex::Regex;

    fn parse(arguments: &Arguments, text: &str) -> ParsedArguments {
        ArgumentParser::new(arguments).parse_text(text)
    }

    fn rank_schema() -> Arguments {
        Arguments::new()
            .input(
                "rank",
                InputSpec::at(0).default_value(ArgValue::Number(1.0)).number(),
            )
            .mention("user", MentionSpec::new(Index::At(1), "The user to lookup"))
    }

    #[test]
    fn test_rank_with_mention() {
        let args = parse(&rank_schema(), "3 <@123>");
        assert_eq!(args.number("rank"), Some(3.0));
        assert_eq!(
            args.mention("user"),
            Some(&MentionTarget::Platform { id: "123".into() })
        );
    }

    #[test]
    fn test_rank_defaults_without_tokens() {
        let args = parse(&rank_schema(), "");
        assert_eq!(args.number("rank"), Some(1.0));
        assert!(args.mention("user").is_none());
        assert!(!args.flag("debug"));
    }

    #[test]
    fn test_non_numeric_becomes_nan() {
        let args = parse(&rank_schema(), "three");
        assert!(args.number("rank").unwrap().is_nan());
    }

    #[test]
    fn test_split_on_yields_trimmed_parts() {
        let schema = Arguments::new()
            .input("artist", InputSpec::at(0).split_on("|"))
            .input("album", InputSpec::at(1).split_on("|"));

        let args = parse(&schema, "a | b");
        assert_eq!(args.text("artist"), Some("a"));
        assert_eq!(args.text("album"), Some("b"));

        let args = parse(&schema, "Red Velvet");
        assert_eq!(args.text("artist"), Some("Red Velvet"));
        assert_eq!(args.text("album"), None);

        let args = parse(&schema, " | Feel My Rhythm");
        assert_eq!(args.text("artist"), None);
        assert_eq!(args.text("album"), Some("Feel My Rhythm"));
    }

    #[test]
    fn test_start_index_captures_rest() {
        let schema = Arguments::new().input("artist", InputSpec::starting_at(0));
        let args = parse(&schema, "Red   Velvet --debug");
        assert_eq!(args.text("artist"), Some("Red Velvet"));
        assert!(args.flag("debug"));
    }

    #[test]
    fn test_range_index() {
        let schema = Arguments::new()
            .input("first", InputSpec::range(0, 1))
            .input("rest", InputSpec::starting_at(2));
        let args = parse(&schema, "a b c d");
        assert_eq!(args.text("first"), Some("a b"));
        assert_eq!(args.text("rest"), Some("c d"));
    }

    #[test]
    fn test_regex_takes_first_match() {
        let schema = Arguments::new().input(
            "amount",
            InputSpec::at(0)
                .regex(Regex::new(r"-?[0-9]+").unwrap())
                .default_value(ArgValue::Number(5.0))
                .number(),
        );
        assert_eq!(parse(&schema, "joe 12 30").number("amount"), Some(12.0));
        assert_eq!(parse(&schema, "joe").number("amount"), Some(5.0));
        assert_eq!(parse(&schema, "-3").number("amount"), Some(-3.0));
    }

    #[test]
    fn test_flags_removed_before_positions() {
        let schema = Arguments::new()
            .input("artist", InputSpec::at(0))
            .flag(
                "noRedirect",
                FlagSpec::new("Skip redirect").short("nr").long("noredirect"),
            );
        let args = parse(&schema, "-nr blackpink");
        assert_eq!(args.text("artist"), Some("blackpink"));
        assert!(args.flag("noRedirect"));
    }

    #[test]
    fn test_flags_always_present() {
        let schema = Arguments::new().flag("equal", FlagSpec::new("eq").long("equal"));
        let args = parse(&schema, "");
        assert_eq!(args.get("equal"), Some(&ArgValue::Bool(false)));
        assert_eq!(args.get("debug"), Some(&ArgValue::Bool(false)));
    }

    #[test]
    fn test_standard_mentions_are_removed_from_inputs() {
        let schema = Arguments::new()
            .input("artist", InputSpec::starting_at(0))
            .with_standard_mentions();
        let args = parse(&schema, "lfm:flushed_emoji twice <@!55> id:77");
        assert_eq!(args.text("artist"), Some("twice"));
        assert_eq!(
            args.mention("lfmUser"),
            Some(&MentionTarget::RemoteUsername("flushed_emoji".into()))
        );
        assert_eq!(
            args.mention("user"),
            Some(&MentionTarget::Platform { id: "55".into() })
        );
        assert_eq!(
            args.mention("userID"),
            Some(&MentionTarget::PlatformId("77".into()))
        );
        assert!(args.mention("discordUsername").is_none());
    }

    #[test]
    fn test_same_token_read_as_input_and_mention() {
        let schema = Arguments::new()
            .input("artist", InputSpec::at(0))
            .mention(
                "username",
                MentionSpec::new(Index::At(0), "A username").with_parser(BareUsernameMention),
            );
        let args = parse(&schema, "iu");
        assert_eq!(args.text("artist"), Some("iu"));
        assert_eq!(
            args.mention("username"),
            Some(&MentionTarget::RemoteUsername("iu".into()))
        );
    }

    #[test]
    fn test_consumed_token_not_matched_twice() {
        let schema = Arguments::new()
            .mention(
                "first",
                MentionSpec::new(Index::From(0), "a").with_parser(RemoteUsernameMention),
            )
            .mention(
                "second",
                MentionSpec::new(Index::From(0), "b").with_parser(RemoteUsernameMention),
            );
        let args = parse(&schema, "lfm:one lfm:two");
        assert_eq!(
            args.mention("first"),
            Some(&MentionTarget::RemoteUsername("one".into()))
        );
        assert_eq!(
            args.mention("second"),
            Some(&MentionTarget::RemoteUsername("two".into()))
        );
    }

    #[test]
    fn test_custom_free_text_receives_everything() {
        let schema = Arguments::new()
            .input("timeRange", InputSpec::free_text().custom(time_range_parser()))
            .with_standard_mentions();
        let args = parse(&schema, "<@1> 2 weeks");
        let range = args.custom::<TimeRange>("timeRange").unwrap();
        assert!(range.from.is_some());
        assert!(args.mention("user").is_some());
    }

    #[test]
    fn test_custom_called_on_empty_capture() {
        let schema = Arguments::new().input(
            "emojis",
            InputSpec::starting_at(0)
                .custom(emoji_parser())
                .default_value(ArgValue::List(vec![])),
        );
        let args = parse(&schema, "");
        assert_eq!(args.list("emojis").map(<[String]>::len), Some(0));
    }

    #[test]
    fn test_custom_none_falls_back_to_default() {
        let schema = Arguments::new().input(
            "word",
            InputSpec::at(0)
                .custom(|s| (s.len() > 3).then(|| ArgValue::Text(s.to_uppercase())))
                .default_value("none"),
        );
        assert_eq!(parse(&schema, "abcd").text("word"), Some("ABCD"));
        assert_eq!(parse(&schema, "ab").text("word"), Some("none"));
    }

    #[test]
    fn test_parse_from_run_as() {
        let run_as = crate::tokenizer::Tokenizer::new().run_as("ala 4 <@9>", 1, vec![]);
        let args = ArgumentParser::new(&rank_schema()).parse(&run_as);
        assert_eq!(args.number("rank"), Some(4.0));
        assert!(args.mention("user").is_some());
    }
}
