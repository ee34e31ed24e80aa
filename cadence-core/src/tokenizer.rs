//! Tokenizer — lexical split of an invocation into a `RunAs`.
//!
//! No semantics live here. The registry decides how many leading tokens name
//! the command; the tokenizer records them, remembers which of them were
//! variation spellings, and exposes the rest of the text to the argument parser.

/// A whitespace-delimited token with its byte span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Splits raw text into tokens and strips invocation prefixes.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer;

impl Tokenizer {
    pub fn new() -> Self {
        Self
    }

    /// Split on Unicode whitespace, keeping byte offsets.
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut start: Option<usize> = None;

        for (idx, ch) in text.char_indices() {
            if ch.is_whitespace() {
                if let Some(s) = start.take() {
                    tokens.push(Token {
                        text: text[s..idx].to_string(),
                        start: s,
                        end: idx,
                    });
                }
            } else if start.is_none() {
                start = Some(idx);
            }
        }

        if let Some(s) = start {
            tokens.push(Token {
                text: text[s..].to_string(),
                start: s,
                end: text.len(),
            });
        }

        tokens
    }

    /// Return the text after `prefix` when the message starts with it (case-insensitive).
    pub fn strip_prefix<'a>(&self, content: &'a str, prefix: &str) -> Option<&'a str> {
        let trimmed = content.trim_start();
        if prefix.is_empty() || trimmed.len() < prefix.len() {
            return None;
        }
        let (head, rest) = trimmed.split_at_checked(prefix.len())?;
        if head.eq_ignore_ascii_case(prefix) {
            Some(rest)
        } else {
            None
        }
    }

    /// Build a `RunAs` where the first `consumed` tokens named the command.
    pub fn run_as(&self, text: &str, consumed: usize, variations: Vec<String>) -> RunAs {
        let tokens = self.tokenize(text);
        let consumed = consumed.min(tokens.len());
        let args_text = tokens
            .get(consumed)
            .map(|t| text[t.start..].trim_end().to_string())
            .unwrap_or_default();

        RunAs {
            invocation: tokens[..consumed].iter().map(|t| t.text.clone()).collect(),
            variations,
            tokens: tokens[consumed..].iter().map(|t| t.text.clone()).collect(),
            args_text,
        }
    }
}

/// The tokenized, alias/variation-stripped representation of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunAs {
    invocation: Vec<String>,
    variations: Vec<String>,
    tokens: Vec<String>,
    args_text: String,
}

impl RunAs {
    /// Tokens that selected the command, in the order they were typed.
    pub fn invocation(&self) -> &[String] {
        &self.invocation
    }

    /// Argument tokens following the invocation.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Argument text with its original spacing.
    pub fn args_text(&self) -> &str {
        &self.args_text
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// Tokens from `index` to the end, joined with a single space.
    pub fn rest_from(&self, index: usize) -> Option<String> {
        if index >= self.tokens.len() {
            return None;
        }
        Some(self.tokens[index..].join(" "))
    }

    /// Whether `variation` was one of the tokens used to select the command.
    pub fn variation_was_used(&self, variation: &str) -> bool {
        self.variations
            .iter()
            .any(|v| v.eq_ignore_ascii_case(variation))
    }

    /// Lowercased invocation joined with spaces, e.g. `rym importratings`.
    pub fn command_path(&self) -> String {
        self.invocation
            .iter()
            .map(|t| t.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Full text as typed: invocation then arguments.
    pub fn to_text(&self) -> String {
        let mut parts = self.invocation.clone();
        if !self.args_text.is_empty() {
            parts.push(self.args_text.clone());
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_tracks_offsets() {
        let tokens = Tokenizer::new().tokenize("  rank   3 <@123>");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "rank");
        assert_eq!(tokens[0].start, 2);
        assert_eq!(tokens[1].text, "3");
        assert_eq!(tokens[2].text, "<@123>");
        assert_eq!(tokens[2].end, 17);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(Tokenizer::new().tokenize("   ").is_empty());
        assert!(Tokenizer::new().tokenize("").is_empty());
    }

    #[test]
    fn test_strip_prefix_case_insensitive() {
        let t = Tokenizer::new();
        assert_eq!(t.strip_prefix("!s week", "!"), Some("s week"));
        assert_eq!(t.strip_prefix("GO! fm", "go!"), Some(" fm"));
        assert_eq!(t.strip_prefix("hello", "!"), None);
        assert_eq!(t.strip_prefix("!", "!!"), None);
        assert_eq!(t.strip_prefix("anything", ""), None);
    }

    #[test]
    fn test_run_as_preserves_argument_spacing() {
        let run_as = Tokenizer::new().run_as("cover  Red Velvet |  Feel My Rhythm ", 1, vec![]);
        assert_eq!(run_as.invocation(), &["cover".to_string()]);
        assert_eq!(run_as.args_text(), "Red Velvet |  Feel My Rhythm");
        assert_eq!(run_as.len(), 6);
        assert_eq!(run_as.token(0), Some("Red"));
    }

    #[test]
    fn test_rest_from() {
        let run_as = Tokenizer::new().run_as("wk red velvet psycho", 1, vec![]);
        assert_eq!(run_as.rest_from(1).as_deref(), Some("velvet psycho"));
        assert_eq!(run_as.rest_from(3), None);
    }

    #[test]
    fn test_variation_was_used() {
        let run_as = Tokenizer::new().run_as("Sf week", 1, vec!["sf".into()]);
        assert!(run_as.variation_was_used("sf"));
        assert!(run_as.variation_was_used("SF"));
        assert!(!run_as.variation_was_used("s"));
    }

    #[test]
    fn test_consumed_beyond_tokens_is_clamped() {
        let run_as = Tokenizer::new().run_as("rym", 2, vec![]);
        assert_eq!(run_as.invocation().len(), 1);
        assert!(run_as.is_empty());
        assert_eq!(run_as.args_text(), "");
        assert_eq!(run_as.to_text(), "rym");
    }

    #[test]
    fn test_command_path_lowercases() {
        let run_as = Tokenizer::new().run_as("RYM ImportRatings file", 2, vec![]);
        assert_eq!(run_as.command_path(), "rym importratings");
        assert_eq!(run_as.to_text(), "RYM ImportRatings file");
    }
}
