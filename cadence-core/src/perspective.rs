//! Perspective — second- vs third-person phrasing for a sender/target pair.

use serde::{Deserialize, Serialize};

/// How to refer to the target of a command in a reply.
///
/// When sender and target are the same identity the phrasing is second
/// person ("you have"); otherwise it names the target ("`joe` has").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perspective {
    /// Subject form: `you` / `` `joe` ``.
    pub name: String,
    /// Possessive form: `your` / `` `joe`'s ``.
    pub possessive: String,
    /// `you have` / `` `joe` has ``.
    pub has: String,
    /// `you are` / `` `joe` is ``.
    pub is: String,
    /// Whether the target is the sender.
    pub is_self: bool,
}

impl Perspective {
    pub fn second_person() -> Self {
        Self {
            name: "you".to_string(),
            possessive: "your".to_string(),
            has: "you have".to_string(),
            is: "you are".to_string(),
            is_self: true,
        }
    }

    pub fn third_person(name: &str, as_code: bool) -> Self {
        let name = if as_code {
            format!("`{}`", name)
        } else {
            name.to_string()
        };
        Self {
            possessive: format!("{}'s", name),
            has: format!("{} has", name),
            is: format!("{} is", name),
            name,
            is_self: false,
        }
    }

    /// Compare two remote-service usernames case-insensitively.
    pub fn build(sender: &str, target: &str, as_code: bool) -> Self {
        if sender.eq_ignore_ascii_case(target) {
            Self::second_person()
        } else {
            Self::third_person(target, as_code)
        }
    }

    /// Rephrase in terms of the platform display name instead of the remote username.
    pub fn with_platform_user(self, display_name: &str) -> Self {
        if self.is_self {
            self
        } else {
            Self::third_person(display_name, false)
        }
    }

    /// Copy with every form capitalized, for the start of a sentence.
    pub fn upper(&self) -> Self {
        Self {
            name: capitalize(&self.name),
            possessive: capitalize(&self.possessive),
            has: capitalize(&self.has),
            is: capitalize(&self.is),
            is_self: self.is_self,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_user_is_second_person() {
        let p = Perspective::build("Joe", "joe", true);
        assert!(p.is_self);
        assert_eq!(p.has, "you have");
        assert_eq!(p.possessive, "your");
    }

    #[test]
    fn test_other_user_named_in_code() {
        let p = Perspective::build("joe", "flushed_emoji", true);
        assert_eq!(p.name, "`flushed_emoji`");
        assert_eq!(p.possessive, "`flushed_emoji`'s");
        assert_eq!(p.has, "`flushed_emoji` has");
        assert_eq!(p.is, "`flushed_emoji` is");
    }

    #[test]
    fn test_plain_name() {
        let p = Perspective::build("joe", "anna", false);
        assert_eq!(p.has, "anna has");
    }

    #[test]
    fn test_upper() {
        assert_eq!(Perspective::second_person().upper().has, "You have");
        assert_eq!(Perspective::build("a", "bob", false).upper().possessive, "Bob's");
    }

    #[test]
    fn test_with_platform_user() {
        let p = Perspective::build("a", "b", true).with_platform_user("Anna");
        assert_eq!(p.has, "Anna has");
        let me = Perspective::second_person().with_platform_user("Anna");
        assert_eq!(me.name, "you");
    }
}
