//! Custom input transforms for concepts the parser itself knows nothing about.
//!
//! Each function returns something usable as `InputSpec::custom`.

use super::ArgValue;
use chrono::{DateTime, Duration, Months, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// A window of time; `None` on either side means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn overall() -> Self {
        Self::default()
    }

    pub fn is_overall(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Minute,
    Hour,
    Day,
    Week,
    Fortnight,
    Month,
    Quarter,
    Half,
    Year,
}

impl Unit {
    fn parse(word: &str) -> Option<Self> {
        let unit = match word.to_lowercase().as_str() {
            "min" | "mins" | "minute" | "minutes" => Unit::Minute,
            "h" | "hour" | "hours" => Unit::Hour,
            "d" | "day" | "days" => Unit::Day,
            "w" | "week" | "weeks" => Unit::Week,
            "fortnight" | "fortnights" => Unit::Fortnight,
            "m" | "mo" | "month" | "months" => Unit::Month,
            "q" | "quarter" | "quarters" => Unit::Quarter,
            "half" | "halfyear" => Unit::Half,
            "y" | "year" | "years" => Unit::Year,
            _ => return None,
        };
        Some(unit)
    }

    fn singular(&self) -> &'static str {
        match self {
            Unit::Minute => "minute",
            Unit::Hour => "hour",
            Unit::Day => "day",
            Unit::Week => "week",
            Unit::Fortnight => "fortnight",
            Unit::Month => "month",
            Unit::Quarter => "quarter",
            Unit::Half => "half year",
            Unit::Year => "year",
        }
    }

    fn subtract(&self, now: DateTime<Utc>, amount: u32) -> Option<DateTime<Utc>> {
        let amount_i = i64::from(amount);
        match self {
            Unit::Minute => now.checked_sub_signed(Duration::minutes(amount_i)),
            Unit::Hour => now.checked_sub_signed(Duration::hours(amount_i)),
            Unit::Day => now.checked_sub_signed(Duration::days(amount_i)),
            Unit::Week => now.checked_sub_signed(Duration::weeks(amount_i)),
            Unit::Fortnight => now.checked_sub_signed(Duration::weeks(amount_i * 2)),
            Unit::Month => now.checked_sub_months(Months::new(amount)),
            Unit::Quarter => now.checked_sub_months(Months::new(amount.checked_mul(3)?)),
            Unit::Half => now.checked_sub_months(Months::new(amount.checked_mul(6)?)),
            Unit::Year => now.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        }
    }
}

static TIME_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)(\d+)?\s*(minutes?|mins?|hours?|h|days?|d|weeks?|w|fortnights?|months?|mo|m|quarters?|q|halfyear|half|years?|y)(?:\s|$)")
        .expect("time period pattern is valid")
});

static OVERALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)(overall|alltime|all-time)(?:\s|$)")
        .expect("overall pattern is valid")
});

fn find_period(text: &str) -> Option<(u32, Unit)> {
    let caps = TIME_PERIOD.captures(text)?;
    let amount = match caps.get(1) {
        Some(m) => m.as_str().parse::<u32>().ok()?,
        None => 1,
    };
    let unit = Unit::parse(caps.get(2)?.as_str())?;
    (amount > 0).then_some((amount, unit))
}

/// Parse a relative period such as `week`, `3 months` or `y` ending at `now`.
///
/// Returns `None` when the text names no period.
pub fn parse_time_range(text: &str, now: DateTime<Utc>) -> Option<TimeRange> {
    if OVERALL.is_match(text) {
        return Some(TimeRange::overall());
    }
    let (amount, unit) = find_period(text)?;
    Some(TimeRange {
        from: Some(unit.subtract(now, amount)?),
        to: Some(now),
    })
}

/// Human phrasing for the period in `text`, e.g. `over the past 2 weeks`.
pub fn humanize_time_range(text: &str) -> String {
    if OVERALL.is_match(text) {
        return "overall".to_string();
    }
    match find_period(text) {
        Some((1, unit)) => format!("over the past {}", unit.singular()),
        Some((amount, unit)) => format!("over the past {} {}s", amount, unit.singular()),
        None => "overall".to_string(),
    }
}

/// Transform yielding a `TimeRange`; no period in the text means overall.
pub fn time_range_parser() -> impl Fn(&str) -> Option<ArgValue> + Send + Sync + 'static {
    |text: &str| {
        let range = parse_time_range(text, Utc::now()).unwrap_or_default();
        Some(ArgValue::custom(range))
    }
}

/// Transform yielding the humanized phrasing as text.
pub fn humanized_time_range_parser() -> impl Fn(&str) -> Option<ArgValue> + Send + Sync + 'static
{
    |text: &str| Some(ArgValue::Text(humanize_time_range(text)))
}

static CUSTOM_EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<a?:\w+:\d+>$").expect("custom emoji pattern is valid")
});

fn is_emoji_token(token: &str) -> bool {
    if CUSTOM_EMOJI.is_match(token) {
        return true;
    }
    !token.is_empty()
        && token.chars().all(|c| {
            !c.is_alphanumeric() && !c.is_ascii() || c == '\u{200d}' || c == '\u{fe0f}'
        })
}

/// Transform yielding every emoji token in the text as a list.
pub fn emoji_parser() -> impl Fn(&str) -> Option<ArgValue> + Send + Sync + 'static {
    |text: &str| {
        let emojis: Vec<String> = text
            .split_whitespace()
            .filter(|t| is_emoji_token(t))
            .map(str::to_string)
            .collect();
        Some(ArgValue::List(emojis))
    }
}
