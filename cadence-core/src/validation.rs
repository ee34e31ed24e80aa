//! Validation rule set — post-parse argument constraints.
//!
//! Rules are checked in declaration order after parsing and before the
//! handler runs. The first failure aborts the run with
//! [`CommandError::ValidationFailed`] naming the argument.

use crate::arguments::custom::TimeRange as ParsedTimeRange;
use crate::arguments::{ArgValue, ParsedArguments};
use crate::error::CommandError;
use std::fmt;
use std::sync::Arc;

/// A single constraint on one argument's value.
pub trait Validator: Send + Sync + fmt::Debug {
    /// Check `value`; `Err` carries the constraint text shown to the user.
    fn validate(&self, value: Option<&ArgValue>, name: &str) -> Result<(), String>;
}

/// The argument must be present and non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl Validator for Required {
    fn validate(&self, value: Option<&ArgValue>, _name: &str) -> Result<(), String> {
        let present = match value {
            None => false,
            Some(ArgValue::Text(s)) => !s.trim().is_empty(),
            Some(ArgValue::List(items)) => !items.is_empty(),
            Some(_) => true,
        };
        if present {
            Ok(())
        } else {
            Err("this argument is required".to_string())
        }
    }
}

/// Numeric bounds, inclusive on both sides. Absent values pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Range {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    fn describe(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("must be between {} and {}", min, max),
            (Some(min), None) => format!("must be at least {}", min),
            (None, Some(max)) => format!("must be at most {}", max),
            (None, None) => "must be a number".to_string(),
        }
    }
}

impl Validator for Range {
    fn validate(&self, value: Option<&ArgValue>, _name: &str) -> Result<(), String> {
        let Some(value) = value else {
            return Ok(());
        };
        let n = match value {
            ArgValue::Number(n) => *n,
            ArgValue::Text(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            _ => return Err(self.describe()),
        };
        let in_range = !n.is_nan()
            && self.min.is_none_or(|min| n >= min)
            && self.max.is_none_or(|max| n <= max);
        if in_range { Ok(()) } else { Err(self.describe()) }
    }
}

/// The argument must be a (optionally whole) number. Absent values pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Number {
    pub whole: bool,
}

impl Validator for Number {
    fn validate(&self, value: Option<&ArgValue>, _name: &str) -> Result<(), String> {
        let n = match value {
            None => return Ok(()),
            Some(ArgValue::Number(n)) => *n,
            Some(ArgValue::Text(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            Some(_) => f64::NAN,
        };
        if n.is_nan() || n.is_infinite() {
            return Err("must be a number".to_string());
        }
        if self.whole && n.fract() != 0.0 {
            return Err("must be a whole number".to_string());
        }
        Ok(())
    }
}

/// Well-formedness of a parsed time range.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRange {
    /// Reject ranges without a start.
    pub require_from: bool,
    /// A range with only an end is treated as if nothing was given.
    pub treat_only_to_as_empty: bool,
}

impl Validator for TimeRange {
    fn validate(&self, value: Option<&ArgValue>, _name: &str) -> Result<(), String> {
        let Some(value) = value else {
            return Ok(());
        };
        let Some(range) = value.downcast_ref::<ParsedTimeRange>() else {
            return Err("must be a time period".to_string());
        };

        let range = if self.treat_only_to_as_empty && range.from.is_none() {
            ParsedTimeRange::overall()
        } else {
            *range
        };

        if let (Some(from), Some(to)) = (range.from, range.to) {
            if from > to {
                return Err("the start of the period must be before its end".to_string());
            }
        }
        if self.require_from && range.from.is_none() {
            return Err("please specify a time period (e.g. `week`, `3 months`)".to_string());
        }
        Ok(())
    }
}

/// A validator bound to an argument, optionally with a display name.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    pub argument: String,
    pub validator: Arc<dyn Validator>,
    pub friendly_name: Option<String>,
}

impl ValidationRule {
    pub fn new(argument: impl Into<String>, validator: impl Validator + 'static) -> Self {
        Self {
            argument: argument.into(),
            validator: Arc::new(validator),
            friendly_name: None,
        }
    }

    pub fn friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.argument)
    }
}

/// Ordered rules for a command.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    rules: Vec<ValidationRule>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, argument: impl Into<String>, validator: impl Validator + 'static) -> Self {
        self.rules.push(ValidationRule::new(argument, validator));
        self
    }

    pub fn with(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Applies a [`Validation`] to parsed arguments.
#[derive(Debug, Clone, Copy)]
pub struct ValidationChecker<'a> {
    validation: &'a Validation,
}

impl<'a> ValidationChecker<'a> {
    pub fn new(validation: &'a Validation) -> Self {
        Self { validation }
    }

    pub fn validate(&self, args: &ParsedArguments) -> Result<(), CommandError> {
        for rule in &self.validation.rules {
            let value = args.get(&rule.argument);
            if let Err(constraint) = rule.validator.validate(value, &rule.argument) {
                return Err(CommandError::ValidationFailed {
                    argument: rule.display_name().to_string(),
                    constraint,
                });
            }
        }
        Ok(())
    }
}
