//! Component parameter overrides.
//!
//! Overrides map a component reference (`R1`, `L2`, `X3`), a `.param` name
//! or an instance parameter (`X1.L`) to a new value string. SPICE
//! identifiers are case-insensitive, so two keys differing only in case are
//! considered duplicates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while building a set of overrides.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
    /// A `key=value` pair had no `=`.
    #[error("override '{pair}' is not of the form NAME=VALUE")]
    MissingEquals { pair: String },

    /// The key was empty after trimming.
    #[error("override '{pair}' has an empty component name")]
    EmptyName { pair: String },

    /// The value was empty after trimming.
    #[error("override for '{name}' has an empty value")]
    EmptyValue { name: String },

    /// An `INSTANCE.PARAM` key with an empty side.
    #[error("override '{name}' must name both an instance and a parameter")]
    BadInstanceKey { name: String },

    /// The same component was named twice.
    #[error("component '{name}' is overridden more than once")]
    Duplicate { name: String },
}

/// An ordered set of parameter overrides with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ParameterOverrides {
    values: BTreeMap<String, String>,
}

impl ParameterOverrides {
    /// Creates an empty override set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an override, rejecting keys that are already present.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), OverrideError> {
        let name = name.into().trim().to_string();
        let value = value.into().trim().to_string();
        if name.is_empty() {
            return Err(OverrideError::EmptyName {
                pair: format!("={}", value),
            });
        }
        if value.is_empty() {
            return Err(OverrideError::EmptyValue { name });
        }
        if name.contains('.') && split_instance_key(&name).is_none() {
            return Err(OverrideError::BadInstanceKey { name });
        }
        if self.get(&name).is_some() {
            return Err(OverrideError::Duplicate { name });
        }
        self.values.insert(name, value);
        Ok(())
    }

    /// Looks up an override by component name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the number of overrides.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no overrides.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(name, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates over the component names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl TryFrom<BTreeMap<String, String>> for ParameterOverrides {
    type Error = OverrideError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mut overrides = ParameterOverrides::new();
        for (name, value) in map {
            overrides.insert(name, value)?;
        }
        Ok(overrides)
    }
}

impl From<ParameterOverrides> for BTreeMap<String, String> {
    fn from(overrides: ParameterOverrides) -> Self {
        overrides.values
    }
}

/// Splits an `INSTANCE.PARAM` key into its two halves.
pub fn split_instance_key(name: &str) -> Option<(&str, &str)> {
    let (instance, param) = name.split_once('.')?;
    let valid = |part: &str| !part.is_empty() && !part.contains('.');
    (valid(instance) && valid(param)).then_some((instance, param))
}

/// Parses a comma-separated override list such as `R1=20n, L1=1m`.
///
/// Commas inside parentheses or braces belong to the value, so
/// `V1=PULSE(0,1,0)` is one override. Blank segments (trailing commas) are
/// ignored.
pub fn parse_overrides(input: &str) -> Result<ParameterOverrides, OverrideError> {
    let mut overrides = ParameterOverrides::new();
    extend_from_str(&mut overrides, input)?;
    Ok(overrides)
}

/// Parses several override lists (one per `--param` flag) into one set.
pub fn parse_override_args<S: AsRef<str>>(
    args: &[S],
) -> Result<ParameterOverrides, OverrideError> {
    let mut overrides = ParameterOverrides::new();
    for arg in args {
        extend_from_str(&mut overrides, arg.as_ref())?;
    }
    Ok(overrides)
}

fn extend_from_str(overrides: &mut ParameterOverrides, input: &str) -> Result<(), OverrideError> {
    for pair in split_top_level(input) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| OverrideError::MissingEquals {
                pair: pair.to_string(),
            })?;
        if name.trim().is_empty() {
            return Err(OverrideError::EmptyName {
                pair: pair.to_string(),
            });
        }
        overrides.insert(name, value)?;
    }
    Ok(())
}

/// Splits on commas that are not nested in `()`, `{}` or `[]`.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}
