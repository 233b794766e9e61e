//! Template variable handling
//!
//! A variable reference is `$` followed by one or more ASCII word characters.
//! Panel extraction and query resolution both tokenize through this module so
//! the two always agree on what a variable is.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};

use crate::{Error, Result};

lazy_static! {
    static ref VARIABLE: Regex = Regex::new(r"\$([A-Za-z0-9_]+)").unwrap();
}

/// Distinct `$name` tokens in first-seen order, sigil included.
pub fn variable_tokens(expr: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    VARIABLE
        .find_iter(expr)
        .map(|m| m.as_str())
        .filter(|token| seen.insert(*token))
        .map(str::to_string)
        .collect()
}

/// Distinct variable names in first-seen order, sigil stripped.
pub fn variable_names(expr: &str) -> Vec<String> {
    variable_tokens(expr)
        .into_iter()
        .map(|token| token[1..].to_string())
        .collect()
}

/// Outcome of a single substitution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub expr: String,
    /// Tokens still present after substitution, sigil included.
    pub unresolved: Vec<String>,
}

/// Replace every `$name` whose name has a value, then rescan the result.
///
/// Substituted values are inserted literally and are never substituted
/// again; a `$name` they happen to contain shows up in `unresolved`.
pub fn substitute(expr: &str, values: &HashMap<String, String>) -> Substitution {
    let resolved = VARIABLE
        .replace_all(expr, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned();

    let unresolved = variable_tokens(&resolved);
    Substitution {
        expr: resolved,
        unresolved,
    }
}

/// Substitute and fail with [`Error::UnresolvedVariables`] if anything is left.
pub fn resolve(expr: &str, values: &HashMap<String, String>) -> Result<String> {
    let Substitution { expr, unresolved } = substitute(expr, values);
    if !unresolved.is_empty() {
        return Err(Error::UnresolvedVariables(unresolved));
    }
    Ok(expr)
}
