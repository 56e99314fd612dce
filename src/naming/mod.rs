//! Database name generation.
//!
//! Spanner database ids are 2-30 characters, start with a lowercase letter,
//! contain only `[a-z0-9_-]` and cannot end in `-` or `_`. Each run gets a
//! fresh id built from a short prefix and the first 23 characters of a v4
//! UUID. That slice (`xxxxxxxx-xxxx-xxxx-xxxx`) always ends in a hex digit,
//! so the generated id never ends in a separator.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of a Spanner database id
pub const MAX_DATABASE_NAME_LEN: usize = 30;

/// Number of UUID characters appended to the prefix
pub const SUFFIX_LEN: usize = 23;

/// Longest prefix that still fits alongside the suffix
pub const MAX_PREFIX_LEN: usize = MAX_DATABASE_NAME_LEN - SUFFIX_LEN;

static DATABASE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_\-]*[a-z0-9]$").expect("database name pattern is valid")
});

static PREFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_\-]*$").expect("prefix pattern is valid"));

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NamingError {
    #[error("Database name prefix {prefix:?} is longer than {max} characters")]
    PrefixTooLong { prefix: String, max: usize },

    #[error("Database name prefix {0:?} must start with a lowercase letter and use only [a-z0-9_-]")]
    InvalidPrefix(String),

    #[error("Database name {name:?} is {len} characters, limit is {max}")]
    TooLong { name: String, len: usize, max: usize },

    #[error("Database name {0:?} is not a valid Spanner database id")]
    InvalidName(String),
}

/// Check that `prefix` can be used with [`generate_database_name`]
pub fn validate_prefix(prefix: &str) -> Result<(), NamingError> {
    if prefix.len() > MAX_PREFIX_LEN {
        return Err(NamingError::PrefixTooLong {
            prefix: prefix.to_string(),
            max: MAX_PREFIX_LEN,
        });
    }
    if !PREFIX_PATTERN.is_match(prefix) {
        return Err(NamingError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Check a database id against Spanner's naming rules
pub fn validate_database_name(name: &str) -> Result<(), NamingError> {
    if name.len() > MAX_DATABASE_NAME_LEN {
        return Err(NamingError::TooLong {
            name: name.to_string(),
            len: name.len(),
            max: MAX_DATABASE_NAME_LEN,
        });
    }
    if !DATABASE_NAME_PATTERN.is_match(name) {
        return Err(NamingError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Generate a unique database id for one run
pub fn generate_database_name(prefix: &str) -> Result<String, NamingError> {
    validate_prefix(prefix)?;
    let name = format!("{}{}", prefix, uuid_suffix(Uuid::new_v4()));
    validate_database_name(&name)?;
    Ok(name)
}

fn uuid_suffix(id: Uuid) -> String {
    // Hyphenated form is ASCII, so byte slicing is safe.
    id.hyphenated().to_string()[..SUFFIX_LEN].to_string()
}
