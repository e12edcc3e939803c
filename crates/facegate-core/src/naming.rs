//! Person identity naming.
//!
//! Gallery source images are named `<person_id>.<ext>` or
//! `<person_id>_<n>.<ext>`. The rules, in regex terms:
//!
//! - person id from a file stem: `^(?P<id>.+)_(?P<n>[0-9]+)$` yields `id`,
//!   any other stem is the person id verbatim;
//! - enrollment index of a stem for person `p`: `^p$` is index 1,
//!   `^p_(?P<n>[0-9]+)$` is index `n`.
//!
//! The suffix is only stripped when something precedes it: `_7` is the
//! person id `_7`, not the empty string.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NameError {
    #[error("name cannot be empty")]
    Empty,
    #[error("name contains a character not allowed in file names: {0:?}")]
    InvalidChar(char),
    #[error("name {0:?} ends in _<digits>, which is reserved for image numbering")]
    NumericSuffix(String),
    #[error("no enrollment numbers left for {0:?}")]
    IndexExhausted(String),
}

/// Normalize a user-supplied name into a person id.
///
/// Trims surrounding whitespace, replaces spaces with `_`, lowercases.
/// Names that would not survive the stem round trip (`agent_007`) are refused.
pub fn normalize_person_id(raw: &str) -> Result<String, NameError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    if let Some(c) = trimmed
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '\0') || c.is_control())
    {
        return Err(NameError::InvalidChar(c));
    }
    if trimmed.starts_with('.') {
        return Err(NameError::InvalidChar('.'));
    }
    let person_id = trimmed.replace(' ', "_").to_lowercase();
    if person_id_from_stem(&person_id) != person_id {
        return Err(NameError::NumericSuffix(person_id));
    }
    Ok(person_id)
}

/// Split a trailing `_<digits>` suffix off a file stem.
fn split_suffix(stem: &str) -> Option<(&str, &str)> {
    let (prefix, digits) = stem.rsplit_once('_')?;
    if prefix.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((prefix, digits))
}

/// Person id an image stem belongs to: `alice_2` → `alice`, `alice` → `alice`.
pub fn person_id_from_stem(stem: &str) -> &str {
    split_suffix(stem).map(|(prefix, _)| prefix).unwrap_or(stem)
}

/// Enrollment index of `stem` for `person_id`, if the stem belongs to that person.
///
/// An unsuffixed stem counts as index 1.
pub fn enrollment_index(stem: &str, person_id: &str) -> Option<u32> {
    if stem == person_id {
        return Some(1);
    }
    match split_suffix(stem) {
        Some((prefix, digits)) if prefix == person_id => digits.parse().ok(),
        _ => None,
    }
}

/// File stems for `count` new images of `person_id`.
///
/// A lone image for a person with no prior images is named after the person;
/// anything else is numbered from `existing_max + 1`. Fails when the
/// numbers would run past `u32::MAX`.
pub fn enrollment_stems(
    person_id: &str,
    existing_max: Option<u32>,
    supplied: usize,
    count: usize,
) -> Result<Vec<String>, NameError> {
    if supplied == 1 && count == 1 && existing_max.is_none() {
        return Ok(vec![person_id.to_string()]);
    }
    let exhausted = || NameError::IndexExhausted(person_id.to_string());
    let start = existing_max.unwrap_or(0).checked_add(1).ok_or_else(exhausted)?;
    (0..count)
        .map(|i| {
            u32::try_from(i)
                .ok()
                .and_then(|i| start.checked_add(i))
                .map(|n| format!("{person_id}_{n}"))
                .ok_or_else(exhausted)
        })
        .collect()
}
