//! Tape names derived from test identity, and tape name validation

use std::borrow::Cow;

use crate::{Result, TapedeckError};

/// Maximum tape name length in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Derive a tape name from a test function identifier
///
/// `fooBarBaz` becomes `foo bar baz`, `fetches_user_profile` becomes
/// `fetches user profile`. A module path keeps only its last segment.
#[must_use]
pub fn tape_name_for_method(identifier: &str) -> String {
    words(last_segment(identifier)).join(" ")
}

/// Derive a tape name from a type identifier
///
/// `FooBarBazTest` becomes `foo bar baz test`. Module paths and generic
/// arguments are dropped.
#[must_use]
pub fn tape_name_for_type(identifier: &str) -> String {
    let without_generics = identifier.split('<').next().unwrap_or(identifier);
    words(last_segment(without_generics)).join(" ")
}

/// Derive a tape name from a Rust type
#[must_use]
pub fn tape_name_of<T: ?Sized>() -> String {
    tape_name_for_type(std::any::type_name::<T>())
}

/// Derive a tape name from the running test
///
/// The test harness names each test thread after the test path, e.g.
/// `client::tests::fetches_user`. Returns `None` on unnamed threads.
#[must_use]
pub fn current_test_tape_name() -> Option<String> {
    let thread = std::thread::current();
    let name = tape_name_for_method(thread.name()?);
    (!name.is_empty()).then_some(name)
}

fn last_segment(identifier: &str) -> &str {
    identifier.rsplit("::").next().unwrap_or(identifier)
}

/// Split an identifier into lower-case words at separators and case boundaries
fn words(identifier: &str) -> Vec<String> {
    let chars: Vec<char> = identifier.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_numeric()
                || (prev.is_uppercase() && next_is_lower);
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }

        current.extend(c.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Validate a tape name before it is used as a storage key
///
/// # Errors
///
/// Returns error if tape name is invalid
pub fn validate_tape_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TapedeckError::InvalidTapeName(
            "Tape name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(TapedeckError::InvalidTapeName(format!(
            "Tape name too long: {} > {MAX_NAME_LEN}",
            name.len()
        )));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(TapedeckError::InvalidTapeName(
            "Tape name cannot contain path separators".to_string(),
        ));
    }

    if name.starts_with('.') {
        return Err(TapedeckError::InvalidTapeName(
            "Tape name cannot start with dot".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(TapedeckError::InvalidTapeName(
            "Tape name cannot contain null bytes".to_string(),
        ));
    }

    if name.contains("..") {
        return Err(TapedeckError::InvalidTapeName(
            "Tape name cannot contain '..'".to_string(),
        ));
    }

    Ok(())
}

/// File name a tape is stored under: the percent-encoded tape name
///
/// Only ASCII alphanumerics and `-._~` are kept as is, so distinct names
/// always get distinct stems.
#[must_use]
pub fn tape_file_stem(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

/// Tape name a file stem was derived from
///
/// Returns `None` if the stem does not decode to UTF-8.
#[must_use]
pub fn tape_name_from_file_stem(stem: &str) -> Option<String> {
    urlencoding::decode(stem).ok().map(Cow::into_owned)
}
