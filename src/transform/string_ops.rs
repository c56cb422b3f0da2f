//! Text transformations behind the `.str` accessor and the row-expression
//! string functions. Each returns a `Cow` so untouched values are not copied.

use std::borrow::Cow;

use heck::{ToSnakeCase, ToTitleCase};
use regex::Regex;

#[derive(Debug, Clone)]
pub enum StrOp {
    Lower,
    Upper,
    Strip,
    SnakeCase,
    TitleCase,
    Replace { from: String, to: String },
    RegexReplace { pattern: Regex, replacement: String },
    Slice { start: usize, length: usize },
}

impl StrOp {
    pub fn apply<'a>(&self, value: &'a str) -> Cow<'a, str> {
        match self {
            StrOp::Lower => lowercase(value),
            StrOp::Upper => uppercase(value),
            StrOp::Strip => trim(value),
            StrOp::SnakeCase => converted(value, value.to_snake_case()),
            StrOp::TitleCase => converted(value, value.to_title_case()),
            StrOp::Replace { from, to } => replace(value, from, to),
            StrOp::RegexReplace {
                pattern,
                replacement,
            } => regex_replace(value, pattern, replacement),
            StrOp::Slice { start, length } => substring(value, *start, *length),
        }
    }
}

/// Boolean tests behind `.str.contains` and friends.
#[derive(Debug, Clone)]
pub enum StrPredicate {
    Contains { needle: String, case_sensitive: bool },
    StartsWith(String),
    EndsWith(String),
    Matches(Regex),
}

impl StrPredicate {
    pub fn test(&self, value: &str) -> bool {
        match self {
            StrPredicate::Contains {
                needle,
                case_sensitive: true,
            } => value.contains(needle.as_str()),
            StrPredicate::Contains { needle, .. } => {
                value.to_lowercase().contains(&needle.to_lowercase())
            }
            StrPredicate::StartsWith(prefix) => value.starts_with(prefix.as_str()),
            StrPredicate::EndsWith(suffix) => value.ends_with(suffix.as_str()),
            StrPredicate::Matches(regex) => regex.is_match(value),
        }
    }
}

fn converted(original: &str, converted: String) -> Cow<'_, str> {
    if converted == original {
        Cow::Borrowed(original)
    } else {
        Cow::Owned(converted)
    }
}

pub fn lowercase(input: &str) -> Cow<'_, str> {
    if input.chars().any(char::is_uppercase) {
        Cow::Owned(input.to_lowercase())
    } else {
        Cow::Borrowed(input)
    }
}

pub fn uppercase(input: &str) -> Cow<'_, str> {
    if input.chars().any(char::is_lowercase) {
        Cow::Owned(input.to_uppercase())
    } else {
        Cow::Borrowed(input)
    }
}

pub fn trim(input: &str) -> Cow<'_, str> {
    Cow::Borrowed(input.trim())
}

pub fn snake_case(input: &str) -> Cow<'_, str> {
    converted(input, input.to_snake_case())
}

pub fn replace<'a>(value: &'a str, from: &str, to: &str) -> Cow<'a, str> {
    if from.is_empty() || !value.contains(from) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(value.replace(from, to))
    }
}

pub fn regex_replace<'a>(value: &'a str, regex: &Regex, replacement: &str) -> Cow<'a, str> {
    regex.replace_all(value, replacement)
}

/// Character-indexed slice; out-of-range bounds clamp to the string.
pub fn substring(value: &str, start: usize, length: usize) -> Cow<'_, str> {
    let mut indices = value.char_indices().map(|(idx, _)| idx).skip(start);
    let Some(begin) = indices.next() else {
        return Cow::Borrowed("");
    };
    let end = if length == 0 {
        begin
    } else {
        indices.nth(length - 1).unwrap_or(value.len())
    };
    Cow::Borrowed(&value[begin..end])
}
