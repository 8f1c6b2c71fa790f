use regex::Regex;
use std::sync::OnceLock;

use crate::error::{BadgeError, BadgeResult};

/// Name of the capture group every pattern must expose.
pub const COUNT_GROUP: &str = "count";

/// One phrasing of "N unread" in one locale.
#[derive(Debug, Clone)]
pub struct DetectionPattern {
    pub locale: String,
    /// Position in the table; lower is tried first.
    pub rank: usize,
    regex: Regex,
}

impl DetectionPattern {
    /// Compile `pattern`, rejecting it unless it has a `count` group.
    pub fn new(locale: &str, rank: usize, pattern: &str) -> BadgeResult<Self> {
        let regex = Regex::new(pattern)?;
        if !regex.capture_names().flatten().any(|n| n == COUNT_GROUP) {
            return Err(BadgeError::InvalidPattern(format!(
                "pattern {pattern:?} has no `{COUNT_GROUP}` group"
            )));
        }
        Ok(DetectionPattern {
            locale: locale.to_string(),
            rank,
            regex,
        })
    }

    /// The digit run this pattern extracts from `text`, if any.
    pub fn extract<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.name(COUNT_GROUP))
            .map(|m| m.as_str())
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Built-in label phrasings, most specific first within each locale.
/// Digits are `[0-9]` because `\d` would also take non-ASCII digits.
const LABEL_PATTERNS: &[(&str, &str)] = &[
    ("en", r"Chats\s*·\s*(?P<count>[0-9]+)\s+unread"),
    ("en", r"\b(?P<count>[0-9]+)\s+unread\b"),
    ("fr", r"Discussions\s*·\s*(?P<count>[0-9]+)\s+non\s+lue?s?"),
    ("fr", r"\b(?P<count>[0-9]+)\s+non\s+lue?s?\b"),
];

pub fn builtin_label_patterns() -> &'static [DetectionPattern] {
    static PATTERNS: OnceLock<Vec<DetectionPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        LABEL_PATTERNS
            .iter()
            .enumerate()
            .map(|(rank, (locale, pattern))| DetectionPattern::new(locale, rank, pattern).unwrap())
            .collect()
    })
}

/// `"<app> (N)"` and `"(N) <app>"`, both anchored at the start of the title.
pub fn title_patterns(app_name: &str) -> BadgeResult<Vec<DetectionPattern>> {
    let app = regex::escape(app_name);
    Ok(vec![
        DetectionPattern::new(
            "title",
            0,
            &format!(r"^\s*{app}\s*\((?P<count>[0-9]+)\)"),
        )?,
        DetectionPattern::new(
            "title",
            1,
            &format!(r"^\s*\((?P<count>[0-9]+)\)\s*{app}"),
        )?,
    ])
}
