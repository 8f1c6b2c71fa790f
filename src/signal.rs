use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A non-empty run of ASCII digits as it appeared in the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnreadCount(String);

impl UnreadCount {
    /// Accepts `text` only if it is non-empty and made of ASCII digits.
    pub fn parse(text: &str) -> Option<Self> {
        if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(text.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, or `None` if the digit run does not fit in a `u32`.
    pub fn value(&self) -> Option<u32> {
        self.0.parse().ok()
    }
}

impl fmt::Display for UnreadCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one detection pass.
///
/// On the wire a count is a JSON string of digits and `Absent` is `null`;
/// the field is never omitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnreadSignal {
    Count(UnreadCount),
    Absent,
}

impl UnreadSignal {
    pub fn count(&self) -> Option<&UnreadCount> {
        match self {
            UnreadSignal::Count(c) => Some(c),
            UnreadSignal::Absent => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.count().map(UnreadCount::as_str)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, UnreadSignal::Absent)
    }
}

impl From<Option<UnreadCount>> for UnreadSignal {
    fn from(count: Option<UnreadCount>) -> Self {
        count.map_or(UnreadSignal::Absent, UnreadSignal::Count)
    }
}

impl fmt::Display for UnreadSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreadSignal::Count(c) => write!(f, "{c}"),
            UnreadSignal::Absent => f.write_str("none"),
        }
    }
}

impl Serialize for UnreadSignal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            UnreadSignal::Count(c) => serializer.serialize_str(c.as_str()),
            UnreadSignal::Absent => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for UnreadSignal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(UnreadSignal::Absent),
            Some(text) => UnreadCount::parse(&text)
                .map(UnreadSignal::Count)
                .ok_or_else(|| serde::de::Error::custom(format!("not a digit string: {text:?}"))),
        }
    }
}
