//! Chat message model and the user-facing flows built on it.
//!
//! A [`Message`] is the stored document body; a [`MessageRecord`] pairs it
//! with the [`MessageId`] the store assigned on creation. Drafts come from
//! the composer and the edit overlay and only become messages once both
//! fields are filled in.
//!
//! # Modules
//!
//! - [`composer`]: turns a [`Draft`] into a stored message
//! - [`edit`]: opens and saves the edit overlay

pub mod composer;
pub mod edit;

use std::fmt::{self, Write as _};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

pub use composer::{Composer, Submission};
pub use edit::{EditOverlay, SaveOutcome};

/// Opaque identifier assigned by the store when a message is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A chat message as stored in the collection.
///
/// `my_timestamp` is derived from `date` at write time and stored alongside
/// it; readers never recompute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub username: String,
    pub message: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "myTimestamp")]
    pub my_timestamp: String,
}

/// A stored message together with its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    #[serde(flatten)]
    pub data: Message,
}

impl MessageRecord {
    pub fn new(id: impl Into<MessageId>, data: Message) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Raw field values as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Draft {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub message: String,
}

impl Draft {
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
        }
    }

    /// Both fields carry something other than whitespace.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.message.trim().is_empty()
    }

    /// Stamp the draft into a [`Message`], or `None` if a field is empty.
    #[must_use]
    pub fn into_message(self, date: DateTime<Utc>, format: &TimestampFormat) -> Option<Message> {
        if !self.is_complete() {
            return None;
        }
        Some(Message {
            my_timestamp: format.format(date),
            username: self.username,
            message: self.message,
            date,
        })
    }
}

/// Display formatting for `myTimestamp`.
#[derive(Debug, Clone)]
pub struct TimestampFormat {
    pattern: String,
    offset: FixedOffset,
}

impl TimestampFormat {
    /// Build a formatter from a `strftime` pattern and a UTC offset.
    ///
    /// Offsets outside +/-24h fall back to UTC.
    pub fn new(pattern: impl Into<String>, utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());
        Self {
            pattern: pattern.into(),
            offset,
        }
    }

    /// Whether `pattern` only uses specifiers chrono understands.
    #[must_use]
    pub fn is_valid_pattern(pattern: &str) -> bool {
        !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
    }

    /// Format `date` in the configured offset.
    ///
    /// A pattern chrono cannot render falls back to RFC 3339.
    #[must_use]
    pub fn format(&self, date: DateTime<Utc>) -> String {
        let local = date.with_timezone(&self.offset);
        let mut out = String::new();
        if write!(out, "{}", local.format(&self.pattern)).is_err() {
            tracing::warn!(pattern = %self.pattern, "Invalid timestamp format, using RFC 3339");
            return local.to_rfc3339();
        }
        out
    }
}

impl Default for TimestampFormat {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TIMESTAMP_FORMAT, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_draft_completeness() {
        assert!(Draft::new("anna", "hello").is_complete());
        assert!(!Draft::new("", "hello").is_complete());
        assert!(!Draft::new("anna", "").is_complete());
        assert!(!Draft::new("anna", "   ").is_complete());
    }

    #[test]
    fn test_draft_into_message_stamps_date() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let msg = Draft::new("anna", "hello")
            .into_message(date, &TimestampFormat::default())
            .unwrap();

        assert_eq!(msg.date, date);
        assert_eq!(msg.my_timestamp, "2024. 03. 09. 14:05:07");
        assert_eq!(msg.username, "anna");
    }

    #[test]
    fn test_timestamp_offset() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        let format = TimestampFormat::new("%Y-%m-%d %H:%M", 60);
        assert_eq!(format.format(date), "2024-03-10 00:30");
    }

    #[test]
    fn test_invalid_pattern_does_not_panic() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert!(!TimestampFormat::is_valid_pattern("%Q"));
        assert!(TimestampFormat::is_valid_pattern(crate::config::DEFAULT_TIMESTAMP_FORMAT));

        let format = TimestampFormat::new("%Q", 0);
        assert_eq!(format.format(date), "2024-03-09T14:05:07+00:00");
    }

    #[test]
    fn test_message_serializes_display_timestamp_name() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = MessageRecord::new(
            "abc",
            Message {
                username: "anna".into(),
                message: "hi".into(),
                date,
                my_timestamp: "x".into(),
            },
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["myTimestamp"], "x");
        assert_eq!(json["username"], "anna");
    }
}
