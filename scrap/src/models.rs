//! Core data models for Scrap
//!
//! `Message` is the in-memory record; `PersistedMessage` is its JSON shape in
//! the durable snapshot (date as an ISO-8601 string).

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A single saved text entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub date: DateTime<Utc>,
    /// Reply threading. Weak reference by id, never validated.
    pub parent: Option<String>,
}

impl Message {
    /// Build a message from raw text: trimmed, stamped with a fresh id and the
    /// current time. Returns `None` for blank text.
    pub fn from_text(text: &str) -> Option<Self> {
        let text = normalize_text(text)?;
        Some(Self {
            id: new_message_id(),
            text,
            date: now_millis(),
            parent: None,
        })
    }

    /// Same as `from_text`, replying to `parent`
    pub fn reply_to(text: &str, parent: &str) -> Option<Self> {
        let mut message = Self::from_text(text)?;
        message.parent = Some(parent.to_string());
        Some(message)
    }

    /// Apply a partial update. `id` is never touched.
    /// Returns `false` (and leaves the message unchanged) if the patch would blank the text.
    pub fn apply(&mut self, patch: MessagePatch) -> bool {
        let text = match patch.text {
            Some(raw) => match normalize_text(&raw) {
                Some(text) => Some(text),
                None => return false,
            },
            None => None,
        };

        if let Some(text) = text {
            self.text = text;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(parent) = patch.parent {
            self.parent = parent;
        }
        true
    }

    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.text.trim().is_empty()
    }

    pub fn to_persisted(&self) -> PersistedMessage {
        PersistedMessage {
            id: self.id.clone(),
            text: self.text.clone(),
            date: format_date(&self.date),
            parent: self.parent.clone(),
        }
    }
}

/// Partial update for a message. `None` fields are left alone;
/// `parent: Some(None)` clears the parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub parent: Option<Option<String>>,
}

impl MessagePatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn date(date: DateTime<Utc>) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    pub fn parent(parent: Option<String>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }
}

/// JSON shape of a message inside the persisted snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub id: String,
    pub text: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl PersistedMessage {
    /// Structural validation on the way back in. `None` means drop the record.
    pub fn into_message(self) -> Option<Message> {
        if self.id.trim().is_empty() || self.text.trim().is_empty() {
            return None;
        }
        let date = parse_date(&self.date)?;
        Some(Message {
            id: self.id,
            text: self.text,
            date,
            parent: self.parent.filter(|p| !p.trim().is_empty()),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HELPERS
// ─────────────────────────────────────────────────────────────────────────────

/// Trim text; `None` if nothing is left
pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time truncated to milliseconds, the precision of the persisted form
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// `2024-05-01T09:30:00.000Z`
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Stable sort, most recent first. Equal dates keep their relative order.
pub fn sort_by_recency(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.date.cmp(&a.date));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_text_trims_and_stamps() {
        let message = Message::from_text("  check http://foo.com \n").unwrap();
        assert_eq!(message.text, "check http://foo.com");
        assert!(!message.id.is_empty());
        assert_eq!(message.parent, None);
        assert_eq!(message.date.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_from_text_rejects_blank() {
        assert!(Message::from_text("").is_none());
        assert!(Message::from_text("   ").is_none());
        assert!(Message::from_text("\n\t").is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Message::from_text("a").unwrap();
        let b = Message::from_text("a").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_apply_patch() {
        let mut message = Message::from_text("hello").unwrap();
        let id = message.id.clone();
        let date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        assert!(message.apply(MessagePatch {
            text: Some("  edited ".to_string()),
            date: Some(date),
            parent: Some(Some("other".to_string())),
        }));
        assert_eq!(message.id, id);
        assert_eq!(message.text, "edited");
        assert_eq!(message.date, date);
        assert_eq!(message.parent.as_deref(), Some("other"));

        assert!(message.apply(MessagePatch::parent(None)));
        assert_eq!(message.parent, None);
    }

    #[test]
    fn test_apply_blank_text_is_rejected() {
        let mut message = Message::from_text("keep me").unwrap();
        let before = message.clone();
        assert!(!message.apply(MessagePatch {
            text: Some("   ".to_string()),
            date: Some(Utc::now()),
            parent: None,
        }));
        assert_eq!(message, before);
    }

    #[test]
    fn test_date_format_is_js_iso() {
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        assert_eq!(format_date(&date), "2024-05-01T09:30:00.000Z");
        assert_eq!(parse_date("2024-05-01T09:30:00.000Z"), Some(date));
        assert_eq!(parse_date("2024-05-01T11:30:00+02:00"), Some(date));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_persisted_roundtrip_and_validation() {
        let message = Message::reply_to("reply", "parent-id").unwrap();
        let persisted = message.to_persisted();
        assert_eq!(persisted.clone().into_message(), Some(message));

        let blank = PersistedMessage {
            text: "  ".to_string(),
            ..persisted.clone()
        };
        assert_eq!(blank.into_message(), None);

        let bad_date = PersistedMessage {
            date: "not a date".to_string(),
            ..persisted
        };
        assert_eq!(bad_date.into_message(), None);
    }

    #[test]
    fn test_sort_by_recency_is_stable() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let make = |id: &str, date| Message {
            id: id.to_string(),
            text: id.to_string(),
            date,
            parent: None,
        };
        let mut messages = vec![make("a", t1), make("b", t2), make("c", t1), make("d", t2)];
        sort_by_recency(&mut messages);
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a", "c"]);
    }
}
