//! Message model and Gmail wire types.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Headers requested in metadata mode.
pub const METADATA_HEADERS: [&str; 4] = ["Subject", "From", "Date", "List-Unsubscribe"];

/// A fetched email message.
///
/// Immutable once fetched. Only the metadata needed for subscription
/// detection is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Gmail message id (unique per mailbox).
    pub id: String,
    /// Gmail thread id.
    pub thread_id: String,
    /// Short plain-text excerpt of the body.
    pub snippet: String,
    /// Subject header.
    pub subject: String,
    /// Raw `From` header.
    pub from: String,
    /// Server-side receive time in milliseconds since the Unix epoch.
    pub internal_date: i64,
    /// Whether a `List-Unsubscribe` header was present.
    pub has_unsubscribe_header: bool,
}

impl Message {
    /// Receive time as a UTC timestamp.
    ///
    /// Out-of-range values collapse to the Unix epoch.
    #[must_use]
    pub fn date(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.internal_date)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Subject and snippet joined for keyword analysis.
    #[must_use]
    pub fn text(&self) -> String {
        format!("{} {}", self.subject, self.snippet)
    }
}

/// Detail level for a message fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Full payload including body parts.
    Full,
    /// Headers only (Subject/From/Date/List-Unsubscribe).
    #[default]
    Metadata,
    /// Ids and labels only.
    Minimal,
}

impl MessageFormat {
    /// Query-string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Metadata => "metadata",
            Self::Minimal => "minimal",
        }
    }
}

/// Reference to a message returned by search or history queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message id.
    pub id: String,
    /// Thread id.
    #[serde(default)]
    pub thread_id: String,
}

/// Raw `users.messages.get` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub snippet: String,
    /// Gmail encodes this int64 as a string.
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: Option<RawPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawPayload {
    #[serde(default)]
    pub headers: Vec<RawHeader>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawHeader {
    pub name: String,
    pub value: String,
}

impl RawMessage {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref().and_then(|payload| {
            payload
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.as_str())
        })
    }
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        let subject = raw.header("Subject").unwrap_or_default().to_string();
        let from = raw.header("From").unwrap_or_default().to_string();
        let has_unsubscribe_header = raw.header("List-Unsubscribe").is_some();
        let internal_date = raw
            .internal_date
            .as_deref()
            .and_then(|d| d.parse::<i64>().ok())
            .unwrap_or_default();

        Self {
            id: raw.id,
            thread_id: raw.thread_id,
            snippet: decode_entities(&raw.snippet),
            subject,
            from,
            internal_date,
            has_unsubscribe_header,
        }
    }
}

/// Gmail snippets arrive HTML-escaped.
fn decode_entities(text: &str) -> String {
    text.replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_message_conversion() {
        let json = r#"{
            "id": "18c1",
            "threadId": "18c0",
            "snippet": "Your plan renews on Jan 5 &amp; you&#39;ll be charged $9.99",
            "internalDate": "1704067200000",
            "payload": {
                "headers": [
                    {"name": "Subject", "value": "Your receipt"},
                    {"name": "From", "value": "Spotify <no-reply@spotify.com>"},
                    {"name": "list-unsubscribe", "value": "<mailto:unsub@spotify.com>"}
                ]
            }
        }"#;

        let raw: RawMessage = serde_json::from_str(json).unwrap();
        let message = Message::from(raw);
        assert_eq!(message.id, "18c1");
        assert_eq!(message.thread_id, "18c0");
        assert_eq!(message.subject, "Your receipt");
        assert_eq!(message.from, "Spotify <no-reply@spotify.com>");
        assert!(message.has_unsubscribe_header);
        assert_eq!(message.internal_date, 1_704_067_200_000);
        assert!(message.snippet.contains("& you'll"));
        assert_eq!(message.date().to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_missing_payload_defaults() {
        let raw: RawMessage = serde_json::from_str(r#"{"id": "a"}"#).unwrap();
        let message = Message::from(raw);
        assert!(message.subject.is_empty());
        assert!(!message.has_unsubscribe_header);
        assert_eq!(message.internal_date, 0);
    }

    #[test]
    fn test_format_strings() {
        assert_eq!(MessageFormat::Full.as_str(), "full");
        assert_eq!(MessageFormat::default().as_str(), "metadata");
        assert_eq!(MessageFormat::Minimal.as_str(), "minimal");
    }
}
