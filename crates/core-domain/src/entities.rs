use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use mailscope_error::Warning;
use serde::{Deserialize, Serialize};

/// System label carrying the unread message count.
pub const UNREAD_LABEL: &str = "UNREAD";
/// Synthetic label standing for the whole mailbox.
pub const ALL_MAIL_LABEL: &str = "ALL";

pub const UNKNOWN_SENDER: &str = "(unknown sender)";
pub const NO_SUBJECT: &str = "(no subject)";

/// Structured search filter. Every field is optional; an empty filter is only
/// valid when `all_mail` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilter {
    pub sender: Option<String>,
    pub subject_keywords: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub free_text: Option<String>,
    pub flags: BTreeSet<String>,
    pub all_mail: bool,
}

impl QueryFilter {
    pub fn all_mail() -> Self {
        Self {
            all_mail: true,
            ..Default::default()
        }
    }

    pub fn sender(address: impl Into<String>) -> Self {
        Self {
            sender: Some(address.into()),
            ..Default::default()
        }
    }

    pub fn subject<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject_keywords: keywords.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn date_range(start: impl Into<String>, end: Option<String>) -> Self {
        Self {
            start_date: Some(start.into()),
            end_date: end,
            ..Default::default()
        }
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.free_text = Some(text.into());
        self
    }

    pub fn has_criteria(&self) -> bool {
        self.sender.is_some()
            || !self.subject_keywords.is_empty()
            || self.start_date.is_some()
            || self.end_date.is_some()
            || self.free_text.is_some()
            || !self.flags.is_empty()
    }
}

/// Provider search syntax. Empty means "no query": the whole mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryString(String);

impl QueryString {
    pub fn new(q: impl Into<String>) -> Self {
        Self(q.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_all_mail(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QueryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Headers and snippet only.
    Metadata,
    /// Headers plus the whole MIME tree.
    Full,
}

impl MessageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
}

/// One page of a list call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub result_size_estimate: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    pub label_ids: Option<Vec<String>>,
    pub snippet: Option<String>,
    pub internal_date: Option<String>,
    pub payload: Option<RawPart>,
}

/// A node of the MIME tree as the provider reports it. The root payload uses
/// the same shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPart {
    pub part_id: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub headers: Option<Vec<RawHeader>>,
    pub body: Option<RawBody>,
    pub parts: Option<Vec<RawPart>>,
}

impl RawPart {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_deref()?
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn is_mime(&self, target: &str) -> bool {
        self.mime_type
            .as_deref()
            .and_then(|m| m.get(..target.len()))
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(target))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBody {
    pub size: Option<u64>,
    pub data: Option<String>,
    pub attachment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    /// `None` when the Date header is missing or unparseable.
    pub received_at: Option<DateTime<Utc>>,
    pub snippet: String,
    pub label_ids: BTreeSet<String>,
}

impl MessageSummary {
    pub fn is_unread(&self) -> bool {
        self.label_ids.contains(UNREAD_LABEL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageContent {
    #[serde(flatten)]
    pub summary: MessageSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    pub body_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    pub attachments: Vec<AttachmentMeta>,
}

/// Messages returned by a list-style request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmailBatch {
    pub messages: Vec<MessageSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    /// Set when the deadline cut collection short.
    pub truncated: bool,
    pub result_size_estimate: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailStatistics {
    pub unread_count: Option<u64>,
    pub total_count: Option<u64>,
    pub label_counts: BTreeMap<String, u64>,
    pub computed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
    pub kind: LabelKind,
    pub visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_unread: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub email_address: String,
    pub messages_total: u64,
    pub threads_total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupStatus {
    Ok,
    Partial,
    Error,
}

impl fmt::Display for SetupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Partial => write!(f, "partial"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub status: SetupStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_message_deserializes_provider_json() {
        let json = r#"{
            "id": "18c2a",
            "threadId": "18c2a",
            "labelIds": ["INBOX", "UNREAD"],
            "snippet": "See you at 10",
            "internalDate": "1700000000000",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [{"name": "Subject", "value": "Standup"}],
                "parts": [
                    {"partId": "0", "mimeType": "text/plain", "body": {"size": 5, "data": "aGVsbG8"}}
                ]
            }
        }"#;
        let msg: RawMessage = serde_json::from_str(json).unwrap();
        let payload = msg.payload.unwrap();
        assert_eq!(payload.header("subject"), Some("Standup"));
        assert!(payload.is_mime("multipart/"));
        assert_eq!(payload.parts.unwrap()[0].body.as_ref().unwrap().size, Some(5));
    }

    #[test]
    fn empty_list_page_deserializes() {
        let list: MessageList = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(list.messages.is_empty());
        assert!(list.next_page_token.is_none());
    }

    #[test]
    fn filter_criteria() {
        assert!(!QueryFilter::all_mail().has_criteria());
        assert!(QueryFilter::sender("a@b.io").has_criteria());
        assert!(QueryFilter::default().flag("unread").has_criteria());
    }
}
