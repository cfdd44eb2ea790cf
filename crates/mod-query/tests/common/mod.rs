#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mailscope_domain::{
    LabelInfo, LabelKind, MailTransport, MessageFormat, MessageList, MessageRef, Profile,
    QueryString, RawHeader, RawMessage, RawPart, Session, SessionProvider, ALL_MAIL_LABEL,
    UNREAD_LABEL,
};
use mailscope_error::{EngineError, FetchErrorKind};
use mailscope_query::{EngineConfig, RetryPolicy};

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub unread: bool,
    /// Minutes before the newest message.
    pub age_minutes: i64,
}

impl FakeMessage {
    pub fn new(id: impl Into<String>, sender: &str, subject: &str) -> Self {
        Self {
            id: id.into(),
            sender: sender.to_string(),
            subject: subject.to_string(),
            unread: false,
            age_minutes: 0,
        }
    }

    pub fn unread(mut self) -> Self {
        self.unread = true;
        self
    }

    fn matches(&self, query: &str) -> bool {
        query.split_whitespace().all(|term| {
            if term == "is:unread" {
                self.unread
            } else if let Some(addr) = term.strip_prefix("from:") {
                self.sender.contains(addr)
            } else if let Some(kw) = term.strip_prefix("subject:") {
                let kw = kw.trim_matches('"').to_lowercase();
                self.subject.to_lowercase().contains(&kw)
            } else {
                true
            }
        })
    }

    fn raw(&self) -> RawMessage {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let date = base - chrono::Duration::minutes(self.age_minutes);
        let mut labels = vec!["INBOX".to_string()];
        if self.unread {
            labels.push(UNREAD_LABEL.to_string());
        }
        RawMessage {
            id: self.id.clone(),
            thread_id: format!("t-{}", self.id),
            label_ids: Some(labels),
            snippet: Some(format!("preview of {}", self.id)),
            internal_date: None,
            payload: Some(RawPart {
                mime_type: Some("text/plain".into()),
                headers: Some(vec![
                    header("From", &self.sender),
                    header("Subject", &self.subject),
                    header("Date", &date.to_rfc2822()),
                ]),
                ..Default::default()
            }),
        }
    }
}

fn header(name: &str, value: &str) -> RawHeader {
    RawHeader {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// In-memory mailbox. Messages are stored newest first, like the provider
/// lists them.
#[derive(Default)]
pub struct FakeMailbox {
    pub messages: Vec<FakeMessage>,
    pub labels: Vec<LabelInfo>,
    pub total_messages: u64,
    pub missing_ids: HashSet<String>,
    pub revoked_ids: HashSet<String>,
    pub failing_labels: HashSet<String>,
    /// Remaining transient failures per message id.
    pub flaky_ids: Mutex<HashMap<String, u32>>,
    pub detail_delay: Option<Duration>,
    /// Per-id latency, overriding `detail_delay`.
    pub id_delays: HashMap<String, Duration>,
    pub sequential: bool,

    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub list_label_calls: AtomicUsize,
    pub label_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
    /// Message ids in the order their detail calls finished.
    pub completed: Mutex<Vec<String>>,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<FakeMessage>) -> Self {
        let messages: Vec<FakeMessage> = messages
            .into_iter()
            .enumerate()
            .map(|(i, mut m)| {
                m.age_minutes = i as i64;
                m
            })
            .collect();
        Self {
            total_messages: messages.len() as u64,
            messages,
            ..Default::default()
        }
    }

    /// `n` messages with ids `m000`, `m001`, ... newest first.
    pub fn numbered(n: usize) -> Self {
        Self::with_messages(
            (0..n)
                .map(|i| FakeMessage::new(format!("m{i:03}"), "Bulk <bulk@example.com>", "Newsletter"))
                .collect(),
        )
    }

    pub fn with_user_labels(mut self, n: usize) -> Self {
        self.labels.push(label("INBOX", "INBOX", LabelKind::System, true));
        self.labels.push(label(UNREAD_LABEL, UNREAD_LABEL, LabelKind::System, false));
        for i in 0..n {
            self.labels
                .push(label(&format!("Label_{i}"), &format!("Project {i}"), LabelKind::User, true));
        }
        self
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn unread_count(&self) -> u64 {
        self.messages.iter().filter(|m| m.unread).count() as u64
    }
}

fn label(id: &str, name: &str, kind: LabelKind, visible: bool) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        visible,
        messages_total: None,
        messages_unread: None,
    }
}

#[async_trait]
impl MailTransport for FakeMailbox {
    async fn list_messages(
        &self,
        query: &QueryString,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<MessageList, EngineError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());

        let matched: Vec<&FakeMessage> =
            self.messages.iter().filter(|m| m.matches(query.as_str())).collect();
        let offset: usize = page_token.map_or(0, |t| t.parse().unwrap());
        let end = (offset + page_size).min(matched.len());
        let next_page_token = (end < matched.len()).then(|| end.to_string());
        Ok(MessageList {
            messages: matched[offset..end]
                .iter()
                .map(|m| MessageRef {
                    id: m.id.clone(),
                    thread_id: format!("t-{}", m.id),
                })
                .collect(),
            next_page_token,
            result_size_estimate: matched.len() as u32,
        })
    }

    async fn get_message(&self, id: &str, _format: MessageFormat) -> Result<RawMessage, EngineError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.id_delays.get(id).copied().or(self.detail_delay) {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(id.to_string());

        if self.revoked_ids.contains(id) {
            return Err(EngineError::auth("token revoked"));
        }
        if self.missing_ids.contains(id) {
            return Err(EngineError::not_found(format!("message {id} not found")));
        }
        {
            let mut flaky = self.flaky_ids.lock().unwrap();
            if let Some(left) = flaky.get_mut(id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(EngineError::provider(FetchErrorKind::RateLimited, "429 slow down"));
                }
            }
        }
        self.messages
            .iter()
            .find(|m| m.id == id)
            .map(FakeMessage::raw)
            .ok_or_else(|| EngineError::not_found(format!("message {id} not found")))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>, EngineError> {
        self.list_label_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.labels.clone())
    }

    async fn get_label(&self, id: &str) -> Result<LabelInfo, EngineError> {
        self.label_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_labels.contains(id) {
            return Err(EngineError::provider(FetchErrorKind::Server, "503 backend error"));
        }
        let mut info = match id {
            ALL_MAIL_LABEL => label(ALL_MAIL_LABEL, ALL_MAIL_LABEL, LabelKind::System, false),
            _ => self
                .labels
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .ok_or_else(|| EngineError::not_found(format!("label {id} not found")))?,
        };
        info.messages_total = Some(match id {
            ALL_MAIL_LABEL | "INBOX" => self.total_messages,
            UNREAD_LABEL => self.unread_count(),
            _ => 3,
        });
        Ok(info)
    }

    async fn get_profile(&self) -> Result<Profile, EngineError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Profile {
            email_address: "me@example.com".into(),
            messages_total: self.total_messages,
            threads_total: self.total_messages,
        })
    }

    fn supports_concurrency(&self) -> bool {
        !self.sequential
    }
}

pub struct FakeProvider {
    pub mailbox: Arc<FakeMailbox>,
    pub refuse: bool,
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn acquire(&self) -> Result<Session, EngineError> {
        if self.refuse {
            return Err(EngineError::auth("no token file at ~/.credentials/gmail_token.json"));
        }
        Ok(Session::new(self.mailbox.clone()))
    }

    fn setup_instructions(&self) -> Vec<String> {
        vec!["Run the OAuth setup".to_string()]
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        page_size: 100,
        concurrency: 4,
        deadline: None,
        retry: RetryPolicy::immediate(3),
        ..Default::default()
    }
}

pub fn service(mailbox: FakeMailbox) -> (mailscope_query::MailService, Arc<FakeMailbox>) {
    service_with(mailbox, test_config())
}

pub fn service_with(
    mailbox: FakeMailbox,
    config: EngineConfig,
) -> (mailscope_query::MailService, Arc<FakeMailbox>) {
    let mailbox = Arc::new(mailbox);
    let provider = Arc::new(FakeProvider {
        mailbox: mailbox.clone(),
        refuse: false,
    });
    (mailscope_query::MailService::new(provider, config), mailbox)
}
