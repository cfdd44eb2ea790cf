use std::sync::Arc;

use chrono::Utc;
use mailscope_domain::{
    EmailBatch, EmailStatistics, LabelInfo, MessageContent, QueryFilter, QueryString, SessionProvider,
    SetupReport, SetupStatus,
};
use mailscope_error::EngineError;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::fetch::{self, FetchOptions};
use crate::format::{self, Format};
use crate::{query, stats};

const PARTIAL_SETUP_STEPS: [&str; 4] = [
    "A session was created but the Gmail API call failed",
    "Check your internet connection",
    "Verify that the Gmail API is enabled for the Cloud project",
    "Delete the token file and re-run the OAuth setup to force re-authentication",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchInput {
    /// Provider search syntax, passed through untouched.
    Raw(String),
    Filter(QueryFilter),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailRequest {
    Recent { max_results: usize },
    Unread { max_results: usize },
    Search { query: SearchInput, max_results: usize },
    FromSender { address: String, max_results: usize },
    WithSubject { keywords: Vec<String>, max_results: usize },
    DateRange { start: String, end: Option<String>, max_results: usize },
    ReadContent { id: String },
    Statistics,
    Labels,
    CheckSetup,
}

#[derive(Debug, Clone)]
pub enum EmailResponse {
    Messages(EmailBatch),
    Content(MessageContent),
    Statistics(EmailStatistics),
    Labels(Vec<LabelInfo>),
    Setup(SetupReport),
}

impl EmailResponse {
    pub fn render(&self, fmt: Format) -> String {
        match self {
            Self::Messages(b) => format::format_batch(b, fmt),
            Self::Content(c) => format::format_content(c, fmt),
            Self::Statistics(s) => format::format_statistics(s, fmt),
            Self::Labels(l) => format::format_labels(l, fmt),
            Self::Setup(r) => format::format_setup(r, fmt),
        }
    }
}

/// Entry point for the agent layer. Holds no mailbox state between calls;
/// every operation acquires a fresh session and drops it on return.
pub struct MailService {
    provider: Arc<dyn SessionProvider>,
    config: EngineConfig,
}

impl MailService {
    pub fn new(provider: Arc<dyn SessionProvider>, config: EngineConfig) -> Self {
        Self {
            provider,
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn execute(&self, req: EmailRequest) -> Result<EmailResponse, EngineError> {
        let resp = match req {
            EmailRequest::Recent { max_results } => {
                EmailResponse::Messages(self.get_recent_emails(max_results).await?)
            }
            EmailRequest::Unread { max_results } => {
                EmailResponse::Messages(self.get_unread_emails(max_results).await?)
            }
            EmailRequest::Search { query, max_results } => {
                EmailResponse::Messages(self.search_emails(query, max_results).await?)
            }
            EmailRequest::FromSender {
                address,
                max_results,
            } => EmailResponse::Messages(self.get_emails_from_sender(&address, max_results).await?),
            EmailRequest::WithSubject {
                keywords,
                max_results,
            } => EmailResponse::Messages(self.get_emails_with_subject(keywords, max_results).await?),
            EmailRequest::DateRange {
                start,
                end,
                max_results,
            } => EmailResponse::Messages(
                self.get_emails_by_date_range(&start, end, max_results)
                    .await?,
            ),
            EmailRequest::ReadContent { id } => {
                EmailResponse::Content(self.read_email_content(&id).await?)
            }
            EmailRequest::Statistics => EmailResponse::Statistics(self.get_email_statistics().await?),
            EmailRequest::Labels => EmailResponse::Labels(self.get_labels().await?),
            EmailRequest::CheckSetup => EmailResponse::Setup(self.check_setup().await),
        };
        Ok(resp)
    }

    pub async fn get_recent_emails(&self, max_results: usize) -> Result<EmailBatch, EngineError> {
        let q = query::build(&QueryFilter::all_mail())?;
        self.run_query(&q, max_results).await
    }

    pub async fn get_unread_emails(&self, max_results: usize) -> Result<EmailBatch, EngineError> {
        let q = query::build(&QueryFilter::default().flag("unread"))?;
        self.run_query(&q, max_results).await
    }

    pub async fn search_emails(
        &self,
        input: SearchInput,
        max_results: usize,
    ) -> Result<EmailBatch, EngineError> {
        let q = match input {
            SearchInput::Raw(raw) => query::raw(&raw)?,
            SearchInput::Filter(filter) => query::build(&filter)?,
        };
        self.run_query(&q, max_results).await
    }

    pub async fn get_emails_from_sender(
        &self,
        address: &str,
        max_results: usize,
    ) -> Result<EmailBatch, EngineError> {
        let q = query::build(&QueryFilter::sender(address))?;
        self.run_query(&q, max_results).await
    }

    pub async fn get_emails_with_subject(
        &self,
        keywords: Vec<String>,
        max_results: usize,
    ) -> Result<EmailBatch, EngineError> {
        if keywords.is_empty() {
            return Err(EngineError::validation("subject", "at least one keyword is required"));
        }
        let q = query::build(&QueryFilter::subject(keywords))?;
        self.run_query(&q, max_results).await
    }

    pub async fn get_emails_by_date_range(
        &self,
        start: &str,
        end: Option<String>,
        max_results: usize,
    ) -> Result<EmailBatch, EngineError> {
        let q = query::build(&QueryFilter::date_range(start, end))?;
        self.run_query(&q, max_results).await
    }

    pub async fn read_email_content(&self, id: &str) -> Result<MessageContent, EngineError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(EngineError::validation("message_id", "cannot be empty"));
        }
        let session = self.provider.acquire().await?;
        let content = fetch::fetch_content(session.transport(), id, &self.config.retry).await?;
        info!(
            id,
            attachments = content.attachments.len(),
            has_html = content.body_html.is_some(),
            "read message"
        );
        Ok(content)
    }

    pub async fn get_email_statistics(&self) -> Result<EmailStatistics, EngineError> {
        let session = self.provider.acquire().await?;
        stats::compute_statistics(&session, &self.config).await
    }

    pub async fn get_labels(&self) -> Result<Vec<LabelInfo>, EngineError> {
        let session = self.provider.acquire().await?;
        let transport = session.transport();
        let labels = self
            .config
            .retry
            .run("list_labels", || transport.list_labels())
            .await?;
        info!(count = labels.len(), "listed labels");
        Ok(labels)
    }

    /// Reports whether the mailbox is reachable. Problems land in the report.
    pub async fn check_setup(&self) -> SetupReport {
        let session = match self.provider.acquire().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "setup check: no session");
                return SetupReport {
                    status: SetupStatus::Error,
                    message: e.to_string(),
                    account: None,
                    instructions: self.provider.setup_instructions(),
                    checked_at: Utc::now(),
                };
            }
        };

        let transport = session.transport();
        let report = match self
            .config
            .retry
            .run("get_profile", || transport.get_profile())
            .await
        {
            Ok(profile) => SetupReport {
                status: SetupStatus::Ok,
                message: "Gmail API is configured and authenticated".to_string(),
                account: Some(profile.email_address),
                instructions: Vec::new(),
                checked_at: Utc::now(),
            },
            Err(e) => SetupReport {
                status: SetupStatus::Partial,
                message: format!("session created but the API call failed: {e}"),
                account: None,
                instructions: PARTIAL_SETUP_STEPS.iter().map(|s| s.to_string()).collect(),
                checked_at: Utc::now(),
            },
        };
        info!(status = %report.status, "setup checked");
        report
    }

    async fn run_query(&self, q: &QueryString, max_results: usize) -> Result<EmailBatch, EngineError> {
        let max_results = self.config.resolve_max_results(max_results);
        let session = self.provider.acquire().await?;
        let opts = FetchOptions::from_config(&self.config, max_results);
        fetch::fetch(session.transport(), q, &opts).await
    }
}
