use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use mailscope_domain::*;
use mailscope_error::{EngineError, FetchErrorKind};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
const METADATA_HEADERS: [&str; 4] = ["From", "To", "Subject", "Date"];

#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// Bearer token taking precedence over the token file.
    pub access_token: Option<String>,
    pub token_path: PathBuf,
    pub credentials_path: PathBuf,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            token_path: crate::auth::expand_home("~/.credentials/gmail_token.json"),
            credentials_path: PathBuf::from("credentials.json"),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Read-only Gmail REST client for one authenticated user.
pub struct GmailTransport {
    client: Client,
    base_url: String,
    token: String,
}

impl GmailTransport {
    pub fn new(config: &GmailConfig, token: String) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::internal(format!("http client init: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn api_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, EngineError> {
        let url = format!("{}/users/me/{path}", self.base_url);
        debug!(url, "gmail GET");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }
        resp.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                EngineError::fatal(
                    FetchErrorKind::Malformed,
                    format!("gmail response parse failed: {e}"),
                )
            } else {
                transport_error(e)
            }
        })
    }
}

#[async_trait]
impl MailTransport for GmailTransport {
    async fn list_messages(
        &self,
        query: &QueryString,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<MessageList, EngineError> {
        self.api_get("messages", &list_params(query, page_token, page_size))
            .await
    }

    async fn get_message(&self, id: &str, format: MessageFormat) -> Result<RawMessage, EngineError> {
        check_id("message_id", id)?;
        let mut params = vec![("format", format.as_str().to_string())];
        if format == MessageFormat::Metadata {
            params.extend(METADATA_HEADERS.iter().map(|h| ("metadataHeaders", h.to_string())));
        }
        self.api_get(&format!("messages/{id}"), &params).await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>, EngineError> {
        let list: GmailLabelList = self.api_get("labels", &[]).await?;
        Ok(list.labels.into_iter().map(GmailLabel::into_info).collect())
    }

    async fn get_label(&self, id: &str) -> Result<LabelInfo, EngineError> {
        if id == ALL_MAIL_LABEL {
            let profile = self.get_profile().await?;
            return Ok(LabelInfo {
                id: ALL_MAIL_LABEL.to_string(),
                name: "All Mail".to_string(),
                kind: LabelKind::System,
                visible: false,
                messages_total: Some(profile.messages_total),
                messages_unread: None,
            });
        }
        check_id("label_id", id)?;
        let label: GmailLabel = self.api_get(&format!("labels/{id}"), &[]).await?;
        Ok(label.into_info())
    }

    async fn get_profile(&self) -> Result<Profile, EngineError> {
        let p: GmailProfile = self.api_get("profile", &[]).await?;
        Ok(Profile {
            email_address: p.email_address,
            messages_total: p.messages_total,
            threads_total: p.threads_total,
        })
    }
}

#[derive(Deserialize)]
struct GmailLabelList {
    #[serde(default)]
    labels: Vec<GmailLabel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailLabel {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    label_list_visibility: Option<String>,
    messages_total: Option<u64>,
    messages_unread: Option<u64>,
}

impl GmailLabel {
    fn into_info(self) -> LabelInfo {
        let kind = match self.kind.as_deref() {
            Some("user") => LabelKind::User,
            _ => LabelKind::System,
        };
        // system labels without an explicit setting are internal (UNREAD, CATEGORY_*)
        let visible = match self.label_list_visibility.as_deref() {
            Some("labelHide") => false,
            Some(_) => true,
            None => kind == LabelKind::User,
        };
        LabelInfo {
            id: self.id,
            name: self.name,
            kind,
            visible,
            messages_total: self.messages_total,
            messages_unread: self.messages_unread,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailProfile {
    email_address: String,
    #[serde(default)]
    messages_total: u64,
    #[serde(default)]
    threads_total: u64,
}

fn list_params(
    query: &QueryString,
    page_token: Option<&str>,
    page_size: usize,
) -> Vec<(&'static str, String)> {
    let mut params = vec![("maxResults", page_size.to_string())];
    if !query.is_all_mail() {
        params.push(("q", query.as_str().to_string()));
    }
    if let Some(t) = page_token {
        params.push(("pageToken", t.to_string()));
    }
    params
}

fn check_id(field: &'static str, id: &str) -> Result<(), EngineError> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(EngineError::validation(field, format!("'{id}' is not a Gmail id")))
    }
}

fn transport_error(e: reqwest::Error) -> EngineError {
    let kind = if e.is_timeout() {
        FetchErrorKind::Timeout
    } else {
        FetchErrorKind::Network
    };
    EngineError::provider(kind, format!("gmail request failed: {e}"))
}

/// Maps a non-2xx Gmail response onto the engine error taxonomy.
pub fn classify_status(status: u16, body: &str) -> EngineError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let err = &parsed["error"];
    let message = err["message"]
        .as_str()
        .filter(|m| !m.is_empty())
        .unwrap_or(body)
        .to_string();
    let reasons: Vec<&str> = ["errors", "details"]
        .iter()
        .filter_map(|k| err[*k].as_array())
        .flatten()
        .filter_map(|e| e["reason"].as_str())
        .collect();
    let has = |r: &str| reasons.iter().any(|x| *x == r);
    let detail = format!("gmail {status}: {message}");

    match status {
        401 => EngineError::auth(detail),
        403 if has("rateLimitExceeded") || has("userRateLimitExceeded") => {
            EngineError::provider(FetchErrorKind::RateLimited, detail)
        }
        403 if has("insufficientPermissions") || has("ACCESS_TOKEN_SCOPE_INSUFFICIENT") => {
            EngineError::auth(detail)
        }
        403 if has("quotaExceeded") || has("dailyLimitExceeded") => {
            EngineError::fatal(FetchErrorKind::QuotaExceeded, detail)
        }
        403 => EngineError::fatal(FetchErrorKind::PermissionDenied, detail),
        429 => EngineError::provider(FetchErrorKind::RateLimited, detail),
        400 => EngineError::fatal(FetchErrorKind::InvalidQuery, detail),
        404 => EngineError::not_found(detail),
        500..=599 => EngineError::provider(FetchErrorKind::Server, detail),
        _ => EngineError::fatal(FetchErrorKind::Malformed, detail),
    }
}
