use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use mailscope_domain::{Session, SessionProvider};
use mailscope_error::EngineError;
use serde::Deserialize;
use tracing::{debug, info};

use crate::adapter::{GmailConfig, GmailTransport};

const CONSOLE_STEPS: [&str; 6] = [
    "Go to Google Cloud Console (https://console.cloud.google.com/)",
    "Create a new project or select an existing one",
    "Enable the Gmail API (APIs & Services > Library > Gmail API)",
    "Create credentials (APIs & Services > Credentials > Create Credentials > OAuth client ID)",
    "Choose 'Desktop application' as the application type",
    "Download the JSON file and save it as the credentials file",
];

/// Token file written by the OAuth setup tool (authorized-user JSON).
#[derive(Deserialize)]
struct StoredToken {
    #[serde(alias = "access_token")]
    token: Option<String>,
    expiry: Option<String>,
}

/// Hands out Gmail sessions from a static token. Refresh is left to the
/// OAuth setup tool that writes the token file.
pub struct GmailSessionProvider {
    config: GmailConfig,
}

impl GmailSessionProvider {
    pub fn new(config: GmailConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GmailConfig {
        &self.config
    }

    async fn resolve_token(&self) -> Result<String, EngineError> {
        if let Some(ref t) = self.config.access_token {
            if !t.trim().is_empty() {
                debug!("using access token from environment");
                return Ok(t.trim().to_string());
            }
        }
        let path = &self.config.token_path;
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            EngineError::auth(format!(
                "cannot read token file {}: {e}; run the Gmail OAuth setup first",
                path.display()
            ))
        })?;
        parse_token_file(&contents, Utc::now())
    }
}

#[async_trait]
impl SessionProvider for GmailSessionProvider {
    async fn acquire(&self) -> Result<Session, EngineError> {
        let token = self.resolve_token().await?;
        let transport = GmailTransport::new(&self.config, token)?;
        info!(base_url = %self.config.base_url, "gmail session ready");
        Ok(Session::new(Arc::new(transport)))
    }

    fn setup_instructions(&self) -> Vec<String> {
        let creds = &self.config.credentials_path;
        let token = self.config.token_path.display();
        let mut steps: Vec<String> = Vec::new();
        if !creds.exists() {
            steps.extend(CONSOLE_STEPS.iter().map(|s| s.to_string()));
            steps.push(format!("Expected credentials file: {}", creds.display()));
        }
        steps.push(format!(
            "Run the OAuth setup with {} to authorize read-only Gmail access",
            creds.display()
        ));
        steps.push(format!("The setup writes the token to {token}"));
        steps.push("Or export GMAIL_ACCESS_TOKEN with a valid gmail.readonly bearer token".into());
        steps
    }
}

fn parse_token_file(contents: &str, now: DateTime<Utc>) -> Result<String, EngineError> {
    let stored: StoredToken = serde_json::from_str(contents)
        .map_err(|e| EngineError::auth(format!("token file is not valid JSON: {e}")))?;
    let token = stored
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| EngineError::auth("token file has no access token"))?;

    if let Some(raw) = stored.expiry {
        let expiry = parse_expiry(&raw)
            .ok_or_else(|| EngineError::auth(format!("token file has an unreadable expiry '{raw}'")))?;
        if expiry <= now {
            return Err(EngineError::auth(format!(
                "access token expired at {expiry}; re-run the Gmail OAuth setup to refresh it"
            )));
        }
    }
    Ok(token)
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

/// Resolves a leading `~/` against `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => Path::new(&home).join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn reads_authorized_user_token() {
        let json = r#"{"token": "ya29.abc", "refresh_token": "1//x", "expiry": "2024-06-01T12:30:00.123456Z"}"#;
        assert_eq!(parse_token_file(json, now()).unwrap(), "ya29.abc");
    }

    #[test]
    fn accepts_access_token_key_and_naive_expiry() {
        let json = r#"{"access_token": "ya29.def", "expiry": "2024-06-01T13:00:00"}"#;
        assert_eq!(parse_token_file(json, now()).unwrap(), "ya29.def");
    }

    #[test]
    fn no_expiry_is_accepted() {
        assert_eq!(parse_token_file(r#"{"token": "t"}"#, now()).unwrap(), "t");
    }

    #[test]
    fn expired_token_is_auth_error() {
        let json = r#"{"token": "ya29.old", "expiry": "2024-06-01T11:00:00Z"}"#;
        let err = parse_token_file(json, now()).unwrap_err();
        assert!(err.is_auth());
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn broken_files() {
        assert!(parse_token_file("not json", now()).unwrap_err().is_auth());
        assert!(parse_token_file(r#"{"token": "  "}"#, now()).unwrap_err().is_auth());
        assert!(parse_token_file(r#"{"token": "t", "expiry": "soon"}"#, now())
            .unwrap_err()
            .is_auth());
    }

    #[tokio::test]
    async fn missing_token_file_is_auth_error() {
        let provider = GmailSessionProvider::new(GmailConfig {
            token_path: PathBuf::from("/nonexistent/mailscope/token.json"),
            ..Default::default()
        });
        let err = provider.acquire().await.err().unwrap();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn env_token_wins() {
        let provider = GmailSessionProvider::new(GmailConfig {
            access_token: Some(" ya29.env ".into()),
            token_path: PathBuf::from("/nonexistent/mailscope/token.json"),
            ..Default::default()
        });
        assert_eq!(provider.resolve_token().await.unwrap(), "ya29.env");
    }

    #[test]
    fn setup_steps_mention_paths() {
        let provider = GmailSessionProvider::new(GmailConfig {
            credentials_path: PathBuf::from("/nonexistent/credentials.json"),
            token_path: PathBuf::from("/tmp/tok.json"),
            ..Default::default()
        });
        let steps = provider.setup_instructions();
        assert!(steps[0].contains("console.cloud.google.com"));
        assert!(steps.iter().any(|s| s.contains("/tmp/tok.json")));
    }

    #[test]
    fn home_expansion() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_home("~/x.json"), Path::new(&home).join("x.json"));
        }
    }
}
