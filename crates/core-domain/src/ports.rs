use std::sync::Arc;

use async_trait::async_trait;
use mailscope_error::EngineError;

use crate::entities::{LabelInfo, MessageFormat, MessageList, Profile, QueryString, RawMessage};

/// Read-only calls against the mailbox provider. Implementations must never
/// modify remote state.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn list_messages(
        &self,
        query: &QueryString,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<MessageList, EngineError>;

    async fn get_message(&self, id: &str, format: MessageFormat)
        -> Result<RawMessage, EngineError>;

    /// Label metadata without counts.
    async fn list_labels(&self) -> Result<Vec<LabelInfo>, EngineError>;

    /// Label metadata including its message counts.
    async fn get_label(&self, id: &str) -> Result<LabelInfo, EngineError>;

    async fn get_profile(&self) -> Result<Profile, EngineError>;

    /// Whether several in-flight calls may share this transport.
    fn supports_concurrency(&self) -> bool {
        true
    }
}

/// An authenticated transport checked out for one request cycle.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn MailTransport>,
}

impl Session {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &dyn MailTransport {
        self.transport.as_ref()
    }
}

/// Hands out sessions. Credential storage and refresh live behind this trait.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Session, EngineError>;

    /// Steps shown to the user when no session can be acquired.
    fn setup_instructions(&self) -> Vec<String> {
        Vec::new()
    }
}
