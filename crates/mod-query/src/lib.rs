pub mod config;
pub mod fetch;
pub mod format;
pub mod normalize;
pub mod query;
pub mod retry;
pub mod service;
pub mod stats;

pub use config::EngineConfig;
pub use format::Format;
pub use retry::RetryPolicy;
pub use service::{EmailRequest, EmailResponse, MailService, SearchInput};
