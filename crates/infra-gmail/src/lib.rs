pub mod adapter;
pub mod auth;

pub use adapter::{GmailConfig, GmailTransport};
pub use auth::GmailSessionProvider;
