mod server;
pub mod tools;
pub mod types;

pub use server::McpServer;
