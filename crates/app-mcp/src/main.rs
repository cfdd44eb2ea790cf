mod mcp;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use mailscope_domain::SetupStatus;
use mailscope_gmail::{GmailConfig, GmailSessionProvider};
use mailscope_query::format::{self, Format};
use mailscope_query::{EngineConfig, MailService, RetryPolicy};
use tracing::{error, info};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mailscope=info")),
        )
        .compact()
        .init();
}

fn env_or<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|e| format!("invalid {key}: {e}")),
        _ => Ok(default),
    }
}

fn load_engine_config() -> Result<EngineConfig, String> {
    let defaults = EngineConfig::default();
    let deadline_secs: u64 = env_or("MAILSCOPE_DEADLINE_SECS", 60)?;
    let retry = RetryPolicy {
        max_attempts: env_or("MAILSCOPE_RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
        base_delay: Duration::from_millis(env_or("MAILSCOPE_RETRY_BASE_MS", 500)?),
        ..defaults.retry.clone()
    };
    Ok(EngineConfig {
        page_size: env_or("MAILSCOPE_PAGE_SIZE", defaults.page_size)?,
        concurrency: env_or("MAILSCOPE_CONCURRENCY", defaults.concurrency)?,
        deadline: (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)),
        retry,
        ..defaults
    }
    .normalized())
}

fn load_gmail_config() -> GmailConfig {
    let defaults = GmailConfig::default();
    GmailConfig {
        access_token: env::var("GMAIL_ACCESS_TOKEN").ok().filter(|t| !t.trim().is_empty()),
        token_path: env::var("GMAIL_TOKEN_PATH")
            .map(|p| mailscope_gmail::auth::expand_home(&p))
            .unwrap_or(defaults.token_path),
        credentials_path: env::var("GMAIL_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.credentials_path),
        base_url: env::var("GMAIL_API_BASE").unwrap_or(defaults.base_url),
        ..defaults
    }
}

fn build_service() -> Result<MailService, String> {
    let engine = load_engine_config()?;
    let gmail = load_gmail_config();
    info!(
        token_path = %gmail.token_path.display(),
        page_size = engine.page_size,
        concurrency = engine.concurrency,
        "engine configured"
    );
    let provider = Arc::new(GmailSessionProvider::new(gmail));
    Ok(MailService::new(provider, engine))
}

async fn run_mcp_server() -> Result<(), Box<dyn std::error::Error>> {
    let service = build_service()?;
    let server = mcp::McpServer::new(service);
    server.run().await?;
    Ok(())
}

async fn run_check() -> Result<bool, Box<dyn std::error::Error>> {
    let service = build_service()?;
    let report = service.check_setup().await;
    println!("{}", format::format_setup(&report, Format::Expanded));
    Ok(report.status == SetupStatus::Ok)
}

fn print_help() {
    eprintln!("Mailscope: read-only Gmail query tools for agents");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  mailscope mcp     Start MCP server (stdio)");
    eprintln!("  mailscope check   Check Gmail credentials and API access");
    eprintln!("  mailscope help    Show this help");
    eprintln!();
    eprintln!("Environment variables:");
    eprintln!("  GMAIL_ACCESS_TOKEN        Bearer token (overrides the token file)");
    eprintln!("  GMAIL_TOKEN_PATH          OAuth token file (default: ~/.credentials/gmail_token.json)");
    eprintln!("  GMAIL_CREDENTIALS_PATH    OAuth client file (default: credentials.json)");
    eprintln!("  GMAIL_API_BASE            API base URL (default: https://gmail.googleapis.com/gmail/v1)");
    eprintln!("  MAILSCOPE_PAGE_SIZE       Ids per list call (default: 100, max: 500)");
    eprintln!("  MAILSCOPE_CONCURRENCY     Parallel message fetches (default: 10, max: 10)");
    eprintln!("  MAILSCOPE_DEADLINE_SECS   Soft deadline per fetch, 0 disables (default: 60)");
    eprintln!("  MAILSCOPE_RETRY_ATTEMPTS  Attempts per transient failure (default: 3)");
    eprintln!("  MAILSCOPE_RETRY_BASE_MS   First retry backoff (default: 500)");
    eprintln!("  RUST_LOG                  Log level (default: mailscope=info)");
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("mcp");

    let result = match cmd {
        "mcp" => run_mcp_server().await,
        "check" => match run_check().await {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(2),
            Err(e) => Err(e),
        },
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        unknown => {
            eprintln!("Unknown command: {unknown}");
            eprintln!("Run `mailscope help` for usage");
            return;
        }
    };

    if let Err(e) = result {
        error!(%e, "fatal error");
        std::process::exit(1);
    }
}
