//! Paginated listing followed by bounded-concurrency detail fetches.

use std::collections::HashSet;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use mailscope_domain::{
    EmailBatch, MailTransport, MessageContent, MessageFormat, MessageSummary, QueryString,
};
use mailscope_error::{EngineError, Warning};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, MAX_CONCURRENCY, PROVIDER_PAGE_CAP};
use crate::normalize;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub max_results: usize,
    pub page_size: usize,
    pub concurrency: usize,
    pub deadline: Option<Duration>,
    pub retry: RetryPolicy,
}

impl FetchOptions {
    pub fn from_config(cfg: &EngineConfig, max_results: usize) -> Self {
        Self {
            max_results,
            page_size: cfg.page_size,
            concurrency: cfg.concurrency,
            deadline: cfg.deadline,
            retry: cfg.retry.clone(),
        }
    }
}

/// Summaries resolved from one list page, in the order the provider listed them.
struct FetchPage {
    items: Vec<MessageSummary>,
    warnings: Vec<Warning>,
    continuation_token: Option<String>,
    truncated: bool,
}

/// Collects up to `max_results` message summaries matching `query`, newest first.
///
/// Per-message failures become warnings and shrink the result. Auth failures
/// and list failures abort. When the deadline passes the messages gathered so
/// far are returned with `truncated` set.
pub async fn fetch(
    transport: &dyn MailTransport,
    query: &QueryString,
    opts: &FetchOptions,
) -> Result<EmailBatch, EngineError> {
    let deadline = opts.deadline.map(|d| Instant::now() + d);
    let page_size = opts.page_size.clamp(1, PROVIDER_PAGE_CAP);
    let concurrency = if transport.supports_concurrency() {
        opts.concurrency.clamp(1, MAX_CONCURRENCY)
    } else {
        1
    };

    let mut batch = EmailBatch::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut attempted = 0usize;
    let mut token: Option<String> = None;
    let mut pages = 0u32;

    while attempted < opts.max_results {
        let remaining = opts.max_results - attempted;
        let listed = within(
            deadline,
            opts.retry.run("list_messages", || {
                transport.list_messages(query, token.as_deref(), page_size.min(remaining))
            }),
        )
        .await;
        let Some(listed) = listed else {
            batch.truncated = true;
            break;
        };
        let list = listed?;
        pages += 1;
        if pages == 1 {
            batch.result_size_estimate = list.result_size_estimate;
        }

        let ids: Vec<String> = list
            .messages
            .into_iter()
            .map(|r| r.id)
            .filter(|id| seen.insert(id.clone()))
            .take(remaining)
            .collect();
        attempted += ids.len();
        debug!(page = pages, ids = ids.len(), "listed page");

        let page = resolve_page(
            transport,
            ids,
            list.next_page_token,
            concurrency,
            deadline,
            &opts.retry,
        )
        .await?;
        batch.messages.extend(page.items);
        batch.warnings.extend(page.warnings);
        if page.truncated {
            batch.truncated = true;
            break;
        }

        match page.continuation_token {
            Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
            _ => break,
        }
    }

    info!(
        query = %query,
        returned = batch.messages.len(),
        warnings = batch.warnings.len(),
        truncated = batch.truncated,
        pages,
        "fetch complete"
    );
    Ok(batch)
}

async fn resolve_page(
    transport: &dyn MailTransport,
    ids: Vec<String>,
    continuation_token: Option<String>,
    concurrency: usize,
    deadline: Option<Instant>,
    retry: &RetryPolicy,
) -> Result<FetchPage, EngineError> {
    let mut items: Vec<(usize, MessageSummary)> = Vec::with_capacity(ids.len());
    let mut warnings: Vec<(usize, Warning)> = Vec::new();
    let mut truncated = false;

    let mut pending = pin!(stream::iter(ids.into_iter().enumerate())
        .map(|(idx, id)| async move {
            let res = retry
                .run("get_message", || {
                    transport.get_message(&id, MessageFormat::Metadata)
                })
                .await;
            (idx, id, res)
        })
        .buffer_unordered(concurrency));

    loop {
        let Some(next) = within(deadline, pending.next()).await else {
            truncated = true;
            break;
        };
        let Some((idx, id, res)) = next else { break };
        match res {
            Ok(raw) => items.push((idx, normalize::summary(&raw))),
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                warn!(id = %id, error = %e, "skipping message");
                warnings.push((idx, Warning::message(id, e)));
            }
        }
    }

    if truncated {
        warn!(resolved = items.len(), "deadline reached, returning partial page");
    }

    items.sort_by_key(|(idx, _)| *idx);
    warnings.sort_by_key(|(idx, _)| *idx);
    Ok(FetchPage {
        items: items.into_iter().map(|(_, m)| m).collect(),
        warnings: warnings.into_iter().map(|(_, w)| w).collect(),
        continuation_token,
        truncated,
    })
}

/// Fetches one message with its full MIME tree.
pub async fn fetch_content(
    transport: &dyn MailTransport,
    id: &str,
    retry: &RetryPolicy,
) -> Result<MessageContent, EngineError> {
    let raw = retry
        .run("get_message", || transport.get_message(id, MessageFormat::Full))
        .await?;
    Ok(normalize::content(&raw))
}

async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}
