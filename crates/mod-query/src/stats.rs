//! Mailbox counts from label metadata. Never enumerates messages.

use std::collections::{BTreeMap, HashSet};
use std::pin::pin;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use mailscope_domain::{EmailStatistics, LabelInfo, Session, ALL_MAIL_LABEL, UNREAD_LABEL};
use mailscope_error::{EngineError, Warning};
use tracing::{info, warn};

use crate::config::{EngineConfig, MAX_CONCURRENCY};

struct Lookup {
    idx: usize,
    id: String,
    /// Key in `label_counts`; `None` for labels only read for the totals.
    display: Option<String>,
}

/// One label list call plus one count call per visible label, the unread
/// label and the all-mail label.
pub async fn compute_statistics(
    session: &Session,
    cfg: &EngineConfig,
) -> Result<EmailStatistics, EngineError> {
    let transport = session.transport();
    let retry = &cfg.retry;

    let labels: Vec<LabelInfo> = retry.run("list_labels", || transport.list_labels()).await?;

    let mut lookups: Vec<Lookup> = labels
        .into_iter()
        .filter(|l| l.visible)
        .map(|l| (l.id, l.name))
        .chain([
            (UNREAD_LABEL.to_string(), String::new()),
            (ALL_MAIL_LABEL.to_string(), String::new()),
        ])
        .enumerate()
        .map(|(idx, (id, name))| Lookup {
            idx,
            display: (!name.is_empty()).then_some(name),
            id,
        })
        .collect();
    // visible UNREAD already covers the unread count
    let mut seen = HashSet::new();
    lookups.retain(|l| seen.insert(l.id.clone()));

    let concurrency = if transport.supports_concurrency() {
        cfg.concurrency.clamp(1, MAX_CONCURRENCY)
    } else {
        1
    };
    let calls = lookups.len();

    let mut results = pin!(stream::iter(lookups)
        .map(|lookup| async move {
            let res = retry
                .run("get_label", || transport.get_label(&lookup.id))
                .await;
            (lookup, res)
        })
        .buffer_unordered(concurrency));

    let mut unread_count = None;
    let mut total_count = None;
    let mut label_counts = BTreeMap::new();
    let mut warnings: Vec<(usize, Warning)> = Vec::new();

    while let Some((lookup, res)) = results.next().await {
        let count = match res {
            Ok(info) => info.messages_total,
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                warn!(label = %lookup.id, error = %e, "label count unavailable");
                warnings.push((lookup.idx, Warning::label(&lookup.id, e)));
                continue;
            }
        };
        let Some(count) = count else {
            warnings.push((lookup.idx, Warning::label(&lookup.id, "provider reported no count")));
            continue;
        };
        match lookup.id.as_str() {
            UNREAD_LABEL => unread_count = Some(count),
            ALL_MAIL_LABEL => total_count = Some(count),
            _ => {}
        }
        if let Some(name) = lookup.display {
            label_counts.insert(name, count);
        }
    }

    warnings.sort_by_key(|(idx, _)| *idx);
    let stats = EmailStatistics {
        unread_count,
        total_count,
        label_counts,
        computed_at: Utc::now(),
        warnings: warnings.into_iter().map(|(_, w)| w).collect(),
    };
    info!(
        labels = stats.label_counts.len(),
        calls = calls + 1,
        warnings = stats.warnings.len(),
        "computed statistics"
    );
    Ok(stats)
}
