use chrono::{DateTime, Utc};
use mailscope_domain::{
    EmailBatch, EmailStatistics, LabelInfo, LabelKind, MessageContent, MessageSummary, SetupReport,
};
use mailscope_error::Warning;

const SNIPPET_WIDTH: usize = 100;
const COMPACT_BODY_WIDTH: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Compact,
    Expanded,
    Full,
}

impl Format {
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("full") => Self::Full,
            Some("expanded") => Self::Expanded,
            _ => Self::Compact,
        }
    }
}

pub fn format_batch(batch: &EmailBatch, fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            if batch.messages.is_empty() && batch.warnings.is_empty() && !batch.truncated {
                return "No emails found.".to_string();
            }
            let max_text = if fmt == Format::Expanded { 0 } else { SNIPPET_WIDTH };
            let mut lines: Vec<String> = Vec::with_capacity(batch.messages.len() * 6 + 2);
            lines.push(format!("Found {} emails:", batch.messages.len()));
            for (i, msg) in batch.messages.iter().enumerate() {
                lines.push(String::new());
                lines.extend(format_summary_entry(i + 1, msg, max_text));
            }
            push_warnings(&mut lines, &batch.warnings);
            if batch.truncated {
                lines.push(String::new());
                lines.push("(results truncated: deadline reached)".to_string());
            }
            lines.join("\n")
        }
        Format::Full => to_json(batch),
    }
}

pub fn format_content(msg: &MessageContent, fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let s = &msg.summary;
            let mut lines = vec![
                format!("From: {}", s.sender),
                format!("Subject: {}", s.subject),
                format!("Date: {}", format_date(s.received_at)),
            ];
            if !msg.to.is_empty() {
                lines.push(format!("To: {}", msg.to.join(", ")));
            }
            if !msg.cc.is_empty() {
                lines.push(format!("Cc: {}", msg.cc.join(", ")));
            }
            if !s.label_ids.is_empty() {
                let labels: Vec<&str> = s.label_ids.iter().map(String::as_str).collect();
                lines.push(format!("Labels: {}", labels.join(", ")));
            }
            lines.push(format!("ID: {}", s.id));
            lines.push(String::new());
            let body = msg.body_text.trim();
            if body.is_empty() {
                lines.push("(empty body)".to_string());
            } else if fmt == Format::Compact {
                lines.push(truncate_block(body, COMPACT_BODY_WIDTH));
            } else {
                lines.push(body.to_string());
            }
            if !msg.attachments.is_empty() {
                lines.push(String::new());
                lines.push(format!("Attachments ({}):", msg.attachments.len()));
                for a in &msg.attachments {
                    lines.push(format!(
                        "  {} [{}] {}",
                        a.filename,
                        a.mime_type,
                        format_size(a.size_bytes)
                    ));
                }
            }
            lines.join("\n")
        }
        Format::Full => to_json(msg),
    }
}

pub fn format_statistics(stats: &EmailStatistics, fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let count = |c: Option<u64>| c.map_or_else(|| "unavailable".to_string(), |n| n.to_string());
            let mut lines = vec![
                "Email statistics:".to_string(),
                format!("  Unread: {}", count(stats.unread_count)),
                format!("  Total: {}", count(stats.total_count)),
            ];
            if !stats.label_counts.is_empty() {
                lines.push(format!("  Labels ({}):", stats.label_counts.len()));
                for (name, n) in &stats.label_counts {
                    lines.push(format!("    {name}: {n}"));
                }
            }
            lines.push(format!("  Computed: {}", format_date(Some(stats.computed_at))));
            push_warnings(&mut lines, &stats.warnings);
            lines.join("\n")
        }
        Format::Full => to_json(stats),
    }
}

pub fn format_labels(labels: &[LabelInfo], fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let mut lines: Vec<String> = Vec::with_capacity(labels.len() + 1);
            lines.push(format!("{} labels:", labels.len()));
            for l in labels {
                let kind = match l.kind {
                    LabelKind::System => "system",
                    LabelKind::User => "user",
                };
                let hidden = if l.visible { "" } else { " hidden" };
                let counts = match (l.messages_total, l.messages_unread) {
                    (Some(t), Some(u)) if fmt == Format::Expanded => format!(" {t} msgs, {u} unread"),
                    (Some(t), _) if fmt == Format::Expanded => format!(" {t} msgs"),
                    _ => String::new(),
                };
                lines.push(format!("  {} [{kind}{hidden}]{counts} id:{}", l.name, l.id));
            }
            lines.join("\n")
        }
        Format::Full => to_json(labels),
    }
}

pub fn format_setup(report: &SetupReport, fmt: Format) -> String {
    match fmt {
        Format::Compact | Format::Expanded => {
            let mut lines = vec![format!("Setup status: {}", report.status)];
            lines.push(report.message.clone());
            if let Some(ref account) = report.account {
                lines.push(format!("Account: {account}"));
            }
            if !report.instructions.is_empty() {
                lines.push(String::new());
                lines.push("Next steps:".to_string());
                for (i, step) in report.instructions.iter().enumerate() {
                    lines.push(format!("  {}. {step}", i + 1));
                }
            }
            lines.join("\n")
        }
        Format::Full => to_json(report),
    }
}

fn format_summary_entry(index: usize, msg: &MessageSummary, max_text: usize) -> [String; 5] {
    let preview = if max_text > 0 {
        truncate(&msg.snippet, max_text)
    } else {
        clean_text(&msg.snippet)
    };
    let unread = if msg.is_unread() { " (unread)" } else { "" };
    [
        format!("{index}. From: {}{unread}", clean_text(&msg.sender)),
        format!("   Subject: {}", clean_text(&msg.subject)),
        format!("   Date: {}", format_date(msg.received_at)),
        format!("   Preview: {preview}"),
        format!("   ID: {}", msg.id),
    ]
}

fn push_warnings(lines: &mut Vec<String>, warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(format!("Warnings ({}):", warnings.len()));
    for w in warnings {
        lines.push(format!("  - {w}"));
    }
}

pub fn format_date(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(dt) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => "Unknown date".to_string(),
    }
}

fn format_size(bytes: u64) -> String {
    match bytes {
        b if b >= 1024 * 1024 => format!("{:.1} MB", b as f64 / (1024.0 * 1024.0)),
        b if b >= 1024 => format!("{:.1} KB", b as f64 / 1024.0),
        b => format!("{b} B"),
    }
}

fn clean_text(s: &str) -> String {
    let clean: String = s.chars().filter(|c| *c != '\r').collect();
    clean.replace('\n', " ")
}

fn truncate(s: &str, max: usize) -> String {
    let oneline = clean_text(s);
    if oneline.chars().count() > max {
        let truncated: String = oneline.chars().take(max).collect();
        format!("{truncated}...")
    } else {
        oneline
    }
}

/// Like `truncate` but keeps line breaks.
fn truncate_block(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let truncated: String = s.chars().take(max).collect();
        format!("{truncated}\n... (truncated, use format=expanded for the full body)")
    } else {
        s.to_string()
    }
}

fn to_json<T: serde::Serialize + ?Sized>(val: &T) -> String {
    serde_json::to_string(val).unwrap_or_else(|e| format!("serialization error: {e}"))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::TimeZone;
    use mailscope_domain::{AttachmentMeta, SetupStatus};

    use super::*;

    fn summary(id: &str, snippet: &str) -> MessageSummary {
        MessageSummary {
            id: id.to_string(),
            thread_id: id.to_string(),
            sender: "Ann <ann@example.com>".to_string(),
            subject: format!("subject {id}"),
            received_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap()),
            snippet: snippet.to_string(),
            label_ids: BTreeSet::new(),
        }
    }

    fn batch(ids: &[&str]) -> EmailBatch {
        EmailBatch {
            messages: ids.iter().map(|id| summary(id, "hello")).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn listing_layout() {
        let out = format_batch(&batch(&["a1"]), Format::Compact);
        assert_eq!(
            out,
            "Found 1 emails:\n\n1. From: Ann <ann@example.com>\n   Subject: subject a1\n   Date: 2024-05-02 09:30 UTC\n   Preview: hello\n   ID: a1"
        );
    }

    #[test]
    fn same_input_same_output() {
        let b = batch(&["x", "y", "z"]);
        assert_eq!(format_batch(&b, Format::Compact), format_batch(&b.clone(), Format::Compact));
    }

    #[test]
    fn index_labels_recover_order() {
        let ids = ["m9", "m2", "m5", "m1"];
        let out = format_batch(&batch(&ids), Format::Compact);
        let mut entries: Vec<(usize, String)> = Vec::new();
        let mut current = None;
        for line in out.lines() {
            if let Some((n, _)) = line.split_once(". From: ") {
                current = n.parse::<usize>().ok();
            } else if let Some(id) = line.trim().strip_prefix("ID: ") {
                entries.push((current.unwrap(), id.to_string()));
            }
        }
        entries.sort_by_key(|(n, _)| *n);
        let recovered: Vec<&str> = entries.iter().map(|(_, id)| id.as_str()).collect();
        assert_eq!(recovered, ids);
    }

    #[test]
    fn snippet_truncation_respects_char_boundaries() {
        let long = "é".repeat(150);
        let b = EmailBatch {
            messages: vec![summary("a", &long)],
            ..Default::default()
        };
        let out = format_batch(&b, Format::Compact);
        let expected = format!("Preview: {}...", "é".repeat(100));
        assert!(out.contains(&expected));

        let out = format_batch(&b, Format::Expanded);
        assert!(out.contains(&long));
    }

    #[test]
    fn short_snippet_untouched() {
        assert_eq!(truncate("short", 100), "short");
        assert_eq!(truncate(&"a".repeat(100), 100), "a".repeat(100));
    }

    #[test]
    fn warnings_and_truncation_are_shown() {
        let mut b = batch(&["a"]);
        b.warnings.push(Warning::message("b", "not found"));
        b.truncated = true;
        let out = format_batch(&b, Format::Compact);
        assert!(out.contains("Warnings (1):\n  - message b: not found"));
        assert!(out.ends_with("(results truncated: deadline reached)"));
    }

    #[test]
    fn empty_listing() {
        assert_eq!(format_batch(&EmailBatch::default(), Format::Compact), "No emails found.");
    }

    #[test]
    fn unknown_date() {
        assert_eq!(format_date(None), "Unknown date");
    }

    #[test]
    fn content_view() {
        let msg = MessageContent {
            summary: summary("c1", "hi"),
            to: vec!["bob@example.com".into()],
            cc: Vec::new(),
            body_text: "Line one\nLine two".into(),
            body_html: None,
            attachments: vec![AttachmentMeta {
                filename: "report.pdf".into(),
                mime_type: "application/pdf".into(),
                size_bytes: 2048,
            }],
        };
        let out = format_content(&msg, Format::Compact);
        assert!(out.contains("To: bob@example.com"));
        assert!(out.contains("Line one\nLine two"));
        assert!(out.contains("report.pdf [application/pdf] 2.0 KB"));
        assert!(format_content(&msg, Format::Full).starts_with('{'));
    }

    #[test]
    fn statistics_view() {
        let stats = EmailStatistics {
            unread_count: Some(7),
            total_count: None,
            label_counts: BTreeMap::from([("INBOX".to_string(), 40), ("Work".to_string(), 3)]),
            computed_at: Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap(),
            warnings: vec![Warning::label("ALL", "rate limited")],
        };
        let out = format_statistics(&stats, Format::Compact);
        assert!(out.contains("Unread: 7"));
        assert!(out.contains("Total: unavailable"));
        assert!(out.contains("    INBOX: 40\n    Work: 3"));
        assert!(out.contains("label ALL: rate limited"));
    }

    #[test]
    fn setup_view() {
        let report = SetupReport {
            status: SetupStatus::Error,
            message: "no token".into(),
            account: None,
            instructions: vec!["Create credentials".into(), "Run the OAuth flow".into()],
            checked_at: Utc::now(),
        };
        let out = format_setup(&report, Format::Compact);
        assert!(out.starts_with("Setup status: error\nno token"));
        assert!(out.contains("  2. Run the OAuth flow"));
    }

    #[test]
    fn parse_defaults_to_compact() {
        assert_eq!(Format::parse(None), Format::Compact);
        assert_eq!(Format::parse(Some("bogus")), Format::Compact);
        assert_eq!(Format::parse(Some("full")), Format::Full);
    }
}
