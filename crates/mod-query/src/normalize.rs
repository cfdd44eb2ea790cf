//! Provider message payloads to `MessageSummary` / `MessageContent`.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use mailscope_domain::{
    AttachmentMeta, MessageContent, MessageSummary, RawMessage, RawPart, NO_SUBJECT,
    UNKNOWN_SENDER,
};

pub fn summary(raw: &RawMessage) -> MessageSummary {
    let sender = header(raw, "From")
        .map(decode_mime_str)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());

    let subject = header(raw, "Subject")
        .map(decode_mime_str)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    MessageSummary {
        id: raw.id.clone(),
        thread_id: raw.thread_id.clone(),
        sender,
        subject,
        received_at: header(raw, "Date").and_then(parse_date),
        snippet: raw
            .snippet
            .as_deref()
            .map(decode_html_entities)
            .unwrap_or_default(),
        label_ids: raw.label_ids.iter().flatten().cloned().collect(),
    }
}

pub fn content(raw: &RawMessage) -> MessageContent {
    let summary = summary(raw);
    let mut walk = BodyWalk::default();
    if let Some(ref payload) = raw.payload {
        walk.visit(payload);
    }

    let to = header(raw, "To").map(parse_address_list).unwrap_or_default();
    let cc = header(raw, "Cc").map(parse_address_list).unwrap_or_default();

    let body_text = walk
        .text
        .or_else(|| walk.html.as_deref().map(strip_html))
        .unwrap_or_default();

    MessageContent {
        summary,
        to,
        cc,
        body_text,
        body_html: walk.html,
        attachments: walk.attachments,
    }
}

fn header<'a>(raw: &'a RawMessage, name: &str) -> Option<&'a str> {
    raw.payload.as_ref()?.header(name)
}

#[derive(Default)]
struct BodyWalk {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<AttachmentMeta>,
}

impl BodyWalk {
    /// Depth-first over the MIME tree so nested multipart/alternative inside
    /// multipart/mixed reaches the same leaves as a flat message.
    fn visit(&mut self, part: &RawPart) {
        if let Some(children) = part.parts.as_deref().filter(|p| !p.is_empty()) {
            for child in children {
                self.visit(child);
            }
            return;
        }

        if is_attachment(part) {
            self.attachments.push(attachment_meta(part));
            return;
        }

        if part.is_mime("text/plain") {
            if self.text.is_none() {
                self.text = part_body(part);
            }
        } else if part.is_mime("text/html") && self.html.is_none() {
            self.html = part_body(part);
        }
    }
}

fn is_attachment(part: &RawPart) -> bool {
    if part.filename.as_deref().is_some_and(|f| !f.is_empty()) {
        return true;
    }
    part.header("Content-Disposition")
        .is_some_and(|d| d.trim_start().to_ascii_lowercase().starts_with("attachment"))
}

fn attachment_meta(part: &RawPart) -> AttachmentMeta {
    AttachmentMeta {
        filename: part
            .filename
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "(unnamed)".to_string()),
        mime_type: part
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        size_bytes: part.body.as_ref().and_then(|b| b.size).unwrap_or(0),
    }
}

fn part_body(part: &RawPart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_deref()?;
    let bytes = decode_base64_body(data)?;
    let charset = part
        .header("Content-Type")
        .map(|ct| mailparse::parse_content_type(ct).charset)
        .unwrap_or_default();
    Some(decode_charset(bytes, &charset))
}

/// Body data is URL-safe base64 but padding varies between messages.
fn decode_base64_body(data: &str) -> Option<Vec<u8>> {
    let decoders: [&base64::engine::GeneralPurpose; 4] =
        [&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];
    decoders.iter().find_map(|d| d.decode(data.trim()).ok())
}

/// Decodes body bytes in their declared charset. mailparse only decodes
/// charsets on a parsed part, so non-UTF-8 bodies are wrapped in one.
fn decode_charset(bytes: Vec<u8>, charset: &str) -> String {
    let label: String = charset
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    if label.is_empty()
        || label.eq_ignore_ascii_case("utf-8")
        || label.eq_ignore_ascii_case("utf8")
        || label.eq_ignore_ascii_case("us-ascii")
    {
        return match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
    }

    let part = format!(
        "Content-Type: text/plain; charset=\"{label}\"\r\nContent-Transfer-Encoding: base64\r\n\r\n{}",
        STANDARD.encode(&bytes)
    );
    mailparse::parse_mail(part.as_bytes())
        .and_then(|m| m.get_body())
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned())
}

/// RFC 2822 first. mailparse's parser is lenient and yields 0 for input with
/// no date in it, so its result is only used when a day and a year are present.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if !has_day_and_year(raw) {
        return None;
    }
    match mailparse::dateparse(raw) {
        Ok(secs) if secs != 0 => DateTime::from_timestamp(secs, 0),
        _ => None,
    }
}

fn has_day_and_year(raw: &str) -> bool {
    let numbers: Vec<&str> = raw
        .split(|c: char| !c.is_ascii_digit())
        .filter(|t| !t.is_empty())
        .collect();
    let year = numbers.iter().any(|t| t.len() == 4);
    let day = numbers
        .iter()
        .any(|t| t.len() <= 2 && t.parse::<u8>().is_ok_and(|d| (1..=31).contains(&d)));
    year && day
}

fn decode_mime_str(raw: &str) -> String {
    if !raw.contains("=?") {
        return raw.trim().to_string();
    }
    let fake = format!("X: {raw}");
    match mailparse::parse_header(fake.as_bytes()) {
        Ok((hdr, _)) => hdr.get_value().trim().to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

fn parse_address_list(raw: &str) -> Vec<String> {
    match mailparse::addrparse(raw) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                mailparse::MailAddr::Single(info) => vec![format_single(info)],
                mailparse::MailAddr::Group(group) => group.addrs.iter().map(format_single).collect(),
            })
            .collect(),
        Err(_) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    }
}

fn format_single(info: &mailparse::SingleInfo) -> String {
    match info.display_name {
        Some(ref name) if !name.is_empty() => format!("{name} <{}>", info.addr),
        _ => info.addr.clone(),
    }
}

/// Elements whose contents are never display text.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

fn strip_html(html: &str) -> String {
    let visible = drop_raw_text_elements(html);
    let mut result = String::with_capacity(visible.len());
    let mut in_tag = false;
    for ch in visible.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    decode_html_entities(&result)
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Removes `<script>` and `<style>` elements with their contents. Script
/// bodies may contain `<`, so the element is cut at its closing tag rather
/// than tokenized.
fn drop_raw_text_elements(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some((start, name)) = next_raw_text_open(&lower, pos) {
        out.push_str(&html[pos..start]);
        out.push(' ');
        let open_end = lower[start..].find('>').map_or(lower.len(), |i| start + i + 1);
        let close = format!("</{name}");
        pos = match lower[open_end..].find(&close) {
            Some(i) => {
                let at = open_end + i;
                lower[at..].find('>').map_or(lower.len(), |j| at + j + 1)
            }
            None => open_end,
        };
    }
    out.push_str(&html[pos..]);
    out
}

fn next_raw_text_open(lower: &str, from: usize) -> Option<(usize, &'static str)> {
    RAW_TEXT_ELEMENTS
        .iter()
        .filter_map(|name| {
            let needle = format!("<{name}");
            let mut search = from;
            while let Some(i) = lower[search..].find(&needle) {
                let at = search + i;
                let next = lower[at + needle.len()..].chars().next();
                if next.map_or(true, |c| c.is_whitespace() || c == '>' || c == '/') {
                    return Some((at, *name));
                }
                search = at + needle.len();
            }
            None
        })
        .min_by_key(|(at, _)| *at)
}

fn decode_html_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
