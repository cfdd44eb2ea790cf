//! Structured filters to Gmail search syntax.
//!
//! Terms are emitted in a fixed order (sender, subject keywords, date range,
//! flags, free text) and joined by spaces, which the provider reads as AND.

use chrono::{Days, NaiveDate};
use mailscope_domain::{QueryFilter, QueryString};
use mailscope_error::EngineError;

const DATE_INPUT_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m-%d-%Y", "%m/%d/%Y"];
const DATE_OUTPUT_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Flag {
    Unread,
    Read,
    Starred,
    Important,
    HasAttachment,
    Inbox,
    Sent,
}

impl Flag {
    fn parse(s: &str) -> Option<Self> {
        let f = match s.trim().to_ascii_lowercase().as_str() {
            "unread" | "is:unread" => Self::Unread,
            "read" | "is:read" => Self::Read,
            "starred" | "is:starred" => Self::Starred,
            "important" | "is:important" => Self::Important,
            "has-attachment" | "attachment" | "has:attachment" => Self::HasAttachment,
            "inbox" | "in:inbox" => Self::Inbox,
            "sent" | "in:sent" => Self::Sent,
            _ => return None,
        };
        Some(f)
    }

    fn term(self) -> &'static str {
        match self {
            Self::Unread => "is:unread",
            Self::Read => "is:read",
            Self::Starred => "is:starred",
            Self::Important => "is:important",
            Self::HasAttachment => "has:attachment",
            Self::Inbox => "in:inbox",
            Self::Sent => "in:sent",
        }
    }
}

pub fn build(filter: &QueryFilter) -> Result<QueryString, EngineError> {
    if !filter.has_criteria() {
        if filter.all_mail {
            return Ok(QueryString::new(""));
        }
        return Err(EngineError::validation(
            "filter",
            "no search criteria given and all-mail was not requested",
        ));
    }

    let mut terms: Vec<String> = Vec::new();

    if let Some(ref sender) = filter.sender {
        terms.push(format!("from:{}", validate_address(sender)?));
    }

    for kw in &filter.subject_keywords {
        terms.push(format!("subject:{}", quote_phrase("subject", kw)?));
    }

    let start = filter
        .start_date
        .as_deref()
        .map(|d| parse_date("start_date", d))
        .transpose()?;
    let end = filter
        .end_date
        .as_deref()
        .map(|d| parse_date("end_date", d))
        .transpose()?;

    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(EngineError::validation(
                "end_date",
                format!("end date {e} is before start date {s}"),
            ));
        }
    }
    if let Some(s) = start {
        terms.push(format!("after:{}", s.format(DATE_OUTPUT_FORMAT)));
    }
    if let Some(e) = end {
        // before: is exclusive on the provider side
        let next = e
            .checked_add_days(Days::new(1))
            .ok_or_else(|| EngineError::validation("end_date", format!("{e} is out of range")))?;
        terms.push(format!("before:{}", next.format(DATE_OUTPUT_FORMAT)));
    }

    let mut flags = filter
        .flags
        .iter()
        .map(|raw| {
            Flag::parse(raw)
                .ok_or_else(|| EngineError::validation("flags", format!("unknown flag '{raw}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    flags.sort();
    flags.dedup();
    terms.extend(flags.into_iter().map(|f| f.term().to_string()));

    if let Some(ref text) = filter.free_text {
        terms.push(quote_phrase("free_text", text)?);
    }

    Ok(QueryString::new(terms.join(" ")))
}

/// Passes a caller-written provider query through untouched.
pub fn raw(query: &str) -> Result<QueryString, EngineError> {
    let q = query.trim();
    if q.is_empty() {
        return Err(EngineError::validation("query", "cannot be empty"));
    }
    Ok(QueryString::new(q))
}

fn validate_address(raw: &str) -> Result<&str, EngineError> {
    let addr = raw.trim();
    let invalid = || {
        EngineError::validation(
            "sender",
            format!("'{raw}' does not look like an address (local-part@domain)"),
        )
    };

    let (local, domain) = addr.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    if !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err(invalid());
    }
    let forbidden = |c: char| c.is_whitespace() || "\"()<>,;:\\[]".contains(c);
    if addr.chars().any(forbidden) {
        return Err(invalid());
    }
    Ok(addr)
}

/// Wraps a phrase in double quotes. Embedded quotes are dropped since the
/// provider has no escape for them, and whitespace runs are collapsed.
fn quote_phrase(field: &'static str, raw: &str) -> Result<String, EngineError> {
    let stripped: String = raw.chars().filter(|c| *c != '"').collect();
    let words: Vec<&str> = stripped.split_whitespace().collect();
    if words.is_empty() {
        return Err(EngineError::validation(field, "cannot be empty"));
    }
    Ok(format!("\"{}\"", words.join(" ")))
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, EngineError> {
    let s = raw.trim();
    DATE_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| {
            EngineError::validation(field, format!("'{raw}' is not a date (expected YYYY-MM-DD)"))
        })
}

#[cfg(test)]
mod tests {
    use mailscope_error::EngineError;

    use super::*;

    fn field_of(err: EngineError) -> &'static str {
        match err {
            EngineError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn sender_and_subject() {
        let f = QueryFilter {
            sender: Some("john@example.com".into()),
            subject_keywords: vec!["meeting".into()],
            ..Default::default()
        };
        assert_eq!(build(&f).unwrap().as_str(), r#"from:john@example.com subject:"meeting""#);
    }

    #[test]
    fn same_filter_same_string() {
        let f = QueryFilter::sender("a@b.io")
            .flag("starred")
            .flag("unread")
            .text("q3 numbers");
        assert_eq!(build(&f).unwrap(), build(&f.clone()).unwrap());
    }

    #[test]
    fn term_order_is_fixed() {
        let f = QueryFilter {
            sender: Some("ops@corp.example".into()),
            subject_keywords: vec!["weekly report".into(), "draft".into()],
            start_date: Some("2024-01-15".into()),
            end_date: Some("2024-01-31".into()),
            free_text: Some("  budget   review ".into()),
            flags: ["has-attachment", "unread"].into_iter().map(String::from).collect(),
            all_mail: false,
        };
        assert_eq!(
            build(&f).unwrap().as_str(),
            r#"from:ops@corp.example subject:"weekly report" subject:"draft" after:2024/01/15 before:2024/02/01 is:unread has:attachment "budget review""#
        );
    }

    #[test]
    fn start_after_end_is_rejected() {
        let f = QueryFilter::date_range("2024-03-02", Some("2024-03-01".into()));
        assert_eq!(field_of(build(&f).unwrap_err()), "end_date");
    }

    #[test]
    fn same_day_range_covers_that_day() {
        let f = QueryFilter::date_range("2024-03-01", Some("03/01/2024".into()));
        assert_eq!(build(&f).unwrap().as_str(), "after:2024/03/01 before:2024/03/02");
    }

    #[test]
    fn open_ended_range() {
        let f = QueryFilter::date_range("2023/12/31", None);
        assert_eq!(build(&f).unwrap().as_str(), "after:2023/12/31");
    }

    #[test]
    fn bad_date() {
        let f = QueryFilter::date_range("yesterday", None);
        assert_eq!(field_of(build(&f).unwrap_err()), "start_date");
        let f = QueryFilter::date_range("2024-02-30", None);
        assert_eq!(field_of(build(&f).unwrap_err()), "start_date");
    }

    #[test]
    fn bad_addresses() {
        for addr in ["bob", "@example.com", "bob@", "bob@localhost", "bob smith@x.io", "a@b@c.io", "bob@.io"] {
            let f = QueryFilter::sender(addr);
            assert_eq!(field_of(build(&f).unwrap_err()), "sender", "{addr}");
        }
    }

    #[test]
    fn empty_filter_needs_all_mail() {
        assert_eq!(field_of(build(&QueryFilter::default()).unwrap_err()), "filter");
        assert!(build(&QueryFilter::all_mail()).unwrap().is_all_mail());
    }

    #[test]
    fn unknown_flag() {
        let f = QueryFilter::default().flag("snoozed");
        assert_eq!(field_of(build(&f).unwrap_err()), "flags");
    }

    #[test]
    fn flag_aliases_collapse() {
        let f = QueryFilter::default().flag("attachment").flag("has-attachment");
        assert_eq!(build(&f).unwrap().as_str(), "has:attachment");
    }

    #[test]
    fn quotes_are_stripped_from_phrases() {
        let f = QueryFilter::subject(["say \"hi\""]);
        assert_eq!(build(&f).unwrap().as_str(), r#"subject:"say hi""#);
        let f = QueryFilter::subject(["\"\""]);
        assert_eq!(field_of(build(&f).unwrap_err()), "subject");
    }

    #[test]
    fn raw_query_passthrough() {
        assert_eq!(raw("  is:unread from:x@y.io ").unwrap().as_str(), "is:unread from:x@y.io");
        assert!(raw("   ").is_err());
    }
}
