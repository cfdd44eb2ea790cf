use serde_json::{json, Value};

use super::types::{ToolAnnotations, ToolDef};

#[cfg(test)]
pub const TOOL_NAMES: [&str; 10] = [
    "get_recent_emails",
    "get_unread_emails",
    "search_emails",
    "get_emails_from_sender",
    "get_emails_with_subject",
    "get_emails_by_date_range",
    "read_email_content",
    "get_email_statistics",
    "get_labels",
    "check_setup",
];

fn format_param() -> Value {
    json!({
        "type": "string",
        "description": "Response format: 'compact' (default, numbered list with previews cut at 100 chars), 'expanded' (same layout, untruncated text), or 'full' (complete JSON with all fields). Use compact for browsing, expanded for reading, full when you need exact field values.",
        "enum": ["compact", "expanded", "full"]
    })
}

fn max_results_param(default: u64) -> Value {
    json!({
        "type": "integer",
        "description": format!("Max emails to return (default: {default}, max: 500)"),
        "minimum": 1,
        "maximum": 500
    })
}

fn date_param(what: &str) -> Value {
    json!({
        "type": "string",
        "description": format!("{what} as YYYY-MM-DD (also accepts YYYY/MM/DD, MM-DD-YYYY, MM/DD/YYYY)")
    })
}

fn tool(name: &'static str, description: &'static str, input_schema: Value) -> ToolDef {
    ToolDef {
        name,
        description,
        input_schema,
        annotations: ToolAnnotations::READ_ONLY,
    }
}

pub fn available_tools() -> Vec<ToolDef> {
    vec![
        tool(
            "get_recent_emails",
            "List the most recent emails across the whole mailbox, newest first. Returns sender, subject, date, preview and ID for each.",
            json!({
                "type": "object",
                "properties": {
                    "max_results": max_results_param(10),
                    "format": format_param()
                }
            }),
        ),
        tool(
            "get_unread_emails",
            "List unread emails, newest first.",
            json!({
                "type": "object",
                "properties": {
                    "max_results": max_results_param(20),
                    "format": format_param()
                }
            }),
        ),
        tool(
            "search_emails",
            "Search emails. Pass either 'query' (raw Gmail search syntax such as 'from:a@b.com has:attachment') or any of the structured filter fields, which are combined with AND. Do not mix the two.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Raw Gmail search string, used as-is"
                    },
                    "sender": {
                        "type": "string",
                        "description": "Sender address, e.g. name@example.com"
                    },
                    "subject": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Phrases that must all appear in the subject"
                    },
                    "start_date": date_param("Earliest day (inclusive)"),
                    "end_date": date_param("Latest day (inclusive)"),
                    "text": {
                        "type": "string",
                        "description": "Phrase to match anywhere in the message"
                    },
                    "flags": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["unread", "read", "starred", "important", "has-attachment", "inbox", "sent"]
                        },
                        "description": "State filters"
                    },
                    "max_results": max_results_param(50),
                    "format": format_param()
                }
            }),
        ),
        tool(
            "get_emails_from_sender",
            "List emails from one sender address, newest first.",
            json!({
                "type": "object",
                "properties": {
                    "sender": {
                        "type": "string",
                        "description": "Sender address, e.g. name@example.com"
                    },
                    "max_results": max_results_param(20),
                    "format": format_param()
                },
                "required": ["sender"]
            }),
        ),
        tool(
            "get_emails_with_subject",
            "List emails whose subject contains the given keywords. A string is treated as one phrase; an array requires every phrase.",
            json!({
                "type": "object",
                "properties": {
                    "keywords": {
                        "oneOf": [
                            { "type": "string" },
                            { "type": "array", "items": { "type": "string" } }
                        ],
                        "description": "Subject phrase or phrases"
                    },
                    "max_results": max_results_param(20),
                    "format": format_param()
                },
                "required": ["keywords"]
            }),
        ),
        tool(
            "get_emails_by_date_range",
            "List emails received between two days, both inclusive. Omit end_date for everything since start_date.",
            json!({
                "type": "object",
                "properties": {
                    "start_date": date_param("First day"),
                    "end_date": date_param("Last day (optional)"),
                    "max_results": max_results_param(50),
                    "format": format_param()
                },
                "required": ["start_date"]
            }),
        ),
        tool(
            "read_email_content",
            "Read one email in full: headers, body text and attachment list. Use an ID from a listing or search result.",
            json!({
                "type": "object",
                "properties": {
                    "message_id": {
                        "type": "string",
                        "description": "Message ID"
                    },
                    "format": format_param()
                },
                "required": ["message_id"]
            }),
        ),
        tool(
            "get_email_statistics",
            "Mailbox counts: unread, total and per-label message counts. Uses label metadata only, so it is cheap on large mailboxes.",
            json!({
                "type": "object",
                "properties": {
                    "format": format_param()
                }
            }),
        ),
        tool(
            "get_labels",
            "List Gmail labels (system and user) with their IDs.",
            json!({
                "type": "object",
                "properties": {
                    "format": format_param()
                }
            }),
        ),
        tool(
            "check_setup",
            "Check whether Gmail credentials are present and the API is reachable. Returns setup steps when something is missing.",
            json!({
                "type": "object",
                "properties": {
                    "format": format_param()
                }
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_is_listed_once() {
        let tools = available_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name).collect();
        assert_eq!(names, TOOL_NAMES);
    }

    #[test]
    fn schemas_are_objects_with_format() {
        for t in available_tools() {
            assert_eq!(t.input_schema["type"], "object", "{}", t.name);
            assert!(t.input_schema["properties"]["format"].is_object(), "{}", t.name);
            assert!(t.annotations.read_only);
        }
    }
}
