//! Diagnostic links into the provider console.

use std::fmt::Write;

use crate::config::Scope;

/// Log query shown in the console, before the optional revision filter.
const QUERY_HEAD: &str = "fields @timestamp, level, message, meta.fileName, error.message, request.uri
| filter ispresent(level) # and level != 'trace'
| filter message != \"Measurement of flush time\" and message != \"Measurement of execution time\"";

/// Log query tail, after the optional revision filter.
const QUERY_TAIL: &str = "
| sort @timestamp desc
| limit 10000";

/// Value in the console's tilde-separated URL state encoding.
enum StateValue<'a> {
    /// Integer.
    Int(i64),
    /// String, escaped on output.
    Str(&'a str),
    /// List of strings.
    List(Vec<String>),
}

/// Builds the log-query console URL for the functions of `scope`.
///
/// The query covers the last 30 minutes of every named function's log group
/// and, when a revision is given, filters on `meta.revision`.
#[must_use]
pub fn log_query_link(
    region: &str,
    scope: &Scope,
    names: &[String],
    revision: Option<&str>,
) -> String {
    let mut query = String::from(QUERY_HEAD);
    if let Some(revision) = revision.filter(|r| !r.is_empty()) {
        let _ = write!(query, "\n| filter meta.revision = \"{revision}\"");
    }
    query.push_str(QUERY_TAIL);

    let sources = names
        .iter()
        .map(|name| format!("/aws/lambda/{}", scope.function_name(name)))
        .collect();
    let state = serialize_object(&[
        ("end", StateValue::Int(0)),
        ("start", StateValue::Int(-1800)),
        ("timeType", StateValue::Str("RELATIVE")),
        ("tz", StateValue::Str("UTC")),
        ("unit", StateValue::Str("seconds")),
        ("editorString", StateValue::Str(&query)),
        ("source", StateValue::List(sources)),
        ("lang", StateValue::Str("CWLI")),
    ]);

    format!(
        "https://{region}.console.aws.amazon.com/cloudwatch/home?#logsV2:logs-insights$3FqueryDetail$3D{}",
        encode_uri_component(&state).replace('\'', "%27")
    )
}

/// Public URL of a gateway's default stage.
#[must_use]
pub fn public_host(api_id: &str, region: &str) -> String {
    format!("https://{api_id}.execute-api.{region}.amazonaws.com/")
}

fn serialize_object(entries: &[(&str, StateValue<'_>)]) -> String {
    let body = entries
        .iter()
        .map(|(key, value)| format!("{key}~{}", serialize_value(value)))
        .collect::<Vec<_>>()
        .join("~");
    format!("~({body})")
}

fn serialize_value(value: &StateValue<'_>) -> String {
    match value {
        StateValue::Int(n) => n.to_string(),
        StateValue::Str(s) => format!("'{}", console_escape(s)),
        StateValue::List(items) => {
            let body = items
                .iter()
                .map(|s| format!("'{}", console_escape(s)))
                .collect::<Vec<_>>()
                .join("~");
            format!("(~{body})")
        }
    }
}

/// Escapes everything but `[0-9A-Za-z._~-]` as `*` plus the hex code point.
fn console_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~') {
            out.push(ch);
        } else {
            let _ = write!(out, "*{:02x}", u32::from(ch));
        }
    }
    out
}

/// Percent-encodes all but `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&b) {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}
