//! Normalizer for the cluster's relaxed JSON encoding.
//!
//! Nameservers and brokers serialize maps with non-string keys the way fastjson does:
//! - integer keys stay bare: `{0:"10.0.0.1:10911",1:"10.0.0.2:10911"}`
//! - object keys are written inline: `{"offsetTable":{{"queueId":0}:{"maxOffset":10}}}`
//!
//! Neither form is accepted by a strict JSON parser. This module turns both into
//! strict JSON without changing any key or value content.

use std::borrow::Cow;

use crate::errors::{CodecError, Result};

/// Wrapper key of a topic stats body.
pub const OFFSET_TABLE_KEY: &str = "offsetTable";
/// Key under which a rewrapped segment stores the queue identity.
pub const SEGMENT_KEY_FIELD: &str = "topicOffset";
/// Key under which a rewrapped segment stores the offsets.
pub const SEGMENT_VALUE_FIELD: &str = "messageQueue";

/// Quotes every bare non-negative integer found in object-key position.
///
/// String contents and array elements are never touched, so applying it to
/// already strict JSON returns the input unchanged (borrowed).
pub fn quote_integer_keys(input: &str) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut key_position = false;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];

        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match b {
            b'"' => {
                in_string = true;
                key_position = false;
            }
            b'{' | b',' => key_position = true,
            b if b.is_ascii_whitespace() => {}
            b'0'..=b'9' if key_position => {
                let start = i;
                let mut end = i + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let mut next = end;
                while next < bytes.len() && bytes[next].is_ascii_whitespace() {
                    next += 1;
                }
                if next < bytes.len() && bytes[next] == b':' {
                    let buf = out.get_or_insert_with(|| String::with_capacity(input.len() + 16));
                    buf.push_str(&input[copied..start]);
                    buf.push('"');
                    buf.push_str(&input[start..end]);
                    buf.push('"');
                    copied = end;
                }
                key_position = false;
                i = end;
                continue;
            }
            _ => key_position = false,
        }
        i += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&input[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(input),
    }
}

/// Splits a topic stats body into one raw segment per queue record.
///
/// The body must open with the `{"offsetTable":{` wrapper. Records are separated
/// at the table's top level only; commas inside keys, values or strings do not
/// split. When the table is cut short, the complete segments are returned along
/// with the trailing partial one so the caller can still use what arrived.
///
/// A record that lost its closing braces does not swallow its neighbours: an
/// object member can never start with `{`, so a `,{` inside an object marks the
/// start of the next record. A surplus closer stays with its record and only
/// ends the table when nothing but closers follows it.
pub fn offset_table_segments(body: &str) -> Result<Vec<&str>> {
    let start = table_start(body).ok_or(CodecError::MissingWrapper {
        expected: "{\"offsetTable\":{",
    })?;

    let bytes = body.as_bytes();
    let mut segments = Vec::new();
    let mut segment_start = start;
    // containers opened by the current record, innermost last
    let mut open: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => open.push(b),
            b'}' | b']' => {
                if open.pop().is_none() && only_closers(&bytes[i..]) {
                    push_segment(&mut segments, &body[segment_start..i]);
                    return Ok(segments);
                }
            }
            b',' if open.is_empty() => {
                push_segment(&mut segments, &body[segment_start..i]);
                segment_start = i + 1;
            }
            b',' if open.last() == Some(&b'{')
                && next_significant(&bytes[i + 1..]) == Some(b'{') =>
            {
                push_segment(&mut segments, &body[segment_start..i]);
                segment_start = i + 1;
                open.clear();
            }
            _ => {}
        }
    }

    push_segment(&mut segments, &body[segment_start..]);
    Ok(segments)
}

fn only_closers(rest: &[u8]) -> bool {
    rest.iter()
        .all(|&b| matches!(b, b'}' | b']') || b.is_ascii_whitespace())
}

fn next_significant(rest: &[u8]) -> Option<u8> {
    rest.iter().copied().find(|b| !b.is_ascii_whitespace())
}

fn push_segment<'a>(segments: &mut Vec<&'a str>, raw: &'a str) {
    let raw = raw.trim();
    if !raw.is_empty() {
        segments.push(raw);
    }
}

// byte offset right after `{"offsetTable":{`, tolerating whitespace between tokens
fn table_start(body: &str) -> Option<usize> {
    let mut rest = body.trim_start();
    let mut consumed = body.len() - rest.len();

    for token in ["{", "\"", OFFSET_TABLE_KEY, "\"", ":", "{"] {
        let trimmed = rest.trim_start();
        consumed += rest.len() - trimmed.len();
        rest = trimmed.strip_prefix(token)?;
        consumed += token.len();
    }

    Some(consumed)
}

/// Rewraps one raw queue record into a strict nested object:
/// `{"topicOffset":<key>,"messageQueue":<value>}`.
///
/// Missing enclosing braces on the key and missing trailing braces on the value
/// are restored; key and value contents are copied unchanged.
pub fn rewrap_segment(segment: &str) -> Result<String> {
    let colon = top_level_colon(segment).ok_or_else(|| {
        CodecError::MalformedSegment(format!("no key/value separator in `{}`", segment))
    })?;

    let key = segment[..colon].trim();
    let value = segment[colon + 1..].trim();
    if key.is_empty() || value.is_empty() {
        return Err(CodecError::MalformedSegment(format!(
            "empty key or value in `{}`",
            segment
        )));
    }

    let key = close_braces(key);
    let value = close_braces(value);

    let mut out = String::with_capacity(key.len() + value.len() + 32);
    out.push_str("{\"");
    out.push_str(SEGMENT_KEY_FIELD);
    out.push_str("\":");
    out.push_str(&key);
    out.push_str(",\"");
    out.push_str(SEGMENT_VALUE_FIELD);
    out.push_str("\":");
    out.push_str(&value);
    out.push('}');

    Ok(out)
}

// The separator sits at depth 0 right after the key object closes. A key that lost
// its opening brace has its own members at depth 0 too, so only a colon that
// follows a closing brace counts.
fn top_level_colon(segment: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut after_close = false;

    for (i, b) in segment.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => {
                in_string = true;
                after_close = false;
            }
            b'{' | b'[' => {
                depth += 1;
                after_close = false;
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                after_close = depth == 0;
            }
            b':' if depth == 0 && after_close => return Some(i),
            b if b.is_ascii_whitespace() => {}
            _ => after_close = false,
        }
    }
    None
}

// Wraps a bare member list in braces, appends closers for unbalanced openers
// and drops surplus closers left at the end.
fn close_braces(part: &str) -> Cow<'_, str> {
    let mut text = if part.starts_with('{') {
        Cow::Borrowed(part)
    } else {
        Cow::Owned(format!("{{{}", part))
    };

    let depth = brace_depth(&text);
    if depth > 0 {
        let buf = text.to_mut();
        for _ in 0..depth {
            buf.push('}');
        }
    } else if depth < 0 {
        let mut end = text.len();
        for _ in 0..depth.unsigned_abs() {
            let trimmed = text[..end].trim_end();
            if !trimmed.ends_with('}') {
                break;
            }
            end = trimmed.len() - 1;
        }
        text = match text {
            Cow::Borrowed(s) => Cow::Borrowed(s[..end].trim_end()),
            Cow::Owned(mut s) => {
                s.truncate(end);
                s.truncate(s.trim_end().len());
                Cow::Owned(s)
            }
        };
    }

    text
}

fn brace_depth(text: &str) -> i64 {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;
    for b in text.bytes() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
    }
    depth
}
