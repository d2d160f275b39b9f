//! Wire-encoding utilities
//!
//! Percent-encoding per RFC 3986 and the two body formats protocol
//! messages travel in: `application/x-www-form-urlencoded` pairs and
//! newline-separated key-value pairs (used by direct responses).

use std::collections::BTreeMap;

/// Percent-encode a string for protocol parameters.
/// Preserves unreserved characters per RFC 3986.
#[must_use]
pub fn percent_encode(s: &str) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                write!(result, "%{byte:02X}").unwrap();
            }
        }
    }
    result
}

/// Decode a percent-encoded string.
///
/// `+` is treated as a space, matching form-urlencoded bodies. Invalid
/// escape sequences pass through verbatim rather than being rejected,
/// since unrecognized fields must survive as opaque extra data.
#[must_use]
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 3 <= bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Encode a field mapping as a form-urlencoded string.
#[must_use]
pub fn encode_form(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode a form-urlencoded string into a field mapping.
#[must_use]
pub fn decode_form(body: &str) -> BTreeMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

/// Encode a field mapping as newline-separated `key:value` pairs.
#[must_use]
pub fn encode_key_value(fields: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (k, v) in fields {
        out.push_str(k);
        out.push(':');
        out.push_str(v);
        out.push('\n');
    }
    out
}

/// Decode newline-separated `key:value` pairs into a field mapping.
///
/// Lines without a colon are ignored.
#[must_use]
pub fn decode_key_value(body: &str) -> BTreeMap<String, String> {
    body.lines()
        .filter_map(|line| {
            line.split_once(':')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

/// Decode a direct-response body, detecting its format.
///
/// Direct responses arrive either as `key:value` lines or as a
/// form-urlencoded string; the first separator on the first line tells
/// them apart.
#[must_use]
pub fn decode_response_body(body: &str) -> BTreeMap<String, String> {
    let first = body.lines().next().unwrap_or("");
    match (first.find(':'), first.find('=')) {
        (Some(c), Some(e)) if c < e => decode_key_value(body),
        (Some(_), None) => decode_key_value(body),
        _ => decode_form(body),
    }
}
