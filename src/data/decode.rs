//! Decoding of the swap page's obfuscated cell payloads.
//!
//! Cells carry their text as an argument to an inline `dN('...')` call. The payload is a
//! percent-encoded string with marker noise mixed in:
//!
//! 1. `%_X` and `%u_X` (X an uppercase ASCII letter) collapse to `%`
//! 2. remaining `%u_` collapses to `%u`, remaining `%_` to `%`
//! 3. `%uXXXX` becomes the code point `U+XXXX`
//! 4. the rest is percent-decoded as UTF-8 and trimmed
//!
//! Anything that does not decode cleanly is an error; callers drop the row.

use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid %u escape '{0}'")]
    InvalidCodePoint(String),
    #[error("dangling '%' at byte {0}")]
    DanglingPercent(usize),
    #[error("payload is not valid UTF-8 after decoding")]
    InvalidUtf8,
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%(?:u)?_[A-Z]").expect("valid regex"))
}

fn unicode_escape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%u([0-9a-fA-F]{4})").expect("valid regex"))
}

fn script_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)d[1-9]\s*\(\s*'(.*?)'\s*\)").expect("valid regex"))
}

/// The quoted argument of the first `dN('...')` call in a script body.
pub fn script_payload(script: &str) -> Option<&str> {
    script_call_re()
        .captures(script)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn decode_obfuscated(raw: &str) -> Result<String, DecodeError> {
    let s = marker_re().replace_all(raw, "%");
    let s = s.replace("%u_", "%u").replace("%_", "%");

    let mut bad_escape = None;
    let s = unicode_escape_re().replace_all(&s, |caps: &Captures| {
        let code = u32::from_str_radix(&caps[1], 16).ok().and_then(char::from_u32);
        match code {
            // A literal '%' would be re-read by the percent-decoding pass.
            Some('%') => "%25".to_string(),
            Some(ch) => ch.to_string(),
            None => {
                bad_escape.get_or_insert_with(|| caps[0].to_string());
                String::new()
            }
        }
    });
    if let Some(escape) = bad_escape {
        return Err(DecodeError::InvalidCodePoint(escape));
    }

    check_percent_escapes(&s)?;
    let decoded = percent_decode_str(&s)
        .decode_utf8()
        .map_err(|_| DecodeError::InvalidUtf8)?;
    Ok(decoded.trim().to_string())
}

/// `percent_decode_str` passes malformed escapes through untouched; reject them instead.
fn check_percent_escapes(s: &str) -> Result<(), DecodeError> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes
                .get(i + 1..i + 3)
                .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
            if !ok {
                return Err(DecodeError::DanglingPercent(i));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}
