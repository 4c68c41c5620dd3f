//! Encoding of string values for C string literals.
//!
//! Values are stored as written in source (escape sequences kept), so only
//! bytes outside ASCII need encoding.

use std::sync::LazyLock;

use regex::Regex;

static HEX_FOLLOWED_BY_HEX_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\\x[0-9a-fA-F]{2})([0-9a-fA-F])").unwrap());

/// Encode every byte >= 0x80 of the UTF-8 representation as `\xNN`.
pub fn encode_binary(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("\\x{byte:02x}"));
            }
        }
    }
    out
}

/// Split a hex escape followed by a hex digit into adjacent literals.
///
/// `\xb0C` would be read by a C compiler as one escape, so it becomes
/// `\xb0" "C`.
pub fn split_hex(value: &str) -> String {
    if !value.contains("\\x") {
        return value.to_string();
    }
    // Matches cannot overlap a preceding replacement, so repeat until stable.
    let mut current = value.to_string();
    loop {
        let next = HEX_FOLLOWED_BY_HEX_DIGIT
            .replace_all(&current, "$1\" \"$2")
            .into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Body of a C string literal for `value`, without the surrounding quotes.
pub fn encode_c_string(value: &str) -> String {
    split_hex(&encode_binary(value))
}
