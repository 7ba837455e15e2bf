//! Newline escaping of persisted text fields
//!
//! Rule files cannot carry raw line breaks inside field text. A newline is
//! stored as the two characters `\` `n`, a carriage return as `\` `r`.
//! Any other backslash is left alone, so text that was never escaped
//! decodes unchanged unless it happens to contain one of the two tokens.

use std::borrow::Cow;

pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['\n', '\r']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

pub fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                chars.next();
                unescaped.push('\n');
            }
            Some('r') => {
                chars.next();
                unescaped.push('\r');
            }
            _ => unescaped.push('\\'),
        }
    }
    Cow::Owned(unescaped)
}
