use crate::batch::{BatchMessage, Entry};
use std::borrow::Cow;
use std::fmt::Write;

/// Escape text for use inside a double-quoted XML attribute
fn escape_attr(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

fn write_section(out: &mut String, tag: &str, entries: &[Entry]) {
    if entries.is_empty() {
        return;
    }

    let _ = write!(out, "<{}>", tag);
    for entry in entries {
        let _ = write!(
            out,
            "<entry name=\"{}\" ip=\"{}\"",
            escape_attr(&entry.username),
            entry.ip
        );
        if let Some(timeout) = entry.timeout {
            let _ = write!(out, " timeout=\"{}\"", timeout);
        }
        out.push_str("/>");
    }
    let _ = write!(out, "</{}>", tag);
}

/// Render a batch as a User-ID `update` message
pub fn render_uid_message(message: &BatchMessage) -> String {
    let mut out = String::with_capacity(64 + message.len() * 64);
    out.push_str("<uid-message><payload>");
    write_section(&mut out, "login", message.login());
    write_section(&mut out, "logout", message.logout());
    out.push_str("</payload><type>update</type><version>1.0</version></uid-message>");
    out
}
