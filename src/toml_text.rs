//! Hand-rendered TOML fragments
//!
//! The credential, rule and client config files are written line by line so
//! their layout stays stable across saves. These helpers produce the value
//! side of a `key = value` line.

/// Basic TOML string, quoted and escaped
pub(crate) fn string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Inline array of strings: `["a", "b"]`
pub(crate) fn string_list<S: AsRef<str>>(values: &[S]) -> String {
    let items: Vec<String> = values.iter().map(|v| string(v.as_ref())).collect();
    format!("[{}]", items.join(", "))
}

/// Multi-line basic string for PEM blocks
pub(crate) fn multiline(value: &str) -> String {
    let cleaned = value.trim_matches('\n');
    format!("\"\"\"\n{}\n\"\"\"", cleaned)
}

/// Join rendered lines into file content with exactly one trailing newline
pub(crate) fn finish(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut content = lines.join("\n").trim_end().to_string();
    content.push('\n');
    content
}
