//! Body formatting for formatted-text (HTML) and plain-text articles.

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Wrap editor text into paragraphs: one `<p>` per line, blank lines become `<p><br></p>`.
///
/// "This is a note" → `<p>This is a note</p>`.
pub fn to_html(text: &str) -> String {
    let text = text.trim_end();
    let mut out = String::with_capacity(text.len() + 16);
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            out.push_str("<p><br></p>");
        } else {
            out.push_str("<p>");
            out.push_str(&escape_html(line));
            out.push_str("</p>");
        }
    }
    out
}

/// Plain-text bodies are stored as typed, minus trailing whitespace.
pub fn to_plain(text: &str) -> String {
    text.trim_end().to_string()
}
