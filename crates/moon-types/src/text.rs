/// Markup the editor produces for an empty document.
pub const EMPTY_HTML: &str = "<p></p>";

pub fn is_empty_html(body: &str) -> bool {
    let trimmed = body.trim();
    trimmed.is_empty() || trimmed == EMPTY_HTML || strip_html(trimmed).trim().is_empty()
}

/// Plain-text rendering of editor HTML, used for list previews.
pub fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                if !out.ends_with(' ') && !out.is_empty() {
                    out.push(' ');
                }
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
