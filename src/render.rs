//! Server-side rendering of the answer markdown into the HTML the chat UI
//! inserts. Raw HTML in model output is escaped by the markdown compiler,
//! never passed through.

use std::sync::OnceLock;

use regex::Regex;

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("citation regex"))
}

// Matches inline code and fenced blocks alike; the compiler wraps fenced
// code as <pre><code>.
fn code_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<code[^>]*>.*?</code>").expect("code span regex"))
}

/// Render answer markdown to HTML and rewrite `[n]` citation markers into
/// superscript anchors. Markers whose number exceeds `citation_count` are
/// left as literal text.
pub fn render_answer(markdown_text: &str, citation_count: usize) -> String {
    let normalized = convert_math_delimiters(markdown_text);

    let html = markdown::to_html_with_options(&normalized, &markdown::Options::gfm())
        .unwrap_or_else(|_| format!("<p>{}</p>", escape_html(&normalized)));

    link_citations(&html, citation_count)
}

/// Convert `\( \)` / `\[ \]` math delimiters into `$` / `$$` display syntax
/// before markdown compilation, so the math survives as text for a client
/// typesetter.
fn convert_math_delimiters(text: &str) -> String {
    text.replace("\\(", "$")
        .replace("\\)", "$")
        .replace("\\[", "$$")
        .replace("\\]", "$$")
}

/// Rewrite in-bounds `[n]` markers into `<sup>` anchors targeting the
/// numbered citation entries rendered by the chat page. `<code>` spans are
/// left untouched so indexing expressions like `arr[1]` survive.
fn link_citations(html: &str, citation_count: usize) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for span in code_span_re().find_iter(html) {
        out.push_str(&rewrite_markers(&html[last..span.start()], citation_count));
        out.push_str(span.as_str());
        last = span.end();
    }
    out.push_str(&rewrite_markers(&html[last..], citation_count));
    out
}

fn rewrite_markers(segment: &str, citation_count: usize) -> String {
    citation_re()
        .replace_all(segment, |caps: &regex::Captures| {
            let n: usize = caps[1].parse().unwrap_or(0);
            if n >= 1 && n <= citation_count {
                format!(r##"<sup class="cite"><a href="#cite-{n}">{n}</a></sup>"##)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
