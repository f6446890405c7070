//! Server-side markdown rendering for the legacy `/api/render` endpoint.
//!
//! Pages are normally rendered in the browser; this exists for clients that
//! cannot. The output is an HTML fragment prefixed with a CSP meta tag so it
//! stays inert if a client injects it into a document as-is.

use pulldown_cmark::{html, Options, Parser};

const CSP_META: &str = "<meta http-equiv=\"Content-Security-Policy\" content=\"default-src 'self'; \
script-src 'none'; object-src 'none'; base-uri 'none'\">\n";

/// Render CommonMark plus tables, strikethrough, task lists and footnotes.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(CSP_META.len() + markdown.len() * 3 / 2);
    out.push_str(CSP_META);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_headings_and_emphasis() {
        let out = render_markdown("# Title\n\nsome *text*");
        assert!(out.starts_with("<meta http-equiv=\"Content-Security-Policy\""));
        assert!(out.contains("<h1>Title</h1>"));
        assert!(out.contains("<em>text</em>"));
    }

    #[test]
    fn test_extensions_enabled() {
        let out = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~old~~\n\n- [x] done\n");
        assert!(out.contains("<table>"));
        assert!(out.contains("<del>old</del>"));
        assert!(out.contains("type=\"checkbox\""));
    }

    #[test]
    fn test_fenced_code_keeps_language_class() {
        let out = render_markdown("```rust\nfn main() {}\n```\n");
        assert!(out.contains("<code class=\"language-rust\">"));
    }
}
