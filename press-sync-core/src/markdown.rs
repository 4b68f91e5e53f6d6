use pulldown_cmark::{html, Options, Parser};

/// Renders a markdown body to the HTML stored in a post's `content`.
pub fn render_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_basic_markdown() {
        let html = render_html("# Title\n\nSome *emphasis*.\n");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>emphasis</em>"));
    }

    #[test]
    fn nbsp_entities_survive() {
        let html = render_html("&nbsp;&nbsp;indented\n");
        assert!(html.contains("\u{a0}\u{a0}indented"));
    }
}
