//! Web page text extraction.

use scraper::{Html, Node};

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

const TRUNCATION_MARKER: &str = " ... <truncated>";
const EMPTY_PAGE: &str = "<empty>";

/// Visible text of an HTML document, one text run per line.
pub(crate) fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<String> = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }

    lines.join("\n")
}

/// Cap page text at `max_chars` characters; empty pages become `<empty>`.
pub(crate) fn clip(text: String, max_chars: usize) -> String {
    if text.trim().is_empty() {
        return EMPTY_PAGE.to_string();
    }

    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text,
    }
}
