//! FictionBook 2 extraction, one unit per `<section>`.

use crate::error::ParseError;
use crate::search::types::{DocumentFormat, Locator, ParsedUnit};
use scraper::{ElementRef, Html, Node, Selector};

/// Elements whose text ends a line.
const BLOCK_ELEMENTS: &[&str] = &[
    "p",
    "fb-title",
    "subtitle",
    "v",
    "stanza",
    "poem",
    "epigraph",
    "cite",
    "text-author",
    "empty-line",
];

pub(super) fn parse(name: &str, bytes: &[u8]) -> Result<Vec<ParsedUnit>, ParseError> {
    let xml =
        std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidEncoding(name.to_string()))?;

    if !xml.contains("<FictionBook") && !xml.contains("<section") {
        return Err(ParseError::Corrupt {
            name: name.to_string(),
            reason: "not a FictionBook document".to_string(),
        });
    }

    // The HTML parser reads <title> as raw text; rename it so its markup is parsed.
    let normalized = xml
        .replace("<title>", "<fb-title>")
        .replace("</title>", "</fb-title>");
    let document = Html::parse_document(&normalized);

    let selector = Selector::parse("section").map_err(|e| ParseError::Corrupt {
        name: name.to_string(),
        reason: format!("bad selector: {:?}", e),
    })?;

    let mut units = Vec::new();
    for (index, section) in document.select(&selector).enumerate() {
        let mut text = String::new();
        own_text(section, &mut text);
        let text = tidy(&text);
        if text.is_empty() {
            continue;
        }
        units.push(ParsedUnit::new(
            text,
            name,
            Locator::Section(index as u32 + 1),
            DocumentFormat::Fb2,
        ));
    }

    Ok(units)
}

/// Collects the text of `element`, skipping nested sections.
fn own_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if el.name() == "section" {
                    continue;
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    own_text(child_element, out);
                }
                if BLOCK_ELEMENTS.contains(&el.name()) {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Collapses runs of spaces inside lines and drops blank lines.
fn tidy(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
