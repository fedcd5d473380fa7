//! PDF text extraction, one unit per page.

use crate::error::ParseError;
use crate::search::types::{DocumentFormat, Locator, ParsedUnit};
use lopdf::Document;
use tracing::{debug, warn};

pub(super) fn parse(name: &str, bytes: &[u8]) -> Result<Vec<ParsedUnit>, ParseError> {
    let doc = Document::load_mem(bytes).map_err(|e| ParseError::Corrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    let pages = doc.get_pages();
    debug!("PDF {} has {} pages", name, pages.len());

    let mut units = Vec::new();
    for page_number in pages.keys() {
        let text = match doc.extract_text(&[*page_number]) {
            Ok(text) => text,
            Err(e) => {
                // Image-only or oddly encoded pages have no usable text.
                warn!("No text on page {} of {}: {}", page_number, name, e);
                continue;
            }
        };
        if text.trim().is_empty() {
            continue;
        }
        units.push(ParsedUnit::new(
            text,
            name,
            Locator::Page(*page_number),
            DocumentFormat::Pdf,
        ));
    }

    Ok(units)
}
