//! Document parsers.
//!
//! Each format has one pure parser producing [`ParsedUnit`]s; [`parse_document`]
//! dispatches on [`DocumentFormat`]. Parsing never touches the corpus, so a
//! [`ParseError`] only aborts ingestion of that one document.

mod fb2;
mod pdf;
mod text;

pub use crate::search::types::DocumentFormat;

use crate::error::ParseError;
use crate::search::types::ParsedUnit;
use std::path::Path;
use tracing::{debug, instrument};

impl DocumentFormat {
    /// Detects the format from a file name's extension (case-insensitive).
    ///
    /// # Errors
    ///
    /// `ParseError::UnsupportedFormat` for anything other than pdf, fb2, txt.
    pub fn from_filename(filename: &str) -> Result<Self, ParseError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Ok(DocumentFormat::Pdf),
            Some("fb2") => Ok(DocumentFormat::Fb2),
            Some("txt") => Ok(DocumentFormat::Text),
            _ => Err(ParseError::UnsupportedFormat(filename.to_string())),
        }
    }
}

/// Base name of a path-like file name, used as the fragment source name.
pub fn source_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(filename)
        .to_string()
}

/// Parses raw document bytes into units.
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn parse_document(
    format: DocumentFormat,
    filename: &str,
    bytes: &[u8],
) -> Result<Vec<ParsedUnit>, ParseError> {
    let name = source_name(filename);
    let units = match format {
        DocumentFormat::Pdf => pdf::parse(&name, bytes)?,
        DocumentFormat::Fb2 => fb2::parse(&name, bytes)?,
        DocumentFormat::Text => text::parse(&name, bytes)?,
    };
    debug!("Parsed {} units from {}", units.len(), name);
    Ok(units)
}

/// Detects the format from `filename` and parses `bytes`.
pub fn parse_file(filename: &str, bytes: &[u8]) -> Result<Vec<ParsedUnit>, ParseError> {
    parse_document(DocumentFormat::from_filename(filename)?, filename, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::types::Locator;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DocumentFormat::from_filename("book.pdf").unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_filename("Novel.FB2").unwrap(),
            DocumentFormat::Fb2
        );
        assert_eq!(
            DocumentFormat::from_filename("/tmp/notes.txt").unwrap(),
            DocumentFormat::Text
        );
        assert!(matches!(
            DocumentFormat::from_filename("slides.pptx"),
            Err(ParseError::UnsupportedFormat(_))
        ));
        assert!(DocumentFormat::from_filename("README").is_err());
    }

    #[test]
    fn test_source_name_is_base_name() {
        assert_eq!(source_name("/home/user/docs/notes.txt"), "notes.txt");
        assert_eq!(source_name("notes.txt"), "notes.txt");
    }

    #[test]
    fn test_parse_file_dispatches_on_extension() {
        let units = parse_file("dir/hello.txt", "Hello there".as_bytes()).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].metadata.source_name, "hello.txt");
        assert_eq!(units[0].metadata.locator, Locator::None);
        assert_eq!(units[0].metadata.origin_format, DocumentFormat::Text);

        assert!(matches!(
            parse_file("image.png", b"\x89PNG"),
            Err(ParseError::UnsupportedFormat(_))
        ));
    }
}
