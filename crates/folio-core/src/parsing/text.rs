use crate::error::ParseError;
use crate::search::types::{DocumentFormat, Locator, ParsedUnit};

/// Whole file as one unit; UTF-8 required.
pub(super) fn parse(name: &str, bytes: &[u8]) -> Result<Vec<ParsedUnit>, ParseError> {
    let text =
        std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidEncoding(name.to_string()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    Ok(vec![ParsedUnit::new(
        text,
        name,
        Locator::None,
        DocumentFormat::Text,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_text() {
        let units = parse("notes.txt", "Привет, мир".as_bytes()).unwrap();
        assert_eq!(units[0].text, "Привет, мир");
    }

    #[test]
    fn test_bom_is_stripped() {
        let units = parse("notes.txt", b"\xef\xbb\xbfhello").unwrap();
        assert_eq!(units[0].text, "hello");
    }

    #[test]
    fn test_invalid_utf8() {
        assert!(matches!(
            parse("notes.txt", &[0xff, 0xfe, 0x00]),
            Err(ParseError::InvalidEncoding(_))
        ));
    }
}
