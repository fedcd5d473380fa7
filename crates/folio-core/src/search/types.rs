use crate::error::IndexError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source format a fragment was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Portable Document Format, one unit per page
    Pdf,
    /// FictionBook 2 XML, one unit per `<section>`
    Fb2,
    /// Plain UTF-8 text, a single unit
    Text,
}

impl DocumentFormat {
    /// Short lowercase name used in logs and fragment ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Fb2 => "fb2",
            DocumentFormat::Text => "text",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a unit inside its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "number", rename_all = "lowercase")]
pub enum Locator {
    /// 1-based PDF page
    Page(u32),
    /// 1-based FB2 section
    Section(u32),
    /// Whole document
    None,
}

/// Metadata attached to a parsed unit and inherited by its fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMetadata {
    /// Base name of the source file
    pub source_name: String,
    /// Page / section position
    pub locator: Locator,
    /// Format the unit was parsed from
    pub origin_format: DocumentFormat,
}

/// One `(text, metadata)` pair produced by a document parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUnit {
    pub text: String,
    pub metadata: UnitMetadata,
}

impl ParsedUnit {
    pub fn new(
        text: impl Into<String>,
        source_name: impl Into<String>,
        locator: Locator,
        origin_format: DocumentFormat,
    ) -> Self {
        Self {
            text: text.into(),
            metadata: UnitMetadata {
                source_name: source_name.into(),
                locator,
                origin_format,
            },
        }
    }
}

/// Content-derived fragment identifier.
///
/// 128-bit BLAKE3 digest (hex) over the fragment's source name, format,
/// locator, unit index, byte offset and text. Identical input always yields
/// the identical id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(String);

impl FragmentId {
    /// Number of hex characters kept from the digest.
    const HEX_LEN: usize = 32;

    pub(crate) fn derive(
        metadata: &UnitMetadata,
        unit_index: usize,
        byte_offset: usize,
        text: &str,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(metadata.source_name.as_bytes());
        hasher.update(&[0]);
        hasher.update(metadata.origin_format.as_str().as_bytes());
        hasher.update(&[0]);
        match metadata.locator {
            Locator::Page(n) => {
                hasher.update(b"page");
                hasher.update(&n.to_le_bytes());
            }
            Locator::Section(n) => {
                hasher.update(b"section");
                hasher.update(&n.to_le_bytes());
            }
            Locator::None => {
                hasher.update(b"none");
            }
        }
        hasher.update(&(unit_index as u64).to_le_bytes());
        hasher.update(&(byte_offset as u64).to_le_bytes());
        hasher.update(text.as_bytes());

        let hex = hasher.finalize().to_hex();
        Self(hex.as_str()[..Self::HEX_LEN].to_string())
    }

    /// Wraps an already-derived id (e.g. read back from storage).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bounded, overlapping slice of a unit's text.
///
/// Immutable once created; owned by the corpus store after append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub text: String,
    pub source_name: String,
    pub locator: Locator,
    pub origin_format: DocumentFormat,
}

/// One entry of a ranked list returned by an index.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub fragment_id: FragmentId,
    pub score: f32,
    /// Insertion position in the current generation
    pub ordinal: usize,
}

/// Sort comparator shared by every ranked list: score descending, then
/// insertion order ascending.
pub(crate) fn by_score_then_ordinal(a: &RankedResult, b: &RankedResult) -> std::cmp::Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then(a.ordinal.cmp(&b.ordinal))
}

/// Validates that a vector has the dimension fixed by the index.
pub fn validate_dimension(expected: usize, actual: usize) -> Result<(), IndexError> {
    if actual == expected {
        Ok(())
    } else {
        Err(IndexError::DimensionMismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(locator: Locator) -> UnitMetadata {
        UnitMetadata {
            source_name: "book.pdf".to_string(),
            locator,
            origin_format: DocumentFormat::Pdf,
        }
    }

    #[test]
    fn test_fragment_id_is_deterministic() {
        let a = FragmentId::derive(&meta(Locator::Page(1)), 0, 0, "hello");
        let b = FragmentId::derive(&meta(Locator::Page(1)), 0, 0, "hello");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_fragment_id_depends_on_position() {
        let base = FragmentId::derive(&meta(Locator::Page(1)), 0, 0, "hello");
        assert_ne!(
            base,
            FragmentId::derive(&meta(Locator::Page(2)), 0, 0, "hello")
        );
        assert_ne!(
            base,
            FragmentId::derive(&meta(Locator::Page(1)), 0, 10, "hello")
        );
        assert_ne!(
            base,
            FragmentId::derive(&meta(Locator::Section(1)), 0, 0, "hello")
        );
    }

    #[test]
    fn test_validate_dimension() {
        assert!(validate_dimension(3, 3).is_ok());
        assert!(matches!(
            validate_dimension(3, 2),
            Err(IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_ranked_ordering_breaks_ties_by_ordinal() {
        let mut results = vec![
            RankedResult {
                fragment_id: FragmentId::from_string("b"),
                score: 0.5,
                ordinal: 1,
            },
            RankedResult {
                fragment_id: FragmentId::from_string("c"),
                score: 0.9,
                ordinal: 2,
            },
            RankedResult {
                fragment_id: FragmentId::from_string("a"),
                score: 0.5,
                ordinal: 0,
            },
        ];
        results.sort_by(by_score_then_ordinal);
        let ordinals: Vec<usize> = results.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![2, 0, 1]);
    }

    #[test]
    fn test_locator_serialization() {
        let json = serde_json::to_string(&Locator::Page(3)).unwrap();
        assert_eq!(json, r#"{"kind":"page","number":3}"#);
        let back: Locator = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(back, Locator::None);
    }
}
