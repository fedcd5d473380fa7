//! Text chunking for document ingestion.
//!
//! Splits parsed units into overlapping fragments bounded by a character
//! count. Cut points come from the `text-splitter` crate, which picks the
//! highest semantic level (paragraph, sentence, word, grapheme) whose pieces
//! fit within the chunk size and merges neighbours up to that size.
//!
//! Chunking is deterministic: the same units and settings always produce the
//! same fragments with the same ids.

use crate::error::ChunkingError;
use crate::search::types::{Fragment, FragmentId, ParsedUnit};
use text_splitter::{Characters, ChunkConfig, TextSplitter};
use tracing::{debug, instrument};

/// Character-bounded, overlap-aware splitter.
pub struct Chunker {
    splitter: TextSplitter<Characters>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Creates a chunker.
    ///
    /// # Errors
    ///
    /// `ChunkingError::InvalidConfig` unless `chunk_size > 0` and
    /// `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| ChunkingError::InvalidConfig(e.to_string()))?
            .with_trim(true);

        Ok(Self {
            splitter: TextSplitter::new(config),
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits one text into `(byte_offset, piece)` pairs.
    ///
    /// Offsets index into `text`; pieces are trimmed and never longer than
    /// `chunk_size` characters. Whitespace-only text yields nothing.
    pub fn spans<'t>(&self, text: &'t str) -> Vec<(usize, &'t str)> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.splitter
            .chunk_indices(text)
            .filter(|(_, piece)| !piece.trim().is_empty())
            .collect()
    }

    /// Splits units into fragments, in unit order then position order.
    ///
    /// Each fragment inherits the source name, locator and format of its
    /// unit.
    #[instrument(skip_all, fields(units = units.len()))]
    pub fn split(&self, units: &[ParsedUnit]) -> Vec<Fragment> {
        let mut fragments = Vec::new();

        for (unit_index, unit) in units.iter().enumerate() {
            let spans = self.spans(&unit.text);
            if spans.is_empty() {
                debug!(
                    "Unit {} of {} has no text, skipping",
                    unit_index, unit.metadata.source_name
                );
                continue;
            }

            for (offset, piece) in spans {
                fragments.push(Fragment {
                    id: FragmentId::derive(&unit.metadata, unit_index, offset, piece),
                    text: piece.to_string(),
                    source_name: unit.metadata.source_name.clone(),
                    locator: unit.metadata.locator,
                    origin_format: unit.metadata.origin_format,
                });
            }
        }

        debug!("Split into {} fragments", fragments.len());
        fragments
    }
}

/// One-shot form of [`Chunker::split`].
pub fn split(
    units: &[ParsedUnit],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Fragment>, ChunkingError> {
    Ok(Chunker::new(chunk_size, chunk_overlap)?.split(units))
}
