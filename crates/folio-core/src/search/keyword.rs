//! BM25 lexical index over every fragment in the corpus.
//!
//! This module wraps the [`bm25`](https://crates.io/crates/bm25) crate. The
//! index is never updated in place: after any corpus change it is rebuilt from
//! the full fragment list, so its IDF statistics always describe exactly the
//! current generation.
//!
//! Queries go through the same language-aware tokenizer as documents
//! (lowercasing, stop-word removal, stemming).

use super::types::{by_score_then_ordinal, Fragment, FragmentId, RankedResult};
use crate::config::LexicalLanguage;
use crate::error::IndexError;
use bm25::{Document, Language, SearchEngineBuilder};
use tracing::{debug, instrument};

fn bm25_language(language: LexicalLanguage) -> Language {
    match language {
        LexicalLanguage::English => Language::English,
        LexicalLanguage::Russian => Language::Russian,
    }
}

/// Rebuildable BM25 index (k1 = 1.2, b = 0.75).
///
/// Document ids inside the engine are corpus ordinals.
pub struct LexicalIndex {
    search_engine: Option<bm25::SearchEngine<u64>>,
    fragment_ids: Vec<FragmentId>,
    language: LexicalLanguage,
}

impl LexicalIndex {
    pub fn new(language: LexicalLanguage) -> Self {
        Self {
            search_engine: None,
            fragment_ids: Vec::new(),
            language,
        }
    }

    /// Replaces the index with one built from `fragments`.
    ///
    /// Idempotent; cost is proportional to the corpus size.
    #[instrument(skip_all, fields(fragments = fragments.len()))]
    pub fn rebuild(&mut self, fragments: &[Fragment]) {
        if fragments.is_empty() {
            self.clear();
            return;
        }

        let documents: Vec<Document<u64>> = fragments
            .iter()
            .enumerate()
            .map(|(ordinal, fragment)| Document {
                id: ordinal as u64,
                contents: fragment.text.clone(),
            })
            .collect();

        self.search_engine = Some(
            SearchEngineBuilder::<u64>::with_documents(bm25_language(self.language), documents)
                .build(),
        );
        self.fragment_ids = fragments.iter().map(|f| f.id.clone()).collect();
        debug!("Rebuilt BM25 index with {} fragments", self.fragment_ids.len());
    }

    /// Returns up to `k` fragments with a positive BM25 score, best first.
    ///
    /// Fragments sharing no term with the query are left out, so fewer than
    /// `k` results can come back even from a corpus larger than `k`.
    ///
    /// # Errors
    ///
    /// `IndexError::EmptyCorpus` if the index holds no fragments.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<RankedResult>, IndexError> {
        let engine = self.search_engine.as_ref().ok_or(IndexError::EmptyCorpus)?;

        // Score every match so truncation happens after the deterministic sort.
        let mut results: Vec<RankedResult> = engine
            .search(query, self.fragment_ids.len())
            .into_iter()
            .filter(|result| result.score > 0.0)
            .filter_map(|result| {
                let ordinal = result.document.id as usize;
                self.fragment_ids.get(ordinal).map(|id| RankedResult {
                    fragment_id: id.clone(),
                    score: result.score,
                    ordinal,
                })
            })
            .collect();

        results.sort_by(by_score_then_ordinal);
        results.truncate(k);
        Ok(results)
    }

    pub fn clear(&mut self) {
        self.search_engine = None;
        self.fragment_ids.clear();
    }

    pub fn len(&self) -> usize {
        self.fragment_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragment_ids.is_empty()
    }
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new(LexicalLanguage::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::types::{DocumentFormat, Locator};

    fn fragments(texts: &[&str]) -> Vec<Fragment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Fragment {
                id: FragmentId::from_string(format!("f{}", i)),
                text: text.to_string(),
                source_name: "notes.txt".to_string(),
                locator: Locator::None,
                origin_format: DocumentFormat::Text,
            })
            .collect()
    }

    #[test]
    fn test_keyword_search() {
        let mut index = LexicalIndex::default();
        index.rebuild(&fragments(&[
            "the quick brown fox jumps over the lazy dog",
            "the lazy cat sleeps all day",
            "quick brown rabbits hop in the garden",
        ]));

        let results = index.search("quick brown", 2).unwrap();
        assert_eq!(results.len(), 2);
        let ordinals: Vec<usize> = results.iter().map(|r| r.ordinal).collect();
        assert!(ordinals.contains(&0));
        assert!(ordinals.contains(&2));
    }

    #[test]
    fn test_cat_and_dog() {
        let mut index = LexicalIndex::default();
        index.rebuild(&fragments(&["The cat sat.", "The dog ran."]));

        let results = index.search("cat", 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fragment_id.as_str(), "f0");
    }

    #[test]
    fn test_no_overlap_returns_nothing() {
        let mut index = LexicalIndex::default();
        index.rebuild(&fragments(&["alpha beta", "gamma delta"]));
        assert!(index.search("zebra", 5).unwrap().is_empty());
        assert!(index.search("", 5).unwrap().is_empty());
    }

    #[test]
    fn test_empty_index_is_error() {
        let index = LexicalIndex::default();
        assert!(matches!(
            index.search("query", 10),
            Err(IndexError::EmptyCorpus)
        ));
    }

    #[test]
    fn test_rebuild_is_idempotent_and_deterministic() {
        let corpus = fragments(&[
            "rust ownership and borrowing",
            "borrowing rules in rust",
            "garbage collection in java",
        ]);
        let mut index = LexicalIndex::default();
        index.rebuild(&corpus);
        let first = index.search("rust borrowing", 3).unwrap();
        index.rebuild(&corpus);
        let second = index.search("rust borrowing", 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_equal_scores_break_by_insertion_order() {
        let mut index = LexicalIndex::default();
        index.rebuild(&fragments(&["apple pie", "apple pie", "apple pie"]));
        let results = index.search("apple", 3).unwrap();
        let ordinals: Vec<usize> = results.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn test_clear() {
        let mut index = LexicalIndex::default();
        index.rebuild(&fragments(&["something"]));
        index.clear();
        assert!(index.is_empty());
        assert!(index.search("something", 1).is_err());
    }

    #[test]
    fn test_russian_tokenizer() {
        let mut index = LexicalIndex::new(LexicalLanguage::Russian);
        index.rebuild(&fragments(&["Кошка сидела на окне", "Собака бежала по улице"]));
        let results = index.search("кошка", 2).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ordinal, 0);
    }
}
