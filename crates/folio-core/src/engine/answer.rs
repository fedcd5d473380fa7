//! Prompt construction and citation labels for answer synthesis.

use crate::config::LexicalLanguage;
use crate::search::types::{Fragment, Locator};

/// Reply used when the context cannot answer the question.
pub const NO_ANSWER: &str = "The provided documents do not contain this information.";

const CONTEXT_HEADER: &str = "Context:\n";
const QUESTION_HEADER: &str = "\n\nQuestion: ";

/// Builds the generation prompt: instructions, context (fragment texts
/// separated by blank lines), then the question.
pub fn build_prompt<S: AsRef<str>>(question: &str, contexts: &[S]) -> String {
    let context = contexts
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an assistant that answers questions using the information provided.\n\
         \n\
         Instructions:\n\
         1. Answer only from the context below.\n\
         2. If the context does not contain the answer, say so: \"{NO_ANSWER}\"\n\
         3. Do not invent information.\n\
         4. Give a structured, clear answer.\n\
         \n\
         {CONTEXT_HEADER}{context}{QUESTION_HEADER}{question}\n\
         \n\
         Answer:"
    )
}

/// Returns the context block of a prompt made by [`build_prompt`].
pub fn context_of(prompt: &str) -> Option<&str> {
    let start = prompt.find(CONTEXT_HEADER)? + CONTEXT_HEADER.len();
    let end = prompt[start..].rfind(QUESTION_HEADER)? + start;
    Some(&prompt[start..end])
}

/// Citation label of one fragment: `"{source}, page {n}"`,
/// `"{source}, section {n}"` or `"{source}"`, with the locator word in
/// `language`.
pub fn source_label(fragment: &Fragment, language: LexicalLanguage) -> String {
    match fragment.locator {
        Locator::Page(n) => format!("{}, {} {}", fragment.source_name, language.page_word(), n),
        Locator::Section(n) => format!(
            "{}, {} {}",
            fragment.source_name,
            language.section_word(),
            n
        ),
        Locator::None => fragment.source_name.clone(),
    }
}

/// Deduplicated labels in first-seen order.
pub fn source_labels(fragments: &[Fragment], language: LexicalLanguage) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for fragment in fragments {
        let label = source_label(fragment, language);
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::types::{DocumentFormat, FragmentId};

    fn fragment(source: &str, locator: Locator) -> Fragment {
        Fragment {
            id: FragmentId::from_string(format!("{}-{:?}", source, locator)),
            text: "text".to_string(),
            source_name: source.to_string(),
            locator,
            origin_format: DocumentFormat::Pdf,
        }
    }

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_prompt("Who sat?", &["The cat sat.", "The dog ran."]);
        assert!(prompt.contains("The cat sat.\n\nThe dog ran."));
        assert!(prompt.contains("Question: Who sat?"));
        assert!(prompt.contains("Answer only from the context"));
        assert!(prompt.trim_end().ends_with("Answer:"));
    }

    #[test]
    fn test_context_of_round_trips() {
        let prompt = build_prompt("q", &["one", "two"]);
        assert_eq!(context_of(&prompt), Some("one\n\ntwo"));
        assert_eq!(context_of("nothing"), None);
    }

    #[test]
    fn test_context_containing_question_marker() {
        let prompt = build_prompt("q", &["Question: inside the text"]);
        assert_eq!(context_of(&prompt), Some("Question: inside the text"));
    }

    #[test]
    fn test_source_labels_deduplicated_in_order() {
        let fragments = vec![
            fragment("book.pdf", Locator::Page(3)),
            fragment("novel.fb2", Locator::Section(2)),
            fragment("book.pdf", Locator::Page(3)),
            fragment("notes.txt", Locator::None),
            fragment("book.pdf", Locator::Page(1)),
        ];
        assert_eq!(
            source_labels(&fragments, LexicalLanguage::English),
            vec![
                "book.pdf, page 3",
                "novel.fb2, section 2",
                "notes.txt",
                "book.pdf, page 1",
            ]
        );
    }

    #[test]
    fn test_russian_locator_words() {
        let fragments = vec![
            fragment("книга.pdf", Locator::Page(5)),
            fragment("роман.fb2", Locator::Section(1)),
            fragment("заметки.txt", Locator::None),
        ];
        assert_eq!(
            source_labels(&fragments, LexicalLanguage::Russian),
            vec!["книга.pdf, страница 5", "роман.fb2, раздел 1", "заметки.txt"]
        );
    }
}
