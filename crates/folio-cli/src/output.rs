//! Output formatting for command results.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use folio_core::config::LexicalLanguage;
use folio_core::engine::answer::source_label;
use folio_core::{Answer, EngineError, ErrorClass, IngestReport, RetrievedFragment, Status};
use serde::Serialize;

/// Maximum characters to show in a text snippet
const SNIPPET_MAX_LEN: usize = 200;

#[derive(Serialize)]
struct JsonFragment {
    source: String,
    score: f32,
    vector_score: Option<f32>,
    lexical_score: Option<f32>,
    snippet: String,
}

impl JsonFragment {
    fn new(result: &RetrievedFragment, language: LexicalLanguage) -> Self {
        Self {
            source: source_label(&result.fragment, language),
            score: result.score,
            vector_score: result.vector_score,
            lexical_score: result.lexical_score,
            snippet: truncate_text(&result.fragment.text, SNIPPET_MAX_LEN),
        }
    }
}

#[derive(Serialize)]
struct JsonSearch<'a> {
    query: &'a str,
    results: Vec<JsonFragment>,
}

#[derive(Serialize)]
struct JsonAnswer<'a> {
    question: &'a str,
    answer: &'a str,
    sources: &'a [String],
    fragments: Vec<JsonFragment>,
}

#[derive(Serialize)]
struct JsonIngest<'a> {
    file: &'a str,
    #[serde(flatten)]
    report: &'a IngestReport,
}

#[derive(Serialize)]
struct JsonStatus {
    data_dir: String,
    fragment_count: usize,
    embedding_count: usize,
    generation: u64,
    embedding_model: String,
    stored_model: Option<String>,
    halted: Option<String>,
}

#[derive(Serialize)]
struct JsonError {
    error: String,
    class: &'static str,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_search_json(
    query: &str,
    results: &[RetrievedFragment],
    language: LexicalLanguage,
) -> String {
    to_json(&JsonSearch {
        query,
        results: results
            .iter()
            .map(|r| JsonFragment::new(r, language))
            .collect(),
    })
}

pub fn format_search_human(
    query: &str,
    results: &[RetrievedFragment],
    language: LexicalLanguage,
) -> String {
    if results.is_empty() {
        return format!("No results found for \"{}\"", query);
    }

    let mut output = format!(
        "Found {} fragment{} for \"{}\":\n\n",
        results.len(),
        if results.len() == 1 { "" } else { "s" },
        query
    );

    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!(
            "{}. {} (score: {:.2})\n",
            i + 1,
            source_label(&result.fragment, language),
            result.score
        ));

        let mut score_parts = Vec::new();
        if let Some(vs) = result.vector_score {
            score_parts.push(format!("semantic: {:.2}", vs));
        }
        if let Some(ls) = result.lexical_score {
            score_parts.push(format!("keyword: {:.2}", ls));
        }
        if !score_parts.is_empty() {
            output.push_str(&format!("   [{}]\n", score_parts.join(", ")));
        }

        let snippet = truncate_text(&result.fragment.text, SNIPPET_MAX_LEN);
        output.push_str(&format!("   {}\n\n", indent_text(&snippet, "   ")));
    }

    output.trim_end().to_string()
}

pub fn format_answer_json(question: &str, answer: &Answer, language: LexicalLanguage) -> String {
    to_json(&JsonAnswer {
        question,
        answer: &answer.synthesized_answer,
        sources: &answer.source_labels,
        fragments: answer
            .fragments
            .iter()
            .map(|r| JsonFragment::new(r, language))
            .collect(),
    })
}

pub fn format_answer_human(answer: &Answer) -> String {
    let mut output = answer.synthesized_answer.trim().to_string();
    if !answer.source_labels.is_empty() {
        output.push_str("\n\nSources:");
        for label in &answer.source_labels {
            output.push_str(&format!("\n- {}", label));
        }
    }
    output
}

pub fn format_ingest_json(file: &str, report: &IngestReport) -> String {
    to_json(&JsonIngest { file, report })
}

pub fn format_ingest_human(file: &str, report: &IngestReport) -> String {
    let mut output = format!(
        "Loaded {}: {} new fragment{}",
        file,
        report.fragment_count,
        if report.fragment_count == 1 { "" } else { "s" }
    );
    if report.duplicate_count > 0 {
        output.push_str(&format!(
            ", {} already indexed",
            report.duplicate_count
        ));
    }
    if report.restored_count > 0 {
        output.push_str(&format!(
            ", {} missing embeddings restored",
            report.restored_count
        ));
    }
    output
}

pub fn format_status_json(status: &Status) -> String {
    to_json(&JsonStatus {
        data_dir: status.data_dir.display().to_string(),
        fragment_count: status.fragment_count,
        embedding_count: status.embedding_count,
        generation: status.generation,
        embedding_model: status.embedding_model.clone(),
        stored_model: status.stored_model.clone(),
        halted: status.halted.as_ref().map(|r| r.to_string()),
    })
}

pub fn format_status_human(status: &Status) -> String {
    let mut output = format!(
        "Data directory: {}\nFragments: {}\nEmbeddings: {} (model {})",
        status.data_dir.display(),
        status.fragment_count,
        status.embedding_count,
        status.stored_model.as_deref().unwrap_or(&status.embedding_model),
    );
    if let Some(reason) = &status.halted {
        output.push_str(&format!(
            "\nWrites halted: {}\nRun `folio reindex` or `folio reset` to recover.",
            reason
        ));
    }
    output
}

fn class_name(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::NothingToSearch => "nothing_to_search",
        ErrorClass::BadInput => "bad_input",
        ErrorClass::ProviderFailure => "provider_failure",
        ErrorClass::SystemBroken => "system_broken",
    }
}

pub fn format_error_json(err: &EngineError) -> String {
    to_json(&JsonError {
        error: err.to_string(),
        class: class_name(err.class()),
    })
}

/// User-facing explanation of an engine error.
pub fn format_error_human(err: &EngineError) -> String {
    match err.class() {
        ErrorClass::NothingToSearch => match err {
            EngineError::EmptyCorpus => {
                "No documents loaded yet. Load one first with `folio ingest` or /upload.".into()
            }
            _ => format!(
                "Search is unavailable: {}. Run `folio reindex` to rebuild the index.",
                err
            ),
        },
        ErrorClass::BadInput => format!("Could not use that input: {}", err),
        ErrorClass::ProviderFailure => {
            format!("A model provider failed, please try again later: {}", err)
        }
        ErrorClass::SystemBroken => format!(
            "{}\nRun `folio reindex` or `folio reset` to recover.",
            err
        ),
    }
}

/// Truncates text to a maximum number of characters, adding ellipsis if needed.
fn truncate_text(text: &str, max_len: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_len) {
        None => text.to_string(),
        Some((cut, _)) => {
            let truncated = &text[..cut];
            match truncated.rfind(' ') {
                Some(last_space) => format!("{}...", &truncated[..last_space]),
                None => format!("{}...", truncated),
            }
        }
    }
}

/// Indents all lines of text after the first line.
fn indent_text(text: &str, indent: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.to_string()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::error::IndexError;
    use folio_core::search::FragmentId;
    use folio_core::{DocumentFormat, Fragment, HaltReason, Locator};
    use std::path::PathBuf;

    fn retrieved(source: &str, locator: Locator, text: &str, score: f32) -> RetrievedFragment {
        RetrievedFragment {
            fragment: Fragment {
                id: FragmentId::from_string(format!("{}-{}", source, text.len())),
                text: text.to_string(),
                source_name: source.to_string(),
                locator,
                origin_format: DocumentFormat::Pdf,
            },
            score,
            vector_score: Some(0.8),
            lexical_score: None,
        }
    }

    #[test]
    fn test_format_search_human_empty() {
        let output = format_search_human("test query", &[], LexicalLanguage::English);
        assert!(output.contains("No results found"));
    }

    #[test]
    fn test_format_search_human_single() {
        let results = vec![retrieved("book.pdf", Locator::Page(4), "Some content", 0.85)];
        let output = format_search_human("test", &results, LexicalLanguage::English);
        assert!(output.contains("1 fragment "));
        assert!(output.contains("book.pdf, page 4"));
        assert!(output.contains("0.85"));
        assert!(output.contains("semantic: 0.80"));
        assert!(!output.contains("keyword"));
    }

    #[test]
    fn test_format_search_json() {
        let results = vec![retrieved("notes.txt", Locator::None, "Content here", 0.5)];
        let output = format_search_json("query", &results, LexicalLanguage::English);
        assert!(output.contains("\"query\": \"query\""));
        assert!(output.contains("\"source\": \"notes.txt\""));
        assert!(output.contains("\"score\": 0.5"));
        assert!(output.contains("\"lexical_score\": null"));
    }

    #[test]
    fn test_format_search_russian_labels() {
        let results = vec![retrieved("роман.fb2", Locator::Section(3), "Текст", 0.7)];
        let output = format_search_json("запрос", &results, LexicalLanguage::Russian);
        assert!(output.contains("\"source\": \"роман.fb2, раздел 3\""));
    }

    #[test]
    fn test_format_answer_human_lists_sources() {
        let answer = Answer {
            fragments: vec![],
            synthesized_answer: "The cat sat.\n".into(),
            source_labels: vec!["pets.txt".into(), "book.pdf, page 2".into()],
        };
        assert_eq!(
            format_answer_human(&answer),
            "The cat sat.\n\nSources:\n- pets.txt\n- book.pdf, page 2"
        );
    }

    #[test]
    fn test_format_ingest() {
        let report = IngestReport {
            fragment_count: 1,
            duplicate_count: 2,
            restored_count: 0,
            generation: 3,
        };
        assert_eq!(
            format_ingest_human("a.txt", &report),
            "Loaded a.txt: 1 new fragment, 2 already indexed"
        );
        let restoring = IngestReport {
            restored_count: 2,
            ..report.clone()
        };
        assert_eq!(
            format_ingest_human("a.txt", &restoring),
            "Loaded a.txt: 1 new fragment, 2 already indexed, 2 missing embeddings restored"
        );
        let json = format_ingest_json("a.txt", &report);
        assert!(json.contains("\"file\": \"a.txt\""));
        assert!(json.contains("\"duplicate_count\": 2"));
    }

    #[test]
    fn test_format_status_halted() {
        let status = Status {
            fragment_count: 2,
            embedding_count: 2,
            generation: 5,
            halted: Some(HaltReason::PartialReset("index busy".into())),
            embedding_model: "m".into(),
            stored_model: None,
            data_dir: PathBuf::from("/data"),
        };
        let human = format_status_human(&status);
        assert!(human.contains("Writes halted: incomplete reset: index busy"));
        let json = format_status_json(&status);
        assert!(json.contains("\"generation\": 5"));
    }

    #[test]
    fn test_error_messages_by_class() {
        let empty = format_error_human(&EngineError::EmptyCorpus);
        assert!(empty.contains("No documents loaded"));

        let unavailable = EngineError::RetrieverUnavailable(IndexError::NotInitialized);
        assert!(format_error_human(&unavailable).contains("reindex"));
        assert!(format_error_json(&unavailable).contains("nothing_to_search"));
    }

    #[test]
    fn test_truncate_text() {
        let short = "Short text";
        assert_eq!(truncate_text(short, 50), short);

        let long = "This is a much longer text that should be truncated at a reasonable point";
        let truncated = truncate_text(long, 30);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 33);

        let cyrillic = "Привет мир ".repeat(30);
        assert!(truncate_text(&cyrillic, 20).ends_with("..."));
    }
}
