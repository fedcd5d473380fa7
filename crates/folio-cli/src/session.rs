//! Interactive chat session state machine.
//!
//! ```text
//! Idle --/upload--> AwaitingFile --path--> Idle
//! Idle --/ask-----> AwaitingQuery --question--> Idle
//! Idle --/reset---> ConfirmReset --yes/other--> Idle
//! any  --/cancel--> Idle
//! ```
//!
//! The session only decides what to do with each input line; the caller
//! performs the returned [`Action`] against the knowledge base.

use folio_core::DocumentFormat;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    AwaitingFile,
    AwaitingQuery,
    ConfirmReset,
}

/// What the caller should do with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Print a message, nothing else
    Reply(String),
    Ingest(PathBuf),
    Answer(String),
    Reset,
    Status,
    Quit,
}

pub const GREETING: &str = "Folio answers questions about your documents.\n\
     Commands: /upload, /ask, /reset, /status, /cancel, /help, /quit";

pub const HELP: &str = "/upload  load a PDF, FB2 or TXT document\n\
     /ask     ask a question about the loaded documents\n\
     /reset   delete every loaded document\n\
     /status  show corpus statistics\n\
     /cancel  abandon the current step\n\
     /quit    leave the session";

#[derive(Debug, Default)]
pub struct Session {
    state: State,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Prompt shown before reading the next line.
    pub fn prompt(&self) -> &'static str {
        match self.state {
            State::Idle => "folio> ",
            State::AwaitingFile => "file> ",
            State::AwaitingQuery => "question> ",
            State::ConfirmReset => "delete all documents? [y/N] ",
        }
    }

    pub fn handle(&mut self, line: &str) -> Action {
        let line = line.trim();

        if line.starts_with('/') {
            return self.command(line);
        }

        match self.state {
            State::Idle => {
                if line.is_empty() {
                    Action::Reply(String::new())
                } else {
                    Action::Reply("Use /ask to ask a question or /upload to add a document.".into())
                }
            }
            State::AwaitingFile => {
                if line.is_empty() {
                    return Action::Reply("Enter the path of a PDF, FB2 or TXT file.".into());
                }
                if DocumentFormat::from_filename(line).is_err() {
                    return Action::Reply(format!(
                        "Unsupported file type: {}. Send a PDF, FB2 or TXT file, or /cancel.",
                        line
                    ));
                }
                self.state = State::Idle;
                Action::Ingest(PathBuf::from(line))
            }
            State::AwaitingQuery => {
                if line.is_empty() {
                    return Action::Reply("Please type your question.".into());
                }
                self.state = State::Idle;
                Action::Answer(line.to_string())
            }
            State::ConfirmReset => {
                self.state = State::Idle;
                if matches!(line.to_ascii_lowercase().as_str(), "y" | "yes") {
                    Action::Reset
                } else {
                    Action::Reply("Reset cancelled.".into())
                }
            }
        }
    }

    fn command(&mut self, line: &str) -> Action {
        let command = line.split_whitespace().next().unwrap_or(line);
        match command {
            "/start" => {
                self.state = State::Idle;
                Action::Reply(GREETING.into())
            }
            "/help" => Action::Reply(HELP.into()),
            "/upload" => {
                self.state = State::AwaitingFile;
                Action::Reply("Enter the path of a PDF, FB2 or TXT file.".into())
            }
            "/ask" => {
                self.state = State::AwaitingQuery;
                Action::Reply("What would you like to know?".into())
            }
            "/reset" => {
                self.state = State::ConfirmReset;
                Action::Reply("This deletes every loaded document.".into())
            }
            "/status" => Action::Status,
            "/cancel" => {
                self.state = State::Idle;
                Action::Reply("Cancelled.".into())
            }
            "/quit" | "/exit" => Action::Quit,
            other => Action::Reply(format!("Unknown command {}. Try /help.", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_flow() {
        let mut session = Session::new();
        assert!(matches!(session.handle("/upload"), Action::Reply(_)));
        assert_eq!(session.state(), State::AwaitingFile);

        assert_eq!(
            session.handle("books/novel.fb2"),
            Action::Ingest(PathBuf::from("books/novel.fb2"))
        );
        assert_eq!(session.state(), State::Idle);
    }

    #[test]
    fn test_unsupported_file_keeps_waiting() {
        let mut session = Session::new();
        session.handle("/upload");
        assert!(matches!(session.handle("slides.pptx"), Action::Reply(_)));
        assert_eq!(session.state(), State::AwaitingFile);
    }

    #[test]
    fn test_ask_flow() {
        let mut session = Session::new();
        session.handle("/ask");
        assert_eq!(session.state(), State::AwaitingQuery);

        assert!(matches!(session.handle("   "), Action::Reply(_)));
        assert_eq!(session.state(), State::AwaitingQuery);

        assert_eq!(
            session.handle("What did the cat do?"),
            Action::Answer("What did the cat do?".to_string())
        );
        assert_eq!(session.state(), State::Idle);
    }

    #[test]
    fn test_reset_needs_confirmation() {
        let mut session = Session::new();
        session.handle("/reset");
        assert_eq!(session.state(), State::ConfirmReset);
        assert_eq!(session.handle("Yes"), Action::Reset);
        assert_eq!(session.state(), State::Idle);

        session.handle("/reset");
        assert_eq!(
            session.handle("no"),
            Action::Reply("Reset cancelled.".to_string())
        );
        assert_eq!(session.state(), State::Idle);
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut session = Session::new();
        for command in ["/upload", "/ask", "/reset"] {
            session.handle(command);
            assert_ne!(session.state(), State::Idle);
            session.handle("/cancel");
            assert_eq!(session.state(), State::Idle);
        }
    }

    #[test]
    fn test_free_text_when_idle_is_not_a_query() {
        let mut session = Session::new();
        assert!(matches!(session.handle("hello"), Action::Reply(_)));
        assert_eq!(session.state(), State::Idle);
    }

    #[test]
    fn test_commands_and_prompts() {
        let mut session = Session::new();
        assert_eq!(session.handle("/status"), Action::Status);
        assert_eq!(session.handle("/quit"), Action::Quit);
        assert!(matches!(session.handle("/bogus"), Action::Reply(r) if r.contains("/bogus")));
        assert_eq!(session.prompt(), "folio> ");
        session.handle("/ask");
        assert_eq!(session.prompt(), "question> ");
    }
}
