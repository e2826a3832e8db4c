use anyhow::Result;
use std::io::{BufRead, Write};

use crate::qa::{QaResponse, RetrievalQa};

const RULE: &str = "----------------------------------------------------------------------";
const DOUBLE_RULE: &str = "======================================================================";
const SOURCE_SNIPPET_CHARS: usize = 200;
const HISTORY_SNIPPET_CHARS: usize = 150;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub query: String,
    pub response: QaResponse,
}

/// Terminal front end: reads questions from `input`, writes answers to `output`.
pub struct ClientUi<R, W> {
    qa: RetrievalQa,
    input: R,
    output: W,
    history: Vec<HistoryEntry>,
}

impl<R: BufRead, W: Write> ClientUi<R, W> {
    pub fn new(qa: RetrievalQa, input: R, output: W) -> Self {
        Self {
            qa,
            input,
            output,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub fn display_welcome(&mut self) -> Result<()> {
        let out = &mut self.output;
        writeln!(out, "{}", DOUBLE_RULE)?;
        writeln!(out, "ReqMind - Requirements Document Q&A")?;
        writeln!(out, "{}", DOUBLE_RULE)?;
        writeln!(out)?;
        writeln!(out, "Welcome! I can help you search through requirements documents.")?;
        writeln!(out)?;
        writeln!(out, "Example questions you can ask:")?;
        writeln!(out, "  - What are the authentication requirements?")?;
        writeln!(out, "  - What is the maximum response time?")?;
        writeln!(out, "  - Tell me about the security requirements")?;
        writeln!(out)?;
        writeln!(out, "Commands:")?;
        writeln!(out, "  - 'exit', 'quit' or 'q' - Exit")?;
        writeln!(out, "  - 'history' - Show conversation history")?;
        writeln!(out, "  - 'clear' - Clear conversation history")?;
        writeln!(out)?;
        writeln!(out, "{}", RULE)?;
        writeln!(out)?;
        Ok(())
    }

    /// Ask the QA chain and record the exchange.
    pub async fn send_query(&mut self, query: &str) -> QaResponse {
        let response = self.qa.process_query(query).await;
        self.history.push(HistoryEntry {
            query: query.to_string(),
            response: response.clone(),
        });
        response
    }

    pub fn display_response(&mut self, response: &QaResponse) -> Result<()> {
        let out = &mut self.output;
        if !response.source_documents.is_empty() {
            writeln!(out)?;
            writeln!(out, "Source Documents (first {} characters):", SOURCE_SNIPPET_CHARS)?;
            writeln!(out, "{}", RULE)?;
            for (i, doc) in response.source_documents.iter().enumerate() {
                writeln!(
                    out,
                    "Source {} [{}]: {}",
                    i + 1,
                    doc.metadata.label(),
                    doc.snippet(SOURCE_SNIPPET_CHARS)
                )?;
                writeln!(out)?;
            }
        }

        writeln!(out, "Answer:")?;
        writeln!(out, "{}", RULE)?;
        writeln!(out, "{}", response.result)?;
        writeln!(out, "{}", RULE)?;
        writeln!(out)?;
        Ok(())
    }

    pub fn show_error(&mut self, error: &str) -> Result<()> {
        writeln!(self.output, "\nError: {}\n", error)?;
        Ok(())
    }

    pub fn show_history(&mut self) -> Result<()> {
        let out = &mut self.output;
        if self.history.is_empty() {
            writeln!(out, "\nNo conversation history yet.\n")?;
            return Ok(());
        }

        writeln!(out, "\nConversation History:")?;
        writeln!(out, "{}", DOUBLE_RULE)?;
        for (i, entry) in self.history.iter().enumerate() {
            let answer: String = entry
                .response
                .result
                .chars()
                .take(HISTORY_SNIPPET_CHARS)
                .collect();
            writeln!(out, "\n[{}] Q: {}", i + 1, entry.query)?;
            writeln!(out, "    A: {}...", answer)?;
        }
        writeln!(out, "\n{}\n", DOUBLE_RULE)?;
        Ok(())
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.history.clear();
        writeln!(self.output, "\nConversation history cleared.\n")?;
        Ok(())
    }

    /// Read-eval loop until an exit command or end of input.
    pub async fn run(&mut self) -> Result<()> {
        self.display_welcome()?;

        let mut line = String::new();
        loop {
            write!(self.output, "Your question: ")?;
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                break;
            }
            let query = line.trim();
            if query.is_empty() {
                continue;
            }

            match query.to_lowercase().as_str() {
                "exit" | "quit" | "q" => {
                    writeln!(self.output, "\nThank you for using ReqMind! Goodbye!\n")?;
                    break;
                }
                "history" => self.show_history()?,
                "clear" => self.clear_history()?,
                _ => {
                    let query = query.to_string();
                    writeln!(self.output, "\nSearching documents...")?;
                    let response = self.send_query(&query).await;
                    self.display_response(&response)?;
                }
            }
        }
        Ok(())
    }

    pub async fn query_once(&mut self, query: &str) -> Result<QaResponse> {
        writeln!(self.output, "\nQuestion: {}", query)?;
        let response = self.send_query(query).await;
        self.display_response(&response)?;
        Ok(response)
    }
}
