// src/batch.rs

use crate::error::{ExtractError, InputError};
use crate::gemini::RemoteService;
use crate::invoice::Invoice;
use crate::llm_extract;
use crate::summary::SummaryRow;
use futures::future::join_all;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{Instrument, info, info_span, warn};

/// How the documents of one batch are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Issue every extraction at once and wait for all of them to settle.
    #[default]
    Concurrent,
    /// Await each extraction before starting the next.
    Sequential,
}

/// A document selected for extraction.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    path: PathBuf,
}

impl Document {
    pub fn from_path(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    async fn contents(&self) -> Result<Vec<u8>, ExtractError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| ExtractError::Read {
                path: self.path.display().to_string(),
                source,
            })
    }
}

/// What the user supplied for one run, before anything is sent anywhere.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub api_key: Option<String>,
    pub model: String,
    pub files: Vec<PathBuf>,
}

impl BatchRequest {
    /// Check the required inputs in the order key, files, model and hand
    /// back the usable API key.
    pub fn validate(&self) -> Result<&str, InputError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(InputError::MissingApiKey)?;
        if self.files.is_empty() {
            return Err(InputError::MissingFiles);
        }
        if self.model.trim().is_empty() {
            return Err(InputError::MissingModel);
        }
        Ok(api_key)
    }
}

/// The result of extracting one document.
#[derive(Debug)]
pub struct Outcome {
    pub file_name: String,
    pub result: Result<Invoice, ExtractError>,
}

/// Rows accumulated for the current batch.
#[derive(Debug, Default)]
pub struct Session {
    rows: Vec<SummaryRow>,
}

impl Session {
    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    /// Run one batch. Prior rows are dropped first; afterwards the session
    /// holds one row per successful document, in input order.
    pub async fn process_batch(
        &mut self,
        service: &dyn RemoteService,
        model: &str,
        documents: &[Document],
        mode: Mode,
        progress: &ProgressBar,
    ) -> Vec<Outcome> {
        self.rows.clear();
        info!(count = documents.len(), mode = ?mode, model = %model, "Processing batch");

        let outcomes = match mode {
            Mode::Sequential => {
                let mut outcomes = Vec::with_capacity(documents.len());
                for doc in documents {
                    outcomes.push(run_one(service, model, doc).await);
                    progress.inc(1);
                }
                outcomes
            }
            Mode::Concurrent => {
                join_all(documents.iter().map(|doc| async move {
                    let outcome = run_one(service, model, doc).await;
                    progress.inc(1);
                    outcome
                }))
                .await
            }
        };

        for outcome in &outcomes {
            if let Ok(invoice) = &outcome.result {
                self.rows
                    .push(SummaryRow::from_invoice(&outcome.file_name, invoice));
            }
        }
        outcomes
    }
}

async fn run_one(service: &dyn RemoteService, model: &str, doc: &Document) -> Outcome {
    let span = info_span!("extract", file = %doc.name);
    let result: Result<Invoice, ExtractError> = async {
        let contents = doc.contents().await?;
        llm_extract::extract_invoice(service, model, &contents, &doc.name).await
    }
    .instrument(span)
    .await;

    if let Err(e) = &result {
        warn!(file = %doc.name, error = %e, "Extraction failed");
    }
    Outcome {
        file_name: doc.name.clone(),
        result,
    }
}

/// Closing line for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSummary {
    AllSucceeded { total: usize },
    Partial { succeeded: usize, total: usize },
    NoneSucceeded,
    Empty,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let total = outcomes.len();
        let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
        match (succeeded, total) {
            (_, 0) => BatchSummary::Empty,
            (0, _) => BatchSummary::NoneSucceeded,
            (s, t) if s == t => BatchSummary::AllSucceeded { total },
            (s, t) => BatchSummary::Partial {
                succeeded: s,
                total: t,
            },
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchSummary::AllSucceeded { total } => {
                write!(f, "All {total} invoices processed successfully!")
            }
            BatchSummary::Partial { succeeded, total } => write!(
                f,
                "Successfully processed {succeeded} out of {total} invoices."
            ),
            BatchSummary::NoneSucceeded => write!(
                f,
                "Processing complete, but no data was successfully extracted from any file."
            ),
            BatchSummary::Empty => write!(f, "No files were processed."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::testing::{Script, ScriptedService};
    use crate::llm_extract::tests::{PDF, invoice_json};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn docs(dir: &TempDir, names: &[&str]) -> Vec<Document> {
        names
            .iter()
            .map(|n| {
                let path = dir.path().join(n);
                std::fs::write(&path, PDF).unwrap();
                Document::from_path(path)
            })
            .collect()
    }

    fn mixed_service() -> ScriptedService {
        ScriptedService::new()
            .script("a.pdf", Script::Respond(invoice_json("INV-A", 100.0)))
            .script("b.pdf", Script::FailGenerate)
            .script("c.pdf", Script::Respond(invoice_json("INV-C", 300.0)))
            .script("d.pdf", Script::FailUpload)
            .script("e.pdf", Script::Respond(invoice_json("INV-E", 500.0)))
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        for mode in [Mode::Concurrent, Mode::Sequential] {
            let service = mixed_service();
            let mut session = Session::default();
            let documents = docs(&dir, &["a.pdf", "b.pdf", "c.pdf", "d.pdf", "e.pdf"]);

            let outcomes = session
                .process_batch(&service, "gemini-test", &documents, mode, &ProgressBar::hidden())
                .await;

            assert_eq!(outcomes.len(), 5);
            let names: Vec<&str> = session.rows().iter().map(|r| r.file_name.as_str()).collect();
            assert_eq!(names, vec!["a.pdf", "c.pdf", "e.pdf"], "{mode:?}");
            let numbers: Vec<&str> = session
                .rows()
                .iter()
                .map(|r| r.invoice_number.as_str())
                .collect();
            assert_eq!(numbers, vec!["INV-A", "INV-C", "INV-E"]);
            assert!(outcomes[1].result.is_err());
            assert!(outcomes[3].result.is_err());
            assert_eq!(
                BatchSummary::from_outcomes(&outcomes),
                BatchSummary::Partial {
                    succeeded: 3,
                    total: 5
                }
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_mode_overlaps_requests() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::new()
            .script("a.pdf", Script::Respond(invoice_json("INV-A", 1.0)))
            .script("b.pdf", Script::Respond(invoice_json("INV-B", 2.0)))
            .script("c.pdf", Script::Respond(invoice_json("INV-C", 3.0)));
        let mut session = Session::default();
        session
            .process_batch(
                &service,
                "gemini-test",
                &docs(&dir, &["a.pdf", "b.pdf", "c.pdf"]),
                Mode::Concurrent,
                &ProgressBar::hidden(),
            )
            .await;
        assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(session.rows().len(), 3);
    }

    #[tokio::test]
    async fn test_sequential_mode_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService::new()
            .script("a.pdf", Script::Respond(invoice_json("INV-A", 1.0)))
            .script("b.pdf", Script::Respond(invoice_json("INV-B", 2.0)));
        let mut session = Session::default();
        session
            .process_batch(
                &service,
                "gemini-test",
                &docs(&dir, &["a.pdf", "b.pdf"]),
                Mode::Sequential,
                &ProgressBar::hidden(),
            )
            .await;
        assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_clears_rows() {
        let dir = tempfile::tempdir().unwrap();
        let service = mixed_service();
        let mut session = Session::default();
        session
            .process_batch(&service, "gemini-test", &docs(&dir, &["a.pdf"]), Mode::Concurrent, &ProgressBar::hidden())
            .await;
        assert_eq!(session.rows().len(), 1);

        let outcomes = session
            .process_batch(&service, "gemini-test", &[], Mode::Concurrent, &ProgressBar::hidden())
            .await;
        assert!(outcomes.is_empty());
        assert!(session.rows().is_empty());
        assert_eq!(BatchSummary::from_outcomes(&outcomes), BatchSummary::Empty);
    }

    #[tokio::test]
    async fn test_progress_advances_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let service = mixed_service();
        let mut session = Session::default();
        let progress = ProgressBar::hidden();
        progress.set_length(3);
        session
            .process_batch(&service, "gemini-test", &docs(&dir, &["a.pdf", "b.pdf", "c.pdf"]), Mode::Concurrent, &progress)
            .await;
        assert_eq!(progress.position(), 3);
    }

    #[tokio::test]
    async fn test_unreadable_path_is_reported() {
        let service = mixed_service();
        let mut session = Session::default();
        let dir = tempfile::tempdir().unwrap();
        let documents = vec![Document::from_path(dir.path().join("missing.pdf"))];

        let outcomes = session
            .process_batch(&service, "gemini-test", &documents, Mode::Concurrent, &ProgressBar::hidden())
            .await;
        assert_eq!(outcomes[0].file_name, "missing.pdf");
        assert!(matches!(outcomes[0].result, Err(ExtractError::Read { .. })));
        assert!(session.rows().is_empty());
        assert_eq!(BatchSummary::from_outcomes(&outcomes), BatchSummary::NoneSucceeded);
    }

    #[tokio::test]
    async fn test_document_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, PDF).unwrap();
        let document = Document::from_path(path);
        assert_eq!(document.name, "a.pdf");
        let service = mixed_service();
        let mut session = Session::default();

        session
            .process_batch(&service, "gemini-test", &[document], Mode::Sequential, &ProgressBar::hidden())
            .await;
        assert_eq!(session.rows()[0].invoice_number, "INV-A");
    }

    #[test]
    fn test_validate_order() {
        let mut request = BatchRequest {
            api_key: None,
            model: String::new(),
            files: vec![],
        };
        assert_eq!(request.validate(), Err(InputError::MissingApiKey));

        request.api_key = Some("   ".to_string());
        assert_eq!(request.validate(), Err(InputError::MissingApiKey));

        request.api_key = Some("key".to_string());
        assert_eq!(request.validate(), Err(InputError::MissingFiles));

        request.files.push(PathBuf::from("a.pdf"));
        assert_eq!(request.validate(), Err(InputError::MissingModel));

        request.model = "gemini-1.5-flash-latest".to_string();
        assert_eq!(request.validate(), Ok("key"));
    }

    #[test]
    fn test_summary_messages() {
        assert_eq!(
            BatchSummary::AllSucceeded { total: 2 }.to_string(),
            "All 2 invoices processed successfully!"
        );
        assert_eq!(
            BatchSummary::Partial { succeeded: 1, total: 2 }.to_string(),
            "Successfully processed 1 out of 2 invoices."
        );
    }
}
