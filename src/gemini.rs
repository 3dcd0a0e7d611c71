// src/gemini.rs

use crate::error::ExtractError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

/// Handle to a file stored on the remote side.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, `files/<id>`.
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// The three calls the extractor needs from the document-understanding
/// service: upload, schema-constrained generation, delete.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn upload(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, ExtractError>;

    /// Returns the raw text of the model's answer.
    async fn generate_json(
        &self,
        model: &str,
        prompt: &str,
        file: &RemoteFile,
        schema: &Value,
    ) -> Result<String, ExtractError>;

    async fn delete(&self, file: &RemoteFile) -> Result<(), ExtractError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    File { file_data: FileData<'a> },
}

#[derive(Debug, Serialize)]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        if let Some(reason) = &candidate.finish_reason {
            debug!(finish_reason = %reason, "Model finished");
        }
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

/// REST client for the Gemini `v1beta` API.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, reqwest::Error> {
        let http = Client::builder().build()?;
        info!(url = %base_url, "Gemini client initialized");
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

/// Turn a non-success status into an error carrying the response body.
async fn check_status(response: Response) -> Result<Response, ExtractError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ExtractError::Api { status, body })
}

#[async_trait]
impl RemoteService for GeminiClient {
    async fn upload(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, ExtractError> {
        let bytes = tokio::fs::read(path).await.map_err(ExtractError::Staging)?;

        // Resumable protocol: the start request hands back a one-shot upload URL.
        let start = self
            .http
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or(ExtractError::MissingUploadUrl)?
            .to_string();

        let size = bytes.len();
        let response = self
            .http
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let uploaded: UploadResponse = check_status(response).await?.json().await?;

        info!(
            remote = %uploaded.file.name,
            display_name = ?uploaded.file.display_name,
            bytes = size,
            state = ?uploaded.file.state,
            "Uploaded to Gemini File API"
        );
        Ok(uploaded.file)
    }

    async fn generate_json(
        &self,
        model: &str,
        prompt: &str,
        file: &RemoteFile,
        schema: &Value,
    ) -> Result<String, ExtractError> {
        let mime_type = file.mime_type.as_deref().unwrap_or(crate::pdf_probe::PDF_MIME);
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: prompt },
                    Part::File {
                        file_data: FileData {
                            mime_type,
                            file_uri: &file.uri,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            model.trim_start_matches("models/")
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let generated: GenerateResponse = check_status(response).await?.json().await?;
        generated.text().ok_or(ExtractError::EmptyResponse)
    }

    async fn delete(&self, file: &RemoteFile) -> Result<(), ExtractError> {
        let response = self
            .http
            .delete(format!("{}/v1beta/{}", self.base_url, file.name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        check_status(response).await?;
        debug!(remote = %file.name, "Deleted from Gemini File API");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory stand-in for the remote service.

    use super::*;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What the service does for one display name.
    #[derive(Debug, Clone)]
    pub enum Script {
        /// Answer with this text.
        Respond(String),
        FailUpload,
        FailGenerate,
        /// Answer with this text, then refuse to delete.
        RespondKeepFile(String),
    }

    #[derive(Default)]
    pub struct ScriptedService {
        scripts: HashMap<String, Script>,
        pub uploaded: Mutex<Vec<(String, PathBuf)>>,
        pub deleted: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl ScriptedService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(mut self, display_name: &str, script: Script) -> Self {
            self.scripts.insert(display_name.to_string(), script);
            self
        }

        fn lookup(&self, display_name: &str) -> Script {
            self.scripts
                .get(display_name)
                .cloned()
                .unwrap_or(Script::FailGenerate)
        }
    }

    fn server_error() -> ExtractError {
        ExtractError::Api {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "scripted failure".to_string(),
        }
    }

    #[async_trait]
    impl RemoteService for ScriptedService {
        async fn upload(
            &self,
            path: &Path,
            display_name: &str,
            mime_type: &str,
        ) -> Result<RemoteFile, ExtractError> {
            assert!(path.exists(), "staged file must exist during upload");
            self.uploaded
                .lock()
                .unwrap()
                .push((display_name.to_string(), path.to_path_buf()));
            if let Script::FailUpload = self.lookup(display_name) {
                return Err(server_error());
            }
            Ok(RemoteFile {
                name: format!("files/{display_name}"),
                uri: format!("https://example.invalid/files/{display_name}"),
                mime_type: Some(mime_type.to_string()),
                display_name: Some(display_name.to_string()),
                state: Some("ACTIVE".to_string()),
            })
        }

        async fn generate_json(
            &self,
            _model: &str,
            _prompt: &str,
            file: &RemoteFile,
            _schema: &Value,
        ) -> Result<String, ExtractError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let display_name = file.display_name.as_deref().unwrap_or_default();
            match self.lookup(display_name) {
                Script::Respond(text) | Script::RespondKeepFile(text) => Ok(text),
                Script::FailUpload | Script::FailGenerate => Err(server_error()),
            }
        }

        async fn delete(&self, file: &RemoteFile) -> Result<(), ExtractError> {
            let display_name = file.display_name.as_deref().unwrap_or_default();
            if let Script::RespondKeepFile(_) = self.lookup(display_name) {
                return Err(server_error());
            }
            self.deleted.lock().unwrap().push(file.name.clone());
            Ok(())
        }
    }
}
