//! Error types shared across the extractor.

use reqwest::StatusCode;
use thiserror::Error;

/// Why a single document could not be turned into an invoice.
///
/// These never abort a batch: the document is reported and skipped.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The document could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The bytes do not carry a PDF signature.
    #[error("not a PDF (no %PDF- signature found)")]
    NotPdf,

    /// The transient local copy could not be written or read back.
    #[error("failed to stage temporary file: {0}")]
    Staging(#[source] std::io::Error),

    /// Transport-level failure talking to the remote service.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("Gemini API error {status}: {body}")]
    Api { status: StatusCode, body: String },

    /// The resumable upload handshake did not hand back an upload URL.
    #[error("upload start response did not include an upload URL")]
    MissingUploadUrl,

    /// The model answered without any text.
    #[error("empty response from model")]
    EmptyResponse,

    /// The model text did not contain a JSON object.
    #[error("malformed JSON in model response: {0}")]
    MalformedJson(String),

    /// The JSON did not match the invoice record.
    #[error("response does not match the invoice schema: {0}")]
    Schema(#[from] serde_json::Error),
}

/// Required user input that is missing, checked before any remote call.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InputError {
    #[error("Please enter your Gemini API key (--api-key, GEMINI_API_KEY or [gemini].api_key).")]
    MissingApiKey,

    #[error("Please provide at least one PDF file.")]
    MissingFiles,

    #[error("Please specify a Gemini model ID (--model or [gemini].model).")]
    MissingModel,
}

/// Configuration loading and editing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to edit configuration: {0}")]
    Edit(#[from] toml_edit::TomlError),

    #[error("configuration key must look like <section>.<key>, got {0:?}")]
    Key(String),
}

/// Spreadsheet export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
