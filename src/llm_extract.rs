// src/llm_extract.rs

use crate::error::ExtractError;
use crate::gemini::RemoteService;
use crate::invoice::{self, Invoice};
use crate::pdf_probe::{self, PDF_MIME};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// The instruction sent alongside every uploaded invoice.
pub const EXTRACTION_PROMPT: &str = "Extract all relevant and clear information from the invoice, adhering to Indian standards \
for dates (DD/MM/YYYY or DD-MM-YYYY) and codes (like GSTIN, HSN/SAC). \
Accurately identify the total amount payable. Classify the nature of expense and suggest an \
applicable ledger type (e.g., 'Office Supplies', 'Professional Fees', 'Software Subscription'). \
Determine TDS applicability (e.g., 'Yes - Section 194J', 'No', 'Uncertain'). \
Determine reverse charge GST (RCM) applicability (e.g., 'Yes', 'No', 'Uncertain'). \
Handle missing data appropriately by setting fields to null or an empty string where \
Optional, and raise an issue if critical data is missing for required fields. \
Do not make assumptions or perform calculations beyond what's explicitly stated in the invoice text. \
If a value is clearly zero, represent it as 0.0 for floats. For dates, prefer DD/MM/YYYY.";

/// Extract one invoice: stage the bytes locally, upload them, ask the model
/// for schema-constrained JSON and parse it.
///
/// The local copy is removed on every path out of this function and the
/// remote copy is deleted once uploaded; failing to delete it only warns.
pub async fn extract_invoice(
    service: &dyn RemoteService,
    model: &str,
    contents: &[u8],
    file_name: &str,
) -> Result<Invoice, ExtractError> {
    pdf_probe::check_signature(contents)?;
    let pages = pdf_probe::page_count(contents);
    debug!(bytes = contents.len(), pages = ?pages, "Document accepted");

    let staged = stage(contents, file_name)?;
    let remote = service.upload(staged.path(), file_name, PDF_MIME).await?;

    let result = request_invoice(service, model, &remote).await;

    if let Err(e) = service.delete(&remote).await {
        warn!(
            remote = %remote.name,
            error = %e,
            "Could not delete file from Gemini File API; manual cleanup may be required"
        );
    }

    let staged_path = staged.path().to_path_buf();
    if let Err(e) = staged.close() {
        warn!(path = %staged_path.display(), error = %e, "Could not remove temporary file");
    }

    result
}

async fn request_invoice(
    service: &dyn RemoteService,
    model: &str,
    remote: &crate::gemini::RemoteFile,
) -> Result<Invoice, ExtractError> {
    let schema = invoice::response_schema();
    let text = service
        .generate_json(model, EXTRACTION_PROMPT, remote, &schema)
        .await?;
    let invoice = parse_invoice(&text)?;

    let (filled, total) = invoice.coverage();
    info!(
        filled,
        total,
        invoice_no = %invoice.invoice_number,
        seller = %invoice.seller_name,
        total_gross_worth = invoice.total_gross_worth,
        line_items = invoice.line_items.len(),
        "Extraction result"
    );
    Ok(invoice)
}

/// Write the document to a temporary file named after its extension.
fn stage(contents: &[u8], file_name: &str) -> Result<NamedTempFile, ExtractError> {
    use std::io::Write;

    let suffix = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    let mut staged = tempfile::Builder::new()
        .prefix("invoice-")
        .suffix(&suffix)
        .tempfile()
        .map_err(ExtractError::Staging)?;
    staged.write_all(contents).map_err(ExtractError::Staging)?;
    staged.flush().map_err(ExtractError::Staging)?;
    debug!(path = %staged.path().display(), "Staged temporary file");
    Ok(staged)
}

/// Parse the model's answer into an [`Invoice`], tolerating markdown fences
/// or chatter around the JSON object.
pub fn parse_invoice(text: &str) -> Result<Invoice, ExtractError> {
    let json_str = extract_json_object(text.trim())?;
    Ok(serde_json::from_str(json_str)?)
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text.
fn extract_json_object(s: &str) -> Result<&str, ExtractError> {
    let start = s
        .find('{')
        .ok_or_else(|| ExtractError::MalformedJson("no '{' found".to_string()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| ExtractError::MalformedJson("no '}' found".to_string()))?;
    if end <= start {
        return Err(ExtractError::MalformedJson("unbalanced braces".to_string()));
    }
    Ok(&s[start..=end])
}
