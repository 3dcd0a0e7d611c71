// src/invoice.rs

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A single invoice line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub gross_worth: f64,
}

/// All structured data the model is asked to extract from an invoice PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_number: String,
    pub date: String,
    /// Seller GSTIN.
    pub gstin: String,
    pub seller_name: String,
    pub buyer_name: String,
    #[serde(default)]
    pub buyer_gstin: Option<String>,
    pub line_items: Vec<LineItem>,
    pub total_gross_worth: f64,
    #[serde(default)]
    pub cgst: Option<f64>,
    #[serde(default)]
    pub sgst: Option<f64>,
    #[serde(default)]
    pub igst: Option<f64>,
    #[serde(default)]
    pub place_of_supply: Option<String>,
    #[serde(default)]
    pub expense_ledger: Option<String>,
    #[serde(default)]
    pub tds: Option<String>,
}

impl Invoice {
    /// How many optional fields the model filled in, out of all of them.
    pub fn coverage(&self) -> (usize, usize) {
        let total = 7;
        let filled = [
            present(&self.buyer_gstin).is_some(),
            self.cgst.is_some(),
            self.sgst.is_some(),
            self.igst.is_some(),
            present(&self.place_of_supply).is_some(),
            present(&self.expense_ledger).is_some(),
            present(&self.tds).is_some(),
        ]
        .iter()
        .filter(|&&v| v)
        .count();
        (filled, total)
    }
}

/// An optional text field counts as absent when it is missing or blank.
pub fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// The response schema handed to the model, in the OpenAPI subset the
/// Gemini API accepts.
pub fn response_schema() -> Value {
    let text = || json!({ "type": "STRING" });
    let number = || json!({ "type": "NUMBER" });
    let nullable_text = || json!({ "type": "STRING", "nullable": true });
    let nullable_number = || json!({ "type": "NUMBER", "nullable": true });

    json!({
        "type": "OBJECT",
        "properties": {
            "invoice_number": text(),
            "date": text(),
            "gstin": text(),
            "seller_name": text(),
            "buyer_name": text(),
            "buyer_gstin": nullable_text(),
            "line_items": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "description": text(),
                        "quantity": number(),
                        "gross_worth": number(),
                    },
                    "required": ["description", "quantity", "gross_worth"],
                    "propertyOrdering": ["description", "quantity", "gross_worth"],
                },
            },
            "total_gross_worth": number(),
            "cgst": nullable_number(),
            "sgst": nullable_number(),
            "igst": nullable_number(),
            "place_of_supply": nullable_text(),
            "expense_ledger": nullable_text(),
            "tds": nullable_text(),
        },
        "required": [
            "invoice_number",
            "date",
            "gstin",
            "seller_name",
            "buyer_name",
            "line_items",
            "total_gross_worth",
        ],
        "propertyOrdering": [
            "invoice_number",
            "date",
            "gstin",
            "seller_name",
            "buyer_name",
            "buyer_gstin",
            "line_items",
            "total_gross_worth",
            "cgst",
            "sgst",
            "igst",
            "place_of_supply",
            "expense_ledger",
            "tds",
        ],
    })
}
