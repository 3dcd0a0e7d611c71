// src/summary.rs

use crate::invoice::{Invoice, present};
use console::measure_text_width;

/// Shown for optional text fields the model left empty.
pub const PLACEHOLDER: &str = "N/A";

/// Column headers, shared by the terminal table and every export format.
pub const COLUMNS: [&str; 15] = [
    "File Name",
    "Invoice Number",
    "Date",
    "Seller Name",
    "Seller GSTIN",
    "Buyer Name",
    "Buyer GSTIN",
    "Total Gross Worth",
    "CGST",
    "SGST",
    "IGST",
    "Place of Supply",
    "Expense Ledger",
    "TDS",
    "Narration",
];

/// One cell of a display row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Text(&'a str),
    Number(f64),
}

impl Cell<'_> {
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => (*s).to_string(),
            Cell::Number(n) => format!("{n:.2}"),
        }
    }
}

/// A flattened, display-ready invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub file_name: String,
    pub invoice_number: String,
    pub date: String,
    pub seller_name: String,
    pub seller_gstin: String,
    pub buyer_name: String,
    pub buyer_gstin: String,
    pub total_gross_worth: f64,
    pub cgst: f64,
    pub sgst: f64,
    pub igst: f64,
    pub place_of_supply: String,
    pub expense_ledger: String,
    pub tds: String,
    pub narration: String,
}

impl SummaryRow {
    /// Flatten an invoice, substituting defaults for absent optional fields.
    pub fn from_invoice(file_name: &str, invoice: &Invoice) -> Self {
        let text_or_placeholder = |v: &Option<String>| present(v).unwrap_or(PLACEHOLDER).to_string();

        let mut row = SummaryRow {
            file_name: file_name.to_string(),
            invoice_number: invoice.invoice_number.clone(),
            date: invoice.date.clone(),
            seller_name: invoice.seller_name.clone(),
            seller_gstin: invoice.gstin.clone(),
            buyer_name: invoice.buyer_name.clone(),
            buyer_gstin: text_or_placeholder(&invoice.buyer_gstin),
            total_gross_worth: invoice.total_gross_worth,
            cgst: invoice.cgst.unwrap_or(0.0),
            sgst: invoice.sgst.unwrap_or(0.0),
            igst: invoice.igst.unwrap_or(0.0),
            place_of_supply: text_or_placeholder(&invoice.place_of_supply),
            expense_ledger: text_or_placeholder(&invoice.expense_ledger),
            tds: text_or_placeholder(&invoice.tds),
            narration: String::new(),
        };
        row.narration = row.narrate();
        row
    }

    fn narrate(&self) -> String {
        format!(
            "Invoice {} dated {} was issued by {} (GSTIN: {}) to {} (GSTIN: {}), \
             with a total value of ₹{:.2}. \
             Taxes applied - CGST: ₹{:.2}, SGST: ₹{:.2}, IGST: ₹{:.2}. \
             Place of supply: {}. Expense: {}. TDS: {}.",
            self.invoice_number,
            self.date,
            self.seller_name,
            self.seller_gstin,
            self.buyer_name,
            self.buyer_gstin,
            self.total_gross_worth,
            self.cgst,
            self.sgst,
            self.igst,
            self.place_of_supply,
            self.expense_ledger,
            self.tds,
        )
    }

    /// Cells in [`COLUMNS`] order.
    pub fn cells(&self) -> [Cell<'_>; 15] {
        [
            Cell::Text(&self.file_name),
            Cell::Text(&self.invoice_number),
            Cell::Text(&self.date),
            Cell::Text(&self.seller_name),
            Cell::Text(&self.seller_gstin),
            Cell::Text(&self.buyer_name),
            Cell::Text(&self.buyer_gstin),
            Cell::Number(self.total_gross_worth),
            Cell::Number(self.cgst),
            Cell::Number(self.sgst),
            Cell::Number(self.igst),
            Cell::Text(&self.place_of_supply),
            Cell::Text(&self.expense_ledger),
            Cell::Text(&self.tds),
            Cell::Text(&self.narration),
        ]
    }
}

/// Render rows as a plain aligned table, numbers right-aligned.
pub fn render_table(rows: &[SummaryRow]) -> String {
    let cells: Vec<Vec<(String, bool)>> = rows
        .iter()
        .map(|row| {
            row.cells()
                .iter()
                .map(|c| (c.display(), matches!(c, Cell::Number(_))))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = COLUMNS.iter().map(|h| measure_text_width(h)).collect();
    for row in &cells {
        for (i, (text, _)) in row.iter().enumerate() {
            widths[i] = widths[i].max(measure_text_width(text));
        }
    }

    let mut out = String::new();
    let header: Vec<(String, bool)> = COLUMNS.iter().map(|h| (h.to_string(), false)).collect();
    push_line(&mut out, &header, &widths);
    let rule: Vec<(String, bool)> = widths.iter().map(|w| ("-".repeat(*w), false)).collect();
    push_line(&mut out, &rule, &widths);
    for row in &cells {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[(String, bool)], widths: &[usize]) {
    let mut line = String::new();
    for (i, (text, right)) in cells.iter().enumerate() {
        if i > 0 {
            line.push_str(" | ");
        }
        let pad = " ".repeat(widths[i].saturating_sub(measure_text_width(text)));
        if *right {
            line.push_str(&pad);
            line.push_str(text);
        } else {
            line.push_str(text);
            line.push_str(&pad);
        }
    }
    out.push_str(line.trim_end());
    out.push('\n');
}
