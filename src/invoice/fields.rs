//! Invoice data types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Placeholder vendor for invoices without one.
pub const UNKNOWN_VENDOR: &str = "Unknown vendor";
/// Placeholder customer for invoices without one.
pub const UNKNOWN_CUSTOMER: &str = "Unknown customer";

/// What the model is asked to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceSource {
    /// Text already extracted from a PDF.
    Pdf { text: String },
    /// An image of the invoice, by URL.
    Image { url: String },
}

impl InvoiceSource {
    pub fn pdf(text: impl Into<String>) -> Self {
        InvoiceSource::Pdf { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        InvoiceSource::Image { url: url.into() }
    }

    /// Hex SHA-256 of the source content.
    pub fn file_hash(&self) -> String {
        let bytes = match self {
            InvoiceSource::Pdf { text } => text.as_bytes(),
            InvoiceSource::Image { url } => url.as_bytes(),
        };
        hex::encode(Sha256::digest(bytes))
    }
}

/// Fields extracted from a document.
///
/// Accepts snake_case and camelCase keys. Missing or null strings become
/// empty, and numbers given where text is expected are kept as their text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFields {
    #[serde(default, alias = "isInvoice")]
    pub is_invoice: bool,
    #[serde(default, alias = "vendorName", deserialize_with = "lenient_string")]
    pub vendor_name: String,
    #[serde(default, alias = "customerName", deserialize_with = "lenient_string")]
    pub customer_name: String,
    #[serde(default, alias = "invoiceNumber", deserialize_with = "lenient_string")]
    pub invoice_number: String,
    #[serde(default, alias = "invoiceDate", deserialize_with = "lenient_string")]
    pub invoice_date: String,
    #[serde(default, alias = "dueDate", deserialize_with = "lenient_string")]
    pub due_date: String,
    /// Total amount as written on the invoice.
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount: String,
    #[serde(default, alias = "lineItems", deserialize_with = "lenient_items")]
    pub line_items: Vec<LineItem>,
}

impl InvoiceFields {
    /// JSON schema of the arguments the extraction tool asks for.
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "is_invoice": {
                    "type": "boolean",
                    "description": "true if the document is indeed an invoice, otherwise false"
                },
                "vendor_name": {"type": "string"},
                "customer_name": {"type": "string"},
                "invoice_number": {"type": "string"},
                "invoice_date": {"type": "string", "description": "Prefer ISO-8601"},
                "due_date": {"type": "string", "description": "Prefer ISO-8601"},
                "amount": {"type": "string", "description": "Total invoice amount"},
                "line_items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "description": {"type": "string"},
                            "quantity": {"type": "number"},
                            "unit_price": {"type": "string"},
                            "line_total": {"type": "string"}
                        },
                        "required": ["description", "quantity", "unit_price", "line_total"]
                    }
                }
            },
            "required": [
                "is_invoice", "vendor_name", "customer_name", "invoice_number",
                "invoice_date", "due_date", "amount", "line_items"
            ]
        })
    }
}

/// One row of an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub quantity: f64,
    #[serde(default, alias = "unitPrice", deserialize_with = "lenient_string")]
    pub unit_price: String,
    #[serde(default, alias = "lineTotal", deserialize_with = "lenient_string")]
    pub line_total: String,
}

/// The identity two invoices must share to be duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DuplicateKey {
    pub vendor_name: String,
    pub invoice_number: String,
    pub amount: String,
}

impl DuplicateKey {
    /// Build a key, substituting `"Unknown vendor"` and `"0"` for a missing
    /// vendor or amount.
    pub fn new(vendor_name: &str, invoice_number: &str, amount: &str) -> Self {
        Self {
            vendor_name: or_placeholder(vendor_name, UNKNOWN_VENDOR),
            invoice_number: invoice_number.to_owned(),
            amount: or_placeholder(amount, "0"),
        }
    }

    pub fn from_fields(fields: &InvoiceFields) -> Self {
        Self::new(&fields.vendor_name, &fields.invoice_number, &fields.amount)
    }
}

impl fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} ({})",
            self.vendor_name, self.invoice_number, self.amount
        )
    }
}

/// A stored invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub vendor_name: String,
    pub customer_name: String,
    pub invoice_number: String,
    pub invoice_date: String,
    pub due_date: String,
    pub amount: String,
    pub line_items: Vec<LineItem>,
    /// SHA-256 of the document the fields were extracted from.
    pub file_hash: Option<String>,
    /// Tokens spent on extraction.
    pub token_usage: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// A new record from extracted fields, with placeholder vendor and
    /// customer names filled in.
    pub fn from_fields(fields: InvoiceFields) -> Self {
        Self {
            id: Uuid::new_v4(),
            vendor_name: or_placeholder(&fields.vendor_name, UNKNOWN_VENDOR),
            customer_name: or_placeholder(&fields.customer_name, UNKNOWN_CUSTOMER),
            invoice_number: fields.invoice_number,
            invoice_date: fields.invoice_date,
            due_date: fields.due_date,
            amount: fields.amount,
            line_items: fields.line_items,
            file_hash: None,
            token_usage: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_file_hash(mut self, hash: impl Into<String>) -> Self {
        self.file_hash = Some(hash.into());
        self
    }

    pub fn with_token_usage(mut self, tokens: Option<u32>) -> Self {
        self.token_usage = tokens;
        self
    }

    pub fn duplicate_key(&self) -> DuplicateKey {
        DuplicateKey::new(&self.vendor_name, &self.invoice_number, &self.amount)
    }
}

/// A partial edit of a stored invoice. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceUpdate {
    #[serde(alias = "vendorName")]
    pub vendor_name: Option<String>,
    #[serde(alias = "customerName")]
    pub customer_name: Option<String>,
    #[serde(alias = "invoiceNumber")]
    pub invoice_number: Option<String>,
    #[serde(alias = "invoiceDate")]
    pub invoice_date: Option<String>,
    #[serde(alias = "dueDate")]
    pub due_date: Option<String>,
    pub amount: Option<String>,
    #[serde(alias = "lineItems")]
    pub line_items: Option<Vec<LineItem>>,
}

impl InvoiceUpdate {
    pub fn apply(self, invoice: &mut Invoice) {
        if let Some(v) = self.vendor_name {
            invoice.vendor_name = v;
        }
        if let Some(v) = self.customer_name {
            invoice.customer_name = v;
        }
        if let Some(v) = self.invoice_number {
            invoice.invoice_number = v;
        }
        if let Some(v) = self.invoice_date {
            invoice.invoice_date = v;
        }
        if let Some(v) = self.due_date {
            invoice.due_date = v;
        }
        if let Some(v) = self.amount {
            invoice.amount = v;
        }
        if let Some(v) = self.line_items {
            invoice.line_items = v;
        }
    }
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    if value.trim().is_empty() {
        placeholder.to_owned()
    } else {
        value.to_owned()
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_items<'de, D>(deserializer: D) -> Result<Vec<LineItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<LineItem>>::deserialize(deserializer)?.unwrap_or_default())
}
