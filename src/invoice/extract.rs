//! Asking a model for invoice fields.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::fields::{InvoiceFields, InvoiceSource};
use crate::providers::ModelBackend;
use crate::types::{CallParams, ContentPart, Message, ToolChoice, ToolDefinition, Usage};
use crate::{MimirError, Result};

/// Name of the tool the model fills in structured mode.
pub const RECORD_INVOICE_TOOL: &str = "record_invoice";

/// Sampling temperature for extraction calls.
pub const EXTRACTION_TEMPERATURE: f32 = 0.2;

const STRUCTURED_SYSTEM_PROMPT: &str = "\
You receive either raw text extracted from a PDF or the URL of an invoice image.
Call the record_invoice tool exactly once with the fields of the document.
Constraints:
- is_invoice = true if it is indeed an invoice, otherwise false.
- Prefer ISO-8601 for invoice_date and due_date.
- amount is the total invoice amount.
- If something is missing, fill it with an empty string.";

const JSON_SYSTEM_PROMPT: &str = r#"
You receive either raw text extracted from a PDF or the URL of an invoice image.
Return strictly valid JSON only (no extra text) and use this format:
{
  "isInvoice": boolean,
  "vendor_name": string,
  "customer_name": string,
  "invoice_number": string,
  "invoice_date": string,  // Prefer ISO-8601
  "due_date": string,  // Prefer ISO-8601
  "amount": string,  // total invoice amount
  "line_items": [
    {
      "description": string,
      "quantity": number,
      "unit_price": string,
      "line_total": string
    }
  ]
}
Constraints:
- "isInvoice" = true if it is indeed an invoice, otherwise false.
- If something is missing, fill with placeholders or empty strings.
- Return only raw JSON, no extra text.
- Please do NOT wrap your JSON in ``` or any code fences. Return raw JSON only.
"#;

/// How the model is asked to return fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Forced call of the `record_invoice` tool; arguments are the fields.
    #[default]
    StructuredTool,
    /// Free text that must parse as JSON.
    JsonText,
}

/// Fields plus what it cost to get them.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub fields: InvoiceFields,
    pub usage: Option<Usage>,
}

/// Runs extraction calls against a backend, typically a cached one.
#[derive(Clone)]
pub struct InvoiceExtractor {
    backend: Arc<dyn ModelBackend>,
    mode: ExtractionMode,
}

impl InvoiceExtractor {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            mode: ExtractionMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// The call parameters for one document.
    pub fn params(&self, source: &InvoiceSource) -> CallParams {
        let message = match source {
            InvoiceSource::Pdf { text } => {
                Message::user(format!("Here is the PDF text:\n{text}\nPlease parse it."))
            }
            InvoiceSource::Image { url } => Message::user_parts(vec![
                ContentPart::Text {
                    text: format!(
                        "Here is an invoice image URL:\n{url}\nPlease parse the invoice info from the image."
                    ),
                },
                ContentPart::Image { url: url.clone() },
            ]),
        };

        let params = CallParams::default()
            .message(message)
            .temperature(EXTRACTION_TEMPERATURE);
        match self.mode {
            ExtractionMode::StructuredTool => params
                .system(STRUCTURED_SYSTEM_PROMPT)
                .tool(ToolDefinition::new(
                    RECORD_INVOICE_TOOL,
                    "Record the fields extracted from an invoice document.",
                    InvoiceFields::json_schema(),
                ))
                .tool_choice(ToolChoice::Function {
                    name: RECORD_INVOICE_TOOL.to_owned(),
                }),
            ExtractionMode::JsonText => params.system(JSON_SYSTEM_PROMPT.trim()),
        }
    }

    /// Extract fields from one document.
    #[instrument(skip(self, source), fields(mode = ?self.mode, model = %self.backend.model_id()))]
    pub async fn extract(&self, source: &InvoiceSource) -> Result<Extraction> {
        let result = self.backend.generate(&self.params(source)).await?;

        let fields = match self.mode {
            ExtractionMode::StructuredTool => {
                let call = result
                    .tool_calls
                    .iter()
                    .find(|c| c.name == RECORD_INVOICE_TOOL)
                    .ok_or_else(|| {
                        MimirError::Extraction(format!(
                            "model did not call {RECORD_INVOICE_TOOL}"
                        ))
                    })?;
                call.parse_arguments::<InvoiceFields>().map_err(|e| {
                    MimirError::Extraction(format!("invalid {RECORD_INVOICE_TOOL} arguments: {e}"))
                })?
            }
            ExtractionMode::JsonText => parse_json_reply(&result.text)?,
        };

        debug!(is_invoice = fields.is_invoice, "invoice fields extracted");
        Ok(Extraction {
            fields,
            usage: result.usage,
        })
    }
}

/// Parse a free-text reply, tolerating code fences and surrounding prose.
pub(crate) fn parse_json_reply(text: &str) -> Result<InvoiceFields> {
    let body = strip_code_fences(text);
    if let Ok(fields) = serde_json::from_str(body) {
        return Ok(fields);
    }

    let object = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => {
            return Err(MimirError::Extraction(
                "reply contains no JSON object".into(),
            ));
        }
    };
    serde_json::from_str(object)
        .map_err(|e| MimirError::Extraction(format!("reply is not valid JSON: {e}")))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) up to the first newline.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
