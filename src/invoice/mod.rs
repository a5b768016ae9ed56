//! Invoice extraction.
//!
//! An [`InvoiceExtractor`] asks a model for the fields of one document (PDF
//! text or an image URL). [`InvoiceService`] adds the bookkeeping around it:
//! non-invoices are reported, duplicates (same vendor, number and amount)
//! are detected against an [`InvoiceLedger`], and new invoices are saved.
//!
//! Run extraction through a cached backend and re-processing the same
//! document costs no model call.

mod extract;
mod fields;
mod ledger;

use std::sync::Arc;

use tracing::{debug, info};

pub use extract::{
    EXTRACTION_TEMPERATURE, ExtractionMode, Extraction, InvoiceExtractor, RECORD_INVOICE_TOOL,
};
pub use fields::{
    DuplicateKey, Invoice, InvoiceFields, InvoiceSource, InvoiceUpdate, LineItem,
    UNKNOWN_CUSTOMER, UNKNOWN_VENDOR,
};
pub use ledger::{InvoiceLedger, MemoryLedger, SortBy, SortOrder};

use crate::{MimirError, Result};

/// What happened to one document.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// The model says the document is not an invoice. Nothing was saved.
    NotInvoice(InvoiceFields),
    /// An invoice with the same key was already stored.
    Duplicate(Invoice),
    /// A new invoice was stored.
    Saved(Invoice),
}

/// Extract, de-duplicate, save.
#[derive(Clone)]
pub struct InvoiceService {
    extractor: InvoiceExtractor,
    ledger: Arc<dyn InvoiceLedger>,
}

impl InvoiceService {
    pub fn new(extractor: InvoiceExtractor, ledger: Arc<dyn InvoiceLedger>) -> Self {
        Self { extractor, ledger }
    }

    pub fn ledger(&self) -> &Arc<dyn InvoiceLedger> {
        &self.ledger
    }

    /// Process one document.
    ///
    /// Model and ledger failures are returned; a duplicate is an outcome,
    /// not an error.
    pub async fn process(&self, source: &InvoiceSource) -> Result<ExtractionOutcome> {
        let extraction = self.extractor.extract(source).await?;
        let fields = extraction.fields;
        if !fields.is_invoice {
            debug!("document is not an invoice");
            return Ok(ExtractionOutcome::NotInvoice(fields));
        }

        let key = DuplicateKey::from_fields(&fields);
        if let Some(existing) = self.ledger.find_duplicate(&key).await? {
            debug!(key = %key, id = %existing.id, "duplicate invoice");
            return Ok(ExtractionOutcome::Duplicate(existing));
        }

        let invoice = Invoice::from_fields(fields)
            .with_file_hash(source.file_hash())
            .with_token_usage(extraction.usage.map(|u| u.total_tokens));

        match self.ledger.save(invoice).await {
            Ok(saved) => {
                info!(id = %saved.id, key = %key, "invoice saved");
                Ok(ExtractionOutcome::Saved(saved))
            }
            // Saved concurrently between the check and the write.
            Err(MimirError::DuplicateInvoice { .. }) => {
                match self.ledger.find_duplicate(&key).await? {
                    Some(existing) => Ok(ExtractionOutcome::Duplicate(existing)),
                    None => Err(MimirError::DuplicateInvoice {
                        vendor: key.vendor_name,
                        number: key.invoice_number,
                        amount: key.amount,
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }
}
