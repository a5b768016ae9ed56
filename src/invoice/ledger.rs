//! Invoice persistence.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::fields::{DuplicateKey, Invoice, InvoiceUpdate};
use crate::{MimirError, Result};

/// Field invoices are listed by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    #[default]
    CreatedAt,
    InvoiceDate,
    VendorName,
    Amount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Where invoices live.
///
/// `save` and `update` must refuse to leave two invoices with the same
/// [`DuplicateKey`], with [`MimirError::DuplicateInvoice`].
#[async_trait]
pub trait InvoiceLedger: Send + Sync {
    /// A stored invoice with the same key, if any.
    async fn find_duplicate(&self, key: &DuplicateKey) -> Result<Option<Invoice>>;

    async fn save(&self, invoice: Invoice) -> Result<Invoice>;

    async fn get(&self, id: Uuid) -> Result<Option<Invoice>>;

    async fn list(&self, sort: SortBy, order: SortOrder) -> Result<Vec<Invoice>>;

    /// Apply a partial edit; [`MimirError::InvoiceNotFound`] if `id` is unknown.
    /// Nothing changes when the edit would collide with another invoice.
    async fn update(&self, id: Uuid, update: InvoiceUpdate) -> Result<Invoice>;

    /// Remove an invoice; [`MimirError::InvoiceNotFound`] if `id` is unknown.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// In-process [`InvoiceLedger`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    invoices: RwLock<Vec<Invoice>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceLedger for MemoryLedger {
    async fn find_duplicate(&self, key: &DuplicateKey) -> Result<Option<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.iter().find(|i| i.duplicate_key() == *key).cloned())
    }

    async fn save(&self, invoice: Invoice) -> Result<Invoice> {
        let mut invoices = self.invoices.write().await;
        let key = invoice.duplicate_key();
        if invoices.iter().any(|i| i.duplicate_key() == key) {
            return Err(duplicate(key));
        }
        invoices.push(invoice.clone());
        Ok(invoice)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.iter().find(|i| i.id == id).cloned())
    }

    async fn list(&self, sort: SortBy, order: SortOrder) -> Result<Vec<Invoice>> {
        let mut invoices = self.invoices.read().await.clone();
        invoices.sort_by(|a, b| {
            let ordering = compare(a, b, sort);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        Ok(invoices)
    }

    async fn update(&self, id: Uuid, update: InvoiceUpdate) -> Result<Invoice> {
        let mut invoices = self.invoices.write().await;
        let index = invoices
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| MimirError::InvoiceNotFound(id.to_string()))?;

        let mut edited = invoices[index].clone();
        update.apply(&mut edited);
        let key = edited.duplicate_key();
        if invoices
            .iter()
            .any(|i| i.id != id && i.duplicate_key() == key)
        {
            return Err(duplicate(key));
        }
        invoices[index] = edited.clone();
        Ok(edited)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        let before = invoices.len();
        invoices.retain(|i| i.id != id);
        if invoices.len() == before {
            return Err(MimirError::InvoiceNotFound(id.to_string()));
        }
        Ok(())
    }
}

fn duplicate(key: DuplicateKey) -> MimirError {
    MimirError::DuplicateInvoice {
        vendor: key.vendor_name,
        number: key.invoice_number,
        amount: key.amount,
    }
}

fn compare(a: &Invoice, b: &Invoice, sort: SortBy) -> Ordering {
    match sort {
        SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
        SortBy::InvoiceDate => a.invoice_date.cmp(&b.invoice_date),
        SortBy::VendorName => a.vendor_name.cmp(&b.vendor_name),
        SortBy::Amount => match (amount_value(&a.amount), amount_value(&b.amount)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => a.amount.cmp(&b.amount),
        },
    }
}

/// Numeric value of an amount such as `"$1,250.00"`.
fn amount_value(amount: &str) -> Option<f64> {
    let digits: String = amount
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::InvoiceFields;

    fn invoice(vendor: &str, number: &str, amount: &str) -> Invoice {
        Invoice::from_fields(InvoiceFields {
            is_invoice: true,
            vendor_name: vendor.into(),
            invoice_number: number.into(),
            amount: amount.into(),
            ..InvoiceFields::default()
        })
    }

    #[tokio::test]
    async fn save_rejects_duplicates() {
        let ledger = MemoryLedger::new();
        ledger.save(invoice("Acme", "1", "10")).await.unwrap();
        let err = ledger.save(invoice("Acme", "1", "10")).await.unwrap_err();
        assert!(matches!(err, MimirError::DuplicateInvoice { .. }));

        // Any differing component makes it a different invoice.
        ledger.save(invoice("Acme", "2", "10")).await.unwrap();
        ledger.save(invoice("Acme", "1", "11")).await.unwrap();
    }

    #[tokio::test]
    async fn find_duplicate_uses_placeholders() {
        let ledger = MemoryLedger::new();
        ledger.save(invoice("", "", "")).await.unwrap();
        let found = ledger
            .find_duplicate(&DuplicateKey::new("", "", ""))
            .await
            .unwrap();
        assert!(found.is_some());
        assert!(
            ledger
                .find_duplicate(&DuplicateKey::new("Unknown vendor", "", "0"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn list_sorts_by_amount_numerically() {
        let ledger = MemoryLedger::new();
        ledger.save(invoice("A", "1", "$1,200.00")).await.unwrap();
        ledger.save(invoice("B", "2", "99.5")).await.unwrap();
        ledger.save(invoice("C", "3", "300")).await.unwrap();

        let asc: Vec<_> = ledger
            .list(SortBy::Amount, SortOrder::Asc)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.vendor_name)
            .collect();
        assert_eq!(asc, vec!["B", "C", "A"]);

        let by_vendor_desc: Vec<_> = ledger
            .list(SortBy::VendorName, SortOrder::Desc)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.vendor_name)
            .collect();
        assert_eq!(by_vendor_desc, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn update_get_delete() {
        let ledger = MemoryLedger::new();
        let saved = ledger.save(invoice("Acme", "1", "10")).await.unwrap();

        let updated = ledger
            .update(
                saved.id,
                InvoiceUpdate {
                    due_date: Some("2024-07-01".into()),
                    ..InvoiceUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.due_date, "2024-07-01");
        assert_eq!(ledger.get(saved.id).await.unwrap(), Some(updated));

        ledger.delete(saved.id).await.unwrap();
        assert!(ledger.get(saved.id).await.unwrap().is_none());
        assert!(matches!(
            ledger.delete(saved.id).await,
            Err(MimirError::InvoiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_cannot_create_a_duplicate() {
        let ledger = MemoryLedger::new();
        ledger.save(invoice("Acme", "1", "10")).await.unwrap();
        let second = ledger.save(invoice("Acme", "2", "10")).await.unwrap();

        let err = ledger
            .update(
                second.id,
                InvoiceUpdate {
                    invoice_number: Some("1".into()),
                    ..InvoiceUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MimirError::DuplicateInvoice { .. }));
        assert_eq!(ledger.get(second.id).await.unwrap(), Some(second.clone()));

        // Re-saving its own key is not a collision.
        let same = ledger
            .update(
                second.id,
                InvoiceUpdate {
                    amount: Some("10".into()),
                    ..InvoiceUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(same.invoice_number, "2");
    }
}
