//! Collaborator seams the billing pipeline depends on.
//!
//! These boundaries stay deliberately thin: the core only reads a flag from
//! the tax registry, stores whatever opaque reference the document archive
//! returns, and takes the next number from the invoice sequence. Real
//! implementations (registry lookups, PDF generation, storage buckets) live
//! outside this workspace.

use std::collections::HashSet;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, Utc};

use localbill_billing::RechargeRequestId;
use localbill_core::CompanyId;

/// Identity/registration collaborator.
///
/// Supplies the "tax registration connected" flag (RUC confirmed) used as a
/// request-creation precondition. Read-only from this side.
pub trait TaxRegistry: Send + Sync {
    fn is_registration_connected(&self, company_id: CompanyId) -> bool;
}

/// In-memory registry for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTaxRegistry {
    connected: RwLock<HashSet<CompanyId>>,
}

impl InMemoryTaxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, company_id: CompanyId) {
        if let Ok(mut connected) = self.connected.write() {
            connected.insert(company_id);
        }
    }

    pub fn disconnect(&self, company_id: CompanyId) {
        if let Ok(mut connected) = self.connected.write() {
            connected.remove(&company_id);
        }
    }
}

impl TaxRegistry for InMemoryTaxRegistry {
    fn is_registration_connected(&self, company_id: CompanyId) -> bool {
        self.connected
            .read()
            .map(|connected| connected.contains(&company_id))
            .unwrap_or(false)
    }
}

/// Document collaborator: invoice artifacts and payment evidence.
///
/// Both methods may return an opaque reference (URL, object key, ...); the
/// pipeline stores it verbatim on the record and never inspects it. `None`
/// means no document was produced, which is always acceptable.
pub trait DocumentArchive: Send + Sync {
    fn invoice_document(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
        invoice_number: &str,
    ) -> Option<String>;

    fn payment_proof(&self, company_id: CompanyId, request_id: RechargeRequestId)
    -> Option<String>;
}

/// Archive that produces no documents.
#[derive(Debug, Default)]
pub struct NullDocumentArchive;

impl DocumentArchive for NullDocumentArchive {
    fn invoice_document(
        &self,
        _company_id: CompanyId,
        _request_id: RechargeRequestId,
        _invoice_number: &str,
    ) -> Option<String> {
        None
    }

    fn payment_proof(
        &self,
        _company_id: CompanyId,
        _request_id: RechargeRequestId,
    ) -> Option<String> {
        None
    }
}

/// Invoice number source: `LB-{yyyymm}-{counter}`.
///
/// The counter is process-wide and strictly increasing, so numbers are
/// globally unique and traceable in emission order. A rejected emission
/// burns a number; gaps are acceptable, reuse is not.
#[derive(Debug, Default)]
pub struct InvoiceSequence {
    counter: AtomicU64,
}

impl InvoiceSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously issued counter value.
    pub fn starting_at(counter: u64) -> Self {
        Self {
            counter: AtomicU64::new(counter),
        }
    }

    pub fn next(&self, now: DateTime<Utc>) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("LB-{:04}{:02}-{:06}", now.year(), now.month(), n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use localbill_core::AggregateId;

    #[test]
    fn registry_flag_round_trip() {
        let registry = InMemoryTaxRegistry::new();
        let company_id = CompanyId::new();
        assert!(!registry.is_registration_connected(company_id));

        registry.connect(company_id);
        assert!(registry.is_registration_connected(company_id));

        registry.disconnect(company_id);
        assert!(!registry.is_registration_connected(company_id));
    }

    #[test]
    fn invoice_numbers_are_unique_and_ordered() {
        let seq = InvoiceSequence::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 9, 30, 0).unwrap();

        let a = seq.next(now);
        let b = seq.next(now);
        assert_eq!(a, "LB-202608-000001");
        assert_eq!(b, "LB-202608-000002");
        assert!(a < b);
    }

    #[test]
    fn sequence_resumes_from_counter() {
        let seq = InvoiceSequence::starting_at(41);
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(seq.next(now), "LB-202601-000042");
    }

    #[test]
    fn null_archive_produces_nothing() {
        let archive = NullDocumentArchive;
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());
        assert!(archive.invoice_document(company_id, request_id, "LB-1").is_none());
        assert!(archive.payment_proof(company_id, request_id).is_none());
    }
}
