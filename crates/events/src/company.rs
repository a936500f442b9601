use localbill_core::CompanyId;

use crate::EventEnvelope;

/// Helper trait for company-scoped messages.
///
/// Marks types that carry an owning company, so subscription loops can route
/// or filter messages — e.g. deliver a billing notification only to the
/// owning company's session while administrator sessions see everything.
pub trait CompanyScoped {
    fn company_id(&self) -> CompanyId;
}

impl<E> CompanyScoped for EventEnvelope<E> {
    fn company_id(&self) -> CompanyId {
        self.company_id()
    }
}
