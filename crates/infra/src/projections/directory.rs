//! Request directory projection.
//!
//! Maintains the current view of every recharge request: a key-value lookup
//! by request id with a secondary query by status. This is the read-side
//! companion of the event streams — the "load the record" and
//! "query-by-status" surface that clients and the admin console work from.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use localbill_billing::{
    AdPlatform, BillingStatus, RechargeEvent, RechargeRequestId, TaxFigures,
};
use localbill_core::{AggregateId, CompanyId};
use localbill_events::EventEnvelope;

use crate::REQUEST_AGGREGATE_TYPE;
use crate::read_model::CompanyStore;

/// Read model: the current state of one recharge request.
///
/// This is also the payload shipped with notifications, so it is fully
/// serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub request_id: RechargeRequestId,
    pub company_id: CompanyId,
    pub platform: AdPlatform,
    pub requested_amount: f64,
    pub figures: Option<TaxFigures>,
    pub status: BillingStatus,
    pub invoice_number: Option<String>,
    pub invoice_document_ref: Option<String>,
    pub payment_proof_ref: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub calculated_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub invoiced_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub recharge_executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    company_id: CompanyId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum DirectoryProjectionError {
    #[error("failed to deserialize recharge event: {0}")]
    Deserialize(String),

    #[error("company isolation violation: {0}")]
    CompanyIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Directory of current request snapshots, keyed by request id per company.
///
/// Rebuildable from recharge events. Company-isolated.
#[derive(Debug)]
pub struct RequestDirectoryProjection<S>
where
    S: CompanyStore<RechargeRequestId, RequestSnapshot>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> RequestDirectoryProjection<S>
where
    S: CompanyStore<RechargeRequestId, RequestSnapshot>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn get_cursor(&self, company_id: CompanyId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    company_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, company_id: CompanyId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    company_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }

    fn clear_cursors(&self, company_id: CompanyId) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.company_id != company_id);
        }
    }

    /// Current snapshot of one request.
    pub fn get(
        &self,
        company_id: CompanyId,
        request_id: &RechargeRequestId,
    ) -> Option<RequestSnapshot> {
        self.store.get(company_id, request_id)
    }

    /// All requests for a company.
    pub fn list(&self, company_id: CompanyId) -> Vec<RequestSnapshot> {
        self.store.list(company_id)
    }

    /// Requests for a company currently sitting in `status`.
    pub fn by_status(&self, company_id: CompanyId, status: BillingStatus) -> Vec<RequestSnapshot> {
        self.store
            .list(company_id)
            .into_iter()
            .filter(|s| s.status == status)
            .collect()
    }

    /// Apply one stored-event envelope to the directory.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), DirectoryProjectionError> {
        if envelope.aggregate_type() != REQUEST_AGGREGATE_TYPE {
            return Ok(());
        }

        let company_id = envelope.company_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.get_cursor(company_id, aggregate_id);

        if seq == 0 {
            return Err(DirectoryProjectionError::NonMonotonicSequence { last, found: seq });
        }

        if seq <= last {
            // Already applied (at-least-once delivery); idempotent skip.
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            return Err(DirectoryProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: RechargeEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| DirectoryProjectionError::Deserialize(e.to_string()))?;

        if ev.company_id() != company_id {
            return Err(DirectoryProjectionError::CompanyIsolation(
                "event company_id does not match envelope company_id".to_string(),
            ));
        }
        if ev.request_id().0 != aggregate_id {
            return Err(DirectoryProjectionError::CompanyIsolation(
                "event request_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            RechargeEvent::RequestOpened(e) => {
                let snapshot = RequestSnapshot {
                    request_id: e.request_id,
                    company_id: e.company_id,
                    platform: e.platform,
                    requested_amount: e.amount,
                    figures: None,
                    status: BillingStatus::RequestCreated,
                    invoice_number: None,
                    invoice_document_ref: None,
                    payment_proof_ref: None,
                    error_message: None,
                    created_at: e.occurred_at,
                    calculated_at: None,
                    approved_at: None,
                    invoiced_at: None,
                    paid_at: None,
                    recharge_executed_at: None,
                    completed_at: None,
                };
                self.store.upsert(company_id, e.request_id, snapshot);
            }
            RechargeEvent::CalculationCommitted(e) => {
                if let Some(mut snap) = self.store.get(company_id, &e.request_id) {
                    snap.figures = Some(e.figures);
                    if snap.status != BillingStatus::Calculated {
                        snap.calculated_at = Some(e.occurred_at);
                    }
                    snap.status = BillingStatus::Calculated;
                    self.store.upsert(company_id, e.request_id, snap);
                }
            }
            RechargeEvent::CalculationApproved(e) => {
                if let Some(mut snap) = self.store.get(company_id, &e.request_id) {
                    snap.status = BillingStatus::ApprovedByClient;
                    snap.approved_at = Some(e.occurred_at);
                    self.store.upsert(company_id, e.request_id, snap);
                }
            }
            RechargeEvent::InvoiceEmitted(e) => {
                if let Some(mut snap) = self.store.get(company_id, &e.request_id) {
                    snap.invoice_number = Some(e.invoice_number);
                    snap.invoice_document_ref = e.document_ref;
                    snap.status = BillingStatus::Invoiced;
                    snap.invoiced_at = Some(e.occurred_at);
                    self.store.upsert(company_id, e.request_id, snap);
                }
            }
            RechargeEvent::PaymentRegistered(e) => {
                if let Some(mut snap) = self.store.get(company_id, &e.request_id) {
                    snap.payment_proof_ref = e.proof_ref;
                    snap.status = BillingStatus::Paid;
                    snap.paid_at = Some(e.occurred_at);
                    self.store.upsert(company_id, e.request_id, snap);
                }
            }
            RechargeEvent::RechargeExecuted(e) => {
                if let Some(mut snap) = self.store.get(company_id, &e.request_id) {
                    snap.status = BillingStatus::RechargeExecuted;
                    snap.recharge_executed_at = Some(e.occurred_at);
                    self.store.upsert(company_id, e.request_id, snap);
                }
            }
            RechargeEvent::RequestCompleted(e) => {
                if let Some(mut snap) = self.store.get(company_id, &e.request_id) {
                    snap.status = BillingStatus::Completed;
                    snap.completed_at = Some(e.occurred_at);
                    self.store.upsert(company_id, e.request_id, snap);
                }
            }
            RechargeEvent::RequestFailed(e) => {
                if let Some(mut snap) = self.store.get(company_id, &e.request_id) {
                    snap.status = BillingStatus::Error;
                    snap.error_message = Some(e.message);
                    self.store.upsert(company_id, e.request_id, snap);
                }
            }
        }

        self.update_cursor(company_id, aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), DirectoryProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut companies = envs.iter().map(|e| e.company_id()).collect::<Vec<_>>();
            companies.sort_by_key(|c| *c.as_uuid().as_bytes());
            companies.dedup();
            for c in companies {
                self.store.clear_company(c);
                self.clear_cursors(c);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.company_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryCompanyStore;
    use localbill_billing::{CalculationCommitted, InvoiceEmitted, RequestOpened, TaxFigures};
    use localbill_core::AggregateId;

    fn make_envelope(
        company_id: CompanyId,
        aggregate_id: AggregateId,
        seq: u64,
        event: RechargeEvent,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            uuid::Uuid::now_v7(),
            company_id,
            aggregate_id,
            REQUEST_AGGREGATE_TYPE.to_string(),
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn projection() -> RequestDirectoryProjection<
        InMemoryCompanyStore<RechargeRequestId, RequestSnapshot>,
    > {
        RequestDirectoryProjection::new(InMemoryCompanyStore::new())
    }

    fn opened_event(company_id: CompanyId, request_id: RechargeRequestId) -> RechargeEvent {
        RechargeEvent::RequestOpened(RequestOpened {
            company_id,
            request_id,
            platform: AdPlatform::Meta,
            amount: 5_000.0,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn tracks_opened_request() {
        let proj = projection();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            1,
            opened_event(company_id, request_id),
        ))
        .unwrap();

        let snap = proj.get(company_id, &request_id).unwrap();
        assert_eq!(snap.status, BillingStatus::RequestCreated);
        assert_eq!(snap.requested_amount, 5_000.0);
        assert!(snap.figures.is_none());
        assert!(snap.invoice_number.is_none());
    }

    #[test]
    fn status_and_figures_follow_events() {
        let proj = projection();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            1,
            opened_event(company_id, request_id),
        ))
        .unwrap();

        let committed = RechargeEvent::CalculationCommitted(CalculationCommitted {
            company_id,
            request_id,
            figures: TaxFigures {
                base: 5_500.0,
                commission: 500.0,
                total: 6_325.0,
            },
            occurred_at: Utc::now(),
        });
        proj.apply_envelope(&make_envelope(company_id, request_id.0, 2, committed))
            .unwrap();

        let snap = proj.get(company_id, &request_id).unwrap();
        assert_eq!(snap.status, BillingStatus::Calculated);
        assert!((snap.figures.unwrap().total - 6_325.0).abs() < 1e-9);
        assert!(snap.calculated_at.is_some());
    }

    #[test]
    fn by_status_filters_requests() {
        let proj = projection();
        let company_id = CompanyId::new();

        for _ in 0..3 {
            let request_id = RechargeRequestId::new(AggregateId::new());
            proj.apply_envelope(&make_envelope(
                company_id,
                request_id.0,
                1,
                opened_event(company_id, request_id),
            ))
            .unwrap();
        }

        assert_eq!(
            proj.by_status(company_id, BillingStatus::RequestCreated).len(),
            3
        );
        assert!(proj.by_status(company_id, BillingStatus::Invoiced).is_empty());
    }

    #[test]
    fn duplicate_envelope_is_ignored() {
        let proj = projection();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        let env = make_envelope(
            company_id,
            request_id.0,
            1,
            opened_event(company_id, request_id),
        );
        proj.apply_envelope(&env).unwrap();
        proj.apply_envelope(&env).unwrap();

        assert_eq!(proj.list(company_id).len(), 1);
    }

    #[test]
    fn rebuild_replays_sorted_history() {
        let proj = projection();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        let open = make_envelope(
            company_id,
            request_id.0,
            1,
            opened_event(company_id, request_id),
        );
        let committed = make_envelope(
            company_id,
            request_id.0,
            2,
            RechargeEvent::CalculationCommitted(CalculationCommitted {
                company_id,
                request_id,
                figures: TaxFigures {
                    base: 5_500.0,
                    commission: 500.0,
                    total: 6_325.0,
                },
                occurred_at: Utc::now(),
            }),
        );

        // Deliver out of order; rebuild sorts by stream + sequence.
        proj.rebuild_from_scratch(vec![committed, open]).unwrap();

        let snap = proj.get(company_id, &request_id).unwrap();
        assert_eq!(snap.status, BillingStatus::Calculated);
    }

    #[test]
    fn invoice_fields_recorded() {
        let proj = projection();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            1,
            opened_event(company_id, request_id),
        ))
        .unwrap();

        // Directory updates do not re-check transition guards; the aggregate
        // enforced them before these events were committed.
        let emitted = RechargeEvent::InvoiceEmitted(InvoiceEmitted {
            company_id,
            request_id,
            invoice_number: "LB-202508-000007".to_string(),
            document_ref: Some("doc://invoices/7".to_string()),
            occurred_at: Utc::now(),
        });
        proj.apply_envelope(&make_envelope(company_id, request_id.0, 2, emitted))
            .unwrap();

        let snap = proj.get(company_id, &request_id).unwrap();
        assert_eq!(snap.invoice_number.as_deref(), Some("LB-202508-000007"));
        assert_eq!(snap.invoice_document_ref.as_deref(), Some("doc://invoices/7"));
        assert_eq!(snap.status, BillingStatus::Invoiced);
    }
}
