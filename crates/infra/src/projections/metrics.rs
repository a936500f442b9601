//! Administrator metrics projection.
//!
//! A derived read model over all companies' recharge events: how many
//! requests sit at each stage of the pipeline, how many completed per month,
//! and the cumulative revenue (sum of calculated totals over completed
//! requests). Never authoritative on its own — the service applies committed
//! events here in the same call that appends them, and the whole model can
//! be rebuilt from the event history.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::Datelike;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use localbill_billing::{BillingStatus, RechargeEvent};
use localbill_core::{AggregateId, CompanyId};
use localbill_events::{Event, EventEnvelope};

use crate::REQUEST_AGGREGATE_TYPE;

/// Pipeline counters plus completion/revenue aggregates.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AdminMetrics {
    /// Awaiting an administrator calculation (`request_created`).
    pub pending_requests: u64,
    /// Awaiting client approval (`calculated`).
    pub pending_approvals: u64,
    /// Approved, awaiting invoice emission (`approved_by_client`).
    pub pending_invoices: u64,
    /// Invoiced, awaiting payment registration (`invoiced`).
    pub pending_payments: u64,
    /// Paid or recharged, awaiting completion (`paid` | `recharge_executed`).
    pub pending_recharges: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    /// Sum of calculated totals over completed requests.
    pub total_revenue: f64,
    /// Completions per UTC month, keyed `YYYY-MM`.
    pub monthly_completions: BTreeMap<String, u64>,
}

impl AdminMetrics {
    /// Count of requests in any non-terminal status.
    pub fn in_flight_total(&self) -> u64 {
        self.pending_requests
            + self.pending_approvals
            + self.pending_invoices
            + self.pending_payments
            + self.pending_recharges
    }

    pub fn completions_in(&self, year: i32, month: u32) -> u64 {
        self.monthly_completions
            .get(&month_key(year, month))
            .copied()
            .unwrap_or(0)
    }
}

fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

fn pending_bucket(metrics: &mut AdminMetrics, status: BillingStatus) -> Option<&mut u64> {
    match status {
        BillingStatus::RequestCreated => Some(&mut metrics.pending_requests),
        BillingStatus::Calculated => Some(&mut metrics.pending_approvals),
        BillingStatus::ApprovedByClient => Some(&mut metrics.pending_invoices),
        BillingStatus::Invoiced => Some(&mut metrics.pending_payments),
        BillingStatus::Paid | BillingStatus::RechargeExecuted => {
            Some(&mut metrics.pending_recharges)
        }
        BillingStatus::Completed | BillingStatus::Error => None,
    }
}

fn status_after(event: &RechargeEvent) -> BillingStatus {
    match event {
        RechargeEvent::RequestOpened(_) => BillingStatus::RequestCreated,
        RechargeEvent::CalculationCommitted(_) => BillingStatus::Calculated,
        RechargeEvent::CalculationApproved(_) => BillingStatus::ApprovedByClient,
        RechargeEvent::InvoiceEmitted(_) => BillingStatus::Invoiced,
        RechargeEvent::PaymentRegistered(_) => BillingStatus::Paid,
        RechargeEvent::RechargeExecuted(_) => BillingStatus::RechargeExecuted,
        RechargeEvent::RequestCompleted(_) => BillingStatus::Completed,
        RechargeEvent::RequestFailed(_) => BillingStatus::Error,
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    company_id: CompanyId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct MetricsState {
    metrics: AdminMetrics,
    /// Last known status per request; lets a transition vacate the stage it
    /// left as well as fill the one it entered.
    statuses: HashMap<StreamKey, BillingStatus>,
    cursors: HashMap<StreamKey, u64>,
}

#[derive(Debug, Error)]
pub enum MetricsProjectionError {
    #[error("failed to deserialize recharge event: {0}")]
    Deserialize(String),

    #[error("company isolation violation: {0}")]
    CompanyIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("metrics state lock poisoned")]
    Poisoned,
}

/// Cross-company metrics for the administrator console.
///
/// Counter updates and cursor tracking live under one lock so a transition
/// adjusts the stage vacated and the stage entered atomically.
#[derive(Debug, Default)]
pub struct AdminMetricsProjection {
    state: RwLock<MetricsState>,
}

impl AdminMetricsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current metrics snapshot.
    pub fn metrics(&self) -> AdminMetrics {
        match self.state.read() {
            Ok(state) => state.metrics.clone(),
            Err(_) => AdminMetrics::default(),
        }
    }

    /// Apply one stored-event envelope to the metrics.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), MetricsProjectionError> {
        if envelope.aggregate_type() != REQUEST_AGGREGATE_TYPE {
            return Ok(());
        }

        let company_id = envelope.company_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let key = StreamKey {
            company_id,
            aggregate_id,
        };

        let ev: RechargeEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| MetricsProjectionError::Deserialize(e.to_string()))?;

        if ev.company_id() != company_id {
            return Err(MetricsProjectionError::CompanyIsolation(
                "event company_id does not match envelope company_id".to_string(),
            ));
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| MetricsProjectionError::Poisoned)?;

        let last = state.cursors.get(&key).copied().unwrap_or(0);
        if seq == 0 {
            return Err(MetricsProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Already counted (at-least-once delivery); idempotent skip.
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(MetricsProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let new_status = status_after(&ev);
        let old_status = state.statuses.get(&key).copied();

        if let Some(old) = old_status {
            if let Some(bucket) = pending_bucket(&mut state.metrics, old) {
                *bucket = bucket.saturating_sub(1);
            }
        }
        if let Some(bucket) = pending_bucket(&mut state.metrics, new_status) {
            *bucket += 1;
        }

        match &ev {
            RechargeEvent::RequestCompleted(e) => {
                state.metrics.completed_requests += 1;
                state.metrics.total_revenue += e.total;
                let key = month_key(ev.occurred_at().year(), ev.occurred_at().month());
                *state.metrics.monthly_completions.entry(key).or_insert(0) += 1;
            }
            RechargeEvent::RequestFailed(_) => {
                state.metrics.failed_requests += 1;
            }
            _ => {}
        }

        state.statuses.insert(key, new_status);
        state.cursors.insert(key, seq);

        Ok(())
    }

    /// Rebuild the metrics from scratch by replaying the full history.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), MetricsProjectionError> {
        {
            let mut state = self
                .state
                .write()
                .map_err(|_| MetricsProjectionError::Poisoned)?;
            *state = MetricsState::default();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
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
    use chrono::{TimeZone, Utc};
    use localbill_billing::{
        AdPlatform, CalculationCommitted, RechargeRequestId, RequestCompleted, RequestFailed,
        RequestOpened, TaxFigures,
    };

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

    fn opened(company_id: CompanyId, request_id: RechargeRequestId) -> RechargeEvent {
        RechargeEvent::RequestOpened(RequestOpened {
            company_id,
            request_id,
            platform: AdPlatform::Google,
            amount: 1_000.0,
            occurred_at: Utc::now(),
        })
    }

    fn calculated(company_id: CompanyId, request_id: RechargeRequestId) -> RechargeEvent {
        RechargeEvent::CalculationCommitted(CalculationCommitted {
            company_id,
            request_id,
            figures: TaxFigures {
                base: 1_100.0,
                commission: 100.0,
                total: 1_265.0,
            },
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn transition_moves_request_between_buckets() {
        let proj = AdminMetricsProjection::new();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            1,
            opened(company_id, request_id),
        ))
        .unwrap();
        assert_eq!(proj.metrics().pending_requests, 1);
        assert_eq!(proj.metrics().in_flight_total(), 1);

        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            2,
            calculated(company_id, request_id),
        ))
        .unwrap();

        let m = proj.metrics();
        assert_eq!(m.pending_requests, 0);
        assert_eq!(m.pending_approvals, 1);
        assert_eq!(m.in_flight_total(), 1);
    }

    #[test]
    fn recommit_does_not_inflate_counters() {
        let proj = AdminMetricsProjection::new();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            1,
            opened(company_id, request_id),
        ))
        .unwrap();
        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            2,
            calculated(company_id, request_id),
        ))
        .unwrap();
        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            3,
            calculated(company_id, request_id),
        ))
        .unwrap();

        let m = proj.metrics();
        assert_eq!(m.pending_approvals, 1);
        assert_eq!(m.in_flight_total(), 1);
    }

    #[test]
    fn completion_accrues_revenue_and_monthly_count() {
        let proj = AdminMetricsProjection::new();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            1,
            opened(company_id, request_id),
        ))
        .unwrap();

        let completed_at = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
        let completed = RechargeEvent::RequestCompleted(RequestCompleted {
            company_id,
            request_id,
            total: 1_265.0,
            occurred_at: completed_at,
        });
        proj.apply_envelope(&make_envelope(company_id, request_id.0, 2, completed))
            .unwrap();

        let m = proj.metrics();
        assert_eq!(m.in_flight_total(), 0);
        assert_eq!(m.completed_requests, 1);
        assert!((m.total_revenue - 1_265.0).abs() < 1e-9);
        assert_eq!(m.completions_in(2026, 8), 1);
        assert_eq!(m.completions_in(2026, 7), 0);
    }

    #[test]
    fn duplicate_completion_envelope_counts_once() {
        let proj = AdminMetricsProjection::new();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            1,
            opened(company_id, request_id),
        ))
        .unwrap();

        let completed = RechargeEvent::RequestCompleted(RequestCompleted {
            company_id,
            request_id,
            total: 1_265.0,
            occurred_at: Utc::now(),
        });
        let env = make_envelope(company_id, request_id.0, 2, completed);
        proj.apply_envelope(&env).unwrap();
        proj.apply_envelope(&env).unwrap();

        let m = proj.metrics();
        assert_eq!(m.completed_requests, 1);
        assert!((m.total_revenue - 1_265.0).abs() < 1e-9);
    }

    #[test]
    fn failure_empties_pending_and_counts_failed() {
        let proj = AdminMetricsProjection::new();
        let company_id = CompanyId::new();
        let request_id = RechargeRequestId::new(AggregateId::new());

        proj.apply_envelope(&make_envelope(
            company_id,
            request_id.0,
            1,
            opened(company_id, request_id),
        ))
        .unwrap();

        let failed = RechargeEvent::RequestFailed(RequestFailed {
            company_id,
            request_id,
            message: "platform API unavailable".to_string(),
            occurred_at: Utc::now(),
        });
        proj.apply_envelope(&make_envelope(company_id, request_id.0, 2, failed))
            .unwrap();

        let m = proj.metrics();
        assert_eq!(m.in_flight_total(), 0);
        assert_eq!(m.failed_requests, 1);
        assert!((m.total_revenue - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rebuild_matches_incremental_application() {
        let proj = AdminMetricsProjection::new();
        let company_a = CompanyId::new();
        let company_b = CompanyId::new();
        let req_a = RechargeRequestId::new(AggregateId::new());
        let req_b = RechargeRequestId::new(AggregateId::new());

        let envs = vec![
            make_envelope(company_a, req_a.0, 1, opened(company_a, req_a)),
            make_envelope(company_a, req_a.0, 2, calculated(company_a, req_a)),
            make_envelope(company_b, req_b.0, 1, opened(company_b, req_b)),
        ];
        for env in &envs {
            proj.apply_envelope(env).unwrap();
        }
        let incremental = proj.metrics();

        let fresh = AdminMetricsProjection::new();
        fresh.rebuild_from_scratch(envs).unwrap();

        assert_eq!(fresh.metrics(), incremental);
        assert_eq!(incremental.pending_requests, 1);
        assert_eq!(incremental.pending_approvals, 1);
    }
}
