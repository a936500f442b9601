//! Billing service: the transition pipeline.
//!
//! Every state-machine transition runs through one path:
//!
//! ```text
//! collaborator preconditions
//!   ↓
//! load stream (company-scoped) → rehydrate aggregate
//!   ↓
//! handle command (pure decision)
//!   ↓
//! append with ExpectedVersion::Exact (per-record serialization)
//!   ↓
//! apply committed events to metrics + directory (same call, no drift)
//!   ↓
//! publish typed notification (fire-and-forget)
//! ```
//!
//! A rejected command appends nothing and leaves every read model untouched.
//! A failed publication is logged and swallowed: the transition is already
//! committed and must not be rolled back or blocked by the notification
//! channel.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use localbill_billing::{
    ActorRole, AdPlatform, ApproveCalculation, BillingStatus, CommitCalculation, CompleteRequest,
    EmitInvoice, ExecuteRecharge, FailRequest, OpenRequest, RechargeCommand, RechargeEvent,
    RechargeRequest, RechargeRequestId, RegisterPayment, TaxFigures,
};
use localbill_core::{Aggregate, AggregateId, CompanyId, DomainError, ExpectedVersion};
use localbill_events::{Command, EventBus};
use localbill_tax::{billing_breakdown, is_billable_amount};

use crate::REQUEST_AGGREGATE_TYPE;
use crate::collaborators::{DocumentArchive, InvoiceSequence, TaxRegistry};
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::notifications::Notification;
use crate::projections::{
    AdminMetrics, AdminMetricsProjection, RequestDirectoryProjection, RequestSnapshot,
};
use crate::read_model::InMemoryCompanyStore;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Deterministic business failure (validation, precondition, state,
    /// terminal, not-found, conflict); render inline at the point of action.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The event store failed for a non-concurrency reason.
    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// A stored event payload could not be decoded during rehydration.
    #[error("stored event payload could not be decoded: {0}")]
    Deserialize(String),

    /// A read model could not be brought in line with a committed append.
    #[error("read model update failed: {0}")]
    Projection(String),
}

impl From<EventStoreError> for ServiceError {
    fn from(value: EventStoreError) -> Self {
        match value {
            // A lost optimistic race surfaces as a domain conflict: the caller
            // reloads the record and retries (or observes the new status).
            EventStoreError::Concurrency(msg) => ServiceError::Domain(DomainError::conflict(msg)),
            other => ServiceError::Store(other),
        }
    }
}

/// Application service wrapping the recharge-request state machine.
///
/// Generic over the event store and the notification bus so tests run fully
/// in memory and production can swap in durable collaborators.
pub struct BillingService<S, N>
where
    S: EventStore,
    N: EventBus<Notification>,
{
    store: S,
    notifier: N,
    registry: Arc<dyn TaxRegistry>,
    archive: Arc<dyn DocumentArchive>,
    invoices: InvoiceSequence,
    metrics: AdminMetricsProjection,
    directory: RequestDirectoryProjection<InMemoryCompanyStore<RechargeRequestId, RequestSnapshot>>,
}

impl<S, N> BillingService<S, N>
where
    S: EventStore,
    N: EventBus<Notification>,
{
    pub fn new(
        store: S,
        notifier: N,
        registry: Arc<dyn TaxRegistry>,
        archive: Arc<dyn DocumentArchive>,
    ) -> Self {
        Self {
            store,
            notifier,
            registry,
            archive,
            invoices: InvoiceSequence::new(),
            metrics: AdminMetricsProjection::new(),
            directory: RequestDirectoryProjection::new(InMemoryCompanyStore::new()),
        }
    }

    /// Client action: open a recharge request for an advertising spend.
    pub fn open_request(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
        platform: AdPlatform,
        amount: f64,
    ) -> Result<RequestSnapshot, ServiceError> {
        if !self.registry.is_registration_connected(company_id) {
            return Err(DomainError::precondition(
                "tax registration is not connected for this company",
            )
            .into());
        }

        self.run(RechargeCommand::OpenRequest(OpenRequest {
            company_id,
            request_id,
            platform,
            amount,
            actor: ActorRole::Client,
            occurred_at: Utc::now(),
        }))
    }

    /// The engine's suggested figures for a requested amount, for the
    /// administrator to review before committing.
    pub fn suggested_figures(&self, amount: f64) -> Result<TaxFigures, ServiceError> {
        if !is_billable_amount(amount) {
            return Err(
                DomainError::validation("amount must be above $0 and below $1,000,000").into(),
            );
        }
        Ok(TaxFigures::from_breakdown(&billing_breakdown(amount)))
    }

    /// Admin action: commit (or revise, while still calculated) the tax
    /// figures. `None` commits the engine's suggestion for the requested
    /// amount.
    pub fn commit_calculation(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
        figures: Option<TaxFigures>,
    ) -> Result<RequestSnapshot, ServiceError> {
        let figures = match figures {
            Some(figures) => figures,
            None => {
                let (request, _) = self.load(company_id, request_id)?;
                if !request.exists() {
                    return Err(DomainError::not_found().into());
                }
                self.suggested_figures(request.requested_amount())?
            }
        };

        self.run(RechargeCommand::CommitCalculation(CommitCalculation {
            company_id,
            request_id,
            figures,
            actor: ActorRole::Admin,
            occurred_at: Utc::now(),
        }))
    }

    /// Client action: approve the committed calculation.
    pub fn approve_calculation(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
    ) -> Result<RequestSnapshot, ServiceError> {
        self.run(RechargeCommand::ApproveCalculation(ApproveCalculation {
            company_id,
            request_id,
            actor: ActorRole::Client,
            occurred_at: Utc::now(),
        }))
    }

    /// Admin action: emit the local invoice. The invoice number comes from
    /// the sequence; the document collaborator may attach an artifact ref.
    pub fn emit_invoice(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
    ) -> Result<RequestSnapshot, ServiceError> {
        let now = Utc::now();
        let invoice_number = self.invoices.next(now);
        let document_ref = self
            .archive
            .invoice_document(company_id, request_id, &invoice_number);

        self.run(RechargeCommand::EmitInvoice(EmitInvoice {
            company_id,
            request_id,
            invoice_number,
            document_ref,
            actor: ActorRole::Admin,
            occurred_at: now,
        }))
    }

    /// Admin action: register the client's payment against the invoice.
    pub fn register_payment(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
    ) -> Result<RequestSnapshot, ServiceError> {
        let proof_ref = self.archive.payment_proof(company_id, request_id);

        self.run(RechargeCommand::RegisterPayment(RegisterPayment {
            company_id,
            request_id,
            proof_ref,
            actor: ActorRole::Admin,
            occurred_at: Utc::now(),
        }))
    }

    /// Admin action: credit the ad-platform account.
    pub fn execute_recharge(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
    ) -> Result<RequestSnapshot, ServiceError> {
        self.run(RechargeCommand::ExecuteRecharge(ExecuteRecharge {
            company_id,
            request_id,
            actor: ActorRole::Admin,
            occurred_at: Utc::now(),
        }))
    }

    /// Admin action: close a recharged request. Accrues the revenue metric.
    pub fn complete_request(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
    ) -> Result<RequestSnapshot, ServiceError> {
        self.run(RechargeCommand::CompleteRequest(CompleteRequest {
            company_id,
            request_id,
            actor: ActorRole::Admin,
            occurred_at: Utc::now(),
        }))
    }

    /// Move a request to the terminal error status with an audit message.
    pub fn fail_request(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
        message: impl Into<String>,
        actor: ActorRole,
    ) -> Result<RequestSnapshot, ServiceError> {
        self.run(RechargeCommand::FailRequest(FailRequest {
            company_id,
            request_id,
            message: message.into(),
            actor,
            occurred_at: Utc::now(),
        }))
    }

    /// Current administrator metrics.
    pub fn metrics(&self) -> AdminMetrics {
        self.metrics.metrics()
    }

    /// Current snapshot of one request.
    pub fn request(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
    ) -> Option<RequestSnapshot> {
        self.directory.get(company_id, &request_id)
    }

    /// A company's requests currently sitting in `status`.
    pub fn requests_by_status(
        &self,
        company_id: CompanyId,
        status: BillingStatus,
    ) -> Vec<RequestSnapshot> {
        self.directory.by_status(company_id, status)
    }

    fn load(
        &self,
        company_id: CompanyId,
        request_id: RechargeRequestId,
    ) -> Result<(RechargeRequest, u64), ServiceError> {
        let history = self.store.load_stream(company_id, request_id.0)?;
        validate_loaded_stream(company_id, request_id.0, &history)?;
        let version = history.last().map(|e| e.sequence_number).unwrap_or(0);

        let mut request = RechargeRequest::empty(request_id);
        for stored in &history {
            let ev: RechargeEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| ServiceError::Deserialize(e.to_string()))?;
            request.apply(&ev);
        }

        Ok((request, version))
    }

    fn run(&self, command: RechargeCommand) -> Result<RequestSnapshot, ServiceError> {
        let company_id = command.company_id();
        let request_id = RechargeRequestId::new(command.target_aggregate_id());

        // 1) Load + rehydrate (company-scoped, validated).
        let (request, version) = self.load(company_id, request_id)?;
        let status_before = request.exists().then(|| request.status());

        // 2) Decide events (no mutation; a rejection changes nothing).
        let decided = request.handle(&command).map_err(ServiceError::from)?;
        let opened = matches!(decided.first(), Some(RechargeEvent::RequestOpened(_)));

        // 3) Persist (append-only, optimistic).
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    company_id,
                    request_id.0,
                    REQUEST_AGGREGATE_TYPE,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(version))?;

        // 4) Bring read models in line within the same call.
        for stored in &committed {
            let envelope = stored.to_envelope();
            self.metrics
                .apply_envelope(&envelope)
                .map_err(|e| ServiceError::Projection(e.to_string()))?;
            self.directory
                .apply_envelope(&envelope)
                .map_err(|e| ServiceError::Projection(e.to_string()))?;
        }

        let snapshot = self
            .directory
            .get(company_id, &request_id)
            .ok_or_else(|| ServiceError::Projection("snapshot missing after commit".to_string()))?;

        tracing::info!(
            company = %company_id,
            request = %request_id,
            status = %snapshot.status,
            "billing transition committed"
        );

        // 5) Notify (best-effort; never rolls back the committed transition).
        let notification = if opened {
            Notification::NewRequest(snapshot.clone())
        } else if status_before == Some(snapshot.status) {
            Notification::GenericUpdate(snapshot.clone())
        } else {
            Notification::StatusChanged(snapshot.clone())
        };
        if let Err(err) = self.notifier.publish(notification) {
            tracing::warn!(
                company = %company_id,
                request = %request_id,
                error = ?err,
                "notification publish failed; transition stands"
            );
        }

        Ok(snapshot)
    }
}

fn validate_loaded_stream(
    company_id: CompanyId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), ServiceError> {
    // Enforce company isolation even if a buggy backend returns cross-company
    // data. Also ensure the stream is monotonically increasing by sequence.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.company_id != company_id {
            return Err(ServiceError::Store(EventStoreError::CompanyIsolation(
                format!("loaded stream contains wrong company_id at index {idx}"),
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(ServiceError::Store(EventStoreError::CompanyIsolation(
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            )));
        }
        if e.sequence_number == 0 {
            return Err(ServiceError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(ServiceError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}
