use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use localbill_billing::{AdPlatform, BillingStatus, RechargeRequestId};
use localbill_core::{AggregateId, CompanyId};
use localbill_events::InMemoryEventBus;
use localbill_infra::collaborators::{InMemoryTaxRegistry, NullDocumentArchive};
use localbill_infra::event_store::InMemoryEventStore;
use localbill_infra::notifications::Notification;
use localbill_infra::service::BillingService;
use localbill_tax::billing_breakdown;

/// Naive CRUD simulation: direct key-value status updates (no events, no
/// history, no read models).
#[derive(Debug, Clone)]
struct NaiveCrudStore {
    inner: Arc<RwLock<HashMap<(CompanyId, AggregateId), CrudState>>>,
}

#[derive(Debug, Clone)]
struct CrudState {
    amount: f64,
    total: f64,
    status: BillingStatus,
}

impl NaiveCrudStore {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn open(&self, company_id: CompanyId, request_id: AggregateId, amount: f64) {
        let mut map = self.inner.write().unwrap();
        map.insert(
            (company_id, request_id),
            CrudState {
                amount,
                total: 0.0,
                status: BillingStatus::RequestCreated,
            },
        );
    }

    fn set_status(&self, company_id: CompanyId, request_id: AggregateId, status: BillingStatus) {
        let mut map = self.inner.write().unwrap();
        if let Some(state) = map.get_mut(&(company_id, request_id)) {
            if status == BillingStatus::Calculated {
                state.total = billing_breakdown(state.amount).local.total;
            }
            state.status = status;
        }
    }
}

fn tax_engine_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tax_engine");
    for amount in [100.0, 5_000.0, 999_999.0] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(amount),
            &amount,
            |b, &amount| {
                b.iter(|| black_box(billing_breakdown(black_box(amount))));
            },
        );
    }
    group.finish();
}

fn lifecycle_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_lifecycle");
    group.throughput(Throughput::Elements(7));

    group.bench_function("event_sourced_pipeline", |b| {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::<Notification>::new());
        let registry = Arc::new(InMemoryTaxRegistry::new());
        let company_id = CompanyId::new();
        registry.connect(company_id);
        let service =
            BillingService::new(store, bus, registry.clone(), Arc::new(NullDocumentArchive));

        b.iter(|| {
            let request_id = RechargeRequestId::new(AggregateId::new());
            service
                .open_request(company_id, request_id, AdPlatform::Meta, 5_000.0)
                .unwrap();
            service
                .commit_calculation(company_id, request_id, None)
                .unwrap();
            service.approve_calculation(company_id, request_id).unwrap();
            service.emit_invoice(company_id, request_id).unwrap();
            service.register_payment(company_id, request_id).unwrap();
            service.execute_recharge(company_id, request_id).unwrap();
            service.complete_request(company_id, request_id).unwrap();
        });
    });

    group.bench_function("naive_crud_updates", |b| {
        let store = NaiveCrudStore::new();
        let company_id = CompanyId::new();

        b.iter(|| {
            let request_id = AggregateId::new();
            store.open(company_id, request_id, 5_000.0);
            for status in [
                BillingStatus::Calculated,
                BillingStatus::ApprovedByClient,
                BillingStatus::Invoiced,
                BillingStatus::Paid,
                BillingStatus::RechargeExecuted,
                BillingStatus::Completed,
            ] {
                store.set_status(company_id, request_id, status);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, tax_engine_benchmark, lifecycle_benchmark);
criterion_main!(benches);
