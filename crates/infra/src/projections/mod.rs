//! Projection implementations (read model builders).
//!
//! Projections consume recharge-request events and build query-optimized
//! read models. All projections are:
//! - **Rebuildable**: reconstructible from the event streams at any time
//! - **Idempotent**: safe for at-least-once delivery (sequence cursors)
//! - **Company-aware**: data is partitioned or tagged by owning company

pub mod directory;
pub mod metrics;

pub use directory::{DirectoryProjectionError, RequestDirectoryProjection, RequestSnapshot};
pub use metrics::{AdminMetrics, AdminMetricsProjection, MetricsProjectionError};
