pub mod entitlement;
pub mod error;
pub mod event;
pub mod plan;
pub mod quota;
pub mod reconcile;
pub mod store;

pub use entitlement::{Entitlement, SubscriptionStatus, UNLIMITED, rollover_if_due};
pub use error::LedgerError;
pub use event::{BillingEvent, BillingEventKind, BillingPeriod};
pub use plan::{PlanId, PlanPolicy};
pub use quota::{
    CompensationOutcome, ConsumeOutcome, GenerationInput, GenerationRecord, GenerationStatus,
    compensate, try_consume,
};
pub use reconcile::{ReconcileOutcome, apply_event};
pub use store::{Commit, LedgerStore, MemoryLedger, StoreError};
