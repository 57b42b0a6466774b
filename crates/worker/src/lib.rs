//! Job scheduling: the worker pool, status reads and the reconciliation
//! sweep.
//!
//! [`scheduler::Scheduler`] owns every state transition after submission;
//! [`status::StatusService`] only reads. Both go through the
//! [`lookgen_db::JobStore`] they are given, so the same code runs against
//! the in-memory store and PostgreSQL.

pub mod config;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod status;

pub use config::{ReconcileConfig, SchedulerConfig};
pub use retry::StoreRetryPolicy;
pub use scheduler::Scheduler;
pub use status::{JobStatusView, StatusService};
