//! Domain types shared by every lookgen crate.
//!
//! Nothing in here performs I/O: the job state machine, request validation,
//! task derivation and the progress policy are plain data plus rules, so the
//! store, scheduler and executor all agree on them.

pub mod error;
pub mod job;
pub mod outcome;
pub mod progress;
pub mod request;
pub mod task;
pub mod types;
