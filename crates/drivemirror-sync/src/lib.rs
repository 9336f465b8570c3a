//! DriveMirror Sync - Reconciling tree replication engine
//!
//! Provides:
//! - Per-directory verify/copy/verify reconciliation against an asynchronous
//!   copy API
//! - Bounded-concurrency copy submission within a directory
//! - Depth-first traversal over an explicit work list
//! - Cooperative cancellation that lets in-flight submissions finish
//!
//! ## Modules
//!
//! - [`engine`] - Run orchestration, traversal and options
//! - [`reconcile`] - The per-directory state machine
//! - [`report`] - Final run report

pub mod engine;
pub mod reconcile;
pub mod report;

pub use engine::{MirrorEngine, MirrorOptions};
pub use reconcile::{DirectoryOutcome, DirectoryReconciliation};
pub use report::MirrorReport;
