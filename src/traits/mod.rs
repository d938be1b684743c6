//! # Provider and Handler Traits
//!
//! The two seams of the crate.
//!
//! ```text
//! Dispatcher ──▶ OperationHandler ──▶ PrimitiveProvider ──▶ backend
//!                (batches, fallback,   (atomic single-URI
//!                 composites)           operations)
//! ```
//!
//! | Trait | Implemented by | Responsibility |
//! |-------|----------------|----------------|
//! | [`PrimitiveProvider`] | one per backend | create, delete, stat, list, open channels |
//! | [`OperationHandler`] | native and composite handlers | admissibility, priority, per-item execution |
//!
//! ## Thread Safety
//!
//! Both traits require `Send + Sync` and take `&self`, so one dispatcher can
//! serve many threads.
//!
//! ## Object Safety
//!
//! Both traits are object-safe:
//!
//! ```rust
//! use std::sync::Arc;
//! use anyfs_ops::{OperationHandler, PrimitiveProvider};
//!
//! fn _providers(_: &[Arc<dyn PrimitiveProvider>]) {}
//! fn _handlers(_: &[Box<dyn OperationHandler>]) {}
//! ```

mod handler;
mod provider;

pub use handler::{DEFAULT_PRIORITY, FALLBACK_PRIORITY, OperationHandler, TOP_PRIORITY};
pub use provider::{Capabilities, PrimitiveProvider, ReadChannel, WriteChannel};
