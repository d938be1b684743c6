//! # anyfs-ops
//!
//! A **file-operation dispatch layer** over pluggable storage backends.
//!
//! Callers submit batch operations (create, delete, copy, move, list, info,
//! resolve) over lists of URIs. A [`Dispatcher`] picks a handler per item,
//! runs it, and aggregates per-item outcomes into a typed result. Backends
//! implement a small set of [`PrimitiveProvider`] calls; copy and move
//! between backends are composed from those primitives.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use anyfs_ops::{
//!     CopyParams, CreateParams, Dispatcher, MemoryProvider, ProviderExt, Uri, UriList,
//! };
//!
//! let memory = Arc::new(MemoryProvider::standalone());
//! let dispatcher = Dispatcher::builder().provider(memory.clone()).build()?;
//!
//! memory.write_all(&Uri::parse("mem://a/report.txt")?, b"q3")?;
//!
//! // Cross-authority copy falls back to the streaming composite handler.
//! let result = dispatcher.copy(
//!     &UriList::parse("mem://a/report.txt")?,
//!     &UriList::parse("mem://b/archive/")?,
//!     &CopyParams::default().with_make_parents(true),
//! );
//! assert!(result.success());
//! assert_eq!(memory.read_all(&Uri::parse("mem://b/archive/report.txt")?)?, b"q3");
//! # let _ = CreateParams::default();
//! # Ok::<(), anyfs_ops::OpError>(())
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Dispatcher`] | Routes operations to handlers, aggregates batch results |
//! | [`OperationHandler`] | Performs operations; declines what it cannot do |
//! | [`PrimitiveProvider`] | Backend primitives: create, delete, read, write, info, list |
//! | [`ConnectionPool`] | Bounded per-authority connection reuse |
//! | [`BatchResult`] | One outcome per attempted item plus an optional fatal error |
//! | [`OpError`] | Structured error with a [`ErrorKind`] tag |
//! | [`Uri`] / [`UriList`] | Addressing: `scheme://authority/path` |
//!
//! ---
//!
//! ## Handler Selection
//!
//! ```text
//! item ──▶ can_perform? ──▶ sort by priority ──▶ first handler
//!                                                  │
//!                       UnsupportedCombination ◀───┘ try next
//! ```
//!
//! [`PrimitiveHandler`] serves its own scheme at [`TOP_PRIORITY`];
//! [`CompositeHandler`] streams COPY, MOVE and RENAME between any registered
//! schemes at [`FALLBACK_PRIORITY`].
//!
//! ---
//!
//! ## Error Handling
//!
//! Every operation returns `Result<T, OpError>`; batch operations store one
//! such result per item. Errors carry the URI that caused them:
//!
//! ```rust
//! use anyfs_ops::{OpError, Uri};
//!
//! let err = OpError::NotFound { uri: Uri::parse("mem://h/missing.txt")? };
//! assert_eq!(err.to_string(), "not found: mem://h/missing.txt");
//! # Ok::<(), OpError>(())
//! ```
//!
//! ---
//!
//! ## Thread Safety
//!
//! Handlers and providers are `Send + Sync` and take `&self`. A built
//! [`Dispatcher`] is immutable; share it across threads. The connection pool
//! is the only shared mutable state and locks only its bookkeeping.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for [`Info`], [`FileType`], [`Permissions`], [`OperationKind`] and config |

mod backends;
mod cancel;
mod config;
mod dispatch;
mod error;
mod ext;
mod handlers;
mod layer;
mod operation;
mod params;
mod pool;
mod resolve;
mod result;
mod stream;
mod traits;
mod types;
mod uri;

// Public re-exports - addressing
pub use uri::{Authority, FILE_SCHEME, LIST_SEPARATOR, PATH_SEPARATOR, Uri, UriList};

// Public re-exports - error types
pub use error::{ErrorKind, OpError, OpResult};

// Public re-exports - core types
pub use cancel::CancellationToken;
pub use operation::{Operation, OperationKind};
pub use params::{CopyParams, CreateParams, DeleteParams, ListParams, MoveParams, TransferParams};
pub use types::{FileType, Info, Permissions};

// Public re-exports - results
pub use result::{
    BatchResult, CopyResult, CreateResult, DeleteResult, InfoResult, ListResult, MoveResult,
    ResolveResult, UriPair,
};

// Public re-exports - configuration
pub use config::{
    DEFAULT_BORROW_TIMEOUT, DEFAULT_BUFFER_SIZE, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_PER_AUTHORITY,
    DispatchConfig, ExhaustedPolicy, PoolConfig,
};

// Public re-exports - traits
pub use traits::{
    Capabilities, DEFAULT_PRIORITY, FALLBACK_PRIORITY, OperationHandler, PrimitiveProvider,
    ReadChannel, TOP_PRIORITY, WriteChannel,
};

// Public re-exports - infrastructure
pub use ext::ProviderExt;
pub use layer::{Layer, LayerExt, Traced, TracingLayer};
pub use pool::{Connection, ConnectionPool, Connector, PoolStats, Pooled};
pub use resolve::{has_wildcards, resolve_with};
pub use stream::pump;

// Public re-exports - handlers, dispatch and backends
pub use backends::{
    LocalProvider, MEMORY_SCHEME, MemoryConnection, MemoryConnector, MemoryNetwork,
    MemoryProvider, MemoryServer,
};
pub use dispatch::{Dispatcher, DispatcherBuilder, Request, Response};
pub use handlers::{CompositeHandler, PrimitiveHandler};
