//! # Layer Trait
//!
//! Tower-style middleware composition for operation handlers.
//!
//! ```text
//! Handler ──▶ Layer::layer() ──▶ Wrapped Handler
//! ```
//!
//! Each middleware provides a wrapper struct that implements
//! [`OperationHandler`] and a `Layer` implementation that creates it.
//! [`TracingLayer`] is the built-in one: it opens a span per call.
//!
//! ```rust
//! use std::sync::Arc;
//! use anyfs_ops::{LayerExt, MemoryProvider, PrimitiveHandler, TracingLayer};
//!
//! let handler = PrimitiveHandler::new(Arc::new(MemoryProvider::standalone()))
//!     .layer(TracingLayer::new());
//! # let _ = handler;
//! ```

use std::path::PathBuf;

use tracing::{debug, info_span};

use crate::{
    CopyParams, CopyResult, CreateParams, DeleteParams, Info, ListParams, MoveParams, MoveResult,
    OpError, OpResult, Operation, OperationHandler, ReadChannel, Uri, WriteChannel,
};

/// A layer that wraps a handler to add functionality.
///
/// `layer(self, handler)` consumes both the layer and the handler.
pub trait Layer<H> {
    /// The resulting handler type after applying this layer.
    type Handler;

    /// Wrap `handler` with this layer's functionality.
    fn layer(self, handler: H) -> Self::Handler;
}

/// Extension trait for fluent layer composition.
pub trait LayerExt: OperationHandler + Sized {
    /// Apply a layer to this handler.
    fn layer<L: Layer<Self>>(self, layer: L) -> L::Handler {
        layer.layer(self)
    }
}

impl<H: OperationHandler> LayerExt for H {}

/// Layer producing [`Traced`] handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLayer;

impl TracingLayer {
    /// Create the layer.
    pub fn new() -> Self {
        Self
    }
}

impl<H: OperationHandler> Layer<H> for TracingLayer {
    type Handler = Traced<H>;

    fn layer(self, handler: H) -> Self::Handler {
        Traced { inner: handler }
    }
}

/// Handler wrapper that runs every call inside an `op` span.
///
/// Failures other than a decline are logged at debug level.
#[derive(Debug)]
pub struct Traced<H> {
    inner: H,
}

impl<H> Traced<H> {
    /// The wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Unwrap the handler.
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: OperationHandler> Traced<H> {
    fn traced<T>(&self, op: &str, uri: &Uri, call: impl FnOnce() -> OpResult<T>) -> OpResult<T> {
        let span = info_span!("op", handler = self.inner.name(), op, uri = %uri);
        let _entered = span.enter();
        let outcome = call();
        if let Err(err) = &outcome {
            if !err.is_declined() {
                debug!(error = %err, "operation failed");
            }
        }
        outcome
    }
}

impl<H: OperationHandler> OperationHandler for Traced<H> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn can_perform(&self, operation: &Operation) -> bool {
        self.inner.can_perform(operation)
    }

    fn priority(&self, operation: &Operation) -> i32 {
        self.inner.priority(operation)
    }

    fn decline(&self, operation: &Operation) -> OpError {
        self.inner.decline(operation)
    }

    fn create(&self, target: &Uri, params: &CreateParams) -> OpResult<Uri> {
        self.traced("create", target, || self.inner.create(target, params))
    }

    fn delete(&self, target: &Uri, params: &DeleteParams) -> OpResult<Uri> {
        self.traced("delete", target, || self.inner.delete(target, params))
    }

    fn copy(
        &self,
        source: &Uri,
        target: &Uri,
        params: &CopyParams,
        result: &mut CopyResult,
    ) -> OpResult<()> {
        self.traced("copy", source, || {
            self.inner.copy(source, target, params, result)
        })
    }

    fn move_to(
        &self,
        source: &Uri,
        target: &Uri,
        params: &MoveParams,
        result: &mut MoveResult,
    ) -> OpResult<()> {
        self.traced("move", source, || {
            self.inner.move_to(source, target, params, result)
        })
    }

    fn rename(&self, source: &Uri, target: &Uri) -> OpResult<Uri> {
        self.traced("rename", source, || self.inner.rename(source, target))
    }

    fn list(&self, target: &Uri, params: &ListParams) -> OpResult<Vec<Info>> {
        self.traced("list", target, || self.inner.list(target, params))
    }

    fn info(&self, target: &Uri) -> OpResult<Option<Info>> {
        self.traced("info", target, || self.inner.info(target))
    }

    fn resolve(&self, pattern: &Uri) -> OpResult<Vec<Uri>> {
        self.traced("resolve", pattern, || self.inner.resolve(pattern))
    }

    fn read(&self, source: &Uri) -> OpResult<ReadChannel> {
        self.traced("read", source, || self.inner.read(source))
    }

    fn write(&self, target: &Uri, append: bool) -> OpResult<WriteChannel> {
        let op = if append { "append" } else { "write" };
        self.traced(op, target, || self.inner.write(target, append))
    }

    fn local_file(&self, target: &Uri) -> OpResult<PathBuf> {
        self.traced("file", target, || self.inner.local_file(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryProvider, OperationKind, PrimitiveHandler, ProviderExt, TOP_PRIORITY};
    use std::sync::Arc;

    #[test]
    fn layer_ext_is_auto_implemented() {
        fn _check<H: OperationHandler + LayerExt>() {}
    }

    #[test]
    fn traced_forwards_everything() {
        let provider = Arc::new(MemoryProvider::standalone());
        let traced = PrimitiveHandler::new(provider.clone()).layer(TracingLayer::new());
        let op = Operation::single(OperationKind::Info, "mem");
        assert_eq!(traced.name(), "primitive:mem");
        assert!(traced.can_perform(&op));
        assert_eq!(traced.priority(&op), TOP_PRIORITY);

        let file = Uri::parse("mem://t/f").unwrap();
        traced.create(&file, &CreateParams::default()).unwrap();
        assert!(provider.is_file(&file).unwrap());
        assert!(traced.info(&file).unwrap().is_some());
        assert!(matches!(
            traced.create(&file, &CreateParams::default().with_no_overwrite(true)),
            Err(OpError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn traced_is_usable_as_object() {
        let provider = Arc::new(MemoryProvider::standalone());
        let boxed: Box<dyn OperationHandler> =
            Box::new(PrimitiveHandler::new(provider).layer(TracingLayer));
        assert_eq!(boxed.name(), "primitive:mem");
    }
}
