//! Fallback handler that streams copies and moves between providers.

use std::collections::HashMap;
use std::sync::Arc;

use super::transfer::{Transfer, TransferKind};
use crate::{
    CopyParams, CopyResult, DEFAULT_BUFFER_SIZE, FALLBACK_PRIORITY, MoveParams, MoveResult,
    OpError, OpResult, Operation, OperationHandler, OperationKind, PrimitiveProvider, Uri,
};

/// Composes copy, move and rename out of read, write, list and delete
/// primitives.
///
/// Admits COPY, MOVE and RENAME whenever both schemes have a registered
/// provider, at the lowest priority, so native handlers are tried first.
pub struct CompositeHandler {
    providers: HashMap<String, Arc<dyn PrimitiveProvider>>,
    buffer_size: usize,
}

impl CompositeHandler {
    /// Empty handler; register providers with [`with_provider`](Self::with_provider).
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Register `provider` under its scheme, replacing any earlier one.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn PrimitiveProvider>) -> Self {
        self.add_provider(provider);
        self
    }

    /// Register `provider` under its scheme, replacing any earlier one.
    pub fn add_provider(&mut self, provider: Arc<dyn PrimitiveProvider>) {
        self.providers
            .insert(provider.scheme().to_owned(), provider);
    }

    /// Use `buffer_size` for streamed transfers.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    fn provider(&self, uri: &Uri) -> OpResult<&dyn PrimitiveProvider> {
        self.providers
            .get(uri.scheme())
            .map(Arc::as_ref)
            .ok_or_else(|| OpError::Unsupported {
                operation: format!("no provider for scheme {}", uri.scheme()),
            })
    }

    fn transfer(
        &self,
        kind: TransferKind,
        source: &Uri,
        target: &Uri,
        params: &CopyParams,
        result: &mut CopyResult,
    ) -> OpResult<()> {
        self.streaming(source, target)?
            .run(kind, source, target, params, result)
    }

    fn streaming(&self, source: &Uri, target: &Uri) -> OpResult<Transfer<'_>> {
        Ok(Transfer::between(
            self.provider(source)?,
            self.provider(target)?,
            self.buffer_size,
        ))
    }
}

impl Default for CompositeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompositeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.providers.keys().collect();
        schemes.sort();
        f.debug_struct("CompositeHandler")
            .field("schemes", &schemes)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl OperationHandler for CompositeHandler {
    fn name(&self) -> &str {
        "composite"
    }

    fn can_perform(&self, operation: &Operation) -> bool {
        matches!(
            operation.kind(),
            OperationKind::Copy | OperationKind::Move | OperationKind::Rename
        )
            && operation
                .schemes()
                .iter()
                .all(|scheme| self.providers.contains_key(scheme))
    }

    fn priority(&self, _operation: &Operation) -> i32 {
        FALLBACK_PRIORITY
    }

    fn copy(
        &self,
        source: &Uri,
        target: &Uri,
        params: &CopyParams,
        result: &mut CopyResult,
    ) -> OpResult<()> {
        self.transfer(TransferKind::Copy, source, target, params, result)
    }

    fn move_to(
        &self,
        source: &Uri,
        target: &Uri,
        params: &MoveParams,
        result: &mut MoveResult,
    ) -> OpResult<()> {
        self.transfer(TransferKind::Move, source, target, params, result)
    }

    fn rename(&self, source: &Uri, target: &Uri) -> OpResult<Uri> {
        self.streaming(source, target)?.rename(source, target)
    }
}
