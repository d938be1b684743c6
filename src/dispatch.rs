//! Operation dispatch and batch aggregation.
//!
//! A [`Dispatcher`] owns an ordered list of [`OperationHandler`]s. For every
//! item it picks the admissible handlers (`can_perform`), orders them by
//! descending priority (registration order breaks ties) and invokes them in
//! turn until one does not decline.
//!
//! ```rust
//! use std::sync::Arc;
//! use anyfs_ops::{CreateParams, Dispatcher, MemoryProvider, UriList};
//!
//! let dispatcher = Dispatcher::builder()
//!     .provider(Arc::new(MemoryProvider::standalone()))
//!     .build()?;
//! let targets = UriList::parse("mem://host/a/;mem://host/a/b.txt")?;
//! let result = dispatcher.create(&targets, &CreateParams::default());
//! assert_eq!(result.success_count(), 2);
//! # Ok::<(), anyfs_ops::OpError>(())
//! ```

use std::cmp::Reverse;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::{
    CompositeHandler, CopyParams, CopyResult, CreateParams, CreateResult, DeleteParams,
    DeleteResult, DispatchConfig, Info, InfoResult, LayerExt, ListParams, ListResult, MoveParams,
    MoveResult, OpError, OpResult, Operation, OperationHandler, OperationKind, PoolConfig,
    PrimitiveHandler, PrimitiveProvider, ReadChannel, ResolveResult, TracingLayer, TransferParams, Uri, UriList,
    UriPair, WriteChannel,
};

type OpenPooled = Box<dyn FnOnce(&PoolConfig) -> Arc<dyn PrimitiveProvider>>;

enum Entry {
    Provider(Arc<dyn PrimitiveProvider>),
    Pooled(OpenPooled),
    Handler(Box<dyn OperationHandler>),
}

/// Builds a [`Dispatcher`].
///
/// Every provider gets a [`PrimitiveHandler`]; a [`CompositeHandler`] over
/// all registered providers is appended last unless
/// [`without_composite`](Self::without_composite) is called.
///
/// Providers registered with [`pooled_provider`](Self::pooled_provider) are
/// opened during [`build`](Self::build) with the configured
/// [`DispatchConfig::pool`]:
///
/// ```rust
/// use std::sync::Arc;
/// use anyfs_ops::{DispatchConfig, Dispatcher, MemoryNetwork, MemoryProvider, PoolConfig};
///
/// let network = MemoryNetwork::new();
/// let config = DispatchConfig {
///     pool: PoolConfig { max_per_authority: 2, ..PoolConfig::default() },
///     ..DispatchConfig::default()
/// };
/// let dispatcher = Dispatcher::builder()
///     .config(config)
///     .pooled_provider(move |pool| Arc::new(MemoryProvider::new(network, pool.clone())))
///     .build()?;
/// # let _ = dispatcher;
/// # Ok::<(), anyfs_ops::OpError>(())
/// ```
pub struct DispatcherBuilder {
    entries: Vec<Entry>,
    config: DispatchConfig,
    composite: bool,
    traced: bool,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            config: DispatchConfig::default(),
            composite: true,
            traced: false,
        }
    }

    /// Register a provider behind a native handler.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn PrimitiveProvider>) -> Self {
        self.entries.push(Entry::Provider(provider));
        self
    }

    /// Register a provider that owns a connection pool. `open` runs during
    /// [`build`](Self::build) and receives the configured pool settings.
    #[must_use]
    pub fn pooled_provider<P, F>(mut self, open: F) -> Self
    where
        P: PrimitiveProvider + 'static,
        F: FnOnce(&PoolConfig) -> Arc<P> + 'static,
    {
        self.entries.push(Entry::Pooled(Box::new(
            move |pool: &PoolConfig| -> Arc<dyn PrimitiveProvider> { open(pool) },
        )));
        self
    }

    /// Register a custom handler.
    #[must_use]
    pub fn handler(mut self, handler: Box<dyn OperationHandler>) -> Self {
        self.entries.push(Entry::Handler(handler));
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Do not append the composite copy / move handler.
    #[must_use]
    pub fn without_composite(mut self) -> Self {
        self.composite = false;
        self
    }

    /// Wrap every handler in a [`TracingLayer`].
    #[must_use]
    pub fn traced(mut self) -> Self {
        self.traced = true;
        self
    }

    /// Validate the configuration and freeze the handler list.
    ///
    /// # Errors
    ///
    /// [`OpError::InvalidArgument`] if the configuration is invalid.
    pub fn build(self) -> OpResult<Dispatcher> {
        self.config.validate()?;
        let buffer_size = self.config.buffer_size;
        let mut composite = CompositeHandler::new().with_buffer_size(buffer_size);
        let mut handlers: Vec<Box<dyn OperationHandler>> = Vec::with_capacity(self.entries.len() + 1);
        for entry in self.entries {
            let provider = match entry {
                Entry::Provider(provider) => provider,
                Entry::Pooled(open) => open(&self.config.pool),
                Entry::Handler(handler) => {
                    handlers.push(handler);
                    continue;
                }
            };
            composite.add_provider(provider.clone());
            handlers.push(Box::new(
                PrimitiveHandler::new(provider).with_buffer_size(buffer_size),
            ));
        }
        if self.composite {
            handlers.push(Box::new(composite));
        }
        if self.traced {
            handlers = handlers
                .into_iter()
                .map(|h| Box::new(h.layer(TracingLayer)) as Box<dyn OperationHandler>)
                .collect();
        }
        debug!(handlers = handlers.len(), "dispatcher built");
        Ok(Dispatcher {
            handlers,
            config: self.config,
        })
    }
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .field("composite", &self.composite)
            .field("traced", &self.traced)
            .finish()
    }
}

/// A batch request, one variant per batch operation kind.
#[derive(Debug, Clone)]
pub enum Request {
    /// Create files or directories.
    Create {
        /// Entries to create.
        targets: UriList,
        /// Creation options.
        params: CreateParams,
    },
    /// Delete entries.
    Delete {
        /// Entries or patterns to delete.
        targets: UriList,
        /// Deletion options.
        params: DeleteParams,
    },
    /// Copy sources into one target.
    Copy {
        /// Entries or patterns to copy.
        sources: UriList,
        /// Exactly one destination.
        targets: UriList,
        /// Transfer options.
        params: CopyParams,
    },
    /// Move sources into one target.
    Move {
        /// Entries or patterns to move.
        sources: UriList,
        /// Exactly one destination.
        targets: UriList,
        /// Transfer options.
        params: MoveParams,
    },
    /// List directories.
    List {
        /// Entries or patterns to list.
        targets: UriList,
        /// Listing options.
        params: ListParams,
    },
    /// Describe entries.
    Info {
        /// Entries to describe.
        targets: UriList,
    },
    /// Expand wildcard patterns.
    Resolve {
        /// Patterns to expand.
        patterns: UriList,
    },
}

impl Request {
    /// Operation kind of the request.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Delete { .. } => OperationKind::Delete,
            Self::Copy { .. } => OperationKind::Copy,
            Self::Move { .. } => OperationKind::Move,
            Self::List { .. } => OperationKind::List,
            Self::Info { .. } => OperationKind::Info,
            Self::Resolve { .. } => OperationKind::Resolve,
        }
    }
}

/// The result of a [`Request`].
#[derive(Debug)]
pub enum Response {
    /// See [`Dispatcher::create`].
    Create(CreateResult),
    /// See [`Dispatcher::delete`].
    Delete(DeleteResult),
    /// See [`Dispatcher::copy`].
    Copy(CopyResult),
    /// See [`Dispatcher::move_to`].
    Move(MoveResult),
    /// See [`Dispatcher::list`].
    List(ListResult),
    /// See [`Dispatcher::info`].
    Info(InfoResult),
    /// See [`Dispatcher::resolve`].
    Resolve(ResolveResult),
}

macro_rules! each_result {
    ($response:expr, $result:ident => $body:expr) => {
        match $response {
            Response::Create($result) => $body,
            Response::Delete($result) => $body,
            Response::Copy($result) => $body,
            Response::Move($result) => $body,
            Response::List($result) => $body,
            Response::Info($result) => $body,
            Response::Resolve($result) => $body,
        }
    };
}

impl Response {
    /// Operation kind of the response.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Delete(_) => OperationKind::Delete,
            Self::Copy(_) => OperationKind::Copy,
            Self::Move(_) => OperationKind::Move,
            Self::List(_) => OperationKind::List,
            Self::Info(_) => OperationKind::Info,
            Self::Resolve(_) => OperationKind::Resolve,
        }
    }

    /// Number of attempted items.
    pub fn total(&self) -> usize {
        each_result!(self, r => r.total())
    }

    /// Number of successful items.
    pub fn success_count(&self) -> usize {
        each_result!(self, r => r.success_count())
    }

    /// Number of failed items.
    pub fn fail_count(&self) -> usize {
        each_result!(self, r => r.fail_count())
    }

    /// No fatal error and no failed item.
    pub fn success(&self) -> bool {
        each_result!(self, r => r.success())
    }

    /// The fatal error, else the first item failure.
    pub fn first_error(&self) -> Option<&OpError> {
        each_result!(self, r => r.first_error())
    }
}

/// Routes operations to handlers and aggregates batch outcomes.
///
/// Immutable once built; share it by reference or `Arc` across threads.
pub struct Dispatcher {
    handlers: Vec<Box<dyn OperationHandler>>,
    config: DispatchConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("Dispatcher")
            .field("handlers", &names)
            .field("config", &self.config)
            .finish()
    }
}

impl Dispatcher {
    /// Start building a dispatcher.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// The configuration the dispatcher was built with.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Admissible handlers for `operation`, highest priority first.
    pub fn handlers_for(&self, operation: &Operation) -> Vec<&dyn OperationHandler> {
        let mut admissible: Vec<(i32, &dyn OperationHandler)> = self
            .handlers
            .iter()
            .filter(|h| h.can_perform(operation))
            .map(|h| (h.priority(operation), h.as_ref()))
            .collect();
        admissible.sort_by_key(|(priority, _)| Reverse(*priority));
        admissible.into_iter().map(|(_, h)| h).collect()
    }

    /// Whether any handler admits `operation`.
    pub fn can_perform(&self, operation: &Operation) -> bool {
        self.handlers.iter().any(|h| h.can_perform(operation))
    }

    /// Run one item through the admissible handlers, falling through on decline.
    fn attempt<T>(
        &self,
        operation: &Operation,
        mut call: impl FnMut(&dyn OperationHandler) -> OpResult<T>,
    ) -> OpResult<T> {
        for handler in self.handlers_for(operation) {
            match call(handler) {
                Err(err) if err.is_declined() => {
                    debug!(handler = handler.name(), %operation, "handler declined");
                }
                outcome => {
                    debug!(handler = handler.name(), %operation, ok = outcome.is_ok(), "handled");
                    return outcome;
                }
            }
        }
        Err(OpError::Unsupported {
            operation: operation.to_string(),
        })
    }

    /// Single-scheme operation for each input, or the fatal error for the first
    /// input no handler admits.
    fn admit(&self, kind: OperationKind, inputs: &UriList) -> OpResult<Vec<Operation>> {
        let multi_item = inputs.len() > 1;
        inputs
            .iter()
            .map(|uri| {
                let operation = Operation::single(kind, uri.scheme()).with_multi_item(multi_item);
                if self.can_perform(&operation) {
                    Ok(operation)
                } else {
                    Err(OpError::Unsupported {
                        operation: operation.to_string(),
                    })
                }
            })
            .collect()
    }

    /// Expand `uri` through RESOLVE when it carries wildcards.
    fn expand(&self, uri: &Uri) -> OpResult<Vec<Uri>> {
        if !uri.has_wildcards() {
            return Ok(vec![uri.clone()]);
        }
        let operation = Operation::single(OperationKind::Resolve, uri.scheme());
        self.attempt(&operation, |h| h.resolve(uri))
    }

    /// Create every target.
    ///
    /// A directory-syntax target is always created as a directory.
    pub fn create(&self, targets: &UriList, params: &CreateParams) -> CreateResult {
        let operations = match self.admit(OperationKind::Create, targets) {
            Ok(operations) => operations,
            Err(err) => return CreateResult::fatal(err),
        };
        let mut result = CreateResult::new();
        for (target, operation) in targets.iter().zip(&operations) {
            let forced;
            let params = if target.is_dir_syntax() {
                forced = params.clone().with_directory(true);
                &forced
            } else {
                params
            };
            let outcome = self.attempt(operation, |h| h.create(target, params));
            result.push(target.clone(), outcome);
        }
        result
    }

    /// Delete every target, expanding wildcards first.
    pub fn delete(&self, targets: &UriList, params: &DeleteParams) -> DeleteResult {
        let operations = match self.admit(OperationKind::Delete, targets) {
            Ok(operations) => operations,
            Err(err) => return DeleteResult::fatal(err),
        };
        let mut result = DeleteResult::new();
        for (pattern, operation) in targets.iter().zip(&operations) {
            match self.expand(pattern) {
                Ok(matches) => {
                    for target in matches {
                        let outcome = self.attempt(operation, |h| h.delete(&target, params));
                        result.push(target, outcome);
                    }
                }
                Err(err) => result.push_failure(pattern.clone(), err),
            }
        }
        result
    }

    /// List every target, expanding wildcards first.
    pub fn list(&self, targets: &UriList, params: &ListParams) -> ListResult {
        let operations = match self.admit(OperationKind::List, targets) {
            Ok(operations) => operations,
            Err(err) => return ListResult::fatal(err),
        };
        let mut result = ListResult::new();
        for (pattern, operation) in targets.iter().zip(&operations) {
            match self.expand(pattern) {
                Ok(matches) => {
                    for target in matches {
                        let outcome = self.attempt(operation, |h| h.list(&target, params));
                        result.push(target, outcome);
                    }
                }
                Err(err) => result.push_failure(pattern.clone(), err),
            }
        }
        result
    }

    /// Describe every target; a missing entry is a successful `None`.
    pub fn info(&self, targets: &UriList) -> InfoResult {
        let operations = match self.admit(OperationKind::Info, targets) {
            Ok(operations) => operations,
            Err(err) => return InfoResult::fatal(err),
        };
        let mut result = InfoResult::new();
        for (target, operation) in targets.iter().zip(&operations) {
            let outcome = self.attempt(operation, |h| h.info(target));
            result.push(target.clone(), outcome);
        }
        result
    }

    /// Expand every pattern; one entry per match, one failure per failed pattern.
    pub fn resolve(&self, patterns: &UriList) -> ResolveResult {
        let operations = match self.admit(OperationKind::Resolve, patterns) {
            Ok(operations) => operations,
            Err(err) => return ResolveResult::fatal(err),
        };
        let mut result = ResolveResult::new();
        for (pattern, operation) in patterns.iter().zip(&operations) {
            match self.attempt(operation, |h| h.resolve(pattern)) {
                Ok(matches) => {
                    for found in matches {
                        result.push_success(pattern.clone(), found);
                    }
                }
                Err(err) => result.push_failure(pattern.clone(), err),
            }
        }
        result
    }

    /// Copy every source into the single target.
    pub fn copy(&self, sources: &UriList, targets: &UriList, params: &CopyParams) -> CopyResult {
        self.transfer(OperationKind::Copy, sources, targets, params)
    }

    /// Move every source into the single target.
    pub fn move_to(&self, sources: &UriList, targets: &UriList, params: &MoveParams) -> MoveResult {
        self.transfer(OperationKind::Move, sources, targets, params)
    }

    fn single_target(&self, targets: &UriList) -> OpResult<Uri> {
        let Some(target) = targets.single() else {
            return Err(OpError::invalid_argument(format!(
                "exactly one target expected, got {}",
                targets.len()
            )));
        };
        let mut matches = self.expand(target)?;
        if matches.len() != 1 {
            return Err(OpError::invalid_argument(format!(
                "target {target} resolves to {} entries",
                matches.len()
            )));
        }
        Ok(matches.remove(0))
    }

    fn transfer(
        &self,
        kind: OperationKind,
        sources: &UriList,
        targets: &UriList,
        params: &TransferParams,
    ) -> CopyResult {
        let target = match self.single_target(targets) {
            Ok(target) => target,
            Err(err) => return CopyResult::fatal(err),
        };
        let multi_item = sources.len() > 1;
        let mut operations = Vec::with_capacity(sources.len());
        for source in sources {
            let operation =
                Operation::transfer(kind, source.scheme(), target.scheme()).with_multi_item(multi_item);
            if !self.can_perform(&operation) {
                return CopyResult::fatal(OpError::Unsupported {
                    operation: operation.to_string(),
                });
            }
            operations.push(operation);
        }

        let expanded: Vec<_> = sources.iter().map(|s| (s, self.expand(s))).collect();
        let items: usize = expanded
            .iter()
            .map(|(_, matches)| matches.as_ref().map_or(1, Vec::len))
            .sum();
        if items > 1 {
            if let Err(err) = self.check_collecting_target(&target, params) {
                return CopyResult::fatal(err);
            }
        }

        let mut result = CopyResult::new();
        for ((pattern, matches), operation) in expanded.into_iter().zip(&operations) {
            let matches = match matches {
                Ok(matches) => matches,
                Err(err) => {
                    result.push_failure(UriPair::new(pattern.clone(), target.clone()), err);
                    continue;
                }
            };
            for source in matches {
                let mut entries = CopyResult::new();
                let outcome = self.attempt(operation, |h| match kind {
                    OperationKind::Move => h.move_to(&source, &target, params, &mut entries),
                    _ => h.copy(&source, &target, params, &mut entries),
                });
                result.extend(entries);
                if let Err(err) = outcome {
                    result.push_failure(UriPair::new(source, target.clone()), err);
                }
            }
        }
        result
    }

    /// Several sources need a directory to land in.
    fn check_collecting_target(&self, target: &Uri, params: &TransferParams) -> OpResult<()> {
        match self.info_one(target)? {
            Some(info) if info.is_dir() => Ok(()),
            None if target.is_dir_syntax() && params.make_parents => Ok(()),
            _ => Err(OpError::NotADirectory {
                uri: target.clone(),
            }),
        }
    }

    fn info_one(&self, target: &Uri) -> OpResult<Option<Info>> {
        let operation = Operation::single(OperationKind::Info, target.scheme());
        self.attempt(&operation, |h| h.info(target))
    }

    /// Run a batch request.
    pub fn perform(&self, request: Request) -> Response {
        match request {
            Request::Create { targets, params } => Response::Create(self.create(&targets, &params)),
            Request::Delete { targets, params } => Response::Delete(self.delete(&targets, &params)),
            Request::Copy {
                sources,
                targets,
                params,
            } => Response::Copy(self.copy(&sources, &targets, &params)),
            Request::Move {
                sources,
                targets,
                params,
            } => Response::Move(self.move_to(&sources, &targets, &params)),
            Request::List { targets, params } => Response::List(self.list(&targets, &params)),
            Request::Info { targets } => Response::Info(self.info(&targets)),
            Request::Resolve { patterns } => Response::Resolve(self.resolve(&patterns)),
        }
    }

    /// Rename `source` to `target`, which must not exist.
    pub fn rename(&self, source: &Uri, target: &Uri) -> OpResult<Uri> {
        let operation = Operation::transfer(OperationKind::Rename, source.scheme(), target.scheme());
        self.attempt(&operation, |h| h.rename(source, target))
    }

    /// Open `source` for reading.
    pub fn read(&self, source: &Uri) -> OpResult<ReadChannel> {
        let operation = Operation::single(OperationKind::Read, source.scheme());
        self.attempt(&operation, |h| h.read(source))
    }

    /// Open `target` for writing from the start, creating it when missing.
    pub fn write(&self, target: &Uri) -> OpResult<WriteChannel> {
        self.open_for_write(OperationKind::Write, target)
    }

    /// Open `target` for appending, creating it when missing.
    pub fn append(&self, target: &Uri) -> OpResult<WriteChannel> {
        self.open_for_write(OperationKind::Append, target)
    }

    fn open_for_write(&self, kind: OperationKind, target: &Uri) -> OpResult<WriteChannel> {
        if self.info_one(target)?.is_none() {
            let create = Operation::single(OperationKind::Create, target.scheme());
            let params = CreateParams::default().with_directory(false);
            self.attempt(&create, |h| h.create(target, &params))?;
        }
        let operation = Operation::single(kind, target.scheme());
        let append = kind == OperationKind::Append;
        self.attempt(&operation, |h| h.write(target, append))
    }

    /// Local filesystem path of `target`.
    pub fn local_file(&self, target: &Uri) -> OpResult<PathBuf> {
        let operation = Operation::single(OperationKind::File, target.scheme());
        self.attempt(&operation, |h| h.local_file(target))
    }

    /// Whether `uri` exists.
    pub fn exists(&self, uri: &Uri) -> OpResult<bool> {
        Ok(self.info_one(uri)?.is_some())
    }

    /// Whether `uri` is an existing directory.
    pub fn is_dir(&self, uri: &Uri) -> OpResult<bool> {
        Ok(self.info_one(uri)?.is_some_and(|info| info.is_dir()))
    }

    /// Whether `uri` is an existing file.
    pub fn is_file(&self, uri: &Uri) -> OpResult<bool> {
        Ok(self.info_one(uri)?.is_some_and(|info| info.is_file()))
    }
}
