//! Operation handlers: capability negotiation and per-item execution.

use std::path::PathBuf;

use crate::{
    CopyParams, CopyResult, CreateParams, DeleteParams, Info, ListParams, MoveParams, MoveResult,
    OpError, OpResult, Operation, OperationKind, ReadChannel, Uri, WriteChannel,
};

/// Priority of a handler serving its own scheme natively.
pub const TOP_PRIORITY: i32 = i32::MAX;

/// Default priority.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Priority of generic composing handlers, tried after every other one.
pub const FALLBACK_PRIORITY: i32 = i32::MIN;

/// Performs operations for the schemes it admits.
///
/// The dispatcher filters handlers by [`can_perform`](Self::can_perform),
/// orders them by descending [`priority`](Self::priority) and calls the
/// first. A handler that admitted an operation in general but cannot serve a
/// particular input returns [`OpError::UnsupportedCombination`] (the
/// *decline* signal, see [`decline`](Self::decline)); the dispatcher then
/// tries the next handler. Any other error is final for that item.
///
/// Every per-item method has a default that declines, so a handler only
/// implements the kinds it serves.
///
/// # Thread Safety
///
/// Handlers are shared by all callers of a dispatcher and must be
/// `Send + Sync`.
pub trait OperationHandler: Send + Sync {
    /// Name used in logs and decline errors.
    fn name(&self) -> &str;

    /// Returns `true` if this handler may perform `operation`.
    fn can_perform(&self, operation: &Operation) -> bool;

    /// Priority among admissible handlers; higher runs first.
    fn priority(&self, operation: &Operation) -> i32 {
        let _ = operation;
        DEFAULT_PRIORITY
    }

    /// Build the decline signal for `operation`.
    fn decline(&self, operation: &Operation) -> OpError {
        OpError::declined(self.name(), operation)
    }

    /// Create one file or directory. Returns the created location.
    fn create(&self, target: &Uri, params: &CreateParams) -> OpResult<Uri> {
        let _ = params;
        Err(self.decline(&Operation::single(
            OperationKind::Create,
            target.scheme(),
        )))
    }

    /// Delete one entry. Returns the deleted location.
    fn delete(&self, target: &Uri, params: &DeleteParams) -> OpResult<Uri> {
        let _ = params;
        Err(self.decline(&Operation::single(
            OperationKind::Delete,
            target.scheme(),
        )))
    }

    /// Copy `source` to `target`, recording one entry per created directory
    /// and per copied file in `result`.
    ///
    /// An `Err` is recorded by the caller as a failure of the whole pair. A
    /// declining handler must not record anything.
    fn copy(
        &self,
        source: &Uri,
        target: &Uri,
        params: &CopyParams,
        result: &mut CopyResult,
    ) -> OpResult<()> {
        let _ = (params, result);
        Err(self.decline(&Operation::transfer(
            OperationKind::Copy,
            source.scheme(),
            target.scheme(),
        )))
    }

    /// Move `source` to `target`; recording rules as for
    /// [`copy`](Self::copy).
    fn move_to(
        &self,
        source: &Uri,
        target: &Uri,
        params: &MoveParams,
        result: &mut MoveResult,
    ) -> OpResult<()> {
        let _ = (params, result);
        Err(self.decline(&Operation::transfer(
            OperationKind::Move,
            source.scheme(),
            target.scheme(),
        )))
    }

    /// Rename `source` to `target`. Returns the new location.
    fn rename(&self, source: &Uri, target: &Uri) -> OpResult<Uri> {
        Err(self.decline(&Operation::transfer(
            OperationKind::Rename,
            source.scheme(),
            target.scheme(),
        )))
    }

    /// List one location.
    fn list(&self, target: &Uri, params: &ListParams) -> OpResult<Vec<Info>> {
        let _ = params;
        Err(self.decline(&Operation::single(
            OperationKind::List,
            target.scheme(),
        )))
    }

    /// Snapshot of one location, `Ok(None)` if it does not exist.
    fn info(&self, target: &Uri) -> OpResult<Option<Info>> {
        Err(self.decline(&Operation::single(
            OperationKind::Info,
            target.scheme(),
        )))
    }

    /// Expand a wildcard pattern into the matching locations.
    fn resolve(&self, pattern: &Uri) -> OpResult<Vec<Uri>> {
        Err(self.decline(&Operation::single(
            OperationKind::Resolve,
            pattern.scheme(),
        )))
    }

    /// Open a file for reading.
    fn read(&self, source: &Uri) -> OpResult<ReadChannel> {
        Err(self.decline(&Operation::single(
            OperationKind::Read,
            source.scheme(),
        )))
    }

    /// Open a file for writing, or appending when `append` is set.
    fn write(&self, target: &Uri, append: bool) -> OpResult<WriteChannel> {
        let kind = if append {
            OperationKind::Append
        } else {
            OperationKind::Write
        };
        Err(self.decline(&Operation::single(kind, target.scheme())))
    }

    /// Local filesystem path of a location.
    fn local_file(&self, target: &Uri) -> OpResult<PathBuf> {
        Err(self.decline(&Operation::single(
            OperationKind::File,
            target.scheme(),
        )))
    }
}

impl<H: OperationHandler + ?Sized> OperationHandler for Box<H> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn can_perform(&self, operation: &Operation) -> bool {
        (**self).can_perform(operation)
    }
    fn priority(&self, operation: &Operation) -> i32 {
        (**self).priority(operation)
    }
    fn create(&self, target: &Uri, params: &CreateParams) -> OpResult<Uri> {
        (**self).create(target, params)
    }
    fn delete(&self, target: &Uri, params: &DeleteParams) -> OpResult<Uri> {
        (**self).delete(target, params)
    }
    fn copy(
        &self,
        source: &Uri,
        target: &Uri,
        params: &CopyParams,
        result: &mut CopyResult,
    ) -> OpResult<()> {
        (**self).copy(source, target, params, result)
    }
    fn move_to(
        &self,
        source: &Uri,
        target: &Uri,
        params: &MoveParams,
        result: &mut MoveResult,
    ) -> OpResult<()> {
        (**self).move_to(source, target, params, result)
    }
    fn rename(&self, source: &Uri, target: &Uri) -> OpResult<Uri> {
        (**self).rename(source, target)
    }
    fn list(&self, target: &Uri, params: &ListParams) -> OpResult<Vec<Info>> {
        (**self).list(target, params)
    }
    fn info(&self, target: &Uri) -> OpResult<Option<Info>> {
        (**self).info(target)
    }
    fn resolve(&self, pattern: &Uri) -> OpResult<Vec<Uri>> {
        (**self).resolve(pattern)
    }
    fn read(&self, source: &Uri) -> OpResult<ReadChannel> {
        (**self).read(source)
    }
    fn write(&self, target: &Uri, append: bool) -> OpResult<WriteChannel> {
        (**self).write(target, append)
    }
    fn local_file(&self, target: &Uri) -> OpResult<PathBuf> {
        (**self).local_file(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct InfoOnly;

    impl OperationHandler for InfoOnly {
        fn name(&self) -> &str {
            "info-only"
        }

        fn can_perform(&self, operation: &Operation) -> bool {
            operation.kind() == OperationKind::Info
        }

        fn info(&self, _: &Uri) -> OpResult<Option<Info>> {
            Ok(None)
        }
    }

    #[test]
    fn handler_is_object_safe() {
        fn _check(_: &dyn OperationHandler) {}
        let boxed: Box<dyn OperationHandler> = Box::new(InfoOnly);
        _check(&boxed);
    }

    #[test]
    fn unimplemented_kinds_decline() {
        let uri = Uri::parse("mem://h/a").unwrap();
        assert!(InfoOnly.info(&uri).unwrap().is_none());
        let err = InfoOnly.list(&uri, &ListParams::default()).unwrap_err();
        assert!(err.is_declined());
        assert_eq!(
            err.to_string(),
            "unsupported combination for info-only: LIST [mem]"
        );
        let mut result = CopyResult::new();
        assert!(
            InfoOnly
                .copy(&uri, &uri, &CopyParams::default(), &mut result)
                .unwrap_err()
                .is_declined()
        );
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(TOP_PRIORITY > DEFAULT_PRIORITY);
        assert!(DEFAULT_PRIORITY > FALLBACK_PRIORITY);
        let op = Operation::single(OperationKind::Info, "mem");
        assert_eq!(InfoOnly.priority(&op), DEFAULT_PRIORITY);
    }
}
