//! Native handler: one provider, its own scheme, top priority.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::transfer::{Transfer, TransferKind};
use crate::{
    CopyParams, CopyResult, CreateParams, DEFAULT_BUFFER_SIZE, DeleteParams, Info, ListParams,
    MoveParams, MoveResult, OpError, OpResult, Operation, OperationHandler, OperationKind,
    PrimitiveProvider, ProviderExt, ReadChannel, TOP_PRIORITY, TransferParams, Uri, WriteChannel,
    resolve_with,
};

/// Serves every operation kind for the scheme of one [`PrimitiveProvider`].
///
/// Copy, move and rename are admitted when both schemes are the provider's,
/// but a transfer between two different authorities is declined so that a
/// composing handler can stream it instead.
pub struct PrimitiveHandler {
    provider: Arc<dyn PrimitiveProvider>,
    name: String,
    buffer_size: usize,
}

impl PrimitiveHandler {
    /// Handler for `provider`.
    pub fn new(provider: Arc<dyn PrimitiveProvider>) -> Self {
        let name = format!("primitive:{}", provider.scheme());
        Self {
            provider,
            name,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Use `buffer_size` for streamed transfers.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn PrimitiveProvider> {
        &self.provider
    }

    fn transfer(
        &self,
        kind: TransferKind,
        source: &Uri,
        target: &Uri,
        params: &TransferParams,
        result: &mut CopyResult,
    ) -> OpResult<()> {
        if source.authority() != target.authority() {
            let operation_kind = match kind {
                TransferKind::Copy => OperationKind::Copy,
                TransferKind::Move => OperationKind::Move,
            };
            return Err(self.decline(&Operation::transfer(
                operation_kind,
                source.scheme(),
                target.scheme(),
            )));
        }
        Transfer::native(self.provider.as_ref(), self.buffer_size)
            .run(kind, source, target, params, result)
    }

    /// Collect the subtree below `dir` depth-first, children before parents.
    fn collect_subtree(&self, dir: &Uri, params: &DeleteParams, out: &mut Vec<Info>) -> OpResult<()> {
        for child in self.provider.list(dir)? {
            params.cancel.check(&child.uri)?;
            if child.is_dir() {
                self.collect_subtree(&child.uri, params, out)?;
            }
            out.push(child);
        }
        Ok(())
    }

    fn collect_listing(&self, dir: &Uri, recursive: bool, out: &mut Vec<Info>) -> OpResult<()> {
        for child in self.provider.list(dir)? {
            let descend = recursive && child.is_dir();
            let uri = child.uri.clone();
            out.push(child);
            if descend {
                self.collect_listing(&uri, true, out)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PrimitiveHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveHandler")
            .field("name", &self.name)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl OperationHandler for PrimitiveHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_perform(&self, operation: &Operation) -> bool {
        if !operation.all_schemes_are(self.provider.scheme()) {
            return false;
        }
        match operation.kind() {
            OperationKind::File => self.provider.capabilities().local_paths,
            _ => true,
        }
    }

    fn priority(&self, _operation: &Operation) -> i32 {
        TOP_PRIORITY
    }

    fn create(&self, target: &Uri, params: &CreateParams) -> OpResult<Uri> {
        let directory = params
            .directory
            .or_else(|| target.is_dir_syntax().then_some(true));
        match self.provider.info(target)? {
            Some(existing) => {
                match directory {
                    Some(true) if !existing.is_dir() => {
                        return Err(OpError::NotADirectory {
                            uri: target.clone(),
                        });
                    }
                    Some(false) if existing.is_dir() => {
                        return Err(OpError::NotAFile {
                            uri: target.clone(),
                        });
                    }
                    _ => {}
                }
                if params.no_overwrite && existing.is_file() {
                    return Err(OpError::AlreadyExists {
                        uri: target.clone(),
                        operation: "create",
                    });
                }
                debug!(uri = %target, "create: entry already exists");
            }
            None => {
                if params.make_parents {
                    if let Some(parent) = target.parent() {
                        self.provider.make_dirs(&parent)?;
                    }
                }
                if directory == Some(true) {
                    self.provider.make_dir(target)?;
                } else {
                    self.provider.create_file(target)?;
                }
            }
        }
        if let Some(modified) = params.last_modified {
            self.provider.set_last_modified(target, modified)?;
        }
        Ok(target.clone())
    }

    fn delete(&self, target: &Uri, params: &DeleteParams) -> OpResult<Uri> {
        params.cancel.check(target)?;
        let Some(info) = self.provider.info(target)? else {
            return Err(OpError::NotFound {
                uri: target.clone(),
            });
        };
        if !info.is_dir() {
            if target.is_dir_syntax() {
                return Err(OpError::NotADirectory {
                    uri: target.clone(),
                });
            }
            self.provider.delete_file(target)?;
            return Ok(target.clone());
        }
        if target.is_root() {
            return Err(OpError::PermissionDenied {
                uri: target.clone(),
                operation: "delete",
            });
        }
        if params.recursive {
            let mut subtree = Vec::new();
            self.collect_subtree(target, params, &mut subtree)?;
            for entry in &subtree {
                params.cancel.check(&entry.uri)?;
                if entry.is_dir() {
                    self.provider.remove_dir(&entry.uri)?;
                } else {
                    self.provider.delete_file(&entry.uri)?;
                }
            }
        }
        self.provider.remove_dir(target)?;
        Ok(target.clone())
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
        if source.authority() != target.authority() {
            return Err(self.decline(&Operation::transfer(
                OperationKind::Rename,
                source.scheme(),
                target.scheme(),
            )));
        }
        Transfer::native(self.provider.as_ref(), self.buffer_size).rename(source, target)
    }

    fn list(&self, target: &Uri, params: &ListParams) -> OpResult<Vec<Info>> {
        let Some(info) = self.provider.info(target)? else {
            return Err(OpError::NotFound {
                uri: target.clone(),
            });
        };
        if !info.is_dir() {
            if target.is_dir_syntax() {
                return Err(OpError::NotADirectory {
                    uri: target.clone(),
                });
            }
            return Ok(vec![info]);
        }
        if !params.list_directory_contents {
            return Ok(vec![info]);
        }
        let mut listing = Vec::new();
        self.collect_listing(target, params.recursive, &mut listing)?;
        Ok(listing)
    }

    fn info(&self, target: &Uri) -> OpResult<Option<Info>> {
        self.provider.info(target)
    }

    fn resolve(&self, pattern: &Uri) -> OpResult<Vec<Uri>> {
        resolve_with(self.provider.as_ref(), pattern)
    }

    fn read(&self, source: &Uri) -> OpResult<ReadChannel> {
        self.provider.read(source)
    }

    fn write(&self, target: &Uri, append: bool) -> OpResult<WriteChannel> {
        if append {
            self.provider.append(target)
        } else {
            self.provider.write(target)
        }
    }

    fn local_file(&self, target: &Uri) -> OpResult<PathBuf> {
        self.provider
            .local_path(target)?
            .ok_or_else(|| OpError::Unsupported {
                operation: format!("local file for {target}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FALLBACK_PRIORITY, MemoryProvider};

    fn uri(s: &str) -> Uri {
        Uri::parse(s).unwrap()
    }

    fn handler() -> (Arc<MemoryProvider>, PrimitiveHandler) {
        let provider = Arc::new(MemoryProvider::standalone());
        let handler = PrimitiveHandler::new(provider.clone());
        (provider, handler)
    }

    #[test]
    fn admits_only_its_scheme() {
        let (_, h) = handler();
        assert!(h.can_perform(&Operation::single(OperationKind::List, "mem")));
        assert!(h.can_perform(&Operation::transfer(OperationKind::Move, "mem", "mem")));
        assert!(!h.can_perform(&Operation::transfer(OperationKind::Move, "mem", "file")));
        // memory provider has no local paths
        assert!(!h.can_perform(&Operation::single(OperationKind::File, "mem")));
        let op = Operation::single(OperationKind::Info, "mem");
        assert!(h.priority(&op) > FALLBACK_PRIORITY);
    }

    #[test]
    fn declines_transfer_between_authorities() {
        let (p, h) = handler();
        p.write_all(&uri("mem://a/f"), b"x").unwrap();
        let mut result = MoveResult::new();
        let err = h
            .move_to(
                &uri("mem://a/f"),
                &uri("mem://b/f"),
                &MoveParams::default(),
                &mut result,
            )
            .unwrap_err();
        assert!(err.is_declined());
        assert_eq!(result.total(), 0);
        assert!(p.exists(&uri("mem://a/f")).unwrap());
    }

    #[test]
    fn create_is_idempotent_for_matching_type() {
        let (p, h) = handler();
        let dir = uri("mem://h/d/");
        h.create(&dir, &CreateParams::default()).unwrap();
        h.create(&dir, &CreateParams::default()).unwrap();
        assert!(p.is_dir(&dir).unwrap());
        let err = h
            .create(&uri("mem://h/d"), &CreateParams::default().with_directory(false))
            .unwrap_err();
        assert!(matches!(err, OpError::NotAFile { .. }));
    }

    #[test]
    fn create_file_with_parents_and_time() {
        let (p, h) = handler();
        let file = uri("mem://h/x/y/z.txt");
        let when = std::time::SystemTime::UNIX_EPOCH;
        h.create(
            &file,
            &CreateParams::default()
                .with_make_parents(true)
                .with_last_modified(when),
        )
        .unwrap();
        let info = p.info(&file).unwrap().unwrap();
        assert!(info.is_file());
        assert_eq!(info.modified, Some(when));
        assert!(matches!(
            h.create(&file, &CreateParams::default().with_no_overwrite(true)),
            Err(OpError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn recursive_delete_removes_subtree() {
        let (p, h) = handler();
        p.make_dirs(&uri("mem://h/t/a/b")).unwrap();
        p.write_all(&uri("mem://h/t/a/b/f"), b"1").unwrap();
        p.write_all(&uri("mem://h/t/g"), b"2").unwrap();
        let err = h
            .delete(&uri("mem://h/t"), &DeleteParams::default())
            .unwrap_err();
        assert!(matches!(err, OpError::DirectoryNotEmpty { .. }));
        h.delete(&uri("mem://h/t"), &DeleteParams::default().with_recursive(true))
            .unwrap();
        assert!(!p.exists(&uri("mem://h/t")).unwrap());
    }

    #[test]
    fn delete_file_with_directory_syntax_fails() {
        let (p, h) = handler();
        p.write_all(&uri("mem://h/f"), b"1").unwrap();
        assert!(matches!(
            h.delete(&uri("mem://h/f/"), &DeleteParams::default()),
            Err(OpError::NotADirectory { .. })
        ));
    }

    #[test]
    fn list_variants() {
        let (p, h) = handler();
        p.make_dirs(&uri("mem://h/d/sub")).unwrap();
        p.write_all(&uri("mem://h/d/a"), b"1").unwrap();
        p.write_all(&uri("mem://h/d/sub/b"), b"2").unwrap();

        let flat = h.list(&uri("mem://h/d"), &ListParams::default()).unwrap();
        assert_eq!(flat.len(), 2);
        let deep = h
            .list(&uri("mem://h/d"), &ListParams::default().with_recursive(true))
            .unwrap();
        let paths: Vec<_> = deep.iter().map(|i| i.uri.path().to_owned()).collect();
        assert_eq!(paths, ["/d/a", "/d/sub", "/d/sub/b"]);
        let itself = h
            .list(
                &uri("mem://h/d"),
                &ListParams::default().with_directory_contents(false),
            )
            .unwrap();
        assert_eq!(itself.len(), 1);
        assert!(itself[0].is_dir());
        let file = h.list(&uri("mem://h/d/a"), &ListParams::default()).unwrap();
        assert_eq!(file[0].name, "a");
        assert!(matches!(
            h.list(&uri("mem://h/none"), &ListParams::default()),
            Err(OpError::NotFound { .. })
        ));
    }

    #[test]
    fn rename_refuses_existing_target() {
        let (p, h) = handler();
        p.write_all(&uri("mem://h/a"), b"1").unwrap();
        p.write_all(&uri("mem://h/b"), b"2").unwrap();
        assert!(matches!(
            h.rename(&uri("mem://h/a"), &uri("mem://h/b")),
            Err(OpError::AlreadyExists { .. })
        ));
        let renamed = h.rename(&uri("mem://h/a"), &uri("mem://h/c")).unwrap();
        assert_eq!(renamed.path(), "/c");
        assert!(!p.exists(&uri("mem://h/a")).unwrap());
    }

    #[test]
    fn local_file_unsupported_for_memory() {
        let (_, h) = handler();
        assert!(matches!(
            h.local_file(&uri("mem://h/x")),
            Err(OpError::Unsupported { .. })
        ));
    }
}
