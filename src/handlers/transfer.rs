//! Copy and move algorithms shared by the native and composite handlers.
//!
//! A [`Transfer`] moves data from a source provider to a target provider.
//! When both sides are the same backend connection target (`native`), the
//! provider's own copy, move and rename primitives are used where its
//! [`Capabilities`](crate::Capabilities) allow; otherwise bytes are streamed
//! through [`pump`](crate::pump).
//!
//! Outcomes go into a [`CopyResult`]: one entry per copied or moved file and
//! one per directory created (copy) or removed (move).

use tracing::{debug, warn};

use crate::{
    CopyResult, Info, OpError, OpResult, PrimitiveProvider, ProviderExt, TransferParams, Uri,
    UriPair, pump,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferKind {
    Copy,
    Move,
}

pub(crate) struct Transfer<'a> {
    source: &'a dyn PrimitiveProvider,
    target: &'a dyn PrimitiveProvider,
    native: bool,
    buffer_size: usize,
}

impl<'a> Transfer<'a> {
    /// Transfer within one provider and authority.
    pub(crate) fn native(provider: &'a dyn PrimitiveProvider, buffer_size: usize) -> Self {
        Self {
            source: provider,
            target: provider,
            native: true,
            buffer_size,
        }
    }

    /// Streaming transfer between two providers (or two authorities).
    pub(crate) fn between(
        source: &'a dyn PrimitiveProvider,
        target: &'a dyn PrimitiveProvider,
        buffer_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            native: false,
            buffer_size,
        }
    }

    /// Transfer `source` to `target`, recording entries in `result`.
    ///
    /// Errors that concern the pair as a whole (missing source, same file,
    /// bad target) are returned; everything after target resolution is
    /// recorded per entry.
    pub(crate) fn run(
        &self,
        kind: TransferKind,
        source: &Uri,
        target: &Uri,
        params: &TransferParams,
        result: &mut CopyResult,
    ) -> OpResult<()> {
        params.cancel.check(source)?;
        if source.is_root() {
            return Err(OpError::invalid_argument(format!(
                "cannot transfer a backend root: {source}"
            )));
        }
        let Some(source_info) = self.source.info(source)? else {
            return Err(OpError::NotFound {
                uri: source.clone(),
            });
        };
        if !source_info.is_dir() && source.is_dir_syntax() {
            return Err(OpError::NotADirectory {
                uri: source.clone(),
            });
        }

        let dest = self.destination(source, &source_info, target, params)?;
        if source.same_location(&dest) {
            return Err(OpError::SameFile {
                source_uri: source.clone(),
                target: dest,
            });
        }

        if source_info.is_dir() {
            if dest.is_within(source) {
                return Err(OpError::Subdirectory {
                    source_uri: source.clone(),
                    target: dest,
                });
            }
            if kind == TransferKind::Copy && !params.recursive {
                return Err(OpError::NotAFile {
                    uri: source.clone(),
                });
            }
            self.directory(kind, source, &dest, params, result);
        } else {
            let outcome = self.file(kind, source, &source_info, &dest, params);
            result.push(UriPair::new(source.clone(), dest), outcome);
        }
        Ok(())
    }

    /// Move `source` to exactly `target`, which must not exist yet.
    ///
    /// A native transfer tries the provider's rename first; anything else
    /// is a recursive move whose first failed entry is the error.
    pub(crate) fn rename(&self, source: &Uri, target: &Uri) -> OpResult<Uri> {
        if self.target.info(target)?.is_some() {
            return Err(OpError::AlreadyExists {
                uri: target.clone(),
                operation: "rename",
            });
        }
        if self.native {
            if let Some(renamed) = self.source.rename_to(source, target)? {
                return Ok(renamed);
            }
        }
        let mut result = CopyResult::new();
        let params = TransferParams::default().with_recursive(true);
        self.run(TransferKind::Move, source, target, &params, &mut result)?;
        let (_, outcomes, _) = result.into_parts();
        match outcomes.into_iter().find_map(Result::err) {
            Some(err) => Err(err),
            None => Ok(target.clone()),
        }
    }

    /// Where `source` ends up when sent to `target`.
    fn destination(
        &self,
        source: &Uri,
        source_info: &Info,
        target: &Uri,
        params: &TransferParams,
    ) -> OpResult<Uri> {
        match self.target.info(target)? {
            Some(info) if info.is_dir() => Ok(target.child(source.name())),
            Some(_) if target.is_dir_syntax() || source_info.is_dir() => {
                Err(OpError::NotADirectory {
                    uri: target.clone(),
                })
            }
            Some(_) => Ok(target.clone()),
            None if target.is_dir_syntax() => {
                if params.make_parents {
                    Ok(target.child(source.name()))
                } else {
                    Err(OpError::NotFound {
                        uri: target.clone(),
                    })
                }
            }
            None => Ok(target.clone()),
        }
    }

    fn file(
        &self,
        kind: TransferKind,
        source: &Uri,
        source_info: &Info,
        dest: &Uri,
        params: &TransferParams,
    ) -> OpResult<Uri> {
        params.cancel.check(source)?;
        match self.target.info(dest)? {
            Some(existing) if existing.is_dir() => {
                return Err(OpError::NotAFile { uri: dest.clone() });
            }
            Some(existing) => {
                if params.no_overwrite {
                    debug!(uri = %dest, "target exists, left untouched");
                    return Ok(dest.clone());
                }
                if params.update && !is_newer(source_info, &existing) {
                    debug!(uri = %dest, "target is up to date");
                    return Ok(dest.clone());
                }
            }
            None => {
                if params.make_parents {
                    if let Some(parent) = dest.parent() {
                        self.target.make_dirs(&parent)?;
                    }
                }
            }
        }

        if self.native {
            let capabilities = self.source.capabilities();
            match kind {
                TransferKind::Move if capabilities.native_move => {
                    match self.source.move_file(source, dest) {
                        Ok(()) => return Ok(dest.clone()),
                        Err(err) if err.is_cross_device() => {
                            debug!(uri = %source, "rename crosses devices, copying instead");
                        }
                        Err(err) => return Err(err),
                    }
                }
                TransferKind::Move => {
                    if let Some(moved) = self.source.rename_to(source, dest)? {
                        return Ok(moved);
                    }
                }
                TransferKind::Copy if capabilities.native_copy => {
                    self.source.copy_file(source, dest)?;
                    return Ok(dest.clone());
                }
                TransferKind::Copy => {}
            }
        }

        let written = self.stream(source, dest, params)?;
        if kind == TransferKind::Move {
            self.verify(dest, written)?;
            self.source.delete_file(source)?;
        }
        Ok(dest.clone())
    }

    /// Copy or move a directory tree. Returns `true` if every entry
    /// succeeded.
    fn directory(
        &self,
        kind: TransferKind,
        source: &Uri,
        dest: &Uri,
        params: &TransferParams,
        result: &mut CopyResult,
    ) -> bool {
        let pair = || UriPair::new(source.clone(), dest.clone());
        if let Err(err) = params.cancel.check(source) {
            result.push_failure(pair(), err);
            return false;
        }

        if kind == TransferKind::Move {
            let occupied = match self.target.info(dest) {
                Ok(Some(info)) if info.is_dir() => {
                    self.target.list(dest).map(|entries| !entries.is_empty())
                }
                Ok(_) => Ok(false),
                Err(err) => Err(err),
            };
            let refused = match occupied {
                Ok(false) => None,
                Ok(true) => Some(OpError::DirectoryNotEmpty { uri: dest.clone() }),
                Err(err) => Some(err),
            };
            if let Some(err) = refused {
                result.push_failure(pair(), err);
                return false;
            }
        }

        if kind == TransferKind::Move && self.native {
            if let Some(outcome) = self.native_directory_move(source, dest, params) {
                let moved = outcome.is_ok();
                result.push(pair(), outcome);
                return moved;
            }
        }

        let prepared = match self.target.info(dest) {
            Ok(Some(info)) if info.is_dir() => Ok(false),
            Ok(Some(_)) => Err(OpError::NotADirectory { uri: dest.clone() }),
            Ok(None) if params.make_parents => self.target.make_dirs(dest).map(|()| true),
            Ok(None) => self.target.make_dir(dest).map(|()| true),
            Err(err) => Err(err),
        };
        match prepared {
            Ok(true) if kind == TransferKind::Copy => result.push_success(pair(), dest.clone()),
            Ok(_) => {}
            Err(err) => {
                result.push_failure(pair(), err);
                return false;
            }
        }

        let children = match self.source.list(source) {
            Ok(children) => children,
            Err(err) => {
                result.push_failure(pair(), err);
                return false;
            }
        };

        let mut complete = true;
        for child in children {
            if params.cancel.is_cancelled() {
                result.push_failure(
                    pair(),
                    OpError::Interrupted {
                        uri: source.clone(),
                    },
                );
                return false;
            }
            let child_dest = dest.child(&child.name);
            if child.is_dir() {
                complete &= self.directory(kind, &child.uri, &child_dest, params, result);
            } else {
                let outcome = self.file(kind, &child.uri, &child, &child_dest, params);
                complete &= outcome.is_ok();
                result.push(UriPair::new(child.uri.clone(), child_dest), outcome);
            }
        }

        if kind == TransferKind::Move {
            let outcome = if complete {
                self.source.remove_dir(source).map(|()| dest.clone())
            } else {
                Err(OpError::DirectoryNotEmpty {
                    uri: source.clone(),
                })
            };
            complete &= outcome.is_ok();
            result.push(pair(), outcome);
        }
        complete
    }

    /// Move a whole directory with one backend call. `None` when the backend
    /// cannot (no primitive, or a rename across devices), or the target is
    /// an existing empty directory to be filled entry by entry.
    fn native_directory_move(
        &self,
        source: &Uri,
        dest: &Uri,
        params: &TransferParams,
    ) -> Option<OpResult<Uri>> {
        match self.target.info(dest) {
            Ok(None) => {}
            Ok(Some(_)) => return None,
            Err(err) => return Some(Err(err)),
        }
        if params.make_parents {
            if let Some(parent) = dest.parent() {
                if let Err(err) = self.target.make_dirs(&parent) {
                    return Some(Err(err));
                }
            }
        }
        if self.source.capabilities().native_move {
            return match self.source.move_file(source, dest) {
                Ok(()) => Some(Ok(dest.clone())),
                Err(err) if err.is_cross_device() => {
                    debug!(uri = %source, "rename crosses devices, copying the tree instead");
                    None
                }
                Err(err) => Some(Err(err)),
            };
        }
        self.source.rename_to(source, dest).transpose()
    }

    fn stream(&self, source: &Uri, dest: &Uri, params: &TransferParams) -> OpResult<u64> {
        let mut reader = self.source.read(source)?;
        let mut writer = self.target.write(dest)?;
        let copied = pump(
            &mut reader,
            &mut writer,
            self.buffer_size,
            &params.cancel,
            source,
            dest,
        );
        // Channels are closed before any cleanup touches the target.
        drop(writer);
        drop(reader);
        copied.inspect_err(|err| self.discard_partial(dest, err))
    }

    fn verify(&self, dest: &Uri, written: u64) -> OpResult<()> {
        let found = self.target.info(dest)?.map(|info| info.size);
        if found == Some(written) {
            return Ok(());
        }
        let err = OpError::Backend(format!(
            "size check failed for {dest}: wrote {written} bytes, found {found:?}"
        ));
        self.discard_partial(dest, &err);
        Err(err)
    }

    fn discard_partial(&self, dest: &Uri, cause: &OpError) {
        match self.target.delete_file(dest) {
            Ok(()) | Err(OpError::NotFound { .. }) => {
                debug!(uri = %dest, %cause, "removed partial target");
            }
            Err(cleanup) => {
                warn!(uri = %dest, %cause, error = %cleanup, "could not remove partial target");
            }
        }
    }
}

fn is_newer(source: &Info, target: &Info) -> bool {
    match (source.modified, target.modified) {
        (Some(source), Some(target)) => source > target,
        _ => true,
    }
}
