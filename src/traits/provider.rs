//! Primitive, single-URI operations of one backend.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::{Info, OpError, OpResult, Uri};

/// Readable byte channel. Dropping it releases the backend resources.
pub type ReadChannel = Box<dyn Read + Send>;

/// Writable byte channel. Dropping it releases the backend resources; callers
/// flush before dropping to observe write errors.
pub type WriteChannel = Box<dyn Write + Send>;

/// Optional abilities of a [`PrimitiveProvider`].
///
/// Handlers consult these flags before calling the optional primitives and
/// fall back to streaming composites when a flag is off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// [`copy_file`](PrimitiveProvider::copy_file) is implemented.
    pub native_copy: bool,
    /// [`move_file`](PrimitiveProvider::move_file) is implemented.
    pub native_move: bool,
    /// [`local_path`](PrimitiveProvider::local_path) can return paths.
    pub local_paths: bool,
    /// [`set_last_modified`](PrimitiveProvider::set_last_modified) is implemented.
    pub set_last_modified: bool,
}

/// Atomic operations on one backend, addressed by a single [`Uri`] (or a
/// source/target pair within the backend).
///
/// A provider knows nothing about batches, wildcards or fallback; those live
/// in the handlers. Paths are handed over as given, and providers ignore a
/// trailing separator.
///
/// Every failure is reported as an [`OpError`]. Nothing is swallowed.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; methods take `&self`.
///
/// # Object Safety
///
/// This trait is object-safe and is used as `Arc<dyn PrimitiveProvider>`.
pub trait PrimitiveProvider: Send + Sync {
    /// Lower-case scheme served by this provider.
    fn scheme(&self) -> &str;

    /// Optional abilities. Defaults to none.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Create an empty file. The parent must exist.
    ///
    /// # Errors
    ///
    /// - [`OpError::AlreadyExists`] if the entry exists
    /// - [`OpError::NotFound`] if the parent does not exist
    fn create_file(&self, uri: &Uri) -> OpResult<()>;

    /// Create one directory. The parent must exist.
    ///
    /// # Errors
    ///
    /// - [`OpError::AlreadyExists`] if the entry exists
    /// - [`OpError::NotFound`] if the parent does not exist
    fn make_dir(&self, uri: &Uri) -> OpResult<()>;

    /// Delete a file.
    ///
    /// # Errors
    ///
    /// - [`OpError::NotFound`] if the entry does not exist
    /// - [`OpError::NotAFile`] if the entry is a directory
    fn delete_file(&self, uri: &Uri) -> OpResult<()>;

    /// Remove an empty directory.
    ///
    /// # Errors
    ///
    /// - [`OpError::NotFound`] if the entry does not exist
    /// - [`OpError::NotADirectory`] if the entry is a file
    /// - [`OpError::DirectoryNotEmpty`] if it still has children
    fn remove_dir(&self, uri: &Uri) -> OpResult<()>;

    /// Copy a file within the backend, replacing an existing target file.
    /// Returns the number of bytes copied.
    ///
    /// Only called when [`Capabilities::native_copy`] is set.
    fn copy_file(&self, source: &Uri, target: &Uri) -> OpResult<u64> {
        let _ = target;
        Err(unsupported(self.scheme(), "native copy", source))
    }

    /// Move a file or directory within the backend. An existing target file
    /// is replaced.
    ///
    /// Only called when [`Capabilities::native_move`] is set.
    fn move_file(&self, source: &Uri, target: &Uri) -> OpResult<()> {
        let _ = target;
        Err(unsupported(self.scheme(), "native move", source))
    }

    /// Rename within the backend. `Ok(None)` means the backend cannot rename
    /// and the caller falls back to a composite move.
    fn rename_to(&self, source: &Uri, target: &Uri) -> OpResult<Option<Uri>> {
        let _ = (source, target);
        Ok(None)
    }

    /// Open a file for reading.
    ///
    /// # Errors
    ///
    /// - [`OpError::NotFound`] if the file does not exist
    /// - [`OpError::NotAFile`] if the entry is a directory
    fn read(&self, uri: &Uri) -> OpResult<ReadChannel>;

    /// Open a file for writing, creating it or truncating it. The parent must
    /// exist.
    fn write(&self, uri: &Uri) -> OpResult<WriteChannel>;

    /// Open a file for appending, creating it if missing. The parent must
    /// exist.
    fn append(&self, uri: &Uri) -> OpResult<WriteChannel>;

    /// Snapshot of an entry, `Ok(None)` if it does not exist.
    fn info(&self, uri: &Uri) -> OpResult<Option<Info>>;

    /// Immediate children of a directory, sorted by name.
    ///
    /// # Errors
    ///
    /// - [`OpError::NotFound`] if the directory does not exist
    /// - [`OpError::NotADirectory`] if the entry is a file
    fn list(&self, uri: &Uri) -> OpResult<Vec<Info>>;

    /// Set the modification time of an entry.
    ///
    /// Only called when [`Capabilities::set_last_modified`] is set.
    fn set_last_modified(&self, uri: &Uri, modified: SystemTime) -> OpResult<()> {
        let _ = modified;
        Err(unsupported(self.scheme(), "set last modified", uri))
    }

    /// Local filesystem path of an entry, if the backend has one.
    fn local_path(&self, uri: &Uri) -> OpResult<Option<PathBuf>> {
        let _ = uri;
        Ok(None)
    }
}

fn unsupported(scheme: &str, what: &str, uri: &Uri) -> OpError {
    OpError::Unsupported {
        operation: format!("{what} [{scheme}] for {uri}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl PrimitiveProvider for Bare {
        fn scheme(&self) -> &str {
            "bare"
        }
        fn create_file(&self, _: &Uri) -> OpResult<()> {
            Ok(())
        }
        fn make_dir(&self, _: &Uri) -> OpResult<()> {
            Ok(())
        }
        fn delete_file(&self, _: &Uri) -> OpResult<()> {
            Ok(())
        }
        fn remove_dir(&self, _: &Uri) -> OpResult<()> {
            Ok(())
        }
        fn read(&self, _: &Uri) -> OpResult<ReadChannel> {
            Ok(Box::new(std::io::empty()))
        }
        fn write(&self, _: &Uri) -> OpResult<WriteChannel> {
            Ok(Box::new(std::io::sink()))
        }
        fn append(&self, _: &Uri) -> OpResult<WriteChannel> {
            Ok(Box::new(std::io::sink()))
        }
        fn info(&self, _: &Uri) -> OpResult<Option<Info>> {
            Ok(None)
        }
        fn list(&self, _: &Uri) -> OpResult<Vec<Info>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn provider_is_object_safe() {
        fn _check(_: &dyn PrimitiveProvider) {}
        let provider: std::sync::Arc<dyn PrimitiveProvider> = std::sync::Arc::new(Bare);
        _check(provider.as_ref());
    }

    #[test]
    fn optional_primitives_default_to_unsupported() {
        let uri = Uri::parse("bare://h/a").unwrap();
        let other = Uri::parse("bare://h/b").unwrap();
        assert_eq!(Bare.capabilities(), Capabilities::default());
        assert!(matches!(
            Bare.copy_file(&uri, &other),
            Err(OpError::Unsupported { .. })
        ));
        assert!(matches!(
            Bare.move_file(&uri, &other),
            Err(OpError::Unsupported { .. })
        ));
        assert!(Bare.rename_to(&uri, &other).unwrap().is_none());
        assert!(Bare.local_path(&uri).unwrap().is_none());
    }
}
