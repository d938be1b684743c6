//! # Extension Traits
//!
//! Convenience methods for primitive providers.
//!
//! ## Overview
//!
//! [`ProviderExt`] provides commonly-needed utility methods that aren't part
//! of the primitive contract. They are default methods with a blanket
//! implementation, so any [`PrimitiveProvider`] (including
//! `dyn PrimitiveProvider`) gets them for free.
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`exists`](ProviderExt::exists) | Check if a location exists |
//! | [`is_file`](ProviderExt::is_file) | Check if a location is a regular file |
//! | [`is_dir`](ProviderExt::is_dir) | Check if a location is a directory |
//! | [`make_dirs`](ProviderExt::make_dirs) | Create a directory and its missing ancestors |
//! | [`read_all`](ProviderExt::read_all) | Read a whole file |
//! | [`write_all`](ProviderExt::write_all) | Replace a whole file |

use std::io::{Read, Write};

use crate::{OpError, OpResult, PrimitiveProvider, Uri};

/// Extension methods for any primitive provider.
///
/// # Example
///
/// ```rust
/// use anyfs_ops::{OpError, PrimitiveProvider, ProviderExt, Uri};
///
/// fn ensure_report(provider: &dyn PrimitiveProvider, dir: &Uri) -> Result<(), OpError> {
///     if !provider.is_dir(dir)? {
///         provider.make_dirs(dir)?;
///     }
///     provider.write_all(&dir.child("report.txt"), b"ok")
/// }
/// ```
pub trait ProviderExt: PrimitiveProvider {
    /// Check if the location exists.
    fn exists(&self, uri: &Uri) -> OpResult<bool> {
        Ok(self.info(uri)?.is_some())
    }

    /// Check if the location is a regular file.
    ///
    /// Returns `Ok(false)` if it doesn't exist.
    fn is_file(&self, uri: &Uri) -> OpResult<bool> {
        Ok(self.info(uri)?.is_some_and(|info| info.is_file()))
    }

    /// Check if the location is a directory.
    ///
    /// Returns `Ok(false)` if it doesn't exist.
    fn is_dir(&self, uri: &Uri) -> OpResult<bool> {
        Ok(self.info(uri)?.is_some_and(|info| info.is_dir()))
    }

    /// Create `uri` as a directory together with its missing ancestors.
    ///
    /// Succeeds if the directory already exists.
    ///
    /// # Errors
    ///
    /// - [`OpError::NotADirectory`] if the location or an ancestor is a file
    fn make_dirs(&self, uri: &Uri) -> OpResult<()> {
        let mut missing = Vec::new();
        let mut cursor = Some(uri.without_trailing_separator());
        while let Some(current) = cursor {
            match self.info(&current)? {
                Some(info) if info.is_dir() => break,
                Some(_) => return Err(OpError::NotADirectory { uri: current }),
                None => {
                    cursor = current.parent();
                    missing.push(current);
                }
            }
        }
        for dir in missing.iter().rev() {
            match self.make_dir(dir) {
                Ok(()) => {}
                // Lost a race with a concurrent creator.
                Err(OpError::AlreadyExists { .. }) => {
                    if !self.is_dir(dir)? {
                        return Err(OpError::NotADirectory { uri: dir.clone() });
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Read the whole file into memory.
    fn read_all(&self, uri: &Uri) -> OpResult<Vec<u8>> {
        let mut channel = self.read(uri)?;
        let mut data = Vec::new();
        channel
            .read_to_end(&mut data)
            .map_err(|e| OpError::io("read", uri, e))?;
        Ok(data)
    }

    /// Replace the file's contents with `data`, creating it if missing.
    fn write_all(&self, uri: &Uri, data: &[u8]) -> OpResult<()> {
        let mut channel = self.write(uri)?;
        channel
            .write_all(data)
            .and_then(|()| channel.flush())
            .map_err(|e| OpError::io("write", uri, e))
    }
}

// Blanket implementation - any provider gets ProviderExt for free
impl<P: PrimitiveProvider + ?Sized> ProviderExt for P {}
