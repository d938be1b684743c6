//! Error types for operation dispatch, backends and pooling.

use std::io;

use crate::Uri;

/// Result alias used throughout the crate.
pub type OpResult<T> = Result<T, OpError>;

/// Coarse classification of an [`OpError`].
///
/// Callers use the kind to decide how far a failure reaches: a
/// [`Capability`](ErrorKind::Capability) error aborts a whole batch, an
/// [`Item`](ErrorKind::Item) error only concerns one entry, and
/// [`Interrupted`](ErrorKind::Interrupted) separates user cancellation from
/// genuine I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No handler can perform the requested scheme/kind combination.
    Capability,
    /// A handler declined this particular combination; try the next one.
    Declined,
    /// A backend connection could not be obtained or failed mid-use.
    Connectivity,
    /// The failure concerns one item (not found, exists, permissions, ...).
    Item,
    /// Cooperative cancellation was observed.
    Interrupted,
    /// The caller passed an invalid argument.
    InvalidArgument,
}

/// Operation error with contextual variants.
///
/// Every variant carries the location (and, where useful, the operation)
/// that failed. Uses `#[non_exhaustive]` for forward compatibility.
///
/// # Examples
///
/// ```rust
/// use anyfs_ops::{ErrorKind, OpError, Uri};
///
/// let err = OpError::NotFound { uri: Uri::parse("mem://h/missing").unwrap() };
/// assert_eq!(err.to_string(), "not found: mem://h/missing");
/// assert_eq!(err.kind(), ErrorKind::Item);
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    // Dispatch errors
    /// No registered handler can perform the operation.
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// Rendered operation descriptor, e.g. `MOVE [mem, file]`.
        operation: String,
    },

    /// The handler does not support this particular combination of inputs.
    ///
    /// This is the only signal that makes the dispatcher try the next
    /// admissible handler.
    #[error("unsupported combination for {handler}: {operation}")]
    UnsupportedCombination {
        /// Handler that declined.
        handler: String,
        /// Rendered operation descriptor.
        operation: String,
    },

    // Connectivity errors
    /// A backend connection failed.
    #[error("connection to {authority} failed: {reason}")]
    Connectivity {
        /// Authority of the connection (password redacted).
        authority: String,
        /// What went wrong.
        reason: String,
    },

    /// No connection could be borrowed within the pool bounds.
    #[error("connection pool exhausted for {authority}")]
    PoolExhausted {
        /// Authority of the exhausted pool entry.
        authority: String,
    },

    // Item errors
    /// Location does not exist.
    #[error("not found: {uri}")]
    NotFound {
        /// The missing location.
        uri: Uri,
    },

    /// Location already exists when it shouldn't.
    #[error("{operation}: already exists: {uri}")]
    AlreadyExists {
        /// The existing location.
        uri: Uri,
        /// The operation that failed.
        operation: &'static str,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {uri}")]
    NotADirectory {
        /// The offending location.
        uri: Uri,
    },

    /// Expected a file but found something else.
    #[error("not a file: {uri}")]
    NotAFile {
        /// The offending location.
        uri: Uri,
    },

    /// Directory is not empty when it should be.
    #[error("directory not empty: {uri}")]
    DirectoryNotEmpty {
        /// The non-empty directory.
        uri: Uri,
    },

    /// Permission denied for an operation.
    #[error("{operation}: permission denied: {uri}")]
    PermissionDenied {
        /// Where permission was denied.
        uri: Uri,
        /// The denied operation.
        operation: &'static str,
    },

    /// Source and target are the same entry.
    #[error("source and target are the same file: {source_uri} -> {target}")]
    SameFile {
        /// Source location.
        source_uri: Uri,
        /// Target location.
        target: Uri,
    },

    /// A directory cannot be copied or moved into its own subtree.
    #[error("cannot place {source_uri} inside its own subdirectory {target}")]
    Subdirectory {
        /// Source directory.
        source_uri: Uri,
        /// Target inside the source.
        target: Uri,
    },

    /// Cooperative cancellation was observed while processing this item.
    #[error("interrupted: {uri}")]
    Interrupted {
        /// Item being processed.
        uri: Uri,
    },

    // Argument errors
    /// Invalid argument supplied by the caller.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What is wrong with it.
        reason: String,
    },

    /// A wildcard segment could not be compiled.
    #[error("invalid pattern {pattern}: {source}")]
    InvalidPattern {
        /// The wildcard segment.
        pattern: String,
        /// Underlying globset error.
        #[source]
        source: globset::Error,
    },

    // Backend errors
    /// Generic backend error.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error with context.
    #[error("{operation} failed for {uri}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The location involved.
        uri: Uri,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl OpError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpError::Unsupported { .. } => ErrorKind::Capability,
            OpError::UnsupportedCombination { .. } => ErrorKind::Declined,
            OpError::Connectivity { .. } | OpError::PoolExhausted { .. } => {
                ErrorKind::Connectivity
            }
            OpError::Interrupted { .. } => ErrorKind::Interrupted,
            OpError::InvalidArgument { .. } | OpError::InvalidPattern { .. } => {
                ErrorKind::InvalidArgument
            }
            _ => ErrorKind::Item,
        }
    }

    /// Returns `true` for transport-level failures.
    pub fn is_connectivity(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }

    /// Returns `true` if the error is a handler's decline signal.
    pub fn is_declined(&self) -> bool {
        self.kind() == ErrorKind::Declined
    }

    /// Returns `true` if the error reports cooperative cancellation.
    pub fn is_interrupted(&self) -> bool {
        self.kind() == ErrorKind::Interrupted
    }

    /// Returns `true` if an I/O error reports that source and target sit on
    /// different devices, so a rename cannot move the data.
    pub fn is_cross_device(&self) -> bool {
        matches!(self, OpError::Io { source, .. } if source.kind() == io::ErrorKind::CrossesDevices)
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        OpError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn declined(handler: &str, operation: impl ToString) -> Self {
        OpError::UnsupportedCombination {
            handler: handler.to_owned(),
            operation: operation.to_string(),
        }
    }

    /// Convert an I/O error raised while working on `uri`.
    ///
    /// Common [`io::ErrorKind`]s map to the specific variants. An `OpError`
    /// that travelled through a channel wrapped in an `io::Error` is
    /// unwrapped unchanged.
    pub fn io(operation: &'static str, uri: &Uri, error: io::Error) -> Self {
        if error
            .get_ref()
            .is_some_and(|inner| inner.downcast_ref::<OpError>().is_some())
        {
            if let Some(inner) = error.into_inner() {
                if let Ok(op_error) = inner.downcast::<OpError>() {
                    return *op_error;
                }
            }
            return OpError::Backend(format!("{operation} failed for {uri}"));
        }
        let uri = uri.clone();
        match error.kind() {
            io::ErrorKind::NotFound => OpError::NotFound { uri },
            io::ErrorKind::PermissionDenied => OpError::PermissionDenied { uri, operation },
            io::ErrorKind::AlreadyExists => OpError::AlreadyExists { uri, operation },
            io::ErrorKind::NotADirectory => OpError::NotADirectory { uri },
            io::ErrorKind::IsADirectory => OpError::NotAFile { uri },
            io::ErrorKind::DirectoryNotEmpty => OpError::DirectoryNotEmpty { uri },
            _ => OpError::Io {
                operation,
                uri,
                source: error,
            },
        }
    }

    /// Wrap this error for transport through `std::io` traits.
    pub fn into_io(self) -> io::Error {
        io::Error::other(self)
    }
}
