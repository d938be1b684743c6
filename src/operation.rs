//! Operation descriptors used for capability negotiation.

use std::fmt;

use crate::{OpError, OpResult};

/// Kind of file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperationKind {
    /// Create a file or directory.
    Create,
    /// Delete a file or directory.
    Delete,
    /// Copy source to target.
    Copy,
    /// Move source to target.
    Move,
    /// List directory contents.
    List,
    /// Stat a single entry.
    Info,
    /// Expand wildcards.
    Resolve,
    /// Open for reading.
    Read,
    /// Open for writing (truncate).
    Write,
    /// Open for appending.
    Append,
    /// Rename within one backend.
    Rename,
    /// Obtain a local filesystem path.
    File,
}

impl OperationKind {
    /// Number of scheme slots this kind carries.
    pub const fn arity(self) -> usize {
        match self {
            OperationKind::Copy | OperationKind::Move | OperationKind::Rename => 2,
            _ => 1,
        }
    }

    /// Upper-case name, e.g. `COPY`.
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Copy => "COPY",
            OperationKind::Move => "MOVE",
            OperationKind::List => "LIST",
            OperationKind::Info => "INFO",
            OperationKind::Resolve => "RESOLVE",
            OperationKind::Read => "READ",
            OperationKind::Write => "WRITE",
            OperationKind::Append => "APPEND",
            OperationKind::Rename => "RENAME",
            OperationKind::File => "FILE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable descriptor of a requested operation: its kind and the schemes
/// of its inputs.
///
/// Handlers decide admissibility from this value alone, before any item is
/// touched.
///
/// # Examples
///
/// ```rust
/// use anyfs_ops::{Operation, OperationKind};
///
/// let op = Operation::transfer(OperationKind::Move, "MEM", "file");
/// assert_eq!(op.source_scheme(), "mem");
/// assert_eq!(op.target_scheme(), "file");
/// assert_eq!(op.to_string(), "MOVE [mem, file]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operation {
    kind: OperationKind,
    schemes: Vec<String>,
    multi_item: bool,
}

impl Operation {
    /// Build an operation, validating the number of schemes against the kind.
    ///
    /// # Errors
    ///
    /// [`OpError::InvalidArgument`] if `schemes.len()` does not match
    /// [`OperationKind::arity`].
    pub fn new<S: AsRef<str>>(kind: OperationKind, schemes: &[S]) -> OpResult<Self> {
        if schemes.len() != kind.arity() {
            return Err(OpError::invalid_argument(format!(
                "{kind} expects {} scheme(s), got {}",
                kind.arity(),
                schemes.len()
            )));
        }
        Ok(Self {
            kind,
            schemes: schemes
                .iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
            multi_item: false,
        })
    }

    /// Single-scheme operation. Two-slot kinds get the scheme in both slots.
    pub fn single(kind: OperationKind, scheme: &str) -> Self {
        let scheme = scheme.to_ascii_lowercase();
        let schemes = vec![scheme; kind.arity()];
        Self {
            kind,
            schemes,
            multi_item: false,
        }
    }

    /// Source/target operation. Single-slot kinds keep only the source.
    pub fn transfer(kind: OperationKind, source: &str, target: &str) -> Self {
        let mut schemes = vec![source.to_ascii_lowercase()];
        if kind.arity() == 2 {
            schemes.push(target.to_ascii_lowercase());
        }
        Self {
            kind,
            schemes,
            multi_item: false,
        }
    }

    /// Mark the operation as part of a multi-item batch.
    #[must_use]
    pub fn with_multi_item(mut self, multi_item: bool) -> Self {
        self.multi_item = multi_item;
        self
    }

    /// Operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// All schemes in slot order.
    pub fn schemes(&self) -> &[String] {
        &self.schemes
    }

    /// Scheme of the first (source) slot.
    pub fn source_scheme(&self) -> &str {
        &self.schemes[0]
    }

    /// Scheme of the last (target) slot; equals the source for one-slot kinds.
    pub fn target_scheme(&self) -> &str {
        &self.schemes[self.schemes.len() - 1]
    }

    /// Returns `true` if every slot uses `scheme` (case-insensitive).
    pub fn all_schemes_are(&self, scheme: &str) -> bool {
        self.schemes.iter().all(|s| s.eq_ignore_ascii_case(scheme))
    }

    /// Returns `true` if the operation belongs to a multi-item batch.
    pub fn is_multi_item(&self) -> bool {
        self.multi_item
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.kind, self.schemes.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validates_arity() {
        assert!(Operation::new(OperationKind::Copy, &["mem"]).is_err());
        assert!(Operation::new(OperationKind::List, &["mem", "file"]).is_err());
        let op = Operation::new(OperationKind::Copy, &["MEM", "File"]).unwrap();
        assert_eq!(op.schemes(), ["mem", "file"]);
    }

    #[test]
    fn single_fills_both_slots_for_transfers() {
        let op = Operation::single(OperationKind::Rename, "mem");
        assert_eq!(op.schemes().len(), 2);
        assert!(op.all_schemes_are("MEM"));
    }

    #[test]
    fn transfer_drops_target_for_single_slot_kinds() {
        let op = Operation::transfer(OperationKind::Delete, "mem", "file");
        assert_eq!(op.schemes(), ["mem"]);
        assert_eq!(op.target_scheme(), "mem");
    }

    #[test]
    fn operations_compare_by_value() {
        let a = Operation::transfer(OperationKind::Copy, "mem", "file");
        let b = Operation::transfer(OperationKind::Copy, "MEM", "FILE");
        assert_eq!(a, b);
        assert_ne!(a.clone().with_multi_item(true), b);
    }

    #[test]
    fn display_lists_schemes() {
        let op = Operation::single(OperationKind::Info, "smb");
        assert_eq!(op.to_string(), "INFO [smb]");
    }
}
