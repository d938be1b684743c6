//! Per-operation parameters.

use std::time::SystemTime;

use crate::CancellationToken;

/// Parameters of a CREATE operation.
#[derive(Debug, Clone, Default)]
pub struct CreateParams {
    /// `Some(true)` creates a directory, `Some(false)` a file. `None` creates a
    /// file unless the target uses directory syntax, and accepts an existing
    /// entry of either type.
    pub directory: Option<bool>,
    /// Create missing ancestor directories first.
    pub make_parents: bool,
    /// Fail with `AlreadyExists` if the target exists as a file.
    pub no_overwrite: bool,
    /// Set the modification time of the created (or existing) entry.
    pub last_modified: Option<SystemTime>,
}

impl CreateParams {
    /// Parameters for `mkdir -p`.
    pub fn directories() -> Self {
        Self {
            directory: Some(true),
            make_parents: true,
            ..Self::default()
        }
    }

    /// Set [`directory`](Self::directory).
    #[must_use]
    pub fn with_directory(mut self, directory: bool) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set [`make_parents`](Self::make_parents).
    #[must_use]
    pub fn with_make_parents(mut self, make_parents: bool) -> Self {
        self.make_parents = make_parents;
        self
    }

    /// Set [`no_overwrite`](Self::no_overwrite).
    #[must_use]
    pub fn with_no_overwrite(mut self, no_overwrite: bool) -> Self {
        self.no_overwrite = no_overwrite;
        self
    }

    /// Set [`last_modified`](Self::last_modified).
    #[must_use]
    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

/// Parameters of a DELETE operation.
#[derive(Debug, Clone, Default)]
pub struct DeleteParams {
    /// Delete directories with their whole subtree.
    pub recursive: bool,
    /// Checked between deleted entries.
    pub cancel: CancellationToken,
}

impl DeleteParams {
    /// Set [`recursive`](Self::recursive).
    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Use `cancel` for cooperative cancellation.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Parameters of COPY and MOVE operations.
#[derive(Debug, Clone, Default)]
pub struct TransferParams {
    /// Copy or move directories with their subtree.
    pub recursive: bool,
    /// Create missing ancestors of the target.
    pub make_parents: bool,
    /// Leave existing targets untouched (reported as success).
    pub no_overwrite: bool,
    /// Only replace targets older than the source.
    pub update: bool,
    /// Checked before every streamed chunk and every item.
    pub cancel: CancellationToken,
}

/// Parameters of a COPY operation.
pub type CopyParams = TransferParams;

/// Parameters of a MOVE operation.
pub type MoveParams = TransferParams;

impl TransferParams {
    /// Set [`recursive`](Self::recursive).
    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set [`make_parents`](Self::make_parents).
    #[must_use]
    pub fn with_make_parents(mut self, make_parents: bool) -> Self {
        self.make_parents = make_parents;
        self
    }

    /// Set [`no_overwrite`](Self::no_overwrite).
    #[must_use]
    pub fn with_no_overwrite(mut self, no_overwrite: bool) -> Self {
        self.no_overwrite = no_overwrite;
        self
    }

    /// Set [`update`](Self::update).
    #[must_use]
    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Use `cancel` for cooperative cancellation.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Parameters of a LIST operation.
#[derive(Debug, Clone)]
pub struct ListParams {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// List the contents of directories (`true`) or the directories themselves.
    pub list_directory_contents: bool,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            recursive: false,
            list_directory_contents: true,
        }
    }
}

impl ListParams {
    /// Set [`recursive`](Self::recursive).
    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set [`list_directory_contents`](Self::list_directory_contents).
    #[must_use]
    pub fn with_directory_contents(mut self, contents: bool) -> Self {
        self.list_directory_contents = contents;
        self
    }
}
