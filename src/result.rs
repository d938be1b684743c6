//! Aggregated results of multi-item operations.
//!
//! A [`BatchResult`] stores one entry per *attempted* item in flat parallel
//! vectors indexed by item position: the input at `inputs[i]` produced
//! `outcomes[i]`. A fatal error is set only when the batch aborted before any
//! item was attempted, so a result never holds both.
//!
//! The per-kind aliases ([`CopyResult`], [`InfoResult`], ...) add accessors
//! for their payloads.

use std::fmt;

use crate::{Info, OpError, OpResult, Uri};

/// Source and target of one COPY or MOVE entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPair {
    /// Source location.
    pub source: Uri,
    /// Requested target location.
    pub target: Uri,
}

impl UriPair {
    /// Pair `source` with `target`.
    pub fn new(source: Uri, target: Uri) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for UriPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Outcome of a multi-item operation.
///
/// # Invariants
///
/// - `success_count() + fail_count() == total()`
/// - `fatal_error().is_some()` implies `total() == 0`
///
/// # Examples
///
/// ```rust
/// use anyfs_ops::{BatchResult, OpError, Uri};
///
/// let mut result: BatchResult<Uri, Uri> = BatchResult::new();
/// let a = Uri::parse("mem://h/a").unwrap();
/// let b = Uri::parse("mem://h/b").unwrap();
/// result.push_success(a.clone(), a);
/// result.push_failure(b.clone(), OpError::NotFound { uri: b });
/// assert_eq!(result.total(), 2);
/// assert_eq!(result.success_count(), 1);
/// assert!(!result.success());
/// assert!(matches!(result.first_error(), Some(OpError::NotFound { .. })));
/// ```
#[derive(Debug)]
pub struct BatchResult<I, T> {
    inputs: Vec<I>,
    outcomes: Vec<OpResult<T>>,
    fatal: Option<OpError>,
}

impl<I, T> Default for BatchResult<I, T> {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            outcomes: Vec::new(),
            fatal: None,
        }
    }
}

impl<I, T> BatchResult<I, T> {
    /// Empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Result of a batch that aborted before any item.
    pub fn fatal(error: OpError) -> Self {
        Self {
            inputs: Vec::new(),
            outcomes: Vec::new(),
            fatal: Some(error),
        }
    }

    /// Record a fatal error.
    ///
    /// # Panics
    ///
    /// Panics if entries were already recorded; a fatal error means no item
    /// was attempted.
    pub fn set_fatal(&mut self, error: OpError) {
        assert!(
            self.outcomes.is_empty(),
            "fatal error recorded after {} item(s) were attempted",
            self.outcomes.len()
        );
        self.fatal = Some(error);
    }

    /// Append one entry.
    pub fn push(&mut self, input: I, outcome: OpResult<T>) {
        debug_assert!(self.fatal.is_none(), "entry recorded on a fatal result");
        self.inputs.push(input);
        self.outcomes.push(outcome);
    }

    /// Append a successful entry.
    pub fn push_success(&mut self, input: I, value: T) {
        self.push(input, Ok(value));
    }

    /// Append a failed entry.
    pub fn push_failure(&mut self, input: I, error: OpError) {
        self.push(input, Err(error));
    }

    /// Number of attempted items.
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of successful items.
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Number of failed items.
    pub fn fail_count(&self) -> usize {
        self.total() - self.success_count()
    }

    /// Returns `true` if nothing failed (fatally or per item).
    pub fn success(&self) -> bool {
        self.fatal.is_none() && self.outcomes.iter().all(Result::is_ok)
    }

    /// Returns `true` if item `index` succeeded. Out-of-range indices are not
    /// successes.
    pub fn is_success(&self, index: usize) -> bool {
        self.outcomes.get(index).is_some_and(Result::is_ok)
    }

    /// Error of item `index`, if it failed.
    pub fn failure(&self, index: usize) -> Option<&OpError> {
        self.outcomes.get(index).and_then(|o| o.as_ref().err())
    }

    /// Value of item `index`, if it succeeded.
    pub fn value(&self, index: usize) -> Option<&T> {
        self.outcomes.get(index).and_then(|o| o.as_ref().ok())
    }

    /// Input of item `index`.
    pub fn input(&self, index: usize) -> Option<&I> {
        self.inputs.get(index)
    }

    /// Outcome of item `index`.
    pub fn outcome(&self, index: usize) -> Option<&OpResult<T>> {
        self.outcomes.get(index)
    }

    /// The fatal error, if the batch aborted.
    pub fn fatal_error(&self) -> Option<&OpError> {
        self.fatal.as_ref()
    }

    /// The fatal error, else the first per-item failure in index order.
    pub fn first_error(&self) -> Option<&OpError> {
        self.fatal
            .as_ref()
            .or_else(|| self.outcomes.iter().find_map(|o| o.as_ref().err()))
    }

    /// Iterate `(input, outcome)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&I, &OpResult<T>)> {
        self.inputs.iter().zip(self.outcomes.iter())
    }

    /// Successful values in order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    /// Failures in order, with their inputs.
    pub fn failures(&self) -> impl Iterator<Item = (&I, &OpError)> {
        self.iter()
            .filter_map(|(input, outcome)| outcome.as_ref().err().map(|e| (input, e)))
    }

    /// Move every entry of `other` to the end of `self`. A fatal error on
    /// either side is kept only while the merged result has no entries.
    ///
    /// # Panics
    ///
    /// Panics if a fatal error would sit next to attempted items.
    pub fn extend(&mut self, other: BatchResult<I, T>) {
        let fatal = self.fatal.take().or(other.fatal);
        self.inputs.extend(other.inputs);
        self.outcomes.extend(other.outcomes);
        if fatal.is_some() {
            assert!(
                self.outcomes.is_empty(),
                "fatal error merged with {} attempted item(s)",
                self.outcomes.len()
            );
        }
        self.fatal = fatal;
    }

    /// Split into inputs, outcomes and the fatal error.
    pub fn into_parts(self) -> (Vec<I>, Vec<OpResult<T>>, Option<OpError>) {
        (self.inputs, self.outcomes, self.fatal)
    }
}

/// Result of CREATE: target → created location.
pub type CreateResult = BatchResult<Uri, Uri>;

/// Result of DELETE: target → deleted location.
pub type DeleteResult = BatchResult<Uri, Uri>;

/// Result of COPY: (source, target) → resulting location.
pub type CopyResult = BatchResult<UriPair, Uri>;

/// Result of MOVE: (source, target) → resulting location.
pub type MoveResult = BatchResult<UriPair, Uri>;

/// Result of LIST: target → listed entries.
pub type ListResult = BatchResult<Uri, Vec<Info>>;

/// Result of INFO: target → snapshot, `None` if it does not exist.
pub type InfoResult = BatchResult<Uri, Option<Info>>;

/// Result of RESOLVE: pattern → one matching location per entry.
pub type ResolveResult = BatchResult<Uri, Uri>;

impl BatchResult<Uri, Uri> {
    /// Resulting locations of the successful entries.
    pub fn uris(&self) -> Vec<Uri> {
        self.values().cloned().collect()
    }
}

impl BatchResult<UriPair, Uri> {
    /// Source of entry `index`.
    pub fn source(&self, index: usize) -> Option<&Uri> {
        self.input(index).map(|pair| &pair.source)
    }

    /// Requested target of entry `index`.
    pub fn target(&self, index: usize) -> Option<&Uri> {
        self.input(index).map(|pair| &pair.target)
    }

    /// Actual resulting location of entry `index`, if it succeeded.
    pub fn result_uri(&self, index: usize) -> Option<&Uri> {
        self.value(index)
    }
}

impl BatchResult<Uri, Vec<Info>> {
    /// All listed entries of the successful items, flattened.
    pub fn infos(&self) -> Vec<&Info> {
        self.values().flatten().collect()
    }
}

impl BatchResult<Uri, Option<Info>> {
    /// Snapshot of entry `index`, if it succeeded and exists.
    pub fn info(&self, index: usize) -> Option<&Info> {
        self.value(index).and_then(Option::as_ref)
    }

    /// Returns `true` if entry `index` succeeded and the location exists.
    pub fn exists(&self, index: usize) -> bool {
        self.info(index).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileType;

    fn uri(s: &str) -> Uri {
        Uri::parse(s).unwrap()
    }

    #[test]
    fn counts_are_derived() {
        let mut result = CreateResult::new();
        for i in 0..5 {
            let target = uri(&format!("mem://h/{i}"));
            if i == 2 {
                result.push_failure(target.clone(), OpError::NotFound { uri: target });
            } else {
                result.push_success(target.clone(), target);
            }
        }
        assert_eq!(result.total(), 5);
        assert_eq!(result.success_count(), 4);
        assert_eq!(result.fail_count(), 1);
        assert!(!result.is_success(2));
        assert!(result.is_success(3));
        assert!(!result.is_success(99));
        assert!(result.failure(2).is_some());
        assert_eq!(result.failures().count(), 1);
    }

    #[test]
    fn fatal_result_has_no_entries() {
        let result = CopyResult::fatal(OpError::Unsupported {
            operation: "COPY [a, b]".into(),
        });
        assert_eq!(result.total(), 0);
        assert!(!result.success());
        assert!(matches!(
            result.first_error(),
            Some(OpError::Unsupported { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "fatal error recorded after")]
    fn set_fatal_after_items_panics() {
        let mut result = DeleteResult::new();
        let target = uri("mem://h/x");
        result.push_success(target.clone(), target);
        result.set_fatal(OpError::Backend("late".into()));
    }

    #[test]
    fn first_error_is_lowest_failing_index() {
        let mut result = DeleteResult::new();
        let a = uri("mem://h/a");
        let b = uri("mem://h/b");
        result.push_success(a.clone(), a.clone());
        result.push_failure(b.clone(), OpError::NotFound { uri: b.clone() });
        result.push_failure(a.clone(), OpError::NotADirectory { uri: a });
        match result.first_error() {
            Some(OpError::NotFound { uri }) => assert_eq!(uri, &b),
            other => panic!("unexpected first error: {other:?}"),
        }
    }

    #[test]
    fn copy_result_accessors() {
        let mut result = CopyResult::new();
        let pair = UriPair::new(uri("mem://h/a"), uri("file:///b/"));
        result.push_success(pair, uri("file:///b/a"));
        assert_eq!(result.source(0).unwrap().path(), "/a");
        assert_eq!(result.target(0).unwrap().path(), "/b/");
        assert_eq!(result.result_uri(0).unwrap().path(), "/b/a");
        assert!(result.source(1).is_none());
    }

    #[test]
    fn info_result_distinguishes_missing_from_failure() {
        let mut result = InfoResult::new();
        let present = uri("mem://h/present");
        let missing = uri("mem://h/missing");
        result.push_success(present.clone(), Some(Info::new(present, FileType::File)));
        result.push_success(missing, None);
        assert!(result.success());
        assert!(result.exists(0));
        assert!(!result.exists(1));
    }

    #[test]
    fn extend_appends_in_order() {
        let mut left = ResolveResult::new();
        let mut right = ResolveResult::new();
        let a = uri("mem://h/a");
        let b = uri("mem://h/b");
        left.push_success(a.clone(), a.clone());
        right.push_success(b.clone(), b.clone());
        left.extend(right);
        assert_eq!(left.uris(), vec![a, b]);
    }

    #[test]
    fn extend_keeps_fatal_of_empty_results() {
        let mut left = CopyResult::new();
        left.extend(CopyResult::fatal(OpError::Backend("down".into())));
        assert_eq!(left.total(), 0);
        assert!(matches!(left.fatal_error(), Some(OpError::Backend(_))));
    }

    #[test]
    #[should_panic(expected = "fatal error merged with 1 attempted item(s)")]
    fn extend_fatal_into_attempted_items_panics() {
        let mut left = DeleteResult::new();
        let target = uri("mem://h/x");
        left.push_success(target.clone(), target);
        left.extend(DeleteResult::fatal(OpError::Backend("late".into())));
    }
}
