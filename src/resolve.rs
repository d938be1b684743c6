//! Wildcard resolution.
//!
//! A pattern path such as `/logs/2024-*/{app,db}.log` is split into its
//! deepest fixed directory (`/logs/`) and the remaining segments. Each
//! remaining segment is matched against the children of the current set of
//! directories, one level at a time. Only the final segment may match files.
//!
//! Wildcards are `*`, `?`, `[...]` classes and `{a,b}` alternations, matched
//! with [`globset`] per segment, so `*` never crosses a `/`.

use globset::{GlobBuilder, GlobMatcher};

use crate::{OpError, OpResult, PATH_SEPARATOR, PrimitiveProvider, Uri};

/// Returns `true` if `path` contains wildcard syntax.
///
/// # Examples
///
/// ```rust
/// use anyfs_ops::has_wildcards;
///
/// assert!(has_wildcards("/data/*.csv"));
/// assert!(has_wildcards("/data/{a,b}.csv"));
/// assert!(!has_wildcards("/data/{plain}.csv"));
/// assert!(!has_wildcards("/data/report.csv"));
/// ```
pub fn has_wildcards(path: &str) -> bool {
    path.contains(['*', '?']) || has_class(path) || has_alternation(path)
}

fn has_class(path: &str) -> bool {
    path.find('[')
        .is_some_and(|open| path[open + 1..].contains(']'))
}

fn has_alternation(path: &str) -> bool {
    let Some(open) = path.find('{') else {
        return false;
    };
    match path[open..].find('}') {
        Some(len) => path[open..open + len].contains(','),
        None => false,
    }
}

/// Split a pattern into its fixed base directory and the segments that
/// follow, the first of which contains a wildcard.
fn split_pattern(pattern: &Uri) -> (Uri, Vec<&str>) {
    let segments: Vec<&str> = pattern
        .path()
        .split(PATH_SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect();
    let first_wild = segments
        .iter()
        .position(|s| has_wildcards(s))
        .unwrap_or(segments.len());
    let mut base = String::from("/");
    for segment in &segments[..first_wild] {
        base.push_str(segment);
        base.push(PATH_SEPARATOR);
    }
    (pattern.with_path(base), segments[first_wild..].to_vec())
}

fn compile(segment: &str) -> OpResult<GlobMatcher> {
    GlobBuilder::new(segment)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| OpError::InvalidPattern {
            pattern: segment.to_owned(),
            source,
        })
}

/// Expand `pattern` against `provider`.
///
/// A pattern without wildcards resolves to itself, whether or not it exists.
/// A wildcard pattern yields the existing matches in listing order; a missing
/// base directory yields no matches.
///
/// # Errors
///
/// - [`OpError::InvalidPattern`] if a segment is not a valid glob
/// - errors of the provider's `info` and `list` calls
pub fn resolve_with(provider: &dyn PrimitiveProvider, pattern: &Uri) -> OpResult<Vec<Uri>> {
    if !pattern.has_wildcards() {
        return Ok(vec![pattern.clone()]);
    }
    let (base, segments) = split_pattern(pattern);
    match provider.info(&base)? {
        Some(info) if info.is_dir() => {}
        _ => return Ok(Vec::new()),
    }

    let last = segments.len().saturating_sub(1);
    let mut current = vec![base];
    for (index, segment) in segments.iter().enumerate() {
        let dirs_only = index < last;
        let mut next = Vec::new();
        if has_wildcards(segment) {
            let matcher = compile(segment)?;
            for dir in &current {
                for child in provider.list(dir)? {
                    if matcher.is_match(&child.name) && (!dirs_only || child.is_dir()) {
                        next.push(child.uri);
                    }
                }
            }
        } else {
            for dir in &current {
                let candidate = dir.child(segment);
                if let Some(info) = provider.info(&candidate)? {
                    if !dirs_only || info.is_dir() {
                        next.push(candidate);
                    }
                }
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    Ok(current)
}
