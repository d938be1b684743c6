//! End-to-end tests through the dispatcher.
//!
//! These tests verify that:
//! 1. Batch results keep one entry per attempted item
//! 2. Native and composite handlers produce identical bytes
//! 3. Partial failures stay isolated to their item
//! 4. Cancellation and connectivity failures surface with the right kind

use anyfs_ops::*;
use std::io::{self, Read};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn uri(s: &str) -> Uri {
    Uri::parse(s).unwrap()
}

fn list(s: &str) -> UriList {
    UriList::parse(s).unwrap()
}

fn memory_dispatcher() -> (Arc<MemoryProvider>, Dispatcher) {
    init_tracing();
    let memory = Arc::new(MemoryProvider::standalone());
    let dispatcher = Dispatcher::builder()
        .provider(memory.clone())
        .traced()
        .build()
        .unwrap();
    (memory, dispatcher)
}

fn assert_counts<I, T>(result: &BatchResult<I, T>) {
    assert_eq!(result.total(), result.success_count() + result.fail_count());
    if result.fatal_error().is_some() {
        assert_eq!(result.total(), 0);
    }
}

// =============================================================================
// Batch invariants
// =============================================================================

#[test]
fn partial_failure_is_isolated() {
    let (memory, d) = memory_dispatcher();
    let targets = list("mem://h/a;mem://h/b;mem://h/missing/c;mem://h/d;mem://h/e");
    let result = d.create(&targets, &CreateParams::default());

    assert_counts(&result);
    assert_eq!(result.total(), 5);
    assert_eq!(result.success_count(), 4);
    assert_eq!(result.fail_count(), 1);
    assert!(!result.is_success(2));
    assert!(matches!(result.failure(2), Some(OpError::NotFound { .. })));
    assert_eq!(result.input(2).unwrap().path(), "/missing/c");
    for name in ["a", "b", "d", "e"] {
        assert!(memory.is_file(&uri("mem://h/").child(name)).unwrap());
    }
}

#[test]
fn info_reports_missing_as_success() {
    let (memory, d) = memory_dispatcher();
    memory.write_all(&uri("mem://h/here"), b"12345").unwrap();
    let result = d.info(&list("mem://h/here;mem://h/gone"));

    assert_counts(&result);
    assert!(result.success());
    assert!(result.exists(0));
    assert_eq!(result.info(0).unwrap().size, 5);
    assert!(!result.exists(1));
}

#[test]
fn create_and_info_are_idempotent() {
    let (_, d) = memory_dispatcher();
    let targets = list("mem://h/dir/;mem://h/dir/file");
    let first = d.create(&targets, &CreateParams::default());
    let before = d.info(&targets);
    let second = d.create(&targets, &CreateParams::default());
    let after = d.info(&targets);

    assert!(first.success());
    assert!(second.success());
    assert_eq!(before.info(1), after.info(1));
    assert!(d.is_dir(&uri("mem://h/dir")).unwrap());
}

// =============================================================================
// Copy and move
// =============================================================================

#[test]
fn local_copy_preserves_bytes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let d = Dispatcher::builder()
        .provider(Arc::new(LocalProvider::new()))
        .build()
        .unwrap();
    let root = LocalProvider::uri_for(dir.path()).unwrap();
    let source = root.child("source.bin");
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(dir.path().join("source.bin"), &payload).unwrap();

    let result = d.copy(
        &UriList::from(source.clone()),
        &UriList::from(root.child("copy.bin")),
        &CopyParams::default(),
    );
    assert!(result.success(), "{:?}", result.first_error());
    assert_eq!(std::fs::read(dir.path().join("copy.bin")).unwrap(), payload);
    assert_eq!(
        d.local_file(&root.child("copy.bin")).unwrap(),
        dir.path().join("copy.bin")
    );
}

#[test]
fn copy_between_local_and_memory_uses_fallback() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(MemoryProvider::standalone());
    let d = Dispatcher::builder()
        .provider(Arc::new(LocalProvider::new()))
        .provider(memory.clone())
        .config(DispatchConfig {
            buffer_size: 7,
            ..DispatchConfig::default()
        })
        .build()
        .unwrap();

    let root = LocalProvider::uri_for(dir.path()).unwrap();
    std::fs::create_dir(dir.path().join("tree")).unwrap();
    std::fs::write(dir.path().join("tree/a.txt"), b"alpha").unwrap();
    std::fs::create_dir(dir.path().join("tree/nested")).unwrap();
    std::fs::write(dir.path().join("tree/nested/b.txt"), b"bravo").unwrap();

    let op = Operation::transfer(OperationKind::Copy, "file", "mem");
    let names: Vec<_> = d.handlers_for(&op).iter().map(|h| h.name().to_owned()).collect();
    assert_eq!(names, ["composite"]);

    let result = d.copy(
        &UriList::from(root.child("tree")),
        &list("mem://store/"),
        &CopyParams::default().with_recursive(true),
    );
    assert_counts(&result);
    assert!(result.success(), "{:?}", result.first_error());
    // tree, a.txt, nested, b.txt
    assert_eq!(result.total(), 4);
    assert_eq!(
        memory.read_all(&uri("mem://store/tree/nested/b.txt")).unwrap(),
        b"bravo"
    );
}

#[test]
fn move_across_authorities_removes_source() {
    let (memory, d) = memory_dispatcher();
    memory.make_dirs(&uri("mem://a/docs")).unwrap();
    memory.write_all(&uri("mem://a/docs/one"), b"1").unwrap();
    memory.write_all(&uri("mem://a/docs/two"), b"22").unwrap();

    let result = d.move_to(
        &list("mem://a/docs"),
        &list("mem://b/"),
        &MoveParams::default(),
    );
    assert!(result.success(), "{:?}", result.first_error());
    assert!(!d.exists(&uri("mem://a/docs")).unwrap());
    assert_eq!(memory.read_all(&uri("mem://b/docs/two")).unwrap(), b"22");
}

#[test]
fn move_within_authority_is_native() {
    let (memory, d) = memory_dispatcher();
    memory.write_all(&uri("mem://a/f"), b"x").unwrap();
    let opened = memory.network().server("a").connections_opened();

    let result = d.move_to(&list("mem://a/f"), &list("mem://a/g"), &MoveParams::default());
    assert!(result.success());
    assert_eq!(result.result_uri(0).unwrap().path(), "/g");
    assert!(!memory.exists(&uri("mem://a/f")).unwrap());
    // pooled connections are reused, never reopened
    assert_eq!(memory.network().server("a").connections_opened(), opened);
}

#[test]
fn rename_within_backend() {
    let (memory, d) = memory_dispatcher();
    memory.write_all(&uri("mem://a/old"), b"x").unwrap();
    let renamed = d.rename(&uri("mem://a/old"), &uri("mem://a/new")).unwrap();
    assert_eq!(renamed.path(), "/new");
    assert!(d.is_file(&uri("mem://a/new")).unwrap());
}

#[test]
fn rename_across_authorities_streams() {
    let (memory, d) = memory_dispatcher();
    memory.write_all(&uri("mem://a/old"), b"payload").unwrap();
    let renamed = d.rename(&uri("mem://a/old"), &uri("mem://b/new")).unwrap();
    assert_eq!(renamed.path(), "/new");
    assert_eq!(memory.read_all(&uri("mem://b/new")).unwrap(), b"payload");
    assert!(!memory.exists(&uri("mem://a/old")).unwrap());
}

#[test]
fn copy_onto_itself_fails_without_touching_source() {
    let (memory, d) = memory_dispatcher();
    memory.write_all(&uri("mem://a/f"), b"keep").unwrap();
    let result = d.copy(&list("mem://a/f"), &list("mem://a/"), &CopyParams::default());
    assert_eq!(result.fail_count(), 1);
    assert!(matches!(result.failure(0), Some(OpError::SameFile { .. })));
    assert_eq!(memory.read_all(&uri("mem://a/f")).unwrap(), b"keep");
}

// =============================================================================
// Cancellation
// =============================================================================

/// Memory provider whose readers cancel a token after their first chunk.
struct CancellingProvider {
    inner: MemoryProvider,
    cancel: CancellationToken,
}

struct CancellingReader {
    inner: ReadChannel,
    cancel: CancellationToken,
}

impl Read for CancellingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cancel.cancel();
        Ok(n)
    }
}

impl PrimitiveProvider for CancellingProvider {
    fn scheme(&self) -> &str {
        self.inner.scheme()
    }
    fn create_file(&self, uri: &Uri) -> OpResult<()> {
        self.inner.create_file(uri)
    }
    fn make_dir(&self, uri: &Uri) -> OpResult<()> {
        self.inner.make_dir(uri)
    }
    fn delete_file(&self, uri: &Uri) -> OpResult<()> {
        self.inner.delete_file(uri)
    }
    fn remove_dir(&self, uri: &Uri) -> OpResult<()> {
        self.inner.remove_dir(uri)
    }
    fn read(&self, uri: &Uri) -> OpResult<ReadChannel> {
        Ok(Box::new(CancellingReader {
            inner: self.inner.read(uri)?,
            cancel: self.cancel.clone(),
        }))
    }
    fn write(&self, uri: &Uri) -> OpResult<WriteChannel> {
        self.inner.write(uri)
    }
    fn append(&self, uri: &Uri) -> OpResult<WriteChannel> {
        self.inner.append(uri)
    }
    fn info(&self, uri: &Uri) -> OpResult<Option<Info>> {
        self.inner.info(uri)
    }
    fn list(&self, uri: &Uri) -> OpResult<Vec<Info>> {
        self.inner.list(uri)
    }
}

#[test]
fn cancellation_mid_copy_interrupts_the_item() {
    init_tracing();
    let memory = MemoryProvider::standalone();
    let cancel = CancellationToken::new();
    let provider = Arc::new(CancellingProvider {
        inner: memory.clone(),
        cancel: cancel.clone(),
    });
    let d = Dispatcher::builder()
        .provider(provider)
        .config(DispatchConfig {
            buffer_size: 1,
            ..DispatchConfig::default()
        })
        .build()
        .unwrap();
    memory.write_all(&uri("mem://a/big"), b"0123456789").unwrap();

    let result = d.copy(
        &list("mem://a/big"),
        &list("mem://b/big"),
        &CopyParams::default().with_cancel(cancel.clone()),
    );
    assert_counts(&result);
    assert_eq!(result.total(), 1);
    let err = result.failure(0).unwrap();
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(cancel.is_cancelled());
    // partial target removed, source untouched
    assert!(!memory.exists(&uri("mem://b/big")).unwrap());
    assert_eq!(memory.read_all(&uri("mem://a/big")).unwrap(), b"0123456789");
}

// =============================================================================
// Wildcards and listing
// =============================================================================

#[test]
fn wildcard_selects_files_in_subdirectories() {
    let (memory, d) = memory_dispatcher();
    for dir in ["x", "y", "z"] {
        memory.make_dirs(&uri("mem://h/").child(dir)).unwrap();
    }
    memory.write_all(&uri("mem://h/x/1.txt"), b"").unwrap();
    memory.write_all(&uri("mem://h/y/1.txt"), b"").unwrap();
    memory.write_all(&uri("mem://h/y/2.txt"), b"").unwrap();
    memory.write_all(&uri("mem://h/top.txt"), b"").unwrap();

    let resolved = d.resolve(&list("mem://h/*/1.txt"));
    let paths: Vec<_> = resolved.uris().iter().map(|u| u.path().to_owned()).collect();
    assert_eq!(paths, ["/x/1.txt", "/y/1.txt"]);

    let listed = d.list(&list("mem://h/*/1.txt"), &ListParams::default());
    assert_eq!(listed.total(), 2);
    assert_eq!(listed.infos().len(), 2);

    let deleted = d.delete(&list("mem://h/*/1.txt"), &DeleteParams::default());
    assert_eq!(deleted.success_count(), 2);
    assert!(memory.exists(&uri("mem://h/y/2.txt")).unwrap());
}

#[test]
fn invalid_pattern_is_one_failure() {
    let (_, d) = memory_dispatcher();
    let result = d.list(&list("mem://h/[z-a]"), &ListParams::default());
    assert_counts(&result);
    assert_eq!(result.total(), 1);
    assert_eq!(result.failure(0).unwrap().kind(), ErrorKind::InvalidArgument);
}

// =============================================================================
// Connectivity
// =============================================================================

#[test]
fn offline_backend_fails_items_not_batch() {
    let (memory, d) = memory_dispatcher();
    memory.write_all(&uri("mem://up/f"), b"").unwrap();
    memory.network().server("down").set_online(false);

    let result = d.info(&list("mem://up/f;mem://down/f"));
    assert_counts(&result);
    assert!(result.is_success(0));
    let err = result.failure(1).unwrap();
    assert!(err.is_connectivity());
    assert_eq!(err.kind(), ErrorKind::Connectivity);

    memory.network().server("down").set_online(true);
    assert!(d.info(&list("mem://down/f")).success());
}

#[test]
fn perform_dispatches_requests() {
    let (_, d) = memory_dispatcher();
    let response = d.perform(Request::Create {
        targets: list("mem://h/p/"),
        params: CreateParams::default(),
    });
    assert!(response.success());
    let response = d.perform(Request::Info {
        targets: list("mem://h/p"),
    });
    match response {
        Response::Info(result) => assert!(result.info(0).unwrap().is_dir()),
        other => panic!("unexpected response {other:?}"),
    }
}
