//! # Memory Backend
//!
//! A connection-oriented in-memory backend for the `mem` scheme.
//!
//! ## Overview
//!
//! A [`MemoryNetwork`] hosts one [`MemoryServer`] per host name. The
//! [`MemoryProvider`] reaches servers through a [`ConnectionPool`], exactly
//! like a provider for a remote protocol would: every primitive borrows a
//! [`MemoryConnection`] for the authority of its URI, and open channels keep
//! their connection until they are dropped.
//!
//! Servers can be taken offline ([`MemoryServer::set_online`]) to exercise
//! connectivity failures and connection invalidation.
//!
//! ```text
//! mem://alpha/data/x ──▶ pool[mem://alpha] ──▶ MemoryConnection ──▶ server "alpha"
//! mem://beta/data/x  ──▶ pool[mem://beta]  ──▶ MemoryConnection ──▶ server "beta"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use crate::{
    Authority, Capabilities, Connection, ConnectionPool, Connector, FileType, Info, OpError,
    OpResult, Permissions, PoolConfig, Pooled, PrimitiveProvider, ReadChannel, Uri,
    WriteChannel,
};

/// Scheme of the memory backend.
pub const MEMORY_SCHEME: &str = "mem";

const ROOT: &str = "/";

#[derive(Debug, Clone)]
enum Content {
    File(Vec<u8>),
    Directory,
}

#[derive(Debug, Clone)]
struct Node {
    content: Content,
    created: SystemTime,
    modified: SystemTime,
}

impl Node {
    fn file(data: Vec<u8>) -> Self {
        let now = SystemTime::now();
        Self {
            content: Content::File(data),
            created: now,
            modified: now,
        }
    }

    fn directory() -> Self {
        let now = SystemTime::now();
        Self {
            content: Content::Directory,
            created: now,
            modified: now,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.content, Content::Directory)
    }
}

/// Normalized node key: no trailing separator, root is `/`.
fn key(uri: &Uri) -> String {
    uri.normalize().without_trailing_separator().path().to_owned()
}

fn parent_key(key: &str) -> Option<&str> {
    if key == ROOT {
        return None;
    }
    match key.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&key[..idx]),
        None => None,
    }
}

fn child_prefix(key: &str) -> String {
    if key == ROOT {
        ROOT.to_owned()
    } else {
        format!("{key}/")
    }
}

/// One in-memory storage host.
#[derive(Debug)]
pub struct MemoryServer {
    host: String,
    nodes: RwLock<BTreeMap<String, Node>>,
    online: AtomicBool,
    connections_opened: AtomicUsize,
    connections_closed: AtomicUsize,
}

impl MemoryServer {
    fn new(host: &str) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT.to_owned(), Node::directory());
        Self {
            host: host.to_owned(),
            nodes: RwLock::new(nodes),
            online: AtomicBool::new(true),
            connections_opened: AtomicUsize::new(0),
            connections_closed: AtomicUsize::new(0),
        }
    }

    /// Host name of the server.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Take the server offline (`false`) or back online. Offline servers
    /// refuse connections and fail every request of existing ones.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns `true` if the server accepts requests.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Connections opened to this server so far.
    pub fn connections_opened(&self) -> usize {
        self.connections_opened.load(Ordering::SeqCst)
    }

    /// Connections closed so far.
    pub fn connections_closed(&self) -> usize {
        self.connections_closed.load(Ordering::SeqCst)
    }

    fn read_nodes(&self) -> RwLockReadGuard<'_, BTreeMap<String, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_nodes(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of memory servers, created on first contact.
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    servers: RwLock<HashMap<String, Arc<MemoryServer>>>,
}

impl MemoryNetwork {
    /// Empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The server for `host` (lower-case), created if unknown.
    pub fn server(&self, host: &str) -> Arc<MemoryServer> {
        let host = host.to_ascii_lowercase();
        if let Some(server) = self
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&host)
        {
            return Arc::clone(server);
        }
        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            servers
                .entry(host.clone())
                .or_insert_with(|| Arc::new(MemoryServer::new(&host))),
        )
    }
}

/// Opens [`MemoryConnection`]s on a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    network: Arc<MemoryNetwork>,
}

impl MemoryConnector {
    /// Connector for `network`.
    pub fn new(network: Arc<MemoryNetwork>) -> Self {
        Self { network }
    }
}

impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    fn connect(&self, authority: &Authority) -> OpResult<MemoryConnection> {
        let server = self.network.server(authority.host());
        if !server.is_online() {
            return Err(OpError::Connectivity {
                authority: authority.to_string(),
                reason: "server is offline".into(),
            });
        }
        server.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            server,
            authority: authority.to_string(),
            open: true,
        })
    }
}

/// A session with one [`MemoryServer`].
///
/// Requests fail with [`OpError::Connectivity`] while the server is offline.
#[derive(Debug)]
pub struct MemoryConnection {
    server: Arc<MemoryServer>,
    authority: String,
    open: bool,
}

impl Connection for MemoryConnection {
    fn is_open(&self) -> bool {
        self.open && self.server.is_online()
    }

    fn close(mut self) {
        self.open = false;
        self.server.connections_closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl MemoryConnection {
    fn check(&self) -> OpResult<()> {
        if self.server.is_online() {
            Ok(())
        } else {
            Err(OpError::Connectivity {
                authority: self.authority.clone(),
                reason: "connection reset by offline server".into(),
            })
        }
    }

    /// Parent of `key` must be an existing directory.
    fn check_parent(nodes: &BTreeMap<String, Node>, key: &str, uri: &Uri) -> OpResult<()> {
        let Some(parent) = parent_key(key) else {
            return Ok(());
        };
        match nodes.get(parent) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(OpError::NotADirectory {
                uri: uri.with_path(parent),
            }),
            None => Err(OpError::NotFound {
                uri: uri.with_path(parent),
            }),
        }
    }

    fn info(&self, uri: &Uri) -> OpResult<Option<Info>> {
        self.check()?;
        let key = key(uri);
        let nodes = self.server.read_nodes();
        Ok(nodes.get(&key).map(|node| node_info(uri.clone(), node)))
    }

    fn list(&self, uri: &Uri) -> OpResult<Vec<Info>> {
        self.check()?;
        let key = key(uri);
        let nodes = self.server.read_nodes();
        match nodes.get(&key) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(OpError::NotADirectory { uri: uri.clone() }),
            None => return Err(OpError::NotFound { uri: uri.clone() }),
        }
        let prefix = child_prefix(&key);
        Ok(nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.len() > prefix.len() && !k[prefix.len()..].contains('/'))
            .map(|(k, node)| node_info(uri.child(&k[prefix.len()..]), node))
            .collect())
    }

    fn create(&self, uri: &Uri, node: Node) -> OpResult<()> {
        self.check()?;
        let key = key(uri);
        let mut nodes = self.server.write_nodes();
        if nodes.contains_key(&key) {
            return Err(OpError::AlreadyExists {
                uri: uri.clone(),
                operation: "create",
            });
        }
        Self::check_parent(&nodes, &key, uri)?;
        nodes.insert(key, node);
        Ok(())
    }

    fn delete_file(&self, uri: &Uri) -> OpResult<()> {
        self.check()?;
        let key = key(uri);
        let mut nodes = self.server.write_nodes();
        match nodes.get(&key) {
            Some(node) if node.is_dir() => Err(OpError::NotAFile { uri: uri.clone() }),
            Some(_) => {
                nodes.remove(&key);
                Ok(())
            }
            None => Err(OpError::NotFound { uri: uri.clone() }),
        }
    }

    fn remove_dir(&self, uri: &Uri) -> OpResult<()> {
        self.check()?;
        let key = key(uri);
        if key == ROOT {
            return Err(OpError::PermissionDenied {
                uri: uri.clone(),
                operation: "delete",
            });
        }
        let mut nodes = self.server.write_nodes();
        match nodes.get(&key) {
            Some(node) if !node.is_dir() => {
                return Err(OpError::NotADirectory { uri: uri.clone() });
            }
            Some(_) => {}
            None => return Err(OpError::NotFound { uri: uri.clone() }),
        }
        let prefix = child_prefix(&key);
        if nodes
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
        {
            return Err(OpError::DirectoryNotEmpty { uri: uri.clone() });
        }
        nodes.remove(&key);
        Ok(())
    }

    fn copy_file(&self, source: &Uri, target: &Uri) -> OpResult<u64> {
        self.check()?;
        let (from, to) = (key(source), key(target));
        let mut nodes = self.server.write_nodes();
        let data = match nodes.get(&from) {
            Some(Node {
                content: Content::File(data),
                ..
            }) => data.clone(),
            Some(_) => return Err(OpError::NotAFile { uri: source.clone() }),
            None => return Err(OpError::NotFound { uri: source.clone() }),
        };
        if nodes.get(&to).is_some_and(Node::is_dir) {
            return Err(OpError::NotAFile { uri: target.clone() });
        }
        Self::check_parent(&nodes, &to, target)?;
        let size = data.len() as u64;
        nodes.insert(to, Node::file(data));
        Ok(size)
    }

    fn move_entry(&self, source: &Uri, target: &Uri) -> OpResult<()> {
        self.check()?;
        let (from, to) = (key(source), key(target));
        let mut nodes = self.server.write_nodes();
        let Some(node) = nodes.get(&from) else {
            return Err(OpError::NotFound { uri: source.clone() });
        };
        let moving_dir = node.is_dir();
        if from == to {
            return Ok(());
        }
        if moving_dir && to.starts_with(&child_prefix(&from)) {
            return Err(OpError::Subdirectory {
                source_uri: source.clone(),
                target: target.clone(),
            });
        }
        match nodes.get(&to) {
            Some(existing) if existing.is_dir() || moving_dir => {
                return Err(OpError::AlreadyExists {
                    uri: target.clone(),
                    operation: "move",
                });
            }
            _ => {}
        }
        Self::check_parent(&nodes, &to, target)?;

        let from_prefix = child_prefix(&from);
        let mut moved: Vec<(String, Node)> = Vec::new();
        if let Some(node) = nodes.remove(&from) {
            moved.push((to.clone(), node));
        }
        if moving_dir {
            let descendants: Vec<String> = nodes
                .range(from_prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&from_prefix))
                .map(|(k, _)| k.clone())
                .collect();
            for old in descendants {
                if let Some(node) = nodes.remove(&old) {
                    moved.push((format!("{}/{}", to, &old[from_prefix.len()..]), node));
                }
            }
        }
        nodes.extend(moved);
        Ok(())
    }

    fn open_write(&self, uri: &Uri, truncate: bool) -> OpResult<()> {
        self.check()?;
        let key = key(uri);
        let mut nodes = self.server.write_nodes();
        match nodes.get_mut(&key) {
            Some(Node {
                content: Content::Directory,
                ..
            }) => Err(OpError::NotAFile { uri: uri.clone() }),
            Some(node) => {
                if truncate {
                    node.content = Content::File(Vec::new());
                    node.modified = SystemTime::now();
                }
                Ok(())
            }
            None => {
                Self::check_parent(&nodes, &key, uri)?;
                nodes.insert(key, Node::file(Vec::new()));
                Ok(())
            }
        }
    }

    fn read_at(&self, uri: &Uri, offset: usize, buf: &mut [u8]) -> OpResult<usize> {
        self.check()?;
        let nodes = self.server.read_nodes();
        match nodes.get(&key(uri)) {
            Some(Node {
                content: Content::File(data),
                ..
            }) => {
                let start = offset.min(data.len());
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            Some(_) => Err(OpError::NotAFile { uri: uri.clone() }),
            None => Err(OpError::NotFound { uri: uri.clone() }),
        }
    }

    fn append_chunk(&self, uri: &Uri, chunk: &[u8]) -> OpResult<()> {
        self.check()?;
        let mut nodes = self.server.write_nodes();
        match nodes.get_mut(&key(uri)) {
            Some(Node {
                content: Content::File(data),
                modified,
                ..
            }) => {
                data.extend_from_slice(chunk);
                *modified = SystemTime::now();
                Ok(())
            }
            Some(_) => Err(OpError::NotAFile { uri: uri.clone() }),
            // Deleted while the channel was open.
            None => Err(OpError::NotFound { uri: uri.clone() }),
        }
    }

    fn set_modified(&self, uri: &Uri, modified: SystemTime) -> OpResult<()> {
        self.check()?;
        let mut nodes = self.server.write_nodes();
        match nodes.get_mut(&key(uri)) {
            Some(node) => {
                node.modified = modified;
                Ok(())
            }
            None => Err(OpError::NotFound { uri: uri.clone() }),
        }
    }
}

fn node_info(uri: Uri, node: &Node) -> Info {
    let (file_type, size, permissions) = match &node.content {
        Content::File(data) => (
            FileType::File,
            data.len() as u64,
            Permissions::default_file(),
        ),
        Content::Directory => (FileType::Directory, 0, Permissions::default_dir()),
    };
    let mut info = Info::new(uri, file_type);
    info.size = size;
    info.created = Some(node.created);
    info.modified = Some(node.modified);
    info.permissions = Some(permissions);
    info
}

/// Read channel holding its connection until dropped.
struct MemoryReader {
    conn: Pooled<MemoryConnector>,
    uri: Uri,
    offset: usize,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.conn.read_at(&self.uri, self.offset, buf) {
            Ok(n) => {
                self.offset += n;
                Ok(n)
            }
            Err(err) => {
                if err.is_connectivity() {
                    self.conn.invalidate();
                }
                Err(err.into_io())
            }
        }
    }
}

/// Write channel holding its connection until dropped. Every write lands
/// on the server immediately.
struct MemoryWriter {
    conn: Pooled<MemoryConnector>,
    uri: Uri,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.conn.append_chunk(&self.uri, buf) {
            Ok(()) => Ok(buf.len()),
            Err(err) => {
                if err.is_connectivity() {
                    self.conn.invalidate();
                }
                Err(err.into_io())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.conn.check().map_err(OpError::into_io)
    }
}

/// Pooled [`PrimitiveProvider`] for the `mem` scheme.
///
/// # Example
///
/// ```rust
/// use anyfs_ops::{MemoryProvider, ProviderExt, Uri};
///
/// let provider = MemoryProvider::standalone();
/// let file = Uri::parse("mem://alpha/hello.txt").unwrap();
/// provider.write_all(&file, b"hi").unwrap();
/// assert_eq!(provider.read_all(&file).unwrap(), b"hi");
/// assert_eq!(provider.network().server("alpha").connections_opened(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    network: Arc<MemoryNetwork>,
    pool: Arc<ConnectionPool<MemoryConnector>>,
}

impl MemoryProvider {
    /// Provider over `network` with its own connection pool.
    pub fn new(network: Arc<MemoryNetwork>, config: PoolConfig) -> Self {
        let connector = MemoryConnector::new(Arc::clone(&network));
        Self {
            network,
            pool: Arc::new(ConnectionPool::new(connector, config)),
        }
    }

    /// Provider over a fresh network with default pool settings.
    pub fn standalone() -> Self {
        Self::new(MemoryNetwork::new(), PoolConfig::default())
    }

    /// The network this provider talks to.
    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    /// The connection pool of this provider.
    pub fn pool(&self) -> &Arc<ConnectionPool<MemoryConnector>> {
        &self.pool
    }

    fn connect(&self, uri: &Uri) -> OpResult<Pooled<MemoryConnector>> {
        if uri.scheme() != MEMORY_SCHEME {
            return Err(OpError::invalid_argument(format!(
                "not a {MEMORY_SCHEME} URI: {uri}"
            )));
        }
        self.pool.borrow(&Authority::from_uri(uri)?)
    }

    /// Run `f` on a pooled connection for `uri`'s authority, invalidating the
    /// connection on transport errors.
    fn with_connection<T>(
        &self,
        uri: &Uri,
        f: impl FnOnce(&MemoryConnection) -> OpResult<T>,
    ) -> OpResult<T> {
        let mut conn = self.connect(uri)?;
        let outcome = f(&conn);
        if outcome.as_ref().is_err_and(OpError::is_connectivity) {
            conn.invalidate();
        }
        outcome
    }

    fn same_server(source: &Uri, target: &Uri) -> OpResult<()> {
        if source.authority() == target.authority() {
            Ok(())
        } else {
            Err(OpError::invalid_argument(format!(
                "native transfer between servers: {source} -> {target}"
            )))
        }
    }
}

impl PrimitiveProvider for MemoryProvider {
    fn scheme(&self) -> &str {
        MEMORY_SCHEME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_copy: true,
            native_move: true,
            local_paths: false,
            set_last_modified: true,
        }
    }

    fn create_file(&self, uri: &Uri) -> OpResult<()> {
        self.with_connection(uri, |conn| conn.create(uri, Node::file(Vec::new())))
    }

    fn make_dir(&self, uri: &Uri) -> OpResult<()> {
        self.with_connection(uri, |conn| conn.create(uri, Node::directory()))
    }

    fn delete_file(&self, uri: &Uri) -> OpResult<()> {
        self.with_connection(uri, |conn| conn.delete_file(uri))
    }

    fn remove_dir(&self, uri: &Uri) -> OpResult<()> {
        self.with_connection(uri, |conn| conn.remove_dir(uri))
    }

    fn copy_file(&self, source: &Uri, target: &Uri) -> OpResult<u64> {
        Self::same_server(source, target)?;
        self.with_connection(source, |conn| conn.copy_file(source, target))
    }

    fn move_file(&self, source: &Uri, target: &Uri) -> OpResult<()> {
        Self::same_server(source, target)?;
        self.with_connection(source, |conn| conn.move_entry(source, target))
    }

    fn rename_to(&self, source: &Uri, target: &Uri) -> OpResult<Option<Uri>> {
        if source.authority() != target.authority() {
            return Ok(None);
        }
        self.move_file(source, target)?;
        Ok(Some(target.clone()))
    }

    fn read(&self, uri: &Uri) -> OpResult<ReadChannel> {
        let mut conn = self.connect(uri)?;
        match conn.info(uri) {
            Ok(Some(info)) if info.is_file() => Ok(Box::new(MemoryReader {
                conn,
                uri: uri.clone(),
                offset: 0,
            })),
            Ok(Some(_)) => Err(OpError::NotAFile { uri: uri.clone() }),
            Ok(None) => Err(OpError::NotFound { uri: uri.clone() }),
            Err(err) => {
                if err.is_connectivity() {
                    conn.invalidate();
                }
                Err(err)
            }
        }
    }

    fn write(&self, uri: &Uri) -> OpResult<WriteChannel> {
        let mut conn = self.connect(uri)?;
        if let Err(err) = conn.open_write(uri, true) {
            if err.is_connectivity() {
                conn.invalidate();
            }
            return Err(err);
        }
        Ok(Box::new(MemoryWriter {
            conn,
            uri: uri.clone(),
        }))
    }

    fn append(&self, uri: &Uri) -> OpResult<WriteChannel> {
        let mut conn = self.connect(uri)?;
        if let Err(err) = conn.open_write(uri, false) {
            if err.is_connectivity() {
                conn.invalidate();
            }
            return Err(err);
        }
        Ok(Box::new(MemoryWriter {
            conn,
            uri: uri.clone(),
        }))
    }

    fn info(&self, uri: &Uri) -> OpResult<Option<Info>> {
        self.with_connection(uri, |conn| conn.info(uri))
    }

    fn list(&self, uri: &Uri) -> OpResult<Vec<Info>> {
        self.with_connection(uri, |conn| conn.list(uri))
    }

    fn set_last_modified(&self, uri: &Uri, modified: SystemTime) -> OpResult<()> {
        self.with_connection(uri, |conn| conn.set_modified(uri, modified))
    }
}
