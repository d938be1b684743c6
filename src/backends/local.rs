//! Local disk backend for the `file` scheme.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::{
    Capabilities, FILE_SCHEME, FileType, Info, OpError, OpResult, PrimitiveProvider, ReadChannel,
    Uri, WriteChannel,
};

/// [`PrimitiveProvider`] over `std::fs`.
///
/// URIs map to absolute local paths: `file:///tmp/x` is `/tmp/x`. Only an
/// empty or `localhost` authority is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

impl LocalProvider {
    /// Create the provider.
    pub fn new() -> Self {
        Self
    }

    /// `file` URI of a local path.
    ///
    /// # Errors
    ///
    /// [`OpError::InvalidArgument`] if the path is relative or not UTF-8.
    pub fn uri_for(path: &Path) -> OpResult<Uri> {
        if !path.is_absolute() {
            return Err(OpError::invalid_argument(format!(
                "local path must be absolute: {}",
                path.display()
            )));
        }
        let Some(path) = path.to_str() else {
            return Err(OpError::invalid_argument(format!(
                "local path is not valid UTF-8: {}",
                path.display()
            )));
        };
        Ok(Uri::new(FILE_SCHEME, "", path.replace('\\', "/")))
    }

    fn path(&self, uri: &Uri) -> OpResult<PathBuf> {
        match uri.authority() {
            "" | "localhost" => {}
            other => {
                return Err(OpError::invalid_argument(format!(
                    "file URIs cannot address remote host {other}: {uri}"
                )));
            }
        }
        Ok(PathBuf::from(uri.without_trailing_separator().path()))
    }
}

fn info_from_metadata(uri: Uri, metadata: &fs::Metadata) -> Info {
    let file_type = if metadata.is_dir() {
        FileType::Directory
    } else if metadata.is_file() {
        FileType::File
    } else {
        FileType::Other
    };
    let mut info = Info::new(uri, file_type);
    if file_type == FileType::File {
        info.size = metadata.len();
    }
    info.created = metadata.created().ok();
    info.modified = metadata.modified().ok();
    info.accessed = metadata.accessed().ok();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        info.permissions = Some(crate::Permissions::from_mode(
            metadata.permissions().mode(),
        ));
    }
    info
}

impl PrimitiveProvider for LocalProvider {
    fn scheme(&self) -> &str {
        FILE_SCHEME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_copy: true,
            native_move: true,
            local_paths: true,
            set_last_modified: true,
        }
    }

    fn create_file(&self, uri: &Uri) -> OpResult<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(uri)?)
            .map(drop)
            .map_err(|e| OpError::io("create", uri, e))
    }

    fn make_dir(&self, uri: &Uri) -> OpResult<()> {
        fs::create_dir(self.path(uri)?).map_err(|e| OpError::io("create", uri, e))
    }

    fn delete_file(&self, uri: &Uri) -> OpResult<()> {
        let path = self.path(uri)?;
        // remove_file on a directory reports different kinds per platform
        if path.is_dir() {
            return Err(OpError::NotAFile { uri: uri.clone() });
        }
        fs::remove_file(path).map_err(|e| OpError::io("delete", uri, e))
    }

    fn remove_dir(&self, uri: &Uri) -> OpResult<()> {
        let path = self.path(uri)?;
        if path.is_file() {
            return Err(OpError::NotADirectory { uri: uri.clone() });
        }
        fs::remove_dir(path).map_err(|e| OpError::io("delete", uri, e))
    }

    fn copy_file(&self, source: &Uri, target: &Uri) -> OpResult<u64> {
        fs::copy(self.path(source)?, self.path(target)?).map_err(|e| OpError::io("copy", source, e))
    }

    fn move_file(&self, source: &Uri, target: &Uri) -> OpResult<()> {
        fs::rename(self.path(source)?, self.path(target)?)
            .map_err(|e| OpError::io("move", source, e))
    }

    fn rename_to(&self, source: &Uri, target: &Uri) -> OpResult<Option<Uri>> {
        match self.move_file(source, target) {
            Ok(()) => Ok(Some(target.clone())),
            Err(err) if err.is_cross_device() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn read(&self, uri: &Uri) -> OpResult<ReadChannel> {
        let path = self.path(uri)?;
        if path.is_dir() {
            return Err(OpError::NotAFile { uri: uri.clone() });
        }
        let file = File::open(path).map_err(|e| OpError::io("read", uri, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn write(&self, uri: &Uri) -> OpResult<WriteChannel> {
        let file = File::create(self.path(uri)?).map_err(|e| OpError::io("write", uri, e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn append(&self, uri: &Uri) -> OpResult<WriteChannel> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.path(uri)?)
            .map_err(|e| OpError::io("append", uri, e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn info(&self, uri: &Uri) -> OpResult<Option<Info>> {
        match fs::metadata(self.path(uri)?) {
            Ok(metadata) => Ok(Some(info_from_metadata(uri.clone(), &metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OpError::io("info", uri, e)),
        }
    }

    fn list(&self, uri: &Uri) -> OpResult<Vec<Info>> {
        let path = self.path(uri)?;
        if path.is_file() {
            return Err(OpError::NotADirectory { uri: uri.clone() });
        }
        let mut children = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| OpError::io("list", uri, e))? {
            let entry = entry.map_err(|e| OpError::io("list", uri, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            // Follow symlinks; fall back to the link itself when dangling.
            let metadata = match fs::metadata(entry.path()) {
                Ok(metadata) => metadata,
                Err(_) => entry.metadata().map_err(|e| OpError::io("list", uri, e))?,
            };
            children.push(info_from_metadata(uri.child(&name), &metadata));
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    fn set_last_modified(&self, uri: &Uri, modified: SystemTime) -> OpResult<()> {
        File::open(self.path(uri)?)
            .and_then(|file| file.set_modified(modified))
            .map_err(|e| OpError::io("set last modified", uri, e))
    }

    fn local_path(&self, uri: &Uri) -> OpResult<Option<PathBuf>> {
        self.path(uri).map(Some)
    }
}
