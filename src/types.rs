//! Core types shared by providers, handlers and results.

use std::time::SystemTime;

use crate::Uri;

/// Type of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Anything else (symlink target unknown, device, archive member, ...).
    Other,
}

/// Unix-style permissions stored as a mode bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Permissions(u32);

impl Permissions {
    /// Create permissions from a Unix mode (e.g., 0o755).
    #[inline]
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o7777)
    }

    /// Get the raw mode value.
    #[inline]
    pub const fn mode(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the owner may read.
    #[inline]
    pub const fn can_read(&self) -> bool {
        (self.0 & 0o400) != 0
    }

    /// Returns `true` if the owner may write.
    #[inline]
    pub const fn can_write(&self) -> bool {
        (self.0 & 0o200) != 0
    }

    /// Returns `true` if the owner may execute (or traverse, for directories).
    #[inline]
    pub const fn can_execute(&self) -> bool {
        (self.0 & 0o100) != 0
    }

    /// Default permissions for a new file (0o644 = rw-r--r--).
    #[inline]
    pub const fn default_file() -> Self {
        Self(0o644)
    }

    /// Default permissions for a new directory (0o755 = rwxr-xr-x).
    #[inline]
    pub const fn default_dir() -> Self {
        Self(0o755)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::default_file()
    }
}

/// Metadata snapshot of one entry.
///
/// An `Info` does not track later changes of the entry. Timestamps and
/// permissions are optional because not every backend reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Info {
    /// Location of the entry.
    #[cfg_attr(feature = "serde", serde(with = "uri_serde"))]
    pub uri: Uri,
    /// Entry name (last path segment).
    pub name: String,
    /// Entry type.
    pub file_type: FileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Creation time.
    #[cfg_attr(feature = "serde", serde(with = "opt_time_serde"))]
    pub created: Option<SystemTime>,
    /// Last modification time.
    #[cfg_attr(feature = "serde", serde(with = "opt_time_serde"))]
    pub modified: Option<SystemTime>,
    /// Last access time.
    #[cfg_attr(feature = "serde", serde(with = "opt_time_serde"))]
    pub accessed: Option<SystemTime>,
    /// Permissions.
    pub permissions: Option<Permissions>,
}

impl Info {
    /// Minimal snapshot for `uri`; the name is taken from the URI.
    pub fn new(uri: Uri, file_type: FileType) -> Self {
        let name = uri.name().to_owned();
        Self {
            uri,
            name,
            file_type,
            size: 0,
            created: None,
            modified: None,
            accessed: None,
            permissions: None,
        }
    }

    /// Returns `true` if this is a regular file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    /// Returns `true` if this is a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

#[cfg(feature = "serde")]
mod uri_serde {
    use crate::Uri;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(uri: &Uri, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(uri)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Uri, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Uri::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde support for optional SystemTime (when serde feature is enabled).
#[cfg(feature = "serde")]
mod opt_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        time.map(|t| {
            let duration = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
            (duration.as_secs(), duration.subsec_nanos())
        })
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<(u64, u32)> = Deserialize::deserialize(deserializer)?;
        Ok(raw.map(|(secs, nanos)| UNIX_EPOCH + Duration::new(secs, nanos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_takes_name_from_uri() {
        let info = Info::new(Uri::parse("mem://h/a/b.txt").unwrap(), FileType::File);
        assert_eq!(info.name, "b.txt");
        assert!(info.is_file());
        assert!(!info.is_dir());
    }

    #[test]
    fn info_equality_is_structural() {
        let uri = Uri::parse("mem://h/d").unwrap();
        let a = Info::new(uri.clone(), FileType::Directory);
        let b = Info::new(uri, FileType::Directory);
        assert_eq!(a, b);
    }

    #[test]
    fn permissions_from_mode_masks_extra_bits() {
        let p = Permissions::from_mode(0o100755);
        assert_eq!(p.mode(), 0o755);
        assert!(p.can_read() && p.can_write() && p.can_execute());
    }

    #[test]
    fn permissions_defaults() {
        assert_eq!(Permissions::default_file().mode(), 0o644);
        assert_eq!(Permissions::default_dir().mode(), 0o755);
        assert!(!Permissions::from_mode(0o444).can_write());
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FileType>();
        assert_send_sync::<Info>();
        assert_send_sync::<Permissions>();
    }

    #[cfg(feature = "serde")]
    #[test]
    fn info_serde_round_trip() {
        let mut info = Info::new(Uri::parse("mem://h/a.txt").unwrap(), FileType::File);
        info.size = 12;
        info.modified = Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(60));
        let json = serde_json::to_string(&info).unwrap();
        let back: Info = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
