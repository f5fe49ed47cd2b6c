//! Store metadata types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Read/write/execute flags for one permission class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessBits {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl AccessBits {
    /// Build from the low three bits of `bits` (`r=4 w=2 x=1`).
    pub fn from_octal(bits: u32) -> Self {
        Self {
            read: bits & 0o4 != 0,
            write: bits & 0o2 != 0,
            execute: bits & 0o1 != 0,
        }
    }

    pub fn to_octal(self) -> u32 {
        (u32::from(self.read) << 2) | (u32::from(self.write) << 1) | u32::from(self.execute)
    }
}

impl fmt::Display for AccessBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.read { 'r' } else { '-' };
        let w = if self.write { 'w' } else { '-' };
        let x = if self.execute { 'x' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

/// Owner, group and other permission triples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    pub owner: AccessBits,
    pub group: AccessBits,
    pub other: AccessBits,
}

impl Permissions {
    /// Build from a Unix mode; bits above `0o777` are ignored.
    pub fn from_mode(mode: u32) -> Self {
        Self {
            owner: AccessBits::from_octal(mode >> 6),
            group: AccessBits::from_octal(mode >> 3),
            other: AccessBits::from_octal(mode),
        }
    }

    pub fn mode(&self) -> u32 {
        (self.owner.to_octal() << 6) | (self.group.to_octal() << 3) | self.other.to_octal()
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.owner, self.group, self.other)
    }
}

/// Metadata snapshot for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Owning user name.
    pub owner: String,
    /// Owning group name.
    pub group: String,
    pub permissions: Permissions,
    pub kind: FileType,
    /// Size in bytes, 0 for directories.
    pub size: u64,
    /// Last modification time.
    pub mtime: SystemTime,
}

impl Metadata {
    pub fn file(owner: impl Into<String>, group: impl Into<String>, mode: u32, size: u64) -> Self {
        Self {
            owner: owner.into(),
            group: group.into(),
            permissions: Permissions::from_mode(mode),
            kind: FileType::File,
            size,
            mtime: SystemTime::now(),
        }
    }

    pub fn directory(owner: impl Into<String>, group: impl Into<String>, mode: u32) -> Self {
        Self {
            owner: owner.into(),
            group: group.into(),
            permissions: Permissions::from_mode(mode),
            kind: FileType::Directory,
            size: 0,
            mtime: SystemTime::now(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}
