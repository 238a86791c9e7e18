//! File system entry types.
//!
//! An [`Entry`] is one file system object: a file, directory, symbolic link,
//! device, fifo or socket, or the [`EntryType::Missing`] sentinel that stands
//! in for a path absent from one of several trees walked in tandem.
//!
//! Entries are shared through [`EntryRef`] handles. A directory owns its
//! children; children never point back at their parent. The two expensive
//! properties, a directory's children and a file's content hash, are resolved
//! on first access and memoized on the entry.

use std::cell::{Cell, RefCell};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt};

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter};
use tracing::trace;

use crate::error::{RecordError, ScanError};

/// Number of bytes read per round when hashing or comparing file contents.
pub const HASH_CHUNK_SIZE: usize = 16 * 4096;

/// Minimum modification time difference, in seconds, reported as newer/older.
pub const TIME_THRESHOLD: f64 = 1.0;

/// Mask for the file type bits of a mode.
pub const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

/// Shared handle to an entry.
pub type EntryRef = Rc<Entry>;

/// Children of a directory, keyed by name.
pub type Children = IndexMap<OsString, EntryRef>;

/// SHA-256 content hash, as stored in scanfiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash an in-memory byte string.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self::from_digest(Sha256::digest(data))
    }

    fn from_digest(digest: impl AsRef<[u8]>) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest.as_ref());
        Self(bytes)
    }

    /// Hash of the empty byte string.
    pub fn empty() -> Self {
        Self::of_bytes(&[])
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex digest.
    pub fn from_hex(text: &str) -> Result<Self, RecordError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(text, &mut bytes)
            .map_err(|_| RecordError::InvalidHash(text.to_string()))?;
        Ok(Self(bytes))
    }
}

/// Memoized state of a file's content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashState {
    /// Not yet computed; the file is read on first access.
    Pending,
    /// Known to be unavailable; the file system is never consulted.
    Unavailable,
    /// Computed or loaded hash.
    Known(ContentHash),
}

/// Kind of file system object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    Missing,
}

impl EntryType {
    /// Single letter used in scanfiles and listings.
    pub fn code(self) -> char {
        match self {
            Self::File => 'f',
            Self::Directory => 'd',
            Self::Symlink => 'l',
            Self::BlockDevice => 'b',
            Self::CharDevice => 'c',
            Self::Fifo => 'p',
            Self::Socket => 's',
            Self::Missing => '-',
        }
    }

    /// Look up a storable type by its letter. `Missing` has no code.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'f' => Some(Self::File),
            'd' => Some(Self::Directory),
            'l' => Some(Self::Symlink),
            'b' => Some(Self::BlockDevice),
            'c' => Some(Self::CharDevice),
            'p' => Some(Self::Fifo),
            's' => Some(Self::Socket),
            _ => None,
        }
    }

    /// Human readable name.
    pub fn description(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symbolic link",
            Self::BlockDevice => "block device",
            Self::CharDevice => "char device",
            Self::Fifo => "fifo",
            Self::Socket => "socket",
            Self::Missing => "missing file",
        }
    }

    /// The `S_IFMT` bits of this type. Zero for `Missing`.
    pub fn format_bits(self) -> u32 {
        match self {
            Self::File => S_IFREG,
            Self::Directory => S_IFDIR,
            Self::Symlink => S_IFLNK,
            Self::BlockDevice => S_IFBLK,
            Self::CharDevice => S_IFCHR,
            Self::Fifo => S_IFIFO,
            Self::Socket => S_IFSOCK,
            Self::Missing => 0,
        }
    }

    /// Classify the type bits of a raw mode.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & S_IFMT {
            S_IFREG => Some(Self::File),
            S_IFDIR => Some(Self::Directory),
            S_IFLNK => Some(Self::Symlink),
            S_IFBLK => Some(Self::BlockDevice),
            S_IFCHR => Some(Self::CharDevice),
            S_IFIFO => Some(Self::Fifo),
            S_IFSOCK => Some(Self::Socket),
            _ => None,
        }
    }

    /// Devices, fifos and sockets.
    pub fn is_special(self) -> bool {
        matches!(
            self,
            Self::BlockDevice | Self::CharDevice | Self::Fifo | Self::Socket
        )
    }

    fn mode_char(self) -> char {
        match self {
            Self::File => '-',
            Self::Missing => '?',
            other => other.code(),
        }
    }
}

/// Metadata shared by every entry type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Permission bits only; type bits are stripped.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub device_id: u64,
    /// Size in bytes. Always zero for directories.
    pub size: u64,
    /// Modification time in fractional seconds since the epoch.
    pub mtime: f64,
}

impl Metadata {
    #[cfg(unix)]
    fn from_fs(metadata: &fs::Metadata) -> Self {
        Self {
            mode: metadata.mode() & 0o7777,
            uid: metadata.uid(),
            gid: metadata.gid(),
            device_id: metadata.dev(),
            size: metadata.len(),
            mtime: metadata.mtime() as f64 + metadata.mtime_nsec() as f64 / 1e9,
        }
    }

    #[cfg(not(unix))]
    fn from_fs(metadata: &fs::Metadata) -> Self {
        let mode = if metadata.permissions().readonly() {
            0o444
        } else {
            0o644
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Self {
            mode,
            uid: 0,
            gid: 0,
            device_id: 0,
            size: metadata.len(),
            mtime,
        }
    }

    /// Modification time in the local timezone.
    pub fn modified(&self) -> Option<DateTime<Local>> {
        let secs = self.mtime.floor();
        let nanos = ((self.mtime - secs) * 1e9) as u32;
        DateTime::from_timestamp(secs as i64, nanos).map(|t| t.with_timezone(&Local))
    }
}

/// A single difference between two entries of the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum DifferenceTag {
    #[strum(to_string = "type mismatch")]
    TypeMismatch,
    #[strum(to_string = "newer")]
    Newer,
    #[strum(to_string = "older")]
    Older,
    #[strum(to_string = "permissions differ")]
    PermissionsDiffer,
    #[strum(to_string = "UID differs")]
    UidDiffers,
    #[strum(to_string = "GID differs")]
    GidDiffers,
    #[strum(to_string = "size differs")]
    SizeDiffers,
    #[strum(to_string = "contents differ")]
    ContentDiffers,
    #[strum(to_string = "link differs")]
    LinkDiffers,
    /// One side has no stored hash to compare against.
    #[strum(to_string = "cannot compare contents")]
    CannotCompare,
}

impl DifferenceTag {
    /// Check if this is a modification time difference.
    pub fn is_time(self) -> bool {
        matches!(self, Self::Newer | Self::Older)
    }
}

/// Decoded fields of one serialized record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFields {
    pub entry_type: EntryType,
    pub size: u64,
    /// Permission bits, optionally carrying type bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: f64,
    /// Hash hex for files, link target for symlinks, empty otherwise.
    pub payload: OsString,
}

impl RecordFields {
    /// Check the fields for consistency without building an entry.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.entry_type == EntryType::Missing {
            return Err(RecordError::NotStorable {
                entry_type: self.entry_type,
            });
        }
        let type_bits = self.mode & S_IFMT;
        if type_bits != 0 && type_bits != self.entry_type.format_bits() {
            return Err(RecordError::ModeMismatch {
                entry_type: self.entry_type,
                mode: self.mode,
            });
        }
        if self.entry_type == EntryType::File {
            self.stored_hash()?;
        }
        Ok(())
    }

    fn stored_hash(&self) -> Result<HashState, RecordError> {
        if !self.payload.is_empty() {
            let text = self
                .payload
                .to_str()
                .ok_or_else(|| RecordError::InvalidHash(self.payload.to_string_lossy().into()))?;
            return Ok(HashState::Known(ContentHash::from_hex(text)?));
        }
        if self.size == 0 {
            Ok(HashState::Known(ContentHash::empty()))
        } else {
            Ok(HashState::Unavailable)
        }
    }
}

enum ChildState {
    Unresolved,
    Resolved(Rc<Children>),
    Closed,
}

enum EntryKind {
    File { hash: Cell<HashState> },
    Directory { children: RefCell<ChildState> },
    Symlink { target: OsString },
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    Missing,
}

/// A single file system object.
pub struct Entry {
    name: OsString,
    parent: PathBuf,
    metadata: Metadata,
    kind: EntryKind,
    excluded: Cell<bool>,
    tree_index: Cell<Option<usize>>,
}

impl Entry {
    fn new(name: OsString, parent: PathBuf, metadata: Metadata, kind: EntryKind) -> Self {
        Self {
            name,
            parent,
            metadata,
            kind,
            excluded: Cell::new(false),
            tree_index: Cell::new(None),
        }
    }

    /// Read the metadata of `parent/name` without following symlinks.
    ///
    /// Directories are not read; their children are listed on the first
    /// call to [`Entry::children`]. Symlink targets are read eagerly.
    pub fn from_filesystem(
        name: impl Into<OsString>,
        parent: impl Into<PathBuf>,
    ) -> Result<EntryRef, ScanError> {
        let name = name.into();
        let parent = parent.into();
        let path = parent.join(&name);
        let metadata = fs::symlink_metadata(&path).map_err(|e| ScanError::io(&path, e))?;
        Self::from_metadata(name, parent, &metadata)
    }

    /// Create a traversal root from a user supplied path.
    pub fn root(path: impl AsRef<Path>) -> Result<EntryRef, ScanError> {
        // Collecting the components drops trailing separators
        let name: PathBuf = path.as_ref().components().collect();
        Self::from_filesystem(name.into_os_string(), PathBuf::new())
    }

    /// Placeholder for a path that does not exist in one of the trees.
    pub fn missing(name: impl Into<OsString>, parent: impl Into<PathBuf>) -> EntryRef {
        Rc::new(Self::new(
            name.into(),
            parent.into(),
            Metadata::default(),
            EntryKind::Missing,
        ))
    }

    /// Build an entry from decoded record fields.
    ///
    /// `children` is used for directories only. File records with an empty
    /// payload get the empty-content hash when their size is zero and are
    /// marked as having no hash otherwise, so a loaded file never reads from
    /// the file system.
    pub fn from_record(
        name: impl Into<OsString>,
        parent: impl Into<PathBuf>,
        fields: &RecordFields,
        children: Children,
    ) -> Result<EntryRef, RecordError> {
        fields.validate()?;

        let mut metadata = Metadata {
            mode: fields.mode & 0o7777,
            uid: fields.uid,
            gid: fields.gid,
            device_id: 0,
            size: fields.size,
            mtime: fields.mtime,
        };
        let kind = match fields.entry_type {
            EntryType::File => EntryKind::File {
                hash: Cell::new(fields.stored_hash()?),
            },
            EntryType::Directory => {
                metadata.size = 0;
                EntryKind::Directory {
                    children: RefCell::new(ChildState::Resolved(Rc::new(children))),
                }
            }
            EntryType::Symlink => EntryKind::Symlink {
                target: fields.payload.clone(),
            },
            EntryType::BlockDevice => EntryKind::BlockDevice,
            EntryType::CharDevice => EntryKind::CharDevice,
            EntryType::Fifo => EntryKind::Fifo,
            EntryType::Socket => EntryKind::Socket,
            EntryType::Missing => {
                return Err(RecordError::NotStorable {
                    entry_type: fields.entry_type,
                });
            }
        };
        Ok(Rc::new(Self::new(name.into(), parent.into(), metadata, kind)))
    }

    fn from_metadata(
        name: OsString,
        parent: PathBuf,
        fs_metadata: &fs::Metadata,
    ) -> Result<EntryRef, ScanError> {
        let path = parent.join(&name);
        let entry_type = entry_type_of(&fs_metadata.file_type())
            .ok_or_else(|| ScanError::UnknownFileType { path: path.clone() })?;
        let mut metadata = Metadata::from_fs(fs_metadata);

        let kind = match entry_type {
            EntryType::File => EntryKind::File {
                hash: Cell::new(HashState::Pending),
            },
            EntryType::Directory => {
                metadata.size = 0;
                EntryKind::Directory {
                    children: RefCell::new(ChildState::Unresolved),
                }
            }
            EntryType::Symlink => {
                let target = fs::read_link(&path).map_err(|e| ScanError::io(&path, e))?;
                EntryKind::Symlink {
                    target: target.into_os_string(),
                }
            }
            EntryType::BlockDevice => EntryKind::BlockDevice,
            EntryType::CharDevice => EntryKind::CharDevice,
            EntryType::Fifo => EntryKind::Fifo,
            EntryType::Socket => EntryKind::Socket,
            EntryType::Missing => EntryKind::Missing,
        };
        Ok(Rc::new(Self::new(name, parent, metadata, kind)))
    }

    /// Entry name (not full path).
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Path of the directory holding this entry.
    pub fn parent(&self) -> &Path {
        &self.parent
    }

    /// Complete path of the entry.
    pub fn full_path(&self) -> PathBuf {
        self.parent.join(&self.name)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    pub fn mode(&self) -> u32 {
        self.metadata.mode
    }

    pub fn uid(&self) -> u32 {
        self.metadata.uid
    }

    pub fn gid(&self) -> u32 {
        self.metadata.gid
    }

    pub fn device_id(&self) -> u64 {
        self.metadata.device_id
    }

    pub fn mtime(&self) -> f64 {
        self.metadata.mtime
    }

    /// Kind of this entry.
    pub fn entry_type(&self) -> EntryType {
        match self.kind {
            EntryKind::File { .. } => EntryType::File,
            EntryKind::Directory { .. } => EntryType::Directory,
            EntryKind::Symlink { .. } => EntryType::Symlink,
            EntryKind::BlockDevice => EntryType::BlockDevice,
            EntryKind::CharDevice => EntryType::CharDevice,
            EntryKind::Fifo => EntryType::Fifo,
            EntryKind::Socket => EntryType::Socket,
            EntryKind::Missing => EntryType::Missing,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.kind, EntryKind::Missing)
    }

    /// Symlink target, for symbolic links only.
    pub fn link_target(&self) -> Option<&OsStr> {
        match &self.kind {
            EntryKind::Symlink { target } => Some(target),
            _ => None,
        }
    }

    /// Whether a traversal rule matched this entry.
    pub fn is_excluded(&self) -> bool {
        self.excluded.get()
    }

    /// Mark the entry as excluded. Exclusion is never cleared.
    pub fn set_excluded(&self) {
        self.excluded.set(true);
    }

    /// Index of the tree this entry was indexed from, if any.
    pub fn tree_index(&self) -> Option<usize> {
        self.tree_index.get()
    }

    pub fn set_tree_index(&self, index: usize) {
        self.tree_index.set(Some(index));
    }

    /// Current hash state, for files only.
    pub fn hash_state(&self) -> Option<HashState> {
        match &self.kind {
            EntryKind::File { hash } => Some(hash.get()),
            _ => None,
        }
    }

    /// Content hash of a file, computed on first access.
    ///
    /// Returns `None` for non-files and for files whose hash is known to be
    /// unavailable.
    pub fn content_hash(&self) -> Result<Option<ContentHash>, ScanError> {
        let EntryKind::File { hash } = &self.kind else {
            return Ok(None);
        };
        match hash.get() {
            HashState::Known(known) => Ok(Some(known)),
            HashState::Unavailable => Ok(None),
            HashState::Pending => {
                let path = self.full_path();
                let computed = hash_file(&path).map_err(|e| ScanError::io(&path, e))?;
                hash.set(HashState::Known(computed));
                Ok(Some(computed))
            }
        }
    }

    /// Children of a directory, listed from the file system on first access.
    ///
    /// Non-directories have no children. Once resolved, the collection stays
    /// the same until [`Entry::close`] is called.
    pub fn children(&self) -> Result<Rc<Children>, ScanError> {
        let EntryKind::Directory { children } = &self.kind else {
            return Ok(Rc::default());
        };
        let mut state = children.borrow_mut();
        match &*state {
            ChildState::Resolved(resolved) => Ok(Rc::clone(resolved)),
            ChildState::Closed => Err(ScanError::Closed {
                path: self.full_path(),
            }),
            ChildState::Unresolved => {
                let resolved = Rc::new(read_children(&self.full_path())?);
                *state = ChildState::Resolved(Rc::clone(&resolved));
                Ok(resolved)
            }
        }
    }

    /// Whether the children are resolved and held in memory.
    pub fn children_resolved(&self) -> bool {
        match &self.kind {
            EntryKind::Directory { children } => {
                matches!(*children.borrow(), ChildState::Resolved(_))
            }
            _ => false,
        }
    }

    /// Release the children of a directory.
    pub fn close(&self) {
        if let EntryKind::Directory { children } = &self.kind {
            *children.borrow_mut() = ChildState::Closed;
        }
    }

    /// List the differences between this entry and `other`.
    ///
    /// File contents are compared through the hashes when either side has
    /// one, and byte for byte otherwise.
    pub fn compare(&self, other: &Entry) -> Result<Vec<DifferenceTag>, ScanError> {
        let mut tags = Vec::new();
        if self.entry_type() != other.entry_type() {
            tags.push(DifferenceTag::TypeMismatch);
            return Ok(tags);
        }

        let delta = self.metadata.mtime - other.metadata.mtime;
        if delta > TIME_THRESHOLD {
            tags.push(DifferenceTag::Newer);
        }
        if delta < -TIME_THRESHOLD {
            tags.push(DifferenceTag::Older);
        }
        if self.metadata.mode != other.metadata.mode {
            tags.push(DifferenceTag::PermissionsDiffer);
        }
        if self.metadata.uid != other.metadata.uid {
            tags.push(DifferenceTag::UidDiffers);
        }
        if self.metadata.gid != other.metadata.gid {
            tags.push(DifferenceTag::GidDiffers);
        }

        match (&self.kind, &other.kind) {
            (EntryKind::File { hash: ours }, EntryKind::File { hash: theirs }) => {
                if self.metadata.size != other.metadata.size {
                    tags.push(DifferenceTag::SizeDiffers);
                } else {
                    match (ours.get(), theirs.get()) {
                        (HashState::Unavailable, HashState::Unavailable) => {}
                        (HashState::Unavailable, _) | (_, HashState::Unavailable) => {
                            tags.push(DifferenceTag::CannotCompare);
                        }
                        (HashState::Known(_), _) | (_, HashState::Known(_)) => {
                            if self.content_hash()? != other.content_hash()? {
                                tags.push(DifferenceTag::ContentDiffers);
                            }
                        }
                        (HashState::Pending, HashState::Pending) => {
                            if !files_identical(&self.full_path(), &other.full_path())? {
                                tags.push(DifferenceTag::ContentDiffers);
                            }
                        }
                    }
                }
            }
            (EntryKind::Symlink { target: ours }, EntryKind::Symlink { target: theirs }) => {
                if ours != theirs {
                    tags.push(DifferenceTag::LinkDiffers);
                }
            }
            _ => {}
        }
        Ok(tags)
    }

    /// `ls -l` style rendering of type and permissions.
    pub fn mode_string(&self) -> String {
        let mode = self.metadata.mode;
        let mut out = String::with_capacity(10);
        out.push(self.entry_type().mode_char());
        for (shift, special, marker) in [(6, 0o4000, 's'), (3, 0o2000, 's'), (0, 0o1000, 't')] {
            let bits = (mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(match (bits & 0o1 != 0, mode & special != 0) {
                (true, true) => marker,
                (false, true) => marker.to_ascii_uppercase(),
                (true, false) => 'x',
                (false, false) => '-',
            });
        }
        out
    }

    /// Variant payload as text: the hash of non-empty files, the target of
    /// symlinks, nothing for other types.
    pub fn payload_text(&self) -> Result<String, ScanError> {
        match &self.kind {
            EntryKind::File { .. } if self.metadata.size > 0 => Ok(self
                .content_hash()?
                .map(|h| h.to_hex())
                .unwrap_or_default()),
            EntryKind::Symlink { target } => Ok(target.to_string_lossy().into_owned()),
            _ => Ok(String::new()),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("type", &self.entry_type())
            .field("path", &self.full_path())
            .field("excluded", &self.excluded.get())
            .finish()
    }
}

fn read_children(path: &Path) -> Result<Children, ScanError> {
    trace!(path = %path.display(), "Listing directory");
    let mut children = Children::new();
    for dirent in fs::read_dir(path).map_err(|e| ScanError::io(path, e))? {
        let dirent = dirent.map_err(|e| ScanError::io(path, e))?;
        let metadata = dirent
            .metadata()
            .map_err(|e| ScanError::io(dirent.path(), e))?;
        let name = dirent.file_name();
        let child = Entry::from_metadata(name.clone(), path.to_path_buf(), &metadata)?;
        children.insert(name, child);
    }
    Ok(children)
}

fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let bytes_read = read_chunk(&mut file, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(ContentHash::from_digest(hasher.finalize()))
}

fn files_identical(left: &Path, right: &Path) -> Result<bool, ScanError> {
    let mut left_file = fs::File::open(left).map_err(|e| ScanError::io(left, e))?;
    let mut right_file = fs::File::open(right).map_err(|e| ScanError::io(right, e))?;
    let mut left_buf = vec![0u8; HASH_CHUNK_SIZE];
    let mut right_buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let left_read = read_chunk(&mut left_file, &mut left_buf).map_err(|e| ScanError::io(left, e))?;
        let right_read =
            read_chunk(&mut right_file, &mut right_buf).map_err(|e| ScanError::io(right, e))?;
        if left_buf[..left_read] != right_buf[..right_read] {
            return Ok(false);
        }
        if left_read == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buffer` as far as possible, returning fewer bytes only at end of file.
fn read_chunk(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(unix)]
fn entry_type_of(file_type: &fs::FileType) -> Option<EntryType> {
    if file_type.is_file() {
        Some(EntryType::File)
    } else if file_type.is_dir() {
        Some(EntryType::Directory)
    } else if file_type.is_symlink() {
        Some(EntryType::Symlink)
    } else if file_type.is_block_device() {
        Some(EntryType::BlockDevice)
    } else if file_type.is_char_device() {
        Some(EntryType::CharDevice)
    } else if file_type.is_fifo() {
        Some(EntryType::Fifo)
    } else if file_type.is_socket() {
        Some(EntryType::Socket)
    } else {
        None
    }
}

#[cfg(not(unix))]
fn entry_type_of(file_type: &fs::FileType) -> Option<EntryType> {
    if file_type.is_file() {
        Some(EntryType::File)
    } else if file_type.is_dir() {
        Some(EntryType::Directory)
    } else if file_type.is_symlink() {
        Some(EntryType::Symlink)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    fn record(entry_type: EntryType, mode: u32, mtime: f64, payload: &str) -> RecordFields {
        RecordFields {
            entry_type,
            size: payload.len() as u64,
            mode,
            uid: 1000,
            gid: 1000,
            mtime,
            payload: payload.into(),
        }
    }

    fn file(mtime: f64, hash: &ContentHash) -> EntryRef {
        let mut fields = record(EntryType::File, 0o644, mtime, &hash.to_hex());
        fields.size = 6;
        Entry::from_record("a", "tree", &fields, Children::new()).unwrap()
    }

    #[test]
    fn test_type_codes_round_trip() {
        for entry_type in EntryType::iter().filter(|t| *t != EntryType::Missing) {
            assert_eq!(EntryType::from_code(entry_type.code()), Some(entry_type));
            assert_eq!(EntryType::from_mode(entry_type.format_bits()), Some(entry_type));
        }
        assert_eq!(EntryType::from_code('-'), None);
        assert_eq!(EntryType::from_code('x'), None);
    }

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::of_bytes(b"foobar");
        assert_eq!(
            hash.to_hex(),
            "c3ab8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f2"
        );
        assert_eq!(
            ContentHash::empty().to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(ContentHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert!(ContentHash::from_hex("abc").is_err());
    }

    #[test]
    fn test_missing_entry_defaults() {
        let missing = Entry::missing("x", "left");
        assert!(missing.is_missing());
        assert_eq!(missing.metadata(), &Metadata::default());
        assert_eq!(missing.full_path(), PathBuf::from("left/x"));
        assert!(missing.children().unwrap().is_empty());
    }

    #[test]
    fn test_from_record_rejects_mode_mismatch() {
        let fields = record(EntryType::File, 0o40755, 0.0, "");
        let err = Entry::from_record("a", "", &fields, Children::new()).unwrap_err();
        assert!(matches!(err, RecordError::ModeMismatch { .. }));

        let fields = record(EntryType::Directory, 0o40755, 0.0, "");
        let dir = Entry::from_record("a", "", &fields, Children::new()).unwrap();
        assert_eq!(dir.mode(), 0o755);
    }

    #[test]
    fn test_from_record_hash_states() {
        let mut fields = record(EntryType::File, 0o644, 0.0, "");
        let empty = Entry::from_record("a", "", &fields, Children::new()).unwrap();
        assert_eq!(empty.hash_state(), Some(HashState::Known(ContentHash::empty())));

        fields.size = 10;
        let unknown = Entry::from_record("a", "", &fields, Children::new()).unwrap();
        assert_eq!(unknown.hash_state(), Some(HashState::Unavailable));
        assert_eq!(unknown.content_hash().unwrap(), None);
    }

    #[test]
    fn test_compare_time_threshold() {
        let hash = ContentHash::of_bytes(b"foobar");
        let a = file(100.0, &hash);
        assert!(a.compare(&file(100.9, &hash)).unwrap().is_empty());
        assert_eq!(a.compare(&file(98.0, &hash)).unwrap(), vec![DifferenceTag::Newer]);
        assert_eq!(a.compare(&file(102.0, &hash)).unwrap(), vec![DifferenceTag::Older]);
    }

    #[test]
    fn test_compare_content_by_hash() {
        let a = file(0.0, &ContentHash::of_bytes(b"foobar"));
        let b = file(0.0, &ContentHash::of_bytes(b"barfoo"));
        assert_eq!(a.compare(&b).unwrap(), vec![DifferenceTag::ContentDiffers]);
    }

    #[test]
    fn test_compare_type_mismatch_stops() {
        let a = file(0.0, &ContentHash::empty());
        let dir = Entry::from_record(
            "a",
            "tree",
            &record(EntryType::Directory, 0o755, 50.0, ""),
            Children::new(),
        )
        .unwrap();
        assert_eq!(a.compare(&dir).unwrap(), vec![DifferenceTag::TypeMismatch]);
    }

    #[test]
    fn test_compare_links() {
        let a = Entry::from_record("l", "", &record(EntryType::Symlink, 0o777, 0.0, "x"), Children::new()).unwrap();
        let b = Entry::from_record("l", "", &record(EntryType::Symlink, 0o777, 0.0, "y"), Children::new()).unwrap();
        assert_eq!(a.compare(&b).unwrap(), vec![DifferenceTag::LinkDiffers]);
        assert_eq!(a.link_target(), Some(OsStr::new("x")));
    }

    #[test]
    fn test_mode_string() {
        let dir = Entry::from_record(
            "d",
            "",
            &record(EntryType::Directory, 0o1755, 0.0, ""),
            Children::new(),
        )
        .unwrap();
        assert_eq!(dir.mode_string(), "drwxr-xr-t");

        let suid = Entry::from_record("f", "", &record(EntryType::File, 0o4644, 0.0, ""), Children::new()).unwrap();
        assert_eq!(suid.mode_string(), "-rwSr--r--");
    }

    #[test]
    fn test_excluded_is_sticky() {
        let missing = Entry::missing("x", "");
        assert!(!missing.is_excluded());
        missing.set_excluded();
        missing.set_excluded();
        assert!(missing.is_excluded());
    }
}
