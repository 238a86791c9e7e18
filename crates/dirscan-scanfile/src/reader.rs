//! Scanfile reading.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use dirscan_core::{Children, Entry, EntryRef, EntryType, RecordFields};

use crate::error::{DataError, ScanfileError};
use crate::quote::bytes_to_os;
use crate::record::Record;
use crate::{HEADER_PREFIX, SCANFILE_VERSIONS};

/// Check whether `path` is a readable scanfile.
///
/// Missing paths and non-files are not scanfiles. Failing to open an
/// existing file is an error.
pub fn is_scanfile(path: impl AsRef<Path>) -> Result<bool, ScanfileError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Ok(false);
    }
    let file = File::open(path).map_err(|e| ScanfileError::io(path, e))?;
    let mut line = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut line)
        .map_err(|e| ScanfileError::io(path, e))?;
    Ok(check_header(&line, path).is_ok())
}

/// Load the tree stored in the scanfile at `path`.
///
/// `root` selects a directory inside the file, such as `sub` or `./sub`;
/// the top-level directory is used when it is `None`.
pub fn read_scanfile(path: impl AsRef<Path>, root: Option<&str>) -> Result<EntryRef, ScanfileError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ScanfileError::io(path, e))?;
    parse_scanfile(BufReader::new(file), path, root)
}

/// Load a scanfile from any reader. `file` names the source in errors, and
/// its base name becomes the name of the loaded top-level directory.
pub fn parse_scanfile<R: BufRead>(
    mut reader: R,
    file: &Path,
    root: Option<&str>,
) -> Result<EntryRef, ScanfileError> {
    let mut line = Vec::new();
    if reader
        .read_until(b'\n', &mut line)
        .map_err(|e| ScanfileError::io(file, e))?
        == 0
    {
        return Err(ScanfileError::MissingHeader {
            file: file.to_path_buf(),
        });
    }
    check_header(&line, file)?;

    let base_name = file
        .file_name()
        .unwrap_or(file.as_os_str())
        .to_os_string();
    let mut builder = TreeBuilder::new(base_name);

    let mut lineno = 1;
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| ScanfileError::io(file, e))?;
        if read == 0 {
            break;
        }
        lineno += 1;

        let text = trim_line_end(&line);
        if text.iter().all(u8::is_ascii_whitespace) || text[0] == b'#' {
            continue;
        }
        builder
            .add(text, lineno)
            .map_err(|source| ScanfileError::Data {
                file: file.to_path_buf(),
                line: lineno,
                source,
            })?;
    }

    let entries = builder.len();
    let root = builder.finish(file, root)?;
    debug!(file = %file.display(), entries, "Loaded scanfile");
    Ok(root)
}

fn check_header(line: &[u8], file: &Path) -> Result<(), ScanfileError> {
    if line.is_empty() {
        return Err(ScanfileError::MissingHeader {
            file: file.to_path_buf(),
        });
    }
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end();
    if !line.starts_with(HEADER_PREFIX) {
        return Err(ScanfileError::MalformedHeader {
            file: file.to_path_buf(),
        });
    }
    let version = &line[HEADER_PREFIX.len() - 1..];
    if !SCANFILE_VERSIONS.contains(&version) {
        return Err(ScanfileError::UnsupportedVersion {
            file: file.to_path_buf(),
            version: version.to_string(),
        });
    }
    Ok(())
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// `.` and `./a/b` are kept, anything else gets a `./` prefix.
fn normalize_relpath(relpath: &[u8]) -> Vec<u8> {
    if relpath == b"." || relpath.starts_with(b"./") {
        return relpath.to_vec();
    }
    let mut out = b"./".to_vec();
    out.extend_from_slice(relpath);
    out
}

/// One decoded record waiting for its children.
struct PendingEntry {
    line: usize,
    name: OsString,
    parent: PathBuf,
    fields: RecordFields,
    children: Vec<usize>,
    child_names: HashSet<Vec<u8>>,
}

impl PendingEntry {
    fn full_path(&self) -> PathBuf {
        self.parent.join(&self.name)
    }
}

/// Collects records in file order, then builds the tree bottom-up.
struct TreeBuilder {
    base_name: OsString,
    nodes: Vec<PendingEntry>,
    dirs: HashMap<Vec<u8>, usize>,
    root_seen: bool,
}

impl TreeBuilder {
    fn new(base_name: OsString) -> Self {
        Self {
            base_name,
            nodes: Vec::new(),
            dirs: HashMap::new(),
            root_seen: false,
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn add(&mut self, text: &[u8], line: usize) -> Result<(), DataError> {
        let record = Record::parse(text)?;
        record.fields.validate()?;

        let shown = || String::from_utf8_lossy(&record.relpath).into_owned();
        let relpath = normalize_relpath(&record.relpath);

        let (parent_index, parent, name) = if relpath == b"." {
            if self.root_seen {
                return Err(DataError::Duplicate(shown()));
            }
            self.root_seen = true;
            (None, PathBuf::new(), self.base_name.clone())
        } else {
            let split = relpath
                .iter()
                .rposition(|&b| b == b'/')
                .unwrap_or_default();
            let (parent_rel, name) = (&relpath[..split], &relpath[split + 1..]);
            if name.is_empty() {
                return Err(DataError::EmptyFilename(shown()));
            }
            if name == b"." || name == b".." {
                return Err(DataError::InvalidFilename(shown()));
            }
            let &index = self
                .dirs
                .get(parent_rel)
                .ok_or_else(|| DataError::Orphan(shown()))?;
            if !self.nodes[index].child_names.insert(name.to_vec()) {
                return Err(DataError::Duplicate(shown()));
            }
            (Some(index), self.nodes[index].full_path(), bytes_to_os(name.to_vec()))
        };

        let index = self.nodes.len();
        if record.fields.entry_type == EntryType::Directory
            && self.dirs.insert(relpath, index).is_some()
        {
            return Err(DataError::Duplicate(shown()));
        }
        if let Some(parent_index) = parent_index {
            self.nodes[parent_index].children.push(index);
        }
        self.nodes.push(PendingEntry {
            line,
            name,
            parent,
            fields: record.fields,
            children: Vec::new(),
            child_names: HashSet::new(),
        });
        Ok(())
    }

    fn finish(self, file: &Path, root: Option<&str>) -> Result<EntryRef, ScanfileError> {
        if self.dirs.is_empty() {
            return Err(ScanfileError::NoData {
                file: file.to_path_buf(),
            });
        }

        // Children always come after their parent in the file
        let mut built: Vec<Option<EntryRef>> = vec![None; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate().rev() {
            let children: Children = node
                .children
                .iter()
                .filter_map(|&child| {
                    built[child]
                        .clone()
                        .map(|entry| (self.nodes[child].name.clone(), entry))
                })
                .collect();
            let entry = Entry::from_record(node.name.clone(), node.parent.clone(), &node.fields, children)
                .map_err(|e| ScanfileError::Data {
                    file: file.to_path_buf(),
                    line: node.line,
                    source: e.into(),
                })?;
            built[index] = Some(entry);
        }

        let wanted = root.unwrap_or(".");
        let trimmed = wanted.trim_end_matches('/');
        let key = normalize_relpath(if trimmed.is_empty() { b"." } else { trimmed.as_bytes() });
        self.dirs
            .get(&key)
            .and_then(|&index| built[index].clone())
            .ok_or_else(|| ScanfileError::NoSuchRoot {
                file: file.to_path_buf(),
                root: wanted.to_string(),
            })
    }
}

impl std::fmt::Debug for TreeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("base_name", &self.base_name)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
