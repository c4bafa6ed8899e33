use crate::nintendo::dol::memcard::error::{MemcardError, MemcardResult};
use crate::nintendo::dol::memcard::reader::File;
use chrono::{DateTime, Utc};
use log::warn;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Permission bits reported for files, the card is always read-only.
pub const FILE_MODE: u32 = 0o444;

/// Permission bits reported for directories.
pub const DIR_MODE: u32 = 0o555;

/// Name of the implicit root directory.
pub const ROOT: &str = ".";

/// Stat view of a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Final path component
    pub name: String,
    pub size: u64,
    /// Not known for directories implied by file names
    pub modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    pub fn mode(&self) -> u32 {
        if self.is_dir { DIR_MODE } else { FILE_MODE }
    }
}

/// Entry of the sorted lookup index.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub name: String,
    /// Position in the reader's file list
    pub file: Option<usize>,
    pub is_dir: bool,
    pub is_duplicate: bool,
}

impl IndexEntry {
    fn file(name: String, file: usize) -> Self {
        Self {
            name,
            file: Some(file),
            is_dir: false,
            is_duplicate: false,
        }
    }

    fn dir(name: String) -> Self {
        Self {
            name,
            file: None,
            is_dir: true,
            is_duplicate: false,
        }
    }

    pub fn root() -> Self {
        Self::dir(format!("{ROOT}/"))
    }

    pub fn stat(&self, files: &[File]) -> MemcardResult<Metadata> {
        if self.is_duplicate {
            return Err(MemcardError::DuplicateName(self.name.clone()));
        }

        let (_, name) = split(&self.name);
        let file = self.file.map(|i| &files[i]);

        Ok(match file {
            Some(file) if !self.is_dir => Metadata {
                name: name.to_string(),
                size: file.size,
                modified: Some(file.modified),
                is_dir: false,
            },
            _ => Metadata {
                name: name.to_string(),
                size: 0,
                modified: file.map(|file| file.modified),
                is_dir: true,
            },
        })
    }
}

/// Splits a slash separated name into its parent and final component. Top
/// level names have the parent [`ROOT`].
pub(crate) fn split(name: &str) -> (&str, &str) {
    let name = name.strip_suffix('/').unwrap_or(name);

    match name.rfind('/') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (ROOT, name),
    }
}

/// Orders by parent first and final component second, so the children of
/// a directory form one contiguous run.
pub(crate) fn compare_names(a: &str, b: &str) -> Ordering {
    split(a).cmp(&split(b))
}

/// Accepts unrooted, slash separated paths without empty, `.` or `..`
/// elements. A lone `.` names the root.
pub(crate) fn is_valid_path(name: &str) -> bool {
    if name == ROOT {
        return true;
    }

    !name.is_empty()
        && name
            .split('/')
            .all(|element| !element.is_empty() && element != "." && element != "..")
}

/// Builds the sorted lookup index over `files`.
///
/// Every repeated name marks the first entry with that name as a duplicate
/// and drops the rest. Parent directories implied by `/` separated names get
/// their own entries; a file whose name collides with one is a duplicate too.
///
/// Names are compared after lossy UTF-8 decoding, so stored names that differ
/// only in invalid bytes collapse into one duplicate entry.
pub(crate) fn build_index(files: &[File]) -> Vec<IndexEntry> {
    let mut index: Vec<IndexEntry> = Vec::with_capacity(files.len());
    let mut known: HashMap<&str, usize> = HashMap::new();
    let mut dirs: BTreeSet<&str> = BTreeSet::new();

    for (i, file) in files.iter().enumerate() {
        let name = file.name.as_str();

        if let Some(&existing) = known.get(name) {
            warn!("Memory card holds more than one file named {name:?}");
            index[existing].is_duplicate = true;
            continue;
        }

        known.insert(name, index.len());
        index.push(IndexEntry::file(name.to_string(), i));

        let mut dir = split(name).0;
        while dir != ROOT && !dir.is_empty() {
            dirs.insert(dir);
            dir = split(dir).0;
        }
    }

    for dir in dirs {
        match known.get(dir) {
            Some(&existing) => {
                warn!("File {dir:?} shadows a directory of the same name");
                index[existing].is_duplicate = true;
            }
            None => index.push(IndexEntry::dir(dir.to_string())),
        }
    }

    index.sort_by(|a, b| compare_names(&a.name, &b.name));
    index
}

/// Finds the entry for an exact name or for a stored directory name `name/`.
pub(crate) fn lookup<'a>(index: &'a [IndexEntry], name: &str) -> Option<&'a IndexEntry> {
    let key = split(name);
    let i = index.partition_point(|entry| split(&entry.name) < key);

    index.get(i).filter(|entry| {
        entry.name == name
            || entry
                .name
                .strip_suffix('/')
                .is_some_and(|stripped| stripped == name)
    })
}

/// Contiguous run of entries whose parent is `dir`.
pub(crate) fn children<'a>(index: &'a [IndexEntry], dir: &str) -> &'a [IndexEntry] {
    let start = index.partition_point(|entry| split(&entry.name).0 < dir);
    let end = index.partition_point(|entry| split(&entry.name).0 <= dir);
    &index[start..end]
}

/// An open directory, listed incrementally.
#[derive(Debug)]
pub struct ReadDir<'a> {
    path: String,
    entries: &'a [IndexEntry],
    files: &'a [File],
    offset: usize,
}

impl<'a> ReadDir<'a> {
    pub(crate) fn new(path: &str, entries: &'a [IndexEntry], files: &'a [File]) -> Self {
        Self {
            path: path.to_string(),
            entries,
            files,
            offset: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Entries not yet returned.
    pub fn remaining(&self) -> usize {
        self.entries.len() - self.offset
    }

    /// Returns up to `count` further entries, or all remaining ones when
    /// `count` is zero.
    ///
    /// With a non-zero `count`, `None` signals that the listing is exhausted.
    /// A zero `count` on an exhausted listing yields an empty batch instead.
    pub fn read_dir(&mut self, count: usize) -> MemcardResult<Option<Vec<Metadata>>> {
        let mut n = self.remaining();
        if count > 0 {
            n = n.min(count);
        }

        if n == 0 {
            return Ok(if count == 0 { Some(Vec::new()) } else { None });
        }

        let batch = self.entries[self.offset..self.offset + n]
            .iter()
            .map(|entry| entry.stat(self.files))
            .collect::<MemcardResult<Vec<_>>>()?;

        self.offset += n;

        Ok(Some(batch))
    }
}

impl Iterator for ReadDir<'_> {
    type Item = MemcardResult<Metadata>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.offset)?;
        self.offset += 1;
        Some(entry.stat(self.files))
    }
}
