//! Backing text resources for logs.
//!
//! A resource is addressed by byte offset. Logs only ever truncate and append,
//! so both implementations here are plain growable byte stores.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::TranscriptError;

pub trait LogResource: Send {
    /// Identity used in errors and diagnostics.
    fn name(&self) -> &str;
    fn current_length(&mut self) -> io::Result<usize>;
    /// The raw stored bytes. A crash mid-append can leave a torn tail, so
    /// these are not guaranteed to be valid UTF-8.
    fn read_all(&mut self) -> io::Result<Vec<u8>>;
    /// Drops everything from `offset` on. A no-op past the end.
    fn truncate_from(&mut self, offset: usize) -> io::Result<()>;
    fn append_text(&mut self, text: &str) -> io::Result<()>;
    fn flush_to_stable(&mut self) -> io::Result<()>;
}

/// The lock around a resource is the per-log flush lock.
pub type SharedResource = Arc<Mutex<dyn LogResource>>;

pub fn share<R: LogResource + 'static>(resource: R) -> SharedResource {
    Arc::new(Mutex::new(resource))
}

pub struct FileLogResource {
    name: String,
    file: File,
}

impl FileLogResource {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            name: path.display().to_string(),
            file,
        })
    }
}

impl LogResource for FileLogResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_length(&mut self) -> io::Result<usize> {
        Ok(self.file.metadata()?.len() as usize)
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut contents = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut contents)?;
        Ok(contents)
    }

    fn truncate_from(&mut self, offset: usize) -> io::Result<()> {
        if offset < self.current_length()? {
            self.file.set_len(offset as u64)?;
        }
        Ok(())
    }

    fn append_text(&mut self, text: &str) -> io::Result<()> {
        self.file.write_all(text.as_bytes())
    }

    fn flush_to_stable(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }
}

/// In-memory resource. Counts mutating calls so callers can observe
/// redundant writes.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogResource {
    name: String,
    contents: String,
    writes: usize,
}

impl MemoryLogResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_contents(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
            writes: 0,
        }
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl LogResource for MemoryLogResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_length(&mut self) -> io::Result<usize> {
        Ok(self.contents.len())
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.contents.clone().into_bytes())
    }

    fn truncate_from(&mut self, offset: usize) -> io::Result<()> {
        if offset < self.contents.len() {
            if !self.contents.is_char_boundary(offset) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("offset {offset} splits a character"),
                ));
            }
            self.contents.truncate(offset);
            self.writes += 1;
        }
        Ok(())
    }

    fn append_text(&mut self, text: &str) -> io::Result<()> {
        self.contents.push_str(text);
        self.writes += 1;
        Ok(())
    }

    fn flush_to_stable(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens the resource backing a channel log.
pub trait TranscriptStore: Send + Sync {
    fn open(&self, account_label: &str, channel: &str) -> Result<SharedResource, TranscriptError>;
}

/// Logs live under `{root}/{account}/{channel}.log`.
#[derive(Debug, Clone)]
pub struct FileTranscriptStore {
    root: PathBuf,
}

impl FileTranscriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Channel names are case-insensitive, so they are lowercased first.
    pub fn path_for(&self, account_label: &str, channel: &str) -> PathBuf {
        self.root
            .join(escape_file_name(account_label))
            .join(format!("{}.log", escape_file_name(&channel.to_lowercase())))
    }
}

impl TranscriptStore for FileTranscriptStore {
    fn open(&self, account_label: &str, channel: &str) -> Result<SharedResource, TranscriptError> {
        let path = self.path_for(account_label, channel);
        let resource = FileLogResource::open(&path).map_err(|source| TranscriptError::Open {
            resource: path.display().to_string(),
            source,
        })?;
        Ok(share(resource))
    }
}

/// Hands out one shared in-memory resource per log name, so reopening a log
/// sees what was flushed before.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    resources: Mutex<HashMap<String, Arc<Mutex<MemoryLogResource>>>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a log's stored text, if it was ever opened.
    pub fn contents(&self, account_label: &str, channel: &str) -> Option<String> {
        let resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
        resources
            .get(&memory_name(account_label, channel))
            .map(|r| r.lock().unwrap_or_else(PoisonError::into_inner).contents().to_string())
    }
}

impl TranscriptStore for MemoryTranscriptStore {
    fn open(&self, account_label: &str, channel: &str) -> Result<SharedResource, TranscriptError> {
        let name = memory_name(account_label, channel);
        let mut resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
        let resource: SharedResource = resources
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(MemoryLogResource::new(name))))
            .clone();
        Ok(resource)
    }
}

fn memory_name(account_label: &str, channel: &str) -> String {
    format!("{}/{}", account_label, channel.to_lowercase())
}

/// Keeps ASCII alphanumerics, `-`, `.` and `#`. Every other byte becomes
/// `%XX`, so distinct names never share a file. A leading `.` is escaped too.
pub fn escape_file_name(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }
    let mut escaped = String::with_capacity(name.len());
    for (i, byte) in name.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'#') || (byte == b'.' && i > 0);
        if keep {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("%{:02x}", byte));
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_file_name() {
        assert_eq!(escape_file_name("#Rust"), "#Rust");
        assert_eq!(escape_file_name("a/b\\c d"), "a%2fb%5cc%20d");
        assert_eq!(escape_file_name(".."), "%2e.");
        assert_eq!(escape_file_name("v1.2"), "v1.2");
        assert_eq!(escape_file_name("caf\u{e9}"), "caf%c3%a9");
        assert_eq!(escape_file_name(""), "%");
    }

    #[test]
    fn test_nick_specials_map_to_distinct_files() {
        let store = FileTranscriptStore::new("/logs");
        let names = ["bob[", "bob]", "bob_", "bob{", "bob|", "bob^", "bob`", "bob\\", "bob%5b"];
        let paths: std::collections::HashSet<PathBuf> = names.iter().map(|n| store.path_for("a", n)).collect();
        assert_eq!(paths.len(), names.len());
    }

    #[test]
    fn test_memory_resource_truncate_and_append() {
        let mut res = MemoryLogResource::new("mem");
        res.append_text("hello world").unwrap();
        res.truncate_from(5).unwrap();
        res.truncate_from(50).unwrap();
        res.append_text("!").unwrap();
        assert_eq!(res.contents(), "hello!");
        assert_eq!(res.current_length().unwrap(), 6);
        assert_eq!(res.write_count(), 3);
    }

    #[test]
    fn test_file_resource_truncate_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acct").join("#x.log");
        let mut res = FileLogResource::open(&path).unwrap();
        res.append_text("first\nsecond\n").unwrap();
        res.truncate_from(6).unwrap();
        res.append_text("third\n").unwrap();
        res.flush_to_stable().unwrap();
        assert_eq!(res.read_all().unwrap(), b"first\nthird\n");
        assert_eq!(res.current_length().unwrap(), 12);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nthird\n");
    }

    #[test]
    fn test_memory_store_reuses_resources() {
        let store = MemoryTranscriptStore::new();
        let first = store.open("acct", "#X").unwrap();
        first.lock().unwrap().append_text("kept\n").unwrap();
        let second = store.open("acct", "#x").unwrap();
        assert_eq!(second.lock().unwrap().read_all().unwrap(), b"kept\n");
        assert_eq!(store.contents("acct", "#x").as_deref(), Some("kept\n"));
    }

    #[test]
    fn test_file_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTranscriptStore::new(dir.path());
        let path = store.path_for("Libera Chat", "#Rust");
        assert_eq!(path, dir.path().join("Libera%20Chat").join("#rust.log"));
        store.open("Libera Chat", "#Rust").unwrap();
        assert!(path.exists());
    }
}
