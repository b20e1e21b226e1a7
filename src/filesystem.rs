//! In-memory staging area for deployment files
//!
//! Paths are POSIX-style and relative to the host's app root, so the same
//! tree can be written to a local directory or handed to a remote copier.

use std::collections::BTreeMap;

use glob::Pattern;

use crate::error::{Error, Result};

/// A staged file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub content: Vec<u8>,
    /// Unix permission bits
    pub permissions: u32,
}

impl File {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            permissions: 0o644,
        }
    }

    pub fn from_string(content: &str) -> Self {
        Self::new(content.as_bytes().to_vec())
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// One staged path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File(File),
    /// Directory that must exist even when empty
    Dir,
}

/// Staged files and directories, sorted by path
#[derive(Debug, Clone, Default)]
pub struct MemoryFS {
    entries: BTreeMap<String, Entry>,
}

fn check_path(path: &str) -> Result<()> {
    let escapes = path.split('/').any(|part| part == "..");
    if path.is_empty() || path.starts_with('/') || escapes {
        return Err(Error::InvalidReference {
            reference: path.to_string(),
            message: "staged paths must be relative and stay inside the root".to_string(),
        });
    }
    Ok(())
}

impl MemoryFS {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn add_file(&mut self, path: &str, file: File) -> Result<()> {
        check_path(path)?;
        self.entries.insert(path.to_string(), Entry::File(file));
        Ok(())
    }

    pub fn add_file_string(&mut self, path: &str, content: &str) -> Result<()> {
        self.add_file(path, File::from_string(content))
    }

    pub fn add_dir(&mut self, path: &str) -> Result<()> {
        check_path(path)?;
        self.entries.entry(path.to_string()).or_insert(Entry::Dir);
        Ok(())
    }

    pub fn get_file(&self, path: &str) -> Option<&File> {
        match self.entries.get(path) {
            Some(Entry::File(file)) => Some(file),
            _ => None,
        }
    }

    /// File content as UTF-8, if the file exists and is text
    pub fn read_string(&self, path: &str) -> Option<&str> {
        self.get_file(path).and_then(|f| std::str::from_utf8(&f.content).ok())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// List files matching a glob pattern
    pub fn list_files_glob(&self, pattern: &str) -> Result<Vec<&str>> {
        let pattern = Pattern::new(pattern)?;
        Ok(self
            .entries
            .iter()
            .filter(|(path, entry)| matches!(entry, Entry::File(_)) && pattern.matches(path))
            .map(|(path, _)| path.as_str())
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in path order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(path, entry)| (path.as_str(), entry))
    }
}
