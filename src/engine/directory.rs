//! On-disk directory holding the files of one index.
//!
//! File names are flat (no subdirectories). Index files are recognised by
//! name so that cleanup never touches anything the engine did not write:
//!
//! - `segments_<gen>`: commit points
//! - `_<n>.seg`: segment data
//! - `_<n>_<delgen>.del`: deleted ordinals of a segment

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use atomic_write_file::AtomicWriteFile;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{LucernaError, Result};

/// Prefix of commit point file names.
pub const COMMIT_PREFIX: &str = "segments_";

/// A flat directory of index files.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    /// Open a directory, creating it if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Directory { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all regular files in the directory.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path.join(name))?)
    }

    /// Write a new file and fsync it.
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<u64> {
        let mut file = File::create(self.path.join(name))?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(bytes.len() as u64)
    }

    /// Replace `name` atomically: readers see the old or the new content.
    pub fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut file = AtomicWriteFile::open(self.path.join(name))?;
        file.write_all(bytes)?;
        file.commit()?;
        Ok(())
    }

    /// Delete a file. Missing files are not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Flush directory metadata (new and removed entries) to disk.
    pub fn sync(&self) -> Result<()> {
        #[cfg(unix)]
        {
            File::open(&self.path)?.sync_all()?;
        }
        Ok(())
    }
}

/// Whether `name` is a file the engine manages.
pub fn is_index_file(name: &str) -> bool {
    if let Some(generation) = name.strip_prefix(COMMIT_PREFIX) {
        return generation.parse::<u64>().is_ok();
    }
    name.starts_with('_') && (name.ends_with(".seg") || name.ends_with(".del"))
}

/// Segment number encoded in a `.seg` or `.del` file name.
pub fn segment_number(name: &str) -> Option<u64> {
    let stem = name.strip_prefix('_')?;
    let stem = stem
        .strip_suffix(".seg")
        .or_else(|| stem.strip_suffix(".del"))?;
    let number = stem.split('_').next()?;
    number.parse().ok()
}

/// Serialize with bincode and append a CRC32 of the body.
pub fn encode_checksummed<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = bincode::serialize(value)?;
    let checksum = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&checksum.to_le_bytes());
    Ok(bytes)
}

/// Verify the CRC32 trailer and deserialize the body.
pub fn decode_checksummed<T: DeserializeOwned>(name: &str, bytes: &[u8]) -> Result<T> {
    if bytes.len() < 4 {
        return Err(LucernaError::corruption(format!("{name}: file truncated")));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - 4);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(LucernaError::corruption(format!(
            "{name}: checksum mismatch (expected {expected:#010x}, got {actual:#010x})"
        )));
    }
    Ok(bincode::deserialize(body)?)
}
