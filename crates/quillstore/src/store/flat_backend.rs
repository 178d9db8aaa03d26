use super::backend::StorageBackend;
use crate::error::{QuillError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const ENTRY_EXT: &str = ".json";
const HASHED_PREFIX: &str = "h-";
/// Longest hex stem used as a file name. Most file systems cap names at 255
/// bytes.
const MAX_HEX_STEM: usize = 200;

/// Flat string-keyed fallback backend: one file per key.
///
/// File names are the hex encoding of the key, so any key (including `:` and
/// `/`) maps to a single portable file name and `list` can recover the key
/// without an index file.
///
/// Keys too long for that are stored as `h-<sha256>.json`, and the file
/// starts with one header line holding the hex-encoded key.
pub struct FlatBackend {
    root: PathBuf,
}

impl FlatBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Open and make sure the directory exists.
    pub fn open(root: PathBuf) -> Result<Self> {
        let backend = Self::new(root);
        backend.ensure_dir()?;
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let stem = hex::encode(key.as_bytes());
        if is_hashed(&stem) {
            let digest = hex::encode(Sha256::digest(key.as_bytes()));
            self.root
                .join(format!("{}{}{}", HASHED_PREFIX, digest, ENTRY_EXT))
        } else {
            self.root.join(format!("{}{}", stem, ENTRY_EXT))
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(QuillError::Io)?;
        }
        Ok(())
    }

    fn key_from_file_name(name: &str) -> Option<String> {
        let stem = name.strip_suffix(ENTRY_EXT)?;
        decode_key(stem)
    }

    /// The key recorded in the header line of a hashed entry.
    fn key_from_header(path: &Path) -> Result<Option<String>> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(QuillError::Io(e)),
        };
        let mut header = String::new();
        BufReader::new(file)
            .read_line(&mut header)
            .map_err(QuillError::Io)?;
        Ok(decode_key(header.trim_end_matches('\n')))
    }
}

fn is_hashed(hex_stem: &str) -> bool {
    hex_stem.len() > MAX_HEX_STEM
}

fn decode_key(hex_key: &str) -> Option<String> {
    let bytes = hex::decode(hex_key).ok()?;
    String::from_utf8(bytes).ok()
}

impl StorageBackend for FlatBackend {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let content = match fs::read_to_string(self.entry_path(key)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(QuillError::Io(e)),
        };
        let hex_key = hex::encode(key.as_bytes());
        if !is_hashed(&hex_key) {
            return Ok(Some(content));
        }
        match content.split_once('\n') {
            Some((header, value)) if header == hex_key => Ok(Some(value.to_string())),
            _ => Err(QuillError::CorruptedEntry {
                key: key.to_string(),
                reason: "hashed entry header does not match its key".to_string(),
            }),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_dir()?;
        let target_path = self.entry_path(key);

        // Atomic Write
        let tmp_path = self.root.join(format!(".entry-{}.tmp", Uuid::new_v4()));
        let hex_key = hex::encode(key.as_bytes());
        let written = if is_hashed(&hex_key) {
            fs::write(&tmp_path, format!("{}\n{}", hex_key, value))
        } else {
            fs::write(&tmp_path, value)
        };
        written.map_err(QuillError::Io)?;
        if let Err(e) = fs::rename(&tmp_path, target_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(QuillError::Io(e));
        }

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QuillError::Io(e)),
        }
    }

    fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(QuillError::Io)?;

        for entry in entries {
            let entry = entry.map_err(QuillError::Io)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = if name.starts_with(HASHED_PREFIX) && name.ends_with(ENTRY_EXT) {
                Self::key_from_header(&path)?
            } else {
                Self::key_from_file_name(name)
            };
            if let Some(key) = key {
                if prefix.map_or(true, |p| key.starts_with(p)) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn clear(&self) -> Result<()> {
        for key in self.list(None)? {
            self.delete(&key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trips_through_file_name() {
        let backend = FlatBackend::new(PathBuf::from("/tmp/unused"));
        let path = backend.entry_path("project:abc:meta");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(
            FlatBackend::key_from_file_name(name),
            Some("project:abc:meta".to_string())
        );
    }

    #[test]
    fn test_long_key_uses_hashed_name() {
        let backend = FlatBackend::new(PathBuf::from("/tmp/unused"));
        let key = format!("project:p:asset:{}.png", "a".repeat(200));
        let path = backend.entry_path(&key);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(HASHED_PREFIX));
        assert_eq!(name.len(), HASHED_PREFIX.len() + 64 + ENTRY_EXT.len());
        assert_eq!(FlatBackend::key_from_file_name(name), None);
    }

    #[test]
    fn test_foreign_files_are_ignored() {
        assert_eq!(FlatBackend::key_from_file_name("notes.txt"), None);
        assert_eq!(FlatBackend::key_from_file_name("zz.json"), None);
        assert_eq!(FlatBackend::key_from_file_name(".entry-1.tmp"), None);
    }
}
