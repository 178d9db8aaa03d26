//! Gzip-compressed tar container.
//!
//! Entry order is fixed: `manifest.json`, `README.json`, `project.json`, then
//! `assets/*`. Keeping the manifest first lets [`read_manifest`] stop after
//! one entry without inflating the project body.

use crate::error::{QuillError, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::{Read, Write};

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const PROJECT_ENTRY: &str = "project.json";
pub const README_ENTRY: &str = "README.json";
pub const ASSETS_DIR: &str = "assets/";

/// Raw entries found in a container.
#[derive(Debug, Default)]
pub struct ContainerEntries {
    pub manifest: Option<Vec<u8>>,
    pub project: Option<Vec<u8>>,
    pub readme: Option<Vec<u8>>,
    pub assets: BTreeMap<String, Vec<u8>>,
}

pub struct ContainerInput<'a> {
    pub manifest: &'a [u8],
    pub readme: &'a [u8],
    pub project: &'a [u8],
    pub assets: &'a BTreeMap<String, Vec<u8>>,
    pub modified: DateTime<Utc>,
}

pub fn write_container<W: Write>(writer: W, input: &ContainerInput<'_>) -> Result<W> {
    let enc = GzEncoder::new(writer, Compression::default());
    let mut tar = tar::Builder::new(enc);
    let mtime = input.modified.timestamp().max(0) as u64;

    append(&mut tar, MANIFEST_ENTRY, input.manifest, mtime)?;
    append(&mut tar, README_ENTRY, input.readme, mtime)?;
    append(&mut tar, PROJECT_ENTRY, input.project, mtime)?;
    for (name, bytes) in input.assets {
        check_asset_name(name)?;
        append(&mut tar, &format!("{}{}", ASSETS_DIR, name), bytes, mtime)?;
    }

    let enc = tar.into_inner().map_err(QuillError::Io)?;
    enc.finish().map_err(QuillError::Io)
}

fn append<W: Write>(
    tar: &mut tar::Builder<W>,
    path: &str,
    data: &[u8],
    mtime: u64,
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_cksum();
    tar.append_data(&mut header, path, data)
        .map_err(QuillError::Io)
}

/// Read every entry. Unknown entries are ignored.
pub fn read_container(bytes: &[u8]) -> Result<ContainerEntries> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut found = ContainerEntries::default();

    for entry in archive.entries().map_err(unreadable)? {
        let mut entry = entry.map_err(unreadable)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path().map_err(unreadable)?.to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(unreadable)?;

        match path.as_str() {
            MANIFEST_ENTRY => found.manifest = Some(data),
            PROJECT_ENTRY => found.project = Some(data),
            README_ENTRY => found.readme = Some(data),
            other => {
                if let Some(name) = other.strip_prefix(ASSETS_DIR) {
                    check_asset_name(name)?;
                    found.assets.insert(name.to_string(), data);
                }
            }
        }
    }
    Ok(found)
}

/// Read entries until `manifest.json` is found, without touching the rest.
pub fn read_manifest(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries().map_err(unreadable)? {
        let mut entry = entry.map_err(unreadable)?;
        let is_manifest = entry
            .path()
            .map_err(unreadable)?
            .to_str()
            .is_some_and(|p| p == MANIFEST_ENTRY);
        if is_manifest {
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(unreadable)?;
            return Ok(data);
        }
    }
    Err(QuillError::ArchiveStructure(format!(
        "missing {}",
        MANIFEST_ENTRY
    )))
}

/// Asset names are flat file names: no directories, no traversal.
fn check_asset_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(char::is_control);
    if bad {
        return Err(QuillError::ArchiveStructure(format!(
            "invalid asset name {:?}",
            name
        )));
    }
    Ok(())
}

fn unreadable(e: std::io::Error) -> QuillError {
    QuillError::ArchiveStructure(format!("unreadable container: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(assets: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
        write_container(
            Vec::new(),
            &ContainerInput {
                manifest: b"{\"m\":1}",
                readme: b"{}",
                project: b"{\"p\":1}",
                assets,
                modified: Utc::now(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_write_produces_gzip() {
        let buf = sample(&BTreeMap::new());
        // Gzip header magic
        assert_eq!(buf[0], 0x1f);
        assert_eq!(buf[1], 0x8b);
    }

    #[test]
    fn test_read_back_entries() {
        let assets = BTreeMap::from([("cover.png".to_string(), vec![0u8, 1, 2])]);
        let entries = read_container(&sample(&assets)).unwrap();
        assert_eq!(entries.manifest.as_deref(), Some(&b"{\"m\":1}"[..]));
        assert_eq!(entries.project.as_deref(), Some(&b"{\"p\":1}"[..]));
        assert!(entries.readme.is_some());
        assert_eq!(entries.assets, assets);
    }

    #[test]
    fn test_read_manifest_only() {
        let data = read_manifest(&sample(&BTreeMap::new())).unwrap();
        assert_eq!(data, b"{\"m\":1}");
    }

    #[test]
    fn test_garbage_is_structural_error() {
        assert!(matches!(
            read_container(b"definitely not gzip"),
            Err(QuillError::ArchiveStructure(_))
        ));
        assert!(matches!(
            read_manifest(b""),
            Err(QuillError::ArchiveStructure(_))
        ));
    }

    #[test]
    fn test_rejects_nested_asset_names() {
        let assets = BTreeMap::from([("../escape".to_string(), vec![1u8])]);
        let result = write_container(
            Vec::new(),
            &ContainerInput {
                manifest: b"{}",
                readme: b"{}",
                project: b"{}",
                assets: &assets,
                modified: Utc::now(),
            },
        );
        assert!(matches!(result, Err(QuillError::ArchiveStructure(_))));
    }
}
