use crate::model::ProjectTree;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ARCHIVE_FORMAT: &str = "quillstore-archive";
pub const ARCHIVE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemCounts {
    pub chapters: usize,
    pub scenes: usize,
    pub characters: usize,
    pub documents: usize,
    pub assets: usize,
    pub words: u64,
}

impl ItemCounts {
    pub fn of(tree: &ProjectTree, assets: usize) -> Self {
        Self {
            chapters: tree.chapters.len(),
            scenes: tree.scene_count(),
            characters: tree.characters.len(),
            documents: tree.documents.len(),
            assets,
            words: tree.chapters.iter().map(|c| c.word_count).sum(),
        }
    }
}

/// Machine-readable description of an archive (`manifest.json`).
/// Built once at export time and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveManifest {
    #[serde(default = "default_format")]
    pub format: String,
    pub version: u32,
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub project_id: String,
    pub exported_at: DateTime<Utc>,
    pub item_counts: ItemCounts,
}

fn default_format() -> String {
    ARCHIVE_FORMAT.to_string()
}

/// Human-readable export summary (`README.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReadme {
    pub exporter: String,
    pub project: String,
    pub exported_at: DateTime<Utc>,
    pub item_counts: BTreeMap<String, u64>,
    pub instructions: Vec<String>,
}

impl ArchiveReadme {
    pub fn for_manifest(manifest: &ArchiveManifest) -> Self {
        let c = &manifest.item_counts;
        let item_counts = BTreeMap::from([
            ("chapters".to_string(), c.chapters as u64),
            ("scenes".to_string(), c.scenes as u64),
            ("characters".to_string(), c.characters as u64),
            ("documents".to_string(), c.documents as u64),
            ("assets".to_string(), c.assets as u64),
            ("words".to_string(), c.words),
        ]);
        Self {
            exporter: format!("quillstore {}", env!("CARGO_PKG_VERSION")),
            project: manifest.name.clone(),
            exported_at: manifest.exported_at,
            item_counts,
            instructions: vec![
                "This file is a complete backup of one writing project.".to_string(),
                "To restore it, open the application and choose Import Project, then select this archive.".to_string(),
                "The import screen lists any problems found in the archive and offers to repair them before anything is saved.".to_string(),
                "Do not edit or rename the files inside the archive; manifest.json and project.json are required.".to_string(),
            ],
        }
    }
}
