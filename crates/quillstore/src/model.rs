//! # Domain Model: Project Documents
//!
//! Typed views of the documents a writing project stores. The storage layer is
//! schema-agnostic; these types are what call sites read and write through
//! [`crate::store::StorageManager::get_as`] / `put_as`.
//!
//! ## Key Layout
//!
//! ```text
//! project:<id>:meta            ProjectMeta
//! project:<id>:chapters        [Chapter]   (scenes nested inside)
//! project:<id>:characters      [Character]
//! project:<id>:asset:<name>    base64 binary asset
//! project:<id>:<anything>      opaque document (timeline, settings, ...)
//! ```
//!
//! ## Word Counts
//!
//! A scene's count comes from its text. A chapter's `wordCount` is the sum of
//! its scenes, and the project's is the sum of its chapters. Stored totals
//! can drift (older clients, hand-edited archives); [`ProjectTree::recompute_word_counts`]
//! restores the invariant.
//!
//! ## Unknown Fields
//!
//! Every document keeps fields it does not know about in `extra`, so a
//! round-trip through these types never drops data written by other clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const PROJECT_PREFIX: &str = "project:";
pub const META_SUFFIX: &str = "meta";
pub const CHAPTERS_SUFFIX: &str = "chapters";
pub const CHARACTERS_SUFFIX: &str = "characters";
pub const ASSET_SUFFIX: &str = "asset:";

/// Ids are a single key segment: a `:` would nest one project's keys
/// inside another's prefix.
pub fn is_valid_project_id(id: &str) -> bool {
    !id.trim().is_empty() && !id.contains(':')
}

pub fn project_prefix(project_id: &str) -> String {
    format!("{}{}:", PROJECT_PREFIX, project_id)
}

pub fn project_key(project_id: &str, suffix: &str) -> String {
    format!("{}{}", project_prefix(project_id), suffix)
}

pub fn asset_key(project_id: &str, file_name: &str) -> String {
    project_key(project_id, &format!("{}{}", ASSET_SUFFIX, file_name))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMeta {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub word_count: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectMeta {
    pub fn new(id: String, name: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            description,
            created_at: Some(now),
            updated_at: Some(now),
            word_count: 0,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Scene {
    pub fn new(id: String, title: String, content: String) -> Self {
        let now = Utc::now();
        let word_count = count_words(&content);
        Self {
            id,
            title,
            content,
            word_count,
            created_at: Some(now),
            updated_at: Some(now),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Chapter {
    pub fn new(id: String, title: String, order: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            order,
            scenes: Vec::new(),
            word_count: 0,
            created_at: Some(now),
            updated_at: Some(now),
            extra: Map::new(),
        }
    }

    pub fn scene_word_total(&self) -> u64 {
        self.scenes.iter().map(|s| s.word_count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Character {
    pub fn new(id: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            created_at: Some(now),
            updated_at: Some(now),
            extra: Map::new(),
        }
    }
}

/// A project's full document graph, minus binary assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTree {
    pub meta: ProjectMeta,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub characters: Vec<Character>,
    /// Other project-scoped documents (timeline, settings, ...) by key suffix.
    #[serde(default)]
    pub documents: BTreeMap<String, Value>,
}

impl ProjectTree {
    pub fn new(meta: ProjectMeta) -> Self {
        Self {
            meta,
            chapters: Vec::new(),
            characters: Vec::new(),
            documents: BTreeMap::new(),
        }
    }

    pub fn scene_count(&self) -> usize {
        self.chapters.iter().map(|c| c.scenes.len()).sum()
    }

    /// Bring chapter and project totals in line with scene counts.
    /// Returns how many totals changed.
    pub fn recompute_word_counts(&mut self) -> usize {
        let mut changed = 0;
        for chapter in &mut self.chapters {
            let total = chapter.scene_word_total();
            if chapter.word_count != total {
                chapter.word_count = total;
                changed += 1;
            }
        }
        let total: u64 = self.chapters.iter().map(|c| c.word_count).sum();
        if self.meta.word_count != total {
            self.meta.word_count = total;
            changed += 1;
        }
        changed
    }
}

/// Whitespace-separated word count.
pub fn count_words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
