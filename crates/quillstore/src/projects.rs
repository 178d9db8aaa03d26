//! Project-level operations over the [`StorageManager`].
//!
//! A project is not a single record: it is every key under
//! `project:<id>:`. These functions read and write that subtree in the layout
//! described in [`crate::model`], which is also the layout archives restore
//! into.

use crate::error::{QuillError, Result};
use crate::model::{
    asset_key, is_valid_project_id, project_key, project_prefix, Chapter, Character, ProjectMeta, ProjectTree,
    ASSET_SUFFIX, CHAPTERS_SUFFIX, CHARACTERS_SUFFIX, META_SUFFIX, PROJECT_PREFIX,
};
use crate::store::{StorageManager, WriteOp};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

/// One row of the project listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub word_count: u64,
    pub chapter_count: usize,
}

#[derive(Serialize, Deserialize)]
struct StoredAsset {
    encoding: String,
    data: String,
}

pub fn create_project(
    manager: &StorageManager,
    name: &str,
    description: &str,
) -> Result<ProjectMeta> {
    let id = Uuid::new_v4().to_string();
    let meta = ProjectMeta::new(id.clone(), name.to_string(), description.to_string());
    manager.transact(vec![
        WriteOp::put(project_key(&id, META_SUFFIX), serde_json::to_value(&meta)?),
        WriteOp::put(project_key(&id, CHAPTERS_SUFFIX), json!([])),
        WriteOp::put(project_key(&id, CHARACTERS_SUFFIX), json!([])),
    ])?;
    info!(project = %id, "project created");
    Ok(meta)
}

pub fn project_exists(manager: &StorageManager, project_id: &str) -> Result<bool> {
    Ok(!manager
        .list(Some(&project_key(project_id, META_SUFFIX)))?
        .is_empty())
}

/// Read the whole document subtree of a project (assets excluded).
pub fn load_tree(manager: &StorageManager, project_id: &str) -> Result<ProjectTree> {
    let meta: ProjectMeta = manager
        .get_as(&project_key(project_id, META_SUFFIX))?
        .ok_or_else(|| QuillError::ProjectNotFound(project_id.to_string()))?;
    let chapters: Vec<Chapter> = manager
        .get_as(&project_key(project_id, CHAPTERS_SUFFIX))?
        .unwrap_or_default();
    let characters: Vec<Character> = manager
        .get_as(&project_key(project_id, CHARACTERS_SUFFIX))?
        .unwrap_or_default();

    let prefix = project_prefix(project_id);
    let mut documents = BTreeMap::new();
    for key in manager.list(Some(&prefix))? {
        let suffix = &key[prefix.len()..];
        if is_structural_suffix(suffix) {
            continue;
        }
        if let Some(value) = manager.get(&key)? {
            documents.insert(suffix.to_string(), value);
        }
    }

    Ok(ProjectTree {
        meta,
        chapters,
        characters,
        documents,
    })
}

/// Write a tree in the standard layout. Keys already present are overwritten;
/// keys not in the tree are left alone.
pub fn save_tree(manager: &StorageManager, tree: &ProjectTree) -> Result<()> {
    let id = &tree.meta.id;
    check_id(id)?;
    let mut ops = vec![
        WriteOp::put(project_key(id, META_SUFFIX), serde_json::to_value(&tree.meta)?),
        WriteOp::put(
            project_key(id, CHAPTERS_SUFFIX),
            serde_json::to_value(&tree.chapters)?,
        ),
        WriteOp::put(
            project_key(id, CHARACTERS_SUFFIX),
            serde_json::to_value(&tree.characters)?,
        ),
    ];
    for (suffix, value) in &tree.documents {
        ops.push(WriteOp::put(project_key(id, suffix), value.clone()));
    }
    manager.transact(ops)?;
    Ok(())
}

/// Remove every key under the project prefix, assets included.
pub fn delete_project(manager: &StorageManager, project_id: &str) -> Result<usize> {
    check_id(project_id)?;
    if !project_exists(manager, project_id)? {
        return Err(QuillError::ProjectNotFound(project_id.to_string()));
    }
    let keys = manager.list(Some(&project_prefix(project_id)))?;
    let count = keys.len();
    manager.transact(keys.into_iter().map(WriteOp::delete).collect())?;
    info!(project = project_id, keys = count, "project deleted");
    Ok(count)
}

/// Every project under `project:`, most recently modified first.
pub fn list_projects(manager: &StorageManager) -> Result<Vec<ProjectSummary>> {
    let meta_suffix = format!(":{}", META_SUFFIX);
    let mut summaries = Vec::new();

    for key in manager.list(Some(PROJECT_PREFIX))? {
        let Some(id) = key
            .strip_prefix(PROJECT_PREFIX)
            .and_then(|rest| rest.strip_suffix(&meta_suffix))
            .filter(|id| !id.contains(':'))
        else {
            continue;
        };
        let Some(meta) = manager.get_as::<ProjectMeta>(&key)? else {
            continue;
        };
        let chapters: Vec<Chapter> = manager
            .get_as(&project_key(id, CHAPTERS_SUFFIX))?
            .unwrap_or_default();

        summaries.push(ProjectSummary {
            id: id.to_string(),
            name: meta.name,
            description: meta.description,
            updated_at: meta.updated_at,
            word_count: chapters.iter().map(|c| c.word_count).sum(),
            chapter_count: chapters.len(),
        });
    }

    // Newest first; projects without a timestamp sort last.
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(summaries)
}

/// Store a binary asset for a project.
pub fn put_asset(
    manager: &StorageManager,
    project_id: &str,
    file_name: &str,
    bytes: &[u8],
) -> Result<()> {
    check_id(project_id)?;
    let stored = StoredAsset {
        encoding: "base64".to_string(),
        data: BASE64.encode(bytes),
    };
    manager.put(
        &asset_key(project_id, file_name),
        &serde_json::to_value(stored)?,
    )
}

pub fn get_asset(
    manager: &StorageManager,
    project_id: &str,
    file_name: &str,
) -> Result<Option<Vec<u8>>> {
    let key = asset_key(project_id, file_name);
    let Some(value) = manager.get(&key)? else {
        return Ok(None);
    };
    decode_asset(&key, value).map(Some)
}

/// All assets of a project, by file name.
pub fn list_assets(
    manager: &StorageManager,
    project_id: &str,
) -> Result<BTreeMap<String, Vec<u8>>> {
    let prefix = asset_key(project_id, "");
    let mut assets = BTreeMap::new();
    for key in manager.list(Some(&prefix))? {
        if let Some(value) = manager.get(&key)? {
            let name = key[prefix.len()..].to_string();
            assets.insert(name, decode_asset(&key, value)?);
        }
    }
    Ok(assets)
}

fn check_id(project_id: &str) -> Result<()> {
    if is_valid_project_id(project_id) {
        Ok(())
    } else {
        Err(QuillError::InvalidProjectId(project_id.to_string()))
    }
}

fn decode_asset(key: &str, value: Value) -> Result<Vec<u8>> {
    let stored: StoredAsset = serde_json::from_value(value)?;
    if stored.encoding != "base64" {
        return Err(QuillError::CorruptedEntry {
            key: key.to_string(),
            reason: format!("unsupported asset encoding {}", stored.encoding),
        });
    }
    BASE64
        .decode(stored.data.as_bytes())
        .map_err(|e| QuillError::CorruptedEntry {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

fn is_structural_suffix(suffix: &str) -> bool {
    suffix == META_SUFFIX
        || suffix == CHAPTERS_SUFFIX
        || suffix == CHARACTERS_SUFFIX
        || suffix.starts_with(ASSET_SUFFIX)
}
