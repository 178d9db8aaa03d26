//! # Schema Migration
//!
//! Every stored document carries a schema version. Versions are tracked per
//! [`DocumentKind`], which is derived from the record key, so a project's
//! metadata and its chapter list evolve independently.
//!
//! ## Version Chains
//!
//! A kind's chain is an ordered list of steps: step `i` upgrades a document
//! from `v(i+1)` to `v(i+2)`. The current version of a kind is therefore
//! `steps + 1`; a kind with no steps is at v1.
//!
//! Migration walks forward one step at a time from the stored version and
//! validates the result against the kind's validator. Any step error or
//! validation failure aborts the whole chain with a [`MigrationError`]; the
//! caller never sees a half-migrated document.
//!
//! A document already at the current version passes through untouched, which
//! makes running the chain twice a no-op.

use crate::error::{MigrationError, QuillError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

/// Logical document type, derived from the key layout used by [`crate::projects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Project,
    Chapters,
    Characters,
    Timeline,
    Settings,
    Asset,
    Generic,
}

impl DocumentKind {
    /// Classify a key. `project:<id>:<suffix>` keys are classified by suffix,
    /// `settings:*` keys are settings, everything else is generic.
    pub fn from_key(key: &str) -> Self {
        if let Some(rest) = key.strip_prefix("project:") {
            let Some((_, suffix)) = rest.split_once(':') else {
                return DocumentKind::Generic;
            };
            return match suffix {
                "meta" => DocumentKind::Project,
                "chapters" => DocumentKind::Chapters,
                "characters" => DocumentKind::Characters,
                "timeline" => DocumentKind::Timeline,
                "settings" => DocumentKind::Settings,
                s if s.starts_with("asset:") => DocumentKind::Asset,
                _ => DocumentKind::Generic,
            };
        }
        if key.starts_with("settings:") {
            return DocumentKind::Settings;
        }
        DocumentKind::Generic
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::Project => "project",
            DocumentKind::Chapters => "chapters",
            DocumentKind::Characters => "characters",
            DocumentKind::Timeline => "timeline",
            DocumentKind::Settings => "settings",
            DocumentKind::Asset => "asset",
            DocumentKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

pub type MigrationFn = Box<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;
pub type ValidatorFn = Box<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

#[derive(Default)]
struct KindChain {
    steps: Vec<MigrationFn>,
    validator: Option<ValidatorFn>,
}

/// Outcome of running a document through its chain.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub value: Value,
    pub migrated_from: u32,
    pub migrated_to: u32,
    pub steps_applied: u32,
}

/// Per-kind migration chains and post-migration validators.
#[derive(Default)]
pub struct MigrationRegistry {
    chains: HashMap<DocumentKind, KindChain>,
}

impl MigrationRegistry {
    /// A registry with no steps: every kind is at v1.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append the next step for `kind`. The first call registers v1 → v2.
    pub fn step<F>(mut self, kind: DocumentKind, f: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.chains.entry(kind).or_default().steps.push(Box::new(f));
        self
    }

    pub fn validator<F>(mut self, kind: DocumentKind, f: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.chains.entry(kind).or_default().validator = Some(Box::new(f));
        self
    }

    pub fn current_version(&self, kind: DocumentKind) -> u32 {
        self.chains
            .get(&kind)
            .map(|c| c.steps.len() as u32 + 1)
            .unwrap_or(1)
    }

    pub fn needs_migration(&self, kind: DocumentKind, version: u32) -> bool {
        version < self.current_version(kind)
    }

    /// Reject version markers that must never enter storage: zero, or newer
    /// than anything this build knows how to read.
    pub fn validate_schema_version(&self, kind: DocumentKind, version: u32) -> Result<()> {
        let current = self.current_version(kind);
        if version == 0 || version > current {
            return Err(QuillError::InvalidSchemaVersion {
                kind,
                version,
                current,
            });
        }
        Ok(())
    }

    /// Run `value` from `from_version` up to the current version of `kind`.
    pub fn migrate(
        &self,
        kind: DocumentKind,
        key: &str,
        value: Value,
        from_version: u32,
    ) -> Result<MigrationOutcome> {
        self.validate_schema_version(kind, from_version)?;
        let current = self.current_version(kind);
        if from_version == current {
            return Ok(MigrationOutcome {
                value,
                migrated_from: from_version,
                migrated_to: current,
                steps_applied: 0,
            });
        }

        let fail = |failed_at: u32, reason: String| {
            QuillError::Migration(MigrationError {
                kind,
                key: key.to_string(),
                from_version,
                to_version: current,
                failed_at,
                reason,
            })
        };

        let chain = self
            .chains
            .get(&kind)
            .ok_or_else(|| fail(from_version + 1, "no migration chain".to_string()))?;

        let mut data = value;
        let mut version = from_version;
        while version < current {
            let step = &chain.steps[(version - 1) as usize];
            data = step(data).map_err(|reason| fail(version + 1, reason))?;
            version += 1;
        }

        if let Some(validate) = &chain.validator {
            validate(&data).map_err(|reason| fail(current, reason))?;
        }

        Ok(MigrationOutcome {
            value: data,
            migrated_from: from_version,
            migrated_to: current,
            steps_applied: current - from_version,
        })
    }
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let versions: HashMap<_, _> = self
            .chains
            .keys()
            .map(|k| (*k, self.current_version(*k)))
            .collect();
        f.debug_struct("MigrationRegistry")
            .field("versions", &versions)
            .finish()
    }
}

/// The chains shipped with this build.
///
/// - Project v1 → v2: `title` renamed to `name`, `description` defaulted.
/// - Project v2 → v3: `wordCount` defaulted to 0.
/// - Chapters v1 → v2: every chapter gains `order` (its position) and `scenes`.
pub fn default_registry() -> MigrationRegistry {
    MigrationRegistry::empty()
        .step(DocumentKind::Project, project_v1_to_v2)
        .step(DocumentKind::Project, project_v2_to_v3)
        .validator(DocumentKind::Project, validate_project)
        .step(DocumentKind::Chapters, chapters_v1_to_v2)
        .validator(DocumentKind::Chapters, validate_chapters)
        .validator(DocumentKind::Characters, validate_id_list)
}

fn project_v1_to_v2(mut value: Value) -> std::result::Result<Value, String> {
    let obj = value
        .as_object_mut()
        .ok_or_else(|| "project metadata is not an object".to_string())?;
    if !obj.contains_key("name") {
        let title = obj.remove("title").unwrap_or_else(|| json!(""));
        obj.insert("name".into(), title);
    }
    obj.entry("description").or_insert_with(|| json!(""));
    Ok(value)
}

fn project_v2_to_v3(mut value: Value) -> std::result::Result<Value, String> {
    let obj = value
        .as_object_mut()
        .ok_or_else(|| "project metadata is not an object".to_string())?;
    obj.entry("wordCount").or_insert_with(|| json!(0));
    Ok(value)
}

fn chapters_v1_to_v2(mut value: Value) -> std::result::Result<Value, String> {
    let chapters = value
        .as_array_mut()
        .ok_or_else(|| "chapter list is not an array".to_string())?;
    for (position, chapter) in chapters.iter_mut().enumerate() {
        let obj = chapter
            .as_object_mut()
            .ok_or_else(|| format!("chapter {} is not an object", position))?;
        obj.entry("order").or_insert_with(|| json!(position));
        obj.entry("scenes").or_insert_with(|| json!([]));
    }
    Ok(value)
}

fn validate_project(value: &Value) -> std::result::Result<(), String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "project metadata is not an object".to_string())?;
    for field in ["id", "name"] {
        if !obj.get(field).is_some_and(Value::is_string) {
            return Err(format!("project metadata is missing `{}`", field));
        }
    }
    Ok(())
}

fn validate_chapters(value: &Value) -> std::result::Result<(), String> {
    validate_id_list(value)?;
    for chapter in value.as_array().into_iter().flatten() {
        if !chapter.get("scenes").is_some_and(Value::is_array) {
            return Err("chapter is missing its scene list".to_string());
        }
    }
    Ok(())
}

fn validate_id_list(value: &Value) -> std::result::Result<(), String> {
    let items = value
        .as_array()
        .ok_or_else(|| "expected an array".to_string())?;
    for item in items {
        if !item.get("id").is_some_and(Value::is_string) {
            return Err("item is missing a string `id`".to_string());
        }
    }
    Ok(())
}
