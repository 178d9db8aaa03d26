//! Structural checks and repairs for an extracted [`ProjectBundle`].
//!
//! Every check produces an [`Issue`]. Issues with a repair become a
//! `repairOption` in the [`ValidationResult`] and are fixed by [`repair`] in a
//! fixed order: the project id, then item ids (placeholders and timestamps
//! touch the lists), then placeholders, then timestamps, then word counts
//! last since placeholders change the totals.

use super::manifest::{ARCHIVE_FORMAT, ARCHIVE_VERSION};
use super::ProjectBundle;
use crate::model::{is_valid_project_id, Scene};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

pub const PLACEHOLDER_SCENE_TITLE: &str = "Untitled Scene";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// No errors, recoverable or not. Warnings do not affect this.
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Every issue found has a repair.
    pub can_recover: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repair_options: Vec<String>,
}

impl ValidationResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    Chapter,
    Scene,
    Character,
}

impl ItemKind {
    fn label(self) -> &'static str {
        match self {
            ItemKind::Chapter => "chapter",
            ItemKind::Scene => "scene",
            ItemKind::Character => "character",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Issue {
    UnknownFormat(String),
    UnsupportedVersion { found: u32, supported: u32 },
    UnsupportedSchema { found: u32, supported: u32 },
    MissingProjectId,
    NestedProjectId(String),
    DuplicateIds(ItemKind),
    EmptyChapters(usize),
    WordCounts(usize),
    MissingTimestamps(usize),
}

impl Issue {
    fn is_error(&self) -> bool {
        !matches!(
            self,
            Issue::EmptyChapters(_) | Issue::WordCounts(_) | Issue::MissingTimestamps(_)
        )
    }

    fn message(&self) -> String {
        match self {
            Issue::UnknownFormat(format) => format!("Unrecognized archive format \"{}\"", format),
            Issue::UnsupportedVersion { found, supported } => format!(
                "Archive format version {} is newer than supported version {}",
                found, supported
            ),
            Issue::UnsupportedSchema { found, supported } => format!(
                "Archive schema version {} is newer than supported version {}",
                found, supported
            ),
            Issue::MissingProjectId => "Project is missing an id".to_string(),
            Issue::NestedProjectId(id) => format!("Project id \"{}\" contains ':'", id),
            Issue::DuplicateIds(kind) => format!("Duplicate {} IDs found", kind.label()),
            Issue::EmptyChapters(n) => format!("{} chapters have no scenes", n),
            Issue::WordCounts(n) => format!("Word counts are inconsistent for {} items", n),
            Issue::MissingTimestamps(n) => format!("{} items are missing timestamps", n),
        }
    }

    /// `None` means the issue cannot be repaired.
    fn repair_option(&self) -> Option<String> {
        match self {
            Issue::NestedProjectId(_) => Some("Assign a new project id".to_string()),
            Issue::DuplicateIds(kind) => Some(format!("Regenerate duplicate {} IDs", kind.label())),
            Issue::EmptyChapters(n) => Some(format!("Add placeholder scenes to {} empty chapters", n)),
            Issue::WordCounts(_) => Some("Recalculate word counts from scene totals".to_string()),
            Issue::MissingTimestamps(_) => {
                Some("Set missing timestamps to the current time".to_string())
            }
            _ => None,
        }
    }
}

/// Check a bundle. `supported_schema` is the newest project schema version
/// this build can store.
pub fn validate(bundle: &ProjectBundle, supported_schema: u32) -> ValidationResult {
    let issues = find_issues(bundle, supported_schema);

    let mut result = ValidationResult::default();
    let mut unrecoverable = false;
    for issue in &issues {
        if issue.is_error() {
            result.errors.push(issue.message());
        } else {
            result.warnings.push(issue.message());
        }
        match issue.repair_option() {
            Some(option) => result.repair_options.push(option),
            None => unrecoverable = true,
        }
    }
    result.is_valid = result.errors.is_empty();
    result.can_recover = !unrecoverable && !issues.is_empty();
    result
}

fn find_issues(bundle: &ProjectBundle, supported_schema: u32) -> Vec<Issue> {
    let manifest = &bundle.manifest;
    let tree = &bundle.project;
    let mut issues = Vec::new();

    if manifest.format != ARCHIVE_FORMAT {
        issues.push(Issue::UnknownFormat(manifest.format.clone()));
    }
    if manifest.version > ARCHIVE_VERSION {
        issues.push(Issue::UnsupportedVersion {
            found: manifest.version,
            supported: ARCHIVE_VERSION,
        });
    }
    if manifest.schema_version > supported_schema {
        issues.push(Issue::UnsupportedSchema {
            found: manifest.schema_version,
            supported: supported_schema,
        });
    }
    if tree.meta.id.trim().is_empty() {
        issues.push(Issue::MissingProjectId);
    } else if !is_valid_project_id(&tree.meta.id) {
        issues.push(Issue::NestedProjectId(tree.meta.id.clone()));
    }

    if has_duplicates(tree.chapters.iter().map(|c| c.id.as_str())) {
        issues.push(Issue::DuplicateIds(ItemKind::Chapter));
    }
    let scene_ids = tree
        .chapters
        .iter()
        .flat_map(|c| c.scenes.iter().map(|s| s.id.as_str()));
    if has_duplicates(scene_ids) {
        issues.push(Issue::DuplicateIds(ItemKind::Scene));
    }
    if has_duplicates(tree.characters.iter().map(|c| c.id.as_str())) {
        issues.push(Issue::DuplicateIds(ItemKind::Character));
    }

    let empty = tree.chapters.iter().filter(|c| c.scenes.is_empty()).count();
    if empty > 0 {
        issues.push(Issue::EmptyChapters(empty));
    }

    let mut drifted = 0;
    let mut total = 0;
    for chapter in &tree.chapters {
        let scene_total = chapter.scene_word_total();
        if chapter.word_count != scene_total {
            drifted += 1;
        }
        total += scene_total;
    }
    if tree.meta.word_count != total {
        drifted += 1;
    }
    if drifted > 0 {
        issues.push(Issue::WordCounts(drifted));
    }

    let mut undated = usize::from(lacks_timestamps(tree.meta.created_at, tree.meta.updated_at));
    for chapter in &tree.chapters {
        undated += usize::from(lacks_timestamps(chapter.created_at, chapter.updated_at));
        for scene in &chapter.scenes {
            undated += usize::from(lacks_timestamps(scene.created_at, scene.updated_at));
        }
    }
    for character in &tree.characters {
        undated += usize::from(lacks_timestamps(character.created_at, character.updated_at));
    }
    if undated > 0 {
        issues.push(Issue::MissingTimestamps(undated));
    }

    issues
}

/// Apply every available repair in place. Returns what was done, one line
/// per repair that changed something.
pub fn repair(bundle: &mut ProjectBundle) -> Vec<String> {
    let tree = &mut bundle.project;
    let mut applied = Vec::new();

    if !tree.meta.id.trim().is_empty() && !is_valid_project_id(&tree.meta.id) {
        tree.meta.id = Uuid::new_v4().to_string();
        applied.push(format!("Assigned new project id {}", tree.meta.id));
    }

    let n = regenerate_duplicates(tree.chapters.iter_mut().map(|c| &mut c.id).collect());
    if n > 0 {
        applied.push(format!("Regenerated {} duplicate chapter IDs", n));
    }
    let n = regenerate_duplicates(
        tree.chapters
            .iter_mut()
            .flat_map(|c| c.scenes.iter_mut().map(|s| &mut s.id))
            .collect(),
    );
    if n > 0 {
        applied.push(format!("Regenerated {} duplicate scene IDs", n));
    }
    let n = regenerate_duplicates(tree.characters.iter_mut().map(|c| &mut c.id).collect());
    if n > 0 {
        applied.push(format!("Regenerated {} duplicate character IDs", n));
    }

    let mut filled = 0;
    for chapter in tree.chapters.iter_mut().filter(|c| c.scenes.is_empty()) {
        chapter.scenes.push(Scene::new(
            Uuid::new_v4().to_string(),
            PLACEHOLDER_SCENE_TITLE.to_string(),
            String::new(),
        ));
        filled += 1;
    }
    if filled > 0 {
        applied.push(format!("Added placeholder scenes to {} empty chapters", filled));
    }

    let now = Utc::now();
    let meta = &mut tree.meta;
    let mut stamped = usize::from(stamp(&mut meta.created_at, &mut meta.updated_at, now));
    for chapter in &mut tree.chapters {
        stamped += usize::from(stamp(&mut chapter.created_at, &mut chapter.updated_at, now));
        for scene in &mut chapter.scenes {
            stamped += usize::from(stamp(&mut scene.created_at, &mut scene.updated_at, now));
        }
    }
    for character in &mut tree.characters {
        stamped += usize::from(stamp(&mut character.created_at, &mut character.updated_at, now));
    }
    if stamped > 0 {
        applied.push(format!("Set missing timestamps on {} items", stamped));
    }

    let recounted = tree.recompute_word_counts();
    if recounted > 0 {
        applied.push(format!("Recalculated {} word counts", recounted));
    }

    info!(project = %tree.meta.id, repairs = applied.len(), "bundle repaired");
    applied
}

fn has_duplicates<'a>(ids: impl Iterator<Item = &'a str>) -> bool {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().any(|id| !seen.insert(id))
}

/// Every member of a duplicated group gets a fresh id, so no item keeps an
/// id another item was also known by.
fn regenerate_duplicates(ids: Vec<&mut String>) -> usize {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for id in &ids {
        *counts.entry((**id).clone()).or_default() += 1;
    }
    let mut changed = 0;
    for id in ids {
        if counts.get(id.as_str()).is_some_and(|&n| n > 1) {
            *id = Uuid::new_v4().to_string();
            changed += 1;
        }
    }
    changed
}

fn lacks_timestamps(created: Option<DateTime<Utc>>, updated: Option<DateTime<Utc>>) -> bool {
    created.is_none() || updated.is_none()
}

fn stamp(
    created: &mut Option<DateTime<Utc>>,
    updated: &mut Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let missing = lacks_timestamps(*created, *updated);
    created.get_or_insert(now);
    updated.get_or_insert(now);
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::manifest::{ArchiveManifest, ItemCounts};
    use crate::model::{Chapter, Character, ProjectMeta, ProjectTree};
    use std::collections::BTreeMap;

    fn bundle(tree: ProjectTree) -> ProjectBundle {
        ProjectBundle {
            manifest: ArchiveManifest {
                format: ARCHIVE_FORMAT.to_string(),
                version: ARCHIVE_VERSION,
                schema_version: 3,
                name: tree.meta.name.clone(),
                project_id: tree.meta.id.clone(),
                exported_at: Utc::now(),
                item_counts: ItemCounts::of(&tree, 0),
            },
            project: tree,
            assets: BTreeMap::new(),
        }
    }

    fn chapter(id: &str, scenes: &[(&str, &str)]) -> Chapter {
        let mut c = Chapter::new(id.into(), format!("Chapter {}", id), 0);
        for (sid, text) in scenes {
            c.scenes.push(Scene::new(sid.to_string(), String::new(), text.to_string()));
        }
        c
    }

    fn healthy() -> ProjectTree {
        let mut tree = ProjectTree::new(ProjectMeta::new("p1".into(), "Novel".into(), "".into()));
        tree.chapters.push(chapter("c1", &[("s1", "one two"), ("s2", "three")]));
        tree.chapters.push(chapter("c2", &[("s3", "four")]));
        tree.characters.push(Character::new("k1".into(), "Ann".into()));
        tree.recompute_word_counts();
        tree
    }

    #[test]
    fn test_healthy_bundle_is_clean() {
        let result = validate(&bundle(healthy()), 3);
        assert!(result.is_valid);
        assert!(result.is_clean());
        assert!(!result.can_recover);
        assert!(result.repair_options.is_empty());
    }

    #[test]
    fn test_empty_chapter_is_recoverable_warning() {
        let mut tree = healthy();
        tree.chapters.insert(1, chapter("empty", &[]));
        let result = validate(&bundle(tree), 3);

        assert!(result.is_valid);
        assert_eq!(result.warnings, vec!["1 chapters have no scenes"]);
        assert!(result.can_recover);
        assert_eq!(
            result.repair_options,
            vec!["Add placeholder scenes to 1 empty chapters"]
        );
    }

    #[test]
    fn test_duplicate_chapter_ids_are_recoverable_errors() {
        let mut tree = healthy();
        tree.chapters[1].id = "c1".into();
        let result = validate(&bundle(tree), 3);

        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["Duplicate chapter IDs found"]);
        assert!(result.can_recover);
        assert_eq!(result.repair_options, vec!["Regenerate duplicate chapter IDs"]);
    }

    #[test]
    fn test_word_count_and_timestamp_warnings() {
        let mut tree = healthy();
        tree.chapters[0].word_count = 99;
        tree.characters[0].updated_at = None;
        tree.chapters[1].scenes[0].created_at = None;
        let result = validate(&bundle(tree), 3);

        assert!(result.is_valid);
        assert!(result
            .warnings
            .contains(&"Word counts are inconsistent for 1 items".to_string()));
        assert!(result
            .warnings
            .contains(&"2 items are missing timestamps".to_string()));
        assert!(result.can_recover);
    }

    #[test]
    fn test_unrecoverable_errors() {
        let mut tree = healthy();
        tree.meta.id = String::new();
        let result = validate(&bundle(tree), 3);
        assert_eq!(result.errors, vec!["Project is missing an id"]);
        assert!(!result.can_recover);

        let result = validate(&bundle(healthy()), 2);
        assert_eq!(
            result.errors,
            vec!["Archive schema version 3 is newer than supported version 2"]
        );
        assert!(!result.can_recover);
    }

    #[test]
    fn test_project_id_with_separator_gets_replaced() {
        let mut tree = healthy();
        tree.meta.id = "p1:sub".into();
        let mut b = bundle(tree);
        let result = validate(&b, 3);
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["Project id \"p1:sub\" contains ':'"]);
        assert!(result.can_recover);
        assert_eq!(result.repair_options, vec!["Assign a new project id"]);

        let applied = repair(&mut b);
        assert_eq!(applied.len(), 1);
        assert!(is_valid_project_id(&b.project.meta.id));
        assert!(validate(&b, 3).is_clean());
    }

    #[test]
    fn test_unrecoverable_issue_blocks_recovery_of_others() {
        let mut tree = healthy();
        tree.meta.id = " ".into();
        tree.chapters.push(chapter("c3", &[]));
        let result = validate(&bundle(tree), 3);
        assert!(!result.can_recover);
        assert_eq!(result.repair_options.len(), 1);
    }

    #[test]
    fn test_repair_fixes_everything_it_reports() {
        let mut tree = healthy();
        tree.chapters[1].id = "c1".into();
        tree.chapters[1].title = "Kept".into();
        tree.chapters.push(chapter("c3", &[]));
        tree.chapters[0].scenes[1].id = "s1".into();
        tree.meta.word_count = 1;
        tree.characters[0].created_at = None;
        let mut b = bundle(tree);

        let applied = repair(&mut b);
        assert_eq!(applied.len(), 5);

        let tree = &b.project;
        assert_ne!(tree.chapters[0].id, "c1");
        assert_ne!(tree.chapters[1].id, "c1");
        assert_ne!(tree.chapters[0].id, tree.chapters[1].id);
        assert_eq!(tree.chapters[1].title, "Kept");
        assert_eq!(tree.chapters[2].id, "c3");
        assert_eq!(tree.chapters[2].scenes.len(), 1);
        assert_eq!(tree.chapters[2].scenes[0].title, PLACEHOLDER_SCENE_TITLE);
        assert_eq!(tree.meta.word_count, 4);
        assert!(tree.characters[0].created_at.is_some());

        assert!(validate(&b, 3).is_clean());
    }

    #[test]
    fn test_repair_on_clean_bundle_is_noop() {
        let mut b = bundle(healthy());
        let before = b.project.clone();
        assert!(repair(&mut b).is_empty());
        assert_eq!(b.project, before);
    }
}
