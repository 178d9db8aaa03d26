//! # Archives
//!
//! An archive is one project packed into a portable container: a manifest,
//! the full document tree, a human-readable summary and any binary assets.
//!
//! ```text
//! <name>-<YYYY-MM-DD>.quill.tar.gz
//! ├── manifest.json    ArchiveManifest (always first)
//! ├── README.json      ArchiveReadme
//! ├── project.json     ProjectTree
//! └── assets/<file>    raw bytes
//! ```
//!
//! ## Export and Import
//!
//! [`Archiver::create`] reads a project through the [`StorageManager`] and
//! packs it. [`Archiver::import`] runs the reverse: extract, validate,
//! optionally repair, then write back through ordinary versioned puts.
//!
//! A container missing `manifest.json` or `project.json` is not an archive
//! at all and fails extraction with [`QuillError::ArchiveStructure`].
//! Everything else is reported by [`validate`] as errors (import refused
//! unless repairable and repair was requested) or warnings (import proceeds).
//!
//! ## Schema Versions
//!
//! `schemaVersion` in the manifest is the project metadata schema the archive
//! was written with. Older archives are migrated through the same registry
//! the storage layer uses; newer ones are rejected.

pub mod container;
pub mod manifest;
pub mod naming;
pub mod validate;

use crate::config::QuillConfig;
use crate::error::{QuillError, Result};
use crate::migrate::DocumentKind;
use crate::model::{project_prefix, ProjectTree, META_SUFFIX};
use crate::projects;
use crate::store::{RestoreOptions, Snapshot, StorageManager, WriteOp};
use chrono::{DateTime, Utc};
use container::ContainerInput;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

pub use manifest::{ArchiveManifest, ArchiveReadme, ItemCounts, ARCHIVE_FORMAT, ARCHIVE_VERSION};
pub use naming::{archive_file_name, sanitize_archive_name, DEFAULT_ARCHIVE_NAME};
pub use validate::{repair, validate, ValidationResult};

/// A project in transit, between a container and the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectBundle {
    pub manifest: ArchiveManifest,
    pub project: ProjectTree,
    pub assets: BTreeMap<String, Vec<u8>>,
}

/// A packed archive ready to be written somewhere.
#[derive(Debug, Clone)]
pub struct Archive {
    pub file_name: String,
    pub manifest: ArchiveManifest,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Apply the available repairs before writing.
    pub repair_data: bool,
    /// Store under a fresh project id instead of the archived one.
    pub new_id: bool,
    /// Replace an existing project with the same id.
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportResult {
    pub project_id: String,
    /// Validation of the bundle as extracted, before any repair.
    pub validation: ValidationResult,
    pub repaired: bool,
    pub repairs: Vec<String>,
}

/// What [`Archiver::inspect`] can tell from the manifest alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub name: String,
    pub project_id: String,
    pub exported_at: DateTime<Utc>,
    pub schema_version: u32,
    pub item_counts: ItemCounts,
    /// False when the archive was written by a newer build.
    pub supported: bool,
    pub size_bytes: usize,
}

pub struct Archiver<'a> {
    manager: &'a StorageManager,
    extension: String,
    name_max_len: usize,
}

impl<'a> Archiver<'a> {
    pub fn new(manager: &'a StorageManager) -> Self {
        Self::with_config(manager, &QuillConfig::default())
    }

    pub fn with_config(manager: &'a StorageManager, config: &QuillConfig) -> Self {
        Self {
            manager,
            extension: config.archive_extension().to_string(),
            name_max_len: config.archive_name_max_len,
        }
    }

    fn supported_schema(&self) -> u32 {
        self.manager.registry().current_version(DocumentKind::Project)
    }

    pub fn create(&self, project_id: &str) -> Result<Archive> {
        self.create_at(project_id, Utc::now())
    }

    /// Pack a project, stamping the archive with `now`.
    pub fn create_at(&self, project_id: &str, now: DateTime<Utc>) -> Result<Archive> {
        let tree = projects::load_tree(self.manager, project_id)?;
        let assets = projects::list_assets(self.manager, project_id)?;

        let manifest = ArchiveManifest {
            format: ARCHIVE_FORMAT.to_string(),
            version: ARCHIVE_VERSION,
            schema_version: self.supported_schema(),
            name: tree.meta.name.clone(),
            project_id: tree.meta.id.clone(),
            exported_at: now,
            item_counts: ItemCounts::of(&tree, assets.len()),
        };
        let readme = ArchiveReadme::for_manifest(&manifest);

        let bytes = container::write_container(
            Vec::new(),
            &ContainerInput {
                manifest: &serde_json::to_vec_pretty(&manifest)?,
                readme: &serde_json::to_vec_pretty(&readme)?,
                project: &serde_json::to_vec_pretty(&tree)?,
                assets: &assets,
                modified: now,
            },
        )?;
        let file_name = archive_file_name(&tree.meta.name, now, &self.extension, self.name_max_len);

        info!(
            project = project_id,
            file = %file_name,
            bytes = bytes.len(),
            chapters = manifest.item_counts.chapters,
            assets = manifest.item_counts.assets,
            "archive created"
        );
        Ok(Archive {
            file_name,
            manifest,
            bytes,
        })
    }

    /// Unpack a container and validate what it holds.
    pub fn extract(&self, bytes: &[u8]) -> Result<(ProjectBundle, ValidationResult)> {
        let entries = container::read_container(bytes)?;
        let missing = |entry: &str| QuillError::ArchiveStructure(format!("missing {}", entry));
        let manifest_bytes = entries
            .manifest
            .ok_or_else(|| missing(container::MANIFEST_ENTRY))?;
        let project_bytes = entries
            .project
            .ok_or_else(|| missing(container::PROJECT_ENTRY))?;

        let manifest: ArchiveManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
            QuillError::ArchiveStructure(format!("{} is unreadable: {}", container::MANIFEST_ENTRY, e))
        })?;
        let project = self.read_project(&manifest, &project_bytes)?;

        let bundle = ProjectBundle {
            manifest,
            project,
            assets: entries.assets,
        };
        let validation = self.validate(&bundle);
        info!(
            project = %bundle.project.meta.id,
            valid = validation.is_valid,
            errors = validation.errors.len(),
            warnings = validation.warnings.len(),
            "archive extracted"
        );
        Ok((bundle, validation))
    }

    /// Parse `project.json`, bringing older metadata up to the current schema.
    fn read_project(&self, manifest: &ArchiveManifest, bytes: &[u8]) -> Result<ProjectTree> {
        let unreadable = |e: serde_json::Error| {
            QuillError::ArchiveStructure(format!("{} is unreadable: {}", container::PROJECT_ENTRY, e))
        };
        let mut raw: Value = serde_json::from_slice(bytes).map_err(unreadable)?;

        let supported = self.supported_schema();
        if manifest.schema_version > supported {
            // A newer layout may not parse at all; say why instead of failing on a field.
            return serde_json::from_value(raw).map_err(|_| {
                QuillError::ArchiveRejected(format!(
                    "Archive schema version {} is newer than supported version {}",
                    manifest.schema_version, supported
                ))
            });
        }

        if manifest.schema_version < supported {
            if let Some(meta) = raw.get_mut("meta") {
                let key = format!("{}:{}", container::PROJECT_ENTRY, META_SUFFIX);
                let outcome = self.manager.registry().migrate(
                    DocumentKind::Project,
                    &key,
                    meta.take(),
                    manifest.schema_version.max(1),
                )?;
                *meta = outcome.value;
                info!(
                    from = outcome.migrated_from,
                    to = outcome.migrated_to,
                    "archived project metadata migrated"
                );
            }
        }
        serde_json::from_value(raw).map_err(unreadable)
    }

    pub fn validate(&self, bundle: &ProjectBundle) -> ValidationResult {
        validate::validate(bundle, self.supported_schema())
    }

    /// Extract, validate, optionally repair, and store a project.
    pub fn import(&self, bytes: &[u8], options: ImportOptions) -> Result<ImportResult> {
        let (mut bundle, validation) = self.extract(bytes)?;

        if !validation.is_valid && !validation.can_recover {
            return Err(QuillError::ArchiveRejected(validation.errors.join("; ")));
        }
        if !validation.is_valid && !options.repair_data {
            return Err(QuillError::ArchiveRejected(format!(
                "{} (repairable; import with repair enabled)",
                validation.errors.join("; ")
            )));
        }

        let repairs = if options.repair_data && !validation.repair_options.is_empty() {
            repair(&mut bundle)
        } else {
            Vec::new()
        };
        if !validation.warnings.is_empty() && repairs.is_empty() {
            warn!(
                warnings = validation.warnings.len(),
                "importing archive with unrepaired warnings"
            );
        }

        if options.new_id {
            bundle.project.meta.id = Uuid::new_v4().to_string();
        }
        let project_id = bundle.project.meta.id.clone();
        let previous = if projects::project_exists(self.manager, &project_id)? {
            if !options.overwrite {
                return Err(QuillError::ProjectExists(project_id));
            }
            Some(self.manager.create_snapshot(Some(&project_prefix(&project_id)))?)
        } else {
            None
        };

        if let Err(e) = self.write_bundle(&bundle, previous.is_some()) {
            self.roll_back(&project_id, previous.as_ref());
            return Err(e);
        }

        info!(
            project = %project_id,
            repaired = !repairs.is_empty(),
            assets = bundle.assets.len(),
            "archive imported"
        );
        Ok(ImportResult {
            project_id,
            validation,
            repaired: !repairs.is_empty(),
            repairs,
        })
    }

    fn write_bundle(&self, bundle: &ProjectBundle, replace: bool) -> Result<()> {
        let project_id = &bundle.project.meta.id;
        if replace {
            projects::delete_project(self.manager, project_id)?;
        }
        projects::save_tree(self.manager, &bundle.project)?;
        for (name, data) in &bundle.assets {
            projects::put_asset(self.manager, project_id, name, data)?;
        }
        Ok(())
    }

    /// Undo a failed import: drop whatever part of it was written, then put
    /// back the project it was replacing.
    fn roll_back(&self, project_id: &str, previous: Option<&Snapshot>) {
        let prefix = project_prefix(project_id);
        let cleared = self.manager.list(Some(&prefix)).and_then(|keys| {
            self.manager
                .transact(keys.into_iter().map(WriteOp::delete).collect())
        });
        let restored = match (cleared, previous) {
            (Ok(_), Some(snapshot)) => self
                .manager
                .restore_snapshot(snapshot, RestoreOptions::default())
                .map(|_| ()),
            (outcome, _) => outcome.map(|_| ()),
        };
        match restored {
            Ok(()) => warn!(project = project_id, "import failed, rolled back"),
            Err(e) => warn!(project = project_id, error = %e, "import failed and could not be rolled back"),
        }
    }

    /// Read the manifest without unpacking the project body.
    pub fn inspect(&self, bytes: &[u8]) -> Result<ArchiveSummary> {
        let manifest: ArchiveManifest = serde_json::from_slice(&container::read_manifest(bytes)?)
            .map_err(|e| {
                QuillError::ArchiveStructure(format!(
                    "{} is unreadable: {}",
                    container::MANIFEST_ENTRY,
                    e
                ))
            })?;
        let supported = manifest.format == ARCHIVE_FORMAT
            && manifest.version <= ARCHIVE_VERSION
            && manifest.schema_version <= self.supported_schema();
        Ok(ArchiveSummary {
            name: manifest.name,
            project_id: manifest.project_id,
            exported_at: manifest.exported_at,
            schema_version: manifest.schema_version,
            item_counts: manifest.item_counts,
            supported,
            size_bytes: bytes.len(),
        })
    }
}

/// Write `archive` into `dir` under its own file name.
pub fn write_to_path(archive: &Archive, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(&archive.file_name);
    let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
    std::fs::write(&tmp, &archive.bytes)?;
    std::fs::rename(&tmp, &path)?;
    Ok(path)
}

pub fn read_from_path(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::default_registry;
    use crate::model::{project_key, Chapter, Character, Scene};
    use crate::store::mem_backend::MemBackend;
    use crate::store::StorageBackend;
    use crate::test_utils::TestEnv;
    use chrono::TimeZone;
    use serde_json::json;

    fn manager() -> StorageManager {
        StorageManager::init(Box::new(MemBackend::new()), default_registry())
    }

    /// Three chapters, the second without scenes.
    fn seed(m: &StorageManager) -> String {
        let meta = projects::create_project(m, "The Long Road", "A journey").unwrap();
        let mut tree = projects::load_tree(m, &meta.id).unwrap();
        let mut one = Chapter::new("ch-1".into(), "Departure".into(), 0);
        one.scenes
            .push(Scene::new("sc-1".into(), "Dawn".into(), "The road was long".into()));
        let two = Chapter::new("ch-2".into(), "Interlude".into(), 1);
        let mut three = Chapter::new("ch-3".into(), "Arrival".into(), 2);
        three
            .scenes
            .push(Scene::new("sc-2".into(), "Dusk".into(), "Home at last".into()));
        tree.chapters = vec![one, two, three];
        tree.characters.push(Character::new("k-1".into(), "Wren".into()));
        tree.documents
            .insert("timeline".into(), json!([{"event": "leave", "at": 1}]));
        tree.recompute_word_counts();
        projects::save_tree(m, &tree).unwrap();
        projects::put_asset(m, &meta.id, "map.png", &[137, 80, 78, 71]).unwrap();
        meta.id
    }

    #[test]
    fn test_create_names_and_counts() {
        let m = manager();
        let id = seed(&m);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let archive = Archiver::new(&m).create_at(&id, now).unwrap();

        assert_eq!(archive.file_name, "The-Long-Road-2024-06-01.quill.tar.gz");
        assert_eq!(archive.manifest.project_id, id);
        assert_eq!(archive.manifest.schema_version, 3);
        let counts = archive.manifest.item_counts;
        assert_eq!(counts.chapters, 3);
        assert_eq!(counts.scenes, 2);
        assert_eq!(counts.characters, 1);
        assert_eq!(counts.documents, 1);
        assert_eq!(counts.assets, 1);
        assert_eq!(counts.words, 7);
    }

    #[test]
    fn test_create_missing_project() {
        let m = manager();
        assert!(matches!(
            Archiver::new(&m).create("ghost"),
            Err(QuillError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn test_extract_is_symmetric_with_create() {
        let m = manager();
        let id = seed(&m);
        let archiver = Archiver::new(&m);
        let archive = archiver.create(&id).unwrap();

        let (bundle, validation) = archiver.extract(&archive.bytes).unwrap();
        assert!(validation.errors.is_empty());
        assert_eq!(bundle.project, projects::load_tree(&m, &id).unwrap());
        assert_eq!(bundle.assets["map.png"], vec![137, 80, 78, 71]);
        assert_eq!(bundle.manifest, archive.manifest);
    }

    #[test]
    fn test_empty_chapter_warning_and_repaired_import() {
        let source = manager();
        let id = seed(&source);
        let archive = Archiver::new(&source).create(&id).unwrap();

        let target = manager();
        let archiver = Archiver::new(&target);
        let (_, validation) = archiver.extract(&archive.bytes).unwrap();
        assert_eq!(validation.warnings, vec!["1 chapters have no scenes"]);
        assert!(validation.can_recover);

        let result = archiver
            .import(
                &archive.bytes,
                ImportOptions {
                    repair_data: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(result.repaired);
        assert_eq!(result.project_id, id);

        let tree = projects::load_tree(&target, &id).unwrap();
        assert_eq!(tree.chapters[1].scenes.len(), 1);
        assert_eq!(tree.chapters[0].scenes.len(), 1);
        assert_eq!(tree.documents["timeline"], json!([{"event": "leave", "at": 1}]));
        assert_eq!(
            projects::get_asset(&target, &id, "map.png").unwrap(),
            Some(vec![137, 80, 78, 71])
        );
    }

    #[test]
    fn test_import_without_repair_keeps_warnings() {
        let source = manager();
        let id = seed(&source);
        let archive = Archiver::new(&source).create(&id).unwrap();

        let target = manager();
        let result = Archiver::new(&target)
            .import(&archive.bytes, ImportOptions::default())
            .unwrap();
        assert!(!result.repaired);
        assert!(projects::load_tree(&target, &id).unwrap().chapters[1]
            .scenes
            .is_empty());
    }

    #[test]
    fn test_duplicate_ids_need_repair() {
        let source = manager();
        let id = seed(&source);
        let mut tree = projects::load_tree(&source, &id).unwrap();
        tree.chapters[2].id = "ch-1".into();
        projects::save_tree(&source, &tree).unwrap();
        let archive = Archiver::new(&source).create(&id).unwrap();

        let target = manager();
        let archiver = Archiver::new(&target);
        let (_, validation) = archiver.extract(&archive.bytes).unwrap();
        assert!(validation.errors.contains(&"Duplicate chapter IDs found".to_string()));
        assert!(validation.can_recover);

        assert!(matches!(
            archiver.import(&archive.bytes, ImportOptions::default()),
            Err(QuillError::ArchiveRejected(_))
        ));

        let result = archiver
            .import(
                &archive.bytes,
                ImportOptions {
                    repair_data: true,
                    ..Default::default()
                },
            )
            .unwrap();
        let tree = projects::load_tree(&target, &result.project_id).unwrap();
        assert_ne!(tree.chapters[0].id, tree.chapters[2].id);
        assert_ne!(tree.chapters[0].id, "ch-1");
        assert_eq!(tree.chapters[0].title, "Departure");
        assert_eq!(tree.chapters[2].title, "Arrival");
        assert_eq!(tree.chapters[2].scenes[0].content, "Home at last");
    }

    #[test]
    fn test_import_existing_project_needs_overwrite_or_new_id() {
        let m = manager();
        let id = seed(&m);
        let archiver = Archiver::new(&m);
        let archive = archiver.create(&id).unwrap();

        assert!(matches!(
            archiver.import(&archive.bytes, ImportOptions::default()),
            Err(QuillError::ProjectExists(_))
        ));

        let copy = archiver
            .import(
                &archive.bytes,
                ImportOptions {
                    new_id: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_ne!(copy.project_id, id);
        assert_eq!(projects::list_projects(&m).unwrap().len(), 2);

        m.put(&project_key(&id, "scratch"), &json!("not in archive"))
            .unwrap();
        archiver
            .import(
                &archive.bytes,
                ImportOptions {
                    overwrite: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(m.get(&project_key(&id, "scratch")).unwrap(), None);
    }

    #[test]
    fn test_failed_import_leaves_existing_project_intact() {
        let env = TestEnv::new();
        let tree = env.seed_project("Original", 2, 2);
        let id = tree.meta.id.clone();
        let archiver = Archiver::new(&env.manager);

        // Archive a larger edition, then put the stored project back as it was.
        let notes = project_key(&id, "notes");
        env.manager.put(&notes, &json!("x".repeat(2000))).unwrap();
        let archive = archiver.create(&id).unwrap();
        env.manager.delete(&notes).unwrap();
        let before = env.manager.create_snapshot(Some(&project_prefix(&id))).unwrap();

        let used: usize = env
            .backend
            .list(None)
            .unwrap()
            .iter()
            .map(|k| k.len() + env.backend.get(k).unwrap().unwrap().len())
            .sum();
        env.backend.set_quota(Some(used + 1000));

        let err = archiver
            .import(
                &archive.bytes,
                ImportOptions {
                    overwrite: true,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, QuillError::Backend(_)));

        let after = env.manager.create_snapshot(Some(&project_prefix(&id))).unwrap();
        assert_eq!(after.len(), before.len());
        for (key, record) in &before {
            assert_eq!(after[key].value, record.value, "{}", key);
        }
        assert_eq!(projects::load_tree(&env.manager, &id).unwrap(), tree);

        // A fresh copy that does not fit leaves nothing behind either.
        assert!(archiver
            .import(
                &archive.bytes,
                ImportOptions {
                    new_id: true,
                    ..Default::default()
                },
            )
            .is_err());
        assert_eq!(projects::list_projects(&env.manager).unwrap().len(), 1);
        assert_eq!(env.manager.list(None).unwrap().len(), before.len());
    }

    #[test]
    fn test_import_with_nested_project_id() {
        let env = TestEnv::new();
        let host = env.seed_project("Host", 1, 1);
        let mut nested = host.clone();
        nested.meta.id = format!("{}:sub", host.meta.id);
        let bundle = ProjectBundle {
            manifest: ArchiveManifest {
                format: ARCHIVE_FORMAT.to_string(),
                version: ARCHIVE_VERSION,
                schema_version: 3,
                name: "Nested".to_string(),
                project_id: nested.meta.id.clone(),
                exported_at: Utc::now(),
                item_counts: ItemCounts::of(&nested, 0),
            },
            project: nested,
            assets: BTreeMap::new(),
        };
        let manifest = serde_json::to_vec(&bundle.manifest).unwrap();
        let project = serde_json::to_vec(&bundle.project).unwrap();
        let bytes = tar_gz(&[
            (container::MANIFEST_ENTRY, manifest.as_slice()),
            (container::PROJECT_ENTRY, project.as_slice()),
        ]);
        let archiver = Archiver::new(&env.manager);

        assert!(matches!(
            archiver.import(&bytes, ImportOptions::default()),
            Err(QuillError::ArchiveRejected(_))
        ));

        let result = archiver
            .import(
                &bytes,
                ImportOptions {
                    repair_data: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(result.repaired);
        assert!(!result.project_id.contains(':'));
        assert_eq!(projects::list_projects(&env.manager).unwrap().len(), 2);
        assert!(projects::load_tree(&env.manager, &host.meta.id)
            .unwrap()
            .documents
            .is_empty());
    }

    fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut tar = tar::Builder::new(enc);
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append_data(&mut header, path, *data).unwrap();
        }
        tar.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_missing_entries_fail_extraction() {
        let m = manager();
        let id = seed(&m);
        let archiver = Archiver::new(&m);
        let archive = archiver.create(&id).unwrap();
        let manifest = serde_json::to_vec(&archive.manifest).unwrap();

        let no_project = tar_gz(&[("manifest.json", manifest.as_slice())]);
        match archiver.extract(&no_project) {
            Err(QuillError::ArchiveStructure(msg)) => assert!(msg.contains("project.json")),
            other => panic!("expected structure error, got {:?}", other.map(|_| ())),
        }

        let no_manifest = tar_gz(&[("project.json", &b"{}"[..])]);
        match archiver.extract(&no_manifest) {
            Err(QuillError::ArchiveStructure(msg)) => assert!(msg.contains("manifest.json")),
            other => panic!("expected structure error, got {:?}", other.map(|_| ())),
        }
        assert!(matches!(
            archiver.inspect(&no_manifest),
            Err(QuillError::ArchiveStructure(_))
        ));
        assert!(matches!(
            archiver.extract(b"not an archive"),
            Err(QuillError::ArchiveStructure(_))
        ));
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let m = manager();
        let id = seed(&m);
        let archiver = Archiver::new(&m);
        let mut archive = archiver.create(&id).unwrap();
        let (bundle, _) = archiver.extract(&archive.bytes).unwrap();

        let mut manifest = bundle.manifest.clone();
        manifest.schema_version = 99;
        archive.bytes = container::write_container(
            Vec::new(),
            &ContainerInput {
                manifest: &serde_json::to_vec(&manifest).unwrap(),
                readme: b"{}",
                project: &serde_json::to_vec(&bundle.project).unwrap(),
                assets: &bundle.assets,
                modified: Utc::now(),
            },
        )
        .unwrap();

        let target = manager();
        let archiver = Archiver::new(&target);
        assert!(!archiver.inspect(&archive.bytes).unwrap().supported);
        let (_, validation) = archiver.extract(&archive.bytes).unwrap();
        assert!(!validation.can_recover);
        assert!(matches!(
            archiver.import(
                &archive.bytes,
                ImportOptions {
                    repair_data: true,
                    ..Default::default()
                }
            ),
            Err(QuillError::ArchiveRejected(_))
        ));
    }

    #[test]
    fn test_old_schema_metadata_is_migrated() {
        let m = manager();
        let manifest = json!({
            "version": 1,
            "schemaVersion": 1,
            "name": "Old",
            "projectId": "old-1",
            "exportedAt": "2020-01-01T00:00:00Z",
            "itemCounts": {}
        });
        let project = json!({
            "meta": {
                "id": "old-1",
                "title": "Old",
                "createdAt": "2020-01-01T00:00:00Z",
                "updatedAt": "2020-01-01T00:00:00Z"
            },
            "chapters": []
        });
        let assets = BTreeMap::new();
        let bytes = container::write_container(
            Vec::new(),
            &ContainerInput {
                manifest: &serde_json::to_vec(&manifest).unwrap(),
                readme: b"{}",
                project: &serde_json::to_vec(&project).unwrap(),
                assets: &assets,
                modified: Utc::now(),
            },
        )
        .unwrap();

        let result = Archiver::new(&m)
            .import(&bytes, ImportOptions::default())
            .unwrap();
        assert!(result.validation.is_clean());
        let tree = projects::load_tree(&m, "old-1").unwrap();
        assert_eq!(tree.meta.name, "Old");
        assert_eq!(tree.meta.description, "");
    }

    #[test]
    fn test_inspect_reads_manifest() {
        let m = manager();
        let id = seed(&m);
        let archiver = Archiver::new(&m);
        let archive = archiver.create(&id).unwrap();

        let summary = archiver.inspect(&archive.bytes).unwrap();
        assert_eq!(summary.name, "The Long Road");
        assert_eq!(summary.project_id, id);
        assert_eq!(summary.item_counts, archive.manifest.item_counts);
        assert!(summary.supported);
        assert_eq!(summary.size_bytes, archive.bytes.len());
    }

    #[test]
    fn test_write_and_read_path() {
        let m = manager();
        let id = seed(&m);
        let archive = Archiver::new(&m).create(&id).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let path = write_to_path(&archive, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap().to_str(), Some(archive.file_name.as_str()));
        assert_eq!(read_from_path(&path).unwrap(), archive.bytes);
    }
}
