//! Export a project from one store and bring it back in another, on disk.

use quillstore::archive::{read_from_path, write_to_path, ImportOptions};
use quillstore::config::{BackendChoice, QuillConfig};
use quillstore::init::initialize_with;
use quillstore::model::{Chapter, Character, Scene};
use quillstore::projects;
use tempfile::TempDir;

fn config(backend: BackendChoice) -> QuillConfig {
    QuillConfig {
        backend,
        ..Default::default()
    }
}

#[test]
fn test_export_then_import_into_fresh_store() {
    let source_dir = TempDir::new().unwrap();
    let source = initialize_with(config(BackendChoice::Auto), source_dir.path()).unwrap();

    let meta = projects::create_project(&source.manager, "Salt & Iron: Book 1", "Draft").unwrap();
    let mut tree = projects::load_tree(&source.manager, &meta.id).unwrap();
    for (i, text) in ["It began at sea", "", "The harbour burned all night"]
        .iter()
        .enumerate()
    {
        let mut chapter = Chapter::new(format!("ch-{}", i + 1), format!("Part {}", i + 1), i as u32);
        if !text.is_empty() {
            chapter
                .scenes
                .push(Scene::new(format!("sc-{}", i + 1), String::new(), text.to_string()));
        }
        tree.chapters.push(chapter);
    }
    tree.characters.push(Character::new("c-1".into(), "Maren".into()));
    tree.recompute_word_counts();
    projects::save_tree(&source.manager, &tree).unwrap();
    projects::put_asset(&source.manager, &meta.id, "cover.jpg", &[0xff, 0xd8, 0xff]).unwrap();

    let archive = source.archiver().create(&meta.id).unwrap();
    assert!(archive.file_name.starts_with("Salt-&-Iron-Book-1-"));
    assert!(archive.file_name.ends_with(".quill.tar.gz"));

    let out = TempDir::new().unwrap();
    let path = write_to_path(&archive, out.path()).unwrap();
    let bytes = read_from_path(&path).unwrap();

    let target_dir = TempDir::new().unwrap();
    let target = initialize_with(config(BackendChoice::Flat), target_dir.path()).unwrap();
    let archiver = target.archiver();

    let summary = archiver.inspect(&bytes).unwrap();
    assert_eq!(summary.name, "Salt & Iron: Book 1");
    assert_eq!(summary.item_counts.chapters, 3);
    assert_eq!(summary.item_counts.assets, 1);

    let result = archiver
        .import(
            &bytes,
            ImportOptions {
                repair_data: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.validation.warnings, vec!["1 chapters have no scenes"]);
    assert!(result.repaired);

    let restored = projects::load_tree(&target.manager, &meta.id).unwrap();
    assert_eq!(restored.meta.name, "Salt & Iron: Book 1");
    assert_eq!(restored.chapters.len(), 3);
    assert_eq!(restored.chapters[1].scenes.len(), 1);
    assert_eq!(restored.meta.word_count, tree.meta.word_count);
    assert_eq!(
        projects::get_asset(&target.manager, &meta.id, "cover.jpg").unwrap(),
        Some(vec![0xff, 0xd8, 0xff])
    );

    // A second export of the imported project validates cleanly.
    let again = archiver.create(&meta.id).unwrap();
    let (_, validation) = archiver.extract(&again.bytes).unwrap();
    assert!(validation.is_clean());
}

#[test]
fn test_truncated_archive_is_rejected() {
    let dir = TempDir::new().unwrap();
    let ctx = initialize_with(config(BackendChoice::Flat), dir.path()).unwrap();
    let meta = projects::create_project(&ctx.manager, "Short", "").unwrap();
    let archive = ctx.archiver().create(&meta.id).unwrap();

    let truncated = &archive.bytes[..archive.bytes.len() / 2];
    assert!(ctx
        .archiver()
        .import(truncated, ImportOptions::default())
        .is_err());
}
