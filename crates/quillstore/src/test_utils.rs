//! Fixtures shared by unit tests (and by downstream crates with the
//! `test_utils` feature).

use crate::migrate::default_registry;
use crate::model::{Chapter, Character, ProjectTree, Scene};
use crate::projects;
use crate::store::mem_backend::MemBackend;
use crate::store::StorageManager;
use std::sync::Arc;

pub struct TestEnv {
    /// Same backend the manager writes to, for fault injection.
    pub backend: Arc<MemBackend>,
    pub manager: Arc<StorageManager>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let backend = Arc::new(MemBackend::new());
        let manager = StorageManager::init(Box::new(Arc::clone(&backend)), default_registry());
        Self {
            backend,
            manager: Arc::new(manager),
        }
    }

    /// A stored project with `chapters` chapters of `scenes_per_chapter`
    /// scenes each, word counts consistent. Returns the loaded tree.
    pub fn seed_project(&self, name: &str, chapters: usize, scenes_per_chapter: usize) -> ProjectTree {
        let meta = projects::create_project(&self.manager, name, "")
            .expect("failed to create fixture project");
        let mut tree = ProjectTree::new(meta);
        for c in 0..chapters {
            let mut chapter = Chapter::new(format!("ch-{}", c + 1), format!("Chapter {}", c + 1), c as u32);
            for s in 0..scenes_per_chapter {
                chapter.scenes.push(Scene::new(
                    format!("sc-{}-{}", c + 1, s + 1),
                    format!("Scene {}", s + 1),
                    "the quick brown fox".to_string(),
                ));
            }
            tree.chapters.push(chapter);
        }
        tree.characters
            .push(Character::new("char-1".to_string(), "Protagonist".to_string()));
        tree.recompute_word_counts();
        projects::save_tree(&self.manager, &tree).expect("failed to save fixture project");
        tree
    }
}
