// Templates Module - Named display snapshots persisted as one JSON file
use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::types::BoardError;

pub struct TemplateStore {
    path: PathBuf,
    templates: BTreeMap<String, Vec<String>>,
}

impl TemplateStore {
    /// Load every template from `path`. A missing or unreadable file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let templates = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(templates) => templates,
                Err(e) => {
                    warn!("Ignoring malformed template file {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        info!("Loaded {} templates from {}", templates.len(), path.display());
        TemplateStore { path, templates }
    }

    /// Insert or overwrite `name`, then rewrite the whole file
    pub fn save(&mut self, name: &str, lines: Vec<String>) -> Result<(), BoardError> {
        self.templates.insert(name.to_string(), lines);
        let contents = serde_json::to_string_pretty(&self.templates)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, contents)?;
        info!("Saved template '{}' to {}", name, self.path.display());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.templates.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::load(dir.path().join("none.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(TemplateStore::load(&path).is_empty());
    }

    #[test]
    fn test_save_then_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("led_templates.json");

        let mut grid = Grid::new();
        grid.restore(&["Vorlauf A", "", "Start 14:30", "Bahn 1  Ruderclub Kiel"]);

        let mut store = TemplateStore::load(&path);
        store.save("X", grid.snapshot()).unwrap();

        let reloaded = TemplateStore::load(&path);
        assert_eq!(reloaded.get("X").map(<[String]>::to_vec), Some(grid.snapshot()));
        assert!(reloaded.get("Y").is_none());
    }

    #[test]
    fn test_save_overwrites_and_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.json");
        let mut store = TemplateStore::load(&path);
        store.save("a", vec!["one".into()]).unwrap();
        store.save("b", vec!["two".into()]).unwrap();
        store.save("a", vec!["three".into()]).unwrap();

        let reloaded = TemplateStore::load(&path);
        assert_eq!(reloaded.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(reloaded.get("a").unwrap(), &["three".to_string()]);
    }
}
