use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::engine::registry::{Collection, Collections};
use crate::Result;

/// Handles disk I/O for the [`MemRegistry`](crate::engine::MemRegistry).
///
/// Persistence uses an atomic "write-then-rename" strategy to ensure data
/// integrity. Each model is stored in its own `.json` file.
pub struct Persistence {
    data_dir: PathBuf,
}

impl Persistence {
    /// Initializes a new `Persistence` handler in the specified directory.
    ///
    /// If the directory does not exist, it will be created.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { data_dir: dir })
    }

    /// Writes a single model's collection to a JSON file atomically.
    ///
    /// This method writes to a temporary file first and then renames it to
    /// the final destination, preventing file corruption during power
    /// failures.
    pub fn save_model(&self, model: &str, collection: &Collection) -> Result<()> {
        let file_path = self.data_dir.join(format!("{}.json", model));
        let temp_path = self.data_dir.join(format!("{}.json.tmp", model));

        let bytes = serde_json::to_vec_pretty(collection)?;

        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &file_path)?;

        Ok(())
    }

    /// Loads every model collection found in the data directory.
    pub fn load_all(&self) -> Result<Collections> {
        let mut all_data = Collections::new();

        if !self.data_dir.exists() {
            return Ok(all_data);
        }

        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();

            // Model names contain dots ("hr.employee"), so strip the suffix
            // instead of taking the file stem.
            let Some(model) = path
                .file_name()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_suffix(".json"))
                .map(|s| s.to_string())
            else {
                continue;
            };

            let content = match fs::read(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Could not read model file {:?}: {}", path, e);
                    continue;
                }
            };

            let collection: Collection = match serde_json::from_slice(&content) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Could not unmarshal model data from {:?}: {}", path, e);
                    continue;
                }
            };

            all_data.insert(model, collection);
        }

        Ok(all_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_collection() -> Collection {
        let mut collection = Collection::default();
        let mut record = json!({"id": 1, "name": "Ann"}).as_object().cloned().unwrap();
        record.insert("active".to_string(), json!(true));
        collection.records.insert(1, record);
        collection.next_id = 2;
        collection
    }

    #[test]
    fn test_save_and_load_all() {
        let dir = tempdir().unwrap();
        let persistence = Persistence::new(dir.path()).unwrap();

        persistence
            .save_model("hr.employee", &sample_collection())
            .unwrap();

        let loaded = persistence.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        let collection = loaded.get("hr.employee").unwrap();
        assert_eq!(collection.next_id, 2);
        assert_eq!(
            collection.records.get(&1).unwrap().get("name").unwrap(),
            &json!("Ann")
        );
    }

    #[test]
    fn test_dotted_model_names_round_trip() {
        let dir = tempdir().unwrap();
        let persistence = Persistence::new(dir.path()).unwrap();

        persistence
            .save_model("project.task.type", &sample_collection())
            .unwrap();

        let loaded = persistence.load_all().unwrap();
        assert!(loaded.contains_key("project.task.type"));
    }

    #[test]
    fn test_atomic_rename_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let persistence = Persistence::new(dir.path()).unwrap();

        persistence
            .save_model("crm.lead", &sample_collection())
            .unwrap();

        assert!(dir.path().join("crm.lead.json").exists());
        assert!(!dir.path().join("crm.lead.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), b"{not json").unwrap();

        let persistence = Persistence::new(dir.path()).unwrap();
        let loaded = persistence.load_all().unwrap();
        assert!(loaded.is_empty());
    }
}
