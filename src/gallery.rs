//! Persistent store of enrolled face embeddings, backed by a single JSON file written
//! atomically (write to a temp file, then rename) so a crash mid-save can't corrupt it.

use crate::config::Config;
use crate::embedder::cosine_similarity;
use crate::error::{FaceAuthError, Result};
use crate::types::{Embedding, GalleryEntry};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize)]
struct GalleryFile {
    items: Vec<serde_json::Value>,
}

pub struct Gallery {
    path: PathBuf,
    entries: Vec<GalleryEntry>,
    duplicate_threshold: f32,
}

impl Gallery {
    pub fn load(config: &Config) -> Result<Self> {
        let path = config.gallery.path.clone();
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let file: GalleryFile = serde_json::from_str(&contents)?;
            Self::parse_entries(file.items)
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            entries,
            duplicate_threshold: config.gallery.duplicate_threshold,
        })
    }

    /// Deserializes each item independently, skipping (and warning about) any that don't parse
    /// as a `GalleryEntry` or whose embedding length disagrees with the rest of the gallery,
    /// rather than letting one bad row take down the whole gallery load.
    fn parse_entries(items: Vec<serde_json::Value>) -> Vec<GalleryEntry> {
        let mut entries: Vec<GalleryEntry> = Vec::with_capacity(items.len());
        let mut expected_dim: Option<usize> = None;

        for (idx, item) in items.into_iter().enumerate() {
            let entry: GalleryEntry = match serde_json::from_value(item) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(index = idx, error = %e, "skipping malformed gallery entry");
                    continue;
                }
            };

            match expected_dim {
                Some(dim) if dim != entry.embedding.len() => {
                    tracing::warn!(
                        id = entry.id,
                        name = %entry.name,
                        expected = dim,
                        got = entry.embedding.len(),
                        "skipping gallery entry with mismatched embedding dimension"
                    );
                    continue;
                }
                None => expected_dim = Some(entry.embedding.len()),
                _ => {}
            }

            if entries.iter().any(|e: &GalleryEntry| e.id == entry.id) {
                tracing::warn!(id = entry.id, "skipping gallery entry with duplicate id");
                continue;
            }

            entries.push(entry);
        }

        entries
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_by_id(&self, id: u64) -> Option<&GalleryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&GalleryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Searches the gallery for an entry whose embedding is closer than `duplicate_threshold` to
    /// `embedding`, returning the best such match (id, name, similarity) if any.
    pub fn find_duplicate(&self, embedding: &Embedding) -> Option<(u64, String, f32)> {
        let mut best: Option<(u64, String, f32)> = None;
        for entry in &self.entries {
            let sim = cosine_similarity(embedding, &entry.embedding);
            if sim >= self.duplicate_threshold {
                if best.as_ref().map_or(true, |(_, _, s)| sim > *s) {
                    best = Some((entry.id, entry.name.clone(), sim));
                }
            }
        }
        best
    }

    /// Appends a new entry, assigning the next monotonic id (`max(existing ids) + 1`, or `1` for
    /// an empty gallery), and persists immediately.
    pub fn insert(&mut self, name: String, embedding: Embedding) -> Result<u64> {
        let id = self.entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        self.entries.push(GalleryEntry {
            id,
            name,
            embedding,
            extra: Default::default(),
        });
        self.save()?;
        Ok(id)
    }

    pub fn remove(&mut self, id: u64) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    fn save(&self) -> Result<()> {
        let items = self
            .entries
            .iter()
            .map(|e| serde_json::to_value(e))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let json = serde_json::to_string_pretty(&GalleryFile { items })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            FaceAuthError::Gallery(format!("failed to atomically replace gallery file: {e}"))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_free_helpers::temp_gallery_config;

    mod tempfile_free_helpers {
        use super::Config;
        use std::path::PathBuf;

        pub fn temp_gallery_config(name: &str) -> Config {
            let mut cfg = Config::default();
            let mut path = std::env::temp_dir();
            path.push(format!("doorlock_gallery_test_{}_{}.json", name, std::process::id()));
            cfg.gallery.path = PathBuf::from(path);
            cfg
        }
    }

    #[test]
    fn insert_assigns_monotonic_ids_and_persists() {
        let cfg = temp_gallery_config("insert");
        let _ = std::fs::remove_file(&cfg.gallery.path);
        let mut gallery = Gallery::load(&cfg).unwrap();

        let id1 = gallery.insert("alice".into(), vec![1.0, 0.0]).unwrap();
        let id2 = gallery.insert("bob".into(), vec![0.0, 1.0]).unwrap();
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);

        let reloaded = Gallery::load(&cfg).unwrap();
        assert_eq!(reloaded.len(), 2);

        let _ = std::fs::remove_file(&cfg.gallery.path);
    }

    #[test]
    fn find_duplicate_respects_threshold() {
        let mut cfg = temp_gallery_config("dup");
        cfg.gallery.duplicate_threshold = 0.85;
        let _ = std::fs::remove_file(&cfg.gallery.path);
        let mut gallery = Gallery::load(&cfg).unwrap();
        gallery.insert("alice".into(), vec![1.0, 0.0]).unwrap();

        assert!(gallery.find_duplicate(&vec![1.0, 0.0]).is_some());
        assert!(gallery.find_duplicate(&vec![0.0, 1.0]).is_none());

        let _ = std::fs::remove_file(&cfg.gallery.path);
    }

    #[test]
    fn json_on_disk_is_items_object_not_bare_array() {
        let cfg = temp_gallery_config("format");
        let _ = std::fs::remove_file(&cfg.gallery.path);
        let mut gallery = Gallery::load(&cfg).unwrap();
        gallery.insert("alice".into(), vec![1.0, 0.0]).unwrap();

        let raw = std::fs::read_to_string(&cfg.gallery.path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("items").is_some());
        assert!(value["items"].is_array());

        let _ = std::fs::remove_file(&cfg.gallery.path);
    }

    #[test]
    fn load_skips_malformed_and_mismatched_entries() {
        let cfg = temp_gallery_config("malformed");
        let _ = std::fs::remove_file(&cfg.gallery.path);

        let raw = serde_json::json!({
            "items": [
                {"id": 1, "name": "alice", "embedding": [1.0, 0.0]},
                {"id": 2, "name": "bob", "embedding": [1.0, 0.0, 0.0]},
                {"not": "an entry"},
                {"id": 1, "name": "dup", "embedding": [0.0, 1.0]},
            ]
        });
        std::fs::write(&cfg.gallery.path, serde_json::to_string(&raw).unwrap()).unwrap();

        let gallery = Gallery::load(&cfg).unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.find_by_id(1).unwrap().name, "alice");

        let _ = std::fs::remove_file(&cfg.gallery.path);
    }
}
