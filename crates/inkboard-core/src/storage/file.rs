//! Local draft copies of boards, stored as JSON files.

use super::{BoardDocument, BoardStore, BoxFuture, StorageError, StorageResult};
use crate::config::ClientConfig;
use crate::marks::Mark;
use crate::transfer::marks_from_value;
use std::fs;
use std::path::{Path, PathBuf};

/// File-backed draft store.
///
/// Each board is kept as `<dir>/<encoded id>.json`. Used as the fallback
/// copy when the remote store cannot be reached.
pub struct DraftStore {
    base_path: PathBuf,
}

impl DraftStore {
    /// Create a draft store in `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create draft directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Default location: `<data dir>/inkboard/drafts`.
    pub fn default_location() -> StorageResult<Self> {
        Self::new(default_draft_dir()?)
    }

    /// Draft store configured by `config`, or `None` when drafts are disabled.
    pub fn from_config(config: &ClientConfig) -> StorageResult<Option<Self>> {
        if !config.drafts_enabled {
            return Ok(None);
        }
        let dir = match &config.draft_dir {
            Some(dir) => dir.clone(),
            None => default_draft_dir()?,
        };
        Self::new(dir).map(Some)
    }

    fn draft_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", encode_id(id)))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Remove a board's draft, if any.
    pub fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.draft_path(id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
            })?;
        }
        Ok(())
    }

    /// Ids of boards with a draft on disk.
    pub fn list(&self) -> StorageResult<Vec<String>> {
        let entries = fs::read_dir(&self.base_path)
            .map_err(|e| StorageError::Io(format!("Failed to read directory: {}", e)))?;
        let ids = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).and_then(decode_id))
            .collect();
        Ok(ids)
    }
}

/// File stem for a board id. ASCII letters, digits and `-` are kept; every
/// other byte becomes `_XX` (uppercase hex), so distinct ids never share a file.
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("_{byte:02X}"));
        }
    }
    out
}

/// Inverse of [`encode_id`]. `None` for stems this store did not write.
fn decode_id(stem: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(stem.len());
    let mut rest = stem.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'_' {
            let hex = tail.get(..2)?;
            let hex = std::str::from_utf8(hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else if first.is_ascii_alphanumeric() || first == b'-' {
            bytes.push(first);
            rest = tail;
        } else {
            return None;
        }
    }
    String::from_utf8(bytes).ok()
}

/// Platform data directory for drafts.
pub(crate) fn default_draft_dir() -> StorageResult<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;
    Ok(base.join("inkboard").join("drafts"))
}

impl BoardStore for DraftStore {
    fn fetch(&self, board_id: &str) -> BoxFuture<'_, StorageResult<BoardDocument>> {
        let path = self.draft_path(board_id);
        let board_id = board_id.to_string();
        Box::pin(async move {
            if !path.exists() {
                return Err(StorageError::NotFound(board_id));
            }
            let json = fs::read_to_string(&path).map_err(|e| {
                StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let value: serde_json::Value = serde_json::from_str(&json).map_err(|e| {
                StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            let content = marks_from_value(value.get("content").cloned().unwrap_or_default());
            Ok(BoardDocument::new(board_id, content))
        })
    }

    fn save(&self, board_id: &str, content: &[Mark]) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.draft_path(board_id);
        let json = serde_json::to_string(&BoardDocument::new(board_id, content.to_vec()))
            .map_err(|e| StorageError::Serialization(e.to_string()));
        Box::pin(async move {
            let json = json?;
            fs::write(&path, json).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::Tool;
    use crate::storage::block_on;
    use kurbo::Point;
    use tempfile::tempdir;

    fn pen() -> Mark {
        let mut mark = Mark::new(Tool::Pen, Point::new(1.0, 1.0), "#000000", 5.0, 1.0);
        mark.extend(Point::new(2.0, 3.0));
        mark
    }

    #[test]
    fn test_draft_save_fetch() {
        let dir = tempdir().unwrap();
        let store = DraftStore::new(dir.path()).unwrap();
        let marks = vec![pen(), pen()];

        block_on(store.save("board-1", &marks)).unwrap();
        let doc = block_on(store.fetch("board-1")).unwrap();

        assert_eq!(doc.id, "board-1");
        assert_eq!(doc.content, marks);
    }

    #[test]
    fn test_draft_not_found() {
        let dir = tempdir().unwrap();
        let store = DraftStore::new(dir.path()).unwrap();
        let result = block_on(store.fetch("nonexistent"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_draft_list_and_delete() {
        let dir = tempdir().unwrap();
        let store = DraftStore::new(dir.path()).unwrap();
        block_on(store.save("a", &[])).unwrap();
        block_on(store.save("b", &[])).unwrap();

        let mut ids = store.list().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        store.delete("a").unwrap();
        assert_eq!(store.list().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_draft_encodes_id() {
        let dir = tempdir().unwrap();
        let store = DraftStore::new(dir.path()).unwrap();
        block_on(store.save("team/board:1", &[pen()])).unwrap();
        assert_eq!(block_on(store.fetch("team/board:1")).unwrap().content.len(), 1);
        assert!(dir.path().join("team_2Fboard_3A1.json").exists());
    }

    #[test]
    fn test_similar_ids_do_not_collide() {
        let dir = tempdir().unwrap();
        let store = DraftStore::new(dir.path()).unwrap();
        block_on(store.save("team/board:1", &[pen()])).unwrap();
        block_on(store.save("team_board_1", &[pen(), pen()])).unwrap();

        assert_eq!(block_on(store.fetch("team/board:1")).unwrap().content.len(), 1);
        assert_eq!(block_on(store.fetch("team_board_1")).unwrap().content.len(), 2);

        let mut ids = store.list().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["team/board:1".to_string(), "team_board_1".to_string()]);
    }

    #[test]
    fn test_id_encoding_is_reversible() {
        for id in ["plain-id", "a_b", "ünï/cödé", "", "_5F", "x y.z"] {
            assert_eq!(decode_id(&encode_id(id)).as_deref(), Some(id));
        }
        assert_eq!(decode_id("bad_Z1"), None);
        assert_eq!(decode_id("trailing_4"), None);
        assert_eq!(decode_id("has.dot"), None);
    }

    #[test]
    fn test_list_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let store = DraftStore::new(dir.path()).unwrap();
        block_on(store.save("b1", &[])).unwrap();
        fs::write(dir.path().join("notes.v2.json"), "{}").unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();
        assert_eq!(store.list().unwrap(), vec!["b1".to_string()]);
    }

    #[test]
    fn test_from_config_disabled() {
        let config = ClientConfig {
            drafts_enabled: false,
            ..ClientConfig::default()
        };
        assert!(DraftStore::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_from_config_uses_draft_dir() {
        let dir = tempdir().unwrap();
        let config = ClientConfig {
            draft_dir: Some(dir.path().join("drafts")),
            ..ClientConfig::default()
        };
        let store = DraftStore::from_config(&config).unwrap().unwrap();
        assert_eq!(store.base_path(), dir.path().join("drafts").as_path());
        block_on(store.save("b1", &[pen()])).unwrap();
        assert!(dir.path().join("drafts").join("b1.json").exists());
    }

    #[test]
    fn test_draft_skips_corrupt_marks() {
        let dir = tempdir().unwrap();
        let store = DraftStore::new(dir.path()).unwrap();
        let good = serde_json::to_value(pen()).unwrap();
        let json = serde_json::json!({"id": "b", "content": [good, {"id": 1}]});
        fs::write(dir.path().join("b.json"), json.to_string()).unwrap();
        assert_eq!(block_on(store.fetch("b")).unwrap().content.len(), 1);
    }

    #[test]
    fn test_creates_nested_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("x").join("y");
        let store = DraftStore::new(&nested).unwrap();
        assert_eq!(store.base_path(), nested.as_path());
        assert!(nested.exists());
    }
}
