use super::format::parse_cursor;
use crate::error::PersistenceError;
use crate::feed::types::Cursor;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Durable position of one route. Single writer: the route's dispatcher.
pub trait CursorStore: Send + Sync {
    fn load(&self) -> Result<Cursor, PersistenceError>;

    /// Replace the stored cursor atomically.
    fn save(&mut self, cursor: &Cursor) -> Result<(), PersistenceError>;
}

/// Key for a (source list, destination channel) pair, safe as a file name.
pub fn route_key(list_id: &str, channel_id: &str) -> String {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    };
    format!("{}-{}", clean(list_id), clean(channel_id))
}

/// Seed an empty store from the last message already posted to the
/// route's channel, so a lost cursor file does not re-post old items.
/// Returns the cursor written, if any.
pub fn seed_from_message(
    store: &mut dyn CursorStore,
    last_message: Option<&str>,
) -> Result<Option<Cursor>, PersistenceError> {
    if !store.load()?.is_empty() {
        return Ok(None);
    }
    let Some(cursor) = last_message.and_then(parse_cursor) else {
        return Ok(None);
    };
    store.save(&cursor)?;
    Ok(Some(cursor))
}

/// One JSON file per route under a state directory.
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn open(dir: &Path, key: &str) -> Result<Self, PersistenceError> {
        fs::create_dir_all(dir).map_err(|source| PersistenceError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            path: dir.join(format!("{}.json", key)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> Result<Cursor, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Cursor::default()),
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&content).map_err(|source| PersistenceError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Write to a sibling temp file, sync, then rename over the old one, so
    /// a crash leaves either the old or the new cursor on disk.
    fn save(&mut self, cursor: &Cursor) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(cursor).map_err(|source| PersistenceError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
        file.write_all(&json).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }
}

/// In-process store. Clones share state, so a test can keep a handle while
/// the dispatcher owns another.
#[derive(Clone, Default)]
pub struct MemoryCursorStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    cursor: Cursor,
    writes: usize,
    fail_writes: bool,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: Cursor) -> Self {
        let store = Self::default();
        if let Ok(mut s) = store.inner.lock() {
            s.cursor = cursor;
        }
        store
    }

    pub fn current(&self) -> Cursor {
        self.inner.lock().map(|s| s.cursor.clone()).unwrap_or_default()
    }

    pub fn writes(&self) -> usize {
        self.inner.lock().map(|s| s.writes).unwrap_or_default()
    }

    /// Make every following `save` fail, simulating an unavailable store.
    pub fn fail_writes(&self, fail: bool) {
        if let Ok(mut s) = self.inner.lock() {
            s.fail_writes = fail;
        }
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Result<Cursor, PersistenceError> {
        Ok(self.current())
    }

    fn save(&mut self, cursor: &Cursor) -> Result<(), PersistenceError> {
        let mut s = self.inner.lock().map_err(|_| PersistenceError::Io {
            path: "memory".to_string(),
            source: std::io::Error::other("cursor lock poisoned"),
        })?;
        if s.fail_writes {
            return Err(PersistenceError::Io {
                path: "memory".to_string(),
                source: std::io::Error::other("store unavailable"),
            });
        }
        s.cursor = cursor.clone();
        s.writes += 1;
        Ok(())
    }
}
