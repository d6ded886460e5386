//! Pluggable persistence for per-peer watermarks.
//!
//! The pipeline persists exactly one integer per channel-like peer: the
//! newest contiguously-confirmed server id. [`CursorStore`] abstracts over
//! where that lives so callers can swap in an SQLite store, a binary file,
//! an in-memory store, or anything else.
//!
//! Two built-in stores are provided:
//! * [`BinaryFileStore`] — compact binary file (default for the demo app).
//! * [`InMemoryStore`] — ephemeral, for tests and always-fresh sessions.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::types::PeerId;

// ─── Trait ────────────────────────────────────────────────────────────────────

/// Account-scoped key/value storage for cursor watermarks.
pub trait CursorStore: Send + Sync {
    /// The persisted watermark for `peer`, or `None` if the peer is new.
    fn load(&self, peer: &PeerId) -> io::Result<Option<i64>>;

    /// Persist the watermark for `peer`. Called on every cursor advance.
    fn store(&self, peer: &PeerId, watermark: i64) -> io::Result<()>;

    /// Human-readable name of this store (for log messages).
    fn name(&self) -> &str;
}

// ─── Peer encoding ────────────────────────────────────────────────────────────

fn peer_tag(peer: &PeerId) -> u8 {
    match peer {
        PeerId::User(_)    => 0,
        PeerId::Group(_)   => 1,
        PeerId::Channel(_) => 2,
        PeerId::Secret(_)  => 3,
    }
}

fn peer_from_tag(tag: u8, id: i64) -> Option<PeerId> {
    match tag {
        0 => Some(PeerId::User(id)),
        1 => Some(PeerId::Group(id)),
        2 => Some(PeerId::Channel(id)),
        3 => Some(PeerId::Secret(id)),
        _ => None,
    }
}

// ─── InMemoryStore ────────────────────────────────────────────────────────────

/// An ephemeral store that keeps watermarks only for the process lifetime.
#[derive(Default)]
pub struct InMemoryStore {
    map: Mutex<HashMap<PeerId, i64>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl CursorStore for InMemoryStore {
    fn load(&self, peer: &PeerId) -> io::Result<Option<i64>> {
        Ok(self.map.lock().unwrap().get(peer).copied())
    }

    fn store(&self, peer: &PeerId, watermark: i64) -> io::Result<()> {
        self.map.lock().unwrap().insert(*peer, watermark);
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}

// ─── BinaryFileStore ──────────────────────────────────────────────────────────

const MAGIC:   &[u8; 4] = b"CCUR";
const VERSION: u8       = 1;

/// Watermark store backed by a compact binary file.
///
/// Layout: `"CCUR"` magic, version byte, u32 entry count, then per entry a
/// peer tag byte, the peer id (i64 LE) and the watermark (i64 LE). The whole
/// file is rewritten on every advance — the map is tiny.
pub struct BinaryFileStore {
    path:  PathBuf,
    cache: Mutex<Option<HashMap<PeerId, i64>>>,
}

impl BinaryFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cache: Mutex::new(None) }
    }

    fn read_file(&self) -> io::Result<HashMap<PeerId, i64>> {
        let mut map = HashMap::new();
        if !self.path.exists() {
            return Ok(map);
        }
        let mut f = std::fs::File::open(&self.path)?;
        let mut header = [0u8; 9];
        f.read_exact(&mut header)?;
        if &header[..4] != MAGIC || header[4] != VERSION {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad cursor file header"));
        }
        let count = u32::from_le_bytes(header[5..9].try_into().unwrap());
        for _ in 0..count {
            let mut rec = [0u8; 17];
            f.read_exact(&mut rec)?;
            let id        = i64::from_le_bytes(rec[1..9].try_into().unwrap());
            let watermark = i64::from_le_bytes(rec[9..17].try_into().unwrap());
            if let Some(peer) = peer_from_tag(rec[0], id) {
                map.insert(peer, watermark);
            }
        }
        Ok(map)
    }

    fn write_file(&self, map: &HashMap<PeerId, i64>) -> io::Result<()> {
        let mut buf = Vec::with_capacity(9 + map.len() * 17);
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&(map.len() as u32).to_le_bytes());
        for (peer, watermark) in map {
            buf.push(peer_tag(peer));
            buf.extend_from_slice(&peer.raw_id().to_le_bytes());
            buf.extend_from_slice(&watermark.to_le_bytes());
        }
        let mut f = std::fs::File::create(&self.path)?;
        f.write_all(&buf)
    }

    fn with_cache<T>(
        &self,
        op: impl FnOnce(&mut HashMap<PeerId, i64>) -> io::Result<T>,
    ) -> io::Result<T> {
        let mut guard = self.cache.lock().unwrap();
        if guard.is_none() {
            *guard = Some(self.read_file()?);
        }
        op(guard.as_mut().unwrap())
    }
}

impl CursorStore for BinaryFileStore {
    fn load(&self, peer: &PeerId) -> io::Result<Option<i64>> {
        self.with_cache(|map| Ok(map.get(peer).copied()))
    }

    fn store(&self, peer: &PeerId, watermark: i64) -> io::Result<()> {
        let peer = *peer;
        self.with_cache(|map| {
            map.insert(peer, watermark);
            self.write_file(map)
        })
    }

    fn name(&self) -> &str { "binary-file" }
}

// ─── SqliteStore ──────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite-store")]
pub use sqlite_store::SqliteStore;

#[cfg(feature = "sqlite-store")]
mod sqlite_store {
    use super::*;
    use rusqlite::{Connection, params};

    /// SQLite-backed watermark store.
    ///
    /// Enable with the `sqlite-store` Cargo feature:
    /// ```toml
    /// [dependencies]
    /// courier-pipeline = { version = "*", features = ["sqlite-store"] }
    /// ```
    pub struct SqliteStore {
        path: PathBuf,
    }

    impl SqliteStore {
        pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
            let path = path.into();
            // Open and initialise the schema immediately so errors surface early.
            let conn = Connection::open(&path)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS cursors (
                    peer_tag  INTEGER NOT NULL,
                    peer_id   INTEGER NOT NULL,
                    watermark INTEGER NOT NULL,
                    PRIMARY KEY (peer_tag, peer_id)
                );",
            ).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            Ok(Self { path })
        }
    }

    impl CursorStore for SqliteStore {
        fn load(&self, peer: &PeerId) -> io::Result<Option<i64>> {
            let conn = Connection::open(&self.path)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let result = conn.query_row(
                "SELECT watermark FROM cursors WHERE peer_tag = ?1 AND peer_id = ?2",
                params![peer_tag(peer), peer.raw_id()],
                |row| row.get::<_, i64>(0),
            );
            match result {
                Ok(v)                                   => Ok(Some(v)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
            }
        }

        fn store(&self, peer: &PeerId, watermark: i64) -> io::Result<()> {
            let conn = Connection::open(&self.path)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            conn.execute(
                "INSERT OR REPLACE INTO cursors (peer_tag, peer_id, watermark)
                 VALUES (?1, ?2, ?3)",
                params![peer_tag(peer), peer.raw_id(), watermark],
            ).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            Ok(())
        }

        fn name(&self) -> &str { "sqlite" }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_roundtrip() {
        let store = InMemoryStore::new();
        let peer  = PeerId::Channel(77);
        assert_eq!(store.load(&peer).unwrap(), None);
        store.store(&peer, 41).unwrap();
        assert_eq!(store.load(&peer).unwrap(), Some(41));
    }

    #[test]
    fn binary_file_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "courier-cursors-{}.bin",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let store = BinaryFileStore::new(&path);
        store.store(&PeerId::Channel(5), 120).unwrap();
        store.store(&PeerId::Channel(9), 7).unwrap();

        // A fresh store instance must read the same values back from disk.
        let reopened = BinaryFileStore::new(&path);
        assert_eq!(reopened.load(&PeerId::Channel(5)).unwrap(), Some(120));
        assert_eq!(reopened.load(&PeerId::Channel(9)).unwrap(), Some(7));
        assert_eq!(reopened.load(&PeerId::Channel(1)).unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn binary_file_missing_is_empty() {
        let store = BinaryFileStore::new("/nonexistent-dir-courier/cursors.bin");
        assert_eq!(store.load(&PeerId::Channel(1)).unwrap(), None);
    }
}
