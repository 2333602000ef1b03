//! On-disk artifacts for the vector index and metadata store.
//!
//! The index is a flat binary file:
//!
//! ```text
//! "SIFTVEC1" | dimension: u32 LE | count: u64 LE | count*dimension f32 LE | sha256
//! ```
//!
//! The metadata store is a SQLite database holding one row per entry plus a
//! small `store_info` table recording the dimension and entry count, which
//! are cross-checked against the index on load.
//!
//! Both artifacts are written to sibling `.tmp` files and renamed into place,
//! index first. A crash between the two renames is the only way to end up
//! with artifacts that disagree.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use sha2::{Digest, Sha256};
use sift_core::{Metadata, SiftError, StoreConfig, VectorId};

use crate::metadata::{MetadataEntry, MetadataStore};
use crate::vector::{FlatIndex, VectorIndex};

const INDEX_MAGIC: &[u8; 8] = b"SIFTVEC1";
const HEADER_LEN: usize = 8 + 4 + 8;
const CHECKSUM_LEN: usize = 32;

/// Locations of the two artifacts that make up a persisted store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Vector index artifact.
    pub index: PathBuf,
    /// Metadata artifact.
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn new(index: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            metadata: metadata.into(),
        }
    }

    /// Artifacts resolved against `root` (absolute config paths are kept).
    pub fn from_config(config: &StoreConfig, root: &Path) -> Self {
        Self::new(root.join(&config.index_path), root.join(&config.metadata_path))
    }
}

/// Write both artifacts, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`SiftError::Io`] or [`SiftError::Database`] if either artifact
/// cannot be written. Existing artifacts are left in place on failure.
pub fn save(
    paths: &ArtifactPaths,
    index: &FlatIndex,
    metadata: &MetadataStore,
) -> Result<(), SiftError> {
    create_parent(&paths.index)?;
    create_parent(&paths.metadata)?;

    let index_tmp = temp_path(&paths.index);
    let metadata_tmp = temp_path(&paths.metadata);

    std::fs::write(&index_tmp, encode_index(index))?;
    if let Err(e) = write_metadata(&metadata_tmp, index.dimension(), metadata) {
        let _ = std::fs::remove_file(&index_tmp);
        let _ = std::fs::remove_file(&metadata_tmp);
        return Err(e);
    }

    std::fs::rename(&index_tmp, &paths.index)?;
    std::fs::rename(&metadata_tmp, &paths.metadata)?;

    tracing::info!(
        vectors = index.len(),
        index = %paths.index.display(),
        metadata = %paths.metadata.display(),
        "saved vector store"
    );
    Ok(())
}

/// Read both artifacts.
///
/// Returns `Ok(None)` when neither artifact exists.
///
/// # Errors
///
/// Returns [`SiftError::CorruptState`] if only one artifact exists, if
/// either cannot be decoded, or if they disagree on dimension or
/// identifiers. The error names the offending artifact.
pub fn load(paths: &ArtifactPaths) -> Result<Option<(FlatIndex, MetadataStore)>, SiftError> {
    match (paths.index.exists(), paths.metadata.exists()) {
        (false, false) => return Ok(None),
        (true, false) => {
            return Err(SiftError::corrupt(
                &paths.metadata,
                "metadata artifact is missing but the index artifact exists",
            ))
        }
        (false, true) => {
            return Err(SiftError::corrupt(
                &paths.index,
                "index artifact is missing but the metadata artifact exists",
            ))
        }
        (true, true) => {}
    }

    let bytes = std::fs::read(&paths.index)
        .map_err(|e| SiftError::corrupt(&paths.index, format!("unreadable: {e}")))?;
    let index = decode_index(&bytes).map_err(|msg| SiftError::corrupt(&paths.index, msg))?;
    let (dimension, metadata) = read_metadata(&paths.metadata)?;

    if dimension != index.dimension() {
        return Err(SiftError::corrupt(
            &paths.metadata,
            format!(
                "recorded dimension {dimension:?} does not match index dimension {:?}",
                index.dimension()
            ),
        ));
    }
    check_identifiers(&paths.metadata, &index, &metadata)?;

    tracing::info!(
        vectors = index.len(),
        index = %paths.index.display(),
        "loaded vector store"
    );
    Ok(Some((index, metadata)))
}

fn check_identifiers(
    artifact: &Path,
    index: &FlatIndex,
    metadata: &MetadataStore,
) -> Result<(), SiftError> {
    let n = index.len();
    if metadata.len() != n {
        return Err(SiftError::corrupt(
            artifact,
            format!("{} metadata entries for {n} vectors", metadata.len()),
        ));
    }
    // Ids are unique, so `n` ids all below `n` means exactly 0..n.
    if let Some((id, _)) = metadata.iter().find(|(id, _)| *id >= n as VectorId) {
        return Err(SiftError::corrupt(
            artifact,
            format!("identifier {id} has no vector (index holds {n})"),
        ));
    }
    Ok(())
}

fn create_parent(path: &Path) -> Result<(), SiftError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn encode_index(index: &FlatIndex) -> Vec<u8> {
    let data = index.as_slice();
    let dimension = index.dimension().unwrap_or(0) as u32;
    let count = index.len() as u64;

    let mut bytes = Vec::with_capacity(HEADER_LEN + data.len() * 4 + CHECKSUM_LEN);
    bytes.extend_from_slice(INDEX_MAGIC);
    bytes.extend_from_slice(&dimension.to_le_bytes());
    bytes.extend_from_slice(&count.to_le_bytes());
    for f in data {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    let checksum = Sha256::digest(&bytes);
    bytes.extend_from_slice(&checksum);
    bytes
}

fn decode_index(bytes: &[u8]) -> Result<FlatIndex, String> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(format!("truncated: {} bytes", bytes.len()));
    }
    if &bytes[..8] != INDEX_MAGIC {
        return Err("not a sift index (bad magic)".into());
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(payload).as_slice() != checksum {
        return Err("checksum mismatch".into());
    }

    let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes);

    let expected = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(dimension))
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| format!("implausible size: {count} vectors of dimension {dimension}"))?;
    let body = &payload[HEADER_LEN..];
    if body.len() != expected {
        return Err(format!(
            "expected {expected} bytes of vector data, found {}",
            body.len()
        ));
    }

    if dimension == 0 {
        if count != 0 {
            return Err(format!("{count} vectors recorded with dimension 0"));
        }
        return Ok(FlatIndex::new());
    }
    let data = bytes_to_floats(body);
    FlatIndex::from_raw(dimension, data).map_err(|e| e.to_string())
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    let mut floats = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        floats.push(f32::from_le_bytes(arr));
    }
    floats
}

fn write_metadata(
    path: &Path,
    dimension: Option<usize>,
    metadata: &MetadataStore,
) -> Result<(), SiftError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let mut conn = Connection::open(path)
        .map_err(|e| SiftError::Database(format!("failed to create metadata database: {e}")))?;

    conn.execute_batch(
        "
        CREATE TABLE store_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE entries (
            id INTEGER PRIMARY KEY,
            chunk_text TEXT NOT NULL,
            metadata TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| SiftError::Database(format!("failed to create schema: {e}")))?;

    let tx = conn
        .transaction()
        .map_err(|e| SiftError::Database(format!("failed to begin transaction: {e}")))?;
    {
        let mut info = tx
            .prepare("INSERT INTO store_info (key, value) VALUES (?1, ?2)")
            .map_err(|e| SiftError::Database(format!("failed to prepare insert: {e}")))?;
        let dimension = dimension.map(|d| d.to_string()).unwrap_or_default();
        for (key, value) in [
            ("dimension", dimension),
            ("entry_count", metadata.len().to_string()),
        ] {
            info.execute(params![key, value])
                .map_err(|e| SiftError::Database(format!("failed to write '{key}': {e}")))?;
        }

        let mut insert = tx
            .prepare("INSERT INTO entries (id, chunk_text, metadata) VALUES (?1, ?2, ?3)")
            .map_err(|e| SiftError::Database(format!("failed to prepare insert: {e}")))?;
        for (id, entry) in metadata.iter() {
            let row_id = i64::try_from(id)
                .map_err(|_| SiftError::Database(format!("identifier {id} out of range")))?;
            let json = serde_json::to_string(&entry.metadata)?;
            insert
                .execute(params![row_id, entry.chunk_text, json])
                .map_err(|e| SiftError::Database(format!("failed to insert entry {id}: {e}")))?;
        }
    }
    tx.commit()
        .map_err(|e| SiftError::Database(format!("failed to commit metadata: {e}")))?;
    Ok(())
}

fn read_metadata(path: &Path) -> Result<(Option<usize>, MetadataStore), SiftError> {
    let corrupt = |msg: String| SiftError::corrupt(path, msg);

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| corrupt(format!("cannot open: {e}")))?;

    let info = |key: &str| -> Result<String, SiftError> {
        conn.query_row(
            "SELECT value FROM store_info WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .map_err(|e| corrupt(format!("cannot read '{key}': {e}")))
    };

    let dimension_text = info("dimension")?;
    let dimension = if dimension_text.is_empty() {
        None
    } else {
        Some(
            dimension_text
                .parse::<usize>()
                .map_err(|_| corrupt(format!("invalid dimension '{dimension_text}'")))?,
        )
    };
    let count_text = info("entry_count")?;
    let entry_count: usize = count_text
        .parse()
        .map_err(|_| corrupt(format!("invalid entry count '{count_text}'")))?;

    let mut stmt = conn
        .prepare("SELECT id, chunk_text, metadata FROM entries ORDER BY id")
        .map_err(|e| corrupt(format!("cannot query entries: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(|e| corrupt(format!("cannot query entries: {e}")))?;

    let mut entries = Vec::with_capacity(entry_count);
    for row in rows {
        let (id, chunk_text, json) = row.map_err(|e| corrupt(format!("bad row: {e}")))?;
        let id = VectorId::try_from(id).map_err(|_| corrupt(format!("negative identifier {id}")))?;
        let metadata: Metadata = serde_json::from_str(&json)
            .map_err(|e| corrupt(format!("bad metadata for identifier {id}: {e}")))?;
        entries.push((
            id,
            MetadataEntry {
                chunk_text,
                metadata,
            },
        ));
    }

    if entries.len() != entry_count {
        return Err(corrupt(format!(
            "recorded {entry_count} entries but found {}",
            entries.len()
        )));
    }
    Ok((dimension, entries.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (FlatIndex, MetadataStore) {
        let mut index = FlatIndex::new();
        index
            .add(&[vec![0.0, 1.0], vec![1.0, 0.5], vec![-2.5, 3.25]])
            .unwrap();
        let mut metadata = MetadataStore::new();
        for i in 0..3u64 {
            let mut m = Metadata::new();
            m.insert("chunk_index".into(), json!(i));
            m.insert("file_origin".into(), json!("doc.md"));
            metadata.put(i, format!("chunk {i}"), m).unwrap();
        }
        (index, metadata)
    }

    fn paths_in(dir: &Path) -> ArtifactPaths {
        ArtifactPaths::new(dir.join("store/index.idx"), dir.join("store/meta.db"))
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let (index, metadata) = sample();

        save(&paths, &index, &metadata).unwrap();
        let (loaded_index, loaded_metadata) = load(&paths).unwrap().unwrap();

        assert_eq!(loaded_index, index);
        assert_eq!(loaded_metadata, metadata);
        assert!(!temp_path(&paths.index).exists());
        assert!(!temp_path(&paths.metadata).exists());
    }

    #[test]
    fn empty_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        save(&paths, &FlatIndex::new(), &MetadataStore::new()).unwrap();
        let (index, metadata) = load(&paths).unwrap().unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
        assert!(metadata.is_empty());
    }

    #[test]
    fn missing_artifacts_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&paths_in(dir.path())).unwrap().is_none());
    }

    #[test]
    fn single_artifact_is_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let (index, metadata) = sample();
        save(&paths, &index, &metadata).unwrap();
        std::fs::remove_file(&paths.metadata).unwrap();

        match load(&paths) {
            Err(SiftError::CorruptState { artifact, .. }) => assert_eq!(artifact, paths.metadata),
            other => panic!("expected CorruptState, got {other:?}"),
        }
    }

    #[test]
    fn tampered_index_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let (index, metadata) = sample();
        save(&paths, &index, &metadata).unwrap();

        let mut bytes = std::fs::read(&paths.index).unwrap();
        bytes[HEADER_LEN] ^= 0xFF;
        std::fs::write(&paths.index, bytes).unwrap();

        let err = load(&paths).unwrap_err();
        assert!(matches!(
            &err,
            SiftError::CorruptState { artifact, .. } if *artifact == paths.index
        ));
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn garbage_metadata_is_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let (index, metadata) = sample();
        save(&paths, &index, &metadata).unwrap();
        std::fs::write(&paths.metadata, b"definitely not sqlite, just some bytes").unwrap();

        let err = load(&paths).unwrap_err();
        assert!(matches!(
            &err,
            SiftError::CorruptState { artifact, .. } if *artifact == paths.metadata
        ));
    }

    #[test]
    fn mismatched_artifacts_are_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let (index, metadata) = sample();
        save(&paths, &index, &metadata).unwrap();

        // Overwrite the index with a larger one, keeping the old metadata.
        let mut bigger = index.clone();
        bigger.add(&[vec![9.0, 9.0]]).unwrap();
        std::fs::write(&paths.index, encode_index(&bigger)).unwrap();

        let err = load(&paths).unwrap_err().to_string();
        assert!(err.contains("3 metadata entries for 4 vectors"), "{err}");
    }

    #[test]
    fn decode_rejects_bad_magic_and_truncation() {
        assert!(decode_index(b"short").unwrap_err().contains("truncated"));
        let mut bytes = encode_index(&sample().0);
        bytes[0] = b'X';
        assert!(decode_index(&bytes).unwrap_err().contains("magic"));
    }

    #[test]
    fn floats_survive_encoding() {
        let (index, _) = sample();
        let decoded = decode_index(&encode_index(&index)).unwrap();
        assert_eq!(decoded.vector(2), Some(&[-2.5, 3.25][..]));
    }
}
