//! On-disk snapshot of the vector index and its fragment records.
//!
//! Two co-located files:
//! - `index.bin`: bincode-encoded dimension, count and flat `f32` vectors
//! - `fragments.json`: JSON array of `{text, source}` records
//!
//! Both are replaced atomically (temp file, fsync, rename), fragments first.
//! A crash between the two renames leaves one file longer than the other;
//! loading truncates to the common prefix, which is consistent because the
//! store only ever appends.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{Fragment, StoreError};

pub const INDEX_FILE: &str = "index.bin";
pub const FRAGMENTS_FILE: &str = "fragments.json";

#[derive(Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    count: usize,
    vectors: Vec<f32>,
}

/// Contents recovered from disk, already reconciled to equal length.
#[derive(Debug)]
pub struct LoadedSnapshot {
    pub dimension: usize,
    pub vectors: Vec<f32>,
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    dir: PathBuf,
}

impl Snapshot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn fragments_path(&self) -> PathBuf {
        self.dir.join(FRAGMENTS_FILE)
    }

    /// Load the snapshot. `Ok(None)` when neither file exists.
    pub fn load(&self) -> Result<Option<LoadedSnapshot>, StoreError> {
        let index_path = self.index_path();
        let fragments_path = self.fragments_path();
        if !index_path.is_file() && !fragments_path.is_file() {
            return Ok(None);
        }

        let index = if index_path.is_file() {
            let bytes = fs::read(&index_path)
                .map_err(|e| StoreError::Load(format!("{}: {}", index_path.display(), e)))?;
            let (index, _): (IndexFile, usize) =
                bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                    .map_err(|e| StoreError::Corrupt(format!("{}: {}", index_path.display(), e)))?;
            if index.dimension == 0 || index.vectors.len() != index.count * index.dimension {
                return Err(StoreError::Corrupt(format!(
                    "{}: {} values for {} vectors of dimension {}",
                    index_path.display(),
                    index.vectors.len(),
                    index.count,
                    index.dimension
                )));
            }
            Some(index)
        } else {
            None
        };

        let mut fragments: Vec<Fragment> = if fragments_path.is_file() {
            let content = fs::read_to_string(&fragments_path)
                .map_err(|e| StoreError::Load(format!("{}: {}", fragments_path.display(), e)))?;
            serde_json::from_str(&content)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", fragments_path.display(), e)))?
        } else {
            Vec::new()
        };

        let Some(mut index) = index else {
            tracing::warn!(
                "Index file missing next to {} fragments, starting empty",
                fragments.len()
            );
            return Ok(None);
        };

        let count = index.count.min(fragments.len());
        if count != index.count || count != fragments.len() {
            tracing::warn!(
                "Snapshot in {} is torn ({} vectors, {} fragments), keeping first {}",
                self.dir.display(),
                index.count,
                fragments.len(),
                count
            );
            index.vectors.truncate(count * index.dimension);
            fragments.truncate(count);
        }

        Ok(Some(LoadedSnapshot {
            dimension: index.dimension,
            vectors: index.vectors,
            fragments,
        }))
    }

    /// Replace both files with the given state.
    pub fn write(
        &self,
        dimension: usize,
        vectors: &[f32],
        fragments: &[Fragment],
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| persistence(&self.dir, e))?;

        let fragments_json = serde_json::to_vec_pretty(fragments)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        let index = IndexFile {
            dimension,
            count: fragments.len(),
            vectors: vectors.to_vec(),
        };
        let index_bytes = bincode::serde::encode_to_vec(&index, bincode::config::standard())
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        write_atomic(&self.fragments_path(), &fragments_json)?;
        write_atomic(&self.index_path(), &index_bytes)?;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).map_err(|e| persistence(&tmp, e))?;
    file.write_all(bytes).map_err(|e| persistence(&tmp, e))?;
    file.sync_all().map_err(|e| persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| persistence(path, e))?;
    Ok(())
}

fn persistence(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Persistence(format!("{}: {}", path.display(), e))
}
