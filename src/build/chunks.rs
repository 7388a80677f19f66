// src/build/chunks.rs

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::{FileSystem, relative_str, walk_files};

/// Compute the blake3 hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Derive a chunk name from a path relative to the output directory.
///
/// The first matching suffix is stripped, so with `[".bundle.js", ".js"]`
/// `admin/index.client.bundle.js` becomes `admin/index.client`. Files that
/// match none of the suffixes (source maps, copied assets) are not chunks.
pub fn chunk_name(rel_path: &str, suffixes: &[String]) -> Option<String> {
    suffixes.iter().find_map(|suffix| {
        rel_path
            .strip_suffix(suffix.as_str())
            .filter(|stem| !stem.is_empty())
            .map(str::to_string)
    })
}

/// Hash every chunk currently in `output_dir`, keyed by chunk name.
pub fn scan_chunks(
    fs: &dyn FileSystem,
    output_dir: &Path,
    suffixes: &[String],
) -> Result<BTreeMap<String, String>> {
    let mut chunks = BTreeMap::new();

    for path in walk_files(fs, output_dir)? {
        let Some(rel) = relative_str(output_dir, &path) else {
            continue;
        };
        let Some(name) = chunk_name(&rel, suffixes) else {
            continue;
        };
        let hash = compute_file_hash(fs, &path)?;
        debug!(chunk = %name, hash = %hash, "hashed chunk");
        chunks.insert(name, hash);
    }

    Ok(chunks)
}

/// Last-seen content hash per chunk name for one pipeline.
///
/// Lives as long as the pipeline watcher; it is never reset between
/// rebuilds, so the first compile reports every chunk as changed and later
/// compiles only report real content changes.
#[derive(Debug, Default)]
pub struct ChunkVersionTable {
    hashes: HashMap<String, String>,
}

impl ChunkVersionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn hash_of(&self, chunk: &str) -> Option<&str> {
        self.hashes.get(chunk).map(String::as_str)
    }

    /// Record the hashes of a fresh compile and return the names (sorted)
    /// whose hash is new or different.
    ///
    /// Chunks that disappeared from the output are forgotten but not
    /// reported: removing a chunk cannot change what a running worker has
    /// already loaded.
    pub fn record(&mut self, current: BTreeMap<String, String>) -> Vec<String> {
        let changed: Vec<String> = current
            .iter()
            .filter(|(name, hash)| self.hashes.get(*name) != Some(*hash))
            .map(|(name, _)| name.clone())
            .collect();

        self.hashes = current.into_iter().collect();
        changed
    }
}
