//! `vectors.meta.json` sidecar: the authoritative description of an index.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::types::IndexVariant;
use super::{VectorStoreError, VectorStoreResult};
use crate::types::Fragment;

pub const MANIFEST_VERSION: u32 = 1;

/// Metadata written next to the index blob.
///
/// `fragments[n]` describes vector id `n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    pub version: u32,
    pub variant: IndexVariant,
    pub dimension: usize,
    pub count: usize,
    /// Identity of the embedding model that produced the vectors.
    pub model: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub fragments: Vec<Fragment>,
}

impl StoreManifest {
    pub fn save(&self, path: &Path) -> VectorStoreResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }

    /// Read and self-check the sidecar.
    ///
    /// A missing file is [`VectorStoreError::MissingArtifact`]; unparsable
    /// content or a fragment count that disagrees with `count` is an
    /// integrity failure.
    pub fn load(path: &Path) -> VectorStoreResult<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VectorStoreError::MissingArtifact {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let manifest: Self = serde_json::from_slice(&bytes)
            .map_err(|e| VectorStoreError::integrity(path, format!("unreadable sidecar: {e}")))?;

        if manifest.version != MANIFEST_VERSION {
            return Err(VectorStoreError::integrity(
                path,
                format!("unsupported sidecar version {}", manifest.version),
            ));
        }
        if manifest.fragments.len() != manifest.count {
            return Err(VectorStoreError::integrity(
                path,
                format!(
                    "sidecar declares {} entries but lists {} fragments",
                    manifest.count,
                    manifest.fragments.len()
                ),
            ));
        }
        Ok(manifest)
    }
}

/// Replace `path` with `bytes` via a same-directory temp file and rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> VectorStoreResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| VectorStoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(count: usize, fragments: usize) -> StoreManifest {
        StoreManifest {
            version: MANIFEST_VERSION,
            variant: IndexVariant::Flat,
            dimension: 3,
            count,
            model: Some("test-model".to_string()),
            created_at: 1,
            updated_at: 2,
            fragments: (0..fragments)
                .map(|i| Fragment::whole_file(&format!("f{i}.txt"), "x"))
                .collect(),
        }
    }

    #[test]
    fn test_manifest_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectors.meta.json");
        manifest(2, 2).save(&path).unwrap();

        let loaded = StoreManifest::load(&path).unwrap();
        assert_eq!(loaded.count, 2);
        assert_eq!(loaded.variant, IndexVariant::Flat);
        assert_eq!(loaded.model.as_deref(), Some("test-model"));
        assert_eq!(loaded.fragments[1].path, "f1.txt");

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"variant\": \"flat\""));
    }

    #[test]
    fn test_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let err = StoreManifest::load(&temp_dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, VectorStoreError::MissingArtifact { .. }));
        assert!(err.is_first_run());
    }

    #[test]
    fn test_count_disagreement_is_integrity_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectors.meta.json");
        manifest(3, 2).save(&path).unwrap();
        let err = StoreManifest::load(&path).unwrap_err();
        assert!(err.needs_rebuild());
    }

    #[test]
    fn test_garbage_manifest_is_integrity_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vectors.meta.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            StoreManifest::load(&path),
            Err(VectorStoreError::Integrity { .. })
        ));
    }
}
