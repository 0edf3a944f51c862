//! Model artifact discovery
//!
//! A model directory holds one weights manifest per network. Each manifest
//! is a JSON array of weight groups; every group names the shard files that
//! hold its tensors:
//!
//! ```json
//! [{ "paths": ["face_expression_model-shard1"],
//!    "weights": [{ "name": "conv0/filters", "shape": [3, 3, 3, 32], "dtype": "float32" }] }]
//! ```

use super::model::ModelError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Manifest of the tiny face detector
pub const TINY_FACE_DETECTOR_MANIFEST: &str = "tiny_face_detector_model-weights_manifest.json";

/// Manifest of the face expression net
pub const FACE_EXPRESSION_MANIFEST: &str = "face_expression_model-weights_manifest.json";

/// A single tensor entry of a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

/// A group of tensors stored across the listed shard files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightGroup {
    pub paths: Vec<String>,
    pub weights: Vec<WeightSpec>,
}

/// A parsed weights manifest
#[derive(Debug, Clone)]
pub struct WeightsManifest {
    pub path: PathBuf,
    pub groups: Vec<WeightGroup>,
}

impl WeightsManifest {
    pub fn tensor_count(&self) -> usize {
        self.groups.iter().map(|g| g.weights.len()).sum()
    }

    /// Shard files referenced by the manifest, resolved against its directory
    pub fn shard_paths(&self) -> Vec<PathBuf> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        self.groups
            .iter()
            .flat_map(|g| g.paths.iter().map(|p| dir.join(p)))
            .collect()
    }
}

/// The set of networks a model needs, rooted at one directory
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    dir: PathBuf,
    manifests: Vec<String>,
}

impl ModelArtifacts {
    pub fn new(dir: impl Into<PathBuf>, manifests: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            manifests,
        }
    }

    /// Face detector plus expression net, the pair the panel requires
    pub fn face_expression(dir: impl Into<PathBuf>) -> Self {
        Self::new(
            dir,
            vec![
                TINY_FACE_DETECTOR_MANIFEST.to_string(),
                FACE_EXPRESSION_MANIFEST.to_string(),
            ],
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_paths(&self) -> Vec<PathBuf> {
        self.manifests.iter().map(|m| self.dir.join(m)).collect()
    }

    /// Parse every manifest and make sure all shards exist
    pub async fn verify(&self) -> Result<Vec<WeightsManifest>, ModelError> {
        let mut loaded = Vec::with_capacity(self.manifests.len());

        for path in self.manifest_paths() {
            let manifest = read_manifest(&path).await?;

            for shard in manifest.shard_paths() {
                if !tokio::fs::try_exists(&shard).await? {
                    return Err(ModelError::MissingArtifact(shard));
                }
            }

            tracing::debug!(
                "Verified {:?}: {} tensors in {} shards",
                path,
                manifest.tensor_count(),
                manifest.shard_paths().len()
            );
            loaded.push(manifest);
        }

        Ok(loaded)
    }
}

async fn read_manifest(path: &Path) -> Result<WeightsManifest, ModelError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ModelError::MissingArtifact(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let groups: Vec<WeightGroup> =
        serde_json::from_str(&content).map_err(|e| ModelError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if groups.is_empty() || groups.iter().all(|g| g.paths.is_empty()) {
        return Err(ModelError::InvalidManifest {
            path: path.to_path_buf(),
            reason: "manifest lists no weight shards".to_string(),
        });
    }

    Ok(WeightsManifest {
        path: path.to_path_buf(),
        groups,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// Write a one-shard manifest for each required network
    pub(crate) fn write_face_expression_models(dir: &Path) {
        for (manifest, shard) in [
            (TINY_FACE_DETECTOR_MANIFEST, "tiny_face_detector_model-shard1"),
            (FACE_EXPRESSION_MANIFEST, "face_expression_model-shard1"),
        ] {
            let body = format!(
                r#"[{{"paths":["{shard}"],"weights":[{{"name":"conv0/filters","shape":[3,3,3,16],"dtype":"float32"}}]}}]"#
            );
            fs::write(dir.join(manifest), body).unwrap();
            fs::write(dir.join(shard), [0u8; 16]).unwrap();
        }
    }

    #[tokio::test]
    async fn test_verify_complete_model_dir() {
        let dir = tempdir().unwrap();
        write_face_expression_models(dir.path());

        let manifests = ModelArtifacts::face_expression(dir.path())
            .verify()
            .await
            .unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].tensor_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let dir = tempdir().unwrap();

        let err = ModelArtifacts::face_expression(dir.path())
            .verify()
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingArtifact(p) if p.ends_with(TINY_FACE_DETECTOR_MANIFEST)));
    }

    #[tokio::test]
    async fn test_missing_shard() {
        let dir = tempdir().unwrap();
        write_face_expression_models(dir.path());
        fs::remove_file(dir.path().join("face_expression_model-shard1")).unwrap();

        let err = ModelArtifacts::face_expression(dir.path())
            .verify()
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingArtifact(p) if p.ends_with("face_expression_model-shard1")));
    }

    #[tokio::test]
    async fn test_malformed_and_empty_manifests() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("empty.json"), "[]").unwrap();

        let broken = ModelArtifacts::new(dir.path(), vec!["broken.json".into()]);
        assert!(matches!(
            broken.verify().await,
            Err(ModelError::InvalidManifest { .. })
        ));

        let empty = ModelArtifacts::new(dir.path(), vec!["empty.json".into()]);
        assert!(matches!(
            empty.verify().await,
            Err(ModelError::InvalidManifest { .. })
        ));
    }
}
