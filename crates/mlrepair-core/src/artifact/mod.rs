//! Artifact building: filtered programs in, trainable artifact directories
//! out.
//!
//! Each program is rewritten into runnable source, handed to a
//! [`Materializer`] under a fresh uuid name, checked for the expected files
//! and moved into place as `<out_dir>/<item>.<index>`. A failure for one
//! program yields `None` at its position and never aborts the item.

mod imports;
mod materializer;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::checkpoint::write_json_atomic;
use crate::error::{RepairError, Result};
use crate::metrics::METRICS;

pub use imports::{import_plan, trainable_source, ImportPlan};
pub use materializer::{CommandMaterializer, Materializer};

pub const MODEL_FILE: &str = "__MODEL__.h5";
pub const COMPILE_HYPERPARAMS_FILE: &str = "__COMPILE_HYP__.pkl";
pub const FIT_HYPERPARAMS_FILE: &str = "__FIT_HYP__.pkl";
pub const STANDALONE_MODEL_FILE: &str = "__SF_MODEL__.py";
pub const TRAINABLE_SOURCE_FILE: &str = "__TRAINABLE_MODEL__.py";
pub const MANIFEST_FILE: &str = "artifact.json";

/// Files the materializer must produce.
pub const MATERIALIZED_FILES: [&str; 4] = [
    MODEL_FILE,
    COMPILE_HYPERPARAMS_FILE,
    FIT_HYPERPARAMS_FILE,
    STANDALONE_MODEL_FILE,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub item: String,
    pub candidate: usize,
    /// Hex sha256 of [`TRAINABLE_SOURCE_FILE`].
    pub source_sha256: String,
    pub created_at: DateTime<Utc>,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `rename`, falling back to copy and delete across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

pub struct ArtifactBuilder<'a> {
    materializer: &'a dyn Materializer,
    work_dir: PathBuf,
}

impl<'a> ArtifactBuilder<'a> {
    pub fn new(materializer: &'a dyn Materializer, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            materializer,
            work_dir: work_dir.into(),
        }
    }

    /// Build one artifact per program. Entries are directory names relative
    /// to `out_dir`, or `None` where the build failed.
    pub async fn build_all(
        &self,
        item: &str,
        programs: &[String],
        out_dir: &Path,
    ) -> Result<Vec<Option<String>>> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::create_dir_all(out_dir).await?;
        let mut built = Vec::with_capacity(programs.len());
        for (index, program) in programs.iter().enumerate() {
            match self.build_one(item, index, program, out_dir).await {
                Ok(name) => {
                    METRICS.inc_artifact_built();
                    built.push(Some(name));
                }
                Err(err) => {
                    METRICS.inc_artifact_failed();
                    crate::obs::emit_stage_error("build", item, &format!("candidate {index}: {err}"));
                    built.push(None);
                }
            }
        }
        Ok(built)
    }

    async fn build_one(
        &self,
        item: &str,
        index: usize,
        program: &str,
        out_dir: &Path,
    ) -> Result<String> {
        let name = format!("{}.py", Uuid::new_v4());
        let source_path = self.work_dir.join(&name);
        let staging = out_dir.join(&name);

        let result = self
            .materialize_into(item, index, program, &source_path, &staging, out_dir)
            .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&source_path).await;
            let _ = tokio::fs::remove_dir_all(&staging).await;
        }
        result
    }

    async fn materialize_into(
        &self,
        item: &str,
        index: usize,
        program: &str,
        source_path: &Path,
        staging: &Path,
        out_dir: &Path,
    ) -> Result<String> {
        let source = trainable_source(program)?;
        tokio::fs::write(source_path, &source).await?;
        self.materializer
            .materialize(source_path, &self.work_dir, out_dir)
            .await?;

        for file in MATERIALIZED_FILES {
            if !staging.join(file).is_file() {
                return Err(RepairError::Materialize(format!(
                    "{} is missing {file}",
                    staging.display()
                )));
            }
        }

        move_file(source_path, &staging.join(TRAINABLE_SOURCE_FILE)).await?;
        let manifest = ArtifactManifest {
            item: item.to_string(),
            candidate: index,
            source_sha256: sha256_hex(source.as_bytes()),
            created_at: Utc::now(),
        };
        write_json_atomic(&staging.join(MANIFEST_FILE), &manifest)?;

        let target_name = format!("{item}.{index}");
        let target = out_dir.join(&target_name);
        if target.exists() {
            tokio::fs::remove_dir_all(&target).await?;
        }
        tokio::fs::rename(staging, &target).await?;
        Ok(target_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeMaterializer;

    const PROGRAM: &str = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=10))
";

    #[tokio::test]
    async fn test_build_all_records_failures_in_place() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        // the second program fails to materialize
        let materializer = FakeMaterializer::failing_when(|source| source.contains("units=3"));
        let builder = ArtifactBuilder::new(&materializer, work.path());
        let programs = vec![
            PROGRAM.to_string(),
            PROGRAM.replace("units=10", "units=3"),
            "x = (".to_string(),
            PROGRAM.replace("units=10", "units=7"),
        ];
        let built = builder.build_all("bug.py", &programs, out.path()).await.unwrap();
        assert_eq!(
            built,
            vec![Some("bug.py.0".to_string()), None, None, Some("bug.py.3".to_string())]
        );

        let dir = out.path().join("bug.py.3");
        for file in MATERIALIZED_FILES {
            assert!(dir.join(file).is_file());
        }
        let source = std::fs::read_to_string(dir.join(TRAINABLE_SOURCE_FILE)).unwrap();
        assert!(source.contains("keras.layers.Dense(units=7)"));
        let manifest: ArtifactManifest =
            serde_json::from_slice(&std::fs::read(dir.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest.candidate, 3);
        assert_eq!(manifest.source_sha256, sha256_hex(source.as_bytes()));

        // no staging directories or temp sources are left behind
        let leftovers: Vec<_> = std::fs::read_dir(out.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".py"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_existing_target_is_replaced() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let stale = out.path().join("bug.py.0");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("stale.txt"), "old").unwrap();

        let materializer = FakeMaterializer::default();
        let builder = ArtifactBuilder::new(&materializer, work.path());
        let built = builder
            .build_all("bug.py", &[PROGRAM.to_string()], out.path())
            .await
            .unwrap();
        assert_eq!(built, vec![Some("bug.py.0".to_string())]);
        assert!(!stale.join("stale.txt").exists());
        assert!(stale.join(MODEL_FILE).is_file());
    }

    #[tokio::test]
    async fn test_missing_artifact_file_fails_build() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let materializer = FakeMaterializer::without(FIT_HYPERPARAMS_FILE);
        let builder = ArtifactBuilder::new(&materializer, work.path());
        let built = builder
            .build_all("bug.py", &[PROGRAM.to_string()], out.path())
            .await
            .unwrap();
        assert_eq!(built, vec![None]);
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
