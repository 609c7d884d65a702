//! Dynamic validation of trainable artifacts.
//!
//! Artifacts are handed one at a time to a [`TrainerService`], in filtered
//! order. With early stop enabled an item stops at its first passing
//! artifact. Items are validated in-process or fanned out over worker
//! processes (see [`worker`]); a per-item [`ItemLock`] keeps two workers off
//! the same item.

mod http;
mod lock;
pub mod worker;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::checkpoint::{CheckpointKind, ItemCheckpoints};
use crate::error::{RepairError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::program::FilteredCandidate;

pub use http::HttpTrainerService;
pub use lock::ItemLock;

/// Lock file guarding an item's validation.
pub const LOCK_FILE: &str = "validate.lock";
/// Item subdirectory holding built artifacts.
pub const ARTIFACT_DIR: &str = "artifacts";
/// Item subdirectory the trainer writes its per-artifact output to.
pub const VALIDATION_DIR: &str = "validation";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    /// Seconds.
    pub time_cost: f64,
}

/// One validated artifact, in validation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Artifact directory name.
    pub artifact: String,
    pub passed: bool,
    pub time_cost: f64,
}

#[async_trait]
pub trait TrainerService: Send {
    async fn start(&mut self) -> Result<()>;

    /// Train and check the artifact in `model_dir`, writing trainer output
    /// to `out_dir`.
    async fn valid(&mut self, model_dir: &Path, out_dir: &Path) -> Result<ValidationResult>;

    async fn stop(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    /// Indices into the validated programs that passed.
    pub plausible: Vec<usize>,
    pub records: Vec<ValidationRecord>,
}

impl ValidationOutcome {
    pub fn plausible_programs<'p>(&self, programs: &'p [String]) -> Vec<&'p str> {
        self.plausible
            .iter()
            .map(|&i| programs[i].as_str())
            .collect()
    }
}

fn artifact_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Validate `artifacts[i]` (built from `programs[i]`) in order.
pub async fn validate_candidates(
    programs: &[String],
    artifacts: &[PathBuf],
    trainer: &mut dyn TrainerService,
    out_root: &Path,
    early_stop: bool,
) -> Result<ValidationOutcome> {
    if programs.len() != artifacts.len() {
        return Err(RepairError::ContractViolation(format!(
            "{} programs for {} artifacts",
            programs.len(),
            artifacts.len()
        )));
    }
    let mut outcome = ValidationOutcome::default();
    for (index, artifact) in artifacts.iter().enumerate() {
        let name = artifact_name(artifact);
        let out_dir = out_root.join(&name);
        tokio::fs::create_dir_all(&out_dir).await?;
        let result = trainer.valid(artifact, &out_dir).await?;
        METRICS.inc_validation(result.passed);
        outcome.records.push(ValidationRecord {
            artifact: name,
            passed: result.passed,
            time_cost: result.time_cost,
        });
        if result.passed {
            outcome.plausible.push(index);
            if early_stop {
                break;
            }
        }
    }
    Ok(outcome)
}

/// Validate one item from its filtered and artifact checkpoints, writing
/// the validation trace and then the plausible marker.
///
/// Returns `false` when the item was skipped: already validated, inputs
/// missing, or locked by another worker.
pub async fn validate_item(
    item: &str,
    checkpoints: &ItemCheckpoints,
    trainer: &mut dyn TrainerService,
    early_stop: bool,
) -> Result<bool> {
    let plausible_file = CheckpointKind::Plausible.file_name();
    if checkpoints.exists(CheckpointKind::Plausible) {
        obs::emit_stage_skipped("validate", item, plausible_file);
        return Ok(false);
    }
    for input in [CheckpointKind::Filtered, CheckpointKind::Artifacts] {
        if !checkpoints.exists(input) {
            obs::emit_stage_missing_input("validate", item, input.file_name());
            return Ok(false);
        }
    }
    let Some(_lock) = ItemLock::try_acquire(checkpoints.dir().join(LOCK_FILE))? else {
        info!(event = "validate.locked", item = %item, "item locked by another worker");
        return Ok(false);
    };
    // another worker may have finished while we were acquiring
    if checkpoints.exists(CheckpointKind::Plausible) {
        return Ok(false);
    }

    obs::emit_stage_started("validate", item);
    let filtered: Vec<FilteredCandidate> = checkpoints.read(CheckpointKind::Filtered)?;
    let artifacts: Vec<Option<String>> = checkpoints.read(CheckpointKind::Artifacts)?;
    let artifact_root = checkpoints.dir().join(ARTIFACT_DIR);
    let (built, dirs): (Vec<&FilteredCandidate>, Vec<PathBuf>) = filtered
        .iter()
        .zip(&artifacts)
        .filter_map(|(candidate, artifact)| {
            artifact
                .as_ref()
                .map(|name| (candidate, artifact_root.join(name)))
        })
        .unzip();
    let programs: Vec<String> = built.iter().map(|c| c.program.clone()).collect();

    let started = std::time::Instant::now();
    let outcome = validate_candidates(
        &programs,
        &dirs,
        trainer,
        &checkpoints.dir().join(VALIDATION_DIR),
        early_stop,
    )
    .await?;
    for record in &outcome.records {
        obs::emit_validation(item, &record.artifact, record.passed, record.time_cost);
    }
    let plausible: Vec<FilteredCandidate> = outcome
        .plausible
        .iter()
        .map(|&i| built[i].clone())
        .collect();

    checkpoints.write(CheckpointKind::Validation, &outcome.records)?;
    checkpoints.write(CheckpointKind::Plausible, &plausible)?;
    obs::emit_stage_finished(
        "validate",
        item,
        plausible.len(),
        started.elapsed().as_secs_f64(),
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedTrainer;

    fn dirs(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/artifacts").join(n)).collect()
    }

    fn programs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("x = {i}\n")).collect()
    }

    #[tokio::test]
    async fn test_early_stop_at_first_pass() {
        let out = tempfile::tempdir().unwrap();
        let mut trainer = ScriptedTrainer::new(vec![false, true, true]);
        let outcome = validate_candidates(
            &programs(3),
            &dirs(&["b.py.0", "b.py.1", "b.py.2"]),
            &mut trainer,
            out.path(),
            true,
        )
        .await
        .unwrap();
        assert_eq!(outcome.plausible, vec![1]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[1].artifact, "b.py.1");
        assert_eq!(trainer.calls().len(), 2);
        assert_eq!(trainer.calls()[0].1, out.path().join("b.py.0"));
    }

    #[tokio::test]
    async fn test_without_early_stop_everything_runs() {
        let out = tempfile::tempdir().unwrap();
        let mut trainer = ScriptedTrainer::new(vec![true, false, true]);
        let progs = programs(3);
        let outcome = validate_candidates(
            &progs,
            &dirs(&["b.py.0", "b.py.2", "b.py.5"]),
            &mut trainer,
            out.path(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.plausible, vec![0, 2]);
        assert_eq!(outcome.plausible_programs(&progs), vec!["x = 0\n", "x = 2\n"]);
        assert_eq!(outcome.records.len(), 3);
    }

    #[tokio::test]
    async fn test_length_mismatch() {
        let out = tempfile::tempdir().unwrap();
        let mut trainer = ScriptedTrainer::new(vec![]);
        let err = validate_candidates(&programs(2), &dirs(&["a"]), &mut trainer, out.path(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, RepairError::ContractViolation(_)));
    }

    fn seed_item(dir: &Path) -> ItemCheckpoints {
        let cp = ItemCheckpoints::new(dir);
        let filtered = vec![
            FilteredCandidate {
                candidate_index: 0,
                program: "a\n".to_string(),
            },
            FilteredCandidate {
                candidate_index: 4,
                program: "b\n".to_string(),
            },
            FilteredCandidate {
                candidate_index: 6,
                program: "c\n".to_string(),
            },
        ];
        cp.write(CheckpointKind::Filtered, &filtered).unwrap();
        let artifacts = vec![Some("bug.py.0".to_string()), None, Some("bug.py.2".to_string())];
        cp.write(CheckpointKind::Artifacts, &artifacts).unwrap();
        cp
    }

    #[tokio::test]
    async fn test_validate_item_skips_unbuilt_and_writes_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let cp = seed_item(dir.path());
        let mut trainer = ScriptedTrainer::new(vec![false, true]);
        assert!(validate_item("bug.py", &cp, &mut trainer, true).await.unwrap());

        let records: Vec<ValidationRecord> = cp.read(CheckpointKind::Validation).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.artifact.as_str()).collect();
        assert_eq!(names, vec!["bug.py.0", "bug.py.2"]);
        let plausible: Vec<FilteredCandidate> = cp.read(CheckpointKind::Plausible).unwrap();
        assert_eq!(plausible.len(), 1);
        assert_eq!(plausible[0].candidate_index, 6);
        assert!(!dir.path().join(LOCK_FILE).exists());

        // second run is a no-op
        let mut idle = ScriptedTrainer::new(vec![]);
        assert!(!validate_item("bug.py", &cp, &mut idle, true).await.unwrap());
        assert!(idle.calls().is_empty());
    }

    #[tokio::test]
    async fn test_validate_item_respects_lock() {
        let dir = tempfile::tempdir().unwrap();
        let cp = seed_item(dir.path());
        let _held = ItemLock::try_acquire(dir.path().join(LOCK_FILE))
            .unwrap()
            .unwrap();
        let mut trainer = ScriptedTrainer::new(vec![true]);
        assert!(!validate_item("bug.py", &cp, &mut trainer, true).await.unwrap());
        assert!(trainer.calls().is_empty());
        assert!(!cp.exists(CheckpointKind::Plausible));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_validate_item_after_crashed_worker() {
        let dir = tempfile::tempdir().unwrap();
        let cp = seed_item(dir.path());
        let dead = super::lock::tests::dead_pid();
        std::fs::write(dir.path().join(LOCK_FILE), format!("{dead}\n")).unwrap();

        let mut trainer = ScriptedTrainer::new(vec![true]);
        assert!(validate_item("bug.py", &cp, &mut trainer, true).await.unwrap());
        assert_eq!(trainer.calls().len(), 1);
        assert!(cp.exists(CheckpointKind::Plausible));
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_validate_item_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let cp = ItemCheckpoints::new(dir.path());
        let mut trainer = ScriptedTrainer::new(vec![]);
        assert!(!validate_item("bug.py", &cp, &mut trainer, true).await.unwrap());
    }
}
