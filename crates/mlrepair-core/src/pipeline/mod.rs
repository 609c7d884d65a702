//! Pipeline orchestration.
//!
//! A run walks the requested [`Op`]s in execution order. Every per-item
//! stage follows the same shape: skip when its output checkpoint exists,
//! skip with a warning when its input checkpoint is missing, otherwise
//! compute and write the cost file followed by the output file. Re-running
//! a finished run therefore rewrites nothing.

mod ops;
pub mod stats;
pub mod summary;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::{ArtifactBuilder, Materializer};
use crate::checkpoint::{CheckpointKind, ItemCheckpoints};
use crate::config::{RepairConfig, SnippetMode};
use crate::error::{RepairError, Result};
use crate::filter::filter_candidates;
use crate::generator::generate_candidates;
use crate::infill::InfillService;
use crate::mask::{default_actions, mask_program};
use crate::metrics::METRICS;
use crate::obs::{self, ItemSpan};
use crate::preprocess::list_programs;
use crate::program::{Candidate, FilteredCandidate, MaskedProgram, SourceProgram};
use crate::validate::{worker, TrainerService, ARTIFACT_DIR};

pub use ops::{parse_ops, render_ops, Op};
use stats::{BuildEntry, BuildReport, CountEntry, CountReport, RankEntry, RankReport};
pub use summary::{summarize_item, ItemSummary};

/// Directory under the output root holding worker shard files and logs.
pub const WORKER_RUN_DIR: &str = "validate_workers";

/// Input and output locations of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub buggy_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Reference fixes, same file names as the buggy programs.
    pub correct_dir: Option<PathBuf>,
    /// Buggy programs with the placeholder already at the faulty fragment.
    pub perfect_fl_dir: Option<PathBuf>,
}

/// External collaborators of a run.
pub struct Services<'a> {
    pub infill: &'a mut dyn InfillService,
    pub trainer: &'a mut dyn TrainerService,
    pub materializer: &'a dyn Materializer,
    /// `mlrepair` executable used to fan validation out to worker
    /// processes; validation stays in-process without it.
    pub worker_exe: Option<PathBuf>,
}

/// One buggy program and its output directory.
#[derive(Debug, Clone)]
pub struct Item {
    pub name: String,
    pub source: PathBuf,
    pub checkpoints: ItemCheckpoints,
}

impl Item {
    fn dir(&self) -> &Path {
        self.checkpoints.dir()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub ops: Vec<Op>,
    pub items: usize,
}

pub struct Orchestrator {
    config: RepairConfig,
    paths: RunPaths,
}

impl Orchestrator {
    pub fn new(config: RepairConfig, paths: RunPaths) -> Self {
        Self { config, paths }
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    /// Sorted buggy programs; creates each item's output directory.
    pub fn items(&self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for source in list_programs(&self.paths.buggy_dir)? {
            let Some(name) = source.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let dir = self.paths.out_dir.join(&name);
            std::fs::create_dir_all(&dir)?;
            items.push(Item {
                name,
                source,
                checkpoints: ItemCheckpoints::new(dir),
            });
        }
        Ok(items)
    }

    pub async fn run(&self, ops: &BTreeSet<Op>, services: &mut Services<'_>) -> Result<RunReport> {
        if ops.iter().any(|op| op.needs_reference()) && self.paths.correct_dir.is_none() {
            return Err(RepairError::Config(
                "rank statistics and the summary need a reference directory".to_string(),
            ));
        }
        if ops.contains(&Op::PerfectFl) && self.paths.perfect_fl_dir.is_none() {
            return Err(RepairError::Config(
                "wpfl needs a perfect fault localization directory".to_string(),
            ));
        }
        std::fs::create_dir_all(&self.paths.out_dir)?;
        let items = self.items()?;
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        obs::emit_run_started(&run_id, &render_ops(ops), items.len());

        for &op in ops {
            info!(event = "op.started", op = %op);
            self.run_op(op, &items, services).await?;
        }

        METRICS.flush();
        obs::emit_run_finished(&run_id, started.elapsed().as_millis() as u64, items.len());
        Ok(RunReport {
            run_id,
            ops: ops.iter().copied().collect(),
            items: items.len(),
        })
    }

    async fn run_op(&self, op: Op, items: &[Item], services: &mut Services<'_>) -> Result<()> {
        match op {
            Op::PerfectFl => self.with_infill(items, services.infill, Stage::PerfectFl).await,
            Op::Mask => self.mask(items),
            Op::StatMask => self.count_stat(items, CheckpointKind::Masked, "masked"),
            Op::Infill => self.with_infill(items, services.infill, Stage::Infill).await,
            Op::StatInfill => self.count_stat(items, CheckpointKind::Candidates, "candidates"),
            Op::RankInfill => self.rank_stat(items, CheckpointKind::Candidates, "candidates_rank"),
            Op::Filter => self.filter(items),
            Op::StatFilter => self.count_stat(items, CheckpointKind::Filtered, "filtered"),
            Op::RankFilter => self.rank_stat(items, CheckpointKind::Filtered, "filtered_rank"),
            Op::Build => self.build(items, services.materializer).await,
            Op::StatBuild => self.build_stat(items),
            Op::Validate => self.validate(items, services).await,
            Op::StatValidate => self.count_stat(items, CheckpointKind::Plausible, "plausible"),
            Op::RankValidate => self.rank_stat(items, CheckpointKind::Plausible, "plausible_rank"),
            Op::Summarize => self.summarize(items),
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    fn mask(&self, items: &[Item]) -> Result<()> {
        let actions = default_actions();
        for item in items {
            let _span = ItemSpan::enter(&item.name);
            let cp = &item.checkpoints;
            if cp.exists(CheckpointKind::Masked) {
                obs::emit_stage_skipped("mask", &item.name, CheckpointKind::Masked.file_name());
                continue;
            }
            obs::emit_stage_started("mask", &item.name);
            let started = Instant::now();
            let raw = std::fs::read_to_string(&item.source)?;
            let masked = match SourceProgram::canonical(&raw) {
                Ok(program) => mask_program(&program, &actions),
                Err(err) => {
                    obs::emit_stage_error("mask", &item.name, &err);
                    Vec::new()
                }
            };
            let cost = started.elapsed().as_secs_f64();
            METRICS.add_masked(masked.len() as u64);
            cp.write_cost(CheckpointKind::MaskCost, cost)?;
            cp.write(CheckpointKind::Masked, &masked)?;
            obs::emit_stage_finished("mask", &item.name, masked.len(), cost);
        }
        Ok(())
    }

    fn pending(&self, items: &[Item], stage: Stage) -> bool {
        items.iter().any(|item| {
            let cp = &item.checkpoints;
            match stage {
                Stage::PerfectFl => !cp.exists(CheckpointKind::PerfectFl),
                Stage::Infill => {
                    !cp.exists(CheckpointKind::Candidates) && cp.exists(CheckpointKind::Masked)
                }
            }
        })
    }

    /// Run an infill stage between service start and stop. The service is
    /// stopped even when the stage fails.
    async fn with_infill(
        &self,
        items: &[Item],
        infill: &mut dyn InfillService,
        stage: Stage,
    ) -> Result<()> {
        if !self.pending(items, stage) {
            info!(event = "op.nothing_pending", stage = stage.name());
            for item in items {
                let output = stage.output();
                if item.checkpoints.exists(output) {
                    obs::emit_stage_skipped(stage.name(), &item.name, output.file_name());
                }
            }
            return Ok(());
        }
        infill.start().await?;
        let result = match stage {
            Stage::PerfectFl => self.perfect_fl(items, infill).await,
            Stage::Infill => self.infill(items, infill).await,
        };
        let stopped = infill.stop().await;
        result?;
        stopped
    }

    async fn infill(&self, items: &[Item], infill: &mut dyn InfillService) -> Result<()> {
        for item in items {
            let _span = ItemSpan::enter(&item.name);
            let cp = &item.checkpoints;
            if cp.exists(CheckpointKind::Candidates) {
                obs::emit_stage_skipped("infill", &item.name, CheckpointKind::Candidates.file_name());
                continue;
            }
            let Some(masked) = cp.read_optional::<Vec<MaskedProgram>>(CheckpointKind::Masked)? else {
                obs::emit_stage_missing_input("infill", &item.name, CheckpointKind::Masked.file_name());
                continue;
            };
            obs::emit_stage_started("infill", &item.name);
            let started = Instant::now();
            let candidates =
                generate_candidates(infill, &masked, self.config.top_k, self.config.snippet_mode)
                    .await?;
            let cost = started.elapsed().as_secs_f64();
            METRICS.add_candidates(candidates.len() as u64);
            cp.write_cost(CheckpointKind::InfillCost, cost)?;
            cp.write(CheckpointKind::Candidates, &candidates)?;
            obs::emit_stage_finished("infill", &item.name, candidates.len(), cost);
        }
        Ok(())
    }

    /// Infill programs that already carry the placeholder at the faulty
    /// fragment, one prediction each.
    async fn perfect_fl(&self, items: &[Item], infill: &mut dyn InfillService) -> Result<()> {
        let Some(pfl_dir) = &self.paths.perfect_fl_dir else {
            return Ok(());
        };
        for item in items {
            let _span = ItemSpan::enter(&item.name);
            let cp = &item.checkpoints;
            if cp.exists(CheckpointKind::PerfectFl) {
                obs::emit_stage_skipped("wpfl", &item.name, CheckpointKind::PerfectFl.file_name());
                continue;
            }
            let source = pfl_dir.join(&item.name);
            if !source.is_file() {
                obs::emit_stage_missing_input("wpfl", &item.name, &source.display().to_string());
                continue;
            }
            let masked = match MaskedProgram::new(std::fs::read_to_string(&source)?, String::new()) {
                Ok(masked) => masked,
                Err(err) => {
                    obs::emit_stage_error("wpfl", &item.name, &err);
                    continue;
                }
            };
            obs::emit_stage_started("wpfl", &item.name);
            let started = Instant::now();
            let candidates =
                generate_candidates(infill, &[masked], 1, SnippetMode::WholeProgram).await?;
            cp.write(CheckpointKind::PerfectFl, &candidates)?;
            obs::emit_stage_finished(
                "wpfl",
                &item.name,
                candidates.len(),
                started.elapsed().as_secs_f64(),
            );
        }
        Ok(())
    }

    fn filter(&self, items: &[Item]) -> Result<()> {
        for item in items {
            let _span = ItemSpan::enter(&item.name);
            let cp = &item.checkpoints;
            if cp.exists(CheckpointKind::Filtered) {
                obs::emit_stage_skipped("filter", &item.name, CheckpointKind::Filtered.file_name());
                continue;
            }
            let Some(candidates) = cp.read_optional::<Vec<Candidate>>(CheckpointKind::Candidates)?
            else {
                obs::emit_stage_missing_input(
                    "filter",
                    &item.name,
                    CheckpointKind::Candidates.file_name(),
                );
                continue;
            };
            obs::emit_stage_started("filter", &item.name);
            let started = Instant::now();
            let original = std::fs::read_to_string(&item.source)?;
            let (kept, report) =
                filter_candidates(&item.name, &candidates, &original, self.config.filters);
            let cost = started.elapsed().as_secs_f64();
            info!(
                event = "filter.report",
                item = %item.name,
                accepted = report.accepted,
                syntax = report.syntax,
                identity = report.identity,
                no_op = report.no_op,
                bad_change = report.bad_change,
            );
            cp.write_cost(CheckpointKind::FilterCost, cost)?;
            cp.write(CheckpointKind::Filtered, &kept)?;
            obs::emit_stage_finished("filter", &item.name, kept.len(), cost);
        }
        Ok(())
    }

    async fn build(&self, items: &[Item], materializer: &dyn Materializer) -> Result<()> {
        let builder = ArtifactBuilder::new(materializer, &self.config.materializer.work_dir);
        for item in items {
            let _span = ItemSpan::enter(&item.name);
            let cp = &item.checkpoints;
            if cp.exists(CheckpointKind::Artifacts) {
                obs::emit_stage_skipped("build", &item.name, CheckpointKind::Artifacts.file_name());
                continue;
            }
            let Some(filtered) =
                cp.read_optional::<Vec<FilteredCandidate>>(CheckpointKind::Filtered)?
            else {
                obs::emit_stage_missing_input("build", &item.name, CheckpointKind::Filtered.file_name());
                continue;
            };
            obs::emit_stage_started("build", &item.name);
            let started = Instant::now();
            let programs: Vec<String> = filtered.into_iter().map(|c| c.program).collect();
            let built = builder
                .build_all(&item.name, &programs, &item.dir().join(ARTIFACT_DIR))
                .await?;
            let cost = started.elapsed().as_secs_f64();
            cp.write_cost(CheckpointKind::BuildCost, cost)?;
            cp.write(CheckpointKind::Artifacts, &built)?;
            obs::emit_stage_finished("build", &item.name, built.iter().flatten().count(), cost);
        }
        Ok(())
    }

    async fn validate(&self, items: &[Item], services: &mut Services<'_>) -> Result<()> {
        let mut pending = Vec::new();
        for item in items {
            let cp = &item.checkpoints;
            if cp.exists(CheckpointKind::Plausible) {
                obs::emit_stage_skipped("validate", &item.name, CheckpointKind::Plausible.file_name());
            } else if let Some(missing) = [CheckpointKind::Filtered, CheckpointKind::Artifacts]
                .into_iter()
                .find(|kind| !cp.exists(*kind))
            {
                obs::emit_stage_missing_input("validate", &item.name, missing.file_name());
            } else {
                pending.push(item.dir().to_path_buf());
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        let validation = &self.config.validation;
        let workers = worker::worker_count(validation.workers, pending.len());
        match (&services.worker_exe, workers) {
            (Some(exe), n) if n > 1 => {
                let shards = worker::plan_shards(
                    &pending,
                    n,
                    validation.early_stop,
                    &self.config.trainer,
                    &self.paths.out_dir.join(WORKER_RUN_DIR),
                )?;
                let failed = worker::spawn_workers(exe, &shards).await?;
                if failed > 0 {
                    warn!(event = "validate.workers_failed", failed, "some items remain unvalidated");
                }
                Ok(())
            }
            (exe, n) => {
                if exe.is_none() && n > 1 {
                    warn!(event = "validate.in_process", workers = n, "no worker executable, validating in-process");
                }
                let trainer = &mut *services.trainer;
                trainer.start().await?;
                let result = worker::validate_items(&pending, trainer, validation.early_stop).await;
                let stopped = trainer.stop().await;
                result?;
                stopped
            }
        }
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    fn list_len(item: &Item, kind: CheckpointKind) -> Result<Option<usize>> {
        Ok(item
            .checkpoints
            .read_optional::<Vec<serde_json::Value>>(kind)?
            .map(|list| list.len()))
    }

    fn count_stat(&self, items: &[Item], kind: CheckpointKind, name: &str) -> Result<()> {
        let mut entries = Vec::new();
        for item in items {
            match Self::list_len(item, kind)? {
                Some(count) => entries.push(CountEntry {
                    item: item.name.clone(),
                    count,
                }),
                None => obs::emit_stage_missing_input(name, &item.name, kind.file_name()),
            }
        }
        let report = CountReport::new(entries);
        stats::write_report(&self.paths.out_dir, name, &report)?;
        stats::log_count(name, &report);
        Ok(())
    }

    /// Programs of `kind` for one item, in checkpoint order.
    fn programs(item: &Item, kind: CheckpointKind) -> Result<Option<Vec<String>>> {
        let cp = &item.checkpoints;
        Ok(match kind {
            CheckpointKind::Candidates => cp
                .read_optional::<Vec<Candidate>>(kind)?
                .map(|c| c.iter().map(Candidate::repaired).collect()),
            _ => cp
                .read_optional::<Vec<FilteredCandidate>>(kind)?
                .map(|c| c.into_iter().map(|c| c.program).collect()),
        })
    }

    fn reference(&self, item: &Item) -> Result<Option<String>> {
        let Some(dir) = &self.paths.correct_dir else {
            return Ok(None);
        };
        let path = dir.join(&item.name);
        if !path.is_file() {
            obs::emit_stage_missing_input("reference", &item.name, &path.display().to_string());
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn rank_stat(&self, items: &[Item], kind: CheckpointKind, name: &str) -> Result<()> {
        let mut entries = Vec::new();
        for item in items {
            let Some(reference) = self.reference(item)? else {
                continue;
            };
            let Some(programs) = Self::programs(item, kind)? else {
                obs::emit_stage_missing_input(name, &item.name, kind.file_name());
                continue;
            };
            entries.push(RankEntry {
                item: item.name.clone(),
                rank: stats::first_match(programs.iter().map(String::as_str), &reference),
            });
        }
        let report = RankReport::new(entries);
        stats::write_report(&self.paths.out_dir, name, &report)?;
        stats::log_rank(name, &report);
        Ok(())
    }

    fn build_stat(&self, items: &[Item]) -> Result<()> {
        let mut entries = Vec::new();
        for item in items {
            let built = item
                .checkpoints
                .read_optional::<Vec<Option<String>>>(CheckpointKind::Artifacts)?;
            match built {
                Some(built) => entries.push(BuildEntry {
                    item: item.name.clone(),
                    built: built.iter().flatten().count(),
                    attempted: built.len(),
                }),
                None => obs::emit_stage_missing_input(
                    "trainable",
                    &item.name,
                    CheckpointKind::Artifacts.file_name(),
                ),
            }
        }
        let report = BuildReport::new(entries);
        stats::write_report(&self.paths.out_dir, "trainable", &report)?;
        stats::log_build(&report);
        Ok(())
    }

    fn summarize(&self, items: &[Item]) -> Result<()> {
        let mut summaries = Vec::with_capacity(items.len());
        for item in items {
            let reference = self.reference(item)?;
            summaries.push(summarize_item(
                &item.name,
                &item.checkpoints,
                reference.as_deref(),
            )?);
        }
        summary::write_summary(&self.paths.out_dir, &summaries)?;
        info!(event = "summary.written", items = summaries.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    PerfectFl,
    Infill,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::PerfectFl => "wpfl",
            Stage::Infill => "infill",
        }
    }

    fn output(self) -> CheckpointKind {
        match self {
            Stage::PerfectFl => CheckpointKind::PerfectFl,
            Stage::Infill => CheckpointKind::Candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeMaterializer, ScriptedInfill, ScriptedTrainer};

    const BUG: &str = "\
from keras.models import Sequential
from keras.layers import Dense
model = Sequential()
model.add(Dense(10, input_dim=4))
model.add(Dense(2))
";

    fn setup(bug: &str) -> (tempfile::TempDir, RunPaths) {
        let root = tempfile::tempdir().unwrap();
        let buggy = root.path().join("bugs");
        std::fs::create_dir_all(&buggy).unwrap();
        std::fs::write(buggy.join("bug.py"), bug).unwrap();
        let paths = RunPaths {
            buggy_dir: buggy,
            out_dir: root.path().join("out"),
            correct_dir: None,
            perfect_fl_dir: None,
        };
        (root, paths)
    }

    fn config(work: &Path) -> RepairConfig {
        let mut config = RepairConfig::default();
        config.materializer.work_dir = work.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_mask_then_infill_writes_checkpoints() {
        let (root, paths) = setup(BUG);
        let orchestrator = Orchestrator::new(config(&root.path().join("work")), paths.clone());
        let items = orchestrator.items().unwrap();
        orchestrator.mask(&items).unwrap();

        let cp = &items[0].checkpoints;
        let masked: Vec<MaskedProgram> = cp.read(CheckpointKind::Masked).unwrap();
        assert!(!masked.is_empty());
        assert!(cp.exists(CheckpointKind::MaskCost));

        let answers = vec![masked.iter().map(|_| vec!["7".to_string()]).collect()];
        let mut infill = ScriptedInfill::new(answers);
        orchestrator
            .with_infill(&items, &mut infill, Stage::Infill)
            .await
            .unwrap();
        let candidates: Vec<Candidate> = cp.read(CheckpointKind::Candidates).unwrap();
        assert_eq!(candidates.len(), masked.len());
        assert!(paths.out_dir.join("bug.py").join("infill.cost.json").is_file());
    }

    #[tokio::test]
    async fn test_infill_not_started_when_nothing_pending() {
        let (root, paths) = setup(BUG);
        let orchestrator = Orchestrator::new(config(&root.path().join("work")), paths);
        let items = orchestrator.items().unwrap();
        // no masked checkpoint, so nothing to infill and no script needed
        let mut infill = ScriptedInfill::new(vec![]);
        orchestrator
            .with_infill(&items, &mut infill, Stage::Infill)
            .await
            .unwrap();
        assert!(infill.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_rank_requires_reference_dir() {
        let (root, paths) = setup(BUG);
        let orchestrator = Orchestrator::new(config(&root.path().join("work")), paths);
        let mut infill = ScriptedInfill::new(vec![]);
        let mut trainer = ScriptedTrainer::new(vec![]);
        let materializer = FakeMaterializer::default();
        let mut services = Services {
            infill: &mut infill,
            trainer: &mut trainer,
            materializer: &materializer,
            worker_exe: None,
        };
        let ops = parse_ops(&["stat-rank-3"]).unwrap();
        assert!(matches!(
            orchestrator.run(&ops, &mut services).await,
            Err(RepairError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_perfect_fl_infills_marked_program() {
        let (root, mut paths) = setup(BUG);
        let pfl = root.path().join("pfl");
        std::fs::create_dir_all(&pfl).unwrap();
        std::fs::write(pfl.join("bug.py"), "x = __mask_0__\n").unwrap();
        paths.perfect_fl_dir = Some(pfl);
        let orchestrator = Orchestrator::new(config(&root.path().join("work")), paths);

        let mut infill = ScriptedInfill::new(vec![vec![vec!["3".to_string()]]]);
        let mut trainer = ScriptedTrainer::new(vec![]);
        let materializer = FakeMaterializer::default();
        let mut services = Services {
            infill: &mut infill,
            trainer: &mut trainer,
            materializer: &materializer,
            worker_exe: None,
        };
        let ops = parse_ops(&["wpfl"]).unwrap();
        orchestrator.run(&ops, &mut services).await.unwrap();

        let items = orchestrator.items().unwrap();
        let repaired: Vec<Candidate> = items[0].checkpoints.read(CheckpointKind::PerfectFl).unwrap();
        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired[0].repaired(), "x = 3\n");
    }

    #[tokio::test]
    async fn test_unparseable_program_masks_to_nothing() {
        let (root, paths) = setup("def (:\n");
        let orchestrator = Orchestrator::new(config(&root.path().join("work")), paths);
        let items = orchestrator.items().unwrap();
        orchestrator.mask(&items).unwrap();
        let masked: Vec<MaskedProgram> = items[0].checkpoints.read(CheckpointKind::Masked).unwrap();
        assert!(masked.is_empty());
    }

    #[tokio::test]
    async fn test_count_stat_skips_items_without_checkpoint() {
        let (root, paths) = setup(BUG);
        std::fs::write(paths.buggy_dir.join("other.py"), "x = 1\n").unwrap();
        let out_dir = paths.out_dir.clone();
        let orchestrator = Orchestrator::new(config(&root.path().join("work")), paths);
        let items = orchestrator.items().unwrap();
        items[0]
            .checkpoints
            .write(CheckpointKind::Masked, &Vec::<MaskedProgram>::new())
            .unwrap();
        orchestrator
            .count_stat(&items, CheckpointKind::Masked, "masked")
            .unwrap();
        let report: CountReport =
            crate::checkpoint::read_json(&out_dir.join("stats").join("masked.json")).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].item, "bug.py");
    }
}
