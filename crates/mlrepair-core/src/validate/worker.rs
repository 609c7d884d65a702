//! Fan-out of validation over worker processes.
//!
//! Pending items are split into contiguous shards. Each shard is written to
//! a JSON shard file and run by a separate `validate-worker` process, which
//! starts its own trainer, logs to its own file and validates its items
//! under the per-item lock.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use super::{validate_item, TrainerService};
use crate::checkpoint::{read_json, write_json_atomic, ItemCheckpoints};
use crate::config::ServiceConfig;
use crate::error::Result;

/// Upper bound on worker processes regardless of machine size.
pub const MAX_WORKERS: usize = 24;

/// Everything a worker process needs to validate its shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSpec {
    pub worker: usize,
    /// Item output directories.
    pub items: Vec<PathBuf>,
    pub early_stop: bool,
    pub trainer: ServiceConfig,
    pub log_file: PathBuf,
}

impl ShardSpec {
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// `min(cpus / 2, 24, items, requested)`, at least one.
pub fn worker_count(requested: usize, items: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    (cpus / 2)
        .min(MAX_WORKERS)
        .min(items)
        .min(requested)
        .max(1)
}

/// Split into `n` contiguous parts whose sizes differ by at most one.
pub fn split_contiguous<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    let n = n.max(1);
    let base = items.len() / n;
    let extra = items.len() % n;
    let mut shards = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let len = base + usize::from(i < extra);
        shards.push(items[start..start + len].to_vec());
        start += len;
    }
    shards
}

/// `validate_worker_<i>.log` in `dir`, with a timestamp suffix when that
/// file already exists.
pub fn worker_log_path(dir: &Path, worker: usize) -> PathBuf {
    let plain = dir.join(format!("validate_worker_{worker}.log"));
    if !plain.exists() {
        return plain;
    }
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    dir.join(format!("validate_worker_{worker}.{stamp}.log"))
}

/// Write one shard file per worker and return their paths.
///
/// A launched trainer gets a fresh port per worker; an already running one
/// is shared.
pub fn plan_shards(
    items: &[PathBuf],
    workers: usize,
    early_stop: bool,
    trainer: &ServiceConfig,
    run_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let shard_dir = run_dir.join("shards");
    let log_dir = run_dir.join("logs");
    std::fs::create_dir_all(&shard_dir)?;
    std::fs::create_dir_all(&log_dir)?;

    let mut trainer = trainer.clone();
    if trainer.launch.is_some() {
        trainer.port = None;
    }
    let mut files = Vec::new();
    for (worker, items) in split_contiguous(items, workers).into_iter().enumerate() {
        if items.is_empty() {
            continue;
        }
        let spec = ShardSpec {
            worker,
            items,
            early_stop,
            trainer: trainer.clone(),
            log_file: worker_log_path(&log_dir, worker),
        };
        let path = shard_dir.join(format!("shard_{worker}.json"));
        spec.save(&path)?;
        files.push(path);
    }
    Ok(files)
}

/// Run `<exe> validate-worker --shard <file>` for every shard and wait for
/// all of them. A failed worker is logged; its items stay pending.
pub async fn spawn_workers(exe: &Path, shard_files: &[PathBuf]) -> Result<usize> {
    let mut children = Vec::with_capacity(shard_files.len());
    for shard in shard_files {
        let child = Command::new(exe)
            .arg("validate-worker")
            .arg("--shard")
            .arg(shard)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        info!(event = "validate.worker_spawned", shard = %shard.display(), pid = child.id().unwrap_or_default());
        children.push(child);
    }

    let statuses = futures::future::join_all(children.iter_mut().map(|c| c.wait())).await;
    let mut failed = 0;
    for (shard, status) in shard_files.iter().zip(statuses) {
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                failed += 1;
                warn!(event = "validate.worker_failed", shard = %shard.display(), status = %status);
            }
            Err(err) => {
                failed += 1;
                warn!(event = "validate.worker_failed", shard = %shard.display(), error = %err);
            }
        }
    }
    Ok(failed)
}

fn item_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Validate every item of a shard with `trainer`, started here and always
/// stopped. Returns how many items were validated.
pub async fn run_shard(spec: &ShardSpec, trainer: &mut dyn TrainerService) -> Result<usize> {
    trainer.start().await?;
    let result = validate_items(&spec.items, trainer, spec.early_stop).await;
    let stopped = trainer.stop().await;
    let validated = result?;
    stopped?;
    info!(event = "validate.shard_finished", worker = spec.worker, validated);
    Ok(validated)
}

/// Validate items in order with an already started trainer.
pub async fn validate_items(
    items: &[PathBuf],
    trainer: &mut dyn TrainerService,
    early_stop: bool,
) -> Result<usize> {
    let mut validated = 0;
    for dir in items {
        let name = item_name(dir);
        let _span = crate::obs::ItemSpan::enter(&name);
        if validate_item(&name, &ItemCheckpoints::new(dir), trainer, early_stop).await? {
            validated += 1;
        }
    }
    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointKind;
    use crate::fakes::ScriptedTrainer;
    use crate::program::FilteredCandidate;

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(1, 100), 1);
        assert_eq!(worker_count(8, 0), 1);
        assert!(worker_count(1000, 1000) <= MAX_WORKERS);
        assert!(worker_count(2, 1) == 1);
    }

    #[test]
    fn test_split_contiguous() {
        let items: Vec<u32> = (0..7).collect();
        let shards = split_contiguous(&items, 3);
        assert_eq!(shards, vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]);
        let shards = split_contiguous(&items[..2], 3);
        assert_eq!(shards, vec![vec![0], vec![1], vec![]]);
    }

    #[test]
    fn test_worker_log_path_adds_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let first = worker_log_path(dir.path(), 2);
        assert_eq!(first, dir.path().join("validate_worker_2.log"));
        std::fs::write(&first, "").unwrap();
        let second = worker_log_path(dir.path(), 2);
        assert_ne!(second, first);
        let name = second.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("validate_worker_2.") && name.ends_with(".log"));
    }

    #[test]
    fn test_plan_shards_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<PathBuf> = (0..5).map(|i| dir.path().join(format!("b{i}.py"))).collect();
        let trainer = ServiceConfig {
            port: Some(5000),
            launch: Some(vec!["trainer".to_string(), "{port}".to_string()]),
            ..ServiceConfig::default()
        };
        let files = plan_shards(&items, 2, true, &trainer, dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let first = ShardSpec::load(&files[0]).unwrap();
        assert_eq!(first.items, items[..3].to_vec());
        assert_eq!(first.trainer.port, None);
        let second = ShardSpec::load(&files[1]).unwrap();
        assert_eq!(second.worker, 1);
        assert_eq!(second.items, items[3..].to_vec());
    }

    #[tokio::test]
    async fn test_run_shard_validates_and_stops_trainer() {
        let dir = tempfile::tempdir().unwrap();
        let item = dir.path().join("bug.py");
        let cp = ItemCheckpoints::new(&item);
        cp.write(
            CheckpointKind::Filtered,
            &vec![FilteredCandidate {
                candidate_index: 0,
                program: "x\n".to_string(),
            }],
        )
        .unwrap();
        cp.write(CheckpointKind::Artifacts, &vec![Some("bug.py.0".to_string())])
            .unwrap();

        let spec = ShardSpec {
            worker: 0,
            items: vec![item.clone(), dir.path().join("missing.py")],
            early_stop: true,
            trainer: ServiceConfig::default(),
            log_file: dir.path().join("w.log"),
        };
        let mut trainer = ScriptedTrainer::new(vec![true]);
        assert_eq!(run_shard(&spec, &mut trainer).await.unwrap(), 1);
        assert!(trainer.started() && trainer.stopped());
        assert!(cp.exists(CheckpointKind::Plausible));
    }

    #[tokio::test]
    async fn test_spawn_workers_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("worker.sh");
        std::fs::write(&script, "#!/bin/sh\ncase \"$3\" in *fail*) exit 2;; esac\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let shards = vec![dir.path().join("ok.json"), dir.path().join("fail.json")];
        assert_eq!(spawn_workers(&script, &shards).await.unwrap(), 1);
    }
}
