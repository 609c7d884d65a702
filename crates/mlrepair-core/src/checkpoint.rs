//! Per-item checkpoint files.
//!
//! Every stage writes its output to a fixed file name inside the item's
//! output directory. A stage whose output file exists is skipped, which is
//! what makes interrupted runs resumable. Writes go through a temp file in
//! the same directory and an atomic rename, so a file either holds a full
//! result or does not exist.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{RepairError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointKind {
    PerfectFl,
    Masked,
    MaskCost,
    Candidates,
    InfillCost,
    Filtered,
    FilterCost,
    Artifacts,
    BuildCost,
    Validation,
    Plausible,
}

impl CheckpointKind {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::PerfectFl => "wpfl.json",
            Self::Masked => "masked.json",
            Self::MaskCost => "mask.cost.json",
            Self::Candidates => "candidates.json",
            Self::InfillCost => "infill.cost.json",
            Self::Filtered => "filtered.json",
            Self::FilterCost => "filter.cost.json",
            Self::Artifacts => "artifacts.json",
            Self::BuildCost => "build.cost.json",
            Self::Validation => "validation.json",
            Self::Plausible => "plausible.json",
        }
    }
}

/// Wall-clock cost of one stage for one item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageCost {
    pub time_cost: f64,
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Checkpoint files of one item.
#[derive(Debug, Clone)]
pub struct ItemCheckpoints {
    dir: PathBuf,
}

impl ItemCheckpoints {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: CheckpointKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn exists(&self, kind: CheckpointKind) -> bool {
        self.path(kind).is_file()
    }

    pub fn read<T: DeserializeOwned>(&self, kind: CheckpointKind) -> Result<T> {
        let path = self.path(kind);
        if !path.is_file() {
            return Err(RepairError::MissingCheckpoint(path.display().to_string()));
        }
        read_json(&path)
    }

    /// `None` when the checkpoint does not exist.
    pub fn read_optional<T: DeserializeOwned>(&self, kind: CheckpointKind) -> Result<Option<T>> {
        if !self.exists(kind) {
            return Ok(None);
        }
        self.read(kind).map(Some)
    }

    pub fn write<T: Serialize + ?Sized>(&self, kind: CheckpointKind, value: &T) -> Result<()> {
        write_json_atomic(&self.path(kind), value)
    }

    pub fn write_cost(&self, kind: CheckpointKind, time_cost: f64) -> Result<()> {
        self.write(kind, &StageCost { time_cost })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cp = ItemCheckpoints::new(dir.path().join("bug.py"));
        assert!(!cp.exists(CheckpointKind::Masked));
        cp.write(CheckpointKind::Masked, &vec!["a", "b"]).unwrap();
        assert!(cp.exists(CheckpointKind::Masked));
        let back: Vec<String> = cp.read(CheckpointKind::Masked).unwrap();
        assert_eq!(back, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let cp = ItemCheckpoints::new(dir.path());
        let err = cp.read::<Vec<String>>(CheckpointKind::Filtered).unwrap_err();
        assert!(matches!(err, RepairError::MissingCheckpoint(_)));
        assert!(cp
            .read_optional::<Vec<String>>(CheckpointKind::Filtered)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cp = ItemCheckpoints::new(dir.path());
        cp.write_cost(CheckpointKind::MaskCost, 1.5).unwrap();
        cp.write_cost(CheckpointKind::MaskCost, 2.5).unwrap();
        let cost: StageCost = cp.read(CheckpointKind::MaskCost).unwrap();
        assert_eq!(cost.time_cost, 2.5);
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_file_names_are_distinct() {
        use std::collections::HashSet;
        let kinds = [
            CheckpointKind::PerfectFl,
            CheckpointKind::Masked,
            CheckpointKind::MaskCost,
            CheckpointKind::Candidates,
            CheckpointKind::InfillCost,
            CheckpointKind::Filtered,
            CheckpointKind::FilterCost,
            CheckpointKind::Artifacts,
            CheckpointKind::BuildCost,
            CheckpointKind::Validation,
            CheckpointKind::Plausible,
        ];
        let names: HashSet<&str> = kinds.iter().map(|k| k.file_name()).collect();
        assert_eq!(names.len(), kinds.len());
    }
}
