//! Per-item summary of a run, written to `<out>/summary.json`.
//!
//! Fields whose checkpoint is missing are left absent (or empty for
//! vectors), so a partially run item still gets an entry.

use std::path::Path;

use model_syntax::structurally_equivalent;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{write_json_atomic, CheckpointKind, ItemCheckpoints, StageCost};
use crate::error::Result;
use crate::program::{Candidate, FilteredCandidate, MaskedProgram};
use crate::validate::ValidationRecord;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item: String,

    pub count_of_masked: Option<usize>,
    pub count_of_infilled: Option<usize>,
    pub count_of_filtered: Option<usize>,
    pub count_of_plausible: Option<usize>,

    /// Per candidate: equivalent to the reference fix.
    pub correct_in_infilled: Vec<bool>,
    pub correct_in_filtered: Vec<bool>,
    pub correct_in_plausible: Vec<bool>,
    /// Per filtered candidate: validated as plausible.
    pub plausible_in_filtered: Vec<bool>,

    pub first_correct_in_infilled: Option<usize>,
    pub first_correct_in_filtered: Option<usize>,
    pub first_correct_in_plausible: Option<usize>,
    pub first_plausible_in_filtered: Option<usize>,

    pub mask_cost: Option<f64>,
    pub infill_cost: Option<f64>,
    pub filter_cost: Option<f64>,
    pub build_cost: Option<f64>,

    pub validation: Vec<ValidationRecord>,
    /// Total trainer time over every validated artifact.
    pub validation_time: Option<f64>,
    /// Trainer time up to and including the first passing artifact.
    pub time_to_first_plausible: Option<f64>,
}

fn correctness<'p>(programs: impl Iterator<Item = &'p str>, reference: Option<&str>) -> Vec<bool> {
    match reference {
        Some(reference) => programs
            .map(|program| structurally_equivalent(program, reference))
            .collect(),
        None => Vec::new(),
    }
}

fn first_true(flags: &[bool]) -> Option<usize> {
    flags.iter().position(|&f| f)
}

fn cost(checkpoints: &ItemCheckpoints, kind: CheckpointKind) -> Result<Option<f64>> {
    Ok(checkpoints
        .read_optional::<StageCost>(kind)?
        .map(|c| c.time_cost))
}

pub fn summarize_item(
    item: &str,
    checkpoints: &ItemCheckpoints,
    reference: Option<&str>,
) -> Result<ItemSummary> {
    let mut summary = ItemSummary {
        item: item.to_string(),
        ..ItemSummary::default()
    };

    if let Some(masked) = checkpoints.read_optional::<Vec<MaskedProgram>>(CheckpointKind::Masked)? {
        summary.count_of_masked = Some(masked.len());
    }
    if let Some(candidates) =
        checkpoints.read_optional::<Vec<Candidate>>(CheckpointKind::Candidates)?
    {
        let repaired: Vec<String> = candidates.iter().map(Candidate::repaired).collect();
        summary.count_of_infilled = Some(candidates.len());
        summary.correct_in_infilled = correctness(repaired.iter().map(String::as_str), reference);
        summary.first_correct_in_infilled = first_true(&summary.correct_in_infilled);
    }
    let filtered =
        checkpoints.read_optional::<Vec<FilteredCandidate>>(CheckpointKind::Filtered)?;
    if let Some(filtered) = &filtered {
        summary.count_of_filtered = Some(filtered.len());
        summary.correct_in_filtered =
            correctness(filtered.iter().map(|c| c.program.as_str()), reference);
        summary.first_correct_in_filtered = first_true(&summary.correct_in_filtered);
    }
    if let Some(plausible) =
        checkpoints.read_optional::<Vec<FilteredCandidate>>(CheckpointKind::Plausible)?
    {
        summary.count_of_plausible = Some(plausible.len());
        summary.correct_in_plausible =
            correctness(plausible.iter().map(|c| c.program.as_str()), reference);
        summary.first_correct_in_plausible = first_true(&summary.correct_in_plausible);
        if let Some(filtered) = &filtered {
            summary.plausible_in_filtered = filtered
                .iter()
                .map(|f| plausible.iter().any(|p| p.candidate_index == f.candidate_index))
                .collect();
            summary.first_plausible_in_filtered = first_true(&summary.plausible_in_filtered);
        }
    }

    summary.mask_cost = cost(checkpoints, CheckpointKind::MaskCost)?;
    summary.infill_cost = cost(checkpoints, CheckpointKind::InfillCost)?;
    summary.filter_cost = cost(checkpoints, CheckpointKind::FilterCost)?;
    summary.build_cost = cost(checkpoints, CheckpointKind::BuildCost)?;

    if let Some(records) =
        checkpoints.read_optional::<Vec<ValidationRecord>>(CheckpointKind::Validation)?
    {
        summary.validation_time = Some(records.iter().map(|r| r.time_cost).sum());
        summary.time_to_first_plausible = records.iter().position(|r| r.passed).map(|at| {
            records[..=at].iter().map(|r| r.time_cost).sum()
        });
        summary.validation = records;
    }
    Ok(summary)
}

pub fn write_summary(out_dir: &Path, summaries: &[ItemSummary]) -> Result<()> {
    write_json_atomic(&out_dir.join(SUMMARY_FILE), summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = "x = 2\n";

    fn filtered(index: usize, program: &str) -> FilteredCandidate {
        FilteredCandidate {
            candidate_index: index,
            program: program.to_string(),
        }
    }

    #[test]
    fn test_missing_checkpoints_leave_fields_absent() {
        let dir = tempfile::tempdir().unwrap();
        let summary =
            summarize_item("bug.py", &ItemCheckpoints::new(dir.path()), Some(REFERENCE)).unwrap();
        assert_eq!(summary.item, "bug.py");
        assert!(summary.count_of_masked.is_none());
        assert!(summary.correct_in_infilled.is_empty());
        assert!(summary.validation_time.is_none());
    }

    #[test]
    fn test_full_item() {
        let dir = tempfile::tempdir().unwrap();
        let cp = ItemCheckpoints::new(dir.path());
        let masked = MaskedProgram::new("x = __mask_0__\n".into(), "1".into()).unwrap();
        cp.write(CheckpointKind::Masked, &vec![masked.clone()]).unwrap();
        let candidates: Vec<Candidate> = ["1", "3", "2"]
            .iter()
            .map(|p| Candidate {
                masked: masked.clone(),
                predicted: p.to_string(),
            })
            .collect();
        cp.write(CheckpointKind::Candidates, &candidates).unwrap();
        cp.write(
            CheckpointKind::Filtered,
            &vec![filtered(1, "x = 3\n"), filtered(2, "x = 2\n")],
        )
        .unwrap();
        cp.write(CheckpointKind::Plausible, &vec![filtered(2, "x = 2\n")])
            .unwrap();
        cp.write(
            CheckpointKind::Validation,
            &vec![
                ValidationRecord {
                    artifact: "bug.py.0".into(),
                    passed: false,
                    time_cost: 2.0,
                },
                ValidationRecord {
                    artifact: "bug.py.1".into(),
                    passed: true,
                    time_cost: 3.0,
                },
            ],
        )
        .unwrap();
        cp.write_cost(CheckpointKind::MaskCost, 0.5).unwrap();

        let s = summarize_item("bug.py", &cp, Some(REFERENCE)).unwrap();
        assert_eq!(s.count_of_masked, Some(1));
        assert_eq!(s.count_of_infilled, Some(3));
        assert_eq!(s.correct_in_infilled, vec![false, false, true]);
        assert_eq!(s.first_correct_in_infilled, Some(2));
        assert_eq!(s.correct_in_filtered, vec![false, true]);
        assert_eq!(s.plausible_in_filtered, vec![false, true]);
        assert_eq!(s.first_plausible_in_filtered, Some(1));
        assert_eq!(s.first_correct_in_plausible, Some(0));
        assert_eq!(s.mask_cost, Some(0.5));
        assert!(s.infill_cost.is_none());
        assert_eq!(s.validation_time, Some(5.0));
        assert_eq!(s.time_to_first_plausible, Some(5.0));
    }

    #[test]
    fn test_without_reference_no_correctness() {
        let dir = tempfile::tempdir().unwrap();
        let cp = ItemCheckpoints::new(dir.path());
        cp.write(CheckpointKind::Filtered, &vec![filtered(0, "x = 2\n")])
            .unwrap();
        let s = summarize_item("bug.py", &cp, None).unwrap();
        assert_eq!(s.count_of_filtered, Some(1));
        assert!(s.correct_in_filtered.is_empty());
    }
}
