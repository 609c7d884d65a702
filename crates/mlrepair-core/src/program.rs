//! Program values that flow between stages.
//!
//! Every stage reads and writes these as JSON checkpoints, so field names are
//! part of the on-disk format.

use model_syntax::{canonical_form, parse, Module};
use serde::{Deserialize, Serialize};

use crate::error::{RepairError, Result};

/// Placeholder identifier marking the masked hole.
pub const MASK_TOKEN: &str = "__mask_0__";

/// Occurrences of [`MASK_TOKEN`] in `text`.
pub fn placeholder_count(text: &str) -> usize {
    text.matches(MASK_TOKEN).count()
}

/// A buggy program in canonical form, with its tree.
///
/// Spans in `module` index into `text`.
#[derive(Debug, Clone)]
pub struct SourceProgram {
    pub text: String,
    pub module: Module,
}

impl SourceProgram {
    /// Canonicalize `raw` and reparse the canonical text.
    pub fn canonical(raw: &str) -> Result<Self> {
        let text = canonical_form(raw)?;
        let module = parse(&text)?;
        Ok(Self { text, module })
    }
}

/// A program with exactly one masked fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedProgram {
    pub text: String,
    pub original_fragment: String,
}

impl MaskedProgram {
    pub fn new(text: String, original_fragment: String) -> Result<Self> {
        match placeholder_count(&text) {
            1 => Ok(Self {
                text,
                original_fragment,
            }),
            n => Err(RepairError::InvalidMask(format!(
                "expected one {MASK_TOKEN}, found {n}"
            ))),
        }
    }

    /// Substitute `fragment` for the placeholder.
    pub fn fill(&self, fragment: &str) -> String {
        self.text.replacen(MASK_TOKEN, fragment, 1)
    }

    /// The unmasked program.
    pub fn original(&self) -> String {
        self.fill(&self.original_fragment)
    }
}

/// One prediction for one masked program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub masked: MaskedProgram,
    pub predicted: String,
}

impl Candidate {
    pub fn repaired(&self) -> String {
        self.masked.fill(&self.predicted)
    }
}

/// A repaired program that survived the static filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredCandidate {
    /// Position in the item's candidate list.
    pub candidate_index: usize,
    pub program: String,
}
