//! Static candidate filters.
//!
//! Candidates are checked in a fixed order and the first failing check
//! rejects the candidate:
//!
//! 1. syntax: the repaired program parses;
//! 2. identity: the repaired program is not the original program;
//! 3. no-op: the prediction is not the masked fragment;
//! 4. bad change: see [`is_bad_change`].
//!
//! Each check can be disabled through [`FilterConfig`]. Survivors keep
//! their candidate order.

mod bad_change;
mod chain;

use model_syntax::{canonical_form, parse, structurally_equivalent};
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::metrics::METRICS;
use crate::program::{Candidate, FilteredCandidate};

pub use bad_change::is_bad_change;

/// Why a candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    Syntax,
    Identity,
    NoOp,
    BadChange,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Identity => "identity",
            Self::NoOp => "no_op",
            Self::BadChange => "bad_change",
        }
    }
}

/// Per-item tally of filter outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    pub accepted: usize,
    pub syntax: usize,
    pub identity: usize,
    pub no_op: usize,
    pub bad_change: usize,
}

impl FilterReport {
    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Syntax => self.syntax += 1,
            Rejection::Identity => self.identity += 1,
            Rejection::NoOp => self.no_op += 1,
            Rejection::BadChange => self.bad_change += 1,
        }
    }

    pub fn rejected(&self) -> usize {
        self.syntax + self.identity + self.no_op + self.bad_change
    }
}

pub struct CandidateFilter {
    config: FilterConfig,
    /// Canonical form of the unrepaired program, when it parses.
    original: Option<String>,
}

impl CandidateFilter {
    pub fn new(config: FilterConfig, original_program: &str) -> Self {
        Self {
            config,
            original: canonical_form(original_program).ok(),
        }
    }

    /// The repaired program, or the first check it fails.
    pub fn check(&self, candidate: &Candidate) -> Result<String, Rejection> {
        let repaired = candidate.repaired();
        if self.config.syntax && parse(&repaired).is_err() {
            return Err(Rejection::Syntax);
        }
        if self.config.identity {
            if let (Some(original), Ok(repaired)) = (&self.original, canonical_form(&repaired)) {
                if *original == repaired {
                    return Err(Rejection::Identity);
                }
            }
        }
        if self.config.no_op
            && structurally_equivalent(&candidate.masked.original_fragment, &candidate.predicted)
        {
            return Err(Rejection::NoOp);
        }
        if self.config.bad_change
            && is_bad_change(
                &candidate.masked.text,
                &candidate.masked.original_fragment,
                &candidate.predicted,
            )
        {
            return Err(Rejection::BadChange);
        }
        Ok(repaired)
    }
}

/// Run the filters over one item's candidates.
pub fn filter_candidates(
    item: &str,
    candidates: &[Candidate],
    original_program: &str,
    config: FilterConfig,
) -> (Vec<FilteredCandidate>, FilterReport) {
    let filter = CandidateFilter::new(config, original_program);
    let mut report = FilterReport::default();
    let mut kept = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        match filter.check(candidate) {
            Ok(program) => {
                report.accepted += 1;
                kept.push(FilteredCandidate {
                    candidate_index: index,
                    program,
                });
            }
            Err(rejection) => {
                report.record(rejection);
                METRICS.inc_rejected();
                crate::obs::emit_candidate_rejected(item, index, rejection.as_str());
            }
        }
    }
    (kept, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::MaskedProgram;

    const ORIGINAL: &str = "\
model = __root__.keras.models.Sequential()
model.add(__root__.keras.layers.Dense(units=64, input_dim=784))
model.add(__root__.keras.layers.Dense(units=10))
model.fit(x, y, epochs=5)
";

    fn candidate(masked: &str, original: &str, predicted: &str) -> Candidate {
        Candidate {
            masked: MaskedProgram::new(masked.to_string(), original.to_string()).unwrap(),
            predicted: predicted.to_string(),
        }
    }

    fn epochs(predicted: &str) -> Candidate {
        candidate(
            &ORIGINAL.replace("epochs=5", "epochs=__mask_0__"),
            "5",
            predicted,
        )
    }

    fn last_units(predicted: &str) -> Candidate {
        candidate(
            &ORIGINAL.replace("units=10", "units=__mask_0__"),
            "10",
            predicted,
        )
    }

    #[test]
    fn test_check_order() {
        let filter = CandidateFilter::new(FilterConfig::default(), ORIGINAL);
        assert_eq!(filter.check(&epochs("5 +")), Err(Rejection::Syntax));
        assert_eq!(filter.check(&epochs("5")), Err(Rejection::Identity));
        assert_eq!(filter.check(&last_units("3")), Err(Rejection::BadChange));
        assert!(filter.check(&epochs("20")).is_ok());
    }

    #[test]
    fn test_no_op_differs_from_identity() {
        // an equivalent fragment is a no-op even when identity is off
        let config = FilterConfig {
            identity: false,
            ..FilterConfig::default()
        };
        let filter = CandidateFilter::new(config, ORIGINAL);
        assert_eq!(filter.check(&epochs(" 5 ")), Err(Rejection::NoOp));
    }

    #[test]
    fn test_disabled_checks_pass_through() {
        let config = FilterConfig {
            syntax: false,
            identity: false,
            no_op: false,
            bad_change: false,
        };
        let filter = CandidateFilter::new(config, ORIGINAL);
        assert!(filter.check(&epochs("5 +")).is_ok());
        assert!(filter.check(&last_units("3")).is_ok());
    }

    #[test]
    fn test_filter_candidates_keeps_order_and_indices() {
        let candidates = vec![epochs("5"), epochs("20"), last_units("3"), epochs("30")];
        let (kept, report) =
            filter_candidates("bug.py", &candidates, ORIGINAL, FilterConfig::default());
        let indices: Vec<usize> = kept.iter().map(|k| k.candidate_index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert!(kept[0].program.contains("epochs=20"));
        assert_eq!(
            report,
            FilterReport {
                accepted: 2,
                identity: 1,
                bad_change: 1,
                ..FilterReport::default()
            }
        );
        assert_eq!(report.rejected(), 2);
    }
}
