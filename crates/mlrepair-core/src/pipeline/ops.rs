use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RepairError, Result};

/// One pipeline operation. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Op {
    PerfectFl,
    Mask,
    StatMask,
    Infill,
    StatInfill,
    RankInfill,
    Filter,
    StatFilter,
    RankFilter,
    Build,
    StatBuild,
    Validate,
    StatValidate,
    RankValidate,
    Summarize,
}

impl Op {
    pub const ALL: [Op; 15] = [
        Op::PerfectFl,
        Op::Mask,
        Op::StatMask,
        Op::Infill,
        Op::StatInfill,
        Op::RankInfill,
        Op::Filter,
        Op::StatFilter,
        Op::RankFilter,
        Op::Build,
        Op::StatBuild,
        Op::Validate,
        Op::StatValidate,
        Op::RankValidate,
        Op::Summarize,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Op::PerfectFl => "wpfl",
            Op::Mask => "1",
            Op::StatMask => "stat-1",
            Op::Infill => "2",
            Op::StatInfill => "stat-2",
            Op::RankInfill => "stat-rank-2",
            Op::Filter => "3",
            Op::StatFilter => "stat-3",
            Op::RankFilter => "stat-rank-3",
            Op::Build => "4",
            Op::StatBuild => "stat-trainable-4",
            Op::Validate => "5",
            Op::StatValidate => "stat-5",
            Op::RankValidate => "stat-rank-5",
            Op::Summarize => "6",
        }
    }

    pub fn is_stat(self) -> bool {
        self.token().starts_with("stat-")
    }

    /// Ops comparing against the reference fixes.
    pub fn needs_reference(self) -> bool {
        matches!(
            self,
            Op::RankInfill | Op::RankFilter | Op::RankValidate | Op::Summarize
        )
    }

    /// The count statistic that always follows this op.
    fn companion(self) -> Option<Op> {
        match self {
            Op::Mask => Some(Op::StatMask),
            Op::Infill => Some(Op::StatInfill),
            Op::Filter => Some(Op::StatFilter),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Op {
    type Err = RepairError;

    fn from_str(s: &str) -> Result<Self> {
        Op::ALL
            .into_iter()
            .find(|op| op.token() == s)
            .ok_or_else(|| RepairError::Config(format!("unknown op: {s}")))
    }
}

/// Resolve op tokens, expanding `end2end` and `stat-all`, into the ops to run
/// in execution order.
pub fn parse_ops<S: AsRef<str>>(tokens: &[S]) -> Result<BTreeSet<Op>> {
    let mut ops = BTreeSet::new();
    for token in tokens {
        match token.as_ref().trim() {
            "end2end" => ops.extend([
                Op::Mask,
                Op::Infill,
                Op::Filter,
                Op::Build,
                Op::Validate,
                Op::Summarize,
            ]),
            "stat-all" => ops.extend(Op::ALL.into_iter().filter(|op| op.is_stat())),
            other => {
                ops.insert(other.parse::<Op>()?);
            }
        }
    }
    if ops.is_empty() {
        return Err(RepairError::Config("no ops given".to_string()));
    }
    let companions: Vec<Op> = ops.iter().filter_map(|op| op.companion()).collect();
    ops.extend(companions);
    Ok(ops)
}

pub fn render_ops(ops: &BTreeSet<Op>) -> String {
    ops.iter().map(|op| op.token()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops_run_in_canonical_order() {
        let ops = parse_ops(&["6", "3", "wpfl"]).unwrap();
        assert_eq!(render_ops(&ops), "wpfl,3,stat-3,6");
    }

    #[test]
    fn test_end2end_expands_with_stats() {
        let ops = parse_ops(&["end2end"]).unwrap();
        assert_eq!(render_ops(&ops), "1,stat-1,2,stat-2,3,stat-3,4,5,6");
    }

    #[test]
    fn test_stat_all() {
        let ops = parse_ops(&["stat-all"]).unwrap();
        assert_eq!(ops.len(), 8);
        assert!(ops.iter().all(|op| op.is_stat()));
        assert!(ops.contains(&Op::StatBuild));
    }

    #[test]
    fn test_unknown_and_empty_are_config_errors() {
        assert!(matches!(parse_ops(&["7"]), Err(RepairError::Config(_))));
        let none: [&str; 0] = [];
        assert!(matches!(parse_ops(&none), Err(RepairError::Config(_))));
    }

    #[test]
    fn test_token_round_trip() {
        for op in Op::ALL {
            assert_eq!(op.token().parse::<Op>().unwrap(), op);
        }
    }
}
