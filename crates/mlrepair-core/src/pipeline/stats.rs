//! Aggregate statistics over items, written to `<out>/stats/<name>.json`.

use std::path::{Path, PathBuf};

use model_syntax::structurally_equivalent;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::checkpoint::write_json_atomic;
use crate::error::Result;

pub const STATS_DIR: &str = "stats";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountStats {
    pub sum: usize,
    pub avg: f64,
    pub max: usize,
    /// `sorted[len / 2]`
    pub median: usize,
    pub min: usize,
}

impl CountStats {
    /// `None` for an empty sample.
    pub fn from_values(values: &[usize]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        let sum: usize = sorted.iter().sum();
        Some(Self {
            sum,
            avg: sum as f64 / sorted.len() as f64,
            max: sorted[sorted.len() - 1],
            median: sorted[sorted.len() / 2],
            min: sorted[0],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountEntry {
    pub item: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountReport {
    pub entries: Vec<CountEntry>,
    pub stats: Option<CountStats>,
}

impl CountReport {
    pub fn new(entries: Vec<CountEntry>) -> Self {
        let counts: Vec<usize> = entries.iter().map(|e| e.count).collect();
        Self {
            stats: CountStats::from_values(&counts),
            entries,
        }
    }
}

/// Where the reference fix first appears in one item's list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankEntry {
    pub item: String,
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankStats {
    pub total: usize,
    pub found: usize,
    pub not_found: usize,
    /// Over items where the reference was found.
    pub ranks: Option<CountStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankReport {
    pub entries: Vec<RankEntry>,
    pub stats: RankStats,
}

impl RankReport {
    pub fn new(entries: Vec<RankEntry>) -> Self {
        let ranks: Vec<usize> = entries.iter().filter_map(|e| e.rank).collect();
        Self {
            stats: RankStats {
                total: entries.len(),
                found: ranks.len(),
                not_found: entries.len() - ranks.len(),
                ranks: CountStats::from_values(&ranks),
            },
            entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEntry {
    pub item: String,
    pub built: usize,
    pub attempted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub entries: Vec<BuildEntry>,
    pub built: usize,
    pub attempted: usize,
    /// `built / attempted`, absent when nothing was attempted.
    pub ratio: Option<f64>,
}

impl BuildReport {
    pub fn new(entries: Vec<BuildEntry>) -> Self {
        let built: usize = entries.iter().map(|e| e.built).sum();
        let attempted: usize = entries.iter().map(|e| e.attempted).sum();
        Self {
            entries,
            built,
            attempted,
            ratio: (attempted > 0).then(|| built as f64 / attempted as f64),
        }
    }
}

/// Index of the first program structurally equivalent to `reference`.
pub fn first_match<'p, I>(programs: I, reference: &str) -> Option<usize>
where
    I: IntoIterator<Item = &'p str>,
{
    programs
        .into_iter()
        .position(|program| structurally_equivalent(program, reference))
}

pub fn write_report<T: Serialize>(out_dir: &Path, name: &str, report: &T) -> Result<PathBuf> {
    let path = out_dir.join(STATS_DIR).join(format!("{name}.json"));
    write_json_atomic(&path, report)?;
    Ok(path)
}

pub fn log_count(name: &str, report: &CountReport) {
    match &report.stats {
        Some(s) => info!(
            event = "stats.count",
            name = %name,
            items = report.entries.len(),
            sum = s.sum,
            avg = s.avg,
            max = s.max,
            median = s.median,
            min = s.min,
        ),
        None => info!(event = "stats.count", name = %name, items = 0),
    }
}

pub fn log_rank(name: &str, report: &RankReport) {
    let s = &report.stats;
    info!(
        event = "stats.rank",
        name = %name,
        total = s.total,
        found = s.found,
        not_found = s.not_found,
        median_rank = s.ranks.as_ref().map(|r| r.median),
    );
}

pub fn log_build(report: &BuildReport) {
    info!(
        event = "stats.trainable",
        built = report.built,
        attempted = report.attempted,
        ratio = report.ratio,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_stats_median_is_upper_middle() {
        let stats = CountStats::from_values(&[4, 1, 3, 2]).unwrap();
        assert_eq!(stats.sum, 10);
        assert_eq!(stats.avg, 2.5);
        assert_eq!(stats.median, 3);
        assert_eq!((stats.min, stats.max), (1, 4));
        assert!(CountStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_rank_report() {
        let report = RankReport::new(vec![
            RankEntry {
                item: "a.py".into(),
                rank: Some(0),
            },
            RankEntry {
                item: "b.py".into(),
                rank: None,
            },
            RankEntry {
                item: "c.py".into(),
                rank: Some(4),
            },
        ]);
        assert_eq!(report.stats.found, 2);
        assert_eq!(report.stats.not_found, 1);
        assert_eq!(report.stats.ranks.as_ref().unwrap().max, 4);
    }

    #[test]
    fn test_build_ratio() {
        let report = BuildReport::new(vec![BuildEntry {
            item: "a.py".into(),
            built: 3,
            attempted: 4,
        }]);
        assert_eq!(report.ratio, Some(0.75));
        assert_eq!(BuildReport::new(vec![]).ratio, None);
    }

    #[test]
    fn test_first_match_ignores_spelling() {
        let import = "from keras.layers import Dense\n";
        let programs = [
            format!("{import}x = Dense(3)\n"),
            format!("{import}x = Dense(units=4)\n"),
            format!("{import}x = Dense(4)\n"),
        ];
        let iter = || programs.iter().map(String::as_str);
        assert_eq!(first_match(iter(), &format!("{import}x = Dense(4)")), Some(1));
        assert_eq!(first_match(iter(), &format!("{import}x = Dense(5)")), None);
    }

    #[test]
    fn test_write_report_under_stats_dir() {
        let dir = tempfile::tempdir().unwrap();
        let report = CountReport::new(vec![CountEntry {
            item: "a.py".into(),
            count: 2,
        }]);
        let path = write_report(dir.path(), "masked", &report).unwrap();
        assert_eq!(path, dir.path().join("stats").join("masked.json"));
        let back: CountReport = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(back, report);
    }
}
